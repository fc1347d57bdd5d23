// src/db/guild_repo.rs

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{
    common::error::AppError,
    models::guild::{GuildId, GuildInfo, GuildRow, GuildSettings, RoleId},
    models::permission::RolePermissionRow,
};

/// O contrato do repositório de guildas: o único componente que fala com o
/// banco. Cada método é uma transação autônoma, sem estado entre chamadas —
/// quem coordena cache e concorrência é o GuildStateManager.
#[async_trait]
pub trait GuildRepository: Send + Sync {
    /// Busca as configurações da guilda; cria a linha (prefix padrão '!',
    /// sem canais) na mesma transação se ela ainda não existir.
    async fn fetch_guild_settings(&self, guild: &GuildInfo) -> Result<GuildSettings, AppError>;

    /// Atualiza as colunas de canal. `false` significa que nenhuma linha foi
    /// afetada — a linha da guilda sumiu, uma anomalia da camada de dados.
    async fn update_guild_settings(&self, guild_settings: &GuildSettings)
    -> Result<bool, AppError>;

    /// Lê todos os grants da guilda e dobra em cargo -> comandos.
    async fn fetch_role_permissions(
        &self,
        guild_id: GuildId,
    ) -> Result<HashMap<RoleId, HashSet<String>>, AppError>;

    /// Insere um grant por comando, garantindo antes o registro pai
    /// (guilda, cargo). Corridas de grant duplicado são engolidas.
    async fn add_role_permissions(
        &self,
        guild_id: GuildId,
        role_id: RoleId,
        command_names: &[String],
    ) -> Result<(), AppError>;

    /// Apaga os grants pedidos e retorna exatamente os que existiam.
    async fn remove_role_permissions(
        &self,
        guild_id: GuildId,
        role_id: RoleId,
        command_names: &[String],
    ) -> Result<Vec<String>, AppError>;

    /// Apaga todos os grants dos cargos informados (cascateia nas linhas
    /// filhas de role_permissions).
    async fn remove_elevated_roles(
        &self,
        guild_id: GuildId,
        role_ids: &[RoleId],
    ) -> Result<(), AppError>;
}

// O repositório de guildas, responsável por todas as interações com as
// tabelas 'guilds', 'guild_role_permissions' e 'role_permissions'
#[derive(Clone)]
pub struct PgGuildRepository {
    pool: PgPool,
}

impl PgGuildRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GuildRepository for PgGuildRepository {
    async fn fetch_guild_settings(&self, guild: &GuildInfo) -> Result<GuildSettings, AppError> {
        let mut tx = self.pool.begin().await?;

        // 1. Tenta buscar a guilda
        let row = sqlx::query_as::<_, GuildRow>("SELECT * FROM guilds WHERE guild_id = $1")
            .bind(guild.guild_id)
            .fetch_optional(&mut *tx)
            .await?;

        let row = match row {
            Some(row) => row,
            None => {
                // 2. Não existe ainda: cria com os defaults das colunas.
                // ON CONFLICT cobre a corrida de duas tasks criando a mesma
                // guilda — quem perde só relê a linha vencedora.
                let inserted = sqlx::query_as::<_, GuildRow>(
                    "INSERT INTO guilds (guild_id, name) VALUES ($1, $2) \
                     ON CONFLICT (guild_id) DO NOTHING RETURNING *",
                )
                .bind(guild.guild_id)
                .bind(&guild.name)
                .fetch_optional(&mut *tx)
                .await?;

                match inserted {
                    Some(row) => row,
                    None => {
                        sqlx::query_as::<_, GuildRow>("SELECT * FROM guilds WHERE guild_id = $1")
                            .bind(guild.guild_id)
                            .fetch_one(&mut *tx)
                            .await?
                    }
                }
            }
        };

        tx.commit().await?;

        Ok(row.into_settings())
    }

    async fn update_guild_settings(
        &self,
        guild_settings: &GuildSettings,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE guilds \
             SET pickup_channel_id = $2, listen_channel_id = $3, updated_at = NOW() \
             WHERE guild_id = $1",
        )
        .bind(guild_settings.guild_id)
        .bind(guild_settings.pickup_channel_id)
        .bind(guild_settings.listen_channel_id)
        .execute(&self.pool)
        .await?;

        // Caso o banco não tenha atualizado nada — não deveria acontecer
        Ok(result.rows_affected() > 0)
    }

    async fn fetch_role_permissions(
        &self,
        guild_id: GuildId,
    ) -> Result<HashMap<RoleId, HashSet<String>>, AppError> {
        let rows = sqlx::query_as::<_, RolePermissionRow>(
            "SELECT guild_id, role_id, permission_key \
             FROM role_permissions WHERE guild_id = $1",
        )
        .bind(guild_id)
        .fetch_all(&self.pool)
        .await?;

        let mut permissions: HashMap<RoleId, HashSet<String>> = HashMap::new();
        for row in rows {
            permissions
                .entry(row.role_id)
                .or_default()
                .insert(row.permission_key);
        }

        Ok(permissions)
    }

    async fn add_role_permissions(
        &self,
        guild_id: GuildId,
        role_id: RoleId,
        command_names: &[String],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        // 1. Garante o registro pai (guilda, cargo)
        sqlx::query(
            "INSERT INTO guild_role_permissions (guild_id, role_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(guild_id)
        .bind(role_id)
        .execute(&mut *tx)
        .await?;

        // 2. Um grant por comando; duplicado em corrida não é erro
        for command_name in command_names {
            sqlx::query(
                "INSERT INTO role_permissions (guild_id, role_id, permission_key) \
                 VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
            )
            .bind(guild_id)
            .bind(role_id)
            .bind(command_name)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn remove_role_permissions(
        &self,
        guild_id: GuildId,
        role_id: RoleId,
        command_names: &[String],
    ) -> Result<Vec<String>, AppError> {
        // RETURNING nos diz o que de fato existia e foi apagado
        let removed = sqlx::query_scalar::<_, String>(
            "DELETE FROM role_permissions \
             WHERE guild_id = $1 AND role_id = $2 AND permission_key = ANY($3) \
             RETURNING permission_key",
        )
        .bind(guild_id)
        .bind(role_id)
        .bind(command_names)
        .fetch_all(&self.pool)
        .await?;

        Ok(removed)
    }

    async fn remove_elevated_roles(
        &self,
        guild_id: GuildId,
        role_ids: &[RoleId],
    ) -> Result<(), AppError> {
        // Apagar o registro pai cascateia nos grants filhos
        sqlx::query("DELETE FROM guild_role_permissions WHERE guild_id = $1 AND role_id = ANY($2)")
            .bind(guild_id)
            .bind(role_ids)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
