// src/config.rs

use std::{env, sync::Arc, time::Duration};

use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{
    db::guild_repo::PgGuildRepository,
    handlers::commands,
    handlers::lifecycle::GuildLifecycle,
    managers::{CommandAccessManager, GuildStateManager},
};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub guild_state_manager: Arc<GuildStateManager>,
    pub command_access_manager: Arc<CommandAccessManager>,
    pub guild_lifecycle: Arc<GuildLifecycle>,
    // Conjunto fechado de comandos gated, fixado na inicialização
    pub gated_commands: Vec<String>,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL deve ser definida");

        // Conecta ao banco de dados, usando '?' para propagar erros
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // --- Monta o gráfico de dependências ---
        let guild_repo = Arc::new(PgGuildRepository::new(db_pool.clone()));
        let guild_state_manager = Arc::new(GuildStateManager::new(guild_repo));
        let command_access_manager =
            Arc::new(CommandAccessManager::new(guild_state_manager.clone()));
        let guild_lifecycle = Arc::new(GuildLifecycle::new(guild_state_manager.clone()));

        Ok(Self {
            db_pool,
            guild_state_manager,
            command_access_manager,
            guild_lifecycle,
            gated_commands: commands::gated_command_names(),
        })
    }
}
