// src/db/init_tables.rs

use sqlx::PgPool;

use crate::common::error::AppError;

// DDL das tabelas do núcleo. O schema espelha o cascade:
// guilds <- guild_role_permissions <- role_permissions -> permissions
const CREATE_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS guilds (
        guild_id BIGINT PRIMARY KEY,
        name TEXT NOT NULL,
        prefix TEXT NOT NULL DEFAULT '!',
        pickup_channel_id BIGINT,
        listen_channel_id BIGINT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS permissions (
        permission TEXT PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS guild_role_permissions (
        guild_id BIGINT NOT NULL REFERENCES guilds (guild_id) ON DELETE CASCADE,
        role_id BIGINT NOT NULL,
        PRIMARY KEY (guild_id, role_id)
    )",
    "CREATE TABLE IF NOT EXISTS role_permissions (
        guild_id BIGINT NOT NULL,
        role_id BIGINT NOT NULL,
        permission_key TEXT NOT NULL REFERENCES permissions (permission),
        PRIMARY KEY (guild_id, role_id, permission_key),
        FOREIGN KEY (guild_id, role_id)
            REFERENCES guild_role_permissions (guild_id, role_id)
            ON DELETE CASCADE
    )",
];

/// Cria as tabelas necessárias para o banco de dados e semeia a tabela
/// `permissions` com o conjunto fechado de comandos gated conhecido na
/// inicialização (vindo do registro de comandos).
pub async fn init_db(pool: &PgPool, gated_commands: &[String]) -> Result<(), AppError> {
    for statement in CREATE_TABLES {
        sqlx::query(statement).execute(pool).await?;
    }

    for command_name in gated_commands {
        sqlx::query("INSERT INTO permissions (permission) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(command_name)
            .execute(pool)
            .await?;
    }

    Ok(())
}
