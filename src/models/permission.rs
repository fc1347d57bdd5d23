// src/models/permission.rs

use serde::Serialize;

use crate::models::guild::{GuildId, RoleId};

// Linha da tabela role_permissions: um grant (guilda, cargo, comando)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RolePermissionRow {
    pub guild_id: GuildId,
    pub role_id: RoleId,
    pub permission_key: String,
}
