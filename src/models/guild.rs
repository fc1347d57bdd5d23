// src/models/guild.rs

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// IDs do Discord (snowflakes) — BIGINT no banco.
pub type GuildId = i64;
pub type RoleId = i64;
pub type ChannelId = i64;

// Identificação mínima da guilda, vinda dos eventos de presença do gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildInfo {
    pub guild_id: GuildId,
    pub name: String,
}

// Configuração da guilda acessada com frequência (mantida em cache).
// Invariante: pickup_channel_id != listen_channel_id quando ambos existem,
// garantido na escrita pelo GuildStateManager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSettings {
    pub guild_id: GuildId,
    pub prefix: String,
    pub pickup_channel_id: Option<ChannelId>,
    pub listen_channel_id: Option<ChannelId>,
}

// Representa uma guilda vinda do banco de dados
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct GuildRow {
    pub guild_id: GuildId,
    pub name: String,
    pub prefix: String,
    pub pickup_channel_id: Option<ChannelId>,
    pub listen_channel_id: Option<ChannelId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GuildRow {
    pub fn into_settings(self) -> GuildSettings {
        GuildSettings {
            guild_id: self.guild_id,
            prefix: self.prefix,
            pickup_channel_id: self.pickup_channel_id,
            listen_channel_id: self.listen_channel_id,
        }
    }
}

// Unidade de estado cacheada por guilda. Imutável por convenção: toda
// mutação constrói um valor novo e troca o slot do cache de uma vez só,
// então leitores nunca observam um registro pela metade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuildState {
    pub settings: GuildSettings,
    pub role_command_permissions: HashMap<RoleId, HashSet<String>>,
}

impl GuildState {
    pub fn new(
        settings: GuildSettings,
        role_command_permissions: HashMap<RoleId, HashSet<String>>,
    ) -> Self {
        Self {
            settings,
            role_command_permissions,
        }
    }
}

// Resultado estruturado da atualização de configuração da guilda
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuildConfigUpdateResult {
    pub ok: bool,
    pub settings: Option<GuildSettings>,
    pub error: Option<String>,
}
