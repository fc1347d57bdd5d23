// src/handlers/lifecycle.rs

use std::sync::Arc;

use crate::{
    common::error::AppError,
    managers::guild_state_manager::GuildStateManager,
    models::guild::{GuildId, GuildInfo},
};

/// Pontos de entrada dos eventos de presença do gateway. Cada evento mapeia
/// 1:1 para registro/remoção no GuildStateManager; o client do chat só
/// precisa chamar o hook certo.
pub struct GuildLifecycle {
    guild_state_manager: Arc<GuildStateManager>,
}

impl GuildLifecycle {
    pub fn new(guild_state_manager: Arc<GuildStateManager>) -> Self {
        Self {
            guild_state_manager,
        }
    }

    /// Gateway conectou: registra todas as guildas visíveis de uma vez.
    pub async fn on_ready(&self, guilds: &[GuildInfo]) -> Result<(), AppError> {
        self.guild_state_manager.register_guilds(guilds).await?;
        tracing::info!("✅ {} guildas registradas no cache", guilds.len());

        Ok(())
    }

    pub async fn on_guild_available(&self, guild: GuildInfo) -> Result<(), AppError> {
        self.guild_state_manager.register_guild(&guild).await
    }

    pub async fn on_guild_join(&self, guild: GuildInfo) -> Result<(), AppError> {
        tracing::info!("Guilda {} ({}) entrou", guild.name, guild.guild_id);
        self.guild_state_manager.register_guild(&guild).await
    }

    /// A linha no banco fica: só o cache é limpo na saída.
    pub async fn on_guild_remove(&self, guild_id: GuildId) {
        tracing::info!("Guilda {} saiu, removendo do cache", guild_id);
        self.guild_state_manager.evict_guild(guild_id).await;
    }
}
