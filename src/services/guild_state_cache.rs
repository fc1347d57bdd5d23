// src/services/guild_state_cache.rs

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::models::guild::{GuildId, GuildState};

/// Cacheia o estado das guildas recuperado do banco de dados.
///
/// Contêiner puro de dados, sem I/O: o DashMap deixa as leituras livres de
/// contenção entre guildas, e os valores `Arc` fazem cada troca de slot ser
/// atômica para quem está lendo. Quem serializa os escritores é o
/// GuildStateManager; o cache não coordena nada sozinho.
#[derive(Debug, Default)]
pub struct GuildStateCache {
    guilds: DashMap<GuildId, Arc<GuildState>>,
}

impl GuildStateCache {
    pub fn new() -> Self {
        Self {
            guilds: DashMap::new(),
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildState>> {
        self.guilds.get(&guild_id).map(|state| state.value().clone())
    }

    pub fn set(&self, guild_id: GuildId, state: Arc<GuildState>) {
        self.guilds.insert(guild_id, state);
    }

    /// Remove a entrada da guilda. No-op silencioso se não existir; quem
    /// chama deve checar antes se precisar distinguir.
    pub fn delete(&self, guild_id: GuildId) {
        self.guilds.remove(&guild_id);
    }

    pub fn update(&self, items: HashMap<GuildId, Arc<GuildState>>) {
        for (guild_id, state) in items {
            self.guilds.insert(guild_id, state);
        }
    }
}
