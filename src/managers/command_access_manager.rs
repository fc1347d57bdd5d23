// src/managers/command_access_manager.rs

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    common::error::AppError,
    managers::guild_state_manager::GuildStateManager,
    models::guild::{ChannelId, GuildId, RoleId},
};

/// Em quais canais um comando pode ser invocado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelScope {
    Global,
    Pickup,
    Listen,
    PickupListen,
}

/// Quem pode invocar um comando.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionScope {
    Everyone,
    Gated,
    Admin,
}

/// Decide allow/deny lendo só o estado cacheado — roda síncrono no caminho
/// quente de dispatch, sem I/O e sem await.
pub struct CommandAccessManager {
    guild_state_manager: Arc<GuildStateManager>,
}

impl CommandAccessManager {
    pub fn new(guild_state_manager: Arc<GuildStateManager>) -> Self {
        Self {
            guild_state_manager,
        }
    }

    /// Compara o canal atual com os canais configurados da guilda. Um canal
    /// não configurado nunca casa com o canal atual.
    pub fn check_channel_scope(
        &self,
        required_scope: ChannelScope,
        guild_id: GuildId,
        current_channel_id: ChannelId,
    ) -> Result<bool, AppError> {
        let state = self.guild_state_manager.get_guild_state(guild_id)?;
        let pickup_channel_id = state.settings.pickup_channel_id;
        let listen_channel_id = state.settings.listen_channel_id;

        Ok(match required_scope {
            ChannelScope::Global => true,
            ChannelScope::Pickup => pickup_channel_id == Some(current_channel_id),
            ChannelScope::Listen => listen_channel_id == Some(current_channel_id),
            ChannelScope::PickupListen => {
                pickup_channel_id == Some(current_channel_id)
                    || listen_channel_id == Some(current_channel_id)
            }
        })
    }

    /// O núcleo do escopo Gated: admin sempre pode; senão basta um cargo do
    /// membro com o comando no grant (para no primeiro que casar). Também é
    /// usado direto pelo autocomplete de /permission.
    pub fn has_command_permission(
        &self,
        guild_id: GuildId,
        guild_member_role_ids: &[RoleId],
        is_admin: bool,
        command_name: &str,
    ) -> Result<bool, AppError> {
        if is_admin {
            return Ok(true);
        }

        let state = self.guild_state_manager.get_guild_state(guild_id)?;

        Ok(guild_member_role_ids.iter().any(|role_id| {
            state
                .role_command_permissions
                .get(role_id)
                .is_some_and(|commands| commands.contains(command_name))
        }))
    }

    pub fn check_permission_scope(
        &self,
        required_scope: PermissionScope,
        guild_id: GuildId,
        guild_member_role_ids: &[RoleId],
        is_admin: bool,
        command_name: &str,
    ) -> Result<bool, AppError> {
        match required_scope {
            PermissionScope::Everyone => Ok(true),
            PermissionScope::Admin => Ok(is_admin),
            PermissionScope::Gated => self.has_command_permission(
                guild_id,
                guild_member_role_ids,
                is_admin,
                command_name,
            ),
        }
    }
}
