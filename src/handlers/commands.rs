// src/handlers/commands.rs

use crate::managers::command_access_manager::{ChannelScope, PermissionScope};

/// Descreve um comando registrado no bot: nome qualificado e os dois
/// escopos que o CommandAccessManager avalia a cada invocação.
#[derive(Debug, Clone, Copy)]
pub struct CommandDescriptor {
    pub qualified_name: &'static str,
    pub channel_scope: ChannelScope,
    pub permission_scope: PermissionScope,
}

// ---
// DEFINIÇÃO DOS COMANDOS
// ---
// A camada de dispatch (o client do chat, fora deste núcleo) consulta esta
// tabela para saber quais escopos aplicar antes de executar cada comando.
pub const COMMANDS: &[CommandDescriptor] = &[
    CommandDescriptor {
        qualified_name: "ping",
        channel_scope: ChannelScope::Global,
        permission_scope: PermissionScope::Everyone,
    },
    CommandDescriptor {
        qualified_name: "setup",
        channel_scope: ChannelScope::Global,
        permission_scope: PermissionScope::Admin,
    },
    CommandDescriptor {
        qualified_name: "permission",
        channel_scope: ChannelScope::PickupListen,
        permission_scope: PermissionScope::Gated,
    },
];

/// Nomes dos comandos gated, conhecidos na inicialização. Semeiam a tabela
/// `permissions` e servem de allowlist em toda mutação de permissão.
pub fn gated_command_names() -> Vec<String> {
    COMMANDS
        .iter()
        .filter(|command| command.permission_scope == PermissionScope::Gated)
        .map(|command| command.qualified_name.to_string())
        .collect()
}
