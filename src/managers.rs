pub mod command_access_manager;
pub use command_access_manager::CommandAccessManager;
pub mod guild_state_manager;
pub use guild_state_manager::GuildStateManager;
