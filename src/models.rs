pub mod guild;
pub use guild::{GuildConfigUpdateResult, GuildId, GuildInfo, GuildSettings, GuildState};
pub mod permission;
pub use permission::RolePermissionRow;
