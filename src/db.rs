pub mod guild_repo;
pub use guild_repo::{GuildRepository, PgGuildRepository};
pub mod init_tables;
