pub mod guild_state_cache;
pub use guild_state_cache::GuildStateCache;
