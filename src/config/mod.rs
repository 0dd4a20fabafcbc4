pub mod guild;

pub use guild::{create_shared_bot_config, BotConfig, GuildConfig, SharedBotConfig};
