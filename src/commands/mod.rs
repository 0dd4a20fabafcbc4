pub mod admin;
pub mod general;
pub mod rank;

pub use admin::{
    add_time, add_xp, remove_time, remove_xp, reset_voice, reset_xp, set_afk_channel,
    set_announce_channel,
};
pub use general::{help, ping};
pub use rank::{leaderboard, rank};
