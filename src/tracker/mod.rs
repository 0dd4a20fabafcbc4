pub mod event;
pub mod machine;
pub mod manager;

pub use event::{ChannelOccupancy, Occupant, SessionKey, TransitionSnapshot, VoiceTransition};
pub use machine::{CreditEffect, CreditKind, PresenceMachine};
pub use manager::{create_shared_voice_tracker, Capability, SharedVoiceTracker, VoiceTracker};
