//! Appreciation reciprocation engine.
//!
//! Decides, per incoming like/poke notice addressed to the bot account,
//! whether to answer it and with which OneBot action. Shared configuration,
//! self identity and the VIP day ledger live in [`ReciprocationState`]; the
//! outbound side is the [`OneBotApi`] trait.

pub mod actor_locks;
pub mod appreciation_event;
pub mod friend_directory;
pub mod identity;
pub mod ledger_rollover;
pub mod onebot_api;
pub mod reciprocation_config;
pub mod reciprocation_runtime;
pub mod reciprocation_state;
pub mod vip_rate_ledger;

pub use appreciation_event::*;
pub use friend_directory::*;
pub use identity::*;
pub use ledger_rollover::*;
pub use onebot_api::*;
pub use reciprocation_config::*;
pub use reciprocation_runtime::*;
pub use reciprocation_state::*;
pub use vip_rate_ledger::*;
