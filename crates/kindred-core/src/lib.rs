//! # kindred-core
//!
//! The conversation engine of the kindred voice companion.
//!
//! - [`coordinator`] -- [`TurnCoordinator`], which runs one cancellable turn
//!   at a time from user text to a spoken, transcribed reply
//! - [`state`] -- [`ConversationState`]: transcript, profile and status
//! - [`session`] -- [`TurnSession`], the per-turn cancellation context
//! - [`profile_store`] -- [`ProfileStore`], profile persistence and the
//!   session credential

pub mod coordinator;
pub mod profile_store;
pub mod session;
pub mod state;

pub use coordinator::{Notice, TurnCoordinator, TurnOutcome};
pub use profile_store::ProfileStore;
pub use session::TurnSession;
pub use state::ConversationState;
