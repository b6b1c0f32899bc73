//! # alifa-gate
//!
//! The write-gate every user-generated write passes through, and the feeds that
//! keep local views in step with the store's change notifications.
//!
//! # Developer Note
//! A write runs `Authenticating → RateChecking → Validating → Sanitizing →
//! (FileChecking) → Persisting` and stops at the first failing step with a
//! [`Rejection`](alifa_core::Rejection). Only `Persisting` touches storage.

pub mod feed;
pub mod gate;
pub mod state;

pub use feed::{load_privacy_settings, CommentFeed, LikeTracker, PostFeed};
pub use gate::{LikeToggled, WriteGate};
pub use state::{Action, GateState};
