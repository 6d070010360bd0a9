//! Client-side pieces of the banter delivery protocol.
//!
//! Two concerns live here, both defined by the protocol rather than by any
//! particular UI:
//!
//! - [`Poller`] — cursor reconciliation over `/api/poll`: monotone cursor
//!   advance, duplicate suppression across retried polls, and the
//!   invalid-cursor fallback to history bootstrap.
//! - [`PlaybackSequencer`] — the in-order, non-overlapping audio playback
//!   discipline for outbound messages.

pub mod playback;
pub mod poller;

pub use playback::{AudioSink, PlaybackError, PlaybackSequencer};
pub use poller::{Poller, PollerError};
