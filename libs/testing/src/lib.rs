//! Test doubles for the executor capabilities.
//!
//! - [`FakeCoordinator`]: a coordinator whose pointer follows a bundle's
//!   fingerprint chain and whose responses to submissions follow a script of
//!   [`Step`]s (accept, race loss, revert, dispatch failure, lag).
//! - [`RecordingClock`]: a clock that records every requested sleep and
//!   returns immediately.

mod clock;
mod coordinator;

pub use clock::RecordingClock;
pub use coordinator::{FakeCoordinator, Step, RACE_LOSS_REASON};
