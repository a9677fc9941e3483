//! Meeting session lifecycle

pub mod controller;
pub mod state;

pub use controller::{MeetingCommand, MeetingController};
pub use state::{EndReason, MeetingControls, MeetingSession, SessionStatus};
