//! Proctoring session engine - owns the capture-and-alert loop

mod engine;

pub use engine::{create_engine_channels, SessionEngine};

/// Commands that can be sent to the session engine
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Acquire the capture device and start sampling
    Start,
    /// Stop sampling, keep the device and accumulated state
    Pause,
    /// Resume sampling after a pause
    Resume,
    /// Release the device and reset state
    Stop,
    /// Host view visibility changed
    SetHidden(bool),
    /// Re-broadcast the current status
    Status,
    /// Stop any session and exit the engine loop
    Shutdown,
}

/// Status updates from the session engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineStatus {
    /// No session
    Idle,
    /// Session active and sampling
    Sampling {
        /// Frames evaluated so far in this session
        frames: u64,
    },
    /// Paused by the operator
    Paused,
    /// Sampling suspended while the view is hidden
    Suspended,
    /// An error occurred
    Error(String),
}
