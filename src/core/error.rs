// src/core/error.rs
use thiserror::Error;

/// Failures while installing the media key tap. None of these are retried.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Event tap creation failed: is your application sandboxed?")]
    FilterCreationFailed,

    #[error("Runloop source creation failed")]
    SourceCreationFailed,

    #[error("Failed to spawn the event tap thread: {0}")]
    LoopSpawnFailed(#[from] std::io::Error),

    #[error("Event tap thread exited before its run loop started")]
    LoopExited,
}
