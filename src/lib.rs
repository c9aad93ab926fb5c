//! Media Key Tap Library
//!
//! Intercepts the hardware media keys (play/pause, previous, next, rewind,
//! fast forward) for whichever cooperating media application was activated
//! most recently, and lets the keys pass through untouched otherwise.
//!
//! The arbitration logic in [`core`] is platform independent and driven
//! through small host traits. The macOS bindings for those traits live in
//! `platform::macos`.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod core;
#[cfg(target_os = "macos")]
pub mod platform;

pub use crate::config::{ConfigError, TapConfig};
pub use crate::core::{
    ApplicationIdentity, CaptureError, HostServices, KeyEvent, KeyPressMode, MediaKey,
    MediaKeyTap, MediaKeyTapDelegate, RunningApplication,
};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::TapConfig;
    pub use crate::core::{
        CaptureError, KeyEvent, KeyPressMode, MediaKey, MediaKeyTap, MediaKeyTapDelegate,
    };
    #[cfg(target_os = "macos")]
    pub use crate::platform::macos::{native_services, MacTapHost};
}
