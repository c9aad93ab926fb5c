// src/core/mod.rs
pub mod app_types;
pub mod app_watcher;
pub mod capture_loop;
pub mod error;
pub mod event_tap;
pub mod forwarder;
pub mod key_event;
pub mod media_key_tap;
pub mod peer_discovery;
pub mod whitelist;

#[cfg(test)]
pub(crate) mod test_utils;

pub use app_types::{ApplicationIdentity, LifecycleEvent, RunningApplication};
pub use error::CaptureError;
pub use key_event::{KeyEvent, KeyPressMode, MediaKey};
pub use media_key_tap::{HostServices, MediaKeyTap, MediaKeyTapDelegate};
