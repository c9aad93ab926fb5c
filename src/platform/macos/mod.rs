// src/platform/macos/mod.rs
//! macOS bindings for the host traits in [`crate::core`].

pub mod distributed;
pub mod event_tap;
pub mod main_queue;
pub mod workspace;

use std::sync::Arc;

use objc2_app_kit::NSRunningApplication;

pub use distributed::DistributedBroadcast;
pub use event_tap::MacTapHost;
pub use main_queue::MainQueueForwarder;
pub use workspace::WorkspaceLifecycle;

use crate::core::app_types::RunningApplication;
use crate::core::forwarder::Forwarder;
use crate::core::media_key_tap::HostServices;

/// This process as NSWorkspace reports it.
pub fn current_app() -> RunningApplication {
    let app = unsafe { NSRunningApplication::currentApplication() };
    workspace::running_application(&app)
}

/// Native services with key events delivered on the main dispatch queue.
pub fn native_services() -> HostServices<MacTapHost> {
    native_services_with(Arc::new(MainQueueForwarder))
}

pub fn native_services_with(forwarder: Arc<dyn Forwarder>) -> HostServices<MacTapHost> {
    HostServices {
        event_tap: Arc::new(MacTapHost),
        lifecycle: Arc::new(WorkspaceLifecycle::new()),
        broadcast: Arc::new(DistributedBroadcast::new()),
        forwarder,
        current_app: current_app(),
    }
}
