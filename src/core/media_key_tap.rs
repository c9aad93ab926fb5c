// src/core/media_key_tap.rs
//! Arbitrated media key tap
//!
//! [`MediaKeyTap`] wires the application watcher and peer discovery to the
//! capture loop. It owns the "should this process intercept" flag, toggles the
//! live tap when that flag changes, reinstalls the tap when another media
//! player launches, and filters decoded keys by [`KeyPressMode`] before they
//! reach the host's [`MediaKeyTapDelegate`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use tracing::{debug, info, warn};

use crate::config::TapConfig;
use crate::core::app_types::{ApplicationIdentity, ApplicationLifecycle, RunningApplication};
use crate::core::app_watcher::{MediaApplicationWatcher, WatcherDelegate};
use crate::core::capture_loop::{CaptureDelegate, CaptureLoop};
use crate::core::error::CaptureError;
use crate::core::event_tap::EventTapHost;
use crate::core::forwarder::Forwarder;
use crate::core::key_event::{KeyEvent, KeyPressMode, MediaKey};
use crate::core::peer_discovery::{PeerBroadcast, PeerDiscovery};
use crate::core::whitelist::{DynamicWhitelist, StaticWhitelist, Whitelist};

/// Host application callbacks.
///
/// `on_media_key` runs on the forwarding context. The other methods run on
/// whichever context delivers application lifecycle notifications.
pub trait MediaKeyTapDelegate: Send + Sync {
    fn on_media_key(&self, key: MediaKey, event: KeyEvent);

    /// Called only when interception actually flips, not for repeated decisions.
    fn on_active_state_changed(&self, _active: bool) {}

    fn on_whitelisted_app_started(&self) {}

    /// The tap could not be reinstalled; the tap no longer arbitrates.
    fn on_tap_failed(&self, error: &CaptureError) {
        warn!(%error, "media key tap failed");
    }
}

/// Platform collaborators a tap is built from
pub struct HostServices<H: EventTapHost> {
    pub event_tap: Arc<H>,
    pub lifecycle: Arc<dyn ApplicationLifecycle>,
    pub broadcast: Arc<dyn PeerBroadcast>,
    pub forwarder: Arc<dyn Forwarder>,
    /// This process as the lifecycle source reports it
    pub current_app: RunningApplication,
}

/// InterceptionState plus the press-mode filter
struct InterceptState {
    intercept: AtomicBool,
    press_mode: KeyPressMode,
    delegate: Arc<dyn MediaKeyTapDelegate>,
}

impl InterceptState {
    /// Returns the previous value.
    fn set(&self, intercept: bool) -> bool {
        self.intercept.swap(intercept, Ordering::Relaxed)
    }
}

impl CaptureDelegate for InterceptState {
    fn update_intercept_media_keys(&self, intercept: bool) {
        // Only reached before a tap exists, so there is nothing to toggle
        self.set(intercept);
    }

    fn handle_key_event(&self, event: KeyEvent) {
        let Some(key) = event.media_key() else {
            return;
        };
        if self.press_mode.accepts(&event) {
            self.delegate.on_media_key(key, event);
        }
    }

    fn is_intercepting_media_keys(&self) -> bool {
        self.intercept.load(Ordering::Relaxed)
    }
}

/// Turns watcher decisions into tap operations
struct Arbitrator<H: EventTapHost> {
    state: Arc<InterceptState>,
    capture: Arc<Mutex<CaptureLoop<H>>>,
    watcher: OnceLock<Weak<MediaApplicationWatcher>>,
    discovery: Weak<PeerDiscovery>,
}

impl<H: EventTapHost> Arbitrator<H> {
    fn shut_down_arbitration(&self) {
        if let Some(watcher) = self.watcher.get().and_then(Weak::upgrade) {
            watcher.stop();
        }
        if let Some(discovery) = self.discovery.upgrade() {
            discovery.stop();
        }
    }
}

impl<H: EventTapHost> WatcherDelegate for Arbitrator<H> {
    fn update_is_active_media_app(&self, active: bool) {
        let previous = self.state.set(active);
        if previous == active {
            return;
        }
        debug!(active, "media key interception changed");
        lock_capture(&self.capture).enable_tap(active);
        self.state.delegate.on_active_state_changed(active);
    }

    fn whitelisted_app_started(&self) {
        self.state.delegate.on_whitelisted_app_started();

        let result = lock_capture(&self.capture).restart_tap();
        if let Err(error) = result {
            warn!(%error, "could not reinstall media key tap; stopping arbitration");
            self.state.set(false);
            self.shut_down_arbitration();
            self.state.delegate.on_tap_failed(&error);
        }
    }
}

pub struct MediaKeyTap<H: EventTapHost> {
    state: Arc<InterceptState>,
    capture: Arc<Mutex<CaptureLoop<H>>>,
    watcher: Arc<MediaApplicationWatcher>,
    discovery: Arc<PeerDiscovery>,
}

impl<H: EventTapHost> MediaKeyTap<H> {
    pub fn new(
        delegate: Arc<dyn MediaKeyTapDelegate>,
        config: &TapConfig,
        services: HostServices<H>,
    ) -> Self {
        let HostServices {
            event_tap,
            lifecycle,
            broadcast,
            forwarder,
            mut current_app,
        } = services;

        if let Some(id) = &config.application_id {
            current_app.bundle_identifier = Some(id.clone());
        }
        let own_identity = current_app.bundle_identifier.clone();

        let state = Arc::new(InterceptState {
            intercept: AtomicBool::new(false),
            press_mode: config.press_mode,
            delegate,
        });
        let capture = Arc::new(Mutex::new(CaptureLoop::new(
            event_tap,
            state.clone(),
            forwarder,
        )));

        let dynamic = DynamicWhitelist::new();
        let statics = StaticWhitelist::with_additional(
            own_identity.as_ref(),
            config.additional_whitelist.iter().cloned(),
        );
        let discovery = PeerDiscovery::new(own_identity, broadcast, dynamic.clone());

        let arbitrator = Arc::new(Arbitrator {
            state: state.clone(),
            capture: capture.clone(),
            watcher: OnceLock::new(),
            discovery: Arc::downgrade(&discovery),
        });
        let watcher = MediaApplicationWatcher::new(
            current_app,
            Whitelist::new(statics, dynamic),
            lifecycle,
            arbitrator.clone(),
        );
        let _ = arbitrator.watcher.set(Arc::downgrade(&watcher));

        Self {
            state,
            capture,
            watcher,
            discovery,
        }
    }

    /// Announce to peers, start watching applications and install the tap.
    ///
    /// If the tap cannot be installed, arbitration is stopped as well since
    /// there is nothing left to arbitrate for.
    pub fn start(&self) -> Result<(), CaptureError> {
        self.discovery.start();
        self.watcher.start();

        let result = lock_capture(&self.capture).start_watching(false);
        if let Err(error) = result {
            warn!(%error, "media key tap unavailable");
            // The provisional grant made before installing the filter no longer holds
            self.state.set(false);
            self.watcher.stop();
            self.discovery.stop();
            return Err(error);
        }
        info!(press_mode = ?self.state.press_mode, "media key tap started");
        Ok(())
    }

    pub fn stop(&self) {
        lock_capture(&self.capture).stop_watching();
        self.state.set(false);
        self.watcher.stop();
        self.discovery.stop();
    }

    pub fn is_intercepting(&self) -> bool {
        self.state.is_intercepting_media_keys()
    }

    pub fn is_watching(&self) -> bool {
        lock_capture(&self.capture).is_watching()
    }

    pub fn is_arbitrating(&self) -> bool {
        self.watcher.is_running()
    }

    pub fn press_mode(&self) -> KeyPressMode {
        self.state.press_mode
    }

    pub fn peers(&self) -> Vec<ApplicationIdentity> {
        self.discovery.peers()
    }

    pub fn active_media_apps(&self) -> Vec<RunningApplication> {
        self.watcher.media_apps()
    }
}

impl<H: EventTapHost> Drop for MediaKeyTap<H> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock_capture<H: EventTapHost>(
    capture: &Mutex<CaptureLoop<H>>,
) -> MutexGuard<'_, CaptureLoop<H>> {
    capture
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
