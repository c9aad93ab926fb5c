// src/core/app_watcher.rs
//! Tracks which whitelisted media application was activated most recently.
//!
//! Lifecycle facts arrive from an [`ApplicationLifecycle`] source. The watcher
//! keeps the running whitelisted applications ordered by activation and tells
//! its delegate whether this process is at the front of that list.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, trace};

use crate::core::app_types::{
    ApplicationLifecycle, LifecycleEvent, LifecycleObserver, RunningApplication,
};
use crate::core::whitelist::Whitelist;

/// Receives arbitration decisions from the watcher
pub trait WatcherDelegate: Send + Sync {
    fn update_is_active_media_app(&self, active: bool);

    /// A statically whitelisted application (not this process) launched and
    /// may have installed a tap in front of ours.
    fn whitelisted_app_started(&self);
}

#[derive(Debug, Default)]
struct WatcherState {
    /// Most recently activated first
    media_apps: Vec<RunningApplication>,
    last_emitted: Option<bool>,
}

enum Decision {
    Ignore,
    WhitelistedAppStarted,
    UpdateActive(bool),
}

pub struct MediaApplicationWatcher {
    own_app: RunningApplication,
    whitelist: Whitelist,
    lifecycle: Arc<dyn ApplicationLifecycle>,
    delegate: Arc<dyn WatcherDelegate>,
    state: Mutex<WatcherState>,
    running: AtomicBool,
}

impl MediaApplicationWatcher {
    pub fn new(
        own_app: RunningApplication,
        whitelist: Whitelist,
        lifecycle: Arc<dyn ApplicationLifecycle>,
        delegate: Arc<dyn WatcherDelegate>,
    ) -> Arc<Self> {
        Arc::new(Self {
            own_app,
            whitelist,
            lifecycle,
            delegate,
            state: Mutex::new(WatcherState::default()),
            running: AtomicBool::new(false),
        })
    }

    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let observer = WatcherObserver {
            watcher: Arc::downgrade(self),
        };
        self.lifecycle.subscribe(Arc::new(observer));
        debug!(own = %self.own_app, "media application watcher started");
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.lifecycle.unsubscribe();
        // Applications may come and go unseen while stopped
        *self.lock_state() = WatcherState::default();
        debug!("media application watcher stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Last value sent to the delegate, `None` before the first qualifying activation.
    pub fn is_active_media_app(&self) -> Option<bool> {
        self.lock_state().last_emitted
    }

    pub fn media_apps(&self) -> Vec<RunningApplication> {
        self.lock_state().media_apps.clone()
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    pub fn handle_event(&self, event: LifecycleEvent) {
        if !self.is_running() {
            return;
        }

        // The delegate may call back into the watcher (stop on tap failure),
        // so decide under the lock and notify after releasing it.
        let decision = {
            let mut state = self.lock_state();
            match &event {
                LifecycleEvent::Launched(app) => self.application_launched(app),
                LifecycleEvent::Activated(app) => self.application_activated(&mut state, app),
                LifecycleEvent::Terminated(app) => self.application_terminated(&mut state, app),
            }
        };

        match decision {
            Decision::Ignore => trace!(?event, "lifecycle event ignored"),
            Decision::WhitelistedAppStarted => {
                debug!(app = %event.application(), "whitelisted application launched");
                self.delegate.whitelisted_app_started();
            }
            Decision::UpdateActive(active) => {
                debug!(app = %event.application(), active, "active media application updated");
                self.delegate.update_is_active_media_app(active);
            }
        }
    }

    fn application_launched(&self, app: &RunningApplication) -> Decision {
        if self.whitelist.in_static(app) && *app != self.own_app {
            Decision::WhitelistedAppStarted
        } else {
            Decision::Ignore
        }
    }

    fn application_activated(&self, state: &mut WatcherState, app: &RunningApplication) -> Decision {
        // This process is always a candidate, even when it has no bundle identifier
        if *app != self.own_app && !self.whitelist.contains(app) {
            return Decision::Ignore;
        }
        state.media_apps.retain(|running| running != app);
        state.media_apps.insert(0, app.clone());
        self.key_intercept_status(state)
    }

    fn application_terminated(
        &self,
        state: &mut WatcherState,
        app: &RunningApplication,
    ) -> Decision {
        state.media_apps.retain(|running| running != app);
        self.key_intercept_status(state)
    }

    fn key_intercept_status(&self, state: &mut WatcherState) -> Decision {
        match state.media_apps.first() {
            Some(front) => {
                let active = *front == self.own_app;
                state.last_emitted = Some(active);
                Decision::UpdateActive(active)
            }
            None => Decision::Ignore,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, WatcherState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for MediaApplicationWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Registered with the lifecycle source; does not keep the watcher alive.
struct WatcherObserver {
    watcher: Weak<MediaApplicationWatcher>,
}

impl LifecycleObserver for WatcherObserver {
    fn on_lifecycle_event(&self, event: LifecycleEvent) {
        if let Some(watcher) = self.watcher.upgrade() {
            watcher.handle_event(event);
        }
    }
}
