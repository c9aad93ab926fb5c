// src/core/capture_loop.rs
//! Media key capture on a dedicated run loop thread
//!
//! The tap is installed from the caller's thread, then a dedicated thread
//! attaches the tap's source to its own run loop and runs that loop until the
//! tap is removed. Decoding and the pass/swallow decision happen inside the
//! tap callback on that thread; delegate delivery is queued on a
//! [`Forwarder`] so the callback stays within the host's latency budget.

use std::sync::mpsc;
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, trace, warn};

use crate::core::error::CaptureError;
use crate::core::event_tap::{EventMask, EventTapHost, TapCallback, TapDecision, TapEvent};
use crate::core::forwarder::Forwarder;
use crate::core::key_event::{is_media_key_event, KeyEvent};

const RUN_LOOP_THREAD_NAME: &str = "media-key-tap-runloop";

/// The capture loop's view of the arbitration facade
pub trait CaptureDelegate: Send + Sync {
    fn update_intercept_media_keys(&self, intercept: bool);

    /// Called on the forwarding context, never on the tap thread.
    fn handle_key_event(&self, event: KeyEvent);

    /// Read from the tap thread for every candidate event.
    fn is_intercepting_media_keys(&self) -> bool;
}

struct CaptureHandle<H: EventTapHost> {
    port: H::Port,
    source: H::Source,
    run_loop: H::RunLoop,
    thread: Option<JoinHandle<()>>,
    // The callback only holds a weak reference so the port is released with the handle
    _port_slot: Arc<OnceLock<H::Port>>,
}

pub struct CaptureLoop<H: EventTapHost> {
    host: Arc<H>,
    delegate: Arc<dyn CaptureDelegate>,
    forwarder: Arc<dyn Forwarder>,
    handle: Option<CaptureHandle<H>>,
}

impl<H: EventTapHost> CaptureLoop<H> {
    pub fn new(
        host: Arc<H>,
        delegate: Arc<dyn CaptureDelegate>,
        forwarder: Arc<dyn Forwarder>,
    ) -> Self {
        Self {
            host,
            delegate,
            forwarder,
            handle: None,
        }
    }

    pub fn is_watching(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start_watching(&mut self, restart: bool) -> Result<(), CaptureError> {
        if self.handle.is_some() {
            debug!("media key tap already installed; replacing it");
            self.stop_watching();
        }

        // On a restart the application watcher has already decided
        if !restart {
            self.delegate.update_intercept_media_keys(true);
        }

        let port_slot = Arc::new(OnceLock::new());
        let callback = tap_callback(
            Arc::clone(&self.host),
            Arc::downgrade(&port_slot),
            Arc::clone(&self.delegate),
            Arc::clone(&self.forwarder),
        );

        let port = self
            .host
            .create_tap(EventMask::SYSTEM_DEFINED, callback)
            .ok_or(CaptureError::FilterCreationFailed)?;
        let _ = port_slot.set(port.clone());

        let Some(source) = self.host.create_run_loop_source(&port) else {
            self.host.invalidate_port(&port);
            return Err(CaptureError::SourceCreationFailed);
        };

        let (startup_tx, startup_rx) = mpsc::channel::<H::RunLoop>();
        let host = Arc::clone(&self.host);
        let thread_source = source.clone();
        let spawned = thread::Builder::new()
            .name(RUN_LOOP_THREAD_NAME.to_string())
            .spawn(move || {
                let run_loop = host.current_run_loop();
                host.add_source(&run_loop, &thread_source);
                if startup_tx.send(run_loop.clone()).is_err() {
                    return;
                }
                host.run(&run_loop);
                trace!("media key tap run loop exited");
            });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.host.invalidate_source(&source);
                self.host.invalidate_port(&port);
                return Err(CaptureError::LoopSpawnFailed(e));
            }
        };

        let run_loop = match startup_rx.recv() {
            Ok(run_loop) => run_loop,
            Err(_) => {
                self.host.invalidate_source(&source);
                self.host.invalidate_port(&port);
                if thread.join().is_err() {
                    warn!("media key tap thread panicked during startup");
                }
                return Err(CaptureError::LoopExited);
            }
        };

        self.handle = Some(CaptureHandle {
            port,
            source,
            run_loop,
            thread: Some(thread),
            _port_slot: port_slot,
        });
        info!(restart, "media key tap installed");
        Ok(())
    }

    /// Remove the tap. Safe to call repeatedly or before any start.
    pub fn stop_watching(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };

        self.host.invalidate_source(&handle.source);
        self.host.stop(&handle.run_loop);
        self.host.invalidate_port(&handle.port);

        if let Some(thread) = handle.thread.take() {
            if thread.thread().id() == thread::current().id() {
                warn!("media key tap stopped from its own run loop; not joining");
            } else if thread.join().is_err() {
                warn!("media key tap thread panicked");
            }
        }
        info!("media key tap removed");
    }

    /// Reinstall the tap so it sits in front of taps installed since.
    pub fn restart_tap(&mut self) -> Result<(), CaptureError> {
        self.stop_watching();
        self.start_watching(true)
    }

    /// Enable or disable the live tap from its own run loop.
    pub fn enable_tap(&self, enable: bool) {
        let Some(handle) = &self.handle else {
            trace!(enable, "no media key tap to toggle");
            return;
        };

        let host = Arc::clone(&self.host);
        let port = handle.port.clone();
        self.host
            .perform(&handle.run_loop, Box::new(move || host.tap_enable(&port, enable)));
        // Wake the loop so the toggle lands even while the process is in the background
        self.host.wake_up(&handle.run_loop);
        debug!(enable, "media key tap toggle scheduled");
    }
}

impl<H: EventTapHost> Drop for CaptureLoop<H> {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

fn tap_callback<H: EventTapHost>(
    host: Arc<H>,
    port: Weak<OnceLock<H::Port>>,
    delegate: Arc<dyn CaptureDelegate>,
    forwarder: Arc<dyn Forwarder>,
) -> TapCallback {
    Arc::new(move |event| match event {
        TapEvent::DisabledByTimeout => {
            if let Some(port) = port.upgrade().and_then(|slot| slot.get().cloned()) {
                host.tap_enable(&port, true);
            }
            debug!("media key tap disabled by timeout; re-enabled");
            TapDecision::PassThrough
        }
        TapEvent::DisabledByUserInput => TapDecision::PassThrough,
        TapEvent::Event {
            event_type,
            subtype,
            data1,
        } => {
            if !is_media_key_event(event_type, subtype, data1)
                || !delegate.is_intercepting_media_keys()
            {
                return TapDecision::PassThrough;
            }

            let key_event = KeyEvent::decode(data1);
            let delegate = Arc::clone(&delegate);
            forwarder.forward(Box::new(move || delegate.handle_key_event(key_event)));
            TapDecision::Swallow
        }
    })
}
