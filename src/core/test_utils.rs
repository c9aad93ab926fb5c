// src/core/test_utils.rs
//! In-memory collaborators shared by the unit tests.
//!
//! The fake event tap host runs a real dedicated thread per run loop so that
//! tests observe the same threading as the macOS host: jobs only run after a
//! wake-up, and callbacks execute on the loop thread.

#![cfg(test)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread;

use crate::core::app_types::{
    ApplicationIdentity, ApplicationLifecycle, LifecycleEvent, LifecycleObserver,
    RunningApplication,
};
use crate::core::app_watcher::WatcherDelegate;
use crate::core::capture_loop::CaptureDelegate;
use crate::core::error::CaptureError;
use crate::core::event_tap::{
    EventMask, EventTapHost, RunLoopJob, TapCallback, TapDecision, TapEvent,
};
use crate::core::key_event::{KeyEvent, MediaKey};
use crate::core::media_key_tap::MediaKeyTapDelegate;
use crate::core::peer_discovery::{PeerBroadcast, PeerObserver, PeerTopic};

pub fn app(pid: i32, bundle_id: &str) -> RunningApplication {
    RunningApplication::new(pid, Some(bundle_id.into()))
}

// --- Lifecycle ----------------------------------------------------------------

#[derive(Default)]
pub struct FakeLifecycle {
    observer: Mutex<Option<Arc<dyn LifecycleObserver>>>,
}

impl FakeLifecycle {
    pub fn emit(&self, event: LifecycleEvent) {
        let observer = self.observer.lock().unwrap().clone();
        if let Some(observer) = observer {
            observer.on_lifecycle_event(event);
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.observer.lock().unwrap().is_some()
    }
}

impl ApplicationLifecycle for FakeLifecycle {
    fn subscribe(&self, observer: Arc<dyn LifecycleObserver>) {
        *self.observer.lock().unwrap() = Some(observer);
    }

    fn unsubscribe(&self) {
        self.observer.lock().unwrap().take();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherCall {
    Active(bool),
    WhitelistedAppStarted,
}

#[derive(Default)]
pub struct RecordingWatcherDelegate {
    calls: Mutex<Vec<WatcherCall>>,
}

impl RecordingWatcherDelegate {
    pub fn calls(&self) -> Vec<WatcherCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl WatcherDelegate for RecordingWatcherDelegate {
    fn update_is_active_media_app(&self, active: bool) {
        self.calls.lock().unwrap().push(WatcherCall::Active(active));
    }

    fn whitelisted_app_started(&self) {
        self.calls.lock().unwrap().push(WatcherCall::WhitelistedAppStarted);
    }
}

// --- Peer broadcast -----------------------------------------------------------

type ObserverSlot = Arc<Mutex<Option<Arc<dyn PeerObserver>>>>;

#[derive(Default)]
struct BusInner {
    queue: Mutex<VecDeque<(PeerTopic, ApplicationIdentity)>>,
    posted: Mutex<Vec<(PeerTopic, ApplicationIdentity)>>,
    endpoints: Mutex<Vec<ObserverSlot>>,
}

/// Broadcast bus that queues posts until [`LoopbackBus::pump`] delivers them
/// to every endpoint, the sender's included.
#[derive(Clone, Default)]
pub struct LoopbackBus {
    inner: Arc<BusInner>,
}

pub struct BusEndpoint {
    bus: Arc<BusInner>,
    slot: ObserverSlot,
}

impl LoopbackBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(&self) -> BusEndpoint {
        let slot: ObserverSlot = Arc::new(Mutex::new(None));
        self.inner.endpoints.lock().unwrap().push(slot.clone());
        BusEndpoint {
            bus: self.inner.clone(),
            slot,
        }
    }

    pub fn pump(&self) {
        loop {
            let next = self.inner.queue.lock().unwrap().pop_front();
            let Some((topic, sender)) = next else {
                return;
            };
            let observers: Vec<_> = self
                .inner
                .endpoints
                .lock()
                .unwrap()
                .iter()
                .filter_map(|slot| slot.lock().unwrap().clone())
                .collect();
            for observer in observers {
                observer.on_peer_message(topic, sender.clone());
            }
        }
    }

    pub fn posted(&self) -> Vec<(PeerTopic, ApplicationIdentity)> {
        self.inner.posted.lock().unwrap().clone()
    }
}

impl PeerBroadcast for BusEndpoint {
    fn post(&self, topic: PeerTopic, sender: &ApplicationIdentity) {
        self.bus
            .posted
            .lock()
            .unwrap()
            .push((topic, sender.clone()));
        self.bus
            .queue
            .lock()
            .unwrap()
            .push_back((topic, sender.clone()));
    }

    fn observe(&self, observer: Arc<dyn PeerObserver>) {
        *self.slot.lock().unwrap() = Some(observer);
    }

    fn remove_observer(&self) {
        self.slot.lock().unwrap().take();
    }
}

// --- Event tap host -----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    CreateTap,
    CreateSource,
    AddSource,
    Enable(bool),
    Perform,
    WakeUp,
    InvalidateSource,
    StopLoop,
    InvalidatePort,
}

pub struct FakePort {
    callback: TapCallback,
    enabled: AtomicBool,
    valid: AtomicBool,
}

#[derive(Clone)]
pub struct FakeSource(Arc<AtomicBool>);

#[derive(Default)]
struct LoopState {
    jobs: VecDeque<RunLoopJob>,
    stopped: bool,
}

#[derive(Default)]
pub struct FakeRunLoop {
    state: Mutex<LoopState>,
    wake: Condvar,
}

impl FakeRunLoop {
    fn schedule(&self, job: RunLoopJob) {
        self.state.lock().unwrap().jobs.push_back(job);
        self.wake.notify_all();
    }
}

#[derive(Default)]
struct HostState {
    ports: Vec<Arc<FakePort>>,
    loops: Vec<Arc<FakeRunLoop>>,
    calls: Vec<HostCall>,
    enable_threads: Vec<String>,
    loop_thread_name: Option<String>,
}

#[derive(Default)]
pub struct FakeTapHost {
    refuse_tap: AtomicBool,
    refuse_source: AtomicBool,
    crash_loop: AtomicBool,
    state: Mutex<HostState>,
}

impl FakeTapHost {
    pub fn refusing_tap() -> Self {
        let host = Self::default();
        host.set_refuse_tap(true);
        host
    }

    pub fn refusing_source() -> Self {
        let host = Self::default();
        host.refuse_source.store(true, Ordering::SeqCst);
        host
    }

    /// The run loop thread dies before it reports its run loop.
    pub fn crashing_loop() -> Self {
        let host = Self::default();
        host.crash_loop.store(true, Ordering::SeqCst);
        host
    }

    pub fn set_refuse_tap(&self, refuse: bool) {
        self.refuse_tap.store(refuse, Ordering::SeqCst);
    }

    fn record(&self, call: HostCall) {
        self.state.lock().unwrap().calls.push(call);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn created_ports(&self) -> usize {
        self.state.lock().unwrap().ports.len()
    }

    pub fn live_ports(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .ports
            .iter()
            .filter(|p| p.valid.load(Ordering::SeqCst))
            .count()
    }

    pub fn enable_threads(&self) -> Vec<String> {
        self.state.lock().unwrap().enable_threads.clone()
    }

    pub fn loop_thread_name(&self) -> Option<String> {
        self.state.lock().unwrap().loop_thread_name.clone()
    }

    fn current_port(&self) -> Option<Arc<FakePort>> {
        self.state
            .lock()
            .unwrap()
            .ports
            .iter()
            .rev()
            .find(|p| p.valid.load(Ordering::SeqCst))
            .cloned()
    }

    pub fn current_port_enabled(&self) -> Option<bool> {
        self.current_port().map(|p| p.enabled.load(Ordering::SeqCst))
    }

    pub fn set_current_port_enabled(&self, enabled: bool) {
        if let Some(port) = self.current_port() {
            port.enabled.store(enabled, Ordering::SeqCst);
        }
    }

    fn current_loop(&self) -> Option<Arc<FakeRunLoop>> {
        self.state.lock().unwrap().loops.last().cloned()
    }

    /// Run the live tap's callback on its run loop thread and return its decision.
    pub fn deliver(&self, event: TapEvent) -> TapDecision {
        let port = self.current_port().expect("no live tap");
        let Some(run_loop) = self.current_loop() else {
            return (port.callback)(event);
        };
        let (tx, rx) = mpsc::channel();
        let callback = port.callback.clone();
        run_loop.schedule(Box::new(move || {
            let _ = tx.send(callback(event));
        }));
        rx.recv().expect("run loop stopped before delivering the event")
    }

    /// Wait until every job scheduled on the current run loop so far has run.
    pub fn sync(&self) {
        let Some(run_loop) = self.current_loop() else {
            return;
        };
        let (tx, rx) = mpsc::channel();
        run_loop.schedule(Box::new(move || {
            let _ = tx.send(());
        }));
        rx.recv().expect("run loop stopped before syncing");
    }
}

impl EventTapHost for FakeTapHost {
    type Port = Arc<FakePort>;
    type Source = FakeSource;
    type RunLoop = Arc<FakeRunLoop>;

    fn create_tap(&self, mask: EventMask, callback: TapCallback) -> Option<Self::Port> {
        assert_eq!(mask, EventMask::SYSTEM_DEFINED);
        self.record(HostCall::CreateTap);
        if self.refuse_tap.load(Ordering::SeqCst) {
            return None;
        }
        let port = Arc::new(FakePort {
            callback,
            enabled: AtomicBool::new(true),
            valid: AtomicBool::new(true),
        });
        self.state.lock().unwrap().ports.push(port.clone());
        Some(port)
    }

    fn create_run_loop_source(&self, _port: &Self::Port) -> Option<Self::Source> {
        self.record(HostCall::CreateSource);
        if self.refuse_source.load(Ordering::SeqCst) {
            return None;
        }
        Some(FakeSource(Arc::new(AtomicBool::new(true))))
    }

    fn current_run_loop(&self) -> Self::RunLoop {
        let run_loop = Arc::new(FakeRunLoop::default());
        let mut state = self.state.lock().unwrap();
        state.loops.push(run_loop.clone());
        state.loop_thread_name = thread::current().name().map(str::to_string);
        run_loop
    }

    fn add_source(&self, _run_loop: &Self::RunLoop, source: &Self::Source) {
        assert!(source.0.load(Ordering::SeqCst));
        self.record(HostCall::AddSource);
        if self.crash_loop.load(Ordering::SeqCst) {
            panic!("run loop thread crashed");
        }
    }

    fn run(&self, run_loop: &Self::RunLoop) {
        loop {
            let job = {
                let mut state = run_loop.state.lock().unwrap();
                loop {
                    if state.stopped {
                        return;
                    }
                    if let Some(job) = state.jobs.pop_front() {
                        break job;
                    }
                    state = run_loop.wake.wait(state).unwrap();
                }
            };
            job();
        }
    }

    fn tap_enable(&self, port: &Self::Port, enable: bool) {
        port.enabled.store(enable, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.calls.push(HostCall::Enable(enable));
        state
            .enable_threads
            .push(thread::current().name().unwrap_or("<unnamed>").to_string());
    }

    fn perform(&self, run_loop: &Self::RunLoop, job: RunLoopJob) {
        self.record(HostCall::Perform);
        // Queued only; the loop notices it on the next wake-up
        run_loop.state.lock().unwrap().jobs.push_back(job);
    }

    fn wake_up(&self, run_loop: &Self::RunLoop) {
        self.record(HostCall::WakeUp);
        run_loop.wake.notify_all();
    }

    fn invalidate_source(&self, source: &Self::Source) {
        source.0.store(false, Ordering::SeqCst);
        self.record(HostCall::InvalidateSource);
    }

    fn stop(&self, run_loop: &Self::RunLoop) {
        self.record(HostCall::StopLoop);
        run_loop.state.lock().unwrap().stopped = true;
        run_loop.wake.notify_all();
    }

    fn invalidate_port(&self, port: &Self::Port) {
        port.valid.store(false, Ordering::SeqCst);
        self.record(HostCall::InvalidatePort);
    }
}

// --- Delegates ----------------------------------------------------------------

#[derive(Default)]
pub struct RecordingCaptureDelegate {
    intercepting: AtomicBool,
    updates: Mutex<Vec<bool>>,
    events: Mutex<Vec<KeyEvent>>,
}

impl RecordingCaptureDelegate {
    pub fn set_intercepting(&self, intercepting: bool) {
        self.intercepting.store(intercepting, Ordering::SeqCst);
    }

    pub fn intercept_updates(&self) -> Vec<bool> {
        self.updates.lock().unwrap().clone()
    }

    pub fn key_events(&self) -> Vec<KeyEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl CaptureDelegate for RecordingCaptureDelegate {
    fn update_intercept_media_keys(&self, intercept: bool) {
        self.intercepting.store(intercept, Ordering::SeqCst);
        self.updates.lock().unwrap().push(intercept);
    }

    fn handle_key_event(&self, event: KeyEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn is_intercepting_media_keys(&self) -> bool {
        self.intercepting.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapCall {
    MediaKey(MediaKey, bool),
    ActiveChanged(bool),
    WhitelistedAppStarted,
    TapFailed(String),
}

#[derive(Default)]
pub struct RecordingTapDelegate {
    calls: Mutex<Vec<TapCall>>,
}

impl RecordingTapDelegate {
    pub fn calls(&self) -> Vec<TapCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn media_keys(&self) -> Vec<(MediaKey, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TapCall::MediaKey(key, pressed) => Some((key, pressed)),
                _ => None,
            })
            .collect()
    }
}

impl MediaKeyTapDelegate for RecordingTapDelegate {
    fn on_media_key(&self, key: MediaKey, event: KeyEvent) {
        self.calls
            .lock()
            .unwrap()
            .push(TapCall::MediaKey(key, event.pressed));
    }

    fn on_active_state_changed(&self, active: bool) {
        self.calls.lock().unwrap().push(TapCall::ActiveChanged(active));
    }

    fn on_whitelisted_app_started(&self) {
        self.calls.lock().unwrap().push(TapCall::WhitelistedAppStarted);
    }

    fn on_tap_failed(&self, error: &CaptureError) {
        self.calls
            .lock()
            .unwrap()
            .push(TapCall::TapFailed(error.to_string()));
    }
}
