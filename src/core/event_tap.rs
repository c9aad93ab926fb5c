// src/core/event_tap.rs
//! Low-level key filter seam
//!
//! [`EventTapHost`] abstracts the operating system pieces a media key tap is
//! built from: the filter port itself, the run loop source that wakes the
//! dedicated thread, and that thread's run loop. The capture loop drives the
//! host; the host never calls back into the capture loop except through the
//! [`TapCallback`] it was given.

use std::sync::Arc;

use crate::core::key_event::NX_SYSDEFINED;

bitflags::bitflags! {
    /// Event categories a tap is interested in (`CGEventMask`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventMask: u64 {
        const SYSTEM_DEFINED = 1 << NX_SYSDEFINED;
    }
}

/// A raw event as seen by the tap callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapEvent {
    /// The host disabled the tap because a callback took too long
    DisabledByTimeout,
    /// The host disabled the tap because of user input (secure input fields)
    DisabledByUserInput,
    Event {
        event_type: u32,
        /// Only meaningful for system-defined events, zero otherwise
        subtype: i16,
        /// Packed payload of system-defined events, zero otherwise
        data1: i64,
    },
}

/// What the host should do with the raw event after the callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapDecision {
    PassThrough,
    /// Consume the event so no other application sees it
    Swallow,
}

pub type TapCallback = Arc<dyn Fn(TapEvent) -> TapDecision + Send + Sync + 'static>;

pub type RunLoopJob = Box<dyn FnOnce() + Send + 'static>;

pub trait EventTapHost: Send + Sync + 'static {
    /// The installed filter (`CFMachPort`)
    type Port: Clone + Send + Sync + 'static;
    /// Source attaching the port to a run loop (`CFRunLoopSource`)
    type Source: Clone + Send + Sync + 'static;
    /// Handle to a thread's run loop (`CFRunLoop`)
    type RunLoop: Clone + Send + Sync + 'static;

    /// Install an active filter for `mask`, enabled on creation. `None` when refused.
    fn create_tap(&self, mask: EventMask, callback: TapCallback) -> Option<Self::Port>;

    fn create_run_loop_source(&self, port: &Self::Port) -> Option<Self::Source>;

    /// The run loop of the calling thread.
    fn current_run_loop(&self) -> Self::RunLoop;

    fn add_source(&self, run_loop: &Self::RunLoop, source: &Self::Source);

    /// Run the calling thread's loop until [`EventTapHost::stop`] is called.
    fn run(&self, run_loop: &Self::RunLoop);

    fn tap_enable(&self, port: &Self::Port, enable: bool);

    /// Schedule `job` to run on `run_loop`'s thread.
    fn perform(&self, run_loop: &Self::RunLoop, job: RunLoopJob);

    fn wake_up(&self, run_loop: &Self::RunLoop);

    fn invalidate_source(&self, source: &Self::Source);

    fn stop(&self, run_loop: &Self::RunLoop);

    fn invalidate_port(&self, port: &Self::Port);
}
