// src/platform/macos/main_queue.rs
use dispatch::Queue;

use crate::core::forwarder::{ForwardedJob, Forwarder};

/// Delivers key events on the main dispatch queue, like AppKit callbacks.
#[derive(Debug, Default, Clone, Copy)]
pub struct MainQueueForwarder;

impl Forwarder for MainQueueForwarder {
    fn forward(&self, job: ForwardedJob) {
        Queue::main().exec_async(job);
    }
}
