// src/core/forwarder.rs
//! Hand-off from the event tap thread to the thread that talks to the host.
//!
//! The tap callback must return quickly, so host delegate calls are queued
//! onto a forwarding context instead of being made inline.

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::warn;

pub type ForwardedJob = Box<dyn FnOnce() + Send + 'static>;

pub trait Forwarder: Send + Sync {
    /// Queue `job` on the forwarding context without blocking the caller.
    fn forward(&self, job: ForwardedJob);
}

/// Forwarder backed by an unbounded channel.
///
/// The host drains the paired [`ForwardingQueue`] on whichever thread should
/// receive media key callbacks, either synchronously or from a tokio task.
#[derive(Clone)]
pub struct ChannelForwarder {
    tx: UnboundedSender<ForwardedJob>,
}

pub struct ForwardingQueue {
    rx: UnboundedReceiver<ForwardedJob>,
}

impl ChannelForwarder {
    pub fn new() -> (Self, ForwardingQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, ForwardingQueue { rx })
    }
}

impl Forwarder for ChannelForwarder {
    fn forward(&self, job: ForwardedJob) {
        if self.tx.send(job).is_err() {
            warn!("forwarding queue closed; dropping media key event");
        }
    }
}

impl ForwardingQueue {
    /// Run every job queued so far and return how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        loop {
            match self.rx.try_recv() {
                Ok(job) => {
                    job();
                    ran += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return ran,
            }
        }
    }

    /// Run jobs until every forwarder has been dropped.
    pub async fn run(mut self) {
        while let Some(job) = self.rx.recv().await {
            job();
        }
    }
}
