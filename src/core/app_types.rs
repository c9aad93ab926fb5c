// src/core/app_types.rs
//! Common types and traits for application lifecycle tracking

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Stable identifier of an application (its bundle identifier)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationIdentity(String);

impl ApplicationIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ApplicationIdentity {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ApplicationIdentity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A running process as reported by the lifecycle collaborator.
///
/// Two values are the same application iff they refer to the same process,
/// regardless of the bundle identifier they carry.
#[derive(Debug, Clone)]
pub struct RunningApplication {
    pub pid: libc::pid_t,
    pub bundle_identifier: Option<ApplicationIdentity>,
}

impl RunningApplication {
    pub fn new(pid: libc::pid_t, bundle_identifier: Option<ApplicationIdentity>) -> Self {
        Self {
            pid,
            bundle_identifier,
        }
    }
}

impl PartialEq for RunningApplication {
    fn eq(&self, other: &Self) -> bool {
        self.pid == other.pid
    }
}

impl Eq for RunningApplication {}

impl Hash for RunningApplication {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pid.hash(state);
    }
}

impl fmt::Display for RunningApplication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.bundle_identifier {
            Some(id) => write!(f, "{} (pid: {})", id, self.pid),
            None => write!(f, "<unbundled> (pid: {})", self.pid),
        }
    }
}

/// Process lifecycle facts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Launched(RunningApplication),
    Activated(RunningApplication),
    Terminated(RunningApplication),
}

impl LifecycleEvent {
    pub fn application(&self) -> &RunningApplication {
        match self {
            LifecycleEvent::Launched(app)
            | LifecycleEvent::Activated(app)
            | LifecycleEvent::Terminated(app) => app,
        }
    }
}

/// Receives lifecycle facts from an [`ApplicationLifecycle`] source
pub trait LifecycleObserver: Send + Sync {
    fn on_lifecycle_event(&self, event: LifecycleEvent);
}

/// Source of launch/activate/terminate notifications.
///
/// A source delivers to at most one observer at a time.
pub trait ApplicationLifecycle: Send + Sync {
    fn subscribe(&self, observer: Arc<dyn LifecycleObserver>);

    fn unsubscribe(&self);
}
