// src/core/peer_discovery.rs
//! Announce/reply handshake between processes embedding this library.
//!
//! Other processes using the tap cannot be listed statically, so each process
//! announces its identity when it starts. Receivers whitelist the announcer
//! and reply with their own identity so that the announcer learns about
//! processes that started before it. Replies are never answered.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::{debug, trace};

use crate::core::app_types::ApplicationIdentity;
use crate::core::whitelist::DynamicWhitelist;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerTopic {
    /// Sent once when a process starts its tap
    Announce,
    /// Sent in response to an announce
    Reply,
}

impl PeerTopic {
    pub const ALL: [PeerTopic; 2] = [PeerTopic::Announce, PeerTopic::Reply];

    /// Notification name on the broadcast channel
    pub fn name(self) -> &'static str {
        match self {
            PeerTopic::Announce => "MediaKeyTapDidStart",
            PeerTopic::Reply => "MediaKeyTapReply",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|topic| topic.name() == name)
    }
}

impl fmt::Display for PeerTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub trait PeerObserver: Send + Sync {
    fn on_peer_message(&self, topic: PeerTopic, sender: ApplicationIdentity);
}

/// Process-wide broadcast channel.
///
/// Implementations should request immediate delivery so that backgrounded
/// peers react without waiting to be foregrounded.
pub trait PeerBroadcast: Send + Sync {
    fn post(&self, topic: PeerTopic, sender: &ApplicationIdentity);

    fn observe(&self, observer: Arc<dyn PeerObserver>);

    fn remove_observer(&self);
}

pub struct PeerDiscovery {
    own_identity: Option<ApplicationIdentity>,
    broadcast: Arc<dyn PeerBroadcast>,
    dynamic: DynamicWhitelist,
    listening: AtomicBool,
}

impl PeerDiscovery {
    pub fn new(
        own_identity: Option<ApplicationIdentity>,
        broadcast: Arc<dyn PeerBroadcast>,
        dynamic: DynamicWhitelist,
    ) -> Arc<Self> {
        Arc::new(Self {
            own_identity,
            broadcast,
            dynamic,
            listening: AtomicBool::new(false),
        })
    }

    pub fn start(self: &Arc<Self>) {
        self.listen();
        self.announce();
    }

    pub fn listen(self: &Arc<Self>) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }
        self.broadcast.observe(Arc::new(DiscoveryObserver {
            discovery: Arc::downgrade(self),
        }));
    }

    pub fn announce(&self) {
        match &self.own_identity {
            Some(own) => {
                debug!(%own, "announcing media key tap");
                self.broadcast.post(PeerTopic::Announce, own);
            }
            None => debug!("no bundle identifier; peers cannot learn about this process"),
        }
    }

    pub fn stop(&self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            self.broadcast.remove_observer();
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    pub fn peers(&self) -> Vec<ApplicationIdentity> {
        self.dynamic.snapshot()
    }

    pub fn handle_message(&self, topic: PeerTopic, sender: ApplicationIdentity) {
        if !self.is_listening() || self.own_identity.as_ref() == Some(&sender) {
            return;
        }

        if self.dynamic.insert(sender.clone()) {
            debug!(peer = %sender, %topic, "discovered media key tap peer");
        } else {
            trace!(peer = %sender, %topic, "known peer");
        }

        // Only announces are answered; answering replies would loop forever.
        if topic == PeerTopic::Announce {
            if let Some(own) = &self.own_identity {
                self.broadcast.post(PeerTopic::Reply, own);
            }
        }
    }
}

impl Drop for PeerDiscovery {
    fn drop(&mut self) {
        self.stop();
    }
}

struct DiscoveryObserver {
    discovery: Weak<PeerDiscovery>,
}

impl PeerObserver for DiscoveryObserver {
    fn on_peer_message(&self, topic: PeerTopic, sender: ApplicationIdentity) {
        if let Some(discovery) = self.discovery.upgrade() {
            discovery.handle_message(topic, sender);
        }
    }
}
