// src/platform/macos/distributed.rs
//! Peer broadcast over NSDistributedNotificationCenter
//!
//! Posts carry the sender's identity as the notification object. Delivery is
//! immediate so a backgrounded peer can give up the keys as soon as another
//! tap starts.

use std::sync::{Arc, Mutex};

use objc2::rc::Retained;
use objc2::runtime::AnyObject;
use objc2::{class, define_class, msg_send, sel, AnyThread, DefinedClass};
use objc2_foundation::{NSNotification, NSObject, NSObjectProtocol, NSString};
use tracing::{debug, trace};

use crate::core::app_types::ApplicationIdentity;
use crate::core::peer_discovery::{PeerBroadcast, PeerObserver, PeerTopic};

/// NSNotificationSuspensionBehaviorDeliverImmediately
const DELIVER_IMMEDIATELY: usize = 4;

pub struct PeerIvars {
    observer: Arc<dyn PeerObserver>,
}

define_class!(
    #[unsafe(super(NSObject))]
    #[name = "MKTDistributedPeerTarget"]
    #[ivars = PeerIvars]
    pub struct DistributedPeerTarget;

    unsafe impl NSObjectProtocol for DistributedPeerTarget {}

    impl DistributedPeerTarget {
        #[unsafe(method(peerNotification:))]
        fn peer_notification(&self, notification: &NSNotification) {
            self.dispatch(notification);
        }
    }
);

impl DistributedPeerTarget {
    fn new(observer: Arc<dyn PeerObserver>) -> Retained<Self> {
        let this = Self::alloc().set_ivars(PeerIvars { observer });
        unsafe { msg_send![super(this), init] }
    }

    fn dispatch(&self, notification: &NSNotification) {
        let name = unsafe { notification.name() }.to_string();
        let Some(topic) = PeerTopic::from_name(&name) else {
            trace!(%name, "unexpected distributed notification");
            return;
        };
        let sender = unsafe { notification.object() }
            .and_then(|object| object.downcast::<NSString>().ok());
        match sender {
            Some(sender) => self
                .ivars()
                .observer
                .on_peer_message(topic, ApplicationIdentity::new(sender.to_string())),
            None => trace!(%topic, "peer notification without a sender identity"),
        }
    }
}

struct Registration(Retained<DistributedPeerTarget>);

// SAFETY: the target is only handed to the distributed notification center,
// whose add/remove observer methods are thread-safe.
unsafe impl Send for Registration {}

/// Observers are called on the thread that registered them, which must run
/// its run loop.
#[derive(Default)]
pub struct DistributedBroadcast {
    registration: Mutex<Option<Registration>>,
}

impl DistributedBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    fn center() -> Retained<AnyObject> {
        unsafe { msg_send![class!(NSDistributedNotificationCenter), defaultCenter] }
    }
}

impl PeerBroadcast for DistributedBroadcast {
    fn post(&self, topic: PeerTopic, sender: &ApplicationIdentity) {
        let center = Self::center();
        let name = NSString::from_str(topic.name());
        let object = NSString::from_str(sender.as_str());
        unsafe {
            let _: () = msg_send![
                &*center,
                postNotificationName: &*name,
                object: &*object,
                userInfo: std::ptr::null::<NSObject>(),
                deliverImmediately: true
            ];
        }
        debug!(%topic, %sender, "posted peer notification");
    }

    fn observe(&self, observer: Arc<dyn PeerObserver>) {
        self.remove_observer();

        let target = DistributedPeerTarget::new(observer);
        let center = Self::center();
        for topic in PeerTopic::ALL {
            let name = NSString::from_str(topic.name());
            unsafe {
                let _: () = msg_send![
                    &*center,
                    addObserver: &*target,
                    selector: sel!(peerNotification:),
                    name: &*name,
                    object: std::ptr::null::<NSObject>(),
                    suspensionBehavior: DELIVER_IMMEDIATELY
                ];
            }
        }

        *self
            .registration
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Registration(target));
    }

    fn remove_observer(&self) {
        let registration = self
            .registration
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(Registration(target)) = registration {
            let center = Self::center();
            unsafe {
                let _: () = msg_send![&*center, removeObserver: &*target];
            }
        }
    }
}

impl Drop for DistributedBroadcast {
    fn drop(&mut self) {
        self.remove_observer();
    }
}
