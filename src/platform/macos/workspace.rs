// src/platform/macos/workspace.rs
//! Application lifecycle from NSWorkspace notifications

use std::sync::{Arc, Mutex};

use objc2::rc::Retained;
use objc2::{define_class, msg_send, sel, AnyThread, DefinedClass};
use objc2_app_kit::{NSRunningApplication, NSWorkspace};
use objc2_foundation::{NSNotification, NSNotificationCenter, NSObject, NSObjectProtocol, NSString};
use tracing::{debug, trace};

use crate::core::app_types::{
    ApplicationIdentity, ApplicationLifecycle, LifecycleEvent, LifecycleObserver,
    RunningApplication,
};

const WORKSPACE_DID_LAUNCH_APP: &str = "NSWorkspaceDidLaunchApplicationNotification";
const WORKSPACE_DID_ACTIVATE_APP: &str = "NSWorkspaceDidActivateApplicationNotification";
const WORKSPACE_DID_TERMINATE_APP: &str = "NSWorkspaceDidTerminateApplicationNotification";

pub struct LifecycleIvars {
    observer: Arc<dyn LifecycleObserver>,
}

define_class!(
    #[unsafe(super(NSObject))]
    #[name = "MKTWorkspaceLifecycleTarget"]
    #[ivars = LifecycleIvars]
    pub struct WorkspaceLifecycleTarget;

    unsafe impl NSObjectProtocol for WorkspaceLifecycleTarget {}

    impl WorkspaceLifecycleTarget {
        #[unsafe(method(applicationLaunched:))]
        fn application_launched(&self, notification: &NSNotification) {
            self.dispatch(notification, LifecycleEvent::Launched);
        }

        #[unsafe(method(applicationActivated:))]
        fn application_activated(&self, notification: &NSNotification) {
            self.dispatch(notification, LifecycleEvent::Activated);
        }

        #[unsafe(method(applicationTerminated:))]
        fn application_terminated(&self, notification: &NSNotification) {
            self.dispatch(notification, LifecycleEvent::Terminated);
        }
    }
);

impl WorkspaceLifecycleTarget {
    fn new(observer: Arc<dyn LifecycleObserver>) -> Retained<Self> {
        let this = Self::alloc().set_ivars(LifecycleIvars { observer });
        unsafe { msg_send![super(this), init] }
    }

    fn dispatch(
        &self,
        notification: &NSNotification,
        make_event: fn(RunningApplication) -> LifecycleEvent,
    ) {
        let Some(app) = app_from_notification(notification) else {
            trace!("workspace notification without an application");
            return;
        };
        self.ivars().observer.on_lifecycle_event(make_event(app));
    }
}

fn app_from_notification(notification: &NSNotification) -> Option<RunningApplication> {
    let user_info = unsafe { notification.userInfo() }?;
    let key = NSString::from_str("NSWorkspaceApplicationKey");
    let app_obj = user_info.objectForKey(&key)?;
    let app = app_obj.downcast::<NSRunningApplication>().ok()?;
    Some(running_application(&app))
}

pub(crate) fn running_application(app: &NSRunningApplication) -> RunningApplication {
    let pid = unsafe { app.processIdentifier() };
    let bundle_identifier =
        unsafe { app.bundleIdentifier() }.map(|id| ApplicationIdentity::new(id.to_string()));
    RunningApplication::new(pid, bundle_identifier)
}

struct Registration(Retained<WorkspaceLifecycleTarget>);

// SAFETY: the target is only handed to NSNotificationCenter, whose
// add/remove observer methods are thread-safe.
unsafe impl Send for Registration {}

/// Launch, activation and termination of applications in this login session.
///
/// Notifications are delivered on the main thread, so the host must run the
/// main run loop.
#[derive(Default)]
pub struct WorkspaceLifecycle {
    registration: Mutex<Option<Registration>>,
}

impl WorkspaceLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    fn notification_center() -> Retained<NSNotificationCenter> {
        let workspace = unsafe { NSWorkspace::sharedWorkspace() };
        unsafe { workspace.notificationCenter() }
    }

    unsafe fn register_notification(
        nc: &NSNotificationCenter,
        target: &WorkspaceLifecycleTarget,
        selector: objc2::runtime::Sel,
        name: &str,
    ) {
        let notification_name = NSString::from_str(name);
        let _: () = msg_send![
            nc,
            addObserver: target,
            selector: selector,
            name: &*notification_name,
            object: std::ptr::null::<NSObject>()
        ];
    }
}

impl ApplicationLifecycle for WorkspaceLifecycle {
    fn subscribe(&self, observer: Arc<dyn LifecycleObserver>) {
        self.unsubscribe();

        let target = WorkspaceLifecycleTarget::new(observer);
        let nc = Self::notification_center();
        unsafe {
            Self::register_notification(
                &nc,
                &target,
                sel!(applicationLaunched:),
                WORKSPACE_DID_LAUNCH_APP,
            );
            Self::register_notification(
                &nc,
                &target,
                sel!(applicationActivated:),
                WORKSPACE_DID_ACTIVATE_APP,
            );
            Self::register_notification(
                &nc,
                &target,
                sel!(applicationTerminated:),
                WORKSPACE_DID_TERMINATE_APP,
            );
        }

        *self
            .registration
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Registration(target));
        debug!("subscribed to workspace application notifications");
    }

    fn unsubscribe(&self) {
        let registration = self
            .registration
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(Registration(target)) = registration {
            let nc = Self::notification_center();
            unsafe {
                let _: () = msg_send![&*nc, removeObserver: &*target];
            }
            debug!("unsubscribed from workspace application notifications");
        }
    }
}

impl Drop for WorkspaceLifecycle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
