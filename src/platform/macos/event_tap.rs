// src/platform/macos/event_tap.rs
//! Quartz event tap host
//!
//! Raw `CGEventTapCreate` binding for the system-defined event stream plus the
//! CoreFoundation run loop plumbing the capture loop drives.

#![allow(non_upper_case_globals)]

use std::os::raw::c_void;
use std::ptr;
use std::sync::{Arc, Mutex};

use block2::{Block, RcBlock};
use core_foundation::base::TCFType;
use core_foundation::mach_port::{CFMachPort, CFMachPortRef};
use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop, CFRunLoopRef, CFRunLoopSource};
use core_foundation_sys::base::CFTypeRef;
use core_foundation_sys::mach_port::CFMachPortInvalidate;
use core_foundation_sys::runloop::{CFRunLoopSourceInvalidate, CFRunLoopWakeUp};
use objc2::rc::autoreleasepool;
use objc2_app_kit::NSEvent;
use objc2_core_graphics::CGEvent;
use tracing::{debug, warn};

use crate::core::event_tap::{
    EventMask, EventTapHost, RunLoopJob, TapCallback, TapDecision, TapEvent,
};
use crate::core::key_event::NX_SYSDEFINED;

type CGEventRef = *mut c_void;
type CGEventMask = u64;
type CGEventTapProxy = *mut c_void;
type CGEventType = u32;

#[repr(u32)]
#[derive(Copy, Clone)]
enum CGEventTapLocation {
    kCGSessionEventTap = 1,
}

#[repr(u32)]
#[derive(Copy, Clone)]
enum CGEventTapPlacement {
    kCGHeadInsertEventTap = 0,
}

const kCGEventTapOptionDefault: u32 = 0x00000000;

const kCGEventTapDisabledByTimeout: CGEventType = 0xFFFF_FFFE;
const kCGEventTapDisabledByUserInput: CGEventType = 0xFFFF_FFFF;

type TapTrampoline =
    extern "C" fn(CGEventTapProxy, CGEventType, CGEventRef, *mut c_void) -> CGEventRef;

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventTapCreate(
        tap: CGEventTapLocation,
        place: CGEventTapPlacement,
        options: u32,
        eventsOfInterest: CGEventMask,
        callback: TapTrampoline,
        userInfo: *mut c_void,
    ) -> CFMachPortRef;

    fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFRunLoopPerformBlock(rl: CFRunLoopRef, mode: CFTypeRef, block: &Block<dyn Fn()>);
}

/// Handed to the tap as its `userInfo`; freed when the port is released.
struct TapContext {
    callback: TapCallback,
}

struct PortInner {
    port: CFMachPort,
    context: *mut TapContext,
}

impl Drop for PortInner {
    fn drop(&mut self) {
        unsafe {
            CFMachPortInvalidate(self.port.as_concrete_TypeRef());
            drop(Box::from_raw(self.context));
        }
    }
}

#[derive(Clone)]
pub struct MacTapPort(Arc<PortInner>);

#[derive(Clone)]
pub struct MacRunLoopSource(CFRunLoopSource);

#[derive(Clone)]
pub struct MacRunLoop(CFRunLoop);

// SAFETY: CFMachPort, CFRunLoopSource and CFRunLoop references may be used
// from any thread; run loop mutation goes through CFRunLoopPerformBlock or
// the thread-safe CFRunLoopStop/CFRunLoopWakeUp.
unsafe impl Send for MacTapPort {}
unsafe impl Sync for MacTapPort {}
unsafe impl Send for MacRunLoopSource {}
unsafe impl Sync for MacRunLoopSource {}
unsafe impl Send for MacRunLoop {}
unsafe impl Sync for MacRunLoop {}

/// Session-level, head-inserted, active (swallowing) event taps.
#[derive(Debug, Default)]
pub struct MacTapHost;

impl EventTapHost for MacTapHost {
    type Port = MacTapPort;
    type Source = MacRunLoopSource;
    type RunLoop = MacRunLoop;

    fn create_tap(&self, mask: EventMask, callback: TapCallback) -> Option<Self::Port> {
        let context = Box::into_raw(Box::new(TapContext { callback }));
        let raw = unsafe {
            CGEventTapCreate(
                CGEventTapLocation::kCGSessionEventTap,
                CGEventTapPlacement::kCGHeadInsertEventTap,
                kCGEventTapOptionDefault,
                mask.bits(),
                tap_trampoline,
                context.cast(),
            )
        };
        if raw.is_null() {
            warn!("CGEventTapCreate returned null; is input monitoring allowed?");
            unsafe { drop(Box::from_raw(context)) };
            return None;
        }

        let port = unsafe { CFMachPort::wrap_under_create_rule(raw) };
        Some(MacTapPort(Arc::new(PortInner { port, context })))
    }

    fn create_run_loop_source(&self, port: &Self::Port) -> Option<Self::Source> {
        port.0.port.create_runloop_source(0).ok().map(MacRunLoopSource)
    }

    fn current_run_loop(&self) -> Self::RunLoop {
        MacRunLoop(CFRunLoop::get_current())
    }

    fn add_source(&self, run_loop: &Self::RunLoop, source: &Self::Source) {
        run_loop
            .0
            .add_source(&source.0, unsafe { kCFRunLoopCommonModes });
    }

    fn run(&self, _run_loop: &Self::RunLoop) {
        CFRunLoop::run_current();
    }

    fn tap_enable(&self, port: &Self::Port, enable: bool) {
        unsafe { CGEventTapEnable(port.0.port.as_concrete_TypeRef(), enable) };
    }

    fn perform(&self, run_loop: &Self::RunLoop, job: RunLoopJob) {
        let job = Mutex::new(Some(job));
        let block = RcBlock::new(move || {
            let job = job
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            if let Some(job) = job {
                job();
            }
        });
        unsafe {
            CFRunLoopPerformBlock(
                run_loop.0.as_concrete_TypeRef(),
                kCFRunLoopCommonModes as CFTypeRef,
                &block,
            );
        }
    }

    fn wake_up(&self, run_loop: &Self::RunLoop) {
        unsafe { CFRunLoopWakeUp(run_loop.0.as_concrete_TypeRef()) };
    }

    fn invalidate_source(&self, source: &Self::Source) {
        unsafe { CFRunLoopSourceInvalidate(source.0.as_concrete_TypeRef()) };
    }

    fn stop(&self, run_loop: &Self::RunLoop) {
        run_loop.0.stop();
    }

    fn invalidate_port(&self, port: &Self::Port) {
        unsafe { CFMachPortInvalidate(port.0.port.as_concrete_TypeRef()) };
        debug!("event tap port invalidated");
    }
}

extern "C" fn tap_trampoline(
    _proxy: CGEventTapProxy,
    event_type: CGEventType,
    event: CGEventRef,
    user_info: *mut c_void,
) -> CGEventRef {
    if user_info.is_null() {
        return event;
    }
    // SAFETY: user_info is the TapContext owned by the port, which outlives the tap
    let context = unsafe { &*(user_info as *const TapContext) };

    let tap_event = match event_type {
        kCGEventTapDisabledByTimeout => TapEvent::DisabledByTimeout,
        kCGEventTapDisabledByUserInput => TapEvent::DisabledByUserInput,
        _ => {
            let (subtype, data1) = system_defined_payload(event_type, event);
            TapEvent::Event {
                event_type,
                subtype,
                data1,
            }
        }
    };

    match (context.callback)(tap_event) {
        TapDecision::PassThrough => event,
        TapDecision::Swallow => ptr::null_mut(),
    }
}

/// Subtype and `data1` of a system-defined event, zero for anything else.
fn system_defined_payload(event_type: CGEventType, event: CGEventRef) -> (i16, i64) {
    if event_type != NX_SYSDEFINED || event.is_null() {
        return (0, 0);
    }
    autoreleasepool(|_| {
        // SAFETY: the tap hands us a valid CGEvent for the duration of the callback
        let cg_event = unsafe { &*(event as *const CGEvent) };
        match unsafe { NSEvent::eventWithCGEvent(cg_event) } {
            Some(ns_event) => unsafe { (ns_event.subtype().0, ns_event.data1() as i64) },
            None => (0, 0),
        }
    })
}
