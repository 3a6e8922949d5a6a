use std::cell::Cell;
use std::rc::Rc;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use core_foundation::base::{CFTypeRef, TCFType};
use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop};
use core_graphics::event::{
    CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType, EventField,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::input::hotkey::{HotkeyAction, HotkeyMatcher, KeyEventKind};

extern "C" {
    fn CGEventTapEnable(tap: CFTypeRef, enable: bool);
}

/// Event tap startup errors.
#[derive(Debug, Error)]
pub enum TapError {
    /// Tap creation refused, usually a missing Input Monitoring grant
    #[error("failed to create keyboard event tap - grant Input Monitoring permission")]
    Creation,

    /// Mach port could not be attached to the run loop
    #[error("failed to attach event tap to run loop")]
    RunLoopSource,

    /// Listener thread never reported readiness
    #[error("timed out waiting for event tap thread to start")]
    StartTimeout,
}

/// Running keyboard listener.
///
/// Owns the dedicated run-loop thread; dropping without [`shutdown`] leaves
/// the thread running until process exit, which is fine for the app's
/// lifetime but not for tests.
///
/// [`shutdown`]: EventTapHandle::shutdown
pub struct EventTapHandle {
    run_loop: CFRunLoop,
    thread: Option<JoinHandle<()>>,
}

impl EventTapHandle {
    /// Stop the run loop and join the listener thread.
    pub fn shutdown(mut self) {
        self.run_loop.stop();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("event tap thread panicked during shutdown");
            }
        }
    }
}

/// Install a listen-only keyboard tap on a dedicated thread.
///
/// Matched actions are delivered on `actions`; the caller drains them from
/// its own loop. The tap observes only, so hot key presses also reach the
/// frontmost app. When macOS disables the tap for a slow callback the
/// callback re-enables it in place.
///
/// # Errors
/// Returns [`TapError`] when the tap cannot be created (permission denied),
/// cannot be attached to the run loop, or the thread fails to start.
pub fn spawn_event_tap(
    matcher: Arc<Mutex<HotkeyMatcher>>,
    actions: Sender<HotkeyAction>,
) -> Result<EventTapHandle, TapError> {
    let (ready_tx, ready_rx) = mpsc::channel::<Result<CFRunLoop, TapError>>();

    let thread = thread::Builder::new()
        .name("vox-event-tap".to_owned())
        .spawn(move || run_tap_loop(&matcher, &actions, &ready_tx))
        .map_err(|e| {
            error!(error = %e, "failed to spawn event tap thread");
            TapError::Creation
        })?;

    match ready_rx.recv_timeout(Duration::from_secs(2)) {
        Ok(Ok(run_loop)) => {
            info!("keyboard event tap installed");
            Ok(EventTapHandle {
                run_loop,
                thread: Some(thread),
            })
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(TapError::StartTimeout),
    }
}

fn run_tap_loop(
    matcher: &Arc<Mutex<HotkeyMatcher>>,
    actions: &Sender<HotkeyAction>,
    ready: &Sender<Result<CFRunLoop, TapError>>,
) {
    // The callback needs the tap's mach port to re-enable it after a
    // timeout, but the tap owns the callback. The slot is filled right
    // after creation; both ends live on this thread.
    let port_slot: Rc<Cell<CFTypeRef>> = Rc::new(Cell::new(std::ptr::null()));
    let callback_port = Rc::clone(&port_slot);

    let matcher = Arc::clone(matcher);
    let actions = actions.clone();

    let tap = CGEventTap::new(
        CGEventTapLocation::HID,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![CGEventType::KeyDown, CGEventType::KeyUp],
        move |_proxy, event_type, event| {
            // Never panic here; this runs across an FFI boundary.
            match event_type {
                CGEventType::TapDisabledByTimeout => {
                    warn!("event tap disabled by timeout, re-enabling");
                    let port = callback_port.get();
                    if !port.is_null() {
                        unsafe { CGEventTapEnable(port, true) };
                    }
                    return Some(event.clone());
                }
                CGEventType::TapDisabledByUserInput => {
                    debug!("event tap disabled by user input, passing through");
                    return Some(event.clone());
                }
                CGEventType::KeyDown | CGEventType::KeyUp => {}
                _ => return Some(event.clone()),
            }

            let key_code =
                event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;
            let autorepeat =
                event.get_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT) != 0;
            let flags = event.get_flags().bits();
            let kind = if matches!(event_type, CGEventType::KeyDown) {
                KeyEventKind::KeyDown
            } else {
                KeyEventKind::KeyUp
            };

            let matched = matcher
                .lock()
                .ok()
                .and_then(|m| m.match_event(key_code, flags, autorepeat, kind));

            if let Some(action) = matched {
                debug!(?action, key_code, "hot key matched");
                if actions.send(action).is_err() {
                    warn!("action receiver dropped, hot key ignored");
                }
            }

            Some(event.clone())
        },
    );

    let tap = match tap {
        Ok(tap) => tap,
        Err(()) => {
            error!("CGEventTap creation failed - Input Monitoring permission missing?");
            let _ = ready.send(Err(TapError::Creation));
            return;
        }
    };

    port_slot.set(tap.mach_port.as_concrete_TypeRef().cast());

    let Ok(source) = tap.mach_port.create_runloop_source(0) else {
        error!("failed to create run loop source for event tap");
        let _ = ready.send(Err(TapError::RunLoopSource));
        return;
    };

    let run_loop = CFRunLoop::get_current();
    unsafe {
        run_loop.add_source(&source, kCFRunLoopCommonModes);
    }
    tap.enable();

    if ready.send(Ok(run_loop)).is_err() {
        return;
    }
    CFRunLoop::run_current();
    debug!("event tap run loop exited");
}
