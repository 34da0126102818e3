//! Panic site capture for transaction callbacks.
//!
//! `catch_unwind` only hands back the payload, after the stack is gone. A
//! process-wide panic hook (installed once, chained in front of whatever hook
//! was there before) records the location and, on request, a backtrace while
//! the faulting frame is still on the stack. Recording only happens on
//! threads currently inside a [`Guard`].

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic;
use std::sync::Once;

/// Where a callback panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PanicSite {
    pub(crate) message: String,
    /// `file:line:column`, or `<unknown>`.
    pub(crate) location: String,
    /// Empty when capture is off.
    pub(crate) backtrace: String,
}

const UNKNOWN_LOCATION: &str = "<unknown>";

static INSTALL: Once = Once::new();

thread_local! {
    /// `Some(capture_backtrace)` while a guard is active on this thread.
    static ACTIVE: Cell<Option<bool>> = const { Cell::new(None) };
    static LAST_SITE: RefCell<Option<(String, String)>> = const { RefCell::new(None) };
}

fn install_hook() {
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if let Some(capture) = ACTIVE.with(Cell::get) {
                let location = info
                    .location()
                    .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                    .unwrap_or_else(|| UNKNOWN_LOCATION.to_string());
                let backtrace = if capture {
                    Backtrace::force_capture().to_string()
                } else {
                    String::new()
                };
                LAST_SITE.with(|site| *site.borrow_mut() = Some((location, backtrace)));
            }
            previous(info);
        }));
    });
}

/// Arms site recording on the current thread until dropped.
///
/// Guards nest; dropping one restores the setting of the enclosing guard.
pub(crate) struct Guard {
    previous: Option<bool>,
}

impl Guard {
    pub(crate) fn enter(capture_backtrace: bool) -> Self {
        install_hook();
        let previous = ACTIVE.with(|a| a.replace(Some(capture_backtrace)));
        LAST_SITE.with(|site| site.borrow_mut().take());
        Self { previous }
    }

    /// Build the site for a caught panic `payload`.
    ///
    /// Falls back to a backtrace of the recovery point if the hook did not
    /// run, e.g. because another hook was installed over it afterwards.
    pub(crate) fn take(&self, payload: Box<dyn Any + Send>) -> PanicSite {
        let message = payload_message(payload.as_ref());
        match LAST_SITE.with(|site| site.borrow_mut().take()) {
            Some((location, backtrace)) => PanicSite {
                message,
                location,
                backtrace,
            },
            None => PanicSite {
                message,
                location: UNKNOWN_LOCATION.to_string(),
                backtrace: if ACTIVE.with(Cell::get).unwrap_or(false) {
                    Backtrace::force_capture().to_string()
                } else {
                    String::new()
                },
            },
        }
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        ACTIVE.with(|a| a.set(self.previous));
    }
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
