use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::core::Core;
use crate::types::{FieldConfig, FieldState, ValidationVerdict, Value};

pub(crate) type FieldStateCallback = Box<dyn Fn(&FieldState)>;
pub(crate) type VerdictCallback = Box<dyn Fn(&ValidationVerdict)>;
pub(crate) type ValueCallback = Box<dyn Fn(&str, Option<&Value>)>;
pub(crate) type ConfigCallback = Box<dyn Fn(&[Arc<FieldConfig>])>;

/// Notifications queued while the core is borrowed.
#[derive(Debug)]
pub(crate) enum Event {
    FieldState(FieldState),
    Value { field: String, value: Option<Value> },
    Config(Vec<Arc<FieldConfig>>),
    /// A full verdict from a validation pass; delivered immediately and
    /// independently of any debounced notification.
    Verdict(ValidationVerdict),
    /// Something changed; deliver a verdict after the debounce window.
    VerdictRequested,
}

#[derive(Default)]
pub(crate) struct Callbacks {
    pub field_state: Option<FieldStateCallback>,
    pub verdict: Option<VerdictCallback>,
    pub value: Option<ValueCallback>,
    pub config: Option<ConfigCallback>,
}

/// State shared by a manager, its pending validations, and its scheduled
/// verdict task.
pub(crate) struct Shared {
    pub core: RefCell<Core>,
    pub callbacks: Callbacks,
}

impl Shared {
    /// Deliver queued events. The core is not borrowed while callbacks run,
    /// so a callback may read the manager.
    pub fn flush(self: &Rc<Self>) {
        let (events, disposed) = {
            let mut core = self.core.borrow_mut();
            (std::mem::take(&mut core.events), core.disposed)
        };
        if disposed {
            return;
        }
        let mut verdict_requested = false;
        for event in events {
            match event {
                Event::FieldState(state) => {
                    trace!(field = %state.name, status = %state.status, "field state changed");
                    if let Some(cb) = &self.callbacks.field_state {
                        cb(&state);
                    }
                }
                Event::Value { field, value } => {
                    if let Some(cb) = &self.callbacks.value {
                        cb(&field, value.as_ref());
                    }
                }
                Event::Config(configs) => {
                    if let Some(cb) = &self.callbacks.config {
                        cb(&configs);
                    }
                }
                Event::Verdict(verdict) => {
                    if let Some(cb) = &self.callbacks.verdict {
                        cb(&verdict);
                    }
                }
                Event::VerdictRequested => verdict_requested = true,
            }
        }
        if verdict_requested {
            self.request_verdict();
        }
    }

    fn cancel_debounce(&self) {
        if let Some(handle) = self.core.borrow_mut().debounce.take() {
            handle.cancel();
        }
    }

    /// Restart the debounce window; the verdict callback fires once it
    /// elapses without another request.
    fn request_verdict(self: &Rc<Self>) {
        if self.callbacks.verdict.is_none() {
            return;
        }
        self.cancel_debounce();
        let (delay, scheduler) = {
            let core = self.core.borrow();
            (core.notify_delay, Rc::clone(&core.services.scheduler))
        };
        if delay == Duration::ZERO {
            self.fire_verdict();
            return;
        }
        let weak: Weak<Self> = Rc::downgrade(self);
        let handle = scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.core.borrow_mut().debounce = None;
                    shared.fire_verdict();
                }
            }),
        );
        let mut core = self.core.borrow_mut();
        if core.disposed {
            handle.cancel();
        } else {
            core.debounce = Some(handle);
        }
    }

    fn fire_verdict(&self) {
        let verdict = {
            let core = self.core.borrow();
            if core.disposed {
                return;
            }
            core.verdict()
        };
        debug!(%verdict, "verdict changed");
        if let Some(cb) = &self.callbacks.verdict {
            cb(&verdict);
        }
    }
}
