//! Per-set event channel.
//!
//! Handlers are grouped by event name, then by scope. A handler registered
//! without a scope lives under [`DEFAULT_SCOPE`] and sees every fire of its
//! name; a scoped handler sees fires with no scope or with its own scope.
//!
//! The publisher only stores handlers. Dispatch needs the runtime, so
//! [`crate::Runtime::fire_on`] takes a snapshot from [`Publisher::matching`]
//! and executes it.

use crate::error::KernelError;
use crate::event::{Event, EventName};
use crate::runtime::Runtime;
use crate::set::SetId;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Scope key for handlers registered without a scope.
pub const DEFAULT_SCOPE: &str = "__default";

type CallbackFn = dyn Fn(&mut Runtime, SetId, &mut Event) -> Result<(), KernelError>;

/// A handler callback. Receives the runtime, the target set (the handler's
/// context, or the event sender) and the event.
pub type Callback = Rc<CallbackFn>;

/// Build a [`Callback`] from a closure.
pub fn callback(
    f: impl Fn(&mut Runtime, SetId, &mut Event) -> Result<(), KernelError> + 'static,
) -> Callback {
    Rc::new(f)
}

/// A registered callback with an enable flag.
pub struct Handler {
    active: Cell<bool>,
    callback: Callback,
    context: Option<SetId>,
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("active", &self.active.get())
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl Handler {
    pub fn new(callback: Callback, context: Option<SetId>) -> Rc<Self> {
        Rc::new(Self {
            active: Cell::new(true),
            callback,
            context,
        })
    }

    pub fn activate(&self) {
        self.active.set(true);
    }

    pub fn deactivate(&self) {
        self.active.set(false);
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn context(&self) -> Option<SetId> {
        self.context
    }

    /// Run the callback unless deactivated. While it runs, the handler is
    /// exposed as `event.handler`; the previous value comes back afterwards.
    pub fn execute(
        self: &Rc<Self>,
        runtime: &mut Runtime,
        event: &mut Event,
    ) -> Result<(), KernelError> {
        if !self.is_active() {
            return Ok(());
        }
        let previous = event.handler.replace(Rc::clone(self));
        let target = self.context.unwrap_or(event.sender);
        let outcome = (self.callback)(runtime, target, event);
        event.handler = previous;
        outcome
    }
}

/// Handlers of one event name, grouped by scope in creation order.
#[derive(Default, Clone)]
struct ScopeGroups {
    groups: Vec<(String, Vec<Rc<Handler>>)>,
}

impl ScopeGroups {
    fn group_mut(&mut self, scope: &str) -> &mut Vec<Rc<Handler>> {
        let position = match self.groups.iter().position(|(key, _)| key == scope) {
            Some(position) => position,
            None => {
                self.groups.push((scope.to_string(), Vec::new()));
                self.groups.len() - 1
            }
        };
        &mut self.groups[position].1
    }
}

/// What to detach.
pub enum Detach<'a> {
    /// `"<name>"` clears every scope, `"<name>:<scope>"` one scope group.
    Name(&'a str),
    /// One handler, from every group it is in.
    Handler(&'a Rc<Handler>),
}

/// An event channel owned by one set.
#[derive(Default, Clone)]
pub struct Publisher {
    handlers: BTreeMap<String, ScopeGroups>,
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("events", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Publisher {
    /// Register `callback` for `event_name`. Returns `None` for an empty
    /// event name.
    pub fn on(
        &mut self,
        event_name: &str,
        callback: Callback,
        context: Option<SetId>,
    ) -> Option<Rc<Handler>> {
        let handler = Handler::new(callback, context);
        self.on_handler(event_name, handler)
    }

    /// Register an existing handler record. Registering the same handler
    /// twice in one group is a no-op.
    pub fn on_handler(&mut self, event_name: &str, handler: Rc<Handler>) -> Option<Rc<Handler>> {
        let parsed = EventName::parse(event_name)?;
        let scope = parsed.scope.as_deref().unwrap_or(DEFAULT_SCOPE);
        let group = self
            .handlers
            .entry(parsed.name)
            .or_default()
            .group_mut(scope);
        if !group.iter().any(|h| Rc::ptr_eq(h, &handler)) {
            group.push(Rc::clone(&handler));
        }
        Some(handler)
    }

    /// Handlers a fire of `event_name` reaches, in dispatch order.
    pub fn matching(&self, event_name: &str) -> Vec<Rc<Handler>> {
        let Some(parsed) = EventName::parse(event_name) else {
            return Vec::new();
        };
        let Some(groups) = self.handlers.get(&parsed.name) else {
            return Vec::new();
        };
        groups
            .groups
            .iter()
            .filter(|(key, _)| match parsed.scope.as_deref() {
                None => true,
                Some(scope) => key == DEFAULT_SCOPE || key == scope,
            })
            .flat_map(|(_, handlers)| handlers.iter().cloned())
            .collect()
    }

    pub fn detach(&mut self, what: Detach<'_>) {
        match what {
            Detach::Name(event_name) => self.detach_by_name(event_name),
            Detach::Handler(handler) => self.detach_handler(handler),
        }
    }

    fn detach_by_name(&mut self, event_name: &str) {
        let Some(parsed) = EventName::parse(event_name) else {
            return;
        };
        let Some(groups) = self.handlers.get_mut(&parsed.name) else {
            return;
        };
        match parsed.scope {
            None => groups.groups.clear(),
            Some(scope) => {
                if let Some((_, handlers)) = groups.groups.iter_mut().find(|(key, _)| *key == scope)
                {
                    handlers.clear();
                }
            }
        }
    }

    fn detach_handler(&mut self, handler: &Rc<Handler>) {
        for groups in self.handlers.values_mut() {
            for (_, handlers) in groups.groups.iter_mut() {
                handlers.retain(|h| !Rc::ptr_eq(h, handler));
            }
        }
    }

    /// Deactivate the handlers of `event_name` (one scope group if scoped).
    pub fn mute(&self, event_name: &str) {
        self.toggle(event_name, false);
    }

    /// Reactivate the handlers of `event_name` (one scope group if scoped).
    pub fn unmute(&self, event_name: &str) {
        self.toggle(event_name, true);
    }

    fn toggle(&self, event_name: &str, activate: bool) {
        let Some(parsed) = EventName::parse(event_name) else {
            return;
        };
        let Some(groups) = self.handlers.get(&parsed.name) else {
            return;
        };
        for (key, handlers) in &groups.groups {
            if parsed.scope.as_deref().is_some_and(|scope| scope != key) {
                continue;
            }
            for handler in handlers {
                if activate {
                    handler.activate();
                } else {
                    handler.deactivate();
                }
            }
        }
    }

    /// Append every handler of `other` to this publisher.
    pub fn copy_handlers(&mut self, other: &Publisher) {
        for (name, groups) in &other.handlers {
            let own = self.handlers.entry(name.clone()).or_default();
            for (scope, handlers) in &groups.groups {
                own.group_mut(scope).extend(handlers.iter().cloned());
            }
        }
    }

    /// Detach every handler that `other` also holds.
    pub fn remove_same_handlers(&mut self, other: &Publisher) {
        for groups in other.handlers.values() {
            for (_, handlers) in &groups.groups {
                for handler in handlers {
                    self.detach_handler(handler);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.handlers
            .values()
            .all(|groups| groups.groups.iter().all(|(_, h)| h.is_empty()))
    }
}
