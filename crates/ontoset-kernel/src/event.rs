//! Event records.
//!
//! An event is an envelope `{name, scope, sender, data, handler}` with a
//! body saying what the event is for:
//!
//! ```text
//! Notice      ← informational, nothing to cancel
//! Action      ← may be prevented; prevented never resets
//! Mutation    ← become/degenerate attempt with a status
//! ```

use crate::member::{Fields, Member};
use crate::publisher::Handler;
use crate::set::SetId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

const SCOPE_DELIMITER: char = ':';

/// A parsed `"<name>"` or `"<name>:<scope>"` event name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventName {
    pub name: String,
    pub scope: Option<String>,
}

impl EventName {
    /// Parse a full event name. Returns `None` for an empty name.
    pub fn parse(full: &str) -> Option<Self> {
        let mut parts = full.splitn(3, SCOPE_DELIMITER);
        let name = parts.next().filter(|n| !n.is_empty())?;
        let scope = parts.next().filter(|s| !s.is_empty());
        Some(Self {
            name: name.to_string(),
            scope: scope.map(str::to_string),
        })
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{}{SCOPE_DELIMITER}{scope}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Outcome of a mutation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationStatus {
    Pending,
    IsAlready,
    IsNot,
    NotAllowed,
    Allowed,
}

impl MutationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationStatus::Pending => "pending",
            MutationStatus::IsAlready => "isAlready",
            MutationStatus::IsNot => "isNot",
            MutationStatus::NotAllowed => "notAllowed",
            MutationStatus::Allowed => "allowed",
        }
    }
}

impl fmt::Display for MutationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Knobs for one become/degenerate call.
#[derive(Debug, Clone, Default)]
pub struct MutationParams {
    /// Arguments for the target's initializers.
    pub init: Fields,
    /// Skip the before/after events and every rule.
    pub silence: bool,
    /// Do not run initializers when composing.
    pub skip_initialization: bool,
    /// Only fire on delegation chains, not on acquired sets.
    pub no_propagation: bool,
    /// Veto phase only: rules must not change anything.
    pub probe: bool,
    /// Free-form data handed to rules.
    pub extra: Fields,
}

impl MutationParams {
    pub fn silent() -> Self {
        Self {
            silence: true,
            ..Self::default()
        }
    }

    pub fn local() -> Self {
        Self {
            no_propagation: true,
            ..Self::default()
        }
    }

    pub fn with_init(mut self, init: Fields) -> Self {
        self.init = init;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, member: impl Into<Member>) -> Self {
        self.extra.insert(key.into(), member.into());
        self
    }
}

#[derive(Debug, Clone)]
pub enum EventBody {
    Notice,
    Action {
        prevented: bool,
    },
    Mutation {
        prevented: bool,
        status: MutationStatus,
        target_set: SetId,
        params: MutationParams,
    },
}

/// An event travelling through publishers.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: Option<String>,
    pub scope: Option<String>,
    pub sender: SetId,
    pub data: Fields,
    /// The handler currently executing this event, if any.
    pub handler: Option<Rc<Handler>>,
    body: EventBody,
}

impl Event {
    fn with_body(sender: SetId, body: EventBody) -> Self {
        Self {
            name: None,
            scope: None,
            sender,
            data: Fields::new(),
            handler: None,
            body,
        }
    }

    pub fn notice(sender: SetId) -> Self {
        Self::with_body(sender, EventBody::Notice)
    }

    pub fn action(sender: SetId) -> Self {
        Self::with_body(sender, EventBody::Action { prevented: false })
    }

    pub fn mutation(sender: SetId, target_set: SetId, params: MutationParams) -> Self {
        let data = params.extra.clone();
        let mut event = Self::with_body(
            sender,
            EventBody::Mutation {
                prevented: false,
                status: MutationStatus::Pending,
                target_set,
                params,
            },
        );
        event.data = data;
        event
    }

    pub fn named(mut self, full_name: &str) -> Self {
        self.set_full_name(full_name);
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, member: impl Into<Member>) -> Self {
        self.data.insert(key.into(), member.into());
        self
    }

    pub fn set_full_name(&mut self, full_name: &str) {
        match EventName::parse(full_name) {
            Some(parsed) => {
                self.name = Some(parsed.name);
                self.scope = parsed.scope;
            }
            None => {
                self.name = None;
                self.scope = None;
            }
        }
    }

    pub fn full_name(&self) -> String {
        match (&self.name, &self.scope) {
            (Some(name), Some(scope)) => format!("{name}{SCOPE_DELIMITER}{scope}"),
            (Some(name), None) => name.clone(),
            (None, _) => String::new(),
        }
    }

    pub fn body(&self) -> &EventBody {
        &self.body
    }

    /// Cancel the pending action. No effect on notices. A mutation moves
    /// to `NotAllowed`.
    pub fn prevent_action(&mut self) -> &mut Self {
        match &mut self.body {
            EventBody::Notice => {}
            EventBody::Action { prevented } => *prevented = true,
            EventBody::Mutation {
                prevented, status, ..
            } => {
                *prevented = true;
                *status = MutationStatus::NotAllowed;
            }
        }
        self
    }

    pub fn is_prevented(&self) -> bool {
        match &self.body {
            EventBody::Notice => false,
            EventBody::Action { prevented } | EventBody::Mutation { prevented, .. } => *prevented,
        }
    }

    pub fn status(&self) -> Option<MutationStatus> {
        match &self.body {
            EventBody::Mutation { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Only mutation events have a status to set; others ignore this.
    pub fn set_status(&mut self, new_status: MutationStatus) {
        if let EventBody::Mutation { status, .. } = &mut self.body {
            *status = new_status;
        }
    }

    /// True iff this is a mutation event whose status is `Allowed`.
    pub fn success(&self) -> bool {
        self.status() == Some(MutationStatus::Allowed)
    }

    pub fn target_set(&self) -> Option<SetId> {
        match &self.body {
            EventBody::Mutation { target_set, .. } => Some(*target_set),
            _ => None,
        }
    }

    pub fn params(&self) -> Option<&MutationParams> {
        match &self.body {
            EventBody::Mutation { params, .. } => Some(params),
            _ => None,
        }
    }

    pub fn params_mut(&mut self) -> Option<&mut MutationParams> {
        match &mut self.body {
            EventBody::Mutation { params, .. } => Some(params),
            _ => None,
        }
    }

    pub fn is_probe(&self) -> bool {
        self.params().is_some_and(|p| p.probe)
    }

    pub fn data_set(&self, key: &str) -> Option<SetId> {
        self.data.get(key).and_then(Member::as_set)
    }
}
