//! Set identity and per-set records.
//!
//! Classifiers and instances are both sets. A set has at most one
//! delegation parent; following parents always ends at the root set.

use crate::member::{Initializer, Slot};
use crate::publisher::Publisher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque handle of a set inside one [`crate::Runtime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SetId(pub u64);

impl SetId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a set was made by definition or by instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetKind {
    Classifier,
    Instance,
}

/// How a new classifier is derived from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composition {
    /// Run the parent chain's initializers on the new classifier first.
    Eager,
    /// Only link to the parent and install own members.
    Lazy,
}

pub(crate) struct SetRecord {
    pub(crate) name: String,
    pub(crate) kind: SetKind,
    pub(crate) parent: Option<SetId>,
    pub(crate) members: BTreeMap<String, Slot>,
    pub(crate) sets_in: Vec<SetId>,
    pub(crate) publisher: Publisher,
    pub(crate) initializer: Option<Initializer>,
    pub(crate) destroyed: bool,
}

impl SetRecord {
    pub(crate) fn new(name: String, kind: SetKind, parent: Option<SetId>) -> Self {
        Self {
            name,
            kind,
            parent,
            members: BTreeMap::new(),
            sets_in: Vec::new(),
            publisher: Publisher::default(),
            initializer: None,
            destroyed: false,
        }
    }
}
