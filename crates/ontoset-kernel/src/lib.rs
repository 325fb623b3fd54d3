//! # Ontoset Kernel
//!
//! Dynamic multi-classification: a set can belong to several independently
//! defined classifiers at once and gain or lose them at runtime through a
//! vetoable protocol.
//!
//! This crate is **stereotype-agnostic**: it does not say what a kind or a
//! role is. It only says how classifications are composed, observed and
//! vetoed.
//!
//! ## Architecture
//!
//! ```text
//! Runtime               ← Arena of sets, addressed by SetId
//!     │
//! SetRecord             ← Parent link, members, sets_in, publisher
//!     │
//! Member / Slot         ← Value | Set | Sets | Behavior, with provenance stamp
//!     │
//! Publisher / Handler   ← Scoped handler groups, enable flag per handler
//!     │
//! Event                 ← Notice | Action | Mutation{status, target, params}
//!     │
//! become / degenerate   ← Veto phase, compose/decompose, after-notices
//! ```

pub mod error;
pub mod event;
pub mod member;
pub mod mutation;
pub mod publisher;
pub mod runtime;
pub mod set;

pub use error::{ErrorClass, KernelError};
pub use event::{Event, EventBody, EventName, MutationParams, MutationStatus};
pub use member::{Behavior, Fields, Initializer, Member, RESERVED_MEMBERS, fields, is_reserved};
pub use publisher::{Callback, DEFAULT_SCOPE, Detach, Handler, Publisher, callback};
pub use runtime::{ROOT_SET, Runtime, SetDefinition};
pub use set::{Composition, SetId, SetKind};
