//! # Ontoset Domain
//!
//! Domain models built from the ontology layer, and the worlds that
//! populate them.
//!
//! ## Data flow
//!
//! ```text
//! domain.json ──parse──▶ DomainDocument ──load──▶ Domain (kinds, roles, phases, relators)
//!                                                    │
//!                                   render_model ◀───┤
//!                                                    ▼
//! scenario.json ──parse──▶ Scenario ──run──▶ World (instances, relations) ──▶ ScenarioReport
//! ```

pub mod document;
pub mod domain;
pub mod error;
pub mod render;
pub mod scenario;
pub mod world;

pub use document::{
    DomainDocument, KindDef, PhaseDef, RelatorDef, RoleDef, RoleSlots, RuleAction, read_json,
};
pub use domain::{Domain, SetRef, TypeEntry, TypeParams};
pub use error::DomainError;
pub use render::{ModelView, SlotView, TypeView, model_view, render_model};
pub use scenario::{PartRefs, Scenario, ScenarioReport, Step, StepOutcome, run_scenario};
pub use world::{INSTANCE_ID, InstanceRef, InstanceView, Query, World};
