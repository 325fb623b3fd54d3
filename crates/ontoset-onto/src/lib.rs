//! # Ontoset Onto
//!
//! OntoUML-style stereotypes as rules on the kernel's mutation protocol.
//!
//! | stereotype | rule |
//! |---|---|
//! | kind (rigid) | never gained or lost after instantiation |
//! | role (anti-rigid) | gained and lost freely by bearers of the specialized set |
//! | phase (anti-rigid) | at most one phase per `phaseGroupId` |
//! | relator | parts bear role instances while the relation context is entered |
//!
//! Everything is installed into a [`ontoset_kernel::Runtime`] by
//! [`Ontology::install`].

pub mod ontology;
pub mod phase;
pub mod relator;
pub mod sortal;
pub mod universal;
pub mod vocabulary;

pub use ontology::Ontology;
pub use relator::{ContextPolicy, RelatedParts, RelatorDeclaration, RolePair};
pub use vocabulary::{PHASE_GROUP_ID, RELATOR_PROPERTY_ID, SPECIALIZATION_OF, Stereotype};
