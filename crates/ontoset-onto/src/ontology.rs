//! The installed base classifiers and the definition helpers.
//!
//! ```text
//! set
//!  └─ universal
//!      ├─ rigidSortal ─ kind
//!      ├─ antiRigidSortal ─┬─ role
//!      │                   └─ phase
//!      └─ relator
//! ```

use crate::relator::{self, Relations};
use crate::vocabulary::{PHASE_GROUP_ID, Stereotype};
use crate::{phase, sortal, universal};
use ontoset_kernel::{Composition, KernelError, Runtime, SetDefinition, SetId};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// Handles to the base classifiers of one runtime, plus the relation
/// registry their rules share.
#[derive(Clone)]
pub struct Ontology {
    pub universal: SetId,
    pub rigid_sortal: SetId,
    pub kind: SetId,
    pub anti_rigid_sortal: SetId,
    pub role: SetId,
    pub phase: SetId,
    pub relator: SetId,
    pub(crate) relations: Rc<RefCell<Relations>>,
}

impl Ontology {
    /// Define the base classifiers in `rt` and attach their rules.
    pub fn install(rt: &mut Runtime) -> Result<Self, KernelError> {
        let universal = universal::define(rt)?;
        let rigid_sortal = sortal::define_rigid(rt, universal)?;
        let kind = rt.define(rigid_sortal, SetDefinition::named("kind"), Composition::Eager)?;
        let anti_rigid_sortal = sortal::define_anti_rigid(rt, universal)?;
        let role = rt.define(
            anti_rigid_sortal,
            SetDefinition::named("role"),
            Composition::Eager,
        )?;
        let phase = phase::define(rt, anti_rigid_sortal)?;
        let relations = Rc::new(RefCell::new(Relations::default()));
        let relator = relator::define(rt, universal, &relations)?;
        debug!(universal = %universal, kind = %kind, role = %role, phase = %phase, relator = %relator, "ontology installed");

        Ok(Self {
            universal,
            rigid_sortal,
            kind,
            anti_rigid_sortal,
            role,
            phase,
            relator,
            relations,
        })
    }

    /// Define a kind under `base` (the kind base by default).
    pub fn define_kind(
        &self,
        rt: &mut Runtime,
        definition: SetDefinition,
        base: Option<SetId>,
    ) -> Result<SetId, KernelError> {
        rt.define(base.unwrap_or(self.kind), definition, Composition::Eager)
    }

    /// Define a role. A role specializing another role derives from it;
    /// any other specialization becomes the role's requirement.
    pub fn define_role(
        &self,
        rt: &mut Runtime,
        definition: SetDefinition,
        specialization_of: Option<SetId>,
    ) -> Result<SetId, KernelError> {
        match specialization_of {
            Some(base) if rt.is_a(base, self.role) => {
                rt.define(base, definition, Composition::Eager)
            }
            Some(required) => {
                let role = rt.define(self.role, definition, Composition::Eager)?;
                sortal::specialize(rt, role, required)?;
                Ok(role)
            }
            None => rt.define(self.role, definition, Composition::Eager),
        }
    }

    /// Define a phase in `group`. A phase specializing another phase
    /// derives from it and inherits its group unless one is given. With
    /// `auto_assign`, new instances of the required set enter this phase.
    pub fn define_phase(
        &self,
        rt: &mut Runtime,
        definition: SetDefinition,
        group: Option<&str>,
        specialization_of: Option<SetId>,
        auto_assign: bool,
    ) -> Result<SetId, KernelError> {
        let (base, required) = match specialization_of {
            Some(base) if rt.is_a(base, self.phase) => (base, None),
            other => (self.phase, other),
        };
        let phase = rt.define(base, definition, Composition::Eager)?;
        if let Some(group) = group {
            rt.set_member(phase, PHASE_GROUP_ID, group)?;
        }
        match required {
            Some(required) if auto_assign => self.specialize_phase(rt, phase, required)?,
            Some(required) => sortal::specialize(rt, phase, required)?,
            None => {}
        }
        Ok(phase)
    }

    /// The stereotype `set` was defined under, if any.
    pub fn stereotype_of(&self, rt: &Runtime, set: SetId) -> Option<Stereotype> {
        if rt.is_a(set, self.relator) {
            Some(Stereotype::Relator)
        } else if rt.is_a(set, self.phase) {
            Some(Stereotype::Phase)
        } else if rt.is_a(set, self.role) {
            Some(Stereotype::Role)
        } else if rt.is_a(set, self.kind) {
            Some(Stereotype::Kind)
        } else {
            None
        }
    }

    /// The base classifier of a stereotype.
    pub fn base_of(&self, stereotype: Stereotype) -> SetId {
        match stereotype {
            Stereotype::Kind => self.kind,
            Stereotype::Role => self.role,
            Stereotype::Phase => self.phase,
            Stereotype::Relator => self.relator,
        }
    }
}
