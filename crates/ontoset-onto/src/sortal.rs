//! Rigid and anti-rigid sortals.
//!
//! A rigid sortal vetoes every dynamic gain or loss of itself: its
//! instances get it at instantiation and keep it. An anti-rigid sortal can
//! be gained and lost, but only by bearers of the set it specializes.

use crate::ontology::Ontology;
use crate::vocabulary::SPECIALIZATION_OF;
use ontoset_kernel::{
    Composition, KernelError, Member, ROOT_SET, Runtime, SetDefinition, SetId, callback,
};
use tracing::debug;

pub(crate) fn define_rigid(rt: &mut Runtime, universal: SetId) -> Result<SetId, KernelError> {
    let rigid = rt.define(
        universal,
        SetDefinition::named("rigidSortal"),
        Composition::Eager,
    )?;
    for event_name in ["beforeBecome:target", "beforeDegenerate:target"] {
        rt.on(
            rigid,
            event_name,
            callback(|_, instance, event| {
                debug!(instance = %instance, target = ?event.target_set(), "rigid sortal veto");
                event.prevent_action();
                Ok(())
            }),
        )?;
    }
    Ok(rigid)
}

pub(crate) fn define_anti_rigid(
    rt: &mut Runtime,
    universal: SetId,
) -> Result<SetId, KernelError> {
    let anti_rigid = rt.define(
        universal,
        SetDefinition::named("antiRigidSortal"),
        Composition::Eager,
    )?;
    rt.on(
        anti_rigid,
        "beforeBecome:target",
        callback(|rt, instance, event| {
            let Some(target) = event.target_set() else {
                return Ok(());
            };
            for level in rt.chain(target) {
                if level == ROOT_SET {
                    break;
                }
                let required = rt.own_member(level, SPECIALIZATION_OF).and_then(Member::as_set);
                if let Some(required) = required {
                    if !rt.is_a(instance, required) {
                        debug!(instance = %instance, target = %target, required = %required, "specialization not satisfied");
                        event.prevent_action();
                        return Ok(());
                    }
                }
            }
            Ok(())
        }),
    )?;
    Ok(anti_rigid)
}

/// Record that bearers of `set` must already be `base`.
pub(crate) fn specialize(rt: &mut Runtime, set: SetId, base: SetId) -> Result<(), KernelError> {
    rt.ensure_live(base)?;
    rt.set_member(set, SPECIALIZATION_OF, base)
}

impl Ontology {
    /// Require bearers of the anti-rigid `set` to be `base`.
    pub fn specialize(&self, rt: &mut Runtime, set: SetId, base: SetId) -> Result<(), KernelError> {
        if !rt.is_a(set, self.anti_rigid_sortal) {
            return Err(KernelError::invalid(format!(
                "{} is not anti-rigid and cannot specialize",
                rt.name(set)?
            )));
        }
        specialize(rt, set, base)
    }

    /// The set bearers of `set` are required to be, if any.
    pub fn specialization_of(&self, rt: &Runtime, set: SetId) -> Option<SetId> {
        rt.member(set, SPECIALIZATION_OF).and_then(Member::as_set)
    }
}
