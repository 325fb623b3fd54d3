//! Phases: anti-rigid sortals grouped by `phaseGroupId`.
//!
//! An instance holds at most one phase per group. Becoming another phase of
//! a group it already holds a phase of first degenerates the held phase;
//! the pending `become` then completes the transition.

use crate::ontology::Ontology;
use crate::sortal;
use crate::vocabulary::PHASE_GROUP_ID;
use ontoset_kernel::{
    Behavior, Composition, Event, Fields, KernelError, Member, MutationParams, Runtime,
    SetDefinition, SetId, callback,
};
use tracing::debug;

pub(crate) fn define(rt: &mut Runtime, anti_rigid: SetId) -> Result<SetId, KernelError> {
    let phase = rt.define(
        anti_rigid,
        SetDefinition::named("phase"),
        Composition::Eager,
    )?;

    rt.set_member(
        phase,
        "transitTo",
        Behavior::new(move |rt, this, args| {
            let target = phase_arg(args)?;
            let event = transit_to(rt, phase, this, target, MutationParams::default())?;
            Ok(Member::from(event.success()))
        }),
    )?;
    rt.set_member(
        phase,
        "canChangeTo",
        Behavior::new(|rt, this, args| {
            let target = phase_arg(args)?;
            Ok(Member::from(rt.can_become(this, target, MutationParams::default())?))
        }),
    )?;

    rt.on(
        phase,
        "beforeBecome:target",
        callback(move |rt, instance, event| vacate_group(rt, phase, instance, event)),
    )?;
    Ok(phase)
}

fn phase_arg(args: &Fields) -> Result<SetId, KernelError> {
    args.get("phase")
        .and_then(Member::as_set)
        .ok_or_else(|| KernelError::invalid("`phase` must name a phase set"))
}

fn group_of(rt: &Runtime, set: SetId) -> Option<String> {
    rt.member(set, PHASE_GROUP_ID)
        .and_then(Member::as_str)
        .map(str::to_string)
}

fn held_in_group(rt: &Runtime, phase_base: SetId, instance: SetId, group: &str) -> Option<SetId> {
    rt.sets_in(instance).ok()?.iter().copied().find(|held| {
        rt.is_a(*held, phase_base) && group_of(rt, *held).as_deref() == Some(group)
    })
}

/// `beforeBecome:target` rule: make room in the target's phase group.
fn vacate_group(
    rt: &mut Runtime,
    phase_base: SetId,
    instance: SetId,
    event: &mut Event,
) -> Result<(), KernelError> {
    let Some(target) = event.target_set() else {
        return Ok(());
    };
    if !rt.is_a(target, phase_base) {
        return Ok(());
    }
    let Some(group) = group_of(rt, target) else {
        return Err(KernelError::invalid(format!(
            "phase `{}` has no {PHASE_GROUP_ID}",
            rt.name(target)?
        )));
    };
    if event.is_prevented() {
        return Ok(());
    }
    let Some(current) = held_in_group(rt, phase_base, instance, &group) else {
        return Ok(());
    };
    let Some(handler) = event.handler.clone() else {
        return Ok(());
    };

    let mut params = event.params().cloned().unwrap_or_default();
    params.probe = false;
    params = params
        .with_extra("currentPhase", current)
        .with_extra("targetPhase", target);

    // nested checks would re-enter this rule
    handler.deactivate();
    let vacated = leave_phase(rt, instance, current, target, params, event.is_probe());
    handler.activate();

    if !vacated? {
        debug!(instance = %instance, current = %current, target = %target, group = %group, "phase transition refused");
        event.prevent_action();
    }
    Ok(())
}

fn leave_phase(
    rt: &mut Runtime,
    instance: SetId,
    current: SetId,
    target: SetId,
    params: MutationParams,
    probe: bool,
) -> Result<bool, KernelError> {
    if !rt.can_degenerate(instance, current, params.clone())?
        || !rt.can_become(instance, target, params.clone())?
    {
        return Ok(false);
    }
    if probe {
        return Ok(true);
    }
    Ok(rt.degenerate(instance, current, params)?.success())
}

/// Degenerate the phase held in `target`'s group, then become `target`.
/// Returns the first refused event, or the final `become` event.
fn transit_to(
    rt: &mut Runtime,
    phase_base: SetId,
    instance: SetId,
    target: SetId,
    params: MutationParams,
) -> Result<Event, KernelError> {
    let group = group_of(rt, target).ok_or_else(|| {
        KernelError::invalid(format!("set {target} is not a phase with a {PHASE_GROUP_ID}"))
    })?;
    if let Some(current) = held_in_group(rt, phase_base, instance, &group) {
        if current != target {
            let params = params
                .clone()
                .with_extra("currentPhase", current)
                .with_extra("targetPhase", target);
            let probe = rt.probe_degenerate(instance, current, params.clone())?;
            if !probe.success() {
                return Ok(probe);
            }
            let probe = rt.probe_become(instance, target, params.clone())?;
            if !probe.success() {
                return Ok(probe);
            }
            let left = rt.degenerate(instance, current, params)?;
            if !left.success() {
                return Ok(left);
            }
        }
    }
    rt.become_set(instance, target, params)
}

impl Ontology {
    /// Make `phase` require `base` and put every new instance of `base`,
    /// and every instance sending `changeState` through `base`, into it.
    pub fn specialize_phase(
        &self,
        rt: &mut Runtime,
        phase: SetId,
        base: SetId,
    ) -> Result<(), KernelError> {
        sortal::specialize(rt, phase, base)?;
        for event_name in ["afterInstantiate", "changeState"] {
            rt.on_in_context(
                base,
                event_name,
                callback(|rt, phase, event| {
                    let instance = event.data_set("instance").unwrap_or(event.sender);
                    rt.become_set(instance, phase, MutationParams::default())?;
                    Ok(())
                }),
                Some(phase),
            )?;
        }
        Ok(())
    }

    pub fn phase_group_of(&self, rt: &Runtime, phase: SetId) -> Option<String> {
        group_of(rt, phase)
    }

    /// The phase `instance` holds in `group`, if any.
    pub fn current_phase(&self, rt: &Runtime, instance: SetId, group: &str) -> Option<SetId> {
        held_in_group(rt, self.phase, instance, group)
    }

    /// Move `instance` to `phase`: degenerate the phase it holds in the
    /// same group, then become `phase`.
    pub fn transit_to(
        &self,
        rt: &mut Runtime,
        instance: SetId,
        phase: SetId,
        params: MutationParams,
    ) -> Result<Event, KernelError> {
        transit_to(rt, self.phase, instance, phase, params)
    }

    /// Dry run of [`Ontology::transit_to`].
    pub fn can_change_to(
        &self,
        rt: &mut Runtime,
        instance: SetId,
        phase: SetId,
    ) -> Result<bool, KernelError> {
        rt.can_become(instance, phase, MutationParams::default())
    }
}
