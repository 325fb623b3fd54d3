//! Dynamic classification: `become` and `degenerate`.
//!
//! Both follow the same protocol:
//!
//! ```text
//! before<Op>:base    on the instance    ─┐ veto phase: handlers may
//! before<Op>:target  on the target       ─┘ prevent_action()
//! apply              compose / decompose, update sets_in
//! after<Op>:base     on the instance
//! after<Op>:target   on the target
//! ```
//!
//! A probe runs the veto phase only; rules must not change anything while
//! `event.is_probe()` holds. `silence` skips both event phases.

use crate::error::KernelError;
use crate::event::{Event, MutationParams, MutationStatus};
use crate::runtime::Runtime;
use crate::set::SetId;
use tracing::debug;

#[derive(Clone, Copy)]
enum Op {
    Become,
    Degenerate,
}

impl Op {
    fn before_base(self) -> &'static str {
        match self {
            Op::Become => "beforeBecome:base",
            Op::Degenerate => "beforeDegenerate:base",
        }
    }

    fn before_target(self) -> &'static str {
        match self {
            Op::Become => "beforeBecome:target",
            Op::Degenerate => "beforeDegenerate:target",
        }
    }

    fn after_base(self) -> &'static str {
        match self {
            Op::Become => "afterBecome:base",
            Op::Degenerate => "afterDegenerate:base",
        }
    }

    fn after_target(self) -> &'static str {
        match self {
            Op::Become => "afterBecome:target",
            Op::Degenerate => "afterDegenerate:target",
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Op::Become => "become",
            Op::Degenerate => "degenerate",
        }
    }
}

impl Runtime {
    /// Make `instance` acquire `target`: copy its members, run its pending
    /// initializers with `params.init`, and record it in `sets_in`.
    ///
    /// Returns the mutation event; `success()` tells whether it happened.
    pub fn become_set(
        &mut self,
        instance: SetId,
        target: SetId,
        params: MutationParams,
    ) -> Result<Event, KernelError> {
        let mut event = self.mutation_veto(Op::Become, instance, target, params)?;
        if !event.success() {
            debug!(instance = %instance, target = %target, status = %event.status().unwrap_or(MutationStatus::Pending), "become refused");
            return Ok(event);
        }

        // Initializers already satisfied through the instance's own
        // classification do not run again.
        let satisfied: Vec<SetId> = self
            .chain(target)
            .into_iter()
            .filter(|set| self.is_a(instance, *set))
            .collect();
        self.compose(instance, target, false)?;

        let params = event.params().cloned().unwrap_or_default();
        if !params.skip_initialization {
            let mut pending = self.chain(target);
            pending.retain(|set| !satisfied.contains(set));
            pending.reverse();
            self.run_initializers(instance, &pending, &params.init)?;
        }
        self.add_sets_in(instance, target)?;
        debug!(instance = %instance, target = %target, "became");

        if !params.silence {
            self.fire(instance, Op::Become.after_base(), &mut event, params.no_propagation)?;
            self.fire(target, Op::Become.after_target(), &mut event, params.no_propagation)?;
        }
        Ok(event)
    }

    /// Make `instance` drop `target`: remove the members it lent that are
    /// unchanged, and remove it from `sets_in`.
    pub fn degenerate(
        &mut self,
        instance: SetId,
        target: SetId,
        params: MutationParams,
    ) -> Result<Event, KernelError> {
        let mut event = self.mutation_veto(Op::Degenerate, instance, target, params)?;
        if !event.success() {
            debug!(instance = %instance, target = %target, status = %event.status().unwrap_or(MutationStatus::Pending), "degenerate refused");
            return Ok(event);
        }

        self.decompose(instance, target)?;
        self.remove_sets_in(instance, target)?;
        debug!(instance = %instance, target = %target, "degenerated");

        let params = event.params().cloned().unwrap_or_default();
        if !params.silence {
            self.fire(instance, Op::Degenerate.after_base(), &mut event, params.no_propagation)?;
            self.fire(target, Op::Degenerate.after_target(), &mut event, params.no_propagation)?;
        }
        Ok(event)
    }

    /// Run only the veto phase of `become`.
    pub fn probe_become(
        &mut self,
        instance: SetId,
        target: SetId,
        mut params: MutationParams,
    ) -> Result<Event, KernelError> {
        params.probe = true;
        self.mutation_veto(Op::Become, instance, target, params)
    }

    /// Run only the veto phase of `degenerate`.
    pub fn probe_degenerate(
        &mut self,
        instance: SetId,
        target: SetId,
        mut params: MutationParams,
    ) -> Result<Event, KernelError> {
        params.probe = true;
        self.mutation_veto(Op::Degenerate, instance, target, params)
    }

    pub fn can_become(
        &mut self,
        instance: SetId,
        target: SetId,
        params: MutationParams,
    ) -> Result<bool, KernelError> {
        Ok(self.probe_become(instance, target, params)?.success())
    }

    pub fn can_degenerate(
        &mut self,
        instance: SetId,
        target: SetId,
        params: MutationParams,
    ) -> Result<bool, KernelError> {
        Ok(self.probe_degenerate(instance, target, params)?.success())
    }

    fn mutation_veto(
        &mut self,
        op: Op,
        instance: SetId,
        target: SetId,
        params: MutationParams,
    ) -> Result<Event, KernelError> {
        self.ensure_live(instance)?;
        if !self.contains(target) || self.is_destroyed(target) {
            return Err(KernelError::invalid(format!(
                "can't {} a non set: {target}",
                op.verb()
            )));
        }

        let silence = params.silence;
        let no_propagation = params.no_propagation;
        let mut event = Event::mutation(instance, target, params);

        let member = self.is_a(instance, target);
        match op {
            Op::Become if member => {
                event.set_status(MutationStatus::IsAlready);
                return Ok(event);
            }
            Op::Degenerate if !member => {
                event.set_status(MutationStatus::IsNot);
                return Ok(event);
            }
            _ => {}
        }
        if silence {
            event.set_status(MutationStatus::Allowed);
            return Ok(event);
        }

        self.fire(instance, op.before_base(), &mut event, no_propagation)?;
        if !event.is_prevented() {
            self.fire(target, op.before_target(), &mut event, no_propagation)?;
        }
        if !event.is_prevented() {
            event.set_status(MutationStatus::Allowed);
        }
        Ok(event)
    }
}
