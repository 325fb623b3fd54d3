//! Universal: the base of every stereotype. Carries the context protocol.
//!
//! Entering a context fires `enterContext` on the context set with the
//! entering set as sender; leaving fires `leaveContext`. Both are notices.

use crate::ontology::Ontology;
use ontoset_kernel::{
    Behavior, Composition, Event, Fields, KernelError, Member, ROOT_SET, Runtime, SetDefinition,
    SetId,
};

const CONTEXT: &str = "context";

pub(crate) fn define(rt: &mut Runtime) -> Result<SetId, KernelError> {
    let definition = SetDefinition::named("universal")
        .member(
            "inContext",
            Behavior::new(|rt, this, args| {
                let context = context_arg(args)?;
                fire_context(rt, this, context, "enterContext", args)?;
                Ok(Member::Set(this))
            }),
        )
        .member(
            "leaveContext",
            Behavior::new(|rt, this, args| {
                let context = context_arg(args)?;
                fire_context(rt, this, context, "leaveContext", args)?;
                Ok(Member::Set(this))
            }),
        );
    rt.define(ROOT_SET, definition, Composition::Eager)
}

fn context_arg(args: &Fields) -> Result<SetId, KernelError> {
    args.get(CONTEXT)
        .and_then(Member::as_set)
        .ok_or_else(|| KernelError::invalid("`context` must name a set"))
}

fn fire_context(
    rt: &mut Runtime,
    set: SetId,
    context: SetId,
    event_name: &str,
    params: &Fields,
) -> Result<(), KernelError> {
    rt.ensure_live(context)?;
    let mut event = Event::notice(set).named(event_name);
    event.data = params.clone();
    event.data.insert(CONTEXT.to_string(), Member::Set(context));
    rt.fire(context, event_name, &mut event, false)
}

impl Ontology {
    /// Announce that `set` enters `context`.
    pub fn in_context(
        &self,
        rt: &mut Runtime,
        set: SetId,
        context: SetId,
        params: &Fields,
    ) -> Result<(), KernelError> {
        fire_context(rt, set, context, "enterContext", params)
    }

    /// Announce that `set` leaves `context`.
    pub fn leave_context(
        &self,
        rt: &mut Runtime,
        set: SetId,
        context: SetId,
        params: &Fields,
    ) -> Result<(), KernelError> {
        fire_context(rt, set, context, "leaveContext", params)
    }

    /// Run `f` between entering and leaving `context`. The leave notice is
    /// sent even when `f` fails.
    pub fn using_context<T>(
        &self,
        rt: &mut Runtime,
        set: SetId,
        context: SetId,
        params: &Fields,
        f: impl FnOnce(&mut Runtime, SetId) -> Result<T, KernelError>,
    ) -> Result<T, KernelError> {
        self.in_context(rt, set, context, params)?;
        let outcome = f(rt, context);
        self.leave_context(rt, set, context, params)?;
        outcome
    }
}
