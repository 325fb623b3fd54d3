//! The set arena: definition, instantiation, composition and dispatch.
//!
//! All sets of one model live in one [`Runtime`] and are addressed by
//! [`SetId`]. The root set (`"set"`) is created with the runtime; every
//! other set reaches it through its delegation parents.
//!
//! ```text
//! root "set"
//!   └─ universal ─ rigidSortal ─ kind ─ Person      (classifiers, by define)
//!                                         └─ #12    (instance, by instantiate)
//!                                              sets_in: [Student, Child]
//! ```

use crate::error::KernelError;
use crate::event::Event;
use crate::member::{Fields, Initializer, Member, Slot, Stamp, is_reserved};
use crate::publisher::{Callback, Detach, Handler, Publisher};
use crate::set::{Composition, SetId, SetKind, SetRecord};
use std::collections::BTreeSet;
use std::rc::Rc;
use tracing::{debug, trace};

/// The root of every delegation chain.
pub const ROOT_SET: SetId = SetId(0);

/// What a new classifier carries before any rule is attached to it.
#[derive(Default)]
pub struct SetDefinition {
    pub name: String,
    pub members: Fields,
    pub initializer: Option<Initializer>,
}

impl SetDefinition {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn member(mut self, name: impl Into<String>, member: impl Into<Member>) -> Self {
        self.members.insert(name.into(), member.into());
        self
    }

    pub fn members(mut self, members: Fields) -> Self {
        self.members.extend(members);
        self
    }

    pub fn initializer(
        mut self,
        f: impl Fn(&mut Runtime, SetId, &Fields) -> Result<(), KernelError> + 'static,
    ) -> Self {
        self.initializer = Some(Rc::new(f));
        self
    }
}

/// Owner of every set, member and publisher of one model.
pub struct Runtime {
    sets: Vec<SetRecord>,
    next_stamp: Stamp,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            sets: vec![SetRecord::new("set".to_string(), SetKind::Classifier, None)],
            next_stamp: 0,
        }
    }

    pub fn root(&self) -> SetId {
        ROOT_SET
    }

    // ── records ──────────────────────────────────────────────────────────

    fn record(&self, id: SetId) -> Result<&SetRecord, KernelError> {
        self.sets.get(id.index()).ok_or(KernelError::UnknownSet(id))
    }

    fn live(&self, id: SetId) -> Result<&SetRecord, KernelError> {
        let record = self.record(id)?;
        if record.destroyed {
            return Err(KernelError::Destroyed(id));
        }
        Ok(record)
    }

    fn live_mut(&mut self, id: SetId) -> Result<&mut SetRecord, KernelError> {
        let record = self
            .sets
            .get_mut(id.index())
            .ok_or(KernelError::UnknownSet(id))?;
        if record.destroyed {
            return Err(KernelError::Destroyed(id));
        }
        Ok(record)
    }

    fn push(&mut self, record: SetRecord) -> SetId {
        let id = SetId(self.sets.len() as u64);
        self.sets.push(record);
        id
    }

    /// Fail fast unless `id` names a live set.
    pub fn ensure_live(&self, id: SetId) -> Result<(), KernelError> {
        self.live(id).map(|_| ())
    }

    pub fn contains(&self, id: SetId) -> bool {
        self.record(id).is_ok()
    }

    /// Number of sets not yet destroyed, the root included.
    pub fn live_count(&self) -> usize {
        self.sets.iter().filter(|r| !r.destroyed).count()
    }

    pub fn is_destroyed(&self, id: SetId) -> bool {
        self.record(id).is_ok_and(|r| r.destroyed)
    }

    /// A live set is always a set: every chain ends at the root.
    pub fn is_set(&self, id: SetId) -> bool {
        self.live(id).is_ok() && self.is_a(id, ROOT_SET)
    }

    pub fn name(&self, id: SetId) -> Result<&str, KernelError> {
        Ok(self.record(id)?.name.as_str())
    }

    pub fn kind(&self, id: SetId) -> Result<SetKind, KernelError> {
        Ok(self.record(id)?.kind)
    }

    pub fn parent(&self, id: SetId) -> Result<Option<SetId>, KernelError> {
        Ok(self.record(id)?.parent)
    }

    pub fn sets_in(&self, id: SetId) -> Result<&[SetId], KernelError> {
        Ok(self.live(id)?.sets_in.as_slice())
    }

    /// `id` followed by its delegation parents, ending at the root.
    pub fn chain(&self, id: SetId) -> Vec<SetId> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(set) = current {
            let Ok(record) = self.record(set) else {
                break;
            };
            chain.push(set);
            current = record.parent;
        }
        chain
    }

    fn chain_until_root(&self, id: SetId) -> Vec<SetId> {
        let mut chain = self.chain(id);
        chain.retain(|set| *set != ROOT_SET);
        chain
    }

    // ── definition ───────────────────────────────────────────────────────

    /// Create a classifier delegating to `parent`.
    pub fn define(
        &mut self,
        parent: SetId,
        definition: SetDefinition,
        mode: Composition,
    ) -> Result<SetId, KernelError> {
        self.live(parent)?;
        if let Some(name) = definition.members.keys().find(|name| is_reserved(name)) {
            return Err(KernelError::invalid(format!(
                "`{name}` is reserved and cannot be a member of `{}`",
                definition.name
            )));
        }

        let id = self.push(SetRecord::new(
            definition.name,
            SetKind::Classifier,
            Some(parent),
        ));
        if mode == Composition::Eager {
            let mut parents = self.chain(parent);
            parents.reverse();
            self.run_initializers(id, &parents, &Fields::new())?;
        }
        for (name, member) in definition.members {
            self.set_member(id, name, member)?;
        }
        self.live_mut(id)?.initializer = definition.initializer;

        debug!(set = %id, parent = %parent, ?mode, "classifier defined");
        Ok(id)
    }

    /// Run the initializers of `owners` (root-first order expected) on `this`.
    pub(crate) fn run_initializers(
        &mut self,
        this: SetId,
        owners: &[SetId],
        args: &Fields,
    ) -> Result<(), KernelError> {
        for owner in owners {
            let initializer = self.record(*owner)?.initializer.clone();
            if let Some(initializer) = initializer {
                initializer(self, this, args)?;
            }
        }
        Ok(())
    }

    // ── members ──────────────────────────────────────────────────────────

    fn fresh_stamp(&mut self) -> Stamp {
        self.next_stamp += 1;
        self.next_stamp
    }

    /// Assign an own member. Every assignment gets a fresh stamp.
    pub fn set_member(
        &mut self,
        id: SetId,
        name: impl Into<String>,
        member: impl Into<Member>,
    ) -> Result<(), KernelError> {
        let name = name.into();
        if is_reserved(&name) {
            return Err(KernelError::invalid(format!(
                "`{name}` is reserved and cannot be assigned"
            )));
        }
        let stamp = self.fresh_stamp();
        self.live_mut(id)?.members.insert(
            name,
            Slot {
                member: member.into(),
                stamp,
            },
        );
        Ok(())
    }

    pub fn remove_member(&mut self, id: SetId, name: &str) -> Result<Option<Member>, KernelError> {
        Ok(self
            .live_mut(id)?
            .members
            .remove(name)
            .map(|slot| slot.member))
    }

    pub fn own_member(&self, id: SetId, name: &str) -> Option<&Member> {
        self.live(id)
            .ok()
            .and_then(|record| record.members.get(name))
            .map(|slot| &slot.member)
    }

    pub fn own_member_names(&self, id: SetId) -> Vec<String> {
        self.live(id)
            .map(|record| record.members.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Look a member up on `id`, then along its delegation parents.
    pub fn member(&self, id: SetId, name: &str) -> Option<&Member> {
        if self.is_destroyed(id) {
            return None;
        }
        self.chain(id).into_iter().find_map(|set| {
            self.record(set)
                .ok()
                .and_then(|record| record.members.get(name))
                .map(|slot| &slot.member)
        })
    }

    fn visible_member_names(&self, id: SetId) -> BTreeSet<String> {
        self.chain(id)
            .into_iter()
            .filter_map(|set| self.record(set).ok())
            .flat_map(|record| record.members.keys().cloned())
            .collect()
    }

    /// Invoke the behavior member `name` with `id` as receiver.
    pub fn call(&mut self, id: SetId, name: &str, args: &Fields) -> Result<Member, KernelError> {
        self.live(id)?;
        let behavior = self
            .member(id, name)
            .and_then(Member::as_behavior)
            .cloned()
            .ok_or_else(|| KernelError::invalid(format!("`{name}` is not a behavior of {id}")))?;
        behavior.call(self, id, args)
    }

    // ── classification queries ───────────────────────────────────────────

    /// `id` is `set`, delegates to it, or acquired something that is it.
    pub fn is_a(&self, id: SetId, set: SetId) -> bool {
        let mut seen = BTreeSet::new();
        self.is_a_within(id, set, &mut seen)
    }

    fn is_a_within(&self, id: SetId, set: SetId, seen: &mut BTreeSet<SetId>) -> bool {
        if !seen.insert(id) {
            return false;
        }
        let Ok(record) = self.live(id) else {
            return false;
        };
        if id == set || self.chain(id).contains(&set) {
            return true;
        }
        record
            .sets_in
            .iter()
            .any(|acquired| self.is_a_within(*acquired, set, seen))
    }

    /// Every behavior visible on `probe` has a behavior counterpart on `id`.
    pub fn responds_as(&self, id: SetId, probe: SetId) -> bool {
        self.visible_member_names(probe)
            .into_iter()
            .filter(|name| self.member(probe, name).is_some_and(Member::is_behavior))
            .all(|name| self.member(id, &name).is_some_and(Member::is_behavior))
    }

    // ── composition ──────────────────────────────────────────────────────

    /// Copy the members of `classifier` and of its parents (root excluded)
    /// onto `instance`. Nearer definitions win. Members `instance` already
    /// owns are kept unless `overwrite`. Returns the number copied.
    pub fn compose(
        &mut self,
        instance: SetId,
        classifier: SetId,
        overwrite: bool,
    ) -> Result<usize, KernelError> {
        self.live(instance)?;
        self.live(classifier)?;

        let mut owners = self.chain_until_root(classifier);
        if overwrite {
            // farthest first so nearer definitions land last
            owners.reverse();
        }
        let mut lent: Vec<(String, Slot)> = Vec::new();
        for owner in owners {
            for (name, slot) in &self.record(owner)?.members {
                if !is_reserved(name) {
                    lent.push((name.clone(), slot.clone()));
                }
            }
        }

        let record = self.live_mut(instance)?;
        let mut copied = 0;
        for (name, slot) in lent {
            if !overwrite && record.members.contains_key(&name) {
                continue;
            }
            record.members.insert(name, slot);
            copied += 1;
        }
        Ok(copied)
    }

    /// Remove from `instance` the members `classifier`'s chain lent it and
    /// that are still unchanged. Members another acquired set also lends
    /// stay. Returns the number removed.
    pub fn decompose(&mut self, instance: SetId, classifier: SetId) -> Result<usize, KernelError> {
        self.live(classifier)?;
        let others: Vec<SetId> = self
            .live(instance)?
            .sets_in
            .iter()
            .copied()
            .filter(|set| *set != classifier)
            .collect();

        let lent = self.lent_stamps(&[classifier]);
        let kept: BTreeSet<Stamp> = self
            .lent_stamps(&others)
            .into_iter()
            .map(|(_, stamp)| stamp)
            .collect();

        let record = self.live_mut(instance)?;
        let mut removed = 0;
        for (name, stamp) in lent {
            let unchanged = record
                .members
                .get(&name)
                .is_some_and(|slot| slot.stamp == stamp);
            if unchanged && !kept.contains(&stamp) {
                record.members.remove(&name);
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn lent_stamps(&self, sets: &[SetId]) -> Vec<(String, Stamp)> {
        sets.iter()
            .flat_map(|set| self.chain(*set))
            .filter_map(|owner| self.record(owner).ok())
            .flat_map(|record| {
                record
                    .members
                    .iter()
                    .map(|(name, slot)| (name.clone(), slot.stamp))
            })
            .collect()
    }

    pub(crate) fn add_sets_in(&mut self, id: SetId, set: SetId) -> Result<(), KernelError> {
        let record = self.live_mut(id)?;
        if !record.sets_in.contains(&set) {
            record.sets_in.push(set);
        }
        Ok(())
    }

    pub(crate) fn remove_sets_in(&mut self, id: SetId, set: SetId) -> Result<(), KernelError> {
        self.live_mut(id)?.sets_in.retain(|s| *s != set);
        Ok(())
    }

    // ── events ───────────────────────────────────────────────────────────

    pub fn publisher(&self, id: SetId) -> Result<&Publisher, KernelError> {
        Ok(&self.live(id)?.publisher)
    }

    pub fn publisher_mut(&mut self, id: SetId) -> Result<&mut Publisher, KernelError> {
        Ok(&mut self.live_mut(id)?.publisher)
    }

    /// Register `callback` on `id`'s publisher.
    pub fn on(
        &mut self,
        id: SetId,
        event_name: &str,
        callback: Callback,
    ) -> Result<Rc<Handler>, KernelError> {
        self.on_in_context(id, event_name, callback, None)
    }

    /// Register `callback` on `id`'s publisher; the callback targets
    /// `context` instead of the event sender.
    pub fn on_in_context(
        &mut self,
        id: SetId,
        event_name: &str,
        callback: Callback,
        context: Option<SetId>,
    ) -> Result<Rc<Handler>, KernelError> {
        self.publisher_mut(id)?
            .on(event_name, callback, context)
            .ok_or_else(|| KernelError::invalid(format!("invalid event name `{event_name}`")))
    }

    /// Register one handler record for several event names.
    pub fn on_many(
        &mut self,
        id: SetId,
        event_names: &[&str],
        callback: Callback,
    ) -> Result<Rc<Handler>, KernelError> {
        let handler = Handler::new(callback, None);
        let publisher = self.publisher_mut(id)?;
        for event_name in event_names {
            publisher
                .on_handler(event_name, Rc::clone(&handler))
                .ok_or_else(|| KernelError::invalid(format!("invalid event name `{event_name}`")))?;
        }
        Ok(handler)
    }

    pub fn detach(&mut self, id: SetId, what: Detach<'_>) -> Result<(), KernelError> {
        self.publisher_mut(id)?.detach(what);
        Ok(())
    }

    pub fn mute(&self, id: SetId, event_name: &str) -> Result<(), KernelError> {
        self.publisher(id)?.mute(event_name);
        Ok(())
    }

    pub fn unmute(&self, id: SetId, event_name: &str) -> Result<(), KernelError> {
        self.publisher(id)?.unmute(event_name);
        Ok(())
    }

    /// Publishers a fire on `id` reaches: `id`'s chain, then (unless
    /// `no_propagation`) the chain of every acquired set. Each set appears
    /// once, at its first position.
    pub fn propagation_targets(&self, id: SetId, no_propagation: bool) -> Vec<SetId> {
        let mut targets = self.chain(id);
        if !no_propagation {
            if let Ok(record) = self.live(id) {
                for acquired in &record.sets_in {
                    targets.extend(self.chain(*acquired));
                }
            }
        }
        let mut seen = BTreeSet::new();
        targets.retain(|set| seen.insert(*set));
        targets
    }

    /// Dispatch on `id`'s own publisher only.
    pub fn fire_on(
        &mut self,
        id: SetId,
        event_name: &str,
        event: &mut Event,
    ) -> Result<(), KernelError> {
        let handlers = match self.record(id) {
            Ok(record) if !record.destroyed => record.publisher.matching(event_name),
            _ => return Ok(()),
        };
        if handlers.is_empty() {
            return Ok(());
        }
        event.set_full_name(event_name);
        trace!(set = %id, event = event_name, handlers = handlers.len(), "dispatch");
        for handler in handlers {
            handler.execute(self, event)?;
        }
        Ok(())
    }

    /// Dispatch on every publisher in [`Runtime::propagation_targets`].
    pub fn fire(
        &mut self,
        id: SetId,
        event_name: &str,
        event: &mut Event,
        no_propagation: bool,
    ) -> Result<(), KernelError> {
        event.set_full_name(event_name);
        for target in self.propagation_targets(id, no_propagation) {
            self.fire_on(target, event_name, event)?;
        }
        Ok(())
    }

    // ── lifecycle ────────────────────────────────────────────────────────

    /// Create an instance of `set`. `beforeInstantiate` may veto (returns
    /// `None`); `afterInstantiate` carries the new instance as
    /// `data.instance`.
    pub fn instantiate(&mut self, set: SetId, args: Fields) -> Result<Option<SetId>, KernelError> {
        self.live(set)?;

        let mut before = Event::action(set);
        before.data = args.clone();
        self.fire(set, "beforeInstantiate", &mut before, false)?;
        if before.is_prevented() {
            debug!(set = %set, "instantiation vetoed");
            return Ok(None);
        }

        let name = self.name(set)?.to_string();
        let instance = self.push(SetRecord::new(name, SetKind::Instance, Some(set)));
        let mut owners = self.chain(set);
        owners.reverse();
        if let Err(err) = self.run_initializers(instance, &owners, &args) {
            self.retire(instance);
            debug!(set = %set, instance = %instance, "instantiation abandoned");
            return Err(err);
        }

        let mut after = Event::notice(set).with_data("instance", instance);
        after.data.extend(args);
        self.fire(set, "afterInstantiate", &mut after, false)?;

        debug!(set = %set, instance = %instance, "instantiated");
        Ok(Some(instance))
    }

    /// Destroy `id` unless `beforeSelfDestruct` vetoes. Handlers of
    /// `afterSelfDestruct` still see the set intact; afterwards its
    /// members, acquired sets and handlers are gone.
    pub fn self_destruct(&mut self, id: SetId) -> Result<Event, KernelError> {
        self.live(id)?;

        let mut before = Event::action(id);
        self.fire(id, "beforeSelfDestruct", &mut before, false)?;
        if before.is_prevented() {
            debug!(set = %id, "self-destruct vetoed");
            return Ok(before);
        }

        let mut after = Event::notice(id);
        self.fire(id, "afterSelfDestruct", &mut after, false)?;

        if self.retire(id) {
            debug!(set = %id, "destroyed");
        }
        Ok(after)
    }

    /// Drop the state of `id` and mark it destroyed without firing events.
    fn retire(&mut self, id: SetId) -> bool {
        let Ok(record) = self.live_mut(id) else {
            return false;
        };
        record.members.clear();
        record.sets_in.clear();
        record.publisher = Publisher::default();
        record.destroyed = true;
        true
    }

    pub fn can_self_destruct(&mut self, id: SetId) -> Result<bool, KernelError> {
        self.live(id)?;
        let mut before = Event::action(id);
        self.fire(id, "beforeSelfDestruct", &mut before, false)?;
        Ok(!before.is_prevented())
    }
}
