//! Relators: instances that mediate a material relation between parts.
//!
//! A relator classifier declares role slots. Instantiating it with one part
//! (or a list of parts) per slot creates one role instance per part. While
//! the relation context is entered, each part has become its role instance
//! and carries a back reference to the relator under the relator's
//! `relatorPropertyId`.
//!
//! ```text
//! Sale #40 ── buyer  ─▶ { part: ann #12, role_instance: Buyer #41 }
//!          └─ seller ─▶ { part: bob #13, role_instance: Seller #42 }
//! ```
//!
//! The relation tears itself down when a part self-destructs, when a part
//! degenerates out of the set its role specializes, or when the relator
//! itself is destroyed.

use crate::ontology::Ontology;
use crate::vocabulary::{RELATOR_PROPERTY_ID, SPECIALIZATION_OF};
use ontoset_kernel::{
    Behavior, Composition, Detach, Fields, Handler, KernelError, Member, MutationParams,
    MutationStatus, Runtime, SetDefinition, SetId, SetKind, callback,
};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

/// Whether a relation's roles hold outside an explicit context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextPolicy {
    /// Parts bear their roles only inside `enter`/`leave_relation_context`.
    #[default]
    Scoped,
    /// The context is entered when the relation is created and stays
    /// entered until teardown.
    AlwaysEntered,
}

/// Slots and policy of a relator classifier.
#[derive(Debug, Clone, Default)]
pub struct RelatorDeclaration {
    /// Back-reference member installed on parts. Required to instantiate.
    pub property_id: Option<String>,
    /// `(slot name, role classifier)` in declaration order.
    pub slots: Vec<(String, SetId)>,
    pub policy: ContextPolicy,
}

/// One part and the role instance it bears in a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolePair {
    pub part: SetId,
    pub role_instance: SetId,
    pub role: SetId,
}

/// The parts filling one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelatedParts {
    One(RolePair),
    Many(Vec<RolePair>),
}

impl RelatedParts {
    pub fn pairs(&self) -> &[RolePair] {
        match self {
            RelatedParts::One(pair) => std::slice::from_ref(pair),
            RelatedParts::Many(pairs) => pairs,
        }
    }
}

struct RelationState {
    parts: BTreeMap<String, RelatedParts>,
    entered: bool,
    subscriptions: Vec<(SetId, Rc<Handler>)>,
}

impl RelationState {
    fn pairs(&self) -> Vec<RolePair> {
        self.parts
            .values()
            .flat_map(|parts| parts.pairs().iter().copied())
            .collect()
    }
}

/// Relator declarations and live relations of one ontology.
#[derive(Default)]
pub(crate) struct Relations {
    declarations: BTreeMap<SetId, RelatorDeclaration>,
    live: BTreeMap<SetId, RelationState>,
}

impl Relations {
    /// The declaration of the nearest relator classifier on `set`'s chain.
    fn declaration_for(&self, rt: &Runtime, set: SetId) -> Option<RelatorDeclaration> {
        rt.chain(set)
            .into_iter()
            .find_map(|level| self.declarations.get(&level).cloned())
    }
}

type Registry = Rc<RefCell<Relations>>;

pub(crate) fn define(
    rt: &mut Runtime,
    universal: SetId,
    relations: &Registry,
) -> Result<SetId, KernelError> {
    let weak = Rc::downgrade(relations);
    let enter = weak.clone();
    let leave = weak.clone();
    let definition = SetDefinition::named("relator")
        .member(
            "enterRelationContext",
            Behavior::new(move |rt, this, _| {
                enter_context(rt, &upgrade(&enter)?, this)?;
                Ok(Member::Set(this))
            }),
        )
        .member(
            "leaveRelationContext",
            Behavior::new(move |rt, this, _| {
                leave_context(rt, &upgrade(&leave)?, this)?;
                Ok(Member::Set(this))
            }),
        )
        .initializer(move |rt, this, args| {
            if rt.kind(this)? == SetKind::Classifier {
                return Ok(());
            }
            construct(rt, &weak, this, args)
        });
    rt.define(universal, definition, Composition::Eager)
}

fn upgrade(weak: &Weak<RefCell<Relations>>) -> Result<Registry, KernelError> {
    weak.upgrade()
        .ok_or_else(|| KernelError::invalid("the ontology owning this relator is gone"))
}

fn property_id(rt: &Runtime, relator: SetId) -> Result<String, KernelError> {
    rt.member(relator, RELATOR_PROPERTY_ID)
        .and_then(Member::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            KernelError::invalid(format!(
                "relator {relator} must name its {RELATOR_PROPERTY_ID}"
            ))
        })
}

/// Relator initializer: check every slot and create the role instances.
fn construct(
    rt: &mut Runtime,
    weak: &Weak<RefCell<Relations>>,
    relator: SetId,
    args: &Fields,
) -> Result<(), KernelError> {
    let relations = upgrade(weak)?;
    property_id(rt, relator)?;
    let declaration = relations
        .borrow()
        .declaration_for(rt, relator)
        .unwrap_or_default();

    if let Some((slot, _)) = declaration
        .slots
        .iter()
        .find(|(slot, _)| !args.contains_key(slot))
    {
        return Err(KernelError::constraint(format!("missing relation `{slot}`")));
    }

    let mut state = RelationState {
        parts: BTreeMap::new(),
        entered: false,
        subscriptions: Vec::new(),
    };
    if let Err(err) = bind_slots(rt, weak, &mut state, relator, &declaration, args) {
        if let Err(cleanup) = release(rt, &state) {
            warn!(relator = %relator, error = %cleanup, "partial relation not fully released");
        }
        return Err(err);
    }

    debug!(relator = %relator, slots = state.parts.len(), "relation created");
    relations.borrow_mut().live.insert(relator, state);
    Ok(())
}

/// Bind every declared slot. On error, `state` holds what was bound so far.
fn bind_slots(
    rt: &mut Runtime,
    weak: &Weak<RefCell<Relations>>,
    state: &mut RelationState,
    relator: SetId,
    declaration: &RelatorDeclaration,
    args: &Fields,
) -> Result<(), KernelError> {
    for (slot, role) in &declaration.slots {
        let supplied = args
            .get(slot)
            .ok_or_else(|| KernelError::constraint(format!("missing relation `{slot}`")))?;
        let parts = match supplied {
            Member::Set(part) => {
                RelatedParts::One(bind_part(rt, weak, state, relator, slot, *role, *part)?)
            }
            Member::Sets(parts) => {
                let mut pairs = Vec::with_capacity(parts.len());
                for part in parts {
                    match bind_part(rt, weak, state, relator, slot, *role, *part) {
                        Ok(pair) => pairs.push(pair),
                        Err(err) => {
                            state.parts.insert(slot.clone(), RelatedParts::Many(pairs));
                            return Err(err);
                        }
                    }
                }
                RelatedParts::Many(pairs)
            }
            _ => {
                return Err(KernelError::constraint(format!(
                    "relation `{slot}` must be a set or a list of sets"
                )));
            }
        };
        state.parts.insert(slot.clone(), parts);
    }

    let teardown = weak.clone();
    let handler = rt.on(
        relator,
        "afterSelfDestruct",
        callback(move |rt, relator, _| destroy(rt, &teardown, relator)),
    )?;
    state.subscriptions.push((relator, handler));
    Ok(())
}

/// Check that `part` can bear `role`, create its role instance and watch the
/// part for events that end the relation.
fn bind_part(
    rt: &mut Runtime,
    weak: &Weak<RefCell<Relations>>,
    state: &mut RelationState,
    relator: SetId,
    slot: &str,
    role: SetId,
    part: SetId,
) -> Result<RolePair, KernelError> {
    rt.ensure_live(part)?;
    if !rt.is_a(part, role) && !rt.can_become(part, role, MutationParams::local())? {
        return Err(KernelError::constraint(format!(
            "{part} can't become role `{slot}`"
        )));
    }
    let role_instance = rt
        .instantiate(role, Fields::new())?
        .ok_or_else(|| KernelError::constraint(format!("role `{slot}` refused a new instance")))?;

    let on_destroy = weak.clone();
    let destroyed = rt.on_in_context(
        part,
        "afterSelfDestruct",
        callback(move |rt, relator, _| destroy(rt, &on_destroy, relator)),
        Some(relator),
    )?;
    let required = rt.member(role, SPECIALIZATION_OF).and_then(Member::as_set);
    let on_degenerate = weak.clone();
    let degenerated = rt.on_in_context(
        part,
        "afterDegenerate:base",
        callback(move |rt, relator, event| {
            if required.is_some() && event.target_set() == required {
                destroy(rt, &on_degenerate, relator)?;
            }
            Ok(())
        }),
        Some(relator),
    )?;
    state.subscriptions.push((part, destroyed));
    state.subscriptions.push((part, degenerated));

    Ok(RolePair {
        part,
        role_instance,
        role,
    })
}

fn enter_context(rt: &mut Runtime, relations: &Registry, relator: SetId) -> Result<(), KernelError> {
    let pairs = live_pairs(relations, relator)?;
    let property = property_id(rt, relator)?;
    for pair in pairs {
        enter_pair(rt, relator, &property, pair)?;
    }
    if let Some(state) = relations.borrow_mut().live.get_mut(&relator) {
        state.entered = true;
    }
    Ok(())
}

fn enter_pair(
    rt: &mut Runtime,
    relator: SetId,
    property: &str,
    pair: RolePair,
) -> Result<(), KernelError> {
    let params = MutationParams {
        skip_initialization: true,
        no_propagation: true,
        ..MutationParams::default()
    };
    let event = rt.become_set(pair.part, pair.role_instance, params)?;
    if !event.success() && event.status() != Some(MutationStatus::IsAlready) {
        debug!(relator = %relator, part = %pair.part, status = ?event.status(), "part did not enter its role");
        return Ok(());
    }
    rt.set_member(pair.part, property, relator)
}

fn leave_context(rt: &mut Runtime, relations: &Registry, relator: SetId) -> Result<(), KernelError> {
    let pairs = live_pairs(relations, relator)?;
    let property = property_id(rt, relator)?;
    for pair in pairs {
        leave_pair(rt, relator, &property, pair)?;
    }
    if let Some(state) = relations.borrow_mut().live.get_mut(&relator) {
        state.entered = false;
    }
    Ok(())
}

fn leave_pair(
    rt: &mut Runtime,
    relator: SetId,
    property: &str,
    pair: RolePair,
) -> Result<(), KernelError> {
    if rt.is_destroyed(pair.part) || rt.is_destroyed(pair.role_instance) {
        return Ok(());
    }
    rt.degenerate(pair.part, pair.role_instance, MutationParams::local())?;
    let points_here = rt
        .own_member(pair.part, property)
        .and_then(Member::as_set)
        == Some(relator);
    if points_here {
        rt.remove_member(pair.part, property)?;
    }
    Ok(())
}

fn live_pairs(relations: &Registry, relator: SetId) -> Result<Vec<RolePair>, KernelError> {
    relations
        .borrow()
        .live
        .get(&relator)
        .map(RelationState::pairs)
        .ok_or_else(|| KernelError::invalid(format!("{relator} is not a live relation")))
}

/// Tear the relation down. A relation already being torn down is left alone.
fn destroy(
    rt: &mut Runtime,
    weak: &Weak<RefCell<Relations>>,
    relator: SetId,
) -> Result<(), KernelError> {
    let Some(relations) = weak.upgrade() else {
        return Ok(());
    };
    let Some(state) = relations.borrow_mut().live.remove(&relator) else {
        return Ok(());
    };
    warn!(relator = %relator, "relation torn down");

    if state.entered && !rt.is_destroyed(relator) {
        let property = property_id(rt, relator)?;
        for pair in state.pairs() {
            leave_pair(rt, relator, &property, pair)?;
        }
    }
    release(rt, &state)?;
    if !rt.is_destroyed(relator) {
        rt.self_destruct(relator)?;
    }
    Ok(())
}

/// Detach the relation's handlers and destroy its role instances.
fn release(rt: &mut Runtime, state: &RelationState) -> Result<(), KernelError> {
    for (set, handler) in &state.subscriptions {
        if !rt.is_destroyed(*set) {
            rt.detach(*set, Detach::Handler(handler))?;
        }
    }
    for pair in state.pairs() {
        if !rt.is_destroyed(pair.role_instance) {
            rt.self_destruct(pair.role_instance)?;
        }
    }
    Ok(())
}

impl Ontology {
    /// Register a relator classifier derived from `base` (the relator base
    /// by default) with its slots and policy.
    pub fn define_relator(
        &self,
        rt: &mut Runtime,
        mut definition: SetDefinition,
        declaration: RelatorDeclaration,
        base: Option<SetId>,
    ) -> Result<SetId, KernelError> {
        let base = base.unwrap_or(self.relator);
        if !rt.is_a(base, self.relator) {
            return Err(KernelError::invalid(format!(
                "relator `{}` must derive from a relator",
                definition.name
            )));
        }
        for (_, role) in &declaration.slots {
            rt.ensure_live(*role)?;
        }
        if let Some(property) = &declaration.property_id {
            definition = definition.member(RELATOR_PROPERTY_ID, property.as_str());
        }
        let relator = rt.define(base, definition, Composition::Eager)?;
        self.relations
            .borrow_mut()
            .declarations
            .insert(relator, declaration);
        Ok(relator)
    }

    /// Create a relation: instantiate `relator` with parts per slot
    /// (`Member::Set` for one, `Member::Sets` for many). Enters the context
    /// right away under [`ContextPolicy::AlwaysEntered`].
    pub fn relate(
        &self,
        rt: &mut Runtime,
        relator: SetId,
        parts: Fields,
    ) -> Result<Option<SetId>, KernelError> {
        let Some(instance) = rt.instantiate(relator, parts)? else {
            return Ok(None);
        };
        if self.context_policy(rt, instance) == ContextPolicy::AlwaysEntered {
            self.enter_relation_context(rt, instance)?;
        }
        Ok(Some(instance))
    }

    pub fn declaration(&self, rt: &Runtime, relator: SetId) -> Option<RelatorDeclaration> {
        self.relations.borrow().declaration_for(rt, relator)
    }

    pub fn context_policy(&self, rt: &Runtime, relator: SetId) -> ContextPolicy {
        self.declaration(rt, relator)
            .map(|declaration| declaration.policy)
            .unwrap_or_default()
    }

    /// Compose every part with its role instance and install the back
    /// reference.
    pub fn enter_relation_context(
        &self,
        rt: &mut Runtime,
        relator: SetId,
    ) -> Result<(), KernelError> {
        enter_context(rt, &self.relations, relator)
    }

    /// Reverse [`Ontology::enter_relation_context`].
    pub fn leave_relation_context(
        &self,
        rt: &mut Runtime,
        relator: SetId,
    ) -> Result<(), KernelError> {
        leave_context(rt, &self.relations, relator)
    }

    pub fn is_relation_entered(&self, relator: SetId) -> bool {
        self.relations
            .borrow()
            .live
            .get(&relator)
            .is_some_and(|state| state.entered)
    }

    /// Run `f` with the relation context entered. A relation that was
    /// already entered stays entered afterwards.
    pub fn under_relation<T>(
        &self,
        rt: &mut Runtime,
        relator: SetId,
        f: impl FnOnce(&mut Runtime, &BTreeMap<String, RelatedParts>) -> Result<T, KernelError>,
    ) -> Result<T, KernelError> {
        let was_entered = self.is_relation_entered(relator);
        if !was_entered {
            self.enter_relation_context(rt, relator)?;
        }
        let parts = self.related_parts(relator)?;
        let outcome = f(rt, &parts);
        if !was_entered && self.is_live_relation(relator) {
            self.leave_relation_context(rt, relator)?;
        }
        outcome
    }

    pub fn is_live_relation(&self, relator: SetId) -> bool {
        self.relations.borrow().live.contains_key(&relator)
    }

    /// Live relations, in creation order.
    pub fn live_relations(&self) -> Vec<SetId> {
        self.relations.borrow().live.keys().copied().collect()
    }

    pub fn related_parts(
        &self,
        relator: SetId,
    ) -> Result<BTreeMap<String, RelatedParts>, KernelError> {
        self.relations
            .borrow()
            .live
            .get(&relator)
            .map(|state| state.parts.clone())
            .ok_or_else(|| KernelError::invalid(format!("{relator} is not a live relation")))
    }

    /// Add `part` to `slot`. A slot holding a list grows; an empty slot
    /// takes the part; a slot holding one part is a constraint violation.
    pub fn add_relation_part(
        &self,
        rt: &mut Runtime,
        relator: SetId,
        slot: &str,
        part: SetId,
    ) -> Result<RolePair, KernelError> {
        let role = self
            .declaration(rt, relator)
            .and_then(|declaration| {
                declaration
                    .slots
                    .into_iter()
                    .find_map(|(name, role)| (name == slot).then_some(role))
            })
            .ok_or_else(|| KernelError::invalid(format!("relator {relator} has no slot `{slot}`")))?;

        let (filled, entered) = {
            let relations = self.relations.borrow();
            let state = relations
                .live
                .get(&relator)
                .ok_or_else(|| KernelError::invalid(format!("{relator} is not a live relation")))?;
            (state.parts.get(slot).cloned(), state.entered)
        };
        if let Some(RelatedParts::One(_)) = filled {
            return Err(KernelError::constraint(format!(
                "the part `{slot}` is already defined"
            )));
        }

        let weak = Rc::downgrade(&self.relations);
        let mut scratch = RelationState {
            parts: BTreeMap::new(),
            entered,
            subscriptions: Vec::new(),
        };
        let pair = bind_part(rt, &weak, &mut scratch, relator, slot, role, part)?;

        {
            let mut relations = self.relations.borrow_mut();
            let state = relations
                .live
                .get_mut(&relator)
                .ok_or_else(|| KernelError::invalid(format!("{relator} is not a live relation")))?;
            state.subscriptions.extend(scratch.subscriptions);
            match state.parts.get_mut(slot) {
                Some(RelatedParts::Many(pairs)) => pairs.push(pair),
                _ => {
                    state.parts.insert(slot.to_string(), RelatedParts::One(pair));
                }
            }
        }
        if entered {
            let property = property_id(rt, relator)?;
            enter_pair(rt, relator, &property, pair)?;
        }
        Ok(pair)
    }

    /// Tear the relation down: leave its context, stop watching its parts,
    /// destroy its role instances and the relator.
    pub fn destroy_relation(&self, rt: &mut Runtime, relator: SetId) -> Result<(), KernelError> {
        destroy(rt, &Rc::downgrade(&self.relations), relator)
    }
}
