//! The world: instances of a domain's kinds and relators.

use crate::domain::{Domain, SetRef};
use crate::error::DomainError;
use ontoset_kernel::{Event, Fields, KernelError, Member, Runtime, SetId};
use ontoset_onto::{Ontology, Stereotype};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Member holding an instance's world id.
pub const INSTANCE_ID: &str = "id";

/// An instance reference: by handle or by world id.
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceRef {
    Set(SetId),
    Id(Value),
}

impl From<SetId> for InstanceRef {
    fn from(set: SetId) -> Self {
        InstanceRef::Set(set)
    }
}

impl From<Value> for InstanceRef {
    fn from(id: Value) -> Self {
        InstanceRef::Id(id)
    }
}

impl From<&str> for InstanceRef {
    fn from(id: &str) -> Self {
        InstanceRef::Id(Value::String(id.to_string()))
    }
}

/// Instance filter. Every condition must hold.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub is_a: Option<SetRef>,
    /// Own members that must equal the given values.
    pub equals: BTreeMap<String, Value>,
}

impl Query {
    pub fn is_a(set: impl Into<SetRef>) -> Self {
        Self {
            is_a: Some(set.into()),
            ..Self::default()
        }
    }

    pub fn equals(mut self, member: impl Into<String>, value: Value) -> Self {
        self.equals.insert(member.into(), value);
        self
    }
}

/// A report-friendly snapshot of one instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceView {
    pub id: Value,
    /// Id of the domain type the instance was created from.
    pub of: Option<String>,
    /// Ids of every domain type the instance currently is.
    pub classifiers: Vec<String>,
    pub fields: BTreeMap<String, Value>,
}

pub struct World {
    domain: Domain,
    next_id: u64,
    kind_instances: Vec<SetId>,
    relator_instances: Vec<SetId>,
}

impl World {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            next_id: 0,
            kind_instances: Vec::new(),
            relator_instances: Vec::new(),
        }
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn runtime(&self) -> &Runtime {
        self.domain.runtime()
    }

    pub fn parts_mut(&mut self) -> (&mut Runtime, &Ontology) {
        self.domain.parts_mut()
    }

    fn consume_id(&mut self) -> Value {
        self.next_id += 1;
        Value::from(self.next_id)
    }

    /// Create an instance of `kind`. An `id` in `params` becomes the world
    /// id, otherwise the next counter value does; every other param is set
    /// as an own member. `None` when `beforeInstantiate` vetoed.
    pub fn instantiate(
        &mut self,
        kind: impl Into<SetRef>,
        mut params: Fields,
    ) -> Result<Option<SetId>, DomainError> {
        let kind = self.typed(&kind.into(), Stereotype::Kind)?;
        let id = match params.remove(INSTANCE_ID) {
            Some(Member::Value(id)) => id,
            Some(_) => {
                return Err(KernelError::invalid("instance id must be a plain value").into());
            }
            None => self.consume_id(),
        };

        let rt = self.domain.runtime_mut();
        let Some(instance) = rt.instantiate(kind, params.clone())? else {
            return Ok(None);
        };
        for (name, member) in params {
            rt.set_member(instance, &name, member)?;
        }
        rt.set_member(instance, INSTANCE_ID, id.clone())?;
        self.kind_instances.push(instance);
        debug!(instance = %instance, id = %id, "instance added to world");
        Ok(Some(instance))
    }

    /// Create a relation of `relator` over `parts` (slot name to
    /// `Member::Set`, or `Member::Sets` for list slots).
    pub fn relate(
        &mut self,
        relator: impl Into<SetRef>,
        parts: Fields,
    ) -> Result<Option<SetId>, DomainError> {
        let relator = self.typed(&relator.into(), Stereotype::Relator)?;
        let (rt, onto) = self.domain.parts_mut();
        let Some(relation) = onto.relate(rt, relator, parts)? else {
            return Ok(None);
        };
        let id = self.consume_id();
        self.domain
            .runtime_mut()
            .set_member(relation, INSTANCE_ID, id.clone())?;
        self.relator_instances.push(relation);
        debug!(relation = %relation, id = %id, "relation added to world");
        Ok(Some(relation))
    }

    /// Self-destruct an instance or relation. Relations it takes part in
    /// are torn down by their relators.
    pub fn destroy(&mut self, target: impl Into<InstanceRef>) -> Result<Event, DomainError> {
        let instance = self.instance(&target.into())?;
        let event = self.domain.runtime_mut().self_destruct(instance)?;
        self.prune();
        Ok(event)
    }

    /// Run `f` with every relation in `relations` entered; each is left
    /// again afterwards unless it was entered already.
    pub fn with_relations<T>(
        &mut self,
        relations: &[SetId],
        f: impl FnOnce(&mut Runtime, &Ontology) -> Result<T, KernelError>,
    ) -> Result<T, DomainError> {
        if relations.is_empty() {
            return Err(KernelError::invalid("the context is required").into());
        }
        let (rt, onto) = self.domain.parts_mut();
        for relation in relations {
            if !onto.is_live_relation(*relation) {
                return Err(DomainError::lookup(format!(
                    "{relation} is not a live relation"
                )));
            }
        }
        let mut entered = Vec::new();
        for relation in relations {
            if !onto.is_relation_entered(*relation) {
                onto.enter_relation_context(rt, *relation)?;
                entered.push(*relation);
            }
        }
        let outcome = f(&mut *rt, onto);
        for relation in entered {
            if onto.is_live_relation(relation) {
                onto.leave_relation_context(rt, relation)?;
            }
        }
        Ok(outcome?)
    }

    // ── queries ──────────────────────────────────────────────────────────

    /// Live instances of kinds, in creation order.
    pub fn kind_instances(&self) -> Vec<SetId> {
        self.live(&self.kind_instances)
    }

    /// Live relations, in creation order.
    pub fn relator_instances(&self) -> Vec<SetId> {
        self.live(&self.relator_instances)
    }

    pub fn query_kinds(&self, query: &Query) -> Result<Vec<SetId>, DomainError> {
        self.filter(self.kind_instances(), query)
    }

    pub fn query_relators(&self, query: &Query) -> Result<Vec<SetId>, DomainError> {
        self.filter(self.relator_instances(), query)
    }

    /// Matching instances, then matching relations.
    pub fn query(&self, query: &Query) -> Result<Vec<SetId>, DomainError> {
        let mut found = self.query_kinds(query)?;
        found.extend(self.query_relators(query)?);
        Ok(found)
    }

    pub fn find_by_id(&self, id: &Value) -> Option<SetId> {
        self.kind_instances()
            .into_iter()
            .chain(self.relator_instances())
            .find(|instance| {
                self.runtime()
                    .own_member(*instance, INSTANCE_ID)
                    .is_some_and(|member| member.matches_value(id))
            })
    }

    /// Whether `instance` is `set`, directly or through a role it fills
    /// in a live relation.
    pub fn instance_is_a(
        &self,
        instance: SetId,
        set: impl Into<SetRef>,
    ) -> Result<bool, DomainError> {
        let set = self.domain.resolve(&set.into())?;
        Ok(self.is_a(instance, set))
    }

    fn is_a(&self, instance: SetId, set: SetId) -> bool {
        let rt = self.runtime();
        if rt.is_a(instance, set) {
            return true;
        }
        let onto = self.domain.ontology();
        onto.live_relations().into_iter().any(|relation| {
            onto.related_parts(relation).is_ok_and(|parts| {
                parts.values().any(|slot| {
                    slot.pairs()
                        .iter()
                        .any(|pair| pair.part == instance && rt.is_a(pair.role, set))
                })
            })
        })
    }

    pub fn describe(&self, target: impl Into<InstanceRef>) -> Result<InstanceView, DomainError> {
        let instance = self.instance(&target.into())?;
        let rt = self.runtime();
        let id = rt
            .own_member(instance, INSTANCE_ID)
            .map(Member::to_json)
            .unwrap_or(Value::Null);
        let of = rt
            .chain(instance)
            .into_iter()
            .find_map(|level| self.domain.entry(level))
            .map(|entry| entry.id.clone());
        let classifiers = self
            .domain
            .types()
            .into_iter()
            .filter(|(set, _)| self.is_a(instance, *set))
            .map(|(_, entry)| entry.id.clone())
            .collect();
        let fields = rt
            .own_member_names(instance)
            .into_iter()
            .filter(|name| name != INSTANCE_ID)
            .filter_map(|name| {
                let member = rt.own_member(instance, &name)?;
                (!member.is_behavior()).then(|| (name, member.to_json()))
            })
            .collect();
        Ok(InstanceView {
            id,
            of,
            classifiers,
            fields,
        })
    }

    // ── helpers ──────────────────────────────────────────────────────────

    /// Resolve an instance reference to a live instance of this world.
    pub fn instance(&self, target: &InstanceRef) -> Result<SetId, DomainError> {
        match target {
            InstanceRef::Id(id) => self
                .find_by_id(id)
                .ok_or_else(|| DomainError::lookup(format!("no instance with id {id}"))),
            InstanceRef::Set(set) => {
                if self.runtime().is_set(*set) {
                    Ok(*set)
                } else {
                    Err(DomainError::lookup(format!("{set} is not a live instance")))
                }
            }
        }
    }

    fn typed(&self, set: &SetRef, stereotype: Stereotype) -> Result<SetId, DomainError> {
        let set = self.domain.resolve(set)?;
        match self.domain.entry(set) {
            Some(entry) if entry.stereotype == stereotype => Ok(set),
            _ => Err(KernelError::invalid(format!("{set} is not a {stereotype}")).into()),
        }
    }

    fn filter(&self, instances: Vec<SetId>, query: &Query) -> Result<Vec<SetId>, DomainError> {
        let set = query
            .is_a
            .as_ref()
            .map(|set| self.domain.resolve(set))
            .transpose()?;
        let rt = self.runtime();
        Ok(instances
            .into_iter()
            .filter(|instance| set.is_none_or(|set| self.is_a(*instance, set)))
            .filter(|instance| {
                query.equals.iter().all(|(name, value)| {
                    rt.own_member(*instance, name)
                        .is_some_and(|member| member.matches_value(value))
                })
            })
            .collect())
    }

    fn live(&self, instances: &[SetId]) -> Vec<SetId> {
        let rt = self.runtime();
        instances
            .iter()
            .copied()
            .filter(|instance| rt.is_set(*instance))
            .collect()
    }

    fn prune(&mut self) {
        let rt = self.domain.runtime();
        self.kind_instances.retain(|instance| rt.is_set(*instance));
        self.relator_instances.retain(|instance| rt.is_set(*instance));
    }
}
