//! Scenario replay: a JSON list of world operations run in order.
//!
//! ```json
//! { "steps": [
//!   { "op": "instantiate", "kind": "Person", "as": "ann" },
//!   { "op": "transitTo", "instance": "ann", "phase": "Adult" },
//!   { "op": "check", "instance": "ann", "isA": "Adult" }
//! ] }
//! ```
//!
//! Instances are named by the alias given with `as`, or by world id. A
//! step that fails aborts the run; a check or query whose expectation does
//! not hold is recorded and the run goes on.

use crate::document::read_json;
use crate::domain::SetRef;
use crate::error::DomainError;
use crate::world::{InstanceRef, InstanceView, Query, World};
use ontoset_kernel::{Event, Fields, Member, MutationParams, SetId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Parts of one relator slot: one alias or a list of aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PartRefs {
    One(String),
    Many(Vec<String>),
}

fn expected() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Step {
    Instantiate {
        kind: String,
        #[serde(default, rename = "as", skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
        #[serde(default)]
        fields: BTreeMap<String, Value>,
    },
    Become {
        instance: String,
        set: String,
    },
    Degenerate {
        instance: String,
        set: String,
    },
    TransitTo {
        instance: String,
        phase: String,
    },
    Relate {
        relator: String,
        parts: BTreeMap<String, PartRefs>,
        #[serde(default, rename = "as", skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
    EnterContext {
        relation: String,
    },
    LeaveContext {
        relation: String,
    },
    Destroy {
        instance: String,
    },
    /// Fire an action event on an instance or a type.
    Fire {
        target: String,
        event: String,
    },
    Check {
        instance: String,
        #[serde(rename = "isA")]
        is_a: String,
        #[serde(default = "expected")]
        expect: bool,
    },
    Query {
        #[serde(default, rename = "isA", skip_serializing_if = "Option::is_none")]
        is_a: Option<String>,
        #[serde(default)]
        equals: BTreeMap<String, Value>,
        /// Labels the query must return, in order.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expect: Option<Vec<String>>,
    },
}

impl Step {
    pub fn op(&self) -> &'static str {
        match self {
            Step::Instantiate { .. } => "instantiate",
            Step::Become { .. } => "become",
            Step::Degenerate { .. } => "degenerate",
            Step::TransitTo { .. } => "transitTo",
            Step::Relate { .. } => "relate",
            Step::EnterContext { .. } => "enterContext",
            Step::LeaveContext { .. } => "leaveContext",
            Step::Destroy { .. } => "destroy",
            Step::Fire { .. } => "fire",
            Step::Check { .. } => "check",
            Step::Query { .. } => "query",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_path(path: &Path) -> Result<Self, DomainError> {
        read_json(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub index: usize,
    pub op: String,
    /// A mutation status, `ok`, `vetoed`, `pass` or `fail`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matched: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    pub passed: bool,
    pub steps: Vec<StepOutcome>,
    /// Indices of checks and queries that did not hold.
    pub failures: Vec<usize>,
    /// Live instances and relations at the end, by label.
    pub instances: BTreeMap<String, InstanceView>,
}

/// Run every step of `scenario` against `world`.
pub fn run_scenario(world: &mut World, scenario: &Scenario) -> Result<ScenarioReport, DomainError> {
    let mut runner = Runner {
        world,
        aliases: BTreeMap::new(),
    };
    let mut steps = Vec::with_capacity(scenario.steps.len());
    let mut failures = Vec::new();
    for (index, step) in scenario.steps.iter().enumerate() {
        let outcome = runner
            .step(index, step)
            .map_err(|source| DomainError::Step {
                index,
                op: step.op().to_string(),
                source: Box::new(source),
            })?;
        debug!(index, op = step.op(), status = %outcome.status, "scenario step");
        if outcome.status == "fail" {
            failures.push(index);
        }
        steps.push(outcome);
    }

    let mut instances = BTreeMap::new();
    let world = &*runner.world;
    for instance in world
        .kind_instances()
        .into_iter()
        .chain(world.relator_instances())
    {
        instances.insert(runner.label(instance), world.describe(instance)?);
    }
    Ok(ScenarioReport {
        passed: failures.is_empty(),
        steps,
        failures,
        instances,
    })
}

struct Runner<'w> {
    world: &'w mut World,
    aliases: BTreeMap<String, SetId>,
}

impl Runner<'_> {
    fn step(&mut self, index: usize, step: &Step) -> Result<StepOutcome, DomainError> {
        let mut outcome = StepOutcome {
            index,
            op: step.op().to_string(),
            status: "ok".to_string(),
            subject: None,
            matched: Vec::new(),
        };
        match step {
            Step::Instantiate {
                kind,
                alias,
                fields,
            } => {
                let params: Fields = fields
                    .iter()
                    .map(|(name, value)| (name.clone(), Member::Value(value.clone())))
                    .collect();
                match self.world.instantiate(kind.as_str(), params)? {
                    Some(instance) => {
                        if let Some(alias) = alias {
                            self.aliases.insert(alias.clone(), instance);
                        }
                        outcome.subject = Some(self.label(instance));
                    }
                    None => outcome.status = "vetoed".to_string(),
                }
            }
            Step::Become { instance, set } => {
                let instance = self.instance(instance)?;
                let set = self.type_id(set)?;
                let (rt, _) = self.world.parts_mut();
                let event = rt.become_set(instance, set, MutationParams::default())?;
                outcome.status = mutation_status(&event);
            }
            Step::Degenerate { instance, set } => {
                let instance = self.instance(instance)?;
                let set = self.type_id(set)?;
                let (rt, _) = self.world.parts_mut();
                let event = rt.degenerate(instance, set, MutationParams::default())?;
                outcome.status = mutation_status(&event);
            }
            Step::TransitTo { instance, phase } => {
                let instance = self.instance(instance)?;
                let phase = self.type_id(phase)?;
                let (rt, onto) = self.world.parts_mut();
                let event = onto.transit_to(rt, instance, phase, MutationParams::default())?;
                outcome.status = mutation_status(&event);
            }
            Step::Relate {
                relator,
                parts,
                alias,
            } => {
                let mut fields = Fields::new();
                for (slot, refs) in parts {
                    let member = match refs {
                        PartRefs::One(part) => Member::Set(self.instance(part)?),
                        PartRefs::Many(list) => Member::Sets(
                            list.iter()
                                .map(|part| self.instance(part))
                                .collect::<Result<_, _>>()?,
                        ),
                    };
                    fields.insert(slot.clone(), member);
                }
                match self.world.relate(relator.as_str(), fields)? {
                    Some(relation) => {
                        if let Some(alias) = alias {
                            self.aliases.insert(alias.clone(), relation);
                        }
                        outcome.subject = Some(self.label(relation));
                    }
                    None => outcome.status = "vetoed".to_string(),
                }
            }
            Step::EnterContext { relation } => {
                let relation = self.instance(relation)?;
                let (rt, onto) = self.world.parts_mut();
                onto.enter_relation_context(rt, relation)?;
            }
            Step::LeaveContext { relation } => {
                let relation = self.instance(relation)?;
                let (rt, onto) = self.world.parts_mut();
                onto.leave_relation_context(rt, relation)?;
            }
            Step::Destroy { instance } => {
                let instance = self.instance(instance)?;
                outcome.subject = Some(self.label(instance));
                if self.world.destroy(instance)?.is_prevented() {
                    outcome.status = "vetoed".to_string();
                }
            }
            Step::Fire { target, event } => {
                let target = match self.instance(target) {
                    Ok(instance) => instance,
                    Err(_) => self.type_id(target)?,
                };
                let (rt, _) = self.world.parts_mut();
                let mut fired = Event::action(target);
                rt.fire(target, event, &mut fired, false)?;
                if fired.is_prevented() {
                    outcome.status = "vetoed".to_string();
                }
            }
            Step::Check {
                instance,
                is_a,
                expect,
            } => {
                let instance = self.instance(instance)?;
                let holds = self.world.instance_is_a(instance, is_a.as_str())?;
                outcome.subject = Some(self.label(instance));
                outcome.status = pass_or_fail(holds == *expect);
            }
            Step::Query {
                is_a,
                equals,
                expect,
            } => {
                let query = Query {
                    is_a: is_a.clone().map(SetRef::Id),
                    equals: equals.clone(),
                };
                outcome.matched = self
                    .world
                    .query(&query)?
                    .into_iter()
                    .map(|instance| self.label(instance))
                    .collect();
                if let Some(expect) = expect {
                    outcome.status = pass_or_fail(&outcome.matched == expect);
                }
            }
        }
        Ok(outcome)
    }

    /// An alias, or a world id written as a string or a number.
    fn instance(&self, name: &str) -> Result<SetId, DomainError> {
        if let Some(instance) = self.aliases.get(name) {
            return self.world.instance(&InstanceRef::Set(*instance));
        }
        let by_string = self.world.find_by_id(&Value::String(name.to_string()));
        let by_number = || {
            name.parse::<u64>()
                .ok()
                .and_then(|id| self.world.find_by_id(&Value::from(id)))
        };
        by_string
            .or_else(by_number)
            .ok_or_else(|| DomainError::lookup(format!("unknown instance `{name}`")))
    }

    fn type_id(&self, id: &str) -> Result<SetId, DomainError> {
        self.world.domain().resolve(&SetRef::Id(id.to_string()))
    }

    fn label(&self, instance: SetId) -> String {
        if let Some((alias, _)) = self.aliases.iter().find(|(_, set)| **set == instance) {
            return alias.clone();
        }
        match self.world.runtime().own_member(instance, crate::world::INSTANCE_ID) {
            Some(Member::Value(Value::String(id))) => id.clone(),
            Some(member) => member.to_json().to_string(),
            None => instance.to_string(),
        }
    }
}

fn mutation_status(event: &Event) -> String {
    event
        .status()
        .map_or("pending", |status| status.as_str())
        .to_string()
}

fn pass_or_fail(holds: bool) -> String {
    let status = if holds { "pass" } else { "fail" };
    status.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DomainDocument;
    use crate::domain::Domain;
    use serde_json::json;

    fn world() -> World {
        let document: DomainDocument = serde_json::from_value(json!({
            "kinds": { "Person": {} },
            "phases": {
                "Child": { "specializationOf": "Person", "phaseGroupId": "lifeStage", "initial": true },
                "Adult": { "specializationOf": "Person", "phaseGroupId": "lifeStage" }
            },
            "roles": { "Student": { "specializationOf": "Person" } }
        }))
        .unwrap();
        World::new(Domain::from_document(&document).unwrap())
    }

    fn scenario(value: Value) -> Scenario {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn steps_parse_by_op_tag() {
        let parsed = scenario(json!({ "steps": [
            { "op": "instantiate", "kind": "Person", "as": "ann", "fields": { "name": "Ann" } },
            { "op": "check", "instance": "ann", "isA": "Child" },
            { "op": "relate", "relator": "Class", "parts": { "pupils": ["ann"], "teacher": "bob" } }
        ]}));
        assert_eq!(
            parsed.steps[1],
            Step::Check {
                instance: "ann".to_string(),
                is_a: "Child".to_string(),
                expect: true
            }
        );
        let Step::Relate { parts, alias, .. } = &parsed.steps[2] else {
            panic!("third step relates");
        };
        assert_eq!(alias, &None);
        assert_eq!(parts["pupils"], PartRefs::Many(vec!["ann".to_string()]));
        assert_eq!(parts["teacher"], PartRefs::One("bob".to_string()));
    }

    #[test]
    fn runs_mutations_and_records_failed_checks() {
        let mut world = world();
        let report = run_scenario(
            &mut world,
            &scenario(json!({ "steps": [
                { "op": "instantiate", "kind": "Person", "as": "ann" },
                { "op": "check", "instance": "ann", "isA": "Child" },
                { "op": "become", "instance": "ann", "set": "Student" },
                { "op": "become", "instance": "ann", "set": "Student" },
                { "op": "transitTo", "instance": "ann", "phase": "Adult" },
                { "op": "check", "instance": "ann", "isA": "Child" },
                { "op": "query", "isA": "Student", "expect": ["ann"] }
            ]})),
        )
        .unwrap();

        let statuses: Vec<&str> = report.steps.iter().map(|s| s.status.as_str()).collect();
        assert_eq!(
            statuses,
            ["ok", "pass", "allowed", "isAlready", "allowed", "fail", "pass"]
        );
        assert!(!report.passed);
        assert_eq!(report.failures, vec![5]);
        assert_eq!(
            report.instances["ann"].classifiers,
            vec!["Person", "Student", "Adult"]
        );
    }

    #[test]
    fn instances_resolve_by_world_id() {
        let mut world = world();
        let report = run_scenario(
            &mut world,
            &scenario(json!({ "steps": [
                { "op": "instantiate", "kind": "Person", "fields": { "id": "p-1" } },
                { "op": "instantiate", "kind": "Person" },
                { "op": "check", "instance": "p-1", "isA": "Person" },
                { "op": "destroy", "instance": "1" }
            ]})),
        )
        .unwrap();
        assert!(report.passed);
        assert_eq!(report.steps[3].subject.as_deref(), Some("1"));
        assert_eq!(report.instances.keys().collect::<Vec<_>>(), ["p-1"]);
    }

    #[test]
    fn failing_step_names_its_index() {
        let mut world = world();
        let err = run_scenario(
            &mut world,
            &scenario(json!({ "steps": [
                { "op": "instantiate", "kind": "Person", "as": "ann" },
                { "op": "become", "instance": "bob", "set": "Student" }
            ]})),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "step 1 (become): lookup failure: unknown instance `bob`"
        );
    }
}
