//! Domain assembly: named kinds, roles, phases and relators.
//!
//! A [`Domain`] owns the runtime and the installed ontology. Types are added
//! one at a time through `add_kind` and friends, or all at once from a
//! [`DomainDocument`] by [`Domain::load`].

use crate::document::{DomainDocument, KindDef, PhaseDef, RelatorDef, RoleDef, RuleAction};
use crate::error::DomainError;
use ontoset_kernel::{Callback, Fields, Member, Runtime, SetDefinition, SetId, callback};
use ontoset_onto::{ContextPolicy, Ontology, RelatorDeclaration, SPECIALIZATION_OF, Stereotype};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{debug, info};

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("type id pattern is valid")
    })
}

/// A type reference: by domain id or by handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetRef {
    Id(String),
    Set(SetId),
}

impl From<&str> for SetRef {
    fn from(id: &str) -> Self {
        SetRef::Id(id.to_string())
    }
}

impl From<String> for SetRef {
    fn from(id: String) -> Self {
        SetRef::Id(id)
    }
}

impl From<SetId> for SetRef {
    fn from(set: SetId) -> Self {
        SetRef::Set(set)
    }
}

/// Parameters of one type definition. Each `add_*` reads the fields that
/// apply to its stereotype.
#[derive(Clone, Default)]
pub struct TypeParams {
    pub id: String,
    /// Display name; the id when absent.
    pub name: Option<String>,
    pub base: Option<SetRef>,
    pub specialization_of: Option<SetRef>,
    pub phase_group_id: Option<String>,
    pub initial: bool,
    /// Relator slots: `(slot name, role)`.
    pub roles: Vec<(String, SetRef)>,
    pub relator_property_id: Option<String>,
    pub context: ContextPolicy,
    /// Initial state installed as members of the type.
    pub fields: Fields,
    /// Handlers attached to the type's publisher.
    pub rules: Vec<(String, Callback)>,
}

impl TypeParams {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn base(mut self, base: impl Into<SetRef>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn specializes(mut self, set: impl Into<SetRef>) -> Self {
        self.specialization_of = Some(set.into());
        self
    }

    pub fn phase_group(mut self, group: impl Into<String>) -> Self {
        self.phase_group_id = Some(group.into());
        self
    }

    pub fn initial(mut self) -> Self {
        self.initial = true;
        self
    }

    pub fn role_slot(mut self, slot: impl Into<String>, role: impl Into<SetRef>) -> Self {
        self.roles.push((slot.into(), role.into()));
        self
    }

    pub fn relator_property(mut self, property: impl Into<String>) -> Self {
        self.relator_property_id = Some(property.into());
        self
    }

    pub fn context(mut self, policy: ContextPolicy) -> Self {
        self.context = policy;
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Member>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn rule(mut self, event_name: impl Into<String>, rule: Callback) -> Self {
        self.rules.push((event_name.into(), rule));
        self
    }
}

/// What the domain knows about one of its types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeEntry {
    pub id: String,
    pub name: String,
    pub stereotype: Stereotype,
}

pub struct Domain {
    rt: Runtime,
    onto: Ontology,
    kinds: BTreeMap<String, SetId>,
    roles: BTreeMap<String, SetId>,
    phases: BTreeMap<String, SetId>,
    relators: BTreeMap<String, SetId>,
    entries: BTreeMap<SetId, TypeEntry>,
}

impl Domain {
    /// An empty domain over a fresh runtime.
    pub fn new() -> Result<Self, DomainError> {
        let mut rt = Runtime::new();
        let onto = Ontology::install(&mut rt)?;
        Ok(Self {
            rt,
            onto,
            kinds: BTreeMap::new(),
            roles: BTreeMap::new(),
            phases: BTreeMap::new(),
            relators: BTreeMap::new(),
            entries: BTreeMap::new(),
        })
    }

    pub fn from_document(document: &DomainDocument) -> Result<Self, DomainError> {
        let mut domain = Self::new()?;
        domain.load(document)?;
        Ok(domain)
    }

    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    pub fn runtime_mut(&mut self) -> &mut Runtime {
        &mut self.rt
    }

    pub fn ontology(&self) -> &Ontology {
        &self.onto
    }

    /// Runtime and ontology together, for calls that need both.
    pub fn parts_mut(&mut self) -> (&mut Runtime, &Ontology) {
        (&mut self.rt, &self.onto)
    }

    // ── definitions ──────────────────────────────────────────────────────

    pub fn add_kind(&mut self, params: TypeParams) -> Result<SetId, DomainError> {
        self.check_new_id(&params.id)?;
        let base = self.resolve_opt(params.base.as_ref())?;
        let kind = self
            .onto
            .define_kind(&mut self.rt, definition(&params), base)?;
        self.register(params, Stereotype::Kind, kind)
    }

    pub fn add_role(&mut self, params: TypeParams) -> Result<SetId, DomainError> {
        self.check_new_id(&params.id)?;
        let base = self.resolve_opt(params.base.as_ref())?;
        let required = self.resolve_opt(params.specialization_of.as_ref())?;
        let role = match base {
            Some(base) => {
                self.expect_stereotype(base, Stereotype::Role, &params.id)?;
                let role = self
                    .onto
                    .define_role(&mut self.rt, definition(&params), Some(base))?;
                if let Some(required) = required {
                    self.onto.specialize(&mut self.rt, role, required)?;
                }
                role
            }
            None => self
                .onto
                .define_role(&mut self.rt, definition(&params), required)?,
        };
        self.register(params, Stereotype::Role, role)
    }

    pub fn add_phase(&mut self, params: TypeParams) -> Result<SetId, DomainError> {
        self.check_new_id(&params.id)?;
        let base = self.resolve_opt(params.base.as_ref())?;
        let required = self.resolve_opt(params.specialization_of.as_ref())?;
        let group = params.phase_group_id.as_deref();
        let phase = match base {
            Some(base) => {
                self.expect_stereotype(base, Stereotype::Phase, &params.id)?;
                let phase = self.onto.define_phase(
                    &mut self.rt,
                    definition(&params),
                    group,
                    Some(base),
                    false,
                )?;
                match required {
                    Some(required) if params.initial => {
                        self.onto.specialize_phase(&mut self.rt, phase, required)?
                    }
                    Some(required) => self.onto.specialize(&mut self.rt, phase, required)?,
                    None => {}
                }
                phase
            }
            None => self.onto.define_phase(
                &mut self.rt,
                definition(&params),
                group,
                required,
                params.initial,
            )?,
        };
        self.register(params, Stereotype::Phase, phase)
    }

    pub fn add_relator(&mut self, params: TypeParams) -> Result<SetId, DomainError> {
        self.check_new_id(&params.id)?;
        let base = self.resolve_opt(params.base.as_ref())?;
        let mut slots = Vec::with_capacity(params.roles.len());
        for (slot, role) in &params.roles {
            let role = self.resolve(role)?;
            if self.onto.stereotype_of(&self.rt, role) != Some(Stereotype::Role) {
                return Err(DomainError::lookup(format!(
                    "slot `{slot}` of `{}` does not name a role",
                    params.id
                )));
            }
            slots.push((slot.clone(), role));
        }
        let declaration = RelatorDeclaration {
            property_id: params.relator_property_id.clone(),
            slots,
            policy: params.context,
        };
        let relator =
            self.onto
                .define_relator(&mut self.rt, definition(&params), declaration, base)?;
        self.register(params, Stereotype::Relator, relator)
    }

    fn check_new_id(&self, id: &str) -> Result<(), DomainError> {
        if !id_pattern().is_match(id) {
            return Err(DomainError::InvalidId(id.to_string()));
        }
        if self.get_by_id(id).is_some() {
            return Err(DomainError::DuplicateId(id.to_string()));
        }
        Ok(())
    }

    fn expect_stereotype(
        &self,
        set: SetId,
        stereotype: Stereotype,
        id: &str,
    ) -> Result<(), DomainError> {
        if self.onto.stereotype_of(&self.rt, set) == Some(stereotype) {
            return Ok(());
        }
        Err(ontoset_kernel::KernelError::invalid(format!(
            "base of {stereotype} `{id}` must be a {stereotype}"
        ))
        .into())
    }

    fn register(
        &mut self,
        params: TypeParams,
        stereotype: Stereotype,
        set: SetId,
    ) -> Result<SetId, DomainError> {
        for (event_name, rule) in params.rules {
            self.rt.on(set, &event_name, rule)?;
        }
        let name = params.name.unwrap_or_else(|| params.id.clone());
        let map = match stereotype {
            Stereotype::Kind => &mut self.kinds,
            Stereotype::Role => &mut self.roles,
            Stereotype::Phase => &mut self.phases,
            Stereotype::Relator => &mut self.relators,
        };
        map.insert(params.id.clone(), set);
        debug!(id = %params.id, set = %set, %stereotype, "type added");
        self.entries.insert(
            set,
            TypeEntry {
                id: params.id,
                name,
                stereotype,
            },
        );
        Ok(set)
    }

    // ── lookup ───────────────────────────────────────────────────────────

    pub fn get_by_id(&self, id: &str) -> Option<SetId> {
        [&self.kinds, &self.roles, &self.phases, &self.relators]
            .into_iter()
            .find_map(|types| types.get(id).copied())
    }

    /// Resolve a reference; unknown ids and dead handles are lookup
    /// failures.
    pub fn resolve(&self, set: &SetRef) -> Result<SetId, DomainError> {
        match set {
            SetRef::Id(id) => self
                .get_by_id(id)
                .ok_or_else(|| DomainError::lookup(format!("`{id}` is not a type"))),
            SetRef::Set(set) => {
                if self.rt.is_set(*set) {
                    Ok(*set)
                } else {
                    Err(DomainError::lookup(format!("{set} is not a live set")))
                }
            }
        }
    }

    fn resolve_opt(&self, set: Option<&SetRef>) -> Result<Option<SetId>, DomainError> {
        set.map(|set| self.resolve(set)).transpose()
    }

    pub fn entry(&self, set: SetId) -> Option<&TypeEntry> {
        self.entries.get(&set)
    }

    pub fn kind_by_id(&self, id: &str) -> Option<SetId> {
        self.kinds.get(id).copied()
    }

    pub fn relator_by_id(&self, id: &str) -> Option<SetId> {
        self.relators.get(id).copied()
    }

    /// Every type: kinds, roles, phases, relators, each by id.
    pub fn types(&self) -> Vec<(SetId, &TypeEntry)> {
        [&self.kinds, &self.roles, &self.phases, &self.relators]
            .into_iter()
            .flat_map(|types| types.values())
            .filter_map(|set| self.entries.get(set).map(|entry| (*set, entry)))
            .collect()
    }

    /// Registered types that are proper specializations of `set`.
    pub fn query_types(&self, set: SetId) -> Vec<SetId> {
        self.types()
            .into_iter()
            .map(|(candidate, _)| candidate)
            .filter(|candidate| *candidate != set && self.rt.is_a(*candidate, set))
            .collect()
    }

    /// The domain type `set` derives from, if its parent is one.
    pub fn base_type(&self, set: SetId) -> Option<&TypeEntry> {
        self.rt
            .parent(set)
            .ok()
            .flatten()
            .and_then(|parent| self.entries.get(&parent))
    }

    /// The domain type `set` itself requires its bearers to be.
    pub fn required_type(&self, set: SetId) -> Option<&TypeEntry> {
        self.rt
            .own_member(set, SPECIALIZATION_OF)
            .and_then(Member::as_set)
            .and_then(|required| self.entries.get(&required))
    }

    // ── documents ────────────────────────────────────────────────────────

    /// Add every type of `document`. References may point forward; types
    /// are added as soon as everything they reference exists. A reference
    /// that never resolves is a lookup failure.
    pub fn load(&mut self, document: &DomainDocument) -> Result<(), DomainError> {
        let mut pending: Vec<Pending<'_>> = Vec::with_capacity(document.len());
        pending.extend(document.kinds.iter().map(|(id, def)| Pending::Kind(id.as_str(), def)));
        pending.extend(document.roles.iter().map(|(id, def)| Pending::Role(id.as_str(), def)));
        pending.extend(document.phases.iter().map(|(id, def)| Pending::Phase(id.as_str(), def)));
        pending.extend(
            document
                .relators
                .iter()
                .map(|(id, def)| Pending::Relator(id.as_str(), def)),
        );

        while !pending.is_empty() {
            let before = pending.len();
            let mut waiting = Vec::new();
            for item in pending {
                if item.references().iter().all(|id| self.get_by_id(id).is_some()) {
                    self.add_pending(&item)?;
                } else {
                    waiting.push(item);
                }
            }
            if waiting.len() == before {
                let item = &waiting[0];
                let missing = item
                    .references()
                    .into_iter()
                    .find(|id| self.get_by_id(id).is_none())
                    .unwrap_or_default();
                return Err(DomainError::lookup(format!(
                    "type `{}` references unknown type `{missing}`",
                    item.id()
                )));
            }
            pending = waiting;
        }
        Ok(())
    }

    fn add_pending(&mut self, item: &Pending<'_>) -> Result<SetId, DomainError> {
        match item {
            Pending::Kind(id, def) => {
                let params = common(id, &def.name, &def.base, &def.fields, &def.rules);
                self.add_kind(params)
            }
            Pending::Role(id, def) => {
                let mut params = common(id, &def.name, &def.base, &def.fields, &def.rules);
                params.specialization_of = def.specialization_of.clone().map(SetRef::Id);
                self.add_role(params)
            }
            Pending::Phase(id, def) => {
                let mut params = common(id, &def.name, &def.base, &def.fields, &def.rules);
                params.specialization_of = def.specialization_of.clone().map(SetRef::Id);
                params.phase_group_id = def.phase_group_id.clone();
                params.initial = def.initial;
                self.add_phase(params)
            }
            Pending::Relator(id, def) => {
                let mut params = common(id, &def.name, &def.base, &def.fields, &def.rules);
                params.roles = def
                    .roles
                    .slots()
                    .into_iter()
                    .map(|(slot, role)| (slot, SetRef::Id(role)))
                    .collect();
                params.relator_property_id = def.relator_property_id.clone();
                params.context = def.context;
                self.add_relator(params)
            }
        }
    }
}

enum Pending<'a> {
    Kind(&'a str, &'a KindDef),
    Role(&'a str, &'a RoleDef),
    Phase(&'a str, &'a PhaseDef),
    Relator(&'a str, &'a RelatorDef),
}

impl<'a> Pending<'a> {
    fn id(&self) -> &'a str {
        match self {
            Pending::Kind(id, _)
            | Pending::Role(id, _)
            | Pending::Phase(id, _)
            | Pending::Relator(id, _) => *id,
        }
    }

    fn references(&self) -> Vec<String> {
        let mut refs = Vec::new();
        match self {
            Pending::Kind(_, def) => refs.extend(def.base.clone()),
            Pending::Role(_, def) => {
                refs.extend(def.base.clone());
                refs.extend(def.specialization_of.clone());
            }
            Pending::Phase(_, def) => {
                refs.extend(def.base.clone());
                refs.extend(def.specialization_of.clone());
            }
            Pending::Relator(_, def) => {
                refs.extend(def.base.clone());
                refs.extend(def.roles.slots().into_iter().map(|(_, role)| role));
            }
        }
        refs
    }
}

fn definition(params: &TypeParams) -> SetDefinition {
    SetDefinition::named(params.name.clone().unwrap_or_else(|| params.id.clone()))
        .members(params.fields.clone())
}

fn common(
    id: &str,
    name: &Option<String>,
    base: &Option<String>,
    fields: &BTreeMap<String, Value>,
    rules: &BTreeMap<String, RuleAction>,
) -> TypeParams {
    TypeParams {
        id: id.to_string(),
        name: name.clone(),
        base: base.clone().map(SetRef::Id),
        fields: fields
            .iter()
            .map(|(name, value)| (name.clone(), Member::Value(value.clone())))
            .collect(),
        rules: rules
            .iter()
            .map(|(event_name, action)| (event_name.clone(), rule_callback(id, *action)))
            .collect(),
        ..TypeParams::default()
    }
}

fn rule_callback(type_id: &str, action: RuleAction) -> Callback {
    match action {
        RuleAction::Veto => callback(|_, _, event| {
            event.prevent_action();
            Ok(())
        }),
        RuleAction::Trace => {
            let type_id = type_id.to_string();
            callback(move |_, target, event| {
                info!(rule = %type_id, event = %event.full_name(), target = %target, status = ?event.status(), "rule fired");
                Ok(())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontoset_kernel::{Fields, MutationParams};
    use serde_json::json;

    fn document(value: Value) -> DomainDocument {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn add_types_programmatically() {
        let mut domain = Domain::new().unwrap();
        let person = domain
            .add_kind(TypeParams::new("Person").field("legs", json!(2)))
            .unwrap();
        let man = domain
            .add_kind(TypeParams::new("Man").base("Person"))
            .unwrap();
        let student = domain
            .add_role(TypeParams::new("Student").specializes(person))
            .unwrap();

        assert_eq!(domain.get_by_id("Man"), Some(man));
        assert_eq!(domain.base_type(man).map(|e| e.id.as_str()), Some("Person"));
        assert_eq!(
            domain.required_type(student).map(|e| e.id.as_str()),
            Some("Person")
        );
        assert_eq!(domain.query_types(person), vec![man]);
        assert_eq!(
            domain.entry(student).map(|e| e.stereotype),
            Some(Stereotype::Role)
        );
    }

    #[test]
    fn duplicate_and_invalid_ids_are_rejected() {
        let mut domain = Domain::new().unwrap();
        domain.add_kind(TypeParams::new("Person")).unwrap();
        assert!(matches!(
            domain.add_role(TypeParams::new("Person")),
            Err(DomainError::DuplicateId(_))
        ));
        assert!(matches!(
            domain.add_kind(TypeParams::new("two words")),
            Err(DomainError::InvalidId(_))
        ));
    }

    #[test]
    fn unknown_base_is_a_lookup_failure() {
        let mut domain = Domain::new().unwrap();
        let err = domain
            .add_kind(TypeParams::new("Man").base("Nobody"))
            .unwrap_err();
        assert!(matches!(err, DomainError::LookupFailure(_)));
    }

    #[test]
    fn load_resolves_forward_references() {
        let domain = Domain::from_document(&document(json!({
            "relators": { "Enrollment": { "roles": ["Student"], "relatorPropertyId": "enrollment" } },
            "roles": {
                "Student": { "specializationOf": "Person" },
                "Grad": { "specializationOf": "Student" }
            },
            "kinds": { "Person": {}, "Man": { "base": "Person" } }
        })))
        .unwrap();

        let person = domain.get_by_id("Person").unwrap();
        let student = domain.get_by_id("Student").unwrap();
        let grad = domain.get_by_id("Grad").unwrap();
        assert_eq!(
            domain.query_types(person),
            vec![domain.get_by_id("Man").unwrap()]
        );
        assert_eq!(domain.query_types(student), vec![grad]);
        assert_eq!(domain.base_type(grad).map(|e| e.id.as_str()), Some("Student"));
    }

    #[test]
    fn load_reports_the_unresolved_reference() {
        let err = Domain::from_document(&document(json!({
            "kinds": { "Person": {} },
            "roles": { "Student": { "specializationOf": "Human" } }
        })))
        .err()
        .unwrap();
        assert_eq!(
            err.to_string(),
            "lookup failure: type `Student` references unknown type `Human`"
        );
    }

    #[test]
    fn relator_slots_must_be_roles() {
        let err = Domain::from_document(&document(json!({
            "kinds": { "Person": {} },
            "relators": { "Bond": { "roles": ["Person"], "relatorPropertyId": "bond" } }
        })))
        .err()
        .unwrap();
        assert!(matches!(err, DomainError::LookupFailure(_)));
    }

    #[test]
    fn document_rules_are_attached() {
        let mut domain = Domain::from_document(&document(json!({
            "kinds": { "Person": {} },
            "roles": { "Student": { "specializationOf": "Person", "rules": { "beforeBecome:target": "veto" } } }
        })))
        .unwrap();
        let person = domain.get_by_id("Person").unwrap();
        let student = domain.get_by_id("Student").unwrap();
        let rt = domain.runtime_mut();
        let ann = rt.instantiate(person, Fields::new()).unwrap().unwrap();
        assert!(!rt.can_become(ann, student, MutationParams::default()).unwrap());
    }

    #[test]
    fn phase_options_follow_the_document() {
        let mut domain = Domain::from_document(&document(json!({
            "kinds": { "Person": {} },
            "phases": {
                "Child": { "specializationOf": "Person", "phaseGroupId": "lifeStage", "initial": true },
                "Adult": { "specializationOf": "Person", "phaseGroupId": "lifeStage" },
                "Senior": { "base": "Adult", "specializationOf": "Person" }
            }
        })))
        .unwrap();
        let person = domain.get_by_id("Person").unwrap();
        let child = domain.get_by_id("Child").unwrap();
        let senior = domain.get_by_id("Senior").unwrap();
        assert_eq!(
            domain.ontology().phase_group_of(domain.runtime(), senior).as_deref(),
            Some("lifeStage")
        );

        let (rt, onto) = domain.parts_mut();
        let ann = rt.instantiate(person, Fields::new()).unwrap().unwrap();
        assert_eq!(onto.current_phase(rt, ann, "lifeStage"), Some(child));
        assert!(onto
            .transit_to(rt, ann, senior, MutationParams::default())
            .unwrap()
            .success());
        assert_eq!(onto.current_phase(rt, ann, "lifeStage"), Some(senior));
    }
}
