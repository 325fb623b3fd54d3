//! The JSON domain document.
//!
//! ```json
//! {
//!   "kinds":    { "Person": { "fields": { "legs": 2 } } },
//!   "phases":   { "Child": { "specializationOf": "Person", "phaseGroupId": "lifeStage", "initial": true },
//!                 "Adult": { "specializationOf": "Person", "phaseGroupId": "lifeStage" } },
//!   "roles":    { "Buyer": { "specializationOf": "Adult" } },
//!   "relators": { "Sale": { "roles": { "buyer": "Buyer" }, "relatorPropertyId": "sale" } }
//! }
//! ```
//!
//! References between types are by id and may point forward or across
//! stereotypes; the loader resolves them in any order.

use crate::error::DomainError;
use ontoset_onto::ContextPolicy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// A built-in rule a document can attach to an event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Prevent the event.
    Veto,
    /// Log the event at info level.
    Trace,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rules: BTreeMap<String, RuleAction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization_of: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rules: BTreeMap<String, RuleAction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization_of: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_group_id: Option<String>,
    /// New instances of the specialized type start in this phase.
    #[serde(default)]
    pub initial: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rules: BTreeMap<String, RuleAction>,
}

/// Relator slots: a list of role ids (slot name = role id) or a map of
/// slot name to role id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleSlots {
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl Default for RoleSlots {
    fn default() -> Self {
        RoleSlots::List(Vec::new())
    }
}

impl RoleSlots {
    /// `(slot name, role id)` pairs.
    pub fn slots(&self) -> Vec<(String, String)> {
        match self {
            RoleSlots::List(roles) => roles.iter().map(|r| (r.clone(), r.clone())).collect(),
            RoleSlots::Map(slots) => slots
                .iter()
                .map(|(slot, role)| (slot.clone(), role.clone()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatorDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default)]
    pub roles: RoleSlots,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relator_property_id: Option<String>,
    #[serde(default)]
    pub context: ContextPolicy,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rules: BTreeMap<String, RuleAction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainDocument {
    #[serde(default)]
    pub kinds: BTreeMap<String, KindDef>,
    #[serde(default)]
    pub roles: BTreeMap<String, RoleDef>,
    #[serde(default)]
    pub phases: BTreeMap<String, PhaseDef>,
    #[serde(default)]
    pub relators: BTreeMap<String, RelatorDef>,
}

/// Read and parse a JSON file, naming the path in errors.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, DomainError> {
    let bytes = std::fs::read(path).map_err(|source| DomainError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| DomainError::Json {
        path: path.to_path_buf(),
        source,
    })
}

impl DomainDocument {
    pub fn from_path(path: &Path) -> Result<Self, DomainError> {
        read_json(path)
    }

    /// Number of type definitions across all stereotypes.
    pub fn len(&self) -> usize {
        self.kinds.len() + self.roles.len() + self.phases.len() + self.relators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_camel_case_document() {
        let doc: DomainDocument = serde_json::from_value(json!({
            "kinds": { "Person": { "fields": { "legs": 2 }, "rules": { "beforeInstantiate": "trace" } } },
            "phases": { "Child": { "specializationOf": "Person", "phaseGroupId": "lifeStage", "initial": true } },
            "relators": {
                "Sale": { "roles": { "buyer": "Buyer" }, "relatorPropertyId": "sale", "context": "always_entered" },
                "Marriage": { "roles": ["Husband", "Wife"], "relatorPropertyId": "marriage" }
            }
        }))
        .unwrap();

        assert_eq!(doc.len(), 4);
        assert_eq!(doc.kinds["Person"].rules["beforeInstantiate"], RuleAction::Trace);
        let child = &doc.phases["Child"];
        assert_eq!(child.phase_group_id.as_deref(), Some("lifeStage"));
        assert!(child.initial);
        assert_eq!(doc.relators["Sale"].context, ContextPolicy::AlwaysEntered);
        assert_eq!(
            doc.relators["Marriage"].roles.slots(),
            vec![
                ("Husband".to_string(), "Husband".to_string()),
                ("Wife".to_string(), "Wife".to_string())
            ]
        );
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let doc: DomainDocument = serde_json::from_str("{}").unwrap();
        assert!(doc.is_empty());
    }
}
