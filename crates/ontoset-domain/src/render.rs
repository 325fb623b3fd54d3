//! Model rendering: one line per type, and a serializable model view.
//!
//! ```text
//! <<kind>> Person
//! <<kind>> Man : Person
//! <<phase>> Child [lifeStage] specializes Person
//! <<relator>> Sale (buyer: Buyer, seller: Seller)
//! ```

use crate::domain::Domain;
use ontoset_kernel::SetId;
use ontoset_onto::Stereotype;
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub slot: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeView {
    pub id: String,
    pub name: String,
    pub stereotype: Stereotype,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialization_of: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_group_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<SlotView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelView {
    /// Stable digest of every type view.
    pub digest: String,
    pub types: Vec<TypeView>,
}

pub fn model_view(domain: &Domain) -> ModelView {
    let types: Vec<TypeView> = domain
        .types()
        .into_iter()
        .map(|(set, _)| type_view(domain, set))
        .collect();
    ModelView {
        digest: digest(&types),
        types,
    }
}

/// The text rendering of every type, kinds first.
pub fn render_model(domain: &Domain) -> String {
    let mut out = String::new();
    for view in model_view(domain).types {
        out.push_str(&render_type(domain, &view));
        out.push('\n');
    }
    out
}

fn render_type(domain: &Domain, view: &TypeView) -> String {
    let display = |id: &str| {
        domain
            .get_by_id(id)
            .and_then(|set| domain.entry(set))
            .map_or_else(|| id.to_string(), |entry| entry.name.clone())
    };
    let mut line = format!("<<{}>> {}", view.stereotype, view.name);
    if let Some(base) = &view.base {
        line.push_str(&format!(" : {}", display(base)));
    }
    if view.stereotype == Stereotype::Phase {
        if let Some(group) = &view.phase_group_id {
            line.push_str(&format!(" [{group}]"));
        }
    }
    if let Some(required) = &view.specialization_of {
        line.push_str(&format!(" specializes {}", display(required)));
    }
    if !view.roles.is_empty() {
        let slots: Vec<String> = view
            .roles
            .iter()
            .map(|slot| format!("{}: {}", slot.slot, display(&slot.role)))
            .collect();
        line.push_str(&format!(" ({})", slots.join(", ")));
    }
    line
}

fn type_view(domain: &Domain, set: SetId) -> TypeView {
    let rt = domain.runtime();
    let onto = domain.ontology();
    let (id, name, stereotype) = domain
        .entry(set)
        .map(|entry| (entry.id.clone(), entry.name.clone(), entry.stereotype))
        .unwrap_or_else(|| (set.to_string(), set.to_string(), Stereotype::Kind));
    let phase_group_id = match stereotype {
        Stereotype::Phase => onto.phase_group_of(rt, set),
        _ => None,
    };
    let roles = match stereotype {
        Stereotype::Relator => onto
            .declaration(rt, set)
            .map(|declaration| {
                declaration
                    .slots
                    .into_iter()
                    .map(|(slot, role)| SlotView {
                        slot,
                        role: domain
                            .entry(role)
                            .map_or_else(|| role.to_string(), |entry| entry.id.clone()),
                    })
                    .collect()
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    TypeView {
        id,
        name,
        stereotype,
        color: stereotype.color().to_string(),
        base: domain.base_type(set).map(|entry| entry.id.clone()),
        specialization_of: domain.required_type(set).map(|entry| entry.id.clone()),
        phase_group_id,
        roles,
    }
}

fn digest(types: &[TypeView]) -> String {
    let mut hasher = Sha256::new();
    for view in types {
        for component in [
            view.id.as_str(),
            view.name.as_str(),
            view.stereotype.as_str(),
            view.base.as_deref().unwrap_or_default(),
            view.specialization_of.as_deref().unwrap_or_default(),
            view.phase_group_id.as_deref().unwrap_or_default(),
        ] {
            hasher.update(component.as_bytes());
            hasher.update([0]);
        }
        for slot in &view.roles {
            hasher.update(slot.slot.as_bytes());
            hasher.update([0]);
            hasher.update(slot.role.as_bytes());
            hasher.update([0]);
        }
        hasher.update([1]);
    }
    format!("model1_{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DomainDocument;
    use serde_json::json;

    fn commerce() -> Domain {
        let document: DomainDocument = serde_json::from_value(json!({
            "kinds": {
                "Person": {},
                "Man": { "base": "Person" }
            },
            "phases": {
                "Child": { "specializationOf": "Person", "phaseGroupId": "lifeStage", "initial": true },
                "Adult": { "specializationOf": "Person", "phaseGroupId": "lifeStage" }
            },
            "roles": {
                "Buyer": { "specializationOf": "Adult" },
                "Seller": { "specializationOf": "Person" }
            },
            "relators": {
                "Sale": { "roles": { "buyer": "Buyer", "seller": "Seller" }, "relatorPropertyId": "sale" }
            }
        }))
        .unwrap();
        Domain::from_document(&document).unwrap()
    }

    #[test]
    fn renders_one_line_per_type() {
        insta::assert_snapshot!(render_model(&commerce()), @r###"
        <<kind>> Man : Person
        <<kind>> Person
        <<role>> Buyer specializes Adult
        <<role>> Seller specializes Person
        <<phase>> Adult [lifeStage] specializes Person
        <<phase>> Child [lifeStage] specializes Person
        <<relator>> Sale (buyer: Buyer, seller: Seller)
        "###);
    }

    #[test]
    fn display_names_are_used_in_text() {
        let mut domain = Domain::new().unwrap();
        domain
            .add_kind(crate::domain::TypeParams::new("Person").named("Human being"))
            .unwrap();
        domain
            .add_kind(crate::domain::TypeParams::new("Man").base("Person"))
            .unwrap();
        insta::assert_snapshot!(render_model(&domain), @r###"
        <<kind>> Man : Human being
        <<kind>> Human being
        "###);
    }

    #[test]
    fn model_view_is_stable_and_tracks_changes() {
        let first = model_view(&commerce());
        let second = model_view(&commerce());
        assert_eq!(first.digest, second.digest);
        assert!(first.digest.starts_with("model1_"));

        let sale = first.types.iter().find(|t| t.id == "Sale").unwrap();
        assert_eq!(sale.color, "#dd8888");
        assert_eq!(
            sale.roles,
            vec![
                SlotView { slot: "buyer".to_string(), role: "Buyer".to_string() },
                SlotView { slot: "seller".to_string(), role: "Seller".to_string() },
            ]
        );

        let mut grown = commerce();
        grown
            .add_kind(crate::domain::TypeParams::new("Car"))
            .unwrap();
        assert_ne!(model_view(&grown).digest, first.digest);
    }

    #[test]
    fn model_view_serializes_camel_case() {
        let view = model_view(&commerce());
        let child = view.types.iter().find(|t| t.id == "Child").unwrap();
        assert_eq!(
            serde_json::to_value(child).unwrap(),
            json!({
                "id": "Child",
                "name": "Child",
                "stereotype": "phase",
                "color": "#cccccc",
                "specializationOf": "Person",
                "phaseGroupId": "lifeStage"
            })
        );
    }
}
