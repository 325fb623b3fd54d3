use crate::support::{exit_with_error, load_domain_or_exit, print_json};
use serde_json::json;

pub fn run(domain_path: String, id: String, json_output: bool) {
    let domain = load_domain_or_exit(&domain_path);
    let Some(set) = domain.get_by_id(&id) else {
        exit_with_error(format!("unknown type `{id}` in {domain_path}"));
    };
    let stereotype = domain
        .entry(set)
        .map(|entry| entry.stereotype)
        .unwrap_or_else(|| exit_with_error(format!("`{id}` has no stereotype")));
    let specializations: Vec<_> = domain
        .query_types(set)
        .into_iter()
        .filter_map(|candidate| domain.entry(candidate))
        .collect();

    if json_output {
        let rows: Vec<_> = specializations
            .iter()
            .map(|entry| {
                json!({
                    "id": entry.id,
                    "name": entry.name,
                    "stereotype": entry.stereotype,
                })
            })
            .collect();
        let payload = json!({
            "id": id,
            "stereotype": stereotype,
            "specializations": rows,
        });
        print_json(&payload);
    } else {
        println!("ontoset types {id}");
        println!("  Stereotype: {stereotype}");
        println!("  Specializations: {}", specializations.len());
        for entry in &specializations {
            println!("    - <<{}>> {} ({})", entry.stereotype, entry.name, entry.id);
        }
    }
}
