use crate::support::{exit_with_error, load_document_or_exit, print_json};
use ontoset_domain::{Domain, model_view};
use ontoset_onto::Stereotype;
use serde_json::json;
use std::collections::BTreeMap;

pub fn run(domain_path: String, json_output: bool) {
    let document = load_document_or_exit(&domain_path);
    let domain = Domain::from_document(&document).unwrap_or_else(|e| exit_with_error(e));
    let view = model_view(&domain);

    let mut counts: BTreeMap<&str, usize> = Stereotype::ALL
        .iter()
        .map(|stereotype| (stereotype.as_str(), 0))
        .collect();
    for entry in &view.types {
        *counts.entry(entry.stereotype.as_str()).or_default() += 1;
    }

    if json_output {
        let payload = json!({
            "domain": domain_path,
            "type_count": view.types.len(),
            "counts": counts,
            "digest": view.digest,
        });
        print_json(&payload);
    } else {
        println!("ontoset check {domain_path}");
        println!("  Types: {}", view.types.len());
        for stereotype in Stereotype::ALL {
            println!("    {stereotype}: {}", counts[stereotype.as_str()]);
        }
        println!("  Digest: {}", view.digest);
    }
}
