use ontoset_domain::{Domain, DomainDocument, Scenario};
use serde::Serialize;
use std::fmt::Display;
use std::path::Path;

pub fn exit_with_error(err: impl Display) -> ! {
    eprintln!("error: {err}");
    std::process::exit(1);
}

pub fn load_document_or_exit(path: &str) -> DomainDocument {
    DomainDocument::from_path(Path::new(path)).unwrap_or_else(|e| exit_with_error(e))
}

pub fn load_domain_or_exit(path: &str) -> Domain {
    let document = load_document_or_exit(path);
    Domain::from_document(&document)
        .unwrap_or_else(|e| exit_with_error(format!("failed to load domain {path}: {e}")))
}

pub fn load_scenario_or_exit(path: &str) -> Scenario {
    Scenario::from_path(Path::new(path)).unwrap_or_else(|e| exit_with_error(e))
}

pub fn print_json<T: Serialize>(payload: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(payload).expect("json serialization")
    );
}
