use crate::support::{exit_with_error, load_domain_or_exit, load_scenario_or_exit, print_json};
use ontoset_domain::{World, run_scenario};

pub fn run(domain_path: String, scenario_path: String, json_output: bool) {
    let domain = load_domain_or_exit(&domain_path);
    let scenario = load_scenario_or_exit(&scenario_path);
    let mut world = World::new(domain);
    let report = run_scenario(&mut world, &scenario).unwrap_or_else(|e| exit_with_error(e));

    if json_output {
        print_json(&report);
    } else {
        println!("ontoset run {scenario_path}");
        for step in &report.steps {
            match &step.subject {
                Some(subject) => println!(
                    "  [{}] {} {}: {}",
                    step.index, step.op, subject, step.status
                ),
                None => println!("  [{}] {}: {}", step.index, step.op, step.status),
            }
            if !step.matched.is_empty() {
                println!("      matched: {}", step.matched.join(", "));
            }
        }
        println!("  Instances: {}", report.instances.len());
        for (label, view) in &report.instances {
            println!("    - {label}: {}", view.classifiers.join(", "));
        }
        if report.passed {
            println!("  Result: passed");
        } else {
            println!("  Result: failed ({} unmet)", report.failures.len());
        }
    }

    if !report.passed {
        std::process::exit(1);
    }
}
