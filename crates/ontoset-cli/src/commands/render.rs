use crate::support::{load_domain_or_exit, print_json};
use ontoset_domain::{model_view, render_model};

pub fn run(domain_path: String, json_output: bool) {
    let domain = load_domain_or_exit(&domain_path);
    if json_output {
        print_json(&model_view(&domain));
    } else {
        print!("{}", render_model(&domain));
    }
}
