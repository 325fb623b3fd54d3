use serde_json::Value;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    fn new(prefix: &str) -> Self {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "ontoset-cli-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("temp dir should be created");
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn run_ontoset<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = env!("CARGO_BIN_EXE_ontoset");
    Command::new(bin)
        .args(args)
        .output()
        .expect("ontoset command should execute")
}

fn assert_success(output: &Output) {
    if !output.status.success() {
        panic!(
            "command failed with status {:?}\nstdout:\n{}\nstderr:\n{}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
}

fn assert_failure(output: &Output) {
    if output.status.success() {
        panic!(
            "command unexpectedly succeeded\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
}

fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn parse_json_stdout(output: &Output) -> Value {
    serde_json::from_slice::<Value>(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "expected valid JSON stdout, got error: {e}\nstdout:\n{}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

fn write_domain(path: &Path) {
    let payload = serde_json::json!({
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
            "Sale": {
                "roles": { "buyer": "Buyer", "seller": "Seller" },
                "relatorPropertyId": "sale",
                "context": "always_entered"
            }
        }
    });
    fs::write(
        path,
        serde_json::to_string_pretty(&payload).expect("domain should serialize"),
    )
    .expect("domain should be written");
}

fn write_scenario(path: &Path, check_buyer: bool) {
    let payload = serde_json::json!({
        "steps": [
            { "op": "instantiate", "kind": "Person", "as": "ann" },
            { "op": "instantiate", "kind": "Man", "as": "bob" },
            { "op": "transitTo", "instance": "ann", "phase": "Adult" },
            { "op": "relate", "relator": "Sale", "parts": { "buyer": "ann", "seller": "bob" } },
            { "op": "check", "instance": "ann", "isA": "Buyer", "expect": check_buyer }
        ]
    });
    fs::write(
        path,
        serde_json::to_string_pretty(&payload).expect("scenario should serialize"),
    )
    .expect("scenario should be written");
}

#[test]
fn check_json_smoke() {
    let tmp = TempDirGuard::new("check-json");
    let domain = tmp.path().join("domain.json");
    write_domain(&domain);

    let output = run_ontoset([
        OsString::from("check"),
        domain.as_os_str().to_os_string(),
        OsString::from("--json"),
    ]);
    assert_success(&output);

    let payload = parse_json_stdout(&output);
    assert_eq!(payload["type_count"], 7);
    assert_eq!(payload["counts"]["kind"], 2);
    assert_eq!(payload["counts"]["relator"], 1);
    assert!(payload["digest"].as_str().unwrap().starts_with("model1_"));
}

#[test]
fn check_reports_unknown_reference() {
    let tmp = TempDirGuard::new("check-unknown");
    let domain = tmp.path().join("domain.json");
    fs::write(
        &domain,
        r#"{ "roles": { "Student": { "specializationOf": "Person" } } }"#,
    )
    .expect("domain should be written");

    let output = run_ontoset([OsString::from("check"), domain.as_os_str().to_os_string()]);
    assert_failure(&output);
    assert!(
        stderr_text(&output)
            .contains("error: lookup failure: type `Student` references unknown type `Person`")
    );
}

#[test]
fn check_reports_missing_file() {
    let tmp = TempDirGuard::new("check-missing");
    let domain = tmp.path().join("absent.json");

    let output = run_ontoset([OsString::from("check"), domain.as_os_str().to_os_string()]);
    assert_failure(&output);
    assert!(stderr_text(&output).contains("absent.json"));
}

#[test]
fn types_json_smoke() {
    let tmp = TempDirGuard::new("types-json");
    let domain = tmp.path().join("domain.json");
    write_domain(&domain);

    let output = run_ontoset([
        OsString::from("types"),
        domain.as_os_str().to_os_string(),
        OsString::from("Person"),
        OsString::from("--json"),
    ]);
    assert_success(&output);

    let payload = parse_json_stdout(&output);
    assert_eq!(payload["stereotype"], "kind");
    let ids: Vec<&str> = payload["specializations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["Man"]);
}

#[test]
fn types_unknown_id_fails() {
    let tmp = TempDirGuard::new("types-unknown");
    let domain = tmp.path().join("domain.json");
    write_domain(&domain);

    let output = run_ontoset([
        OsString::from("types"),
        domain.as_os_str().to_os_string(),
        OsString::from("Robot"),
    ]);
    assert_failure(&output);
    assert!(stderr_text(&output).contains("unknown type `Robot`"));
}

#[test]
fn render_text_smoke() {
    let tmp = TempDirGuard::new("render-text");
    let domain = tmp.path().join("domain.json");
    write_domain(&domain);

    let output = run_ontoset([OsString::from("render"), domain.as_os_str().to_os_string()]);
    assert_success(&output);

    let text = stdout_text(&output);
    assert!(text.contains("<<kind>> Man : Person\n"));
    assert!(text.contains("<<phase>> Adult [lifeStage] specializes Person\n"));
    assert!(text.contains("<<relator>> Sale (buyer: Buyer, seller: Seller)\n"));
}

#[test]
fn render_json_smoke() {
    let tmp = TempDirGuard::new("render-json");
    let domain = tmp.path().join("domain.json");
    write_domain(&domain);

    let output = run_ontoset([
        OsString::from("render"),
        domain.as_os_str().to_os_string(),
        OsString::from("--json"),
    ]);
    assert_success(&output);

    let payload = parse_json_stdout(&output);
    let types = payload["types"].as_array().unwrap();
    assert_eq!(types.len(), 7);
    assert_eq!(types[0]["id"], "Man");
    assert_eq!(types[0]["base"], "Person");
}

#[test]
fn run_json_smoke() {
    let tmp = TempDirGuard::new("run-json");
    let domain = tmp.path().join("domain.json");
    let scenario = tmp.path().join("scenario.json");
    write_domain(&domain);
    write_scenario(&scenario, true);

    let output = run_ontoset([
        OsString::from("run"),
        domain.as_os_str().to_os_string(),
        scenario.as_os_str().to_os_string(),
        OsString::from("--json"),
    ]);
    assert_success(&output);

    let payload = parse_json_stdout(&output);
    assert_eq!(payload["passed"], true);
    assert_eq!(payload["steps"][2]["status"], "allowed");
    assert_eq!(payload["steps"][4]["status"], "pass");
    assert_eq!(payload["instances"]["ann"]["of"], "Person");
}

#[test]
fn run_with_unmet_check_exits_nonzero() {
    let tmp = TempDirGuard::new("run-unmet");
    let domain = tmp.path().join("domain.json");
    let scenario = tmp.path().join("scenario.json");
    write_domain(&domain);
    write_scenario(&scenario, false);

    let output = run_ontoset([
        OsString::from("run"),
        domain.as_os_str().to_os_string(),
        scenario.as_os_str().to_os_string(),
    ]);
    assert_failure(&output);

    let text = stdout_text(&output);
    assert!(text.contains("[4] check ann: fail"));
    assert!(text.contains("Result: failed (1 unmet)"));
}
