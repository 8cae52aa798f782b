//! End-to-end tests of the `smc` binary.

use serde_json::Value;
use std::path::PathBuf;
use std::process::{Command, Output};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn smc(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_smc"))
        .args(args)
        .env("NO_COLOR", "1")
        .env_remove("SMC_CONFIG")
        .env_remove("SMC_WARNINGS_AS_ERRORS")
        .env_remove("SMC_CHECK_UNREACHABLE")
        .env_remove("SMC_INDENT_WIDTH")
        .env_remove("SMC_STATE_SUFFIX")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run smc")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_idle_running_end_to_end() {
    let path = fixture("idle_running.sm");
    let path = path.to_str().unwrap();

    let check = smc(&["check", "--dump", path]);
    assert_eq!(check.status.code(), Some(0), "{}", stderr(&check));
    assert!(stderr(&check).contains("Found states: Idle, Running"));
    let canonical = stdout(&check);
    assert_eq!(
        canonical,
        "machine Worker\n\n\
         initial state Idle\nend\n\n\
         state Running\nend\n\n\
         transition Idle -> Running on start\n\
         transition Running -> Idle on stop\n"
    );

    let generated = smc(&["generate", path]);
    assert_eq!(generated.status.code(), Some(0), "{}", stderr(&generated));
    let code = stdout(&generated);
    assert!(code.contains("class IdleState(WorkerBase):"));
    assert!(code.contains("class RunningState(WorkerBase):"));
    assert!(code.contains("    initial = \"Idle\"\n"));
    assert!(code.contains("return machine.transition(\"Running\", None, ctx)"));

    // Generation is deterministic.
    assert_eq!(stdout(&smc(&["generate", path])), code);
}

#[test]
fn test_dump_is_fixed_point() {
    let dir = tempfile::tempdir().unwrap();
    let first = stdout(&smc(&["dump", fixture("idle_running.sm").to_str().unwrap()]));

    let copy = dir.path().join("copy.sm");
    std::fs::write(&copy, &first).unwrap();
    let second = stdout(&smc(&["dump", copy.to_str().unwrap()]));
    assert_eq!(first, second);
}

#[test]
fn test_duplicate_event_reports_one_error() {
    let output = smc(&[
        "check",
        "--format",
        "json",
        fixture("duplicate_event.sm").to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(1));

    let docs: Value = serde_json::from_str(&stdout(&output)).unwrap();
    let diagnostics = docs[0]["diagnostics"].as_array().unwrap();
    let errors: Vec<&Value> = diagnostics
        .iter()
        .filter(|d| d["severity"] == "error")
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["code"], "E008");
    assert_eq!(errors[0]["subject"]["source"], "A");
    assert_eq!(errors[0]["subject"]["event"], "event");

    let refused = smc(&["generate", fixture("duplicate_event.sm").to_str().unwrap()]);
    assert_eq!(refused.status.code(), Some(3));
    assert!(stdout(&refused).is_empty());
    assert!(stderr(&refused).contains("more than one unguarded transition on 'event'"));
}

#[test]
fn test_syntax_error_exit_code() {
    let path = fixture("syntax_error.sm");
    let output = smc(&["check", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains(":2:11: expected target state, found guard"));
}

#[test]
fn test_missing_file() {
    let output = smc(&["dump", "/nonexistent/machine.sm"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("smc.yaml");
    std::fs::write(&config, "codegen:\n  state_suffix: Mode\n  indent_width: 2\n").unwrap();

    let output = smc(&[
        "--config",
        config.to_str().unwrap(),
        "generate",
        fixture("idle_running.sm").to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert!(stdout(&output).contains("class IdleMode(WorkerBase):\n  name = \"Idle\"\n"));

    std::fs::write(&config, "codegen:\n  indent_width: 0\n").unwrap();
    let output = smc(&["--config", config.to_str().unwrap(), "visit", "x.sm"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).contains("indent_width"));
}

#[test]
fn test_visit_and_simulate() {
    let path = fixture("idle_running.sm");
    let path = path.to_str().unwrap();

    let visit = smc(&["visit", path]);
    assert_eq!(
        stdout(&visit),
        "Found states: Idle, Running\n\
         State Idle:\n \
         Transition: start -> Running\n\
         State Running:\n \
         Transition: stop -> Idle\n"
    );

    let sim = smc(&["simulate", path, "--events", "start,stop,start"]);
    assert_eq!(sim.status.code(), Some(0), "{}", stderr(&sim));
    assert!(stdout(&sim).ends_with("final Running\n"));
}

#[test]
fn test_file_names_that_are_not_identifiers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("my-machine.sm");
    std::fs::write(&path, "initial state Idle\nend\n").unwrap();
    let path = path.to_str().unwrap();

    let dumped = smc(&["dump", path]);
    assert_eq!(dumped.status.code(), Some(0), "{}", stderr(&dumped));
    assert!(stdout(&dumped).starts_with("machine my_machine\n"));

    let copy = dir.path().join("copy.sm");
    std::fs::write(&copy, stdout(&dumped)).unwrap();
    assert_eq!(stdout(&smc(&["dump", copy.to_str().unwrap()])), stdout(&dumped));

    let generated = smc(&["generate", path]);
    assert_eq!(generated.status.code(), Some(0), "{}", stderr(&generated));
    assert!(stdout(&generated).contains("\nclass MyMachine:\n"));
}
