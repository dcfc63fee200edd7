//! Runs the wrapped script through a real bash against a temp control
//! directory to pin down the remote-side behavior: pair creation, inner
//! exit code propagation, and retention pruning.

use std::path::Path;
use std::process::Command;

use dockhand::script::{wrap_script, RETAINED_SCRIPT_PAIRS};
use tempfile::tempdir;

fn run_wrapped(raw: &str, control_dir: &Path, name: &str) -> std::process::Output {
    let wrapped = wrap_script(raw, control_dir.to_str().unwrap(), name);
    Command::new("bash")
        .arg("-c")
        .arg(&wrapped)
        .output()
        .expect("bash not available")
}

fn script_pairs(control_dir: &Path) -> (Vec<String>, Vec<String>) {
    let mut scripts = Vec::new();
    let mut outputs = Vec::new();
    for entry in std::fs::read_dir(control_dir).unwrap() {
        let file_name = entry.unwrap().file_name().into_string().unwrap();
        if file_name.ends_with(".sh") {
            scripts.push(file_name);
        } else if file_name.ends_with(".output") {
            outputs.push(file_name);
        }
    }
    scripts.sort();
    outputs.sort();
    (scripts, outputs)
}

#[test]
fn execution_leaves_a_script_and_output_pair() {
    let dir = tempdir().unwrap();
    let control = dir.path().join("scripts");

    let result = run_wrapped("echo from-inside\n", &control, "provision-100_1");
    assert!(result.status.success());
    assert!(String::from_utf8_lossy(&result.stdout).contains("from-inside"));

    let script = std::fs::read_to_string(control.join("provision-100_1.sh")).unwrap();
    assert_eq!(script, "echo from-inside\n");

    let output = std::fs::read_to_string(control.join("provision-100_1.output")).unwrap();
    assert!(output.contains("from-inside"));
}

#[test]
fn inner_exit_code_survives_the_tee() {
    let dir = tempdir().unwrap();
    let control = dir.path().join("scripts");

    let result = run_wrapped("echo before-failure\nexit 7\n", &control, "provision-100_2");
    assert_eq!(result.status.code(), Some(7));
    // The output pair is still written for failed runs.
    let output = std::fs::read_to_string(control.join("provision-100_2.output")).unwrap();
    assert!(output.contains("before-failure"));
}

#[test]
fn stderr_is_folded_into_the_output_file() {
    let dir = tempdir().unwrap();
    let control = dir.path().join("scripts");

    run_wrapped("echo oops >&2\n", &control, "provision-100_3");
    let output = std::fs::read_to_string(control.join("provision-100_3.output")).unwrap();
    assert!(output.contains("oops"));
}

#[test]
fn heredoc_preserves_quoting_and_expansion_characters() {
    let dir = tempdir().unwrap();
    let control = dir.path().join("scripts");

    let raw = "VALUE='$HOME `date` \"quoted\"'\necho \"$VALUE\"\n";
    let result = run_wrapped(raw, &control, "provision-100_4");
    assert!(result.status.success());

    let script = std::fs::read_to_string(control.join("provision-100_4.sh")).unwrap();
    assert_eq!(script, raw);
    // Single quotes in the inner script kept $HOME and `date` literal.
    let output = std::fs::read_to_string(control.join("provision-100_4.output")).unwrap();
    assert!(output.contains("$HOME `date` \"quoted\""));
}

#[test]
fn delimiter_lookalike_in_the_payload_is_archived_intact() {
    let dir = tempdir().unwrap();
    let control = dir.path().join("scripts");

    // The middle line mimics the heredoc delimiter this name would use.
    let raw = "echo first\n__DOCKHAND_provision-100_5__() { :; }\necho last\n";
    let result = run_wrapped(raw, &control, "provision-100_5");
    assert!(result.status.success());

    let script = std::fs::read_to_string(control.join("provision-100_5.sh")).unwrap();
    assert_eq!(script, raw);
    let output = std::fs::read_to_string(control.join("provision-100_5.output")).unwrap();
    assert!(output.contains("last"));
}

#[test]
fn retention_prunes_the_oldest_pair_past_the_limit() {
    let dir = tempdir().unwrap();
    let control = dir.path().join("scripts");

    for i in 0..=RETAINED_SCRIPT_PAIRS {
        let name = format!("provision-200_{}", i);
        let result = run_wrapped("true\n", &control, &name);
        assert!(result.status.success());
        // Distinct mtimes so newest-first ordering is unambiguous.
        std::thread::sleep(std::time::Duration::from_millis(10));
    }

    let (scripts, outputs) = script_pairs(&control);
    assert_eq!(scripts.len(), RETAINED_SCRIPT_PAIRS);
    assert_eq!(outputs.len(), RETAINED_SCRIPT_PAIRS);
    // The very first pair is the one that got pruned.
    assert!(!scripts.contains(&"provision-200_0.sh".to_string()));
    assert!(!outputs.contains(&"provision-200_0.output".to_string()));
    assert!(scripts.contains(&format!("provision-200_{}.sh", RETAINED_SCRIPT_PAIRS)));
}
