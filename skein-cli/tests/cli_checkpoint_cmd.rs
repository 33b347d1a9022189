use std::process::Command;

fn run_skein(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_skein")).args(args).output().expect("failed to run skein binary")
}

/// A workflow that never suspends on request-info takes no checkpoints
/// (none are forced mid-run unless the workflow is built with
/// `checkpoint_every_step`, which the declarative loader has no knob for).
/// `checkpoint list` against such a run should report zero entries, not error.
#[test]
fn checkpoint_list_is_empty_for_a_run_with_no_suspension() {
    let tmp = tempfile::tempdir().unwrap();
    let workflow = tmp.path().join("chain.yaml");
    std::fs::copy(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/chain.yaml"), &workflow).unwrap();

    let run = run_skein(&["run", workflow.to_str().unwrap(), "--message", "hi"]);
    assert!(run.status.success(), "stderr: {}", String::from_utf8_lossy(&run.stderr));

    let list = run_skein(&["checkpoint", "list", workflow.to_str().unwrap()]);
    assert!(list.status.success(), "stderr: {}", String::from_utf8_lossy(&list.stderr));
    assert!(String::from_utf8_lossy(&list.stdout).trim().is_empty());
}

#[test]
fn checkpoint_resume_on_unknown_id_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let workflow = tmp.path().join("chain.yaml");
    std::fs::copy(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/chain.yaml"), &workflow).unwrap();

    let out = run_skein(&["checkpoint", "resume", workflow.to_str().unwrap(), "does-not-exist"]);
    assert!(!out.status.success());
}
