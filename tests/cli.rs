use assert_cmd::prelude::*;
use predicates::prelude::*;

#[test]
fn test_cli_help() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = assert_cmd::cargo_bin_cmd!("revsim");
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("simulate"));
    Ok(())
}

#[test]
fn completions_command_outputs_bash_script() {
    let mut cmd = assert_cmd::cargo_bin_cmd!("revsim");
    cmd.args(["completions", "bash"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("revsim"));
}

#[test]
fn unreadable_config_fails() {
    let mut cmd = assert_cmd::cargo_bin_cmd!("revsim");
    cmd.args(["--config", "does-not-exist.yaml", "place", "Antsirabe"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}
