// tests/binary_errors.rs

use std::process::Command;

fn quorumctl() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_quorumctl"));
    cmd.env("QUORUMCTL_LOG", "error").env("RUST_BACKTRACE", "1");
    cmd
}

#[test]
fn startup_errors_are_one_plain_line() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("Quorum.toml");

    let out = quorumctl()
        .arg("--config")
        .arg(&missing)
        .arg("--dry-run")
        .output()
        .unwrap();

    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    let lines: Vec<&str> = stderr.lines().collect();
    assert_eq!(lines.len(), 1, "{stderr}");
    assert!(lines[0].starts_with("quorumctl error: IO error:"), "{stderr}");
    assert!(!stderr.contains("Caused by"));
    assert!(!stderr.contains("backtrace"));
    assert!(out.stdout.is_empty());
}

#[test]
fn dry_run_prints_the_plan_and_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("Quorum.toml");
    std::fs::write(&config, "[dataset]\nrequired = false\n").unwrap();

    let out = quorumctl()
        .args(["2", "--headless", "--dry-run", "--config"])
        .arg(&config)
        .output()
        .unwrap();

    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("presentation = headless"), "{stdout}");
    assert!(stdout.contains("- client @ 127.0.0.1:20000"), "{stdout}");
}
