//! Tests that drive the `psfetch` binary.

use std::path::Path;
use std::process::{Command, Output};

fn psfetch(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_psfetch"))
        .args(args)
        .output()
        .expect("run psfetch")
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.name=psfetch", "-c", "user.email=psfetch@example.org"])
        .args(args)
        .output()
        .expect("run git");
    assert!(output.status.success(), "git {args:?} failed");
    String::from_utf8(output.stdout).expect("utf-8").trim().to_string()
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

fn write_config(dir: &Path, remote: &Path, change: u64) -> std::path::PathBuf {
    let config = format!(
        r#"
[remote]
url = "{}"
change = {change}
timeout_secs = 30

[install]
target_dir = "{}"
work_dir = "{}"
files = ["driver.py"]
"#,
        remote.display(),
        dir.join("target").display(),
        dir.join("work").display(),
    );
    let path = dir.join("psfetch.toml");
    std::fs::write(&path, config).expect("write config");
    path
}

#[test]
fn test_devstack_non_install_phase_is_noop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("absent.toml");
    let output = psfetch(&[
        "--config",
        config.to_str().expect("utf-8 path"),
        "devstack",
        "unstack",
    ]);
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_resolve_without_config_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("absent.toml");
    let output = psfetch(&["--config", config.to_str().expect("utf-8 path"), "resolve"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("absent.toml"), "{stderr}");
}

#[test]
fn test_resolve_prints_latest_ref() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().expect("tempdir");
    let remote = dir.path().join("remote");
    std::fs::create_dir(&remote).expect("create remote");
    git(&remote, &["init", "--quiet"]);
    std::fs::write(remote.join("driver.py"), "# v1\n").expect("write");
    git(&remote, &["add", "-A"]);
    git(&remote, &["commit", "--quiet", "-m", "v1"]);
    let first = git(&remote, &["rev-parse", "HEAD"]);
    git(&remote, &["update-ref", "refs/changes/05/5/2", &first]);
    std::fs::write(remote.join("driver.py"), "# v2\n").expect("write");
    git(&remote, &["commit", "--quiet", "-am", "v2"]);
    let second = git(&remote, &["rev-parse", "HEAD"]);
    git(&remote, &["update-ref", "refs/changes/05/5/11", &second]);

    let config = write_config(dir.path(), &remote, 5);
    let output = psfetch(&["--config", config.to_str().expect("utf-8 path"), "resolve"]);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("refs/changes/05/5/11 {second}")
    );

    let output = psfetch(&[
        "--config",
        config.to_str().expect("utf-8 path"),
        "resolve",
        "--change",
        "6",
    ]);
    assert!(!output.status.success(), "change 6 has no patchsets");
}
