use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;

#[test]
fn debian_prints_apt_get_command() {
    let assert = cargo_bin_cmd!("spin")
        .args(["system-provision", "Debian"])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.starts_with("apt-get install build-essential"), "{stdout}");
    assert_eq!(stdout.lines().count(), 1);
}

#[test]
fn fedora_version_selects_the_package_manager() {
    let assert = cargo_bin_cmd!("spin")
        .args(["--json", "system-provision", "fedora", "38"])
        .assert()
        .success();
    let payload: Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("json output");
    assert_eq!(payload["status"], "ok");
    assert!(payload["details"]["packages"]["dnf"]
        .as_array()
        .is_some_and(|packages| !packages.is_empty()));

    let assert = cargo_bin_cmd!("spin")
        .args(["system-provision", "fedora", "21"])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.starts_with("yum install"), "{stdout}");
}

#[test]
fn unknown_distributions_are_user_errors() {
    cargo_bin_cmd!("spin")
        .args(["system-provision", "plan9"])
        .assert()
        .code(1);
}
