use std::{fs, process::Command};

use assert_cmd::cargo::cargo_bin_cmd;

mod common;

use common::{find_python, release_version, require_online, Project};

#[test]
fn provisions_existing_interpreter_and_runs_python() {
    if !require_online() {
        return;
    }
    let Some(python) = find_python() else {
        eprintln!("skipping provision test (python not found)");
        return;
    };
    let project = Project::new("[python]\nrequirements = [\"six\"]\n");
    let use_python = format!("python.use={python}");

    cargo_bin_cmd!("spin")
        .args(project.args(&["-p", &use_python, "provision"]))
        .assert()
        .success();
    assert!(project.venv().join("spininfo.memo").exists());
    let memo = fs::read_to_string(project.venv().join("spininfo.memo")).expect("memo");
    assert!(memo.contains("six"));

    cargo_bin_cmd!("spin")
        .args(project.args(&[
            "-p",
            &use_python,
            "python",
            "-c",
            "import six, sys; sys.exit(7)",
        ]))
        .assert()
        .code(7);
}

#[test]
fn provisioning_twice_reuses_the_environment() {
    if !require_online() {
        return;
    }
    let Some(python) = find_python() else {
        eprintln!("skipping provision test (python not found)");
        return;
    };
    let project = Project::new("");
    let use_python = format!("python.use={python}");
    for _ in 0..2 {
        cargo_bin_cmd!("spin")
            .args(project.args(&["-q", "-p", &use_python, "--provision", "env"]))
            .assert()
            .success();
    }
    assert!(project.venv().exists());
}

#[cfg(unix)]
#[test]
fn provisioned_venv_reports_the_pinned_version() {
    if !require_online() {
        return;
    }
    let Some(version) = find_python().as_deref().and_then(release_version) else {
        eprintln!("skipping provision test (no released python found)");
        return;
    };
    let project = Project::new(&format!("[python]\nversion = \"{version}\"\n"));

    cargo_bin_cmd!("spin")
        .args(project.args(&["-q", "provision"]))
        .assert()
        .success();

    let output = Command::new(project.venv().join("bin").join("python"))
        .arg("--version")
        .output()
        .expect("venv python runs");
    assert!(output.status.success());
    let reported = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(reported.trim(), format!("Python {version}"));
}

#[cfg(unix)]
#[test]
fn sourcing_env_output_activates_the_venv() {
    if !require_online() {
        return;
    }
    let Some(python) = find_python() else {
        eprintln!("skipping provision test (python not found)");
        return;
    };
    let project = Project::new("");
    let use_python = format!("python.use={python}");
    cargo_bin_cmd!("spin")
        .args(project.args(&["-q", "-p", &use_python, "provision"]))
        .assert()
        .success();

    let env_args: Vec<String> = project
        .args(&["-q", "-p", &use_python, "env"])
        .iter()
        .map(|arg| format!("'{arg}'"))
        .collect();
    let script = format!(
        "eval \"$(\"$SPIN_BIN\" {})\" && echo \"$VIRTUAL_ENV\" && command -v python",
        env_args.join(" ")
    );
    let output = Command::new("sh")
        .args(["-c", &script])
        .env("SPIN_BIN", env!("CARGO_BIN_EXE_spin"))
        .env_remove("VIRTUAL_ENV")
        .env_remove("SPIN_LOG")
        .output()
        .expect("sh runs");
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    assert!(
        output.status.success(),
        "{stdout}{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2, "{stdout}");
    assert_eq!(lines[0], project.venv().display().to_string());
    assert_eq!(
        lines[1],
        project.venv().join("bin").join("python").display().to_string()
    );
}
