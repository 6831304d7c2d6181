use anyhow::Result;
use pep440_rs::Version;
use serde_json::json;
use spin_domain::parse_version;

use crate::error::UserError;
use crate::outcome::ExecutionOutcome;

type Matcher = fn(&str, Option<&Version>) -> bool;

/// Packages needed to build CPython from source, per distribution. Tk is
/// left out on purpose since it drags in X11.
const SYSTEM_REQUIREMENTS: &[(Matcher, &[(&str, &str)])] = &[
    (
        |distro, _| matches!(distro, "debian" | "mint" | "ubuntu"),
        &[(
            "apt-get",
            "build-essential curl git libbz2-dev libffi-dev libkrb5-dev liblzma-dev \
             libncursesw5-dev libreadline-dev libsqlite3-dev libssl-dev libxml2-dev \
             libxmlsec1-dev make xz-utils zlib1g-dev",
        )],
    ),
    (
        |distro, version| {
            distro == "centos" || (distro == "fedora" && !is_modern_fedora(version))
        },
        &[(
            "yum",
            "git gcc zlib-devel bzip2 bzip2-devel readline-devel sqlite sqlite-devel \
             openssl-devel libffi-devel xz-devel",
        )],
    ),
    (
        |distro, version| distro == "fedora" && is_modern_fedora(version),
        &[(
            "dnf",
            "git make gcc zlib-devel bzip2 bzip2-devel readline-devel sqlite sqlite-devel \
             openssl-devel libffi-devel xz-devel",
        )],
    ),
    (
        |distro, _| distro == "darwin",
        &[("brew", "git openssl readline sqlite3 xz zlib")],
    ),
    (
        |distro, _| distro.starts_with("opensuse"),
        &[(
            "zypper",
            "git gcc automake bzip2 libbz2-devel xz xz-devel openssl-devel ncurses-devel \
             readline-devel zlib-devel libffi-devel sqlite3-devel",
        )],
    ),
    (
        |distro, _| distro == "rhel",
        &[(
            "yum",
            "gcc zlib-devel bzip2 bzip2-devel readline-devel sqlite sqlite-devel \
             openssl-devel libffi-devel xz-devel",
        )],
    ),
    // nuget binaries need nothing from the system
    (|distro, _| distro == "windows", &[]),
];

fn is_modern_fedora(version: Option<&Version>) -> bool {
    version.is_some_and(|version| version.release().first().is_some_and(|major| *major >= 22))
}

/// `spin system-provision <distro> [version]`: prints the package manager
/// commands that install what building Python needs.
pub fn system_provision(distro: &str, version: Option<&str>) -> Result<ExecutionOutcome> {
    let distro = distro.trim().to_ascii_lowercase();
    let version = version.map(parse_version).transpose()?;
    let Some((_, managers)) = SYSTEM_REQUIREMENTS
        .iter()
        .find(|(matches, _)| matches(&distro, version.as_ref()))
    else {
        return Err(UserError::new(
            format!("no system requirements known for '{distro}'"),
            json!({
                "distro": distro,
                "hint": "supported: debian, mint, ubuntu, centos, fedora, rhel, opensuse*, darwin, windows",
            }),
        )
        .into());
    };
    if managers.is_empty() {
        return Ok(ExecutionOutcome::success(
            format!("{distro} needs no system packages"),
            json!({ "distro": distro, "packages": {} }),
        ));
    }
    let lines: Vec<String> = managers
        .iter()
        .map(|(manager, packages)| format!("{manager} install {packages}"))
        .collect();
    let packages: serde_json::Map<_, _> = managers
        .iter()
        .map(|(manager, packages)| {
            let list: Vec<&str> = packages.split_whitespace().collect();
            ((*manager).to_string(), json!(list))
        })
        .collect();
    Ok(ExecutionOutcome::printed(
        lines.join("\n"),
        json!({ "distro": distro, "packages": packages }),
    ))
}
