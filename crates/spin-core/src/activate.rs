//! Patches the activation scripts of a virtual environment so that they
//! export the variables spin exported, and restore them on `deactivate`.
//!
//! Every run re-renders the scripts from the `.bak` copy taken on the first
//! run, so patching twice yields the same text.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Posix,
    PowerShell,
    BatchActivate,
    BatchDeactivate,
    Python,
}

#[derive(Debug)]
pub struct Schema {
    pub dialect: Dialect,
    pub script: &'static str,
    pub marker: &'static str,
    pub replacements: &'static [(&'static str, &'static str)],
    pub set_pattern: &'static str,
    pub reset_pattern: &'static str,
    pub template: &'static str,
}

const SHELL_MARKER: &str = "\n## PATCHED BY spin.builtin.virtualenv\n";
const BATCH_MARKER: &str = "\nREM Patched by spin.builtin.virtualenv\n";
const PYTHON_MARKER: &str = "# Patched by spin.builtin.virtualenv\n";

const RENAME_DEACTIVATE: &[(&str, &str)] = &[("deactivate", "origdeactivate")];

pub static SCHEMAS: [Schema; 5] = [
    Schema {
        dialect: Dialect::Posix,
        script: "activate",
        marker: SHELL_MARKER,
        replacements: RENAME_DEACTIVATE,
        set_pattern: r#"
_OLD_SPIN_{name}="${name}"
{name}="{value}"
export {name}
"#,
        reset_pattern: r#"
if ! [ -z "${_OLD_SPIN_{name}+_}" ] ; then
    {name}="$_OLD_SPIN_{name}"
    export {name}
    unset _OLD_SPIN_{name}
fi
"#,
        template: r#"
{patchmarker}
{original}
deactivate () {
    {resetters}
    if [ ! "${1-}" = "nondestructive" ] ; then
        # Self destruct!
        unset -f deactivate
        origdeactivate
    fi
}

deactivate nondestructive

{setters}

# Forget remembered command locations so the new PATH applies.
hash -r 2>/dev/null
"#,
    },
    Schema {
        dialect: Dialect::BatchActivate,
        script: "activate.bat",
        marker: BATCH_MARKER,
        replacements: &[],
        set_pattern: r#"
if not defined _OLD_SPIN_{name} goto ENDIFSPIN{name}1
    set "{name}=%_OLD_SPIN_{name}%"
:ENDIFSPIN{name}1
if defined _OLD_SPIN_{name} goto ENDIFSPIN{name}2
    set "_OLD_SPIN_{name}=%{name}%"
:ENDIFSPIN{name}2
set "{name}={value}"
"#,
        reset_pattern: "",
        template: r"
@echo off
{patchmarker}
{original}
{setters}
",
    },
    Schema {
        dialect: Dialect::BatchDeactivate,
        script: "deactivate.bat",
        marker: BATCH_MARKER,
        replacements: &[],
        set_pattern: "",
        reset_pattern: r#"
if not defined _OLD_SPIN_{name} goto ENDIFVSPIN{name}
    set "{name}=%_OLD_SPIN_{name}%"
    set _OLD_SPIN_{name}=
:ENDIFVSPIN{name}
"#,
        template: r"
@echo off
{patchmarker}
{original}
{resetters}
",
    },
    Schema {
        dialect: Dialect::PowerShell,
        script: "activate.ps1",
        marker: SHELL_MARKER,
        replacements: RENAME_DEACTIVATE,
        set_pattern: r#"
New-Variable -Scope global -Name _OLD_SPIN_{name} -Value $env:{name}
$env:{name} = "{value}"
"#,
        reset_pattern: r#"
if (Test-Path variable:_OLD_SPIN_{name}) {
    $env:{name} = $variable:_OLD_SPIN_{name}
    Remove-Variable "_OLD_SPIN_{name}" -Scope global
}
"#,
        template: r"
{patchmarker}
{original}
function global:deactivate([switch] $NonDestructive) {
    {resetters}
    if (!$NonDestructive) {
        Remove-Item function:deactivate
        origdeactivate
    }
}

deactivate -nondestructive

{setters}
",
    },
    Schema {
        dialect: Dialect::Python,
        script: "activate_this.py",
        marker: PYTHON_MARKER,
        replacements: &[],
        set_pattern: r#"os.environ["{name}"] = r"{value}""#,
        reset_pattern: "",
        template: r"
{patchmarker}
{original}
{setters}
",
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Patched(PathBuf),
    Missing,
    /// Marker present but the pristine copy is gone.
    NoBackup(PathBuf),
}

impl Schema {
    pub fn path(&self, scriptdir: &Path) -> PathBuf {
        scriptdir.join(self.script)
    }

    /// Renders the patched script from its pristine text.
    pub fn render(&self, original: &str, exports: &[(String, String)]) -> String {
        let mut original = original
            .strip_prefix('\u{feff}')
            .unwrap_or(original)
            .to_string();
        for (from, to) in self.replacements {
            original = original.replace(from, to);
        }
        let setters = self.blocks(self.set_pattern, exports);
        let resetters = self.blocks(self.reset_pattern, exports);
        substitute(
            self.template,
            &[
                ("patchmarker", self.marker),
                ("original", &original),
                ("resetters", &resetters),
                ("setters", &setters),
            ],
        )
    }

    fn blocks(&self, pattern: &str, exports: &[(String, String)]) -> String {
        if pattern.is_empty() {
            return String::new();
        }
        exports
            .iter()
            .map(|(name, value)| substitute(pattern, &[("name", name), ("value", value)]))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Patches the script in `scriptdir` if it exists.
    pub fn patch(&self, scriptdir: &Path, exports: &[(String, String)]) -> Result<PatchOutcome> {
        let script = self.path(scriptdir);
        if !script.exists() {
            return Ok(PatchOutcome::Missing);
        }
        let backup = backup_path(&script);
        let current = fs::read_to_string(&script)
            .with_context(|| format!("reading {}", script.display()))?;
        if !current.contains(self.marker) {
            fs::copy(&script, &backup).with_context(|| {
                format!("backing up {} to {}", script.display(), backup.display())
            })?;
        } else if !backup.exists() {
            warn!(
                script = %script.display(),
                "already patched but no backup found; leaving it alone"
            );
            return Ok(PatchOutcome::NoBackup(script));
        }
        info!("Patching {}", script.display());
        let original = fs::read_to_string(&backup)
            .with_context(|| format!("reading {}", backup.display()))?;
        fs::write(&script, self.render(&original, exports))
            .with_context(|| format!("writing {}", script.display()))?;
        Ok(PatchOutcome::Patched(script))
    }
}

fn backup_path(script: &Path) -> PathBuf {
    let mut name = script.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Patches every dialect present in `scriptdir`.
///
/// `exports` are the variables to bake in; unset variables must already be
/// filtered out. When `PATH` is among them the script directory is put in
/// front of it unless it is already there.
pub fn patch_all(
    scriptdir: &Path,
    exports: &[(String, String)],
    separator: char,
) -> Result<Vec<PatchOutcome>> {
    let exports = with_scriptdir_on_path(exports, scriptdir, separator);
    SCHEMAS
        .iter()
        .map(|schema| schema.patch(scriptdir, &exports))
        .collect()
}

fn with_scriptdir_on_path(
    exports: &[(String, String)],
    scriptdir: &Path,
    separator: char,
) -> Vec<(String, String)> {
    let dir = scriptdir.display().to_string();
    exports
        .iter()
        .map(|(name, value)| {
            if name.eq_ignore_ascii_case("PATH") && !value.split(separator).any(|part| part == dir)
            {
                (name.clone(), format!("{dir}{separator}{value}"))
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}

/// Single-pass `{key}` substitution. Braces that do not enclose a known key
/// are kept, and substituted text is never rescanned.
fn substitute(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let replacement = after.find('}').and_then(|end| {
            let key = &after[..end];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, end))
        });
        match replacement {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
