use crate::config::InstallerConfig;
use std::fmt;
use std::path::Path;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: String,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

pub(crate) fn command_exists(name: &str) -> bool {
    if name.contains(std::path::MAIN_SEPARATOR) {
        return Path::new(name).is_file();
    }
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check that the configured installer can be started.
/// Returns a list of missing items. Empty list means all prerequisites are met.
pub fn check_installer_prereqs(config: &InstallerConfig) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if !command_exists(&config.program) {
        missing.push(MissingPrereq {
            name: config.program.clone(),
            purpose: "installing, removing, and running package dependencies",
            install_hint: "install Node.js (ships npm) or set PUCKAGE_INSTALLER",
        });
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nPuckage drives an external installer to manage node_modules.");
    msg
}
