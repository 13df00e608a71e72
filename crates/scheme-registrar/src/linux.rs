//! Linux registration through the XDG desktop database.

use crate::{write_if_changed, DesktopEntry, RegistrarError, RegistrarResult, Registration, SchemeRegistration};
use std::process::Command;
use tracing::debug;

pub fn register(registration: &SchemeRegistration) -> RegistrarResult<Registration> {
    let applications = dirs::data_dir()
        .ok_or_else(|| RegistrarError::Platform("no XDG data directory".to_string()))?
        .join("applications");

    let entry = DesktopEntry::new(registration);
    let path = applications.join(&entry.file_name);
    let written = write_if_changed(&path, &entry.content)?;
    debug!(path = %path.display(), written, "Desktop entry checked");

    let mime = DesktopEntry::mime_type(&registration.scheme);
    if !written && current_default(&mime).as_deref() == Some(entry.file_name.as_str()) {
        return Ok(Registration::AlreadyCurrent);
    }

    run("xdg-mime", &["default", &entry.file_name, &mime])?;
    // Refreshing the cache is best effort; xdg-mime already wrote mimeapps.list.
    let _ = run(
        "update-desktop-database",
        &[applications.to_string_lossy().as_ref()],
    );
    Ok(Registration::Registered)
}

fn current_default(mime: &str) -> Option<String> {
    let output = Command::new("xdg-mime")
        .args(["query", "default", mime])
        .output()
        .ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn run(program: &str, args: &[&str]) -> RegistrarResult<()> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| RegistrarError::CommandFailed {
            command: program.to_string(),
            detail: e.to_string(),
        })?;
    if output.status.success() {
        Ok(())
    } else {
        Err(RegistrarError::CommandFailed {
            command: program.to_string(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
