//! `shell.pid`, kept next to the instance socket while a primary runs.

use std::io::ErrorKind;
use std::path::Path;

pub(crate) fn write_pid_file(pid_path: &Path) -> std::io::Result<u32> {
    let pid = std::process::id();
    std::fs::write(pid_path, pid.to_string())?;
    Ok(pid)
}

pub(crate) fn cleanup_pid_file(pid_path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(pid_path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_pid_is_this_process() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("shell.pid");
        let written = write_pid_file(&pid_path).unwrap();
        assert_eq!(written, std::process::id());
        assert_eq!(std::fs::read_to_string(&pid_path).unwrap(), written.to_string());
    }

    #[test]
    fn cleanup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("shell.pid");
        std::fs::write(&pid_path, "1").unwrap();
        cleanup_pid_file(&pid_path).unwrap();
        cleanup_pid_file(&pid_path).unwrap();
        assert!(!pid_path.exists());
    }
}
