//! Helpers shared by process tests

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Running means present in /proc and not a zombie
pub fn is_running(pid: u32) -> bool {
    let stat = match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat,
        Err(_) => return false,
    };
    // state follows the parenthesised command name
    let state = stat
        .rsplit_once(')')
        .and_then(|(_, rest)| rest.trim_start().chars().next());
    !matches!(state, Some('Z') | Some('X') | None)
}

/// Write an executable `/bin/sh` script standing in for the runtime launcher
pub fn fake_launcher(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("launcher.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Create an empty entry script so config validation passes
pub fn entry_script(dir: &Path) -> PathBuf {
    let path = dir.join("core.ts");
    std::fs::write(&path, "").unwrap();
    path
}
