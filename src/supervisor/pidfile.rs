//! Pid file access and process signaling

use std::io::ErrorKind;
use std::path::Path;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::error::{Result, SandboxError};

/// Parse pid file contents. Only strictly positive pids are accepted, since
/// 0 and negative values address whole process groups.
pub fn parse_pid(contents: &str) -> Option<Pid> {
    match contents.trim().parse::<i32>() {
        Ok(pid) if pid > 0 => Some(Pid::from_raw(pid)),
        _ => None,
    }
}

/// Read the pid recorded in `path` without touching the file
pub fn read_pid(path: &Path) -> Result<Option<Pid>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(parse_pid(&contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SandboxError::io("read pid file", path, e)),
    }
}

/// Read the pid recorded in `path` and delete the file straight away.
///
/// A missing file means the server is already stopped. Unreadable contents
/// are logged and the file is still removed.
pub fn take_pid(path: &Path) -> Result<Option<Pid>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("No pid file at {}, treating as stopped", path.display());
            return Ok(None);
        }
        Err(e) => return Err(SandboxError::io("read pid file", path, e)),
    };

    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(SandboxError::io("remove pid file", path, e)),
    }

    let pid = parse_pid(&contents);
    if pid.is_none() {
        tracing::warn!(
            "Ignoring malformed pid file {} (contents {:?})",
            path.display(),
            contents.trim()
        );
    }
    Ok(pid)
}

/// Send SIGKILL to `pid`. Returns whether the signal was delivered; a
/// process that is already gone is not an error.
pub fn kill(pid: Pid) -> bool {
    match signal::kill(pid, Signal::SIGKILL) {
        Ok(()) => {
            tracing::debug!("Sent SIGKILL to {}", pid);
            true
        }
        Err(Errno::ESRCH) => {
            tracing::debug!("Process {} already gone", pid);
            false
        }
        Err(e) => {
            tracing::warn!("Could not signal process {}: {}", pid, e);
            false
        }
    }
}

/// Whether a process with this pid exists
pub fn is_alive(pid: Pid) -> bool {
    signal::kill(pid, None).is_ok()
}
