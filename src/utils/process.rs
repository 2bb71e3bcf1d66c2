//! Process identity and liveness checks.
//!
//! Process locks are reclaimed by checking whether the owning pid is
//! still alive in the OS process table, so a crashed worker's lock
//! disappears without any explicit cleanup.

/// Current process id.
pub fn current_pid() -> u32 {
    std::process::id()
}

/// Hostname of this machine, or "unknown" if it cannot be determined.
pub fn current_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Check whether a process with the given pid is currently alive.
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    // Signal 0 performs error checking only. EPERM means the process
    // exists but belongs to another user.
    let result = unsafe { libc::kill(pid as i32, 0) };
    if result == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Fallback for platforms without `kill(2)`: report alive so that locks
/// from unknown processes are never reclaimed spuriously.
#[cfg(not(unix))]
pub fn is_alive(pid: u32) -> bool {
    pid != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_is_alive() {
        assert!(is_alive(current_pid()));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonexistent_pid_is_dead() {
        // Far beyond any realistic pid_max
        assert!(!is_alive(999_999_999));
        assert!(!is_alive(0));
    }

    #[test]
    fn test_hostname_nonempty() {
        assert!(!current_hostname().is_empty());
    }
}
