//! Realtime and fencing plumbing.
//!
//! The daemon pins its memory and raises its scheduling priority so a
//! loaded box cannot starve the heartbeat loop into a self-eviction, and
//! fences itself with an uncleaned reboot when the protocol demands it.

use std::str::FromStr;
use tracing::{error, warn};

/// Scheduling queue for the pace loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduler {
    /// Normal timesharing, priority applied via nice.
    Other,
    /// Realtime round-robin.
    Rr,
    /// Realtime FIFO.
    Fifo,
}

impl FromStr for Scheduler {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "other" => Ok(Scheduler::Other),
            "rr" => Ok(Scheduler::Rr),
            "fifo" => Ok(Scheduler::Fifo),
            other => Err(format!("invalid scheduling queue '{other}'")),
        }
    }
}

/// Pin current and future pages into memory. Failure is logged, not
/// fatal: the daemon still works, it is just evictable under pressure.
#[cfg(unix)]
pub fn lock_memory() {
    // SAFETY: mlockall takes only flags and touches no caller memory.
    let rc = unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) };
    if rc != 0 {
        warn!(
            errno = std::io::Error::last_os_error().raw_os_error(),
            "unable to mlockall()"
        );
    }
}

#[cfg(not(unix))]
pub fn lock_memory() {}

/// Apply the configured scheduling queue and priority to this process.
#[cfg(target_os = "linux")]
pub fn set_priority(scheduler: Scheduler, priority: i32) {
    let (policy, sched_priority, nice_after) = match scheduler {
        Scheduler::Other => (libc::SCHED_OTHER, 0, Some(priority)),
        Scheduler::Rr => (libc::SCHED_RR, priority, None),
        Scheduler::Fifo => (libc::SCHED_FIFO, priority, None),
    };

    let param = libc::sched_param { sched_priority };
    // SAFETY: param outlives the call; pid 0 targets the calling process.
    let rc = unsafe { libc::sched_setscheduler(0, policy, &param) };
    if rc != 0 {
        warn!(
            ?scheduler,
            priority,
            errno = std::io::Error::last_os_error().raw_os_error(),
            "sched_setscheduler failed"
        );
        return;
    }

    if let Some(nice) = nice_after {
        // SAFETY: nice takes an increment and touches no caller memory.
        let rc = unsafe { libc::nice(nice) };
        if rc == -1 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error().unwrap_or(0) != 0 {
                warn!(nice, errno = err.raw_os_error(), "nice failed");
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_priority(_scheduler: Scheduler, _priority: i32) {}

/// Reboot the machine immediately. There is deliberately no cleanup: this
/// is the fencing path, and anything short of a hard reboot risks the
/// undead-node scenario.
#[cfg(target_os = "linux")]
pub fn reboot_now() {
    // SAFETY: RB_AUTOBOOT takes no pointer arguments.
    unsafe {
        libc::sync();
        libc::reboot(libc::RB_AUTOBOOT);
    }
    // Only reachable without the privilege to reboot.
    error!(
        errno = std::io::Error::last_os_error().raw_os_error(),
        "reboot(RB_AUTOBOOT) returned; insufficient privilege?"
    );
}

#[cfg(not(target_os = "linux"))]
pub fn reboot_now() {
    error!("reboot requested, but not supported on this platform");
}

/// Stop this process (SIGSTOP) so an operator can inspect it.
#[cfg(unix)]
pub fn halt_self() {
    // SAFETY: raise delivers a signal to the calling thread.
    unsafe {
        libc::raise(libc::SIGSTOP);
    }
}

#[cfg(not(unix))]
pub fn halt_self() {
    error!("halt requested, but not supported on this platform");
}

/// Detach standard streams to `/dev/null` (the `-Q` flag).
#[cfg(unix)]
pub fn detach_stdio() {
    use std::os::unix::io::AsRawFd;

    let null = match std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
    {
        Ok(file) => file,
        Err(err) => {
            warn!(%err, "cannot open /dev/null; keeping standard streams");
            return;
        }
    };

    for fd in 0..=2 {
        // SAFETY: dup2 onto the three standard descriptors.
        unsafe {
            libc::dup2(null.as_raw_fd(), fd);
        }
    }
}

#[cfg(not(unix))]
pub fn detach_stdio() {}
