//! Liveness and process-tree queries by pid.
//!
//! Linux reads `/proc` directly; other unix systems ask `ps`.

use std::collections::{HashMap, VecDeque};

/// Scheduler state of a process, as far as liveness is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Alive,
    /// Exited but not yet reaped by its parent.
    Zombie,
}

/// A pid that can be handed to `kill(2)` without addressing a process group.
pub(crate) fn signalable(pid: u32) -> bool {
    pid > 0 && i32::try_from(pid).is_ok()
}

/// True if a process with this pid exists, zombies included.
#[cfg(unix)]
pub fn exists(pid: u32) -> bool {
    if !signalable(pid) {
        return false;
    }
    // SAFETY: signal 0 performs only the existence and permission checks.
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn exists(pid: u32) -> bool {
    state(pid).is_some()
}

/// `None` when the process does not exist.
pub fn state(pid: u32) -> Option<ProcState> {
    if !signalable(pid) {
        return None;
    }
    os::state(pid)
}

/// True iff the process exists and is not a zombie.
pub fn is_running(pid: u32) -> bool {
    matches!(state(pid), Some(ProcState::Alive))
}

/// Every transitive child of `root`, parents before children. `root` itself
/// is not included.
pub fn descendants(root: u32) -> Vec<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for (pid, ppid) in os::parent_table() {
        children.entry(ppid).or_default().push(pid);
    }

    let mut found = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(pid) = queue.pop_front() {
        if let Some(kids) = children.get(&pid) {
            for &kid in kids {
                // pid reuse can in principle produce a cycle
                if kid != root && !found.contains(&kid) {
                    found.push(kid);
                    queue.push_back(kid);
                }
            }
        }
    }
    found
}

/// Parse the state letter and ppid out of a `/proc/<pid>/stat` line.
///
/// The command name sits in parentheses and may itself contain spaces or
/// parentheses, so fields are read after the last `)`.
fn parse_stat(line: &str) -> Option<(char, u32)> {
    let rest = &line[line.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let ppid = fields.next()?.parse().ok()?;
    Some((state, ppid))
}

fn classify(state: char) -> ProcState {
    match state {
        'Z' | 'X' | 'x' => ProcState::Zombie,
        _ => ProcState::Alive,
    }
}

#[cfg(target_os = "linux")]
mod os {
    use super::{classify, parse_stat, ProcState};

    pub fn state(pid: u32) -> Option<ProcState> {
        let line = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        parse_stat(&line).map(|(s, _)| classify(s))
    }

    pub fn parent_table() -> Vec<(u32, u32)> {
        let Ok(entries) = std::fs::read_dir("/proc") else {
            return Vec::new();
        };
        entries
            .flatten()
            .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
            .filter_map(|pid| {
                let line = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
                parse_stat(&line).map(|(_, ppid)| (pid, ppid))
            })
            .collect()
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
mod os {
    use super::{classify, ProcState};
    use std::process::Command;

    pub fn state(pid: u32) -> Option<ProcState> {
        let out = Command::new("ps")
            .args(["-o", "stat=", "-p", &pid.to_string()])
            .output()
            .ok()?;
        if !out.status.success() {
            return None;
        }
        let text = String::from_utf8_lossy(&out.stdout);
        text.trim().chars().next().map(classify)
    }

    pub fn parent_table() -> Vec<(u32, u32)> {
        let Ok(out) = Command::new("ps").args(["-axo", "pid=,ppid="]).output() else {
            return Vec::new();
        };
        String::from_utf8_lossy(&out.stdout)
            .lines()
            .filter_map(|line| {
                let mut cols = line.split_whitespace();
                let pid = cols.next()?.parse().ok()?;
                let ppid = cols.next()?.parse().ok()?;
                Some((pid, ppid))
            })
            .collect()
    }
}

#[cfg(not(unix))]
mod os {
    use super::ProcState;
    use std::process::Command;

    pub fn state(pid: u32) -> Option<ProcState> {
        let out = Command::new("tasklist")
            .args(["/FI", &format!("PID eq {pid}"), "/NH", "/FO", "CSV"])
            .output()
            .ok()?;
        let text = String::from_utf8_lossy(&out.stdout);
        text.contains(&format!("\"{pid}\"")).then_some(ProcState::Alive)
    }

    // `taskkill /T` walks the tree itself, so nothing is enumerated here.
    pub fn parent_table() -> Vec<(u32, u32)> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_stat_handles_odd_command_names() {
        let line = "4242 (my (weird) cmd) S 17 4242 4242 0 -1 4194560";
        assert_eq!(parse_stat(line), Some(('S', 17)));
        assert_eq!(parse_stat("12 (defunct) Z 1 0"), Some(('Z', 1)));
        assert_eq!(parse_stat("garbage"), None);
    }

    #[test]
    fn zombie_letters_are_not_alive() {
        assert_eq!(classify('Z'), ProcState::Zombie);
        assert_eq!(classify('R'), ProcState::Alive);
        assert_eq!(classify('S'), ProcState::Alive);
    }

    #[test]
    fn own_process_is_running() {
        let me = std::process::id();
        assert!(exists(me));
        assert!(is_running(me));
    }

    #[test]
    fn pid_zero_and_overflow_are_never_live() {
        assert!(!exists(0));
        assert!(!is_running(0));
        assert!(!is_running(u32::MAX));
    }

    #[cfg(unix)]
    #[test]
    fn unreaped_child_is_a_zombie() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        // Give it time to exit; it stays a zombie until waited on.
        std::thread::sleep(std::time::Duration::from_millis(300));
        assert!(exists(pid));
        assert!(!is_running(pid));
        child.wait().unwrap();
        assert!(!exists(pid));
    }

    #[cfg(unix)]
    #[test]
    fn descendants_include_grandchildren() {
        let mut child = std::process::Command::new("sh")
            .args(["-c", "sleep 5 & sleep 5; wait"])
            .spawn()
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(300));

        let tree = descendants(child.id());
        assert!(tree.len() >= 2, "expected the two sleeps, got {tree:?}");
        assert!(tree.iter().all(|&pid| pid != child.id()));

        for pid in tree {
            unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
        }
        child.kill().unwrap();
        child.wait().unwrap();
    }
}
