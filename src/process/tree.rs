//! Process tree termination
//!
//! Walks the live process table from a root pid, collecting every
//! descendant plus, when the root leads its own process group, every member
//! of that group (children that double-forked away from the root are still
//! caught this way). The host process is never part of the kill set.

use std::collections::{HashMap, HashSet};
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};

/// Forcefully terminate `root` and all of its descendants.
///
/// When `root` leads its own process group the whole group is signalled
/// first, even if the root itself has already exited: children it forked
/// keep the group id after being reparented.
///
/// Returns the number of live processes signalled. A tree that is already
/// gone yields 0; this never fails.
pub fn kill_tree(root: u32) -> usize {
    if root == 0 || root == std::process::id() {
        return 0;
    }
    let targets = collect_tree(root);
    if targets.is_empty() {
        return 0;
    }

    if let Some(group) = led_group(root) {
        signal_group(group);
    }
    let mut killed = 0;
    for pid in &targets {
        if signal_kill(*pid) {
            killed += 1;
        }
    }
    if killed > 0 {
        tracing::info!(root, killed, "Process tree terminated");
    }
    killed
}

/// Live (non-zombie) pids belonging to the tree rooted at `root`.
///
/// Members of the root's process group are included even when the root is
/// a zombie or already reaped. Empty if nothing is running or if the host
/// process would be part of the set.
pub fn collect_tree(root: u32) -> Vec<u32> {
    let own_pid = std::process::id();
    if root == 0 || root == own_pid {
        return Vec::new();
    }

    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let root_pid = Pid::from_u32(root);
    let group = led_group(root);
    if system.process(root_pid).is_none() && group.is_none() {
        return Vec::new();
    }

    let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (pid, process) in system.processes() {
        if process.thread_kind().is_some() {
            continue;
        }
        if let Some(parent) = process.parent() {
            children.entry(parent).or_default().push(*pid);
        }
    }

    let mut seen: HashSet<Pid> = HashSet::new();
    let mut stack = vec![root_pid];
    while let Some(current) = stack.pop() {
        if !seen.insert(current) {
            continue;
        }
        if let Some(kids) = children.get(&current) {
            stack.extend(kids.iter().filter(|kid| !seen.contains(*kid)));
        }
    }

    if let Some(group) = group {
        for (pid, process) in system.processes() {
            if process.thread_kind().is_none() && process_group(pid.as_u32()) == Some(group) {
                seen.insert(*pid);
            }
        }
    }

    if seen.contains(&Pid::from_u32(own_pid)) {
        tracing::warn!(root, "Refusing to kill a process tree containing the host process");
        return Vec::new();
    }

    let mut targets: Vec<u32> = seen
        .into_iter()
        .filter(|pid| {
            system
                .process(*pid)
                .is_some_and(|p| p.status() != ProcessStatus::Zombie)
        })
        .map(|pid| pid.as_u32())
        .collect();
    targets.sort_unstable();
    targets
}

/// The process group `root` leads, unless it is ours.
///
/// A reaped leader's group keeps the leader's pid as its id, so a root
/// that no longer exists is still treated as a group id.
#[cfg(unix)]
fn led_group(root: u32) -> Option<u32> {
    if root == 0 || root > libc::pid_t::MAX as u32 {
        return None;
    }
    let group = process_group(root).unwrap_or(root);
    let ours = process_group(std::process::id());
    (group == root && Some(group) != ours).then_some(group)
}

#[cfg(not(unix))]
fn led_group(_root: u32) -> Option<u32> {
    None
}

#[cfg(unix)]
fn process_group(pid: u32) -> Option<u32> {
    let pgid = unsafe { libc::getpgid(pid as libc::pid_t) };
    (pgid > 0).then_some(pgid as u32)
}

#[cfg(not(unix))]
fn process_group(_pid: u32) -> Option<u32> {
    None
}

#[cfg(unix)]
fn signal_kill(pid: u32) -> bool {
    let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
    if result != 0 {
        tracing::debug!(pid, "SIGKILL failed: {}", std::io::Error::last_os_error());
    }
    result == 0
}

#[cfg(unix)]
fn signal_group(group: u32) {
    let result = unsafe { libc::kill(-(group as libc::pid_t), libc::SIGKILL) };
    if result != 0 {
        tracing::debug!(group, "Group SIGKILL failed: {}", std::io::Error::last_os_error());
    }
}

#[cfg(not(unix))]
fn signal_group(_group: u32) {}

#[cfg(not(unix))]
fn signal_kill(pid: u32) -> bool {
    let mut system = System::new();
    let pid = Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some_and(|p| p.kill())
}
