//! Integration Test: Task Ownership
//!
//! **Policy**: Background work is never fire-and-forget. Every task is a
//! `ScheduledTask` owned by the value that needs it, so only the scheduler
//! may call `tokio::spawn` (or `spawn_blocking`) directly.

use std::path::Path;

use architectural_enforcement::{core_src, report, scan};

fn is_scheduler(path: &Path) -> bool {
    path.ends_with("scheduler.rs")
}

fn spawns(code: &str) -> bool {
    code.contains("tokio::spawn(")
        || code.contains("task::spawn(")
        || code.contains("spawn_blocking(")
        || code.contains("std::thread::spawn(")
}

#[test]
fn test_only_scheduler_spawns_tasks() {
    let violations = scan(&core_src(), is_scheduler, spawns);

    if !violations.is_empty() {
        eprintln!("\n✅ Use ScheduledTask::spawn / after / every and keep the handle.");
    }
    report("Direct spawn outside the scheduler", &violations);
}

#[test]
fn test_spawn_detection() {
    assert!(spawns("    let h = tokio::spawn(async move {"));
    assert!(spawns("tokio::task::spawn(fut)"));
    assert!(!spawns("ScheduledTask::spawn(\"pump\", |_| body)"));
}
