//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT block a thread with `std::thread::sleep`.
//! Async sleeps are allowed only where a timer is the point: the scheduler's
//! delayed tasks and the simulated transport's scripted pauses. Everything
//! else waits on channels or intervals.

use std::path::Path;

use architectural_enforcement::{core_src, report, scan};

const TIMER_OWNERS: &[&str] = &["scheduler.rs", "simulated.rs"];

fn is_timer_owner(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| TIMER_OWNERS.contains(&name))
}

/// No thread-blocking sleeps anywhere in the library
#[test]
fn test_no_thread_sleep_in_production_code() {
    let violations = scan(&core_src(), |_| false, |code| code.contains("thread::sleep"));
    report("Blocking thread::sleep in production code", &violations);
}

/// Async sleeps only in timer-owning modules
#[test]
fn test_async_sleep_only_in_timer_owners() {
    let violations = scan(&core_src(), is_timer_owner, |code| {
        code.contains("::sleep(") || code.contains("sleep_until(")
    });

    if !violations.is_empty() {
        eprintln!("\n✅ ACCEPTABLE waits:");
        eprintln!("  - ScheduledTask::after / ScheduledTask::every");
        eprintln!("  - Scripted pauses in the simulated transport");
        eprintln!("  - Test code");
    }
    report("Async sleep outside the scheduler", &violations);
}

#[test]
fn test_timer_owner_detection() {
    assert!(is_timer_owner(Path::new("src/scheduler.rs")));
    assert!(is_timer_owner(Path::new("src/transport/simulated.rs")));
    assert!(!is_timer_owner(Path::new("src/controller.rs")));
}
