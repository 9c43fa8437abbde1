//! Integration Test: Panic-Free Production Code
//!
//! **Policy**: Library and binary code propagate failures with `?` or log
//! them. `unwrap()`, `expect()`, `panic!`, and `todo!` are reserved for tests.

use architectural_enforcement::{core_src, report, scan};

fn panics(code: &str) -> bool {
    code.contains(".unwrap()")
        || code.contains(".expect(")
        || code.contains("panic!(")
        || code.contains("todo!(")
        || code.contains("unimplemented!(")
}

#[test]
fn test_no_panics_in_production_code() {
    let violations = scan(&core_src(), |_| false, panics);
    report("Panicking call in production code", &violations);
}

#[test]
fn test_panic_detection() {
    assert!(panics("let x = value.unwrap();"));
    assert!(panics("let x = value.expect(\"set\");"));
    assert!(!panics("let x = value.unwrap_or_default();"));
    assert!(!panics("let x = value.unwrap_or(0);"));
}
