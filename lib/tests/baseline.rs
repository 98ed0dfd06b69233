use std::sync::Arc;

use rift::baseline::{self, BaselineKind};
use rift::MatcherContext;

#[test]
fn lifecycle() {
    assert!(!baseline::is_initialized());

    let numeric = baseline::get(BaselineKind::Numeric).unwrap();
    assert!(baseline::is_initialized());

    baseline::cleanup().unwrap();
    assert!(!baseline::is_initialized());

    // Patterns obtained before the cleanup are still usable.
    let mut ctx = MatcherContext::with_input("-1.5e3");
    assert!(ctx.matches(&*numeric).unwrap().is_some());

    // And the registry comes back on demand.
    let again = baseline::get(BaselineKind::Numeric).unwrap();
    assert!(!Arc::ptr_eq(&numeric, &again));
    assert!(baseline::is_initialized());

    baseline::cleanup().unwrap();
    baseline::cleanup().unwrap();
}
