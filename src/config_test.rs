use super::*;

#[test]
fn test_root_bypass_unlimited_on_default() {
    let mut cfg = Config::new("dc=x");
    cfg.set_hard_limits(Some(100), Some(60));
    cfg.add_root_dn("cn=admin,dc=x");

    assert_eq!(cfg.effective_limits(true, None, None), (None, None));
    assert_eq!(cfg.effective_limits(false, None, None), (Some(100), Some(60)));
}

#[test]
fn test_non_root_request_clamped_to_hard_cap() {
    let mut cfg = Config::new("dc=x");
    cfg.set_hard_limits(Some(100), Some(60));

    assert_eq!(cfg.effective_limits(false, Some(500), Some(600)), (Some(100), Some(60)));
    assert_eq!(cfg.effective_limits(false, Some(10), Some(10)), (Some(10), Some(10)));
}

#[test]
fn test_root_request_below_cap_is_not_expanded() {
    let mut cfg = Config::new("dc=x");
    cfg.set_hard_limits(Some(100), Some(60));

    // Root asking for an explicit (non-default) smaller value still gets
    // exactly what it asked for, not the unlimited bypass.
    assert_eq!(cfg.effective_limits(true, Some(5), Some(5)), (Some(5), Some(5)));
}

#[test]
fn test_is_root_matches_normalized_dn() {
    let mut cfg = Config::new("dc=x");
    cfg.add_root_dn(" CN=Admin , DC=X ");
    assert!(cfg.is_root("cn=Admin,dc=x"));
    assert!(!cfg.is_root("cn=other,dc=x"));
}
