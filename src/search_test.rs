use std::{
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
};

use super::*;
use crate::attr_index::{index_entry, IndexOp};
use crate::dn::dn2id_add;
use crate::entry::AttributeDescription;
use crate::entry::Value;
use crate::schema::{IndexMask, Rule, Schema};
use crate::testutil::MemStore;

fn schema_with_cn() -> Schema {
    let mut schema = Schema::new();
    schema.register("cn", None, Rule::CaseIgnore, Rule::Soundex, Rule::Ngram);
    schema.set_mask("cn", IndexMask::PRESENT | IndexMask::EQUALITY);
    schema
}

fn add_entry(txn: &mut dyn KvTxn, schema: &Schema, suffix: &str, parent: Option<&str>, ndn: &str, id: Id, cn: &str) {
    dn2id_add(txn, suffix, parent, ndn, id).unwrap();
    let mut entry = Entry::new(id, ndn.to_string(), ndn.to_string());
    entry.set(AttributeDescription::new("cn"), vec![Value::Utf8(cn.to_string())]);
    entry::id2entry_put(txn, &entry, true).unwrap();
    index_entry(txn, schema, &entry, IndexOp::Insert).unwrap();
}

fn ctx() -> OpContext {
    OpContext::new(Arc::new(AtomicBool::new(false)), None, None)
}

fn present_filter() -> Filter {
    Filter::Present(AttributeDescription::new("cn"))
}

#[test]
fn test_base_scope_returns_single_entry() {
    let schema = schema_with_cn();
    let store = MemStore::new();
    let mut txn = store.begin_rw().unwrap();
    add_entry(txn.as_mut(), &schema, "dc=x", None, "dc=x", 1, "root");

    let req = SearchRequest {
        suffix: "dc=x".to_string(),
        base: "dc=x".to_string(),
        scope: Scope::Base,
        deref: DerefMode::NEVER,
        size_limit: None,
        time_limit: None,
        filter: present_filter(),
    };
    let mut seen = Vec::new();
    let completion = search(txn.as_ref(), &schema, None, &req, &mut ctx(), |e| {
        seen.push(e.id);
        true
    })
    .unwrap();
    assert!(matches!(completion, Completion::Done(o) if o.code == ResultCode::SUCCESS));
    assert_eq!(seen, vec![1]);
}

#[test]
fn test_base_scope_missing_object() {
    let schema = schema_with_cn();
    let store = MemStore::new();
    let txn = store.begin_ro().unwrap();
    let req = SearchRequest {
        suffix: "dc=x".to_string(),
        base: "dc=missing".to_string(),
        scope: Scope::Base,
        deref: DerefMode::NEVER,
        size_limit: None,
        time_limit: None,
        filter: present_filter(),
    };
    let completion = search(txn.as_ref(), &schema, None, &req, &mut ctx(), |_| true).unwrap();
    assert!(matches!(completion, Completion::Done(o) if o.code == ResultCode::NO_SUCH_OBJECT));
}

#[test]
fn test_subtree_scope_gathers_descendants() {
    let schema = schema_with_cn();
    let store = MemStore::new();
    let mut txn = store.begin_rw().unwrap();
    add_entry(txn.as_mut(), &schema, "dc=x", None, "dc=x", 1, "root");
    add_entry(txn.as_mut(), &schema, "dc=x", Some("dc=x"), "cn=a,dc=x", 2, "a");
    add_entry(txn.as_mut(), &schema, "dc=x", Some("cn=a,dc=x"), "cn=b,cn=a,dc=x", 3, "b");

    let req = SearchRequest {
        suffix: "dc=x".to_string(),
        base: "dc=x".to_string(),
        scope: Scope::Subtree,
        deref: DerefMode::NEVER,
        size_limit: None,
        time_limit: None,
        filter: present_filter(),
    };
    let mut seen = Vec::new();
    search(txn.as_ref(), &schema, None, &req, &mut ctx(), |e| {
        seen.push(e.id);
        true
    })
    .unwrap();
    seen.sort_unstable();
    assert_eq!(seen, vec![1, 2, 3]);
}

#[test]
fn test_one_level_scope_excludes_grandchildren() {
    let schema = schema_with_cn();
    let store = MemStore::new();
    let mut txn = store.begin_rw().unwrap();
    add_entry(txn.as_mut(), &schema, "dc=x", None, "dc=x", 1, "root");
    add_entry(txn.as_mut(), &schema, "dc=x", Some("dc=x"), "cn=a,dc=x", 2, "a");
    add_entry(txn.as_mut(), &schema, "dc=x", Some("cn=a,dc=x"), "cn=b,cn=a,dc=x", 3, "b");

    let req = SearchRequest {
        suffix: "dc=x".to_string(),
        base: "dc=x".to_string(),
        scope: Scope::One,
        deref: DerefMode::NEVER,
        size_limit: None,
        time_limit: None,
        filter: present_filter(),
    };
    let mut seen = Vec::new();
    search(txn.as_ref(), &schema, None, &req, &mut ctx(), |e| {
        seen.push(e.id);
        true
    })
    .unwrap();
    assert_eq!(seen, vec![2]);
}

#[test]
fn test_size_limit_exceeded_stops_early() {
    let schema = schema_with_cn();
    let store = MemStore::new();
    let mut txn = store.begin_rw().unwrap();
    add_entry(txn.as_mut(), &schema, "dc=x", None, "dc=x", 1, "root");
    add_entry(txn.as_mut(), &schema, "dc=x", Some("dc=x"), "cn=a,dc=x", 2, "a");
    add_entry(txn.as_mut(), &schema, "dc=x", Some("dc=x"), "cn=b,dc=x", 3, "b");

    let req = SearchRequest {
        suffix: "dc=x".to_string(),
        base: "dc=x".to_string(),
        scope: Scope::Subtree,
        deref: DerefMode::NEVER,
        size_limit: Some(1),
        time_limit: None,
        filter: present_filter(),
    };
    let mut ctx = OpContext::new(Arc::new(AtomicBool::new(false)), None, Some(1));
    let mut seen = 0;
    let completion = search(txn.as_ref(), &schema, None, &req, &mut ctx, |_| {
        seen += 1;
        true
    })
    .unwrap();
    assert_eq!(seen, 1);
    assert!(matches!(completion, Completion::Done(o) if o.code == ResultCode::SIZELIMIT_EXCEEDED));
}

#[test]
fn test_abandon_stops_without_result() {
    let schema = schema_with_cn();
    let store = MemStore::new();
    let mut txn = store.begin_rw().unwrap();
    add_entry(txn.as_mut(), &schema, "dc=x", None, "dc=x", 1, "root");

    let req = SearchRequest {
        suffix: "dc=x".to_string(),
        base: "dc=x".to_string(),
        scope: Scope::Base,
        deref: DerefMode::NEVER,
        size_limit: None,
        time_limit: None,
        filter: present_filter(),
    };
    let abandon = Arc::new(AtomicBool::new(true));
    let mut ctx = OpContext::new(abandon, None, None);
    let completion = search(txn.as_ref(), &schema, None, &req, &mut ctx, |_| true).unwrap();
    assert!(matches!(completion, Completion::Abandoned));
}

#[test]
fn test_time_limit_exceeded() {
    let schema = schema_with_cn();
    let store = MemStore::new();
    let mut txn = store.begin_rw().unwrap();
    add_entry(txn.as_mut(), &schema, "dc=x", None, "dc=x", 1, "root");

    let req = SearchRequest {
        suffix: "dc=x".to_string(),
        base: "dc=x".to_string(),
        scope: Scope::Base,
        deref: DerefMode::NEVER,
        size_limit: None,
        time_limit: Some(Duration::from_millis(0)),
        filter: present_filter(),
    };
    let mut ctx = OpContext::new(Arc::new(AtomicBool::new(false)), Some(Duration::from_millis(0)), None);
    std::thread::sleep(Duration::from_millis(5));
    let completion = search(txn.as_ref(), &schema, None, &req, &mut ctx, |_| true).unwrap();
    assert!(matches!(completion, Completion::Done(o) if o.code == ResultCode::TIMELIMIT_EXCEEDED));
}

#[test]
fn test_referral_entry_collected_in_subtree_scope() {
    let schema = schema_with_cn();
    let store = MemStore::new();
    let mut txn = store.begin_rw().unwrap();
    add_entry(txn.as_mut(), &schema, "dc=x", None, "dc=x", 1, "root");

    dn2id_add(txn.as_mut(), "dc=x", Some("dc=x"), "ref=other,dc=x", 2).unwrap();
    let mut referral = Entry::new(2, "ref=other,dc=x".to_string(), "ref=other,dc=x".to_string());
    referral.set(AttributeDescription::new("ref"), vec![Value::Utf8("ldap://elsewhere/".to_string())]);
    entry::id2entry_put(txn.as_mut(), &referral, true).unwrap();

    let req = SearchRequest {
        suffix: "dc=x".to_string(),
        base: "dc=x".to_string(),
        scope: Scope::Subtree,
        deref: DerefMode::NEVER,
        size_limit: None,
        time_limit: None,
        filter: present_filter(),
    };
    let mut seen = Vec::new();
    let completion = search(txn.as_ref(), &schema, None, &req, &mut ctx(), |e| {
        seen.push(e.id);
        true
    })
    .unwrap();
    // The referral entry has no `cn`, so it never reaches the filter test on
    // its own merits; the referral-candidate OR-widening is what pulls it
    // into the scan regardless, and `step` collects it as a reference.
    assert_eq!(seen, vec![1]);
    match completion {
        Completion::Done(o) => assert_eq!(o.referrals, vec!["ldap://elsewhere/".to_string()]),
        _ => panic!("expected Done"),
    }
}

#[test]
fn test_deref_finding_resolves_aliased_base() {
    let schema = schema_with_cn();
    let store = MemStore::new();
    let mut txn = store.begin_rw().unwrap();
    add_entry(txn.as_mut(), &schema, "dc=x", None, "dc=x", 1, "root");
    add_entry(txn.as_mut(), &schema, "dc=x", Some("dc=x"), "cn=real,dc=x", 2, "real");

    dn2id_add(txn.as_mut(), "dc=x", Some("dc=x"), "cn=alias,dc=x", 3).unwrap();
    let mut alias = Entry::new(3, "cn=alias,dc=x".to_string(), "cn=alias,dc=x".to_string());
    alias.set(AttributeDescription::new("aliasedobjectname"), vec![Value::Utf8("cn=real,dc=x".to_string())]);
    entry::id2entry_put(txn.as_mut(), &alias, true).unwrap();

    let req = SearchRequest {
        suffix: "dc=x".to_string(),
        base: "cn=alias,dc=x".to_string(),
        scope: Scope::Base,
        deref: DerefMode::FINDING,
        size_limit: None,
        time_limit: None,
        filter: present_filter(),
    };
    let mut seen = Vec::new();
    search(txn.as_ref(), &schema, None, &req, &mut ctx(), |e| {
        seen.push(e.id);
        true
    })
    .unwrap();
    assert_eq!(seen, vec![2]);
}
