use super::*;

#[test]
fn test_sup_chain_walks_to_root() {
    let mut schema = Schema::new();
    let top = schema.register("name", None, Rule::CaseIgnore, Rule::Soundex, Rule::Ngram);
    let cn = schema.register("cn", Some("name"), Rule::CaseIgnore, Rule::Soundex, Rule::Ngram);
    let chain = schema.sup_chain(cn);
    assert_eq!(chain, vec![cn, top]);
}

#[test]
fn test_type_id_case_insensitive() {
    let mut schema = Schema::new();
    schema.register("Cn", None, Rule::CaseIgnore, Rule::Soundex, Rule::Ngram);
    assert!(schema.type_id("CN").is_some());
    assert_eq!(schema.type_id("cn"), schema.type_id("Cn"));
}

#[test]
fn test_mask_lookup_by_canonical_name() {
    let mut schema = Schema::new();
    schema.set_mask("mail", IndexMask::EQUALITY | IndexMask::PRESENT);
    schema.set_mask("mail;lang-fr", IndexMask::EQUALITY);

    assert!(schema.mask_of("Mail").unwrap().has(IndexMask::PRESENT));
    assert!(schema.mask_of("mail;lang-fr").unwrap().has(IndexMask::EQUALITY));
    assert!(!schema.mask_of("mail;lang-fr").unwrap().has(IndexMask::PRESENT));
    assert!(schema.mask_of("telephoneNumber").is_none());
}

#[test]
fn test_equality_keys_case_ignore_normalizes() {
    let keys = equality_keys(Rule::CaseIgnore, &[Value::Utf8("Bob Smith".to_string())]);
    assert_eq!(keys, vec![b"bob smith".to_vec()]);
}

#[test]
fn test_equality_keys_case_exact_preserves() {
    let keys = equality_keys(Rule::CaseExact, &[Value::Utf8("Bob".to_string())]);
    assert_eq!(keys, vec![b"Bob".to_vec()]);
}

#[test]
fn test_soundex_classic_examples() {
    assert_eq!(soundex(b"Robert"), b"R163");
    assert_eq!(soundex(b"Rupert"), b"R163");
    assert_eq!(soundex(b"Ashcraft"), b"A261");
}

#[test]
fn test_soundex_empty_input() {
    assert_eq!(soundex(b""), Vec::<u8>::new());
}

#[test]
fn test_ngram_keys_short_value_has_no_keys() {
    assert!(ngram_keys(b"ab").is_empty());
}

#[test]
fn test_ngram_keys_includes_boundary_markers() {
    let keys = ngram_keys(b"abcd");
    assert!(keys.contains(&b"^abc".to_vec()));
    assert!(keys.contains(&b"$bcd".to_vec()));
    assert!(keys.contains(&b"abc".to_vec()));
    assert!(keys.contains(&b"bcd".to_vec()));
}

#[test]
fn test_substr_filter_keys_init_any_final() {
    let keys = substr_filter_keys(Some("ab"), &["cde".to_string()], Some("fg"));
    // init "ab" is shorter than NGRAM_LEN so contributes no boundary key.
    assert!(!keys.iter().any(|k| k[0] == b'^'));
    assert!(keys.contains(&b"cde".to_vec()));
}

#[test]
fn test_substr_index_and_filter_keys_agree_on_overlap() {
    let values = vec![Value::Utf8("alphabet".to_string())];
    let index_keys = substr_index_keys(&values);
    let filter_keys = substr_filter_keys(None, &["alp".to_string()], None);
    for k in &filter_keys {
        assert!(index_keys.contains(k));
    }
}

#[test]
fn test_with_standard_types_registers_core_chain() {
    let schema = Schema::with_standard_types();
    let cn = schema.type_id("cn").expect("cn registered");
    let chain: Vec<&str> = schema
        .sup_chain(cn)
        .into_iter()
        .map(|id| schema.get(id).name.as_str())
        .collect();
    assert_eq!(chain, vec!["cn", "name", "top"]);
    assert_eq!(schema.get(cn).equality, Rule::CaseIgnore);
    assert_eq!(schema.get(cn).approx, Rule::Soundex);

    let mail = schema.type_id("mail").expect("mail registered");
    assert_eq!(schema.get(mail).sup, None);
}
