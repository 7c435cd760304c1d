use pretty_assertions::assert_eq;
use xmldot::{compile_path, delete, query, set, Error, Options, Value};

#[test]
fn nested_get() {
    let doc = b"<root><user><name>John</name></user></root>";
    let path = compile_path("root.user.name", None);
    assert_eq!(query(doc, &path, None).as_str(), Some("John"));
}

#[test]
fn array_count() {
    let doc = b"<root><item>a</item><item>b</item><item>c</item></root>";
    let path = compile_path("root.item.#", None);
    assert_eq!(query(doc, &path, None).as_f64(), Some(3.0));
}

#[test]
fn field_extraction() {
    let doc = b"<root><item>a</item><item>b</item><item>c</item></root>";
    let path = compile_path("root.item.#.%", None);
    let result = query(doc, &path, None);
    assert_eq!(result.as_array().map(|a| a.len()), Some(3));
    assert_eq!(result.to_string_form(), r#"["a","b","c"]"#);
}

#[test]
fn filter_first_match_vs_all_matches() {
    let doc = b"<items><item><age>25</age></item><item><age>30</age></item><item><age>40</age></item></items>";

    let first = compile_path("items.item.#(age>=30).age", None);
    assert_eq!(query(doc, &first, None).as_str(), Some("30"));

    let all = compile_path("items.item.#(age>=30)#.age", None);
    let result = query(doc, &all, None);
    let values: Vec<_> = result.as_array().unwrap().iter().map(|r| r.as_str().unwrap()).collect();
    assert_eq!(values, vec!["30", "40"]);
}

#[test]
fn create_missing_chain_then_read_back() {
    let doc = b"<root></root>";
    let path = compile_path("root.user.address.city", None);
    let updated = set(doc, &path, Value::Str("NYC"), None).unwrap();
    assert_eq!(updated, b"<root><user><address><city>NYC</city></address></user></root>");
    assert_eq!(query(&updated, &path, None).as_str(), Some("NYC"));
}

#[test]
fn case_insensitive_get() {
    let doc = b"<ROOT><USER><NAME>John</NAME></USER></ROOT>";
    let path = compile_path("root.user.name", None);

    let mut insensitive = Options::default();
    insensitive.case_sensitive = false;
    assert_eq!(query(doc, &path, Some(&insensitive)).as_str(), Some("John"));

    let sensitive = Options::default();
    assert!(query(doc, &path, Some(&sensitive)).is_null());
}

#[test]
fn append_via_index_minus_one() {
    let doc = b"<root><item>a</item><item>b</item></root>";
    let path = compile_path("root.item.-1", None);
    let updated = set(doc, &path, Value::Str("c"), None).unwrap();
    assert_eq!(updated, b"<root><item>a</item><item>b</item><item>c</item></root>");

    let count_path = compile_path("root.item.#", None);
    assert_eq!(query(&updated, &count_path, None).as_f64(), Some(3.0));
}

#[test]
fn malformed_set_fails_without_modifying_document() {
    let doc: &[u8] = b"<root><user>";
    let path = compile_path("root.user.name", None);
    let err = set(doc, &path, Value::Str("John"), None).unwrap_err();
    assert!(matches!(err, Error::MalformedXml { .. }));
}

#[test]
fn delete_removes_element_and_preserves_siblings() {
    let doc = b"<root><a>1</a><b>2</b></root>";
    let path = compile_path("root.a", None);
    let updated = delete(doc, &path, None).unwrap();
    let remaining = compile_path("root.a", None);
    assert!(query(&updated, &remaining, None).is_null());
    let sibling = compile_path("root.b", None);
    assert_eq!(query(&updated, &sibling, None).as_str(), Some("2"));
}
