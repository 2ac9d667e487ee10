//! Predicate construction
//!
//! Turns a (field name, value) pair into a safely parameterized SQL
//! fragment, dispatching on the field's storage shape - the tag column, an
//! overflow-declared field, or a native column - and on the value's
//! classified shape. `classify` is the single place runtime type
//! inspection happens; everything downstream works on the closed
//! `FilterInput` union.
//!
//! Tag and overflow probes are substring LIKE matches against the stored
//! JSON rendering. They admit false positives on key/value substring
//! collisions; fields filtered at volume belong in native columns.

use crate::codec::Registry;
use crate::kind::{FieldType, RecordKind};
use crate::value::Value;
use crate::{Error, Result};

/// Comparison operator spelled at the front of a string value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Gt,
    Lt,
    Ge,
    Le,
    Ne,
}

impl CmpOp {
    fn as_sql(self) -> &'static str {
        match self {
            CmpOp::Gt => ">",
            CmpOp::Lt => "<",
            CmpOp::Ge => ">=",
            CmpOp::Le => "<=",
            CmpOp::Ne => "<>",
        }
    }
}

/// Classified shape of a caller-supplied predicate value
#[derive(Debug)]
pub(crate) enum FilterInput<'a> {
    Null,
    Sequence(Vec<Value>),
    RecordRef(i64),
    LikePattern(&'a str),
    Comparison(CmpOp, &'a str),
    Scalar(&'a Value),
}

/// Map a value to its predicate shape
pub(crate) fn classify(value: &Value) -> FilterInput<'_> {
    match value {
        Value::Null => FilterInput::Null,
        Value::Record(r) => FilterInput::RecordRef(r.id()),
        Value::Records(l) => {
            FilterInput::Sequence(l.ids().into_iter().map(Value::Integer).collect())
        }
        Value::List(items) => FilterInput::Sequence(items.clone()),
        Value::Text(s) if is_like_pattern(s) => FilterInput::LikePattern(s),
        Value::Text(s) => match parse_comparison(s) {
            Some((op, operand)) => FilterInput::Comparison(op, operand),
            None => FilterInput::Scalar(value),
        },
        _ => FilterInput::Scalar(value),
    }
}

fn is_like_pattern(s: &str) -> bool {
    s.len() >= 3 && s.starts_with('%') && s.ends_with('%')
}

/// An operator prefix counts only when whitespace separates it from a
/// non-empty operand; anything else is an equality literal
fn parse_comparison(s: &str) -> Option<(CmpOp, &str)> {
    let (op, rest) = if let Some(r) = s.strip_prefix(">=") {
        (CmpOp::Ge, r)
    } else if let Some(r) = s.strip_prefix("<=") {
        (CmpOp::Le, r)
    } else if let Some(r) = s.strip_prefix("!=") {
        (CmpOp::Ne, r)
    } else if let Some(r) = s.strip_prefix("<>") {
        (CmpOp::Ne, r)
    } else if let Some(r) = s.strip_prefix('>') {
        (CmpOp::Gt, r)
    } else if let Some(r) = s.strip_prefix('<') {
        (CmpOp::Lt, r)
    } else {
        return None;
    };
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let operand = rest.trim_start();
    if operand.is_empty() {
        return None;
    }
    Some((op, operand))
}

/// One predicate: SQL text plus its bound parameters
#[derive(Debug, Clone)]
pub(crate) struct Fragment {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Field names are interpolated into statements, not bound
pub(crate) fn valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Build the fragment for one (field, value) pair
pub(crate) fn fragment(
    registry: &Registry,
    kind: &RecordKind,
    field: &str,
    value: &Value,
) -> Result<Fragment> {
    if !valid_identifier(field) {
        return Err(Error::UnknownField { table: kind.table, field: field.to_string() });
    }
    if field == "tags" {
        return tag_fragment(value);
    }
    if let Some(declared) = kind.overflow_type(field) {
        return overflow_fragment(registry, declared, field, value);
    }
    native_fragment(field, value)
}

/// Membership probe against the JSON wire form, one LIKE per tag
fn tag_fragment(value: &Value) -> Result<Fragment> {
    let tags: Vec<String> = match value {
        Value::Null => {
            return Ok(Fragment { sql: "tags IS NULL".into(), params: vec![] });
        }
        Value::Text(s) => vec![s.clone()],
        Value::Tags(t) => t.iter().map(String::from).collect(),
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item.as_str() {
                    Some(s) => out.push(s.to_string()),
                    None => {
                        return Err(Error::Codec(format!(
                            "tag predicates take strings, got {item}"
                        )));
                    }
                }
            }
            out
        }
        other => {
            return Err(Error::Codec(format!("tag predicates take strings, got {other}")));
        }
    };
    if tags.is_empty() {
        return Ok(Fragment { sql: "1 = 1".into(), params: vec![] });
    }
    let mut parts = Vec::with_capacity(tags.len());
    let mut params = Vec::with_capacity(tags.len());
    for tag in &tags {
        parts.push("tags LIKE ?".to_string());
        params.push(Value::Text(format!("%{}%", serde_json::to_string(tag)?)));
    }
    let sql =
        if parts.len() == 1 { parts.remove(0) } else { format!("({})", parts.join(" AND ")) };
    Ok(Fragment { sql, params })
}

/// Substring probe embedding the quoted key and the encoded value as they
/// appear in the stored overflow object. An absent value matches a missing
/// parms column, a missing key, or an explicit null - the same rows a
/// native IS NULL would find.
fn overflow_fragment(
    registry: &Registry,
    declared: FieldType,
    field: &str,
    value: &Value,
) -> Result<Fragment> {
    let key = serde_json::to_string(field)?;
    if value.is_null() {
        return Ok(Fragment {
            sql: "(parms IS NULL OR parms NOT LIKE ? OR parms LIKE ?)".into(),
            params: vec![
                Value::Text(format!("%{key}:%")),
                Value::Text(format!("%{key}:null%")),
            ],
        });
    }
    let encoded = registry.encode_overflow(declared, value)?;
    let rendered = serde_json::to_string(&encoded)?;
    Ok(Fragment {
        sql: "parms LIKE ?".into(),
        params: vec![Value::Text(format!("%{key}:{rendered}%"))],
    })
}

fn native_fragment(field: &str, value: &Value) -> Result<Fragment> {
    let fragment = match classify(value) {
        FilterInput::Null => Fragment { sql: format!("{field} IS NULL"), params: vec![] },
        FilterInput::Sequence(items) => {
            if items.is_empty() {
                // IN over nothing matches nothing
                Fragment { sql: "1 = 0".into(), params: vec![] }
            } else {
                let placeholders = vec!["?"; items.len()].join(", ");
                Fragment { sql: format!("{field} IN ({placeholders})"), params: items }
            }
        }
        FilterInput::RecordRef(id) => {
            Fragment { sql: format!("{field} = ?"), params: vec![Value::Integer(id)] }
        }
        FilterInput::LikePattern(pattern) => Fragment {
            sql: format!("{field} LIKE ?"),
            params: vec![Value::Text(pattern.to_string())],
        },
        FilterInput::Comparison(op, operand) => Fragment {
            sql: format!("{field} {} ?", op.as_sql()),
            params: vec![Value::Text(operand.to_string())],
        },
        FilterInput::Scalar(v) => {
            Fragment { sql: format!("{field} = ?"), params: vec![v.clone()] }
        }
    };
    Ok(fragment)
}

/// AND-join fragments for a filter set; empty input yields no WHERE clause
pub(crate) fn where_clause(
    registry: &Registry,
    kind: &RecordKind,
    filters: &[(&str, Value)],
    skip_falsy: bool,
) -> Result<(String, Vec<Value>)> {
    let mut parts = Vec::new();
    let mut params = Vec::new();
    for (field, value) in filters {
        if skip_falsy && value.is_falsy() {
            continue;
        }
        let frag = fragment(registry, kind, field, value)?;
        parts.push(frag.sql);
        params.extend(frag.params);
    }
    if parts.is_empty() {
        Ok((String::new(), params))
    } else {
        Ok((format!(" WHERE {}", parts.join(" AND ")), params))
    }
}

/// Human-readable filter rendering for error messages
pub(crate) fn describe(filters: &[(&str, Value)]) -> String {
    if filters.is_empty() {
        return "(no predicates)".to_string();
    }
    filters
        .iter()
        .map(|(field, value)| format!("{field} = {value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::records::RecordList;

    static THING: RecordKind = RecordKind {
        table: "thing",
        create_sql: "CREATE TABLE {table} (id integer PRIMARY KEY AUTOINCREMENT, name text, father thing, parms json, tags tags)",
        insert_sql: "INSERT INTO {table} DEFAULT VALUES",
        touch_field: None,
        allowed_tags: None,
        overflow: &[
            ("pfield2", FieldType::Integer),
            ("parent", FieldType::Record("thing")),
            ("nickname", FieldType::Text),
        ],
    };

    fn sample_registry() -> Registry {
        let mut registry = Registry::new();
        registry.register_kind(&THING);
        registry
    }

    #[test]
    fn test_classify_shapes() {
        assert!(matches!(classify(&Value::Null), FilterInput::Null));
        assert!(matches!(classify(&Value::Integer(5)), FilterInput::Scalar(_)));

        let rec = Value::from(Record::reference(&THING, 9));
        assert!(matches!(classify(&rec), FilterInput::RecordRef(9)));

        let list = Value::from(RecordList::from_ids(&THING, [1, 2]));
        match classify(&list) {
            FilterInput::Sequence(items) => assert_eq!(items.len(), 2),
            other => panic!("unexpected shape: {other:?}"),
        }

        assert!(matches!(classify(&Value::from("%bri%")), FilterInput::LikePattern("%bri%")));
        // "%" and "%%" carry no pattern body: equality literals
        assert!(matches!(classify(&Value::from("%")), FilterInput::Scalar(_)));
        assert!(matches!(classify(&Value::from("%%")), FilterInput::Scalar(_)));
        assert!(matches!(
            classify(&Value::from("> 5")),
            FilterInput::Comparison(CmpOp::Gt, "5")
        ));
        // no whitespace after the operator: an equality literal
        assert!(matches!(classify(&Value::from(">=10")), FilterInput::Scalar(_)));
        assert!(matches!(classify(&Value::from("plain")), FilterInput::Scalar(_)));
    }

    #[test]
    fn test_comparison_operators() {
        for (text, op, operand) in [
            ("> 5", CmpOp::Gt, "5"),
            ("< 5", CmpOp::Lt, "5"),
            (">= 5", CmpOp::Ge, "5"),
            ("<= 5", CmpOp::Le, "5"),
            ("!= abc", CmpOp::Ne, "abc"),
            ("<> abc", CmpOp::Ne, "abc"),
        ] {
            assert_eq!(parse_comparison(text), Some((op, operand)), "for {text:?}");
        }
        assert_eq!(parse_comparison("5 > 3"), None);
        assert_eq!(parse_comparison("> "), None);
    }

    #[test]
    fn test_native_fragments() {
        let registry = sample_registry();

        let frag = fragment(&registry, &THING, "name", &Value::Null).unwrap();
        assert_eq!(frag.sql, "name IS NULL");
        assert!(frag.params.is_empty());

        let frag = fragment(&registry, &THING, "name", &Value::from("Brian")).unwrap();
        assert_eq!(frag.sql, "name = ?");
        assert_eq!(frag.params, vec![Value::from("Brian")]);

        let frag = fragment(&registry, &THING, "name", &Value::from("%ri%")).unwrap();
        assert_eq!(frag.sql, "name LIKE ?");

        let frag = fragment(&registry, &THING, "points", &Value::from("> 2")).unwrap();
        assert_eq!(frag.sql, "points > ?");
        assert_eq!(frag.params, vec![Value::from("2")]);

        let frag =
            fragment(&registry, &THING, "father", &Value::from(Record::reference(&THING, 4)))
                .unwrap();
        assert_eq!(frag.sql, "father = ?");
        assert_eq!(frag.params, vec![Value::Integer(4)]);
    }

    #[test]
    fn test_sequence_fragments() {
        let registry = sample_registry();

        let list = Value::from(RecordList::from_ids(&THING, [3, 5]));
        let frag = fragment(&registry, &THING, "father", &list).unwrap();
        assert_eq!(frag.sql, "father IN (?, ?)");
        assert_eq!(frag.params, vec![Value::Integer(3), Value::Integer(5)]);

        let empty = Value::List(vec![]);
        let frag = fragment(&registry, &THING, "father", &empty).unwrap();
        assert_eq!(frag.sql, "1 = 0");
        assert!(frag.params.is_empty());
    }

    #[test]
    fn test_tag_fragment_uses_wire_quoting() {
        let registry = sample_registry();

        let frag = fragment(&registry, &THING, "tags", &Value::from("FOO")).unwrap();
        assert_eq!(frag.sql, "tags LIKE ?");
        assert_eq!(frag.params, vec![Value::from("%\"FOO\"%")]);

        let both = Value::List(vec![Value::from("FOO"), Value::from("BAR")]);
        let frag = fragment(&registry, &THING, "tags", &both).unwrap();
        assert_eq!(frag.sql, "(tags LIKE ? AND tags LIKE ?)");
    }

    #[test]
    fn test_overflow_fragments_match_stored_rendering() {
        let registry = sample_registry();

        let frag = fragment(&registry, &THING, "pfield2", &Value::Integer(123)).unwrap();
        assert_eq!(frag.sql, "parms LIKE ?");
        assert_eq!(frag.params, vec![Value::from("%\"pfield2\":123%")]);

        let frag = fragment(&registry, &THING, "nickname", &Value::from("ab")).unwrap();
        assert_eq!(frag.params, vec![Value::from("%\"nickname\":\"ab\"%")]);

        let parent = Value::from(Record::reference(&THING, 7));
        let frag = fragment(&registry, &THING, "parent", &parent).unwrap();
        assert_eq!(frag.params, vec![Value::from("%\"parent\":7%")]);
    }

    #[test]
    fn test_overflow_null_matches_absent_or_null() {
        let registry = sample_registry();

        let frag = fragment(&registry, &THING, "pfield2", &Value::Null).unwrap();
        assert_eq!(frag.sql, "(parms IS NULL OR parms NOT LIKE ? OR parms LIKE ?)");
        assert_eq!(
            frag.params,
            vec![Value::from("%\"pfield2\":%"), Value::from("%\"pfield2\":null%")]
        );
    }

    #[test]
    fn test_where_clause_joins_with_and() {
        let registry = sample_registry();
        let filters =
            vec![("name", Value::from("Brian")), ("pfield2", Value::Integer(1))];

        let (sql, params) = where_clause(&registry, &THING, &filters, false).unwrap();
        assert_eq!(sql, " WHERE name = ? AND parms LIKE ?");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_where_clause_skip_falsy() {
        let registry = sample_registry();
        let filters = vec![("name", Value::from("")), ("points", Value::Integer(3))];

        let (sql, params) = where_clause(&registry, &THING, &filters, true).unwrap();
        assert_eq!(sql, " WHERE points = ?");
        assert_eq!(params.len(), 1);

        let (sql, params) = where_clause(&registry, &THING, &[], false).unwrap();
        assert!(sql.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_field_names_must_be_identifiers() {
        let registry = sample_registry();
        let err = fragment(&registry, &THING, "name; DROP TABLE thing", &Value::Null).unwrap_err();
        assert!(matches!(err, Error::UnknownField { .. }));
        assert!(valid_identifier("lastmod"));
        assert!(!valid_identifier("2bad"));
        assert!(!valid_identifier(""));
    }
}
