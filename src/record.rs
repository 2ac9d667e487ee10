//! Records - lazy row identity, load, update, find
//!
//! A `Record` is a reference to one row of one kind. Constructed from a
//! bare identifier it holds nothing else; the first field access loads the
//! row, decodes native columns by declared type, parses the overflow
//! column through the codec registry, and normalizes the tag column (NULL
//! becomes the empty set). Two records are equal when their identifiers
//! are equal - field contents never participate, so a stale copy still
//! compares equal to a fresh one.
//!
//! Updates deliberately write through the in-memory state: the incoming
//! fields are applied to the record exactly as a loaded row would be, then
//! the native write set and the re-encoded overflow column are persisted
//! in one UPDATE.

use std::collections::BTreeMap;
use std::fmt;

use rusqlite::types::Value as SqlValue;

use crate::codec::Registry;
use crate::filter;
use crate::kind::RecordKind;
use crate::storage::{Row, Store};
use crate::tags::TagSet;
use crate::value::Value;
use crate::{Error, Result};

/// How `find` resolves zero or many matching rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FindPolicy {
    /// Zero rows yield `None`; more than one is an error
    #[default]
    AtMostOne,
    /// Zero rows and more than one are both errors
    ExactlyOne,
    /// Zero rows yield `None`; more than one yields the first
    FirstIfAny,
    /// Zero rows are an error; more than one yields the first
    AtLeastOne,
}

/// Options for `update_with`
#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
    /// Drop falsy values from the field set before writing
    pub skip_falsy: bool,
    /// Stamp the kind's touch field with the current time
    pub touch: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self { skip_falsy: false, touch: true }
    }
}

/// One row of one kind, loaded lazily
#[derive(Debug, Clone)]
pub struct Record {
    kind: &'static RecordKind,
    id: i64,
    loaded: bool,
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// A bare reference: only the identifier, no store access
    pub fn reference(kind: &'static RecordKind, id: i64) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("id".to_string(), Value::Integer(id));
        Self { kind, id, loaded: false, fields }
    }

    /// Materialize a record from a captured row
    pub fn from_row(store: &Store, kind: &'static RecordKind, row: &Row) -> Result<Self> {
        let mut record = Self::reference(kind, row.id()?);
        record.apply_row(store.registry(), row)?;
        record.loaded = true;
        Ok(record)
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn kind(&self) -> &'static RecordKind {
        self.kind
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Local peek at a field; never touches the store
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Load the row behind this record; a no-op when already loaded
    pub fn load(&mut self, store: &Store) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        let sql = format!("SELECT * FROM {} WHERE id = ?", self.kind.table);
        let row = store
            .query_one(&sql, &[Value::Integer(self.id)])?
            .ok_or(Error::RecordNotFound { table: self.kind.table, id: self.id })?;
        self.apply_row(store.registry(), &row)?;
        self.loaded = true;
        Ok(())
    }

    /// Read a field, loading the row first if it is not satisfied locally.
    /// A declared overflow field the row never stored reads as null; a name
    /// that is neither present nor declared is an error.
    pub fn get(&mut self, store: &Store, name: &str) -> Result<&Value> {
        if !self.loaded && !self.fields.contains_key(name) {
            self.load(store)?;
        }
        if !self.fields.contains_key(name) {
            if self.kind.is_overflow(name) {
                self.fields.insert(name.to_string(), Value::Null);
            } else {
                return Err(Error::UnknownField {
                    table: self.kind.table,
                    field: name.to_string(),
                });
            }
        }
        Ok(&self.fields[name])
    }

    fn apply_row(&mut self, registry: &Registry, row: &Row) -> Result<()> {
        for column in row.columns() {
            match column.name.as_str() {
                // identity is fixed at construction
                "id" => {}
                "tags" => {
                    let tags = match &column.value {
                        SqlValue::Null => TagSet::new(),
                        SqlValue::Text(raw) => TagSet::from_json(raw)?,
                        other => {
                            return Err(Error::Codec(format!("tags column holds {other:?}")));
                        }
                    };
                    self.fields.insert("tags".to_string(), Value::Tags(tags));
                }
                "parms" => match &column.value {
                    SqlValue::Null => {}
                    SqlValue::Text(raw) => self.apply_overflow(registry, raw)?,
                    other => {
                        return Err(Error::Codec(format!("overflow column holds {other:?}")));
                    }
                },
                name => {
                    let value = registry.decode_column(column.decl.as_deref(), &column.value)?;
                    self.fields.insert(name.to_string(), value);
                }
            }
        }
        Ok(())
    }

    /// Decode a stored overflow object; every key must be declared
    fn apply_overflow(&mut self, registry: &Registry, raw: &str) -> Result<()> {
        let parsed: serde_json::Value = serde_json::from_str(raw)?;
        let Some(object) = parsed.as_object() else {
            return Err(Error::Codec(format!("overflow column is not an object: {raw}")));
        };
        for (key, primitive) in object {
            let Some(declared) = self.kind.overflow_type(key) else {
                return Err(Error::UnknownField { table: self.kind.table, field: key.clone() });
            };
            let value = registry.decode_overflow(declared, primitive)?;
            self.fields.insert(key.clone(), value);
        }
        Ok(())
    }

    /// Apply caller fields the way a loaded row is applied
    fn apply_pairs(&mut self, registry: &Registry, pairs: &[(&str, Value)]) -> Result<()> {
        for (name, value) in pairs {
            match *name {
                "id" => {
                    return Err(Error::Codec("record identity is immutable".into()));
                }
                "tags" => {
                    let tags = match value {
                        Value::Null => TagSet::new(),
                        Value::Tags(t) => t.clone(),
                        other => {
                            return Err(Error::Codec(format!(
                                "tags field expects a tag set, got {other}"
                            )));
                        }
                    };
                    self.fields.insert("tags".to_string(), Value::Tags(tags));
                }
                "parms" => match value {
                    Value::Null => {}
                    Value::Text(raw) => self.apply_overflow(registry, raw)?,
                    other => {
                        return Err(Error::Codec(format!(
                            "overflow field expects JSON text, got {other}"
                        )));
                    }
                },
                _ => {
                    self.fields.insert((*name).to_string(), value.clone());
                }
            }
        }
        Ok(())
    }

    /// Reserve an identifier with the kind's default-row INSERT, then write
    /// the caller's fields (and the touch timestamp) in one update
    pub fn insert(store: &Store, kind: &'static RecordKind, fields: &[(&str, Value)]) -> Result<Self> {
        let outcome = store.execute_write(&kind.insert_statement(), &[])?;
        let mut record = Self::reference(kind, outcome.last_insert_id);
        record.update_with(store, fields, UpdateOptions { skip_falsy: false, touch: true })?;
        Ok(record)
    }

    /// Update with default options; returns the caller-facing field set
    /// actually written (the injected timestamp is not reported)
    pub fn update(&mut self, store: &Store, fields: &[(&str, Value)]) -> Result<Vec<(String, Value)>> {
        self.update_with(store, fields, UpdateOptions::default())
    }

    pub fn update_with(
        &mut self,
        store: &Store,
        fields: &[(&str, Value)],
        opts: UpdateOptions,
    ) -> Result<Vec<(String, Value)>> {
        let mut pairs: Vec<(&str, Value)> = fields
            .iter()
            .filter(|(_, value)| !(opts.skip_falsy && value.is_falsy()))
            .map(|(name, value)| (*name, value.clone()))
            .collect();

        // report the caller's fields, not the injected timestamp
        let snapshot: Vec<(String, Value)> =
            pairs.iter().map(|(name, value)| (name.to_string(), value.clone())).collect();

        if opts.touch {
            if let Some(touch_field) = self.kind.touch_field {
                pairs.retain(|(name, _)| *name != touch_field);
                pairs.push((touch_field, Value::now()));
            }
        }

        // in-memory state first, so the record matches what gets persisted
        self.load(store)?;
        self.apply_pairs(store.registry(), &pairs)?;

        let mut set_names: Vec<&str> = Vec::new();
        let mut set_values: Vec<Value> = Vec::new();
        let mut overflow_touched = false;
        for (name, value) in &pairs {
            if self.kind.is_overflow(name) {
                overflow_touched = true;
                continue;
            }
            if !filter::valid_identifier(name) {
                return Err(Error::UnknownField {
                    table: self.kind.table,
                    field: name.to_string(),
                });
            }
            set_names.push(name);
            set_values.push(value.clone());
        }

        if overflow_touched {
            // the overflow column is one value: re-encode every declared
            // field of the record, set or not
            if let Some(pos) = set_names.iter().position(|name| *name == "parms") {
                set_names.remove(pos);
                set_values.remove(pos);
            }
            let unset = Value::Null;
            let mut object = serde_json::Map::new();
            for (name, declared) in self.kind.overflow {
                let value = self.fields.get(*name).unwrap_or(&unset);
                let encoded = store.registry().encode_overflow(*declared, value)?;
                object.insert((*name).to_string(), encoded);
            }
            set_names.push("parms");
            set_values.push(Value::Text(serde_json::to_string(&serde_json::Value::Object(object))?));
        }

        if set_names.is_empty() {
            return Ok(snapshot);
        }

        let assignments: Vec<String> =
            set_names.iter().map(|name| format!("{name} = ?")).collect();
        let sql =
            format!("UPDATE {} SET {} WHERE id = ?", self.kind.table, assignments.join(", "));
        set_values.push(Value::Integer(self.id));

        let outcome = store.execute_write(&sql, &set_values)?;
        if outcome.rows_affected == 0 {
            // the row vanished between load and write
            return Err(Error::UpdateFailed { table: self.kind.table, id: self.id });
        }
        Ok(snapshot)
    }

    pub fn delete(&self, store: &Store) -> Result<()> {
        store.execute_write(&self.kind.delete_statement(), &[Value::Integer(self.id)])?;
        Ok(())
    }

    /// Find one record by a conjunction of (field, value) predicates
    pub fn find(
        store: &Store,
        kind: &'static RecordKind,
        filters: &[(&str, Value)],
        skip_falsy: bool,
        policy: FindPolicy,
    ) -> Result<Option<Self>> {
        let (where_sql, params) =
            filter::where_clause(store.registry(), kind, filters, skip_falsy)?;
        let sql = format!("SELECT * FROM {}{}", kind.table, where_sql);
        let rows = store.query(&sql, &params)?;
        match rows.len() {
            0 => match policy {
                FindPolicy::AtMostOne | FindPolicy::FirstIfAny => Ok(None),
                FindPolicy::ExactlyOne | FindPolicy::AtLeastOne => Err(Error::NoMatch {
                    table: kind.table,
                    filter: filter::describe(filters),
                }),
            },
            1 => Ok(Some(Self::from_row(store, kind, &rows[0])?)),
            _ => match policy {
                FindPolicy::FirstIfAny | FindPolicy::AtLeastOne => {
                    Ok(Some(Self::from_row(store, kind, &rows[0])?))
                }
                FindPolicy::AtMostOne | FindPolicy::ExactlyOne => Err(Error::TooManyRecords {
                    table: kind.table,
                    filter: filter::describe(filters),
                }),
            },
        }
    }

    // ========== Tag Operations ==========

    /// The record's tag set, loading if needed
    pub fn tags(&mut self, store: &Store) -> Result<&TagSet> {
        match self.get(store, "tags")? {
            Value::Tags(tags) => Ok(tags),
            other => Err(Error::Codec(format!("tags field holds {other}"))),
        }
    }

    pub fn has_tag(&mut self, store: &Store, tag: &str) -> Result<bool> {
        Ok(self.tags(store)?.contains(tag))
    }

    pub fn has_any_tag(&mut self, store: &Store, tags: &[&str]) -> Result<bool> {
        Ok(self.tags(store)?.has_any(tags.iter().copied()))
    }

    /// Add tags to the current set; persists only when the set changes
    pub fn add_tags(&mut self, store: &Store, tags: &[&str]) -> Result<()> {
        let current = self.tags(store)?.clone();
        let mut updated = current.clone();
        updated.insert_checked(tags.iter().copied(), self.kind.allowed_tags)?;
        if updated == current {
            return Ok(());
        }
        self.update(store, &[("tags", Value::Tags(updated))])?;
        Ok(())
    }

    /// Replace the whole tag set
    pub fn set_tags(&mut self, store: &Store, tags: &[&str]) -> Result<()> {
        let mut updated = TagSet::new();
        updated.insert_checked(tags.iter().copied(), self.kind.allowed_tags)?;
        if updated == *self.tags(store)? {
            return Ok(());
        }
        self.update(store, &[("tags", Value::Tags(updated))])?;
        Ok(())
    }

    /// Remove tags; absent ones are ignored
    pub fn clear_tags(&mut self, store: &Store, tags: &[&str]) -> Result<()> {
        let current = self.tags(store)?.clone();
        let mut updated = current.clone();
        updated.remove(tags.iter().copied());
        if updated == current {
            return Ok(());
        }
        self.update(store, &[("tags", Value::Tags(updated))])?;
        Ok(())
    }
}

/// Identity comparison only; field contents never participate
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Record {}

impl PartialEq<i64> for Record {
    fn eq(&self, other: &i64) -> bool {
        self.id == *other
    }
}

impl PartialEq<Record> for i64 {
    fn eq(&self, other: &Record) -> bool {
        *self == other.id
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {}>", self.kind.table, self.id)
    }
}
