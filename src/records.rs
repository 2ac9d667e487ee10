//! Homogeneous record collections
//!
//! A `RecordList` holds records of one kind. It is the value behind a
//! record-list field and is also how multi-row queries come back. Members
//! stay as lazy as they were built: a list made from identifiers loads
//! nothing until a member is read.

use std::collections::BTreeSet;
use std::fmt;

use crate::filter;
use crate::kind::RecordKind;
use crate::record::Record;
use crate::storage::Store;
use crate::value::Value;
use crate::Result;

#[derive(Debug, Clone)]
pub struct RecordList {
    kind: &'static RecordKind,
    items: Vec<Record>,
}

impl RecordList {
    pub fn new(kind: &'static RecordKind) -> Self {
        Self { kind, items: Vec::new() }
    }

    /// Build a list of bare references from identifiers
    pub fn from_ids<I>(kind: &'static RecordKind, ids: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        let items = ids.into_iter().map(|id| Record::reference(kind, id)).collect();
        Self { kind, items }
    }

    pub fn from_records(kind: &'static RecordKind, items: Vec<Record>) -> Self {
        Self { kind, items }
    }

    pub fn kind(&self) -> &'static RecordKind {
        self.kind
    }

    /// Every row of the kind's table, materialized
    pub fn all(store: &Store, kind: &'static RecordKind) -> Result<Self> {
        let rows = store.query(&format!("SELECT * FROM {}", kind.table), &[])?;
        let items = rows
            .iter()
            .map(|row| Record::from_row(store, kind, row))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { kind, items })
    }

    /// All records matching the predicates; the result may be empty
    pub fn find(
        store: &Store,
        kind: &'static RecordKind,
        filters: &[(&str, Value)],
        skip_falsy: bool,
    ) -> Result<Self> {
        let (where_sql, params) =
            filter::where_clause(store.registry(), kind, filters, skip_falsy)?;
        let rows = store.query(&format!("SELECT * FROM {}{}", kind.table, where_sql), &params)?;
        let items = rows
            .iter()
            .map(|row| Record::from_row(store, kind, row))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { kind, items })
    }

    /// Apply one field set to every member
    pub fn update(&mut self, store: &Store, fields: &[(&str, Value)]) -> Result<()> {
        for record in &mut self.items {
            record.update(store, fields)?;
        }
        Ok(())
    }

    pub fn push(&mut self, record: Record) {
        self.items.push(record);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.items.iter()
    }

    /// Member identifiers in list order, duplicates preserved
    pub fn ids(&self) -> Vec<i64> {
        self.items.iter().map(Record::id).collect()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.items.iter().any(|record| *record == id)
    }

    /// Copy without duplicate identifiers, keeping first occurrences
    pub fn deduped(&self) -> Self {
        let mut seen = BTreeSet::new();
        let items = self
            .items
            .iter()
            .filter(|record| seen.insert(record.id()))
            .cloned()
            .collect();
        Self { kind: self.kind, items }
    }

    /// True when every member shares one identifier; vacuously true when empty
    pub fn same_record(&self) -> bool {
        match self.items.first() {
            Some(first) => self.items.iter().all(|record| record == first),
            None => true,
        }
    }
}

impl fmt::Display for RecordList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.items.iter().map(|record| record.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

impl IntoIterator for RecordList {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecordList {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
