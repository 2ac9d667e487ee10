//! Record kind descriptors
//!
//! A `RecordKind` is the static, per-entity-type description the host
//! application supplies: table name, CREATE/INSERT statement templates,
//! the declared overflow fields with their types, the permitted tag
//! vocabulary, and the optional write-timestamp field. Kinds are `'static`
//! and registered with the codec registry before the store opens.

/// Declared type of an overflow field or a native column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Real,
    Bool,
    Text,
    Decimal,
    Timestamp,
    Json,
    /// Lazy reference to another record, stored as its identifier
    Record(&'static str),
    /// List of references to another kind, stored as an identifier array
    Records(&'static str),
    /// Host-defined type resolved through a registered codec
    Custom(&'static str),
}

impl FieldType {
    /// Name used for codec lookup and error messages
    pub fn name(self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Real => "real",
            FieldType::Bool => "boolean",
            FieldType::Text => "text",
            FieldType::Decimal => "decimal",
            FieldType::Timestamp => "timestamp",
            FieldType::Json => "json",
            FieldType::Record(kind) | FieldType::Records(kind) => kind,
            FieldType::Custom(name) => name,
        }
    }
}

/// Static descriptor for one record type
///
/// `create_sql` and `insert_sql` are templates with `{table}` standing in
/// for the table name; the insert template must produce a default row that
/// only reserves an identifier.
#[derive(Debug)]
pub struct RecordKind {
    pub table: &'static str,
    pub create_sql: &'static str,
    pub insert_sql: &'static str,
    /// Field stamped with the current time on every update, if any
    pub touch_field: Option<&'static str>,
    /// Permitted tag vocabulary: `None` means unrestricted, `Some(&[])`
    /// permits no tags at all
    pub allowed_tags: Option<&'static [&'static str]>,
    /// Declared overflow fields stored inside the `parms` column
    pub overflow: &'static [(&'static str, FieldType)],
}

impl RecordKind {
    pub fn create_statement(&self) -> String {
        self.create_sql.replace("{table}", self.table)
    }

    pub fn insert_statement(&self) -> String {
        self.insert_sql.replace("{table}", self.table)
    }

    pub fn delete_statement(&self) -> String {
        format!("DELETE FROM {} WHERE id = ?", self.table)
    }

    /// Declared type of an overflow field, if the kind declares it
    pub fn overflow_type(&self, field: &str) -> Option<FieldType> {
        self.overflow
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, ty)| *ty)
    }

    pub fn is_overflow(&self, field: &str) -> bool {
        self.overflow_type(field).is_some()
    }
}
