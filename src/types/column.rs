use super::{FieldKind, FieldType};

/// Describes a column of a result set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Database of the table the column belongs to. May be empty.
    pub schema: String,
    /// Table alias as used in the query. Empty for computed columns.
    pub table: String,
    /// Name of the physical table. Empty for computed columns.
    pub org_table: String,
    /// Column alias as used in the query.
    pub name: String,
    /// Physical column name.
    pub org_name: String,
    pub field_type: FieldType,
}

impl ColumnInfo {
    /// Column without table information, e.g. the result of an expression.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            schema: String::new(),
            table: String::new(),
            org_table: String::new(),
            org_name: name.clone(),
            name,
            field_type,
        }
    }

    pub fn kind(&self) -> FieldKind {
        self.field_type.kind
    }
}
