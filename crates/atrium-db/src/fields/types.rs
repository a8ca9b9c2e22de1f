//! Field type definitions.
//!
//! Each [`FieldType`] variant determines the SQL column type of a field, and
//! [`FieldDef`] captures the metadata the query engine needs about a single
//! column: its name, database column, nullability and whether it is a
//! primary key or a foreign key.

use crate::query::compiler::DatabaseBackendType;
use crate::relations::ForeignKeyTarget;
use crate::value::Value;

/// The type of a model field, determining its SQL column type.
///
/// Relational fields (`ForeignKey`, `OneToOneField`) carry the target they
/// point at. The target is resolved lazily through the model registry.
#[derive(Debug, Clone)]
pub enum FieldType {
    /// Auto-incrementing 32-bit integer primary key.
    AutoField,
    /// Auto-incrementing 64-bit integer primary key.
    BigAutoField,
    /// Variable-length string with a max length.
    CharField,
    /// Unlimited-length text.
    TextField,
    /// 32-bit signed integer.
    IntegerField,
    /// 64-bit signed integer.
    BigIntegerField,
    /// 64-bit floating-point number.
    FloatField,
    /// Boolean (true/false).
    BooleanField,
    /// Date without time.
    DateField,
    /// Date and time.
    DateTimeField,
    /// UUID field.
    UuidField,
    /// Raw binary data.
    BinaryField,
    /// JSON data.
    JsonField,
    /// Many-to-one relationship stored in this column.
    ForeignKey {
        /// The referenced model (and optionally column).
        to: ForeignKeyTarget,
        /// Behavior when the referenced row is deleted.
        on_delete: OnDelete,
    },
    /// One-to-one relationship (unique foreign key).
    OneToOneField {
        /// The referenced model (and optionally column).
        to: ForeignKeyTarget,
        /// Behavior when the referenced row is deleted.
        on_delete: OnDelete,
    },
}

/// Behavior when a referenced row is deleted (ON DELETE action).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OnDelete {
    /// Delete all related rows (CASCADE).
    Cascade,
    /// Prevent deletion if related rows exist (RESTRICT).
    Protect,
    /// Set the foreign key to NULL.
    SetNull,
    /// Take no action (may cause integrity errors).
    DoNothing,
}

impl OnDelete {
    /// Returns the SQL `ON DELETE` action.
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::Protect => "RESTRICT",
            Self::SetNull => "SET NULL",
            Self::DoNothing => "NO ACTION",
        }
    }
}

/// Complete definition of a model field.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// The attribute name of this field.
    pub name: &'static str,
    /// The database column name (may differ from `name`).
    pub column: String,
    /// The type of this field.
    pub field_type: FieldType,
    /// Whether this field is (part of) the primary key.
    pub primary_key: bool,
    /// Whether NULL is allowed in the database.
    pub null: bool,
    /// Default value for new rows.
    pub default: Option<Value>,
    /// Whether a UNIQUE constraint is applied.
    pub unique: bool,
    /// Maximum character length (for `CharField`).
    pub max_length: Option<usize>,
}

impl FieldDef {
    /// Creates a new `FieldDef` with sensible defaults.
    ///
    /// Only the field name and type are required. The column defaults to the
    /// field name, and the field is non-null, non-unique and not a key.
    pub fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            column: name.to_string(),
            field_type,
            primary_key: false,
            null: false,
            default: None,
            unique: false,
            max_length: None,
        }
    }

    /// Creates a `ForeignKey` field with `CASCADE` deletion.
    pub fn foreign_key(name: &'static str, to: impl Into<ForeignKeyTarget>) -> Self {
        Self::new(
            name,
            FieldType::ForeignKey {
                to: to.into(),
                on_delete: OnDelete::Cascade,
            },
        )
    }

    /// Sets the database column name.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Marks this field as the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Allows NULL values in the database.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Sets the maximum character length.
    #[must_use]
    pub const fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Marks this field as having a UNIQUE constraint.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the default value for this field.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the `ON DELETE` behavior of a relational field. No-op otherwise.
    #[must_use]
    pub fn on_delete(mut self, action: OnDelete) -> Self {
        if let FieldType::ForeignKey { on_delete, .. } | FieldType::OneToOneField { on_delete, .. } =
            &mut self.field_type
        {
            *on_delete = action;
        }
        self
    }

    /// Returns `true` if this field stores a foreign key.
    pub const fn is_relation(&self) -> bool {
        matches!(
            self.field_type,
            FieldType::ForeignKey { .. } | FieldType::OneToOneField { .. }
        )
    }

    /// Returns the target of a relational field.
    pub const fn target(&self) -> Option<&ForeignKeyTarget> {
        match &self.field_type {
            FieldType::ForeignKey { to, .. } | FieldType::OneToOneField { to, .. } => Some(to),
            _ => None,
        }
    }

    /// Returns `true` if the database generates this column's value on insert.
    pub const fn is_auto(&self) -> bool {
        matches!(self.field_type, FieldType::AutoField | FieldType::BigAutoField)
    }
}

impl FieldType {
    /// Returns the SQL column type for this field on the given backend.
    pub fn column_type(&self, backend: DatabaseBackendType) -> String {
        match backend {
            DatabaseBackendType::PostgreSQL => self.pg_column_type(),
            DatabaseBackendType::SQLite => self.sqlite_column_type().to_string(),
            DatabaseBackendType::MySQL => self.mysql_column_type(),
        }
    }

    fn pg_column_type(&self) -> String {
        match self {
            Self::AutoField => "SERIAL".to_string(),
            Self::BigAutoField => "BIGSERIAL".to_string(),
            Self::CharField => "VARCHAR".to_string(),
            Self::TextField => "TEXT".to_string(),
            Self::IntegerField => "INTEGER".to_string(),
            Self::BigIntegerField | Self::ForeignKey { .. } | Self::OneToOneField { .. } => {
                "BIGINT".to_string()
            }
            Self::FloatField => "DOUBLE PRECISION".to_string(),
            Self::BooleanField => "BOOLEAN".to_string(),
            Self::DateField => "DATE".to_string(),
            Self::DateTimeField => "TIMESTAMP".to_string(),
            Self::UuidField => "UUID".to_string(),
            Self::BinaryField => "BYTEA".to_string(),
            Self::JsonField => "JSONB".to_string(),
        }
    }

    const fn sqlite_column_type(&self) -> &'static str {
        match self {
            Self::AutoField
            | Self::BigAutoField
            | Self::IntegerField
            | Self::BigIntegerField
            | Self::BooleanField
            | Self::ForeignKey { .. }
            | Self::OneToOneField { .. } => "INTEGER",
            Self::FloatField => "REAL",
            Self::BinaryField => "BLOB",
            Self::CharField
            | Self::TextField
            | Self::DateField
            | Self::DateTimeField
            | Self::UuidField
            | Self::JsonField => "TEXT",
        }
    }

    fn mysql_column_type(&self) -> String {
        match self {
            Self::AutoField => "INTEGER AUTO_INCREMENT".to_string(),
            Self::BigAutoField => "BIGINT AUTO_INCREMENT".to_string(),
            Self::CharField => "VARCHAR".to_string(),
            Self::TextField => "LONGTEXT".to_string(),
            Self::IntegerField => "INTEGER".to_string(),
            Self::BigIntegerField | Self::ForeignKey { .. } | Self::OneToOneField { .. } => {
                "BIGINT".to_string()
            }
            Self::FloatField => "DOUBLE".to_string(),
            Self::BooleanField => "BOOL".to_string(),
            Self::DateField => "DATE".to_string(),
            Self::DateTimeField => "DATETIME(6)".to_string(),
            Self::UuidField => "CHAR(36)".to_string(),
            Self::BinaryField => "LONGBLOB".to_string(),
            Self::JsonField => "JSON".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_def_new_defaults() {
        let f = FieldDef::new("first_name", FieldType::CharField);
        assert_eq!(f.name, "first_name");
        assert_eq!(f.column, "first_name");
        assert!(!f.primary_key);
        assert!(!f.null);
        assert!(f.default.is_none());
        assert!(!f.unique);
        assert!(f.max_length.is_none());
        assert!(f.target().is_none());
    }

    #[test]
    fn test_field_def_builder() {
        let f = FieldDef::new("email", FieldType::CharField)
            .column("email_address")
            .unique()
            .max_length(254)
            .nullable();
        assert_eq!(f.column, "email_address");
        assert!(f.unique);
        assert!(f.null);
        assert_eq!(f.max_length, Some(254));
    }

    #[test]
    fn test_field_def_default() {
        let f = FieldDef::new("active", FieldType::BooleanField).default(true);
        assert_eq!(f.default, Some(Value::Bool(true)));
    }

    #[test]
    fn test_foreign_key_helper() {
        let fk = FieldDef::foreign_key("author_id", "auth.User").on_delete(OnDelete::SetNull);
        assert!(fk.is_relation());
        match &fk.field_type {
            FieldType::ForeignKey { to, on_delete } => {
                assert_eq!(*on_delete, OnDelete::SetNull);
                assert_eq!(to, &ForeignKeyTarget::from("auth.User"));
            }
            other => panic!("expected a foreign key, got {other:?}"),
        }
        assert!(!FieldDef::new("title", FieldType::CharField).is_relation());
    }

    #[test]
    fn test_on_delete_ignored_for_plain_fields() {
        let f = FieldDef::new("title", FieldType::CharField).on_delete(OnDelete::SetNull);
        assert!(matches!(f.field_type, FieldType::CharField));
    }

    #[test]
    fn test_is_auto() {
        assert!(FieldDef::new("id", FieldType::AutoField).primary_key().is_auto());
        assert!(!FieldDef::new("id", FieldType::UuidField).primary_key().is_auto());
    }

    #[test]
    fn test_column_types() {
        let fk = FieldType::ForeignKey {
            to: ForeignKeyTarget::from("auth.User"),
            on_delete: OnDelete::Cascade,
        };
        assert_eq!(fk.column_type(DatabaseBackendType::PostgreSQL), "BIGINT");
        assert_eq!(fk.column_type(DatabaseBackendType::SQLite), "INTEGER");
        assert_eq!(FieldType::JsonField.column_type(DatabaseBackendType::PostgreSQL), "JSONB");
        assert_eq!(FieldType::FloatField.column_type(DatabaseBackendType::SQLite), "REAL");
        assert_eq!(
            FieldType::BigAutoField.column_type(DatabaseBackendType::MySQL),
            "BIGINT AUTO_INCREMENT"
        );
    }

    #[test]
    fn test_on_delete_sql() {
        assert_eq!(OnDelete::Cascade.sql(), "CASCADE");
        assert_eq!(OnDelete::SetNull.sql(), "SET NULL");
    }
}
