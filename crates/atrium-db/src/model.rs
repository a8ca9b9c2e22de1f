//! Model trait and schema metadata.
//!
//! The [`Model`] trait is implemented by every struct that maps to a table.
//! It exposes static [`ModelMeta`], the instance's column values, and
//! construction from a database [`Row`].
//!
//! [`ModelMeta`] is the schema the query engine resolves lookup paths
//! against: the model's fields (columns) and its named relationships.

use atrium_core::utils::text::default_table_name;
use atrium_core::{AtriumError, AtriumResult};

use crate::fields::{FieldDef, FieldType};
use crate::query::compiler::DatabaseBackendType;
use crate::query::queryset::Manager;
use crate::relations::RelationDef;
use crate::value::Value;

pub use crate::query::compiler::Row;

/// The core trait for all models.
///
/// # Examples
///
/// ```
/// use std::sync::LazyLock;
/// use atrium_db::fields::{FieldDef, FieldType};
/// use atrium_db::model::{Model, ModelMeta, Row};
/// use atrium_db::value::Value;
/// use atrium_core::AtriumResult;
///
/// struct Article {
///     id: Option<i64>,
///     title: String,
/// }
///
/// impl Model for Article {
///     fn meta() -> &'static ModelMeta {
///         static META: LazyLock<ModelMeta> = LazyLock::new(|| {
///             ModelMeta::new("blog", "Article")
///                 .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
///                 .field(FieldDef::new("title", FieldType::CharField).max_length(200))
///         });
///         &META
///     }
///
///     fn pk(&self) -> Option<Value> {
///         self.id.map(Value::from)
///     }
///
///     fn set_pk(&mut self, value: Value) {
///         if let Value::Int(id) = value {
///             self.id = Some(id);
///         }
///     }
///
///     fn field_values(&self) -> Vec<(&'static str, Value)> {
///         vec![("id", Value::from(self.id)), ("title", Value::from(self.title.as_str()))]
///     }
///
///     fn from_row(row: &Row) -> AtriumResult<Self> {
///         Ok(Self { id: row.get("id")?, title: row.get("title")? })
///     }
/// }
///
/// assert_eq!(Article::table_name(), "blog_articles");
/// ```
pub trait Model: Send + Sync + Sized + 'static {
    /// Returns the static metadata for this model type.
    fn meta() -> &'static ModelMeta;

    /// Returns the primary key value, or `None` if the instance is unsaved.
    fn pk(&self) -> Option<Value>;

    /// Sets the primary key value on this instance (used after INSERT).
    fn set_pk(&mut self, value: Value);

    /// Returns all column name-value pairs for this instance.
    fn field_values(&self) -> Vec<(&'static str, Value)>;

    /// Constructs a model instance from a database row.
    fn from_row(row: &Row) -> AtriumResult<Self>;

    /// Returns the database table name.
    fn table_name() -> &'static str {
        Self::meta().db_table.as_str()
    }

    /// Returns the module label this model belongs to.
    fn module_label() -> &'static str {
        Self::meta().module_label
    }

    /// Returns the column of the single primary key (`"id"` if there is none).
    fn pk_field_name() -> &'static str {
        Self::meta()
            .pk_field()
            .map_or("id", |field| field.column.as_str())
    }

    /// Returns column name-value pairs excluding the primary key.
    /// Used for INSERT when the key is generated by the database.
    fn non_pk_field_values(&self) -> Vec<(&'static str, Value)> {
        let pk_name = Self::pk_field_name();
        self.field_values()
            .into_iter()
            .filter(|(name, _)| *name != pk_name)
            .collect()
    }

    /// Returns the default manager for this model.
    fn objects() -> Manager<Self> {
        Manager::new()
    }
}

/// Schema metadata for a model.
#[derive(Debug, Clone)]
pub struct ModelMeta {
    /// The module label (e.g., "auth", "blog").
    pub module_label: &'static str,
    /// The model name as declared (e.g., "User", "BlogPost").
    pub model_name: &'static str,
    /// The database table name.
    pub db_table: String,
    /// Field (column) definitions.
    pub fields: Vec<FieldDef>,
    /// Navigable relationships.
    pub relations: Vec<RelationDef>,
}

/// What a name on a model refers to.
#[derive(Debug, Clone, Copy)]
pub enum FieldRef<'a> {
    /// A relationship to another model.
    Relation(&'a RelationDef),
    /// A plain column.
    Column(&'a FieldDef),
}

impl ModelMeta {
    /// Creates metadata for `module_label.model_name` with the default table
    /// name (`auth`, `UserProfile` → `auth_user_profiles`).
    pub fn new(module_label: &'static str, model_name: &'static str) -> Self {
        Self {
            module_label,
            model_name,
            db_table: default_table_name(module_label, model_name),
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Overrides the table name.
    #[must_use]
    pub fn db_table(mut self, table: impl Into<String>) -> Self {
        self.db_table = table.into();
        self
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a relationship.
    #[must_use]
    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Returns `"module.Model"`.
    pub fn label(&self) -> String {
        format!("{}.{}", self.module_label, self.model_name)
    }

    /// Looks up a field by attribute name, then by column name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.column == name))
    }

    /// Looks up a relationship by name.
    pub fn get_relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Resolves a path segment: relationships take precedence over columns.
    pub fn resolve(&self, name: &str) -> Option<FieldRef<'_>> {
        self.get_relation(name)
            .map(FieldRef::Relation)
            .or_else(|| self.get_field(name).map(FieldRef::Column))
    }

    /// Returns the primary key fields, in declaration order.
    pub fn primary_keys(&self) -> Vec<&FieldDef> {
        self.fields.iter().filter(|f| f.primary_key).collect()
    }

    /// Returns the single primary key field.
    ///
    /// # Errors
    ///
    /// Returns [`AtriumError::AmbiguousPrimaryKey`] when the model has no
    /// primary key or a composite one.
    pub fn pk_field(&self) -> AtriumResult<&FieldDef> {
        match self.primary_keys().as_slice() {
            [pk] => Ok(pk),
            keys => Err(AtriumError::AmbiguousPrimaryKey {
                model: self.label(),
                count: keys.len(),
            }),
        }
    }

    /// Returns the column of the single primary key.
    pub fn pk_column(&self) -> AtriumResult<&str> {
        self.pk_field().map(|f| f.column.as_str())
    }

    /// Returns the column names in declaration order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.column.as_str())
    }

    /// Generates the `CREATE TABLE IF NOT EXISTS` statement for this model.
    ///
    /// Foreign keys render `REFERENCES` clauses, so their targets must be
    /// resolvable.
    pub fn create_table_sql(&self, backend: DatabaseBackendType) -> AtriumResult<String> {
        let pks = self.primary_keys();
        let composite = pks.len() > 1;
        let mut columns = Vec::with_capacity(self.fields.len() + 1);

        for field in &self.fields {
            let mut def = format!("\"{}\" {}", field.column, column_type(field, backend));
            if field.primary_key && !composite {
                def.push_str(" PRIMARY KEY");
                if field.is_auto() && backend == DatabaseBackendType::SQLite {
                    def.push_str(" AUTOINCREMENT");
                }
            } else if !field.null {
                def.push_str(" NOT NULL");
            }
            if field.unique && !field.primary_key {
                def.push_str(" UNIQUE");
            }
            if let Some(default) = field.default.as_ref().and_then(default_literal) {
                def.push_str(&format!(" DEFAULT {default}"));
            }
            if let FieldType::ForeignKey { to, on_delete } | FieldType::OneToOneField { to, on_delete } =
                &field.field_type
            {
                let target = to.resolve()?;
                def.push_str(&format!(
                    " REFERENCES \"{}\" (\"{}\") ON DELETE {}",
                    target.meta.db_table,
                    target.field.column,
                    on_delete.sql()
                ));
            }
            columns.push(def);
        }

        if composite {
            let keys: Vec<String> = pks.iter().map(|f| format!("\"{}\"", f.column)).collect();
            columns.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            self.db_table,
            columns.join(", ")
        ))
    }
}

fn column_type(field: &FieldDef, backend: DatabaseBackendType) -> String {
    let base = field.field_type.column_type(backend);
    match (&field.field_type, field.max_length, backend) {
        (FieldType::CharField, Some(n), DatabaseBackendType::PostgreSQL | DatabaseBackendType::MySQL) => {
            format!("{base}({n})")
        }
        (FieldType::CharField, None, DatabaseBackendType::MySQL) => format!("{base}(255)"),
        _ => base,
    }
}

fn default_literal(value: &Value) -> Option<String> {
    match value {
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Int(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::String(s) => Some(format!("'{}'", s.replace('\'', "''"))),
        _ => None,
    }
}
