//! Relationship target resolution.
//!
//! A foreign key names the model it points at with a [`ForeignKeyTarget`],
//! either as a `"module.Model"` / `"module.Model.field"` string looked up in
//! the [model registry](crate::registry) when first needed, or as a function
//! returning the target's metadata directly.
//!
//! [`RelationDef`] declares a navigable relationship on a model, used by
//! filter paths (`author__name`) and eager loading. [`RelationDef::hop`]
//! turns it into a [`JoinHop`]: the target model plus the two columns the
//! join condition compares.

use std::fmt;

use atrium_core::{AtriumError, AtriumResult};

use crate::fields::FieldDef;
use crate::model::ModelMeta;
use crate::registry;

/// The model (and optionally the column) a foreign key references.
#[derive(Clone)]
pub enum ForeignKeyTarget {
    /// `"module.Model"` or `"module.Model.field"`, parsed on resolution.
    Path(String),
    /// A function returning the target model's metadata. The target column
    /// is the model's single primary key.
    Lazy(fn() -> &'static ModelMeta),
}

impl fmt::Debug for ForeignKeyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl PartialEq for ForeignKeyTarget {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Path(a), Self::Path(b)) => a == b,
            (Self::Lazy(a), Self::Lazy(b)) => std::ptr::eq(a(), b()),
            _ => false,
        }
    }
}

impl From<&str> for ForeignKeyTarget {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

impl From<String> for ForeignKeyTarget {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl From<fn() -> &'static ModelMeta> for ForeignKeyTarget {
    fn from(meta: fn() -> &'static ModelMeta) -> Self {
        Self::Lazy(meta)
    }
}

/// The parts of a `"module.Model[.field]"` target string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPath<'a> {
    /// The module label.
    pub module: &'a str,
    /// The model name.
    pub model: &'a str,
    /// The explicitly referenced field, if any.
    pub field: Option<&'a str>,
}

/// Splits a target string into its module, model and optional field.
///
/// # Errors
///
/// Returns [`AtriumError::InvalidTarget`] unless the string has exactly two
/// or three non-empty dot-separated parts.
pub fn parse_target(target: &str) -> AtriumResult<TargetPath<'_>> {
    let parts: Vec<&str> = target.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(AtriumError::InvalidTarget(target.to_string()));
    }
    match parts.as_slice() {
        [module, model] => Ok(TargetPath {
            module: *module,
            model: *model,
            field: None,
        }),
        [module, model, field] => Ok(TargetPath {
            module: *module,
            model: *model,
            field: Some(*field),
        }),
        _ => Err(AtriumError::InvalidTarget(target.to_string())),
    }
}

/// A resolved foreign key target.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedTarget {
    /// The referenced model.
    pub meta: &'static ModelMeta,
    /// The referenced column.
    pub field: &'static FieldDef,
}

impl ResolvedTarget {
    /// Renders the target as `table.column`.
    pub fn fk_reference(&self) -> String {
        format!("{}.{}", self.meta.db_table, self.field.column)
    }
}

impl ForeignKeyTarget {
    /// Resolves the referenced model without choosing a column.
    pub fn resolve_model(&self) -> AtriumResult<&'static ModelMeta> {
        match self {
            Self::Path(path) => {
                let target = parse_target(path)?;
                registry::get_model(target.module, target.model)
            }
            Self::Lazy(meta) => Ok(meta()),
        }
    }

    /// Resolves the referenced model and column.
    ///
    /// An explicit `field` part must name a field of the target model
    /// ([`AtriumError::UnknownAttribute`] otherwise). Without one the target
    /// must have exactly one primary key
    /// ([`AtriumError::AmbiguousPrimaryKey`] otherwise).
    pub fn resolve(&self) -> AtriumResult<ResolvedTarget> {
        let (meta, explicit) = match self {
            Self::Path(path) => {
                let target = parse_target(path)?;
                (
                    registry::get_model(target.module, target.model)?,
                    target.field,
                )
            }
            Self::Lazy(meta) => (meta(), None),
        };

        let field = match explicit {
            Some(name) => meta
                .get_field(name)
                .ok_or_else(|| AtriumError::UnknownAttribute {
                    model: meta.label(),
                    name: name.to_string(),
                    path: self.to_string(),
                })?,
            None => meta.pk_field()?,
        };
        Ok(ResolvedTarget { meta, field })
    }
}

impl fmt::Display for ForeignKeyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.write_str(path),
            Self::Lazy(meta) => f.write_str(&meta().label()),
        }
    }
}

/// The direction of a relationship.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationKind {
    /// Follows a foreign key stored on this model (`post.author` via `author_id`).
    ManyToOne {
        /// The local foreign key field.
        fk_field: &'static str,
    },
    /// Follows a foreign key stored on another model back to this one
    /// (`user.posts` via `Post.author_id`).
    OneToMany {
        /// The model holding the foreign key.
        to: ForeignKeyTarget,
        /// The foreign key field on that model.
        fk_field: &'static str,
    },
}

/// A named, navigable relationship on a model.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDef {
    /// The name used in lookup paths and eager-load paths.
    pub name: &'static str,
    /// How the relationship is stored.
    pub kind: RelationKind,
}

impl RelationDef {
    /// A relationship through a local foreign key field.
    pub const fn many_to_one(name: &'static str, fk_field: &'static str) -> Self {
        Self {
            name,
            kind: RelationKind::ManyToOne { fk_field },
        }
    }

    /// A reverse relationship through a foreign key on another model.
    pub fn one_to_many(
        name: &'static str,
        to: impl Into<ForeignKeyTarget>,
        fk_field: &'static str,
    ) -> Self {
        Self {
            name,
            kind: RelationKind::OneToMany {
                to: to.into(),
                fk_field,
            },
        }
    }

    /// Resolves this relationship, declared on `owner`, into a join hop.
    pub fn hop(&self, owner: &ModelMeta) -> AtriumResult<JoinHop> {
        match &self.kind {
            RelationKind::ManyToOne { fk_field } => {
                let fk = foreign_key_field(owner, fk_field, self.name)?;
                let target = fk_target(owner, fk)?.resolve()?;
                Ok(JoinHop {
                    target: target.meta,
                    remote_column: target.field.column.clone(),
                    local_column: fk.column.clone(),
                    to_many: false,
                })
            }
            RelationKind::OneToMany { to, fk_field } => {
                let target = to.resolve_model()?;
                let fk = foreign_key_field(target, fk_field, self.name)?;
                let referenced = fk_target(target, fk)?.resolve()?;
                if !same_model(referenced.meta, owner) {
                    return Err(AtriumError::ImproperlyConfigured(format!(
                        "Relationship '{}' on '{}' uses '{}.{}', which references '{}'",
                        self.name,
                        owner.label(),
                        target.label(),
                        fk.name,
                        referenced.meta.label()
                    )));
                }
                Ok(JoinHop {
                    target,
                    remote_column: fk.column.clone(),
                    local_column: referenced.field.column.clone(),
                    to_many: true,
                })
            }
        }
    }
}

fn foreign_key_field<'a>(
    meta: &'a ModelMeta,
    fk_field: &str,
    relation: &str,
) -> AtriumResult<&'a FieldDef> {
    meta.get_field(fk_field)
        .ok_or_else(|| AtriumError::UnknownAttribute {
            model: meta.label(),
            name: fk_field.to_string(),
            path: relation.to_string(),
        })
}

fn fk_target<'a>(meta: &ModelMeta, fk: &'a FieldDef) -> AtriumResult<&'a ForeignKeyTarget> {
    fk.target().ok_or_else(|| {
        AtriumError::ImproperlyConfigured(format!(
            "Field '{}.{}' is used as a relationship but is not a foreign key",
            meta.label(),
            fk.name
        ))
    })
}

fn same_model(a: &ModelMeta, b: &ModelMeta) -> bool {
    a.module_label == b.module_label && a.model_name == b.model_name
}

/// One resolved relationship traversal.
///
/// The join condition is `<alias>.<remote_column> = <current>.<local_column>`.
#[derive(Debug, Clone)]
pub struct JoinHop {
    /// The model the relationship leads to.
    pub target: &'static ModelMeta,
    /// The column compared on the target side.
    pub remote_column: String,
    /// The column compared on the current side.
    pub local_column: String,
    /// Whether one current row may match several target rows.
    pub to_many: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, Comment, Post, User};
    use crate::Model;

    #[test]
    fn test_parse_target() {
        assert_eq!(
            parse_target("auth.User").unwrap(),
            TargetPath {
                module: "auth",
                model: "User",
                field: None
            }
        );
        assert_eq!(parse_target("auth.User.email").unwrap().field, Some("email"));
    }

    #[test]
    fn test_parse_target_rejects_other_shapes() {
        for bad in ["User", "a.b.c.d", "auth..User", ".User", ""] {
            assert!(
                matches!(parse_target(bad), Err(AtriumError::InvalidTarget(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_resolve_to_single_pk() {
        testing::register();
        let resolved = ForeignKeyTarget::from("auth.User").resolve().unwrap();
        assert_eq!(resolved.meta.label(), "auth.User");
        assert_eq!(resolved.field.column, "id");
        assert_eq!(resolved.fk_reference(), "auth_users.id");
    }

    #[test]
    fn test_resolve_explicit_field() {
        testing::register();
        let resolved = ForeignKeyTarget::from("auth.User.email").resolve().unwrap();
        assert_eq!(resolved.fk_reference(), "auth_users.email");

        let err = ForeignKeyTarget::from("auth.User.nickname").resolve().unwrap_err();
        assert!(matches!(err, AtriumError::UnknownAttribute { ref name, .. } if name == "nickname"));
    }

    #[test]
    fn test_resolve_lazy() {
        let target = ForeignKeyTarget::Lazy(User::meta);
        let resolved = target.resolve().unwrap();
        assert_eq!(resolved.fk_reference(), "auth_users.id");
        assert_eq!(target.to_string(), "auth.User");
    }

    #[test]
    fn test_resolve_unregistered_model() {
        testing::register();
        let err = ForeignKeyTarget::from("shop.Order").resolve().unwrap_err();
        assert!(matches!(err, AtriumError::ModelNotFound { .. }));
    }

    #[test]
    fn test_resolve_requires_single_pk() {
        testing::register();
        let err = ForeignKeyTarget::from("blog.Tagging").resolve().unwrap_err();
        assert!(matches!(err, AtriumError::AmbiguousPrimaryKey { count: 2, .. }));
    }

    #[test]
    fn test_many_to_one_hop() {
        testing::register();
        let meta = Post::meta();
        let hop = meta.get_relation("author").unwrap().hop(meta).unwrap();
        assert_eq!(hop.target.label(), "auth.User");
        assert_eq!(hop.remote_column, "id");
        assert_eq!(hop.local_column, "author_id");
        assert!(!hop.to_many);
    }

    #[test]
    fn test_one_to_many_hop() {
        testing::register();
        let meta = Post::meta();
        let hop = meta.get_relation("comments").unwrap().hop(meta).unwrap();
        assert_eq!(hop.target.label(), "blog.Comment");
        assert_eq!(hop.remote_column, "post_id");
        assert_eq!(hop.local_column, "id");
        assert!(hop.to_many);
        assert!(std::ptr::eq(hop.target, Comment::meta()));
    }
}
