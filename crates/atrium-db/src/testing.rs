//! Shared model fixtures for unit tests.
//!
//! `auth.Profile`, `auth.User`, `blog.Post`, `blog.Comment` and
//! `blog.Tagging` (composite key). Every test that resolves relationships
//! calls [`register`] first.

use std::sync::{LazyLock, Once};

use atrium_core::AtriumResult;

use crate::fields::{FieldDef, FieldType, OnDelete};
use crate::model::{Model, ModelMeta, Row};
use crate::registry;
use crate::relations::RelationDef;
use crate::value::Value;

pub fn register() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        for meta in [
            Profile::meta(),
            User::meta(),
            Post::meta(),
            Comment::meta(),
            Tagging::meta(),
        ] {
            registry::register_model(meta).expect("fixture models register cleanly");
        }
    });
}

fn set_int_pk(slot: &mut Option<i64>, value: Value) {
    if let Value::Int(id) = value {
        *slot = Some(id);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: Option<i64>,
    pub bio: Option<String>,
}

impl Model for Profile {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new("auth", "Profile")
                .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
                .field(FieldDef::new("bio", FieldType::TextField).nullable())
        });
        &META
    }

    fn pk(&self) -> Option<Value> {
        self.id.map(Value::from)
    }

    fn set_pk(&mut self, value: Value) {
        set_int_pk(&mut self.id, value);
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![("id", Value::from(self.id)), ("bio", Value::from(self.bio.clone()))]
    }

    fn from_row(row: &Row) -> AtriumResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            bio: row.get("bio")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Option<i64>,
    pub username: String,
    pub email: String,
    pub profile_id: Option<i64>,
}

impl User {
    pub fn new(username: &str, email: &str) -> Self {
        Self {
            id: None,
            username: username.to_string(),
            email: email.to_string(),
            profile_id: None,
        }
    }
}

impl Model for User {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new("auth", "User")
                .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
                .field(
                    FieldDef::new("username", FieldType::CharField)
                        .max_length(150)
                        .unique(),
                )
                .field(FieldDef::new("email", FieldType::CharField).max_length(254))
                .field(
                    FieldDef::foreign_key("profile_id", "auth.Profile")
                        .nullable()
                        .on_delete(OnDelete::SetNull),
                )
                .relation(RelationDef::many_to_one("profile", "profile_id"))
                .relation(RelationDef::one_to_many("posts", "blog.Post", "author_id"))
                .relation(RelationDef::one_to_many("comments", "blog.Comment", "author_id"))
        });
        &META
    }

    fn pk(&self) -> Option<Value> {
        self.id.map(Value::from)
    }

    fn set_pk(&mut self, value: Value) {
        set_int_pk(&mut self.id, value);
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::from(self.id)),
            ("username", Value::from(self.username.as_str())),
            ("email", Value::from(self.email.as_str())),
            ("profile_id", Value::from(self.profile_id)),
        ]
    }

    fn from_row(row: &Row) -> AtriumResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            email: row.get("email")?,
            profile_id: row.get("profile_id")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: Option<i64>,
    pub title: String,
    pub published: bool,
    pub created: Option<String>,
    pub author_id: i64,
}

impl Post {
    pub fn new(title: &str, author_id: i64) -> Self {
        Self {
            id: None,
            title: title.to_string(),
            published: false,
            created: None,
            author_id,
        }
    }
}

impl Model for Post {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new("blog", "Post")
                .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
                .field(FieldDef::new("title", FieldType::CharField).max_length(200))
                .field(FieldDef::new("published", FieldType::BooleanField).default(false))
                .field(
                    FieldDef::new("created", FieldType::DateTimeField)
                        .column("created_at")
                        .nullable(),
                )
                .field(FieldDef::foreign_key("author_id", "auth.User"))
                .relation(RelationDef::many_to_one("author", "author_id"))
                .relation(RelationDef::one_to_many("comments", "blog.Comment", "post_id"))
                .relation(RelationDef::one_to_many("taggings", "blog.Tagging", "post_id"))
        });
        &META
    }

    fn pk(&self) -> Option<Value> {
        self.id.map(Value::from)
    }

    fn set_pk(&mut self, value: Value) {
        set_int_pk(&mut self.id, value);
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::from(self.id)),
            ("title", Value::from(self.title.as_str())),
            ("published", Value::from(self.published)),
            ("created_at", Value::from(self.created.clone())),
            ("author_id", Value::from(self.author_id)),
        ]
    }

    fn from_row(row: &Row) -> AtriumResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            published: row.get("published")?,
            created: row.get("created_at")?,
            author_id: row.get("author_id")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: Option<i64>,
    pub body: String,
    pub post_id: i64,
    pub author_id: i64,
}

impl Model for Comment {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new("blog", "Comment")
                .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
                .field(FieldDef::new("body", FieldType::TextField))
                .field(FieldDef::foreign_key("post_id", "blog.Post"))
                .field(FieldDef::foreign_key("author_id", "auth.User"))
                .relation(RelationDef::many_to_one("post", "post_id"))
                .relation(RelationDef::many_to_one("author", "author_id"))
        });
        &META
    }

    fn pk(&self) -> Option<Value> {
        self.id.map(Value::from)
    }

    fn set_pk(&mut self, value: Value) {
        set_int_pk(&mut self.id, value);
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::from(self.id)),
            ("body", Value::from(self.body.as_str())),
            ("post_id", Value::from(self.post_id)),
            ("author_id", Value::from(self.author_id)),
        ]
    }

    fn from_row(row: &Row) -> AtriumResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            body: row.get("body")?,
            post_id: row.get("post_id")?,
            author_id: row.get("author_id")?,
        })
    }
}

/// A tag attached to a post, keyed by `(post_id, tag)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tagging {
    pub post_id: i64,
    pub tag: String,
}

impl Model for Tagging {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new("blog", "Tagging")
                .field(FieldDef::foreign_key("post_id", "blog.Post").primary_key())
                .field(
                    FieldDef::new("tag", FieldType::CharField)
                        .max_length(50)
                        .primary_key(),
                )
        });
        &META
    }

    fn pk(&self) -> Option<Value> {
        None
    }

    fn set_pk(&mut self, _value: Value) {}

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("post_id", Value::from(self.post_id)),
            ("tag", Value::from(self.tag.as_str())),
        ]
    }

    fn from_row(row: &Row) -> AtriumResult<Self> {
        Ok(Self {
            post_id: row.get("post_id")?,
            tag: row.get("tag")?,
        })
    }
}
