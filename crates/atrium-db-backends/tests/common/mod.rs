//! Shared fixtures for the SQLite integration tests: four models
//! (`auth.Profile`, `auth.User`, `blog.Post`, `blog.Comment`) and a
//! throwaway database file with their tables.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{LazyLock, Once};

use atrium_core::AtriumResult;
use atrium_db::fields::{FieldDef, FieldType, OnDelete};
use atrium_db::model::{Model, ModelMeta};
use atrium_db::query::compiler::{DatabaseBackendType, Row};
use atrium_db::relations::RelationDef;
use atrium_db::session::{Database, SessionOptions};
use atrium_db::value::Value;
use atrium_db_backends::SqliteConnector;

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
    pub fn new(username: &str) -> Self {
        Self {
            id: None,
            username: username.to_string(),
            email: format!("{username}@example.com"),
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
    pub author_id: i64,
}

impl Post {
    pub fn new(title: &str, author_id: i64) -> Self {
        Self {
            id: None,
            title: title.to_string(),
            published: false,
            author_id,
        }
    }

    #[must_use]
    pub const fn published(mut self) -> Self {
        self.published = true;
        self
    }
}

impl Model for Post {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new("blog", "Post")
                .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
                .field(FieldDef::new("title", FieldType::CharField).max_length(200))
                .field(FieldDef::new("published", FieldType::BooleanField).default(false))
                .field(FieldDef::foreign_key("author_id", "auth.User"))
                .relation(RelationDef::many_to_one("author", "author_id"))
                .relation(RelationDef::one_to_many("comments", "blog.Comment", "post_id"))
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
            ("author_id", Value::from(self.author_id)),
        ]
    }

    fn from_row(row: &Row) -> AtriumResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            published: row.get("published")?,
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

impl Comment {
    pub fn new(body: &str, post_id: i64, author_id: i64) -> Self {
        Self {
            id: None,
            body: body.to_string(),
            post_id,
            author_id,
        }
    }
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

pub fn register_models() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        for meta in [Profile::meta(), User::meta(), Post::meta(), Comment::meta()] {
            atrium_db::register_model(meta).expect("fixture models register cleanly");
        }
    });
}

/// A database file under the system temp dir, removed on drop.
pub struct TempDb {
    pub db: Database,
    path: PathBuf,
}

impl TempDb {
    /// Creates an empty database with the fixture tables.
    pub fn new() -> Self {
        register_models();
        let path = std::env::temp_dir().join(format!("atrium-{}.sqlite3", uuid::Uuid::new_v4()));
        let db = Database::new(SqliteConnector::new(&path));
        db.with_session(SessionOptions::default().autocommit(true), |session| {
            for meta in [Profile::meta(), User::meta(), Post::meta(), Comment::meta()] {
                session.execute_sql(&meta.create_table_sql(DatabaseBackendType::SQLite)?, &[])?;
            }
            Ok(())
        })
        .expect("fixture tables are created");
        Self { db, path }
    }

    /// Creates the Post/User scenario: `alice` wrote two posts, `bob` one.
    /// `alice` has a profile, `bob` does not.
    pub fn with_blog() -> Self {
        let temp = Self::new();
        let db = &temp.db;
        let profile = Profile::objects()
            .create(db, Profile { id: None, bio: Some("Writes about Rust".into()) })
            .expect("profile");
        let mut alice = User::new("alice");
        alice.profile_id = profile.id;
        let alice = User::objects().create(db, alice).expect("alice");
        let bob = User::objects().create(db, User::new("bob")).expect("bob");
        let (alice_id, bob_id) = (alice.id.expect("alice id"), bob.id.expect("bob id"));

        let first = Post::objects()
            .create(db, Post::new("Ownership explained", alice_id).published())
            .expect("post");
        Post::objects()
            .create(db, Post::new("Borrowing in depth", alice_id))
            .expect("post");
        Post::objects()
            .create(db, Post::new("Async for beginners", bob_id).published())
            .expect("post");

        let first_id = first.id.expect("post id");
        Comment::objects()
            .create(db, Comment::new("Great read", first_id, bob_id))
            .expect("comment");
        Comment::objects()
            .create(db, Comment::new("Thanks!", first_id, alice_id))
            .expect("comment");
        temp
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}
