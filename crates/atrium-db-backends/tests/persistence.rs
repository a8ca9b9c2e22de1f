//! Creating, saving and deleting model instances against SQLite.

mod common;

use atrium_core::AtriumError;
use atrium_db::model::Model;
use atrium_db::q;
use atrium_db::{adelete_model, asave_model, delete_model, save_model};
use common::{Comment, Post, TempDb, User};

#[test]
fn test_create_assigns_primary_keys() {
    let temp = TempDb::new();
    let first = User::objects().create(&temp.db, User::new("alice")).unwrap();
    let second = User::objects().create(&temp.db, User::new("bob")).unwrap();
    assert_eq!(first.id, Some(1));
    assert_eq!(second.id, Some(2));

    let loaded = User::objects().get(&temp.db, q!(id = 2)).unwrap();
    assert_eq!(loaded, second);
}

#[test]
fn test_save_inserts_then_updates() {
    let temp = TempDb::new();
    let author = User::objects().create(&temp.db, User::new("alice")).unwrap();
    let mut post = Post::new("Draft", author.id.unwrap());

    save_model(&temp.db, &mut post).unwrap();
    let id = post.id.expect("pk assigned");

    post.title = "Final".into();
    post.published = true;
    save_model(&temp.db, &mut post).unwrap();

    let loaded = Post::objects().get(&temp.db, q!(id = id)).unwrap();
    assert_eq!(loaded.title, "Final");
    assert!(loaded.published);
    assert_eq!(Post::objects().all().count(&temp.db).unwrap(), 1);
}

#[test]
fn test_save_with_unknown_pk_inserts() {
    let temp = TempDb::new();
    let mut user = User::new("explicit");
    user.id = Some(42);
    save_model(&temp.db, &mut user).unwrap();
    assert_eq!(user.id, Some(42));
    assert!(User::objects().get_or_none(&temp.db, q!(id = 42)).unwrap().is_some());
}

#[test]
fn test_delete_removes_row() {
    let temp = TempDb::with_blog();
    let comment = Comment::objects().get(&temp.db, q!(body = "Thanks!")).unwrap();
    assert_eq!(delete_model(&temp.db, &comment).unwrap(), 1);
    assert_eq!(Comment::objects().all().count(&temp.db).unwrap(), 1);

    let err = delete_model(&temp.db, &Comment::new("unsaved", 1, 1)).unwrap_err();
    assert!(matches!(err, AtriumError::DatabaseError(_)));
}

#[test]
fn test_foreign_keys_are_enforced() {
    let temp = TempDb::new();
    let err = Post::objects().create(&temp.db, Post::new("Orphan", 77)).unwrap_err();
    assert!(matches!(err, AtriumError::IntegrityError(_)), "{err:?}");
    assert_eq!(Post::objects().all().count(&temp.db).unwrap(), 0);
}

#[test]
fn test_unique_constraint_is_integrity_error() {
    let temp = TempDb::new();
    User::objects().create(&temp.db, User::new("alice")).unwrap();
    let err = User::objects().create(&temp.db, User::new("alice")).unwrap_err();
    assert!(matches!(err, AtriumError::IntegrityError(_)));
}

#[tokio::test]
async fn test_async_persistence_round() {
    let temp = TempDb::new();
    let db = &temp.db;
    let author = User::objects().acreate(db, User::new("alice")).await.unwrap();

    let mut post = Post::new("Async draft", author.id.unwrap());
    asave_model(db, &mut post).await.unwrap();
    post.title = "Async final".into();
    asave_model(db, &mut post).await.unwrap();

    let loaded = Post::objects().aget(db, q!(author__username = "alice")).await.unwrap();
    assert_eq!(loaded.title, "Async final");

    assert_eq!(adelete_model(db, &loaded).await.unwrap(), 1);
    assert!(!Post::objects().all().aexists(db).await.unwrap());
}
