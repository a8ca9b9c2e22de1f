//! Filtering, ordering and counting against a real SQLite database.

mod common;

use atrium_core::AtriumError;
use atrium_db::model::Model;
use atrium_db::query::Q;
use atrium_db::q;
use common::{Comment, Post, TempDb, User};

fn titles(posts: &[Post]) -> Vec<&str> {
    posts.iter().map(|p| p.title.as_str()).collect()
}

#[test]
fn test_filter_through_relationship_counts() {
    let temp = TempDb::with_blog();
    let db = &temp.db;

    let alice = Post::objects().filter(q!(author__username = "alice")).unwrap();
    let bob = Post::objects().filter(q!(author__username = "bob")).unwrap();
    assert_eq!(alice.count(db).unwrap(), 2);
    assert_eq!(bob.count(db).unwrap(), 1);

    let either = Post::objects()
        .filter(q!(author__username = "alice") | q!(author__username = "bob"))
        .unwrap();
    assert_eq!(either.query().joins.len(), 1);
    assert_eq!(either.count(db).unwrap(), 3);
}

#[test]
fn test_chained_filters_and_lookups() {
    let temp = TempDb::with_blog();
    let db = &temp.db;

    let published_by_alice = Post::objects()
        .filter(q!(author__username = "alice"))
        .unwrap()
        .filter(q!(published = true))
        .unwrap()
        .all(db)
        .unwrap();
    assert_eq!(titles(&published_by_alice), ["Ownership explained"]);

    let insensitive = Post::objects()
        .filter(q!(title__icontains = "BORROW"))
        .unwrap()
        .all(db)
        .unwrap();
    assert_eq!(titles(&insensitive), ["Borrowing in depth"]);

    let prefixed = Post::objects().filter(q!(title__contains = "Async")).unwrap();
    assert_eq!(prefixed.count(db).unwrap(), 1);

    let by_ids = Post::objects().filter(q!(id__in = vec![1_i64, 3])).unwrap();
    assert_eq!(by_ids.count(db).unwrap(), 2);

    let none = Post::objects().filter(q!(id__in = Vec::<i64>::new())).unwrap();
    assert_eq!(none.count(db).unwrap(), 0);

    let later = Post::objects().filter(q!(id__gt = 1, id__lte = 3)).unwrap();
    assert_eq!(later.count(db).unwrap(), 2);
}

#[test]
fn test_isnull_through_nullable_relationship() {
    let temp = TempDb::with_blog();
    let db = &temp.db;

    let without_profile = User::objects().filter(q!(profile_id__isnull = true)).unwrap();
    let names: Vec<String> = without_profile.all(db).unwrap().into_iter().map(|u| u.username).collect();
    assert_eq!(names, ["bob"]);

    let with_bio = User::objects()
        .filter(q!(profile__bio__contains = "Rust"))
        .unwrap()
        .one(db)
        .unwrap();
    assert_eq!(with_bio.username, "alice");
}

#[test]
fn test_exclude_negates_conjunction() {
    let temp = TempDb::with_blog();
    let db = &temp.db;

    // NOT (published AND by alice) keeps alice's draft and bob's post.
    let qs = Post::objects()
        .exclude(q!(published = true, author__username = "alice"))
        .unwrap()
        .order_by(&["title"])
        .unwrap();
    assert_eq!(
        titles(&qs.all(db).unwrap()),
        ["Async for beginners", "Borrowing in depth"]
    );
}

#[test]
fn test_negated_q_and_raw_fragment() {
    let temp = TempDb::with_blog();
    let db = &temp.db;

    let drafts = Post::objects().filter(!q!(published = true)).unwrap();
    assert_eq!(titles(&drafts.all(db).unwrap()), ["Borrowing in depth"]);

    let long_titles = Post::objects()
        .filter(Q::raw("LENGTH(\"blog_posts\".\"title\") > ?", vec![18.into()]))
        .unwrap();
    assert_eq!(long_titles.count(db).unwrap(), 2);
}

#[test]
fn test_count_ignores_ordering() {
    let temp = TempDb::with_blog();
    let db = &temp.db;

    let base = Post::objects().filter(q!(author__username = "alice")).unwrap();
    let ordered = base.order_by(&["-title"]).unwrap();
    assert_eq!(base.count(db).unwrap(), ordered.count(db).unwrap());
    assert_eq!(ordered.limit(1).count(db).unwrap(), 2);
}

#[test]
fn test_ordering_and_slicing() {
    let temp = TempDb::with_blog();
    let db = &temp.db;

    let ordered = Post::objects().order_by(&["-title"]).unwrap();
    assert_eq!(
        titles(&ordered.all(db).unwrap()),
        ["Ownership explained", "Borrowing in depth", "Async for beginners"]
    );
    assert_eq!(titles(&ordered.offset(1).limit(1).all(db).unwrap()), ["Borrowing in depth"]);
    assert_eq!(
        ordered.first(db).unwrap().map(|p| p.title),
        Some("Ownership explained".to_string())
    );
}

#[test]
fn test_first_respects_an_empty_slice() {
    let temp = TempDb::with_blog();
    let db = &temp.db;

    let empty = Post::objects().order_by(&["title"]).unwrap().limit(0);
    assert!(empty.all(db).unwrap().is_empty());
    assert!(empty.first(db).unwrap().is_none());
}

#[test]
fn test_contains_is_case_sensitive() {
    let temp = TempDb::with_blog();
    let db = &temp.db;

    assert_eq!(Post::objects().filter(q!(title__contains = "async")).unwrap().count(db).unwrap(), 0);
    assert_eq!(Post::objects().filter(q!(title__contains = "Async")).unwrap().count(db).unwrap(), 1);
    assert_eq!(Post::objects().filter(q!(title__icontains = "async")).unwrap().count(db).unwrap(), 1);
}

#[test]
fn test_substring_lookups_treat_wildcards_literally() {
    let temp = TempDb::with_blog();
    let db = &temp.db;
    let count = |q: Q| Post::objects().filter(q).unwrap().count(db).unwrap();

    assert_eq!((count(q!(title__contains = "%")), count(q!(title__contains = "_"))), (0, 0));
    assert_eq!((count(q!(title__icontains = "%")), count(q!(title__icontains = "_"))), (0, 0));

    Post::objects().create(db, Post::new("50% off_sale", 1)).unwrap();
    assert_eq!(count(q!(title__contains = "%")), 1);
    assert_eq!(count(q!(title__contains = "f_s")), 1);
    assert_eq!(count(q!(title__icontains = "OFF_")), 1);
    assert_eq!(count(q!(title__contains = "o_f")), 0);
}

#[test]
fn test_case_insensitive_lookups_fold_unicode() {
    let temp = TempDb::with_blog();
    let db = &temp.db;
    User::objects().create(db, User::new("Élodie")).unwrap();

    let exact = User::objects().filter(q!(username__iexact = "élodie")).unwrap();
    assert_eq!(exact.one(db).unwrap().username, "Élodie");
    let partial = User::objects().filter(q!(username__icontains = "ÉLO")).unwrap();
    assert_eq!(partial.count(db).unwrap(), 1);
    let sensitive = User::objects().filter(q!(username__contains = "élo")).unwrap();
    assert_eq!(sensitive.count(db).unwrap(), 0);
}

#[test]
fn test_distinct_over_to_many_join() {
    let temp = TempDb::with_blog();
    let db = &temp.db;

    // Both comments are on alice's first post.
    let commented = User::objects()
        .filter(q!(posts__comments__body__icontains = "t"))
        .unwrap();
    assert_eq!(commented.count(db).unwrap(), 2);
    assert_eq!(commented.distinct().count(db).unwrap(), 1);
}

#[test]
fn test_get_and_get_or_none() {
    let temp = TempDb::with_blog();
    let db = &temp.db;

    let post = Post::objects().get(db, q!(title = "Borrowing in depth")).unwrap();
    assert!(!post.published);

    assert!(Post::objects().get_or_none(db, q!(id = 999)).unwrap().is_none());
    let err = Post::objects().get(db, q!(id = 999)).unwrap_err();
    assert!(matches!(err, AtriumError::NotFound(_)));

    let err = Post::objects().get(db, q!(author__username = "alice")).unwrap_err();
    assert!(matches!(err, AtriumError::MultipleResults(_)));
}

#[test]
fn test_construction_errors_before_execution() {
    let temp = TempDb::with_blog();

    let err = Comment::objects().filter(q!(post__editor__username = "x")).unwrap_err();
    assert!(matches!(
        err,
        AtriumError::UnknownRelationship { ref model, ref name, .. }
            if model == "blog.Post" && name == "editor"
    ));
    let err = Comment::objects().filter(q!(post__rating = 5)).unwrap_err();
    assert!(matches!(err, AtriumError::UnknownAttribute { ref name, .. } if name == "rating"));

    // Nothing ran, so the data is unchanged.
    assert_eq!(Comment::objects().all().count(&temp.db).unwrap(), 2);
}

#[tokio::test]
async fn test_async_terminals() {
    let temp = TempDb::with_blog();
    let db = &temp.db;

    let alice = Post::objects().filter(q!(author__username = "alice")).unwrap();
    assert_eq!(alice.acount(db).await.unwrap(), 2);
    assert!(alice.aexists(db).await.unwrap());
    assert_eq!(alice.aall(db).await.unwrap().len(), 2);

    let post = Post::objects().aget(db, q!(title = "Async for beginners")).await.unwrap();
    assert!(post.published);
    assert!(Post::objects().aget_or_none(db, q!(id = 999)).await.unwrap().is_none());
    assert_eq!(Post::objects().alist(db).await.unwrap().len(), 3);
    assert!(Post::objects()
        .filter(q!(title = "missing"))
        .unwrap()
        .afirst(db)
        .await
        .unwrap()
        .is_none());
}
