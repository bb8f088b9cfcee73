#![cfg(feature = "inmem-store")]

use forumdb::{
    hierarchy::create_post,
    models::{parse_date, Follow, Id, NewForum, NewPost, NewThread, NewUser, Subscription, UpdateProfile, Vote},
    repo::{inmem::InMemRepo, IdListParams, ListParams, Order, RepoError, ThreadScope},
};
// Bring trait method namespaces into scope so calls on InMemRepo resolve.
use forumdb::repo::{AdminRepo, ForumRepo, PostRepo, ThreadRepo, UserRepo};

fn user(email: &str, name: &str) -> NewUser {
    NewUser {
        about: Some("about".into()),
        email: email.into(),
        is_anonymous: false,
        name: Some(name.into()),
        username: Some(name.to_lowercase()),
    }
}

fn thread(forum: &str, author: &str, date: &str) -> NewThread {
    NewThread {
        forum: forum.into(),
        title: "title".into(),
        is_closed: false,
        user: author.into(),
        date: parse_date(date).unwrap(),
        message: "message".into(),
        slug: "slug".into(),
        is_deleted: false,
    }
}

fn post(thread: Id, author: &str, parent: Option<Id>) -> NewPost {
    NewPost {
        date: parse_date("2014-02-01 00:00:00").unwrap(),
        forum: "forum1".into(),
        thread,
        user: author.into(),
        message: "hello".into(),
        parent,
        is_approved: false,
        is_deleted: false,
        is_edited: false,
        is_highlighted: false,
        is_spam: false,
    }
}

#[tokio::test]
async fn user_create_conflict_and_profile() {
    let r = InMemRepo::new();
    let u = r.create_user(user("a@mail.ru", "Alice")).await.unwrap();
    assert_eq!(u.id, 1);
    assert!(matches!(r.create_user(user("a@mail.ru", "Other")).await, Err(RepoError::Conflict)));

    r.update_profile(UpdateProfile { user: "a@mail.ru".into(), about: None, name: Some("Alicia".into()) })
        .await
        .unwrap();
    let got = r.get_user("a@mail.ru").await.unwrap();
    assert_eq!(got.name.as_deref(), Some("Alicia"));
    assert!(got.about.is_none());

    let missing = UpdateProfile { user: "nobody@mail.ru".into(), about: None, name: None };
    assert!(matches!(r.update_profile(missing).await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn follow_graph_and_subscriptions_show_in_details() {
    let r = InMemRepo::new();
    for (e, n) in [("a@mail.ru", "A"), ("b@mail.ru", "B"), ("c@mail.ru", "C")] {
        r.create_user(user(e, n)).await.unwrap();
    }
    let t = r.create_thread(thread("forum1", "a@mail.ru", "2014-01-01 00:00:00")).await.unwrap();

    let ab = Follow { follower: "a@mail.ru".into(), followee: "b@mail.ru".into() };
    r.follow(&ab).await.unwrap();
    assert!(matches!(r.follow(&ab).await, Err(RepoError::Conflict)));
    r.follow(&Follow { follower: "c@mail.ru".into(), followee: "b@mail.ru".into() }).await.unwrap();
    r.subscribe(&Subscription { thread: t.id, user: "a@mail.ru".into() }).await.unwrap();

    let a = r.user_details("a@mail.ru").await.unwrap();
    assert_eq!(a.following, vec!["b@mail.ru"]);
    assert!(a.followers.is_empty());
    assert_eq!(a.subscriptions, vec![t.id]);

    let followers = r
        .list_followers("b@mail.ru", &IdListParams { since_id: None, order: Order::Desc, limit: None })
        .await
        .unwrap();
    assert_eq!(followers, vec!["c@mail.ru", "a@mail.ru"]);

    // since_id filters on the follower's user id
    let later = r
        .list_followers("b@mail.ru", &IdListParams { since_id: Some(2), order: Order::Asc, limit: None })
        .await
        .unwrap();
    assert_eq!(later, vec!["c@mail.ru"]);

    r.unfollow(&ab).await.unwrap();
    r.unsubscribe(&Subscription { thread: t.id, user: "a@mail.ru".into() }).await.unwrap();
    let a = r.user_details("a@mail.ru").await.unwrap();
    assert!(a.following.is_empty());
    assert!(a.subscriptions.is_empty());
}

#[tokio::test]
async fn forum_conflict_and_author_listing() {
    let r = InMemRepo::new();
    let f = NewForum { name: "Forum One".into(), short_name: "forum1".into(), user: "a@mail.ru".into() };
    r.create_forum(f.clone()).await.unwrap();
    assert!(matches!(r.create_forum(f.clone()).await, Err(RepoError::Conflict)));
    // name and short_name are each unique on their own
    let same_name = NewForum { short_name: "forum2".into(), ..f };
    assert!(matches!(r.create_forum(same_name).await, Err(RepoError::Conflict)));
    assert!(matches!(r.get_forum("nope").await, Err(RepoError::NotFound)));

    r.create_user(user("z@mail.ru", "Zed")).await.unwrap();
    r.create_user(user("a@mail.ru", "Amy")).await.unwrap();
    r.create_user(user("q@mail.ru", "Quiet")).await.unwrap();
    let t = r.create_thread(thread("forum1", "a@mail.ru", "2014-01-01 00:00:00")).await.unwrap();
    create_post(&r, post(t.id, "z@mail.ru", None)).await.unwrap();
    create_post(&r, post(t.id, "a@mail.ru", None)).await.unwrap();
    create_post(&r, post(t.id, "a@mail.ru", None)).await.unwrap();

    let users = r
        .list_forum_users("forum1", &IdListParams { since_id: None, order: Order::Asc, limit: None })
        .await
        .unwrap();
    let names: Vec<_> = users.iter().filter_map(|u| u.name.as_deref()).collect();
    assert_eq!(names, vec!["Amy", "Zed"]);

    let capped = r
        .list_forum_users("forum1", &IdListParams { since_id: None, order: Order::Desc, limit: Some(1) })
        .await
        .unwrap();
    assert_eq!(capped.len(), 1);
    assert_eq!(capped[0].email, "z@mail.ru");
}

#[tokio::test]
async fn thread_listing_filters_and_orders() {
    let r = InMemRepo::new();
    for d in ["2014-01-01 00:00:00", "2014-01-03 00:00:00", "2014-01-02 00:00:00"] {
        r.create_thread(thread("forum1", "a@mail.ru", d)).await.unwrap();
    }
    r.create_thread(thread("forum2", "b@mail.ru", "2014-01-05 00:00:00")).await.unwrap();

    let all = r
        .list_threads(ThreadScope::Forum("forum1"), &ListParams::default())
        .await
        .unwrap();
    assert_eq!(all.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2, 3, 1]);

    let since = ListParams { since: parse_date("2014-01-02 00:00:00"), order: Order::Asc, limit: Some(1) };
    let v = r.list_threads(ThreadScope::Forum("forum1"), &since).await.unwrap();
    assert_eq!(v.iter().map(|t| t.id).collect::<Vec<_>>(), vec![3]);

    let by_user = r.list_threads(ThreadScope::User("b@mail.ru"), &ListParams::default()).await.unwrap();
    assert_eq!(by_user.len(), 1);
    assert_eq!(by_user[0].forum, "forum2");
}

#[tokio::test]
async fn thread_votes_and_close() {
    let r = InMemRepo::new();
    let t = r.create_thread(thread("forum1", "a@mail.ru", "2014-01-01 00:00:00")).await.unwrap();
    r.vote_thread(t.id, Some(Vote::Like)).await.unwrap();
    r.vote_thread(t.id, Some(Vote::Like)).await.unwrap();
    let v = r.vote_thread(t.id, Some(Vote::Dislike)).await.unwrap();
    assert_eq!((v.likes, v.dislikes, v.points), (2, 1, 1));
    let same = r.vote_thread(t.id, Vote::from_value(0)).await.unwrap();
    assert_eq!(same.points, 1);

    r.set_thread_closed(t.id, true).await.unwrap();
    assert!(r.get_thread(t.id).await.unwrap().is_closed);
    assert!(matches!(r.set_thread_closed(99, true).await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn thread_remove_restore_cascades_to_posts() {
    let r = InMemRepo::new();
    let t = r.create_thread(thread("forum1", "a@mail.ru", "2014-01-01 00:00:00")).await.unwrap();
    let root = create_post(&r, post(t.id, "a@mail.ru", None)).await.unwrap();
    create_post(&r, post(t.id, "a@mail.ru", Some(root.id))).await.unwrap();
    assert_eq!(r.get_thread(t.id).await.unwrap().posts, 2);

    r.remove_thread(t.id).await.unwrap();
    let removed = r.get_thread(t.id).await.unwrap();
    assert!(removed.is_deleted);
    assert_eq!(removed.posts, 0);
    assert!(r.get_post(root.id).await.unwrap().is_deleted);

    r.restore_thread(t.id).await.unwrap();
    let restored = r.get_thread(t.id).await.unwrap();
    assert!(!restored.is_deleted);
    assert_eq!(restored.posts, 2);
    assert!(!r.get_post(root.id).await.unwrap().is_deleted);

    assert!(matches!(r.restore_thread(42).await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn post_delete_flag_reports_only_flips() {
    let r = InMemRepo::new();
    let t = r.create_thread(thread("forum1", "a@mail.ru", "2014-01-01 00:00:00")).await.unwrap();
    let p = create_post(&r, post(t.id, "a@mail.ru", None)).await.unwrap();

    assert_eq!(r.set_post_deleted(p.id, true).await.unwrap(), Some(t.id));
    assert_eq!(r.set_post_deleted(p.id, true).await.unwrap(), None);
    assert_eq!(r.set_post_deleted(p.id, false).await.unwrap(), Some(t.id));
    assert!(matches!(r.set_post_deleted(77, true).await, Err(RepoError::NotFound)));

    let v = r.vote_post(p.id, Some(Vote::Dislike)).await.unwrap();
    assert_eq!((v.dislikes, v.points), (1, -1));
}

#[tokio::test]
async fn clear_resets_rows_and_ids() {
    let r = InMemRepo::new();
    r.create_user(user("a@mail.ru", "A")).await.unwrap();
    let t = r.create_thread(thread("forum1", "a@mail.ru", "2014-01-01 00:00:00")).await.unwrap();
    create_post(&r, post(t.id, "a@mail.ru", None)).await.unwrap();

    let s = r.status().await.unwrap();
    assert_eq!((s.user, s.thread, s.post, s.forum), (1, 1, 1, 0));

    r.clear().await.unwrap();
    assert_eq!(r.status().await.unwrap(), Default::default());
    let t2 = r.create_thread(thread("forum1", "a@mail.ru", "2014-01-01 00:00:00")).await.unwrap();
    assert_eq!(t2.id, 1);
}
