#![cfg(feature = "inmem-store")]

use actix_web::{test, web, App};
use forumdb::repo::inmem::InMemRepo;
use forumdb::routes::{config, AppState};
use serde_json::{json, Value};
use serial_test::serial;
use std::sync::Arc;

macro_rules! app {
    () => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(AppState { repo: Arc::new(InMemRepo::new()) }))
                .configure(config),
        )
        .await
    };
}

macro_rules! get {
    ($app:expr, $uri:expr) => {{
        let req = test::TestRequest::get().uri($uri).to_request();
        let resp = test::call_service(&$app, req).await;
        assert!(resp.status().is_success());
        let v: Value = test::read_body_json(resp).await;
        v
    }};
}

macro_rules! post {
    ($app:expr, $uri:expr, $body:expr) => {{
        let req = test::TestRequest::post().uri($uri).set_json($body).to_request();
        let resp = test::call_service(&$app, req).await;
        assert!(resp.status().is_success());
        let v: Value = test::read_body_json(resp).await;
        v
    }};
}

fn new_post(thread: i64, parent: Option<i64>, second: u32) -> Value {
    json!({
        "date": format!("2014-01-01 00:00:{second:02}"),
        "thread": thread,
        "message": "hello",
        "user": "a@mail.ru",
        "forum": "forum1",
        "parent": parent,
    })
}

macro_rules! seed {
    ($app:expr) => {{
        let u = post!($app, "/db/api/user/create/", json!({
            "username": "alice", "about": "hi", "name": "Alice", "email": "a@mail.ru", "isAnonymous": false
        }));
        assert_eq!(u["code"], 0);
        let f = post!($app, "/db/api/forum/create/", json!({
            "name": "Forum One", "short_name": "forum1", "user": "a@mail.ru"
        }));
        assert_eq!(f["code"], 0);
        let t = post!($app, "/db/api/thread/create/", json!({
            "forum": "forum1", "title": "Thread", "isClosed": false, "user": "a@mail.ru",
            "date": "2014-01-01 00:00:00", "message": "m", "slug": "thread", "isDeleted": false
        }));
        assert_eq!(t["code"], 0);
        t["response"]["id"].as_i64().unwrap()
    }};
}

#[actix_web::test]
#[serial]
async fn duplicate_user_is_code_5() {
    let app = app!();
    seed!(app);
    let again = post!(app, "/db/api/user/create/", json!({ "email": "a@mail.ru" }));
    assert_eq!(again["code"], 5);
}

#[actix_web::test]
#[serial]
async fn post_create_returns_paths() {
    let app = app!();
    let t = seed!(app);

    let root = post!(app, "/db/api/post/create/", new_post(t, None, 1));
    assert_eq!(root["code"], 0);
    assert_eq!(root["response"]["first_path"], 1);
    assert_eq!(root["response"]["last_path"], "");

    let child = post!(app, "/db/api/post/create", new_post(t, Some(1), 2));
    assert_eq!(child["response"]["last_path"], ".002");
    assert_eq!(child["response"]["parent"], 1);

    let orphan = post!(app, "/db/api/post/create/", new_post(t, Some(999), 3));
    assert_eq!(orphan["code"], 1);

    let homeless = post!(app, "/db/api/post/create/", new_post(77, None, 4));
    assert_eq!(homeless["code"], 1);
    let s = get!(app, "/db/api/status/");
    assert_eq!(s["response"]["post"], 2);

    let th = get!(app, &format!("/db/api/thread/details/?thread={t}"));
    assert_eq!(th["response"]["posts"], 2);
}

#[actix_web::test]
#[serial]
async fn thread_list_posts_parent_tree() {
    let app = app!();
    let t = seed!(app);
    // trees of sizes 2, 3, 1
    post!(app, "/db/api/post/create/", new_post(t, None, 1));
    post!(app, "/db/api/post/create/", new_post(t, Some(1), 2));
    post!(app, "/db/api/post/create/", new_post(t, None, 3));
    post!(app, "/db/api/post/create/", new_post(t, Some(3), 4));
    post!(app, "/db/api/post/create/", new_post(t, Some(4), 5));
    post!(app, "/db/api/post/create/", new_post(t, None, 6));

    let v = get!(app, &format!("/db/api/thread/listPosts/?thread={t}&sort=parent_tree&limit=2&order=asc"));
    assert_eq!(v["code"], 0);
    let ids: Vec<i64> = v["response"].as_array().unwrap().iter().map(|p| p["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);

    let all = get!(app, &format!("/db/api/thread/listPosts/?thread={t}&sort=parent_tree"));
    assert_eq!(all["response"].as_array().unwrap().len(), 6);

    let none = get!(app, &format!("/db/api/thread/listPosts/?thread={t}&sort=parent_tree&limit=abc"));
    assert!(none["response"].as_array().unwrap().is_empty());

    let tree = get!(app, &format!("/db/api/thread/listPosts/?thread={t}&sort=tree&order=desc"));
    let ids: Vec<i64> = tree["response"].as_array().unwrap().iter().map(|p| p["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![6, 3, 4, 5, 1, 2]);

    let flat = get!(app, &format!("/db/api/thread/listPosts/?thread={t}&limit=1"));
    assert_eq!(flat["response"][0]["id"], 6);
}

#[actix_web::test]
#[serial]
async fn bad_parameters_are_code_2() {
    let app = app!();
    let t = seed!(app);
    let v = get!(app, "/db/api/thread/listPosts/?thread=abc");
    assert_eq!(v["code"], 2);
    let v = get!(app, &format!("/db/api/thread/listPosts/?thread={t}&since=yesterday"));
    assert_eq!(v["code"], 2);
    let v = get!(app, "/db/api/thread/list/");
    assert_eq!(v["code"], 2);
    let v = post!(app, "/db/api/post/create/", json!({ "thread": t }));
    assert_eq!(v["code"], 2);
}

#[actix_web::test]
#[serial]
async fn related_expansion() {
    let app = app!();
    let t = seed!(app);
    post!(app, "/db/api/post/create/", new_post(t, None, 1));

    let v = get!(app, "/db/api/post/details/?post=1&related=user&related=thread&related=forum");
    assert_eq!(v["code"], 0);
    assert_eq!(v["response"]["user"]["email"], "a@mail.ru");
    assert_eq!(v["response"]["user"]["followers"], json!([]));
    assert_eq!(v["response"]["thread"]["id"], t);
    assert_eq!(v["response"]["forum"]["short_name"], "forum1");

    let plain = get!(app, "/db/api/post/details/?post=1");
    assert_eq!(plain["response"]["user"], "a@mail.ru");

    let bad = get!(app, &format!("/db/api/thread/details/?thread={t}&related=thread"));
    assert_eq!(bad["code"], 3);

    let missing = get!(app, "/db/api/post/details/?post=404");
    assert_eq!(missing["code"], 1);
}

#[actix_web::test]
#[serial]
async fn post_remove_restore_adjusts_thread_counter() {
    let app = app!();
    let t = seed!(app);
    post!(app, "/db/api/post/create/", new_post(t, None, 1));
    post!(app, "/db/api/post/create/", new_post(t, None, 2));

    let v = post!(app, "/db/api/post/remove/", json!({ "post": 1 }));
    assert_eq!(v["response"]["post"], 1);
    post!(app, "/db/api/post/remove/", json!({ "post": 1 }));
    let th = get!(app, &format!("/db/api/thread/details/?thread={t}"));
    assert_eq!(th["response"]["posts"], 1);

    post!(app, "/db/api/post/restore/", json!({ "post": 1 }));
    let th = get!(app, &format!("/db/api/thread/details/?thread={t}"));
    assert_eq!(th["response"]["posts"], 2);
}

#[actix_web::test]
#[serial]
async fn follow_and_subscribe_flow() {
    let app = app!();
    let t = seed!(app);
    post!(app, "/db/api/user/create/", json!({ "email": "b@mail.ru", "name": "Bob" }));

    let v = post!(app, "/db/api/user/follow/", json!({ "follower": "a@mail.ru", "followee": "b@mail.ru" }));
    assert_eq!(v["response"]["following"], json!(["b@mail.ru"]));
    // following twice is not an error
    let v = post!(app, "/db/api/user/follow/", json!({ "follower": "a@mail.ru", "followee": "b@mail.ru" }));
    assert_eq!(v["code"], 0);

    let v = get!(app, "/db/api/user/listFollowers/?user=b@mail.ru");
    assert_eq!(v["response"][0]["email"], "a@mail.ru");

    let v = post!(app, "/db/api/thread/subscribe/", json!({ "thread": t, "user": "b@mail.ru" }));
    assert_eq!(v["response"]["thread"], t);
    let v = get!(app, "/db/api/user/details/?user=b%40mail.ru");
    assert_eq!(v["response"]["subscriptions"], json!([t]));

    let v = post!(app, "/db/api/user/unfollow/", json!({ "follower": "a@mail.ru", "followee": "b@mail.ru" }));
    assert_eq!(v["response"]["following"], json!([]));
}

#[actix_web::test]
#[serial]
async fn status_and_clear() {
    let app = app!();
    let t = seed!(app);
    post!(app, "/db/api/post/create/", new_post(t, None, 1));

    let s = get!(app, "/db/api/status/");
    assert_eq!(s["response"], json!({ "forum": 1, "post": 1, "user": 1, "thread": 1 }));

    let c = post!(app, "/db/api/clear/", json!({}));
    assert_eq!(c["code"], 0);
    let s = get!(app, "/db/api/status");
    assert_eq!(s["response"], json!({ "forum": 0, "post": 0, "user": 0, "thread": 0 }));
}

#[actix_web::test]
#[serial]
async fn votes_and_thread_state() {
    let app = app!();
    let t = seed!(app);
    let v = post!(app, "/db/api/thread/vote/", json!({ "thread": t, "vote": 1 }));
    assert_eq!(v["response"]["points"], 1);
    let v = post!(app, "/db/api/thread/close/", json!({ "thread": t }));
    assert_eq!(v["response"]["thread"], t);
    let v = get!(app, &format!("/db/api/thread/details/?thread={t}&related=user"));
    assert_eq!(v["response"]["isClosed"], true);
    assert_eq!(v["response"]["user"]["email"], "a@mail.ru");

    let v = post!(app, "/db/api/thread/update/", json!({ "thread": t, "message": "edited", "slug": "s2" }));
    assert_eq!(v["response"]["message"], "edited");

    post!(app, "/db/api/post/create/", new_post(t, None, 1));
    let v = post!(app, "/db/api/post/vote/", json!({ "post": 1, "vote": -1 }));
    assert_eq!(v["response"]["dislikes"], 1);
    let v = post!(app, "/db/api/post/update/", json!({ "post": 1, "message": "new" }));
    assert_eq!(v["response"]["message"], "new");
}
