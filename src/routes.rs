use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse, Resource};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ok, ApiError};
use crate::hierarchy;
use crate::models::*;
use crate::query::QueryParams;
use crate::repo::{PostScope, Repo, RepoError, ThreadScope};
use crate::tree::{self, PostListing, SortMode};

/// Registers `/name/` and `/name` so clients may omit the trailing slash.
fn res(name: &str) -> Resource {
    web::resource(vec![format!("/{name}/"), format!("/{name}")])
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default().error_handler(|err, _req| ApiError::Invalid(err.to_string()).into()),
    );
    cfg.service(
        web::scope("/db/api")
            .service(res("clear").route(web::post().to(clear)))
            .service(res("status").route(web::get().to(status)))
            .service(
                web::scope("/forum")
                    .service(res("create").route(web::post().to(forum_create)))
                    .service(res("details").route(web::get().to(forum_details)))
                    .service(res("listPosts").route(web::get().to(forum_list_posts)))
                    .service(res("listThreads").route(web::get().to(forum_list_threads)))
                    .service(res("listUsers").route(web::get().to(forum_list_users))),
            )
            .service(
                web::scope("/thread")
                    .service(res("create").route(web::post().to(thread_create)))
                    .service(res("details").route(web::get().to(thread_details)))
                    .service(res("close").route(web::post().to(thread_close)))
                    .service(res("open").route(web::post().to(thread_open)))
                    .service(res("list").route(web::get().to(thread_list)))
                    .service(res("listPosts").route(web::get().to(thread_list_posts)))
                    .service(res("remove").route(web::post().to(thread_remove)))
                    .service(res("restore").route(web::post().to(thread_restore)))
                    .service(res("subscribe").route(web::post().to(thread_subscribe)))
                    .service(res("unsubscribe").route(web::post().to(thread_unsubscribe)))
                    .service(res("update").route(web::post().to(thread_update)))
                    .service(res("vote").route(web::post().to(thread_vote))),
            )
            .service(
                web::scope("/post")
                    .service(res("create").route(web::post().to(post_create)))
                    .service(res("details").route(web::get().to(post_details)))
                    .service(res("list").route(web::get().to(post_list)))
                    .service(res("remove").route(web::post().to(post_remove)))
                    .service(res("restore").route(web::post().to(post_restore)))
                    .service(res("update").route(web::post().to(post_update)))
                    .service(res("vote").route(web::post().to(post_vote))),
            )
            .service(
                web::scope("/user")
                    .service(res("create").route(web::post().to(user_create)))
                    .service(res("details").route(web::get().to(user_details)))
                    .service(res("follow").route(web::post().to(user_follow)))
                    .service(res("unfollow").route(web::post().to(user_unfollow)))
                    .service(res("listFollowers").route(web::get().to(user_list_followers)))
                    .service(res("listFollowing").route(web::get().to(user_list_following)))
                    .service(res("listPosts").route(web::get().to(user_list_posts)))
                    .service(res("updateProfile").route(web::post().to(user_update_profile))),
            ),
    );
}

#[derive(Clone)]
pub struct AppState { pub repo: Arc<dyn Repo> }

fn query(req: &HttpRequest) -> QueryParams {
    QueryParams::parse(req.query_string())
}

// ---------------- related-entity expansion -----------------------

#[derive(Debug, Default, Clone, Copy)]
struct Related { user: bool, forum: bool, thread: bool }

impl Related {
    /// Collects the recognised `related` values; others are ignored.
    fn parse(q: &QueryParams) -> Self {
        let mut rel = Related::default();
        for v in q.all("related") {
            match v {
                "user" => rel.user = true,
                "forum" => rel.forum = true,
                "thread" => rel.thread = true,
                _ => {}
            }
        }
        rel
    }

    /// Like `parse`, but any value outside `allowed` is a bad request.
    fn parse_only(q: &QueryParams, allowed: &[&str]) -> Result<Self, ApiError> {
        if let Some(bad) = q.all("related").into_iter().find(|v| !allowed.contains(v)) {
            return Err(ApiError::BadRequest(format!("cannot expand '{bad}' here")));
        }
        Ok(Self::parse(q))
    }
}

async fn expand_post(repo: &dyn Repo, post: &Post, rel: Related, forum: Option<&Forum>) -> Result<Value, ApiError> {
    let mut v = serde_json::to_value(post)?;
    if rel.user {
        v["user"] = serde_json::to_value(repo.user_details(&post.user).await?)?;
    }
    if rel.forum {
        v["forum"] = match forum {
            Some(f) => serde_json::to_value(f)?,
            None => serde_json::to_value(repo.get_forum(&post.forum).await?)?,
        };
    }
    if rel.thread {
        v["thread"] = serde_json::to_value(repo.get_thread(post.thread).await?)?;
    }
    Ok(v)
}

async fn expand_thread(repo: &dyn Repo, thread: &Thread, rel: Related, forum: Option<&Forum>) -> Result<Value, ApiError> {
    let mut v = serde_json::to_value(thread)?;
    if rel.user {
        v["user"] = serde_json::to_value(repo.user_details(&thread.user).await?)?;
    }
    if rel.forum {
        v["forum"] = match forum {
            Some(f) => serde_json::to_value(f)?,
            None => serde_json::to_value(repo.get_forum(&thread.forum).await?)?,
        };
    }
    Ok(v)
}

async fn details_of(repo: &dyn Repo, emails: Vec<String>) -> Result<Vec<UserDetails>, ApiError> {
    let mut out = Vec::with_capacity(emails.len());
    for email in emails {
        out.push(repo.user_details(&email).await?);
    }
    Ok(out)
}

/// Relations are idempotent: repeating a follow/subscribe is not an error.
fn ignore_conflict(r: Result<(), RepoError>) -> Result<(), ApiError> {
    match r {
        Ok(()) | Err(RepoError::Conflict) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ---------------- common -----------------------------------------

pub async fn clear(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    data.repo.clear().await?;
    tracing::warn!("all tables cleared");
    Ok(ok("OK"))
}

#[utoipa::path(
    get,
    path = "/db/api/status/",
    responses((status = 200, description = "Row counts per entity", body = Status))
)]
pub async fn status(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(ok(data.repo.status().await?))
}

// ---------------- forum ------------------------------------------

#[utoipa::path(
    post,
    path = "/db/api/forum/create/",
    request_body = NewForum,
    responses((status = 200, description = "Created forum, or code 5 when the short name is taken", body = Forum))
)]
pub async fn forum_create(data: web::Data<AppState>, payload: web::Json<NewForum>) -> Result<HttpResponse, ApiError> {
    let forum = data.repo.create_forum(payload.into_inner()).await?;
    Ok(ok(forum))
}

pub async fn forum_details(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let q = query(&req);
    let forum = data.repo.get_forum(q.require("forum")?).await?;
    let mut v = serde_json::to_value(&forum)?;
    if Related::parse(&q).user {
        v["user"] = serde_json::to_value(data.repo.user_details(&forum.user).await?)?;
    }
    Ok(ok(v))
}

pub async fn forum_list_posts(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let q = query(&req);
    let short_name = q.require("forum")?;
    let rel = Related::parse(&q);
    let forum = if rel.forum { Some(data.repo.get_forum(short_name).await?) } else { None };
    let posts = data.repo.list_posts(PostScope::Forum(short_name), &q.list_params()?).await?;
    let mut out = Vec::with_capacity(posts.len());
    for p in &posts {
        out.push(expand_post(&*data.repo, p, rel, forum.as_ref()).await?);
    }
    Ok(ok(out))
}

pub async fn forum_list_threads(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let q = query(&req);
    let short_name = q.require("forum")?;
    let rel = Related::parse(&q);
    let forum = if rel.forum { Some(data.repo.get_forum(short_name).await?) } else { None };
    let threads = data.repo.list_threads(ThreadScope::Forum(short_name), &q.list_params()?).await?;
    let mut out = Vec::with_capacity(threads.len());
    for t in &threads {
        out.push(expand_thread(&*data.repo, t, rel, forum.as_ref()).await?);
    }
    Ok(ok(out))
}

pub async fn forum_list_users(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let q = query(&req);
    let users = data.repo.list_forum_users(q.require("forum")?, &q.id_list_params()?).await?;
    let emails = users.into_iter().map(|u| u.email).collect();
    Ok(ok(details_of(&*data.repo, emails).await?))
}

// ---------------- thread -----------------------------------------

#[derive(Debug, Deserialize)]
pub struct ThreadRef { pub thread: Id }

#[derive(Debug, Deserialize)]
pub struct ThreadVote { pub thread: Id, pub vote: i64 }

#[utoipa::path(
    post,
    path = "/db/api/thread/create/",
    request_body = NewThread,
    responses((status = 200, description = "Created thread", body = Thread))
)]
pub async fn thread_create(data: web::Data<AppState>, payload: web::Json<NewThread>) -> Result<HttpResponse, ApiError> {
    let thread = data.repo.create_thread(payload.into_inner()).await?;
    Ok(ok(thread))
}

pub async fn thread_details(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let q = query(&req);
    let rel = Related::parse_only(&q, &["user", "forum"])?;
    let thread = data.repo.get_thread(q.require_id("thread")?).await?;
    Ok(ok(expand_thread(&*data.repo, &thread, rel, None).await?))
}

pub async fn thread_close(data: web::Data<AppState>, payload: web::Json<ThreadRef>) -> Result<HttpResponse, ApiError> {
    data.repo.set_thread_closed(payload.thread, true).await?;
    Ok(ok(json!({ "thread": payload.thread })))
}

pub async fn thread_open(data: web::Data<AppState>, payload: web::Json<ThreadRef>) -> Result<HttpResponse, ApiError> {
    data.repo.set_thread_closed(payload.thread, false).await?;
    Ok(ok(json!({ "thread": payload.thread })))
}

pub async fn thread_list(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let q = query(&req);
    let scope = match (q.get("forum"), q.get("user")) {
        (Some(f), _) => ThreadScope::Forum(f),
        (None, Some(u)) => ThreadScope::User(u),
        (None, None) => return Err(ApiError::Invalid("either 'forum' or 'user' is required".into())),
    };
    Ok(ok(data.repo.list_threads(scope, &q.list_params()?).await?))
}

#[utoipa::path(
    get,
    path = "/db/api/thread/listPosts/",
    params(
        ("thread" = Id, Query, description = "Thread id"),
        ("since" = Option<String>, Query, description = "Inclusive lower date bound, YYYY-MM-DD HH:MM:SS"),
        ("order" = Option<String>, Query, description = "asc | desc (default desc)"),
        ("limit" = Option<u64>, Query, description = "Row cap; for parent_tree, the number of root trees"),
        ("sort" = Option<String>, Query, description = "flat (default) | tree | parent_tree")
    ),
    responses((status = 200, description = "Posts of the thread in the requested order", body = [Post]))
)]
pub async fn thread_list_posts(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let q = query(&req);
    let listing = PostListing {
        thread: q.require_id("thread")?,
        since: q.since()?,
        order: q.order(),
        limit: q.limit(),
        sort: SortMode::parse(q.get("sort")),
    };
    let posts = tree::list_thread_posts(&*data.repo, &listing).await?;
    Ok(ok(posts))
}

pub async fn thread_remove(data: web::Data<AppState>, payload: web::Json<ThreadRef>) -> Result<HttpResponse, ApiError> {
    data.repo.remove_thread(payload.thread).await?;
    Ok(ok(json!({ "thread": payload.thread })))
}

pub async fn thread_restore(data: web::Data<AppState>, payload: web::Json<ThreadRef>) -> Result<HttpResponse, ApiError> {
    data.repo.restore_thread(payload.thread).await?;
    Ok(ok(json!({ "thread": payload.thread })))
}

pub async fn thread_subscribe(data: web::Data<AppState>, payload: web::Json<Subscription>) -> Result<HttpResponse, ApiError> {
    data.repo.get_thread(payload.thread).await?;
    ignore_conflict(data.repo.subscribe(&payload).await)?;
    Ok(ok(payload.into_inner()))
}

pub async fn thread_unsubscribe(data: web::Data<AppState>, payload: web::Json<Subscription>) -> Result<HttpResponse, ApiError> {
    data.repo.unsubscribe(&payload).await?;
    Ok(ok(payload.into_inner()))
}

pub async fn thread_update(data: web::Data<AppState>, payload: web::Json<UpdateThread>) -> Result<HttpResponse, ApiError> {
    Ok(ok(data.repo.update_thread(payload.into_inner()).await?))
}

pub async fn thread_vote(data: web::Data<AppState>, payload: web::Json<ThreadVote>) -> Result<HttpResponse, ApiError> {
    Ok(ok(data.repo.vote_thread(payload.thread, Vote::from_value(payload.vote)).await?))
}

// ---------------- post -------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PostRef { pub post: Id }

#[derive(Debug, Deserialize)]
pub struct PostVote { pub post: Id, pub vote: i64 }

#[utoipa::path(
    post,
    path = "/db/api/post/create/",
    request_body = NewPost,
    responses((status = 200, description = "Created post with its tree path; code 1 when the parent does not exist", body = Post))
)]
pub async fn post_create(data: web::Data<AppState>, payload: web::Json<NewPost>) -> Result<HttpResponse, ApiError> {
    let post = hierarchy::create_post(&*data.repo, payload.into_inner()).await?;
    Ok(ok(post))
}

#[utoipa::path(
    get,
    path = "/db/api/post/details/",
    params(
        ("post" = Id, Query, description = "Post id"),
        ("related" = Option<String>, Query, description = "Repeatable: user | thread | forum")
    ),
    responses((status = 200, description = "Post, or code 1 when missing", body = Post))
)]
pub async fn post_details(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let q = query(&req);
    let id = q.require_id("post")?;
    let post = data.repo.get_post(id).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::NotFound(format!("post {id} not found")),
        other => other.into(),
    })?;
    Ok(ok(expand_post(&*data.repo, &post, Related::parse(&q), None).await?))
}

pub async fn post_list(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let q = query(&req);
    let scope = match (q.get("forum"), q.get("thread")) {
        (Some(f), _) => PostScope::Forum(f),
        (None, Some(_)) => PostScope::Thread(q.require_id("thread")?),
        (None, None) => return Err(ApiError::Invalid("either 'forum' or 'thread' is required".into())),
    };
    Ok(ok(data.repo.list_posts(scope, &q.list_params()?).await?))
}

pub async fn post_remove(data: web::Data<AppState>, payload: web::Json<PostRef>) -> Result<HttpResponse, ApiError> {
    if let Some(thread) = data.repo.set_post_deleted(payload.post, true).await? {
        data.repo.adjust_thread_posts(thread, -1).await?;
    }
    Ok(ok(json!({ "post": payload.post })))
}

pub async fn post_restore(data: web::Data<AppState>, payload: web::Json<PostRef>) -> Result<HttpResponse, ApiError> {
    if let Some(thread) = data.repo.set_post_deleted(payload.post, false).await? {
        data.repo.adjust_thread_posts(thread, 1).await?;
    }
    Ok(ok(json!({ "post": payload.post })))
}

pub async fn post_update(data: web::Data<AppState>, payload: web::Json<UpdatePost>) -> Result<HttpResponse, ApiError> {
    Ok(ok(data.repo.update_post_message(payload.into_inner()).await?))
}

pub async fn post_vote(data: web::Data<AppState>, payload: web::Json<PostVote>) -> Result<HttpResponse, ApiError> {
    Ok(ok(data.repo.vote_post(payload.post, Vote::from_value(payload.vote)).await?))
}

// ---------------- user -------------------------------------------

#[utoipa::path(
    post,
    path = "/db/api/user/create/",
    request_body = NewUser,
    responses((status = 200, description = "Created user, or code 5 when the email is taken", body = User))
)]
pub async fn user_create(data: web::Data<AppState>, payload: web::Json<NewUser>) -> Result<HttpResponse, ApiError> {
    match data.repo.create_user(payload.into_inner()).await {
        Ok(user) => Ok(ok(user)),
        Err(RepoError::Conflict) => Err(ApiError::Conflict("User already exists".into())),
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    get,
    path = "/db/api/user/details/",
    params(("user" = String, Query, description = "User email")),
    responses((status = 200, description = "User with followers, following and subscriptions", body = UserDetails))
)]
pub async fn user_details(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let q = query(&req);
    Ok(ok(data.repo.user_details(q.require("user")?).await?))
}

pub async fn user_follow(data: web::Data<AppState>, payload: web::Json<Follow>) -> Result<HttpResponse, ApiError> {
    ignore_conflict(data.repo.follow(&payload).await)?;
    Ok(ok(data.repo.user_details(&payload.follower).await?))
}

pub async fn user_unfollow(data: web::Data<AppState>, payload: web::Json<Follow>) -> Result<HttpResponse, ApiError> {
    data.repo.unfollow(&payload).await?;
    Ok(ok(data.repo.user_details(&payload.follower).await?))
}

pub async fn user_list_followers(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let q = query(&req);
    let emails = data.repo.list_followers(q.require("user")?, &q.id_list_params()?).await?;
    Ok(ok(details_of(&*data.repo, emails).await?))
}

pub async fn user_list_following(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let q = query(&req);
    let emails = data.repo.list_following(q.require("user")?, &q.id_list_params()?).await?;
    Ok(ok(details_of(&*data.repo, emails).await?))
}

pub async fn user_list_posts(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let q = query(&req);
    Ok(ok(data.repo.list_posts(PostScope::User(q.require("user")?), &q.list_params()?).await?))
}

pub async fn user_update_profile(data: web::Data<AppState>, payload: web::Json<UpdateProfile>) -> Result<HttpResponse, ApiError> {
    let upd = payload.into_inner();
    let email = upd.user.clone();
    data.repo.update_profile(upd).await?;
    Ok(ok(data.repo.user_details(&email).await?))
}
