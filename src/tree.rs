//! Thread post listings: flat by date, full tree, and root-limited tree.

use std::cmp::Ordering;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::models::{Id, Post};
use crate::path::compare_last_path;
use crate::repo::{ListParams, Order, PostRepo, PostScope, RepoResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortMode {
    #[default]
    Flat,
    Tree,
    ParentTree,
}

impl SortMode {
    /// Unknown values fall back to `Flat`, same as an absent `sort`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("tree") => SortMode::Tree,
            Some("parent_tree") => SortMode::ParentTree,
            _ => SortMode::Flat,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostListing {
    pub thread: Id,
    pub since: Option<NaiveDateTime>,
    pub order: Order,
    /// Row cap for `Flat`/`Tree`, root-tree cap for `ParentTree`.
    pub limit: Option<u64>,
    pub sort: SortMode,
}

/// Date order, ties broken by id.
pub fn compare_flat(a: &Post, b: &Post, order: Order) -> Ordering {
    order.apply(a.date.cmp(&b.date).then(a.id.cmp(&b.id)))
}

/// Root groups follow `order`; within a group the tree is always walked
/// depth-first ascending, so a reply subtree stays in creation order even
/// when roots are listed newest first.
pub fn compare_tree(a: &Post, b: &Post, order: Order) -> Ordering {
    order
        .apply(a.first_path.cmp(&b.first_path))
        .then_with(|| compare_last_path(&a.last_path, &b.last_path))
        .then(a.id.cmp(&b.id))
}

/// Keep the complete trees of the first `root_limit` distinct roots of a
/// path-ordered sequence.
pub fn take_root_trees(posts: Vec<Post>, root_limit: u64) -> Vec<Post> {
    let mut current: Option<Id> = None;
    let mut roots: u64 = 0;
    posts
        .into_iter()
        .take_while(|p| {
            if current != Some(p.first_path) {
                current = Some(p.first_path);
                roots += 1;
            }
            roots <= root_limit
        })
        .collect()
}

pub async fn list_flat<S: PostRepo + ?Sized>(store: &S, thread: Id, params: &ListParams) -> RepoResult<Vec<Post>> {
    store.list_posts(PostScope::Thread(thread), params).await
}

pub async fn list_tree<S: PostRepo + ?Sized>(store: &S, thread: Id, params: &ListParams) -> RepoResult<Vec<Post>> {
    store.list_posts_by_path(thread, params).await
}

/// `root_limit = None` returns every tree.
pub async fn list_root_limited<S: PostRepo + ?Sized>(
    store: &S,
    thread: Id,
    since: Option<NaiveDateTime>,
    root_limit: Option<u64>,
) -> RepoResult<Vec<Post>> {
    let params = ListParams { since, order: Order::Asc, limit: None };
    let posts = store.list_posts_by_path(thread, &params).await?;
    let fetched = posts.len();
    let posts = match root_limit {
        Some(n) => take_root_trees(posts, n),
        None => posts,
    };
    debug!(thread, fetched, kept = posts.len(), ?root_limit, "root-limited listing");
    Ok(posts)
}

pub async fn list_thread_posts<S: PostRepo + ?Sized>(store: &S, q: &PostListing) -> RepoResult<Vec<Post>> {
    let params = ListParams { since: q.since, order: q.order, limit: q.limit };
    match q.sort {
        SortMode::Flat => list_flat(store, q.thread, &params).await,
        SortMode::Tree => list_tree(store, q.thread, &params).await,
        SortMode::ParentTree => list_root_limited(store, q.thread, q.since, q.limit).await,
    }
}
