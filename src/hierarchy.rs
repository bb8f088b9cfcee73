//! Attaching new posts to their reply tree.

use tracing::{debug, info};

use crate::models::{Id, NewPost, Post};
use crate::path::PostPath;
use crate::repo::{PostRepo, RepoError, ThreadRepo};

#[derive(thiserror::Error, Debug)]
pub enum HierarchyError {
    #[error("parent post {0} not found")]
    ParentNotFound(Id),
    #[error(transparent)]
    Storage(#[from] RepoError),
}

pub type HierarchyResult<T> = Result<T, HierarchyError>;

async fn parent_path<S: PostRepo + ?Sized>(store: &S, parent: Id) -> HierarchyResult<PostPath> {
    store.get_post_path(parent).await.map_err(|e| match e {
        RepoError::NotFound => HierarchyError::ParentNotFound(parent),
        other => other.into(),
    })
}

/// Compute and persist the path of `post_id`, which must already be stored.
///
/// The parent's path is read as it is now; existing siblings are never
/// renumbered.
pub async fn attach<S: PostRepo + ?Sized>(store: &S, post_id: Id, parent: Option<Id>) -> HierarchyResult<PostPath> {
    let path = match parent {
        None => PostPath::root(post_id),
        Some(parent) => parent_path(store, parent).await?.child(post_id),
    };
    store.set_post_path(post_id, &path).await?;
    debug!(post_id, first_path = path.first_path, last_path = %path.last_path, "attached post");
    Ok(path)
}

/// Store a new post, attach it to its tree and count it against its thread.
///
/// A post for a missing thread, or a reply to a missing parent, is rejected
/// before anything is written.
pub async fn create_post<S>(store: &S, new: NewPost) -> HierarchyResult<Post>
where
    S: PostRepo + ThreadRepo + ?Sized,
{
    store.get_thread(new.thread).await?;
    if let Some(parent) = new.parent {
        parent_path(store, parent).await?;
    }
    let thread = new.thread;
    let mut post = store.insert_post(new).await?;
    let path = attach(store, post.id, post.parent).await?;
    post.first_path = path.first_path;
    post.last_path = path.last_path;
    store.adjust_thread_posts(thread, 1).await?;
    info!(post_id = post.id, thread, "post created");
    Ok(post)
}
