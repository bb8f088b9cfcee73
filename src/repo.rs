use chrono::NaiveDateTime;

use crate::models::*;
use crate::path::PostPath;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("storage error: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    Asc,
    #[default]
    Desc,
}

impl Order {
    /// `asc`/`desc` (any case); anything else falls back to the default.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("asc") => Order::Asc,
            _ => Order::Desc,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }

    pub fn apply(self, ord: std::cmp::Ordering) -> std::cmp::Ordering {
        match self {
            Order::Asc => ord,
            Order::Desc => ord.reverse(),
        }
    }
}

/// Date-filtered listing parameters.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub since: Option<NaiveDateTime>,
    pub order: Order,
    pub limit: Option<u64>,
}

/// Listing parameters keyed on a lower id bound (`since_id`).
#[derive(Debug, Clone, Default)]
pub struct IdListParams {
    pub since_id: Option<Id>,
    pub order: Order,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
pub enum PostScope<'a> {
    Forum(&'a str),
    Thread(Id),
    User(&'a str),
}

#[derive(Debug, Clone, Copy)]
pub enum ThreadScope<'a> {
    Forum(&'a str),
    User(&'a str),
}

use async_trait::async_trait;

#[async_trait]
pub trait ForumRepo: Send + Sync {
    async fn create_forum(&self, new: NewForum) -> RepoResult<Forum>;
    async fn get_forum(&self, short_name: &str) -> RepoResult<Forum>;
    /// Distinct authors of posts in the forum, ordered by name.
    async fn list_forum_users(&self, short_name: &str, params: &IdListParams) -> RepoResult<Vec<User>>;
}

#[async_trait]
pub trait ThreadRepo: Send + Sync {
    async fn create_thread(&self, new: NewThread) -> RepoResult<Thread>;
    async fn get_thread(&self, id: Id) -> RepoResult<Thread>;
    async fn list_threads(&self, scope: ThreadScope<'_>, params: &ListParams) -> RepoResult<Vec<Thread>>;
    async fn set_thread_closed(&self, id: Id, closed: bool) -> RepoResult<()>;
    async fn update_thread(&self, upd: UpdateThread) -> RepoResult<Thread>;
    async fn vote_thread(&self, id: Id, vote: Option<Vote>) -> RepoResult<Thread>;
    /// Flags the thread and all of its posts deleted and zeroes the post counter.
    async fn remove_thread(&self, id: Id) -> RepoResult<()>;
    /// Clears the deleted flags and recounts the thread's posts.
    async fn restore_thread(&self, id: Id) -> RepoResult<()>;
    async fn adjust_thread_posts(&self, id: Id, delta: i64) -> RepoResult<()>;
    async fn subscribe(&self, sub: &Subscription) -> RepoResult<()>;
    async fn unsubscribe(&self, sub: &Subscription) -> RepoResult<()>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Stores the row and assigns its id. Path fields are left unset until
    /// `set_post_path` runs.
    async fn insert_post(&self, new: NewPost) -> RepoResult<Post>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    async fn get_post_path(&self, id: Id) -> RepoResult<PostPath>;
    async fn set_post_path(&self, id: Id, path: &PostPath) -> RepoResult<()>;
    /// Flat listing ordered by date (ties by id).
    async fn list_posts(&self, scope: PostScope<'_>, params: &ListParams) -> RepoResult<Vec<Post>>;
    /// Thread listing ordered by `first_path` in `params.order`, then
    /// `last_path` ascending.
    async fn list_posts_by_path(&self, thread: Id, params: &ListParams) -> RepoResult<Vec<Post>>;
    async fn update_post_message(&self, upd: UpdatePost) -> RepoResult<Post>;
    async fn vote_post(&self, id: Id, vote: Option<Vote>) -> RepoResult<Post>;
    /// Returns the owning thread when the flag actually changed.
    async fn set_post_deleted(&self, id: Id, deleted: bool) -> RepoResult<Option<Id>>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, email: &str) -> RepoResult<User>;
    async fn user_details(&self, email: &str) -> RepoResult<UserDetails>;
    async fn update_profile(&self, upd: UpdateProfile) -> RepoResult<()>;
    async fn follow(&self, f: &Follow) -> RepoResult<()>;
    async fn unfollow(&self, f: &Follow) -> RepoResult<()>;
    async fn list_followers(&self, email: &str, params: &IdListParams) -> RepoResult<Vec<String>>;
    async fn list_following(&self, email: &str, params: &IdListParams) -> RepoResult<Vec<String>>;
}

#[async_trait]
pub trait AdminRepo: Send + Sync {
    async fn clear(&self) -> RepoResult<()>;
    async fn status(&self) -> RepoResult<Status>;
}

pub trait Repo: ForumRepo + ThreadRepo + PostRepo + UserRepo + AdminRepo {}

impl<T> Repo for T where T: ForumRepo + ThreadRepo + PostRepo + UserRepo + AdminRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::{Arc, RwLock};

    use crate::tree::{compare_flat, compare_tree};

    fn truncate<T>(v: &mut Vec<T>, limit: Option<u64>) {
        if let Some(limit) = limit {
            v.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
    }

    #[derive(Default)]
    struct Counters {
        forum: Id,
        thread: Id,
        post: Id,
        user: Id,
    }

    fn bump(counter: &mut Id) -> Id {
        *counter += 1;
        *counter
    }

    #[derive(Default)]
    struct State {
        forums: HashMap<Id, Forum>,
        threads: HashMap<Id, Thread>,
        posts: HashMap<Id, Post>,
        users: HashMap<Id, User>,
        follows: BTreeSet<(String, String)>,       // (follower, following)
        subscriptions: BTreeSet<(String, Id)>,     // (user, thread)
        ids: Counters,
    }

    impl State {
        fn user_by_email(&self, email: &str) -> Option<&User> {
            self.users.values().find(|u| u.email == email)
        }

        fn thread_mut(&mut self, id: Id) -> RepoResult<&mut Thread> {
            self.threads.get_mut(&id).ok_or(RepoError::NotFound)
        }

        fn post_mut(&mut self, id: Id) -> RepoResult<&mut Post> {
            self.posts.get_mut(&id).ok_or(RepoError::NotFound)
        }

        fn emails_by_id(&self, emails: impl Iterator<Item = String>, params: &IdListParams) -> Vec<String> {
            let mut v: Vec<String> = emails
                .filter(|e| match (params.since_id, self.user_by_email(e)) {
                    (Some(since), Some(u)) => u.id >= since,
                    (Some(_), None) => false,
                    (None, found) => found.is_some(),
                })
                .collect();
            v.sort_by(|a, b| params.order.apply(a.cmp(b)));
            truncate(&mut v, params.limit);
            v
        }
    }

    /// `RwLock`-guarded store for tests and local runs.
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self::default()
        }

        fn read(&self) -> RepoResult<std::sync::RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|e| RepoError::Internal(e.to_string()))
        }

        fn write(&self) -> RepoResult<std::sync::RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|e| RepoError::Internal(e.to_string()))
        }
    }

    #[async_trait]
    impl ForumRepo for InMemRepo {
        async fn create_forum(&self, new: NewForum) -> RepoResult<Forum> {
            let mut s = self.write()?;
            if s.forums.values().any(|f| f.short_name == new.short_name || f.name == new.name) {
                return Err(RepoError::Conflict);
            }
            let id = bump(&mut s.ids.forum);
            let forum = Forum { id, name: new.name, short_name: new.short_name, user: new.user };
            s.forums.insert(id, forum.clone());
            Ok(forum)
        }

        async fn get_forum(&self, short_name: &str) -> RepoResult<Forum> {
            let s = self.read()?;
            s.forums.values().find(|f| f.short_name == short_name).cloned().ok_or(RepoError::NotFound)
        }

        async fn list_forum_users(&self, short_name: &str, params: &IdListParams) -> RepoResult<Vec<User>> {
            let s = self.read()?;
            let authors: BTreeSet<&str> = s.posts.values()
                .filter(|p| p.forum == short_name)
                .map(|p| p.user.as_str())
                .collect();
            let mut v: Vec<User> = s.users.values()
                .filter(|u| authors.contains(u.email.as_str()))
                .filter(|u| params.since_id.map_or(true, |since| u.id >= since))
                .cloned()
                .collect();
            v.sort_by(|a, b| params.order.apply(a.name.cmp(&b.name).then(a.id.cmp(&b.id))));
            truncate(&mut v, params.limit);
            Ok(v)
        }
    }

    #[async_trait]
    impl ThreadRepo for InMemRepo {
        async fn create_thread(&self, new: NewThread) -> RepoResult<Thread> {
            let mut s = self.write()?;
            let id = bump(&mut s.ids.thread);
            let thread = Thread {
                id,
                date: new.date,
                dislikes: 0,
                forum: new.forum,
                is_closed: new.is_closed,
                is_deleted: new.is_deleted,
                likes: 0,
                message: new.message,
                points: 0,
                posts: 0,
                slug: new.slug,
                title: new.title,
                user: new.user,
            };
            s.threads.insert(id, thread.clone());
            Ok(thread)
        }

        async fn get_thread(&self, id: Id) -> RepoResult<Thread> {
            let s = self.read()?;
            s.threads.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn list_threads(&self, scope: ThreadScope<'_>, params: &ListParams) -> RepoResult<Vec<Thread>> {
            let s = self.read()?;
            let mut v: Vec<Thread> = s.threads.values()
                .filter(|t| match scope {
                    ThreadScope::Forum(f) => t.forum == f,
                    ThreadScope::User(u) => t.user == u,
                })
                .filter(|t| params.since.map_or(true, |since| t.date >= since))
                .cloned()
                .collect();
            v.sort_by(|a, b| params.order.apply(a.date.cmp(&b.date).then(a.id.cmp(&b.id))));
            truncate(&mut v, params.limit);
            Ok(v)
        }

        async fn set_thread_closed(&self, id: Id, closed: bool) -> RepoResult<()> {
            let mut s = self.write()?;
            s.thread_mut(id)?.is_closed = closed;
            Ok(())
        }

        async fn update_thread(&self, upd: UpdateThread) -> RepoResult<Thread> {
            let mut s = self.write()?;
            let th = s.thread_mut(upd.thread)?;
            th.message = upd.message;
            th.slug = upd.slug;
            Ok(th.clone())
        }

        async fn vote_thread(&self, id: Id, vote: Option<Vote>) -> RepoResult<Thread> {
            let mut s = self.write()?;
            let th = s.thread_mut(id)?;
            match vote {
                Some(Vote::Like) => { th.likes += 1; th.points += 1; }
                Some(Vote::Dislike) => { th.dislikes += 1; th.points -= 1; }
                None => {}
            }
            Ok(th.clone())
        }

        async fn remove_thread(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            let th = s.thread_mut(id)?;
            th.is_deleted = true;
            th.posts = 0;
            s.posts.values_mut().filter(|p| p.thread == id).for_each(|p| p.is_deleted = true);
            Ok(())
        }

        async fn restore_thread(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            if !s.threads.contains_key(&id) {
                return Err(RepoError::NotFound);
            }
            let mut count = 0;
            for p in s.posts.values_mut().filter(|p| p.thread == id) {
                p.is_deleted = false;
                count += 1;
            }
            let th = s.thread_mut(id)?;
            th.is_deleted = false;
            th.posts = count;
            Ok(())
        }

        async fn adjust_thread_posts(&self, id: Id, delta: i64) -> RepoResult<()> {
            let mut s = self.write()?;
            s.thread_mut(id)?.posts += delta;
            Ok(())
        }

        async fn subscribe(&self, sub: &Subscription) -> RepoResult<()> {
            let mut s = self.write()?;
            if !s.subscriptions.insert((sub.user.clone(), sub.thread)) {
                return Err(RepoError::Conflict);
            }
            Ok(())
        }

        async fn unsubscribe(&self, sub: &Subscription) -> RepoResult<()> {
            let mut s = self.write()?;
            s.subscriptions.remove(&(sub.user.clone(), sub.thread));
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn insert_post(&self, new: NewPost) -> RepoResult<Post> {
            let mut s = self.write()?;
            let id = bump(&mut s.ids.post);
            let post = Post {
                id,
                date: new.date,
                dislikes: 0,
                forum: new.forum,
                is_approved: new.is_approved,
                is_deleted: new.is_deleted,
                is_edited: new.is_edited,
                is_highlighted: new.is_highlighted,
                is_spam: new.is_spam,
                likes: 0,
                message: new.message,
                parent: new.parent,
                points: 0,
                thread: new.thread,
                user: new.user,
                first_path: 0,
                last_path: String::new(),
            };
            s.posts.insert(id, post.clone());
            Ok(post)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let s = self.read()?;
            s.posts.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn get_post_path(&self, id: Id) -> RepoResult<PostPath> {
            let s = self.read()?;
            s.posts.get(&id)
                .map(|p| PostPath { first_path: p.first_path, last_path: p.last_path.clone() })
                .ok_or(RepoError::NotFound)
        }

        async fn set_post_path(&self, id: Id, path: &PostPath) -> RepoResult<()> {
            let mut s = self.write()?;
            let p = s.post_mut(id)?;
            p.first_path = path.first_path;
            p.last_path = path.last_path.clone();
            Ok(())
        }

        async fn list_posts(&self, scope: PostScope<'_>, params: &ListParams) -> RepoResult<Vec<Post>> {
            let s = self.read()?;
            let mut v: Vec<Post> = s.posts.values()
                .filter(|p| match scope {
                    PostScope::Forum(f) => p.forum == f,
                    PostScope::Thread(t) => p.thread == t,
                    PostScope::User(u) => p.user == u,
                })
                .filter(|p| params.since.map_or(true, |since| p.date >= since))
                .cloned()
                .collect();
            v.sort_by(|a, b| compare_flat(a, b, params.order));
            truncate(&mut v, params.limit);
            Ok(v)
        }

        async fn list_posts_by_path(&self, thread: Id, params: &ListParams) -> RepoResult<Vec<Post>> {
            let s = self.read()?;
            let mut v: Vec<Post> = s.posts.values()
                .filter(|p| p.thread == thread)
                .filter(|p| params.since.map_or(true, |since| p.date >= since))
                .cloned()
                .collect();
            v.sort_by(|a, b| compare_tree(a, b, params.order));
            truncate(&mut v, params.limit);
            Ok(v)
        }

        async fn update_post_message(&self, upd: UpdatePost) -> RepoResult<Post> {
            let mut s = self.write()?;
            let p = s.post_mut(upd.post)?;
            p.message = upd.message;
            Ok(p.clone())
        }

        async fn vote_post(&self, id: Id, vote: Option<Vote>) -> RepoResult<Post> {
            let mut s = self.write()?;
            let p = s.post_mut(id)?;
            match vote {
                Some(Vote::Like) => { p.likes += 1; p.points += 1; }
                Some(Vote::Dislike) => { p.dislikes += 1; p.points -= 1; }
                None => {}
            }
            Ok(p.clone())
        }

        async fn set_post_deleted(&self, id: Id, deleted: bool) -> RepoResult<Option<Id>> {
            let mut s = self.write()?;
            let p = s.post_mut(id)?;
            if p.is_deleted == deleted {
                return Ok(None);
            }
            p.is_deleted = deleted;
            Ok(Some(p.thread))
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.write()?;
            if s.user_by_email(&new.email).is_some() {
                return Err(RepoError::Conflict);
            }
            let id = bump(&mut s.ids.user);
            let user = User {
                id,
                about: new.about,
                email: new.email,
                is_anonymous: new.is_anonymous,
                name: new.name,
                username: new.username,
            };
            s.users.insert(id, user.clone());
            Ok(user)
        }

        async fn get_user(&self, email: &str) -> RepoResult<User> {
            let s = self.read()?;
            s.user_by_email(email).cloned().ok_or(RepoError::NotFound)
        }

        async fn user_details(&self, email: &str) -> RepoResult<UserDetails> {
            let s = self.read()?;
            let user = s.user_by_email(email).cloned().ok_or(RepoError::NotFound)?;
            let followers = s.follows.iter().filter(|(_, to)| to == email).map(|(from, _)| from.clone()).collect();
            let following = s.follows.iter().filter(|(from, _)| from == email).map(|(_, to)| to.clone()).collect();
            let subscriptions = s.subscriptions.iter().filter(|(u, _)| u == email).map(|(_, t)| *t).collect();
            Ok(UserDetails { user, followers, following, subscriptions })
        }

        async fn update_profile(&self, upd: UpdateProfile) -> RepoResult<()> {
            let mut s = self.write()?;
            let user = s.users.values_mut().find(|u| u.email == upd.user).ok_or(RepoError::NotFound)?;
            user.about = upd.about;
            user.name = upd.name;
            Ok(())
        }

        async fn follow(&self, f: &Follow) -> RepoResult<()> {
            let mut s = self.write()?;
            if !s.follows.insert((f.follower.clone(), f.followee.clone())) {
                return Err(RepoError::Conflict);
            }
            Ok(())
        }

        async fn unfollow(&self, f: &Follow) -> RepoResult<()> {
            let mut s = self.write()?;
            s.follows.remove(&(f.follower.clone(), f.followee.clone()));
            Ok(())
        }

        async fn list_followers(&self, email: &str, params: &IdListParams) -> RepoResult<Vec<String>> {
            let s = self.read()?;
            let emails = s.follows.iter().filter(|(_, to)| to == email).map(|(from, _)| from.clone());
            Ok(s.emails_by_id(emails, params))
        }

        async fn list_following(&self, email: &str, params: &IdListParams) -> RepoResult<Vec<String>> {
            let s = self.read()?;
            let emails = s.follows.iter().filter(|(from, _)| from == email).map(|(_, to)| to.clone());
            Ok(s.emails_by_id(emails, params))
        }
    }

    #[async_trait]
    impl AdminRepo for InMemRepo {
        async fn clear(&self) -> RepoResult<()> {
            let mut s = self.write()?;
            *s = State::default();
            Ok(())
        }

        async fn status(&self) -> RepoResult<Status> {
            let s = self.read()?;
            Ok(Status {
                forum: s.forums.len() as i64,
                post: s.posts.len() as i64,
                user: s.users.len() as i64,
                thread: s.threads.len() as i64,
            })
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    const FORUM_COLUMNS: &str = "id, name, short_name, user_email";
    const USER_COLUMNS: &str = "id, about, email, is_anonymous, name, username";
    const THREAD_COLUMNS: &str = "id, date, dislikes, forum, is_closed, is_deleted, likes, message, points, posts, slug, title, user_email";
    const POST_COLUMNS: &str = "id, date, dislikes, forum, is_approved, is_deleted, is_edited, is_highlighted, is_spam, likes, message, parent, points, thread, user_email, first_path, last_path";

    /// Sort key for `last_path` that compares segments numerically, so
    /// `.1000` orders after `.999`. `''` becomes the empty array, which sorts
    /// before every reply.
    const LAST_PATH_KEY: &str = "string_to_array(substr(last_path, 2), '.')::bigint[]";

    fn map_err(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => RepoError::Conflict,
            other => {
                tracing::error!(error = %other, "postgres query failed");
                RepoError::Internal(other.to_string())
            }
        }
    }

    fn limit_clause(limit: Option<u64>) -> String {
        match limit {
            Some(n) => format!(" LIMIT {}", i64::try_from(n).unwrap_or(i64::MAX)),
            None => String::new(),
        }
    }

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        pub fn pool(&self) -> &Pool<Postgres> { &self.pool }
    }

    #[async_trait]
    impl ForumRepo for PgRepo {
        async fn create_forum(&self, new: NewForum) -> RepoResult<Forum> {
            sqlx::query_as::<_, Forum>(&format!(
                "INSERT INTO forums (name, short_name, user_email) VALUES ($1,$2,$3) RETURNING {FORUM_COLUMNS}"
            ))
            .bind(&new.name).bind(&new.short_name).bind(&new.user)
            .fetch_one(&self.pool).await.map_err(map_err)
        }

        async fn get_forum(&self, short_name: &str) -> RepoResult<Forum> {
            sqlx::query_as::<_, Forum>(&format!("SELECT {FORUM_COLUMNS} FROM forums WHERE short_name = $1"))
                .bind(short_name)
                .fetch_one(&self.pool).await.map_err(map_err)
        }

        async fn list_forum_users(&self, short_name: &str, params: &IdListParams) -> RepoResult<Vec<User>> {
            let nulls = match params.order { Order::Asc => "NULLS FIRST", Order::Desc => "NULLS LAST" };
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users \
                 WHERE email IN (SELECT DISTINCT user_email FROM posts WHERE forum = $1) \
                 AND ($2::bigint IS NULL OR id >= $2) \
                 ORDER BY name {dir} {nulls}, id {dir}{limit}",
                dir = params.order.as_sql(),
                limit = limit_clause(params.limit),
            );
            sqlx::query_as::<_, User>(&sql)
                .bind(short_name).bind(params.since_id)
                .fetch_all(&self.pool).await.map_err(map_err)
        }
    }

    #[async_trait]
    impl ThreadRepo for PgRepo {
        async fn create_thread(&self, new: NewThread) -> RepoResult<Thread> {
            sqlx::query_as::<_, Thread>(&format!(
                "INSERT INTO threads (forum, user_email, title, is_closed, slug, date, message, is_deleted) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8) RETURNING {THREAD_COLUMNS}"
            ))
            .bind(&new.forum).bind(&new.user).bind(&new.title).bind(new.is_closed)
            .bind(&new.slug).bind(new.date).bind(&new.message).bind(new.is_deleted)
            .fetch_one(&self.pool).await.map_err(map_err)
        }

        async fn get_thread(&self, id: Id) -> RepoResult<Thread> {
            sqlx::query_as::<_, Thread>(&format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }

        async fn list_threads(&self, scope: ThreadScope<'_>, params: &ListParams) -> RepoResult<Vec<Thread>> {
            let (column, key) = match scope {
                ThreadScope::Forum(f) => ("forum", f),
                ThreadScope::User(u) => ("user_email", u),
            };
            let sql = format!(
                "SELECT {THREAD_COLUMNS} FROM threads WHERE {column} = $1 \
                 AND ($2::timestamp IS NULL OR date >= $2) \
                 ORDER BY date {dir}, id {dir}{limit}",
                dir = params.order.as_sql(),
                limit = limit_clause(params.limit),
            );
            sqlx::query_as::<_, Thread>(&sql)
                .bind(key).bind(params.since)
                .fetch_all(&self.pool).await.map_err(map_err)
        }

        async fn set_thread_closed(&self, id: Id, closed: bool) -> RepoResult<()> {
            let res = sqlx::query("UPDATE threads SET is_closed = $2 WHERE id = $1")
                .bind(id).bind(closed)
                .execute(&self.pool).await.map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }

        async fn update_thread(&self, upd: UpdateThread) -> RepoResult<Thread> {
            sqlx::query_as::<_, Thread>(&format!(
                "UPDATE threads SET message = $2, slug = $3 WHERE id = $1 RETURNING {THREAD_COLUMNS}"
            ))
            .bind(upd.thread).bind(&upd.message).bind(&upd.slug)
            .fetch_one(&self.pool).await.map_err(map_err)
        }

        async fn vote_thread(&self, id: Id, vote: Option<Vote>) -> RepoResult<Thread> {
            let set = match vote {
                Some(Vote::Like) => "likes = likes + 1, points = points + 1",
                Some(Vote::Dislike) => "dislikes = dislikes + 1, points = points - 1",
                None => return self.get_thread(id).await,
            };
            sqlx::query_as::<_, Thread>(&format!("UPDATE threads SET {set} WHERE id = $1 RETURNING {THREAD_COLUMNS}"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }

        async fn remove_thread(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("UPDATE threads SET is_deleted = TRUE, posts = 0 WHERE id = $1")
                .bind(id)
                .execute(&self.pool).await.map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            sqlx::query("UPDATE posts SET is_deleted = TRUE WHERE thread = $1")
                .bind(id)
                .execute(&self.pool).await.map_err(map_err)?;
            Ok(())
        }

        async fn restore_thread(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query(
                "UPDATE threads SET is_deleted = FALSE, posts = (SELECT count(*) FROM posts WHERE thread = $1) WHERE id = $1"
            )
            .bind(id)
            .execute(&self.pool).await.map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            sqlx::query("UPDATE posts SET is_deleted = FALSE WHERE thread = $1")
                .bind(id)
                .execute(&self.pool).await.map_err(map_err)?;
            Ok(())
        }

        async fn adjust_thread_posts(&self, id: Id, delta: i64) -> RepoResult<()> {
            let res = sqlx::query("UPDATE threads SET posts = posts + $2 WHERE id = $1")
                .bind(id).bind(delta)
                .execute(&self.pool).await.map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }

        async fn subscribe(&self, sub: &Subscription) -> RepoResult<()> {
            sqlx::query("INSERT INTO subscriptions (user_email, thread) VALUES ($1,$2)")
                .bind(&sub.user).bind(sub.thread)
                .execute(&self.pool).await.map_err(map_err)?;
            Ok(())
        }

        async fn unsubscribe(&self, sub: &Subscription) -> RepoResult<()> {
            sqlx::query("DELETE FROM subscriptions WHERE user_email = $1 AND thread = $2")
                .bind(&sub.user).bind(sub.thread)
                .execute(&self.pool).await.map_err(map_err)?;
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn insert_post(&self, new: NewPost) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!(
                "INSERT INTO posts (date, forum, is_approved, is_deleted, is_edited, is_highlighted, is_spam, message, parent, thread, user_email) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11) RETURNING {POST_COLUMNS}"
            ))
            .bind(new.date).bind(&new.forum).bind(new.is_approved).bind(new.is_deleted)
            .bind(new.is_edited).bind(new.is_highlighted).bind(new.is_spam).bind(&new.message)
            .bind(new.parent).bind(new.thread).bind(&new.user)
            .fetch_one(&self.pool).await.map_err(map_err)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }

        async fn get_post_path(&self, id: Id) -> RepoResult<PostPath> {
            let (first_path, last_path): (Id, String) =
                sqlx::query_as("SELECT first_path, last_path FROM posts WHERE id = $1")
                    .bind(id)
                    .fetch_one(&self.pool).await.map_err(map_err)?;
            Ok(PostPath { first_path, last_path })
        }

        async fn set_post_path(&self, id: Id, path: &PostPath) -> RepoResult<()> {
            let res = sqlx::query("UPDATE posts SET first_path = $2, last_path = $3 WHERE id = $1")
                .bind(id).bind(path.first_path).bind(&path.last_path)
                .execute(&self.pool).await.map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }

        async fn list_posts(&self, scope: PostScope<'_>, params: &ListParams) -> RepoResult<Vec<Post>> {
            let filter = match scope {
                PostScope::Forum(_) => "forum = $1",
                PostScope::Thread(_) => "thread = $1",
                PostScope::User(_) => "user_email = $1",
            };
            let sql = format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE {filter} \
                 AND ($2::timestamp IS NULL OR date >= $2) \
                 ORDER BY date {dir}, id {dir}{limit}",
                dir = params.order.as_sql(),
                limit = limit_clause(params.limit),
            );
            let q = sqlx::query_as::<_, Post>(&sql);
            let q = match scope {
                PostScope::Forum(f) => q.bind(f),
                PostScope::Thread(t) => q.bind(t),
                PostScope::User(u) => q.bind(u),
            };
            q.bind(params.since).fetch_all(&self.pool).await.map_err(map_err)
        }

        async fn list_posts_by_path(&self, thread: Id, params: &ListParams) -> RepoResult<Vec<Post>> {
            let sql = format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE thread = $1 \
                 AND ($2::timestamp IS NULL OR date >= $2) \
                 ORDER BY first_path {dir}, {LAST_PATH_KEY} ASC, id ASC{limit}",
                dir = params.order.as_sql(),
                limit = limit_clause(params.limit),
            );
            sqlx::query_as::<_, Post>(&sql)
                .bind(thread).bind(params.since)
                .fetch_all(&self.pool).await.map_err(map_err)
        }

        async fn update_post_message(&self, upd: UpdatePost) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!("UPDATE posts SET message = $2 WHERE id = $1 RETURNING {POST_COLUMNS}"))
                .bind(upd.post).bind(&upd.message)
                .fetch_one(&self.pool).await.map_err(map_err)
        }

        async fn vote_post(&self, id: Id, vote: Option<Vote>) -> RepoResult<Post> {
            let set = match vote {
                Some(Vote::Like) => "likes = likes + 1, points = points + 1",
                Some(Vote::Dislike) => "dislikes = dislikes + 1, points = points - 1",
                None => return self.get_post(id).await,
            };
            sqlx::query_as::<_, Post>(&format!("UPDATE posts SET {set} WHERE id = $1 RETURNING {POST_COLUMNS}"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }

        async fn set_post_deleted(&self, id: Id, deleted: bool) -> RepoResult<Option<Id>> {
            let flipped: Option<(Id,)> =
                sqlx::query_as("UPDATE posts SET is_deleted = $2 WHERE id = $1 AND is_deleted <> $2 RETURNING thread")
                    .bind(id).bind(deleted)
                    .fetch_optional(&self.pool).await.map_err(map_err)?;
            if let Some((thread,)) = flipped {
                return Ok(Some(thread));
            }
            // unchanged, or missing entirely
            self.get_post_path(id).await.map(|_| None)
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            sqlx::query_as::<_, User>(&format!(
                "INSERT INTO users (about, name, username, is_anonymous, email) VALUES ($1,$2,$3,$4,$5) RETURNING {USER_COLUMNS}"
            ))
            .bind(&new.about).bind(&new.name).bind(&new.username).bind(new.is_anonymous).bind(&new.email)
            .fetch_one(&self.pool).await.map_err(map_err)
        }

        async fn get_user(&self, email: &str) -> RepoResult<User> {
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
                .bind(email)
                .fetch_one(&self.pool).await.map_err(map_err)
        }

        async fn user_details(&self, email: &str) -> RepoResult<UserDetails> {
            let user = self.get_user(email).await?;
            let followers: Vec<String> = sqlx::query_scalar("SELECT follower FROM follows WHERE following = $1 ORDER BY follower")
                .bind(email).fetch_all(&self.pool).await.map_err(map_err)?;
            let following: Vec<String> = sqlx::query_scalar("SELECT following FROM follows WHERE follower = $1 ORDER BY following")
                .bind(email).fetch_all(&self.pool).await.map_err(map_err)?;
            let subscriptions: Vec<Id> = sqlx::query_scalar("SELECT thread FROM subscriptions WHERE user_email = $1 ORDER BY thread")
                .bind(email).fetch_all(&self.pool).await.map_err(map_err)?;
            Ok(UserDetails { user, followers, following, subscriptions })
        }

        async fn update_profile(&self, upd: UpdateProfile) -> RepoResult<()> {
            let res = sqlx::query("UPDATE users SET about = $2, name = $3 WHERE email = $1")
                .bind(&upd.user).bind(&upd.about).bind(&upd.name)
                .execute(&self.pool).await.map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }

        async fn follow(&self, f: &Follow) -> RepoResult<()> {
            sqlx::query("INSERT INTO follows (follower, following) VALUES ($1,$2)")
                .bind(&f.follower).bind(&f.followee)
                .execute(&self.pool).await.map_err(map_err)?;
            Ok(())
        }

        async fn unfollow(&self, f: &Follow) -> RepoResult<()> {
            sqlx::query("DELETE FROM follows WHERE follower = $1 AND following = $2")
                .bind(&f.follower).bind(&f.followee)
                .execute(&self.pool).await.map_err(map_err)?;
            Ok(())
        }

        async fn list_followers(&self, email: &str, params: &IdListParams) -> RepoResult<Vec<String>> {
            let sql = format!(
                "SELECT f.follower FROM follows f JOIN users u ON f.follower = u.email \
                 WHERE f.following = $1 AND ($2::bigint IS NULL OR u.id >= $2) \
                 ORDER BY f.follower {dir}{limit}",
                dir = params.order.as_sql(),
                limit = limit_clause(params.limit),
            );
            sqlx::query_scalar(&sql)
                .bind(email).bind(params.since_id)
                .fetch_all(&self.pool).await.map_err(map_err)
        }

        async fn list_following(&self, email: &str, params: &IdListParams) -> RepoResult<Vec<String>> {
            let sql = format!(
                "SELECT f.following FROM follows f JOIN users u ON f.following = u.email \
                 WHERE f.follower = $1 AND ($2::bigint IS NULL OR u.id >= $2) \
                 ORDER BY f.following {dir}{limit}",
                dir = params.order.as_sql(),
                limit = limit_clause(params.limit),
            );
            sqlx::query_scalar(&sql)
                .bind(email).bind(params.since_id)
                .fetch_all(&self.pool).await.map_err(map_err)
        }
    }

    #[async_trait]
    impl AdminRepo for PgRepo {
        async fn clear(&self) -> RepoResult<()> {
            sqlx::query("TRUNCATE forums, threads, posts, users, follows, subscriptions RESTART IDENTITY")
                .execute(&self.pool).await.map_err(map_err)?;
            Ok(())
        }

        async fn status(&self) -> RepoResult<Status> {
            let (forum, post, user, thread): (i64, i64, i64, i64) = sqlx::query_as(
                "SELECT (SELECT count(*) FROM forums), (SELECT count(*) FROM posts), \
                        (SELECT count(*) FROM users), (SELECT count(*) FROM threads)"
            )
            .fetch_one(&self.pool).await.map_err(map_err)?;
            Ok(Status { forum, post, user, thread })
        }
    }
}
