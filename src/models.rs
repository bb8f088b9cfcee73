use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

/// Wire format for every timestamp the API accepts or returns.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn parse_date(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

pub mod date_format {
    use super::DATE_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.format(DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, DATE_FORMAT).map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Forum {
    pub id: Id,
    pub name: String,
    pub short_name: String,
    #[sqlx(rename = "user_email")]
    pub user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewForum {
    pub name: String,
    pub short_name: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub about: Option<String>,
    pub email: String,
    #[serde(rename = "isAnonymous")]
    pub is_anonymous: bool,
    pub name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewUser {
    #[serde(default)]
    pub about: Option<String>,
    pub email: String,
    #[serde(rename = "isAnonymous", default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// A user together with its follow graph and thread subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserDetails {
    #[serde(flatten)]
    pub user: User,
    pub followers: Vec<String>,
    pub following: Vec<String>,
    pub subscriptions: Vec<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateProfile {
    pub user: String,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Follow {
    pub follower: String,
    pub followee: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Thread {
    pub id: Id,
    #[serde(with = "date_format")]
    #[schema(value_type = String, example = "2014-01-01 00:00:01")]
    pub date: NaiveDateTime,
    pub dislikes: i64,
    pub forum: String,
    #[serde(rename = "isClosed")]
    pub is_closed: bool,
    #[serde(rename = "isDeleted")]
    pub is_deleted: bool,
    pub likes: i64,
    pub message: String,
    pub points: i64,
    pub posts: i64,
    pub slug: String,
    pub title: String,
    #[sqlx(rename = "user_email")]
    pub user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewThread {
    pub forum: String,
    pub title: String,
    #[serde(rename = "isClosed", default)]
    pub is_closed: bool,
    pub user: String,
    #[serde(with = "date_format")]
    #[schema(value_type = String)]
    pub date: NaiveDateTime,
    pub message: String,
    pub slug: String,
    #[serde(rename = "isDeleted", default)]
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateThread {
    pub thread: Id,
    pub message: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Post {
    pub id: Id,
    #[serde(with = "date_format")]
    #[schema(value_type = String, example = "2014-01-01 00:00:01")]
    pub date: NaiveDateTime,
    pub dislikes: i64,
    pub forum: String,
    #[serde(rename = "isApproved")]
    pub is_approved: bool,
    #[serde(rename = "isDeleted")]
    pub is_deleted: bool,
    #[serde(rename = "isEdited")]
    pub is_edited: bool,
    #[serde(rename = "isHighlighted")]
    pub is_highlighted: bool,
    #[serde(rename = "isSpam")]
    pub is_spam: bool,
    pub likes: i64,
    pub message: String,
    pub parent: Option<Id>,
    pub points: i64,
    pub thread: Id,
    #[sqlx(rename = "user_email")]
    pub user: String,
    /// Id of the top-level post this reply tree hangs off (itself for roots).
    pub first_path: Id,
    /// Dot-separated encoded ids from the root's child down to this post.
    pub last_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPost {
    #[serde(with = "date_format")]
    #[schema(value_type = String)]
    pub date: NaiveDateTime,
    pub forum: String,
    pub thread: Id,
    pub user: String,
    pub message: String,
    #[serde(default)]
    pub parent: Option<Id>,
    #[serde(rename = "isApproved", default)]
    pub is_approved: bool,
    #[serde(rename = "isDeleted", default)]
    pub is_deleted: bool,
    #[serde(rename = "isEdited", default)]
    pub is_edited: bool,
    #[serde(rename = "isHighlighted", default)]
    pub is_highlighted: bool,
    #[serde(rename = "isSpam", default)]
    pub is_spam: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdatePost {
    pub post: Id,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Subscription {
    pub thread: Id,
    pub user: String,
}

/// Direction of a like/dislike request; a zero vote maps to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Like,
    Dislike,
}

impl Vote {
    pub fn from_value(v: i64) -> Option<Self> {
        match v {
            v if v > 0 => Some(Vote::Like),
            v if v < 0 => Some(Vote::Dislike),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Status {
    pub forum: i64,
    pub post: i64,
    pub user: i64,
    pub thread: i64,
}
