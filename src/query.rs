//! Query-string access with the service's coercion rules.
//!
//! `related` may repeat (`?related=user&related=forum`), so the query is
//! decoded into ordered key/value pairs rather than a struct.

use actix_web::web;
use chrono::NaiveDateTime;

use crate::error::ApiError;
use crate::models::{parse_date, Id};
use crate::repo::{IdListParams, ListParams, Order};

#[derive(Debug, Default, Clone)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// An undecodable query string reads as empty.
    pub fn parse(raw: &str) -> Self {
        let pairs = web::Query::<Vec<(String, String)>>::from_query(raw)
            .map(web::Query::into_inner)
            .unwrap_or_default();
        Self { pairs }
    }

    /// First non-empty value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }

    pub fn all(&self, key: &str) -> Vec<&str> {
        self.pairs.iter().filter(|(k, _)| k == key).map(|(_, v)| v.as_str()).collect()
    }

    pub fn require(&self, key: &str) -> Result<&str, ApiError> {
        self.get(key).ok_or_else(|| ApiError::Invalid(format!("missing parameter '{key}'")))
    }

    pub fn require_id(&self, key: &str) -> Result<Id, ApiError> {
        self.require(key)?
            .trim()
            .parse()
            .map_err(|_| ApiError::Invalid(format!("parameter '{key}' must be an integer")))
    }

    pub fn order(&self) -> Order {
        Order::parse(self.get("order"))
    }

    /// Absent means no cap; a non-numeric or negative value caps at zero.
    pub fn limit(&self) -> Option<u64> {
        self.get("limit").map(|raw| raw.trim().parse().unwrap_or(0))
    }

    pub fn since(&self) -> Result<Option<NaiveDateTime>, ApiError> {
        match self.get("since") {
            None => Ok(None),
            Some(raw) => parse_date(raw)
                .map(Some)
                .ok_or_else(|| ApiError::Invalid(format!("bad 'since' date: {raw}"))),
        }
    }

    pub fn since_id(&self) -> Result<Option<Id>, ApiError> {
        self.get("since_id")
            .map(|raw| raw.trim().parse().map_err(|_| ApiError::Invalid("parameter 'since_id' must be an integer".into())))
            .transpose()
    }

    pub fn list_params(&self) -> Result<ListParams, ApiError> {
        Ok(ListParams { since: self.since()?, order: self.order(), limit: self.limit() })
    }

    pub fn id_list_params(&self) -> Result<IdListParams, ApiError> {
        Ok(IdListParams { since_id: self.since_id()?, order: self.order(), limit: self.limit() })
    }
}
