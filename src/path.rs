//! Materialized-path encoding for post reply trees.
//!
//! Every post carries `first_path` (the id of the top-level post its tree
//! hangs off) and `last_path`, a string such as `.004.017` naming each
//! ancestor below the root and finally the post itself. Within one
//! `first_path` group, sorting by `last_path` yields depth-first order with
//! siblings in ascending id order.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::models::Id;

/// Minimum number of digits in an encoded segment.
pub const SEGMENT_WIDTH: usize = 3;
pub const SEPARATOR: char = '.';

/// Zero-pad `id` to at least [`SEGMENT_WIDTH`] digits. Wider ids are kept whole.
pub fn encode(id: Id) -> String {
    debug_assert!(id > 0, "post ids are store-assigned and positive");
    format!("{:0width$}", id, width = SEGMENT_WIDTH)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostPath {
    pub first_path: Id,
    pub last_path: String,
}

impl PostPath {
    pub fn root(id: Id) -> Self {
        Self { first_path: id, last_path: String::new() }
    }

    /// Path of a direct reply `id` to the post at `self`.
    pub fn child(&self, id: Id) -> Self {
        let segment = encode(id);
        let mut last_path = String::with_capacity(self.last_path.len() + 1 + segment.len());
        last_path.push_str(&self.last_path);
        last_path.push(SEPARATOR);
        last_path.push_str(&segment);
        Self { first_path: self.first_path, last_path }
    }

    pub fn is_root(&self) -> bool {
        self.last_path.is_empty()
    }

    pub fn depth(&self) -> usize {
        segments(&self.last_path).count()
    }
}

fn segments(last_path: &str) -> impl Iterator<Item = &str> {
    last_path.split(SEPARATOR).filter(|s| !s.is_empty())
}

/// Order two `last_path` values depth-first.
///
/// Segments compare by digit count first and then by digits, which is
/// numeric order. Below id 1000 this is the same as comparing the raw
/// strings; above it, `.1000` still sorts after `.999`. A path sorts before
/// every path it is a proper prefix of.
pub fn compare_last_path(a: &str, b: &str) -> Ordering {
    let mut left = segments(a);
    let mut right = segments(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = x.len().cmp(&y.len()).then_with(|| x.cmp(y));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}
