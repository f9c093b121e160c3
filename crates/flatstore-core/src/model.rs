//! Record model: users, posts and engagements.
//!
//! Records are plain owned values. The store holds them in id-ordered tables;
//! nothing outside the store keeps references to them across calls.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{StoreError, StoreResult};

pub type UserId = i64;
pub type PostId = i64;
pub type EngagementId = i64;

/// Primary table keyed by record id. Iteration order is ascending id, which is
/// also the row order of every rewritten file.
pub type Table<R> = BTreeMap<i64, R>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: PostId,
    pub content: String,
    /// Author's username (references `User::username`)
    pub author: String,
    pub views: i64,
}

/// Engagement type column: `like` or `comment`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngagementKind {
    Like,
    Comment,
}

impl EngagementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EngagementKind::Like => "like",
            EngagementKind::Comment => "comment",
        }
    }
}

impl fmt::Display for EngagementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngagementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(EngagementKind::Like),
            "comment" => Ok(EngagementKind::Comment),
            other => Err(format!("unknown engagement type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Engagement {
    pub id: EngagementId,
    pub post_id: PostId,
    pub username: String,
    pub kind: EngagementKind,
    /// Empty for likes, non-empty for comments
    pub comment: String,
    /// Unix seconds
    pub timestamp: i64,
}

/// Engagement submitted through `FlatStore::add_engagement`; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEngagement {
    pub post_id: PostId,
    pub username: String,
    pub kind: EngagementKind,
    pub comment: String,
    pub timestamp: i64,
}

impl NewEngagement {
    pub fn like(post_id: PostId, username: impl Into<String>, timestamp: i64) -> Self {
        Self {
            post_id,
            username: username.into(),
            kind: EngagementKind::Like,
            comment: String::new(),
            timestamp,
        }
    }

    pub fn comment(
        post_id: PostId,
        username: impl Into<String>,
        comment: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            post_id,
            username: username.into(),
            kind: EngagementKind::Comment,
            comment: comment.into(),
            timestamp,
        }
    }

    /// Check record rules that do not need the other tables.
    pub fn validate(&self) -> StoreResult<()> {
        check_field("username", &self.username, false)?;
        check_field("comment", &self.comment, true)?;
        check_comment_matches_kind(self.kind, &self.comment).map_err(|reason| {
            StoreError::InvalidRecord { reason }
        })
    }

    pub(crate) fn into_engagement(self, id: EngagementId) -> Engagement {
        Engagement {
            id,
            post_id: self.post_id,
            username: self.username,
            kind: self.kind,
            comment: self.comment,
            timestamp: self.timestamp,
        }
    }
}

/// Likes carry no text; comments must carry some.
pub(crate) fn check_comment_matches_kind(kind: EngagementKind, comment: &str) -> Result<(), String> {
    match (kind, comment.is_empty()) {
        (EngagementKind::Like, false) => Err("like must not carry comment text".into()),
        (EngagementKind::Comment, true) => Err("comment must carry comment text".into()),
        _ => Ok(()),
    }
}

/// A text field must survive a write/load cycle unchanged: no separators,
/// no line breaks, no surrounding whitespace (cells are trimmed on load).
pub(crate) fn check_field(name: &str, value: &str, allow_empty: bool) -> StoreResult<()> {
    let reason = if value.is_empty() && !allow_empty {
        Some(format!("{} must not be empty", name))
    } else if value.contains([',', '\n', '\r']) {
        Some(format!("{} must not contain commas or line breaks", name))
    } else if value.trim() != value {
        Some(format!("{} must not have surrounding whitespace", name))
    } else {
        None
    };
    match reason {
        Some(reason) => Err(StoreError::InvalidRecord { reason }),
        None => Ok(()),
    }
}
