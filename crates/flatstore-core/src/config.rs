//! Configuration management for FlatStore
//!
//! Supplies the three table paths and the durability level used by every
//! rewrite.

use std::path::{Path, PathBuf};

/// Default suffix appended to a table file name for its staging copy
pub const DEFAULT_TEMP_SUFFIX: &str = ".tmp";

/// How hard a rewrite pushes bytes toward persistent media before rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// Sync the staged file before rename and the directory after it
    Full,
    /// Rename without syncing. Still atomic for concurrent readers, but a
    /// power loss may lose the newest snapshot.
    Buffered,
}

/// FlatStore configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path of the users table (`id,username,location`)
    pub users_path: PathBuf,
    /// Path of the posts table (`id,content,username,views`)
    pub posts_path: PathBuf,
    /// Path of the engagements table (`id,postId,username,type,comment,timestamp`)
    pub engagements_path: PathBuf,
    /// Sync policy for rewrites
    pub durability: Durability,
    /// Suffix of the sibling staging file written before each rename
    pub temp_suffix: String,
}

impl StoreConfig {
    /// Explicit paths with full durability.
    pub fn new(
        users_path: impl Into<PathBuf>,
        posts_path: impl Into<PathBuf>,
        engagements_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            users_path: users_path.into(),
            posts_path: posts_path.into(),
            engagements_path: engagements_path.into(),
            durability: Durability::Full,
            temp_suffix: DEFAULT_TEMP_SUFFIX.to_string(),
        }
    }

    /// Standard file names (`users.csv`, `posts.csv`, `engagements.csv`) inside `dir`.
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self::new(
            dir.join("users.csv"),
            dir.join("posts.csv"),
            dir.join("engagements.csv"),
        )
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn with_temp_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.temp_suffix = suffix.into();
        self
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        let paths = [
            ("users_path", &self.users_path),
            ("posts_path", &self.posts_path),
            ("engagements_path", &self.engagements_path),
        ];
        for (name, path) in paths {
            if path.as_os_str().is_empty() {
                return Err(format!("{} must not be empty", name));
            }
        }
        if self.users_path == self.posts_path
            || self.users_path == self.engagements_path
            || self.posts_path == self.engagements_path
        {
            return Err("each table needs its own file".into());
        }
        if self.temp_suffix.is_empty() {
            return Err("temp_suffix must not be empty".into());
        }
        if self.temp_suffix.contains('/') || self.temp_suffix.contains('\\') {
            return Err("temp_suffix must not contain a path separator".into());
        }
        Ok(())
    }
}
