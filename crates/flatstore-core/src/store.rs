//! FlatStore: the in-memory tables, their indexes, and durable mutation.
//!
//! **Read path**: shared locks on the tables a query needs, answered from RAM.
//! **Write path**: exclusive lock, persist the new file contents, then update
//! RAM. If the write fails, RAM is never modified.
//!
//! # Lock order
//!
//! Every operation that holds more than one lock acquires them in this order
//! and never in reverse:
//!
//! 1. `users`
//! 2. `posts`
//! 3. `engagements`
//! 4. `indexes`
//! 5. per-file write locks, in the same table order
//!
//! Operations may skip any lock they do not need.

use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::codec::CsvRecord;
use crate::config::StoreConfig;
use crate::durable::{self, StagedFile};
use crate::error::{StoreError, StoreResult};
use crate::index::Indexes;
use crate::load::{self, Tables};
use crate::model::{
    check_field, Engagement, EngagementId, EngagementKind, NewEngagement, Post, PostId, Table, User,
    UserId,
};

/// A table's backing file plus the lock that serializes rewrites of it.
#[derive(Debug)]
struct TableFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TableFile {
    fn new(path: &Path) -> Self {
        Self { path: path.to_path_buf(), write_lock: Mutex::new(()) }
    }

    fn rewrite<I, S>(&self, config: &StoreConfig, header: &str, rows: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let _guard = self.write_lock.lock();
        durable::atomic_rewrite(&self.path, &config.temp_suffix, header, rows, config.durability)
    }
}

fn table_rows<R: CsvRecord>(table: &Table<R>) -> Vec<String> {
    table.values().map(R::to_row).collect()
}

/// Log a failed operation at a severity matching its class, then hand it back.
fn report<T>(operation: &'static str, result: StoreResult<T>) -> StoreResult<T> {
    if let Err(err) = &result {
        if err.is_fatal() {
            error!(operation, error = %err, "disk and memory may disagree; operator recovery required");
        } else if err.is_io() {
            error!(operation, error = %err, "operation failed");
        } else {
            debug!(operation, error = %err, "operation rejected");
        }
    }
    result
}

/// Thread-safe store over the users, posts and engagements tables.
///
/// All public methods take `&self`; share the store between threads with `Arc`.
pub struct FlatStore {
    users: RwLock<Table<User>>,
    posts: RwLock<Table<Post>>,
    engagements: RwLock<Table<Engagement>>,
    indexes: RwLock<Indexes>,
    users_file: TableFile,
    posts_file: TableFile,
    engagements_file: TableFile,
    config: StoreConfig,
}

impl FlatStore {
    /// Create an empty store over the configured files. Nothing is read until
    /// [`load_all`](Self::load_all) or [`load_all_parallel`](Self::load_all_parallel).
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        config.validate().map_err(|reason| StoreError::InvalidConfig { reason })?;
        Ok(Self {
            users: RwLock::new(Table::new()),
            posts: RwLock::new(Table::new()),
            engagements: RwLock::new(Table::new()),
            indexes: RwLock::new(Indexes::default()),
            users_file: TableFile::new(&config.users_path),
            posts_file: TableFile::new(&config.posts_path),
            engagements_file: TableFile::new(&config.engagements_path),
            config,
        })
    }

    /// Create a store and load it sequentially.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let store = Self::new(config)?;
        store.load_all()?;
        Ok(store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Replace all tables with the contents of the three files, read one after
    /// another. All-or-nothing: on any failure the previous state is kept.
    pub fn load_all(&self) -> StoreResult<()> {
        let result = load::load_sequential(&self.config).and_then(|tables| self.install(tables));
        report("load_all", result)
    }

    /// Same result as [`load_all`](Self::load_all), with the three files
    /// parsed concurrently on scoped worker threads.
    pub fn load_all_parallel(&self) -> StoreResult<()> {
        let result = load::load_parallel(&self.config).and_then(|tables| self.install(tables));
        report("load_all_parallel", result)
    }

    /// Validate freshly loaded tables and swap them in under all table locks.
    fn install(&self, tables: Tables) -> StoreResult<()> {
        load::validate_integrity(&tables)?;

        let mut users = self.users.write();
        let mut posts = self.posts.write();
        let mut engagements = self.engagements.write();
        let mut indexes = self.indexes.write();

        *indexes = Indexes::rebuild(&tables.users, &tables.posts, &tables.engagements);
        *users = tables.users;
        *posts = tables.posts;
        *engagements = tables.engagements;

        info!(
            users = users.len(),
            posts = posts.len(),
            engagements = engagements.len(),
            "tables loaded"
        );
        Ok(())
    }

    /// Add `delta` to a post's view count and persist the posts file.
    ///
    /// Returns `Ok(false)` without side effects if the post does not exist.
    /// The posts lock is held across the disk write, so concurrent updates are
    /// fully serialized and none is lost.
    pub fn update_post_views(&self, post_id: PostId, delta: i64) -> StoreResult<bool> {
        let mut posts = self.posts.write();
        let Some(post) = posts.get(&post_id) else {
            return Ok(false);
        };

        let current = post.views;
        let views = match current.checked_add(delta) {
            Some(v) if v >= 0 => v,
            _ => {
                return report(
                    "update_post_views",
                    Err(StoreError::InvalidViews { post_id, views: current, delta }),
                )
            }
        };

        let rows = posts.values().map(|p| {
            if p.id == post_id {
                Post { views, ..p.clone() }.to_row()
            } else {
                p.to_row()
            }
        });
        report("update_post_views", self.posts_file.rewrite(&self.config, Post::HEADER, rows))?;

        if let Some(post) = posts.get_mut(&post_id) {
            post.views = views;
        }
        Ok(true)
    }

    /// Insert a new engagement and persist the engagements file.
    ///
    /// The post and the user must exist, otherwise `ForeignKey` is returned and
    /// nothing changes. The id is one past the largest existing id (1 for an
    /// empty table), assigned under the engagements lock, so ids are unique and
    /// increase in commit order.
    pub fn add_engagement(&self, candidate: NewEngagement) -> StoreResult<EngagementId> {
        report("add_engagement", self.add_engagement_inner(candidate))
    }

    fn add_engagement_inner(&self, candidate: NewEngagement) -> StoreResult<EngagementId> {
        candidate.validate()?;

        // Users and posts stay shared-locked until the row is in: a concurrent
        // rename cannot strand the new row's username.
        let users = self.users.read();
        let posts = self.posts.read();
        let mut engagements = self.engagements.write();
        let mut indexes = self.indexes.write();

        if !posts.contains_key(&candidate.post_id) {
            return Err(StoreError::ForeignKey {
                relation: "engagement.post_id -> post.id",
                value: candidate.post_id.to_string(),
            });
        }
        if indexes.user_id(&candidate.username).is_none() {
            return Err(StoreError::ForeignKey {
                relation: "engagement.username -> user.username",
                value: candidate.username,
            });
        }

        let id = match engagements.last_key_value() {
            None => 1,
            Some((&max, _)) => max.checked_add(1).ok_or_else(|| StoreError::InvalidRecord {
                reason: "engagement id space exhausted".into(),
            })?,
        };
        let engagement = candidate.into_engagement(id);

        let rows = engagements
            .values()
            .map(Engagement::to_row)
            .chain(std::iter::once(engagement.to_row()));
        self.engagements_file.rewrite(&self.config, Engagement::HEADER, rows)?;

        engagements.insert(id, engagement);
        *indexes = Indexes::rebuild(&users, &posts, &engagements);
        Ok(id)
    }

    /// All comments written by `user_id` as `(post_id, text)`, sorted by post
    /// id then text. Unknown users yield an empty list.
    pub fn get_user_comments(&self, user_id: UserId) -> Vec<(PostId, String)> {
        let users = self.users.read();
        let engagements = self.engagements.read();
        let indexes = self.indexes.read();

        let Some(user) = users.get(&user_id) else {
            return Vec::new();
        };

        let mut comments: Vec<(PostId, String)> = indexes
            .engagements_of_user(user_id)
            .iter()
            .filter_map(|id| engagements.get(id))
            .filter(|e| e.kind == EngagementKind::Comment && e.username == user.username)
            .map(|e| (e.post_id, e.comment.clone()))
            .collect();
        comments.sort();
        comments
    }

    /// `(likes, comments)` made by all users whose location equals `location`.
    pub fn get_engagement_counts_by_location(&self, location: &str) -> (usize, usize) {
        let users = self.users.read();
        let engagements = self.engagements.read();
        let indexes = self.indexes.read();

        let mut likes = 0;
        let mut comments = 0;
        for user in users.values().filter(|u| u.location == location) {
            for id in indexes.engagements_of_user(user.id) {
                match engagements.get(id).map(|e| e.kind) {
                    Some(EngagementKind::Like) => likes += 1,
                    Some(EngagementKind::Comment) => comments += 1,
                    None => {}
                }
            }
        }
        (likes, comments)
    }

    /// Rename a user and cascade the new name to their posts and engagements.
    ///
    /// Returns `Ok(false)` if the user does not exist. All three files are
    /// staged before any is renamed into place; if a rename fails, the files
    /// already replaced are restored and memory is left unchanged. Only if
    /// that restore fails too is [`StoreError::PartialPersist`] returned.
    pub fn rename_user(&self, user_id: UserId, new_username: &str) -> StoreResult<bool> {
        report("rename_user", self.rename_user_inner(user_id, new_username))
    }

    fn rename_user_inner(&self, user_id: UserId, new_username: &str) -> StoreResult<bool> {
        check_field("username", new_username, false)?;

        let mut users = self.users.write();
        let mut posts = self.posts.write();
        let mut engagements = self.engagements.write();
        let mut indexes = self.indexes.write();

        let Some(user) = users.get(&user_id) else {
            return Ok(false);
        };
        let old = user.username.clone();
        if old == new_username {
            return Ok(true);
        }
        if indexes.user_id(new_username).is_some() {
            return Err(StoreError::DuplicateUsername { username: new_username.to_string() });
        }

        let user_rows: Vec<String> = users
            .values()
            .map(|u| {
                if u.id == user_id {
                    User { username: new_username.to_string(), ..u.clone() }.to_row()
                } else {
                    u.to_row()
                }
            })
            .collect();
        let post_rows: Vec<String> = posts
            .values()
            .map(|p| {
                if p.author == old {
                    Post { author: new_username.to_string(), ..p.clone() }.to_row()
                } else {
                    p.to_row()
                }
            })
            .collect();
        let engagement_rows: Vec<String> = engagements
            .values()
            .map(|e| {
                if e.username == old {
                    Engagement { username: new_username.to_string(), ..e.clone() }.to_row()
                } else {
                    e.to_row()
                }
            })
            .collect();

        let previous = [table_rows(&*users), table_rows(&*posts), table_rows(&*engagements)];
        self.rewrite_all([user_rows, post_rows, engagement_rows], previous)?;

        if let Some(user) = users.get_mut(&user_id) {
            user.username = new_username.to_string();
        }
        for post in posts.values_mut().filter(|p| p.author == old) {
            post.author = new_username.to_string();
        }
        for engagement in engagements.values_mut().filter(|e| e.username == old) {
            engagement.username = new_username.to_string();
        }
        *indexes = Indexes::rebuild(&users, &posts, &engagements);

        info!(user_id, old = %old, new = %new_username, "user renamed");
        Ok(true)
    }

    /// Replace all three files as one unit: stage every file, then rename each
    /// into place. On a failed rename, restore the files already replaced from
    /// `previous`.
    fn rewrite_all(&self, rows: [Vec<String>; 3], previous: [Vec<String>; 3]) -> StoreResult<()> {
        let files = [&self.users_file, &self.posts_file, &self.engagements_file];
        let headers = [User::HEADER, Post::HEADER, Engagement::HEADER];

        let _guards: Vec<_> = files.iter().map(|f| f.write_lock.lock()).collect();

        let mut staged: Vec<StagedFile> = Vec::with_capacity(files.len());
        for ((file, header), body) in files.iter().zip(headers).zip(rows) {
            // An early return drops what is already staged, removing the temp files.
            staged.push(durable::stage(
                &file.path,
                &self.config.temp_suffix,
                header,
                body,
                self.config.durability,
            )?);
        }

        let mut committed = Vec::with_capacity(files.len());
        for (i, file) in staged.into_iter().enumerate() {
            let target = file.target().to_path_buf();
            if let Err(err) = file.commit() {
                return Err(self.restore(&committed, &previous, &headers, target, err));
            }
            committed.push(i);
        }
        Ok(())
    }

    /// Put back the old contents of already replaced files after a failed
    /// multi-file commit. Returns the error to surface to the caller.
    fn restore(
        &self,
        committed: &[usize],
        previous: &[Vec<String>; 3],
        headers: &[&str; 3],
        failed: PathBuf,
        cause: StoreError,
    ) -> StoreError {
        let files = [&self.users_file, &self.posts_file, &self.engagements_file];
        let mut stranded = Vec::new();

        for &i in committed {
            let file = files[i];
            let result = durable::atomic_rewrite(
                &file.path,
                &self.config.temp_suffix,
                headers[i],
                &previous[i],
                self.config.durability,
            );
            if let Err(err) = result {
                error!(path = %file.path.display(), error = %err, "failed to restore table file");
                stranded.push(file.path.clone());
            }
        }

        if stranded.is_empty() {
            cause
        } else {
            StoreError::PartialPersist { committed: stranded, failed, message: cause.to_string() }
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }

    pub fn post_count(&self) -> usize {
        self.posts.read().len()
    }

    pub fn engagement_count(&self) -> usize {
        self.engagements.read().len()
    }

    pub fn has_user(&self, user_id: UserId) -> bool {
        self.users.read().contains_key(&user_id)
    }

    pub fn has_post(&self, post_id: PostId) -> bool {
        self.posts.read().contains_key(&post_id)
    }

    pub fn post_views(&self, post_id: PostId) -> Option<i64> {
        self.posts.read().get(&post_id).map(|p| p.views)
    }

    pub fn username(&self, user_id: UserId) -> Option<String> {
        self.users.read().get(&user_id).map(|u| u.username.clone())
    }

    pub fn user(&self, user_id: UserId) -> Option<User> {
        self.users.read().get(&user_id).cloned()
    }

    pub fn post(&self, post_id: PostId) -> Option<Post> {
        self.posts.read().get(&post_id).cloned()
    }

    pub fn engagement(&self, engagement_id: EngagementId) -> Option<Engagement> {
        self.engagements.read().get(&engagement_id).cloned()
    }

    /// Look up a user id through the username index.
    pub fn user_id_by_username(&self, username: &str) -> Option<UserId> {
        self.indexes.read().user_id(username)
    }

    /// Engagements on a post, ascending id.
    pub fn engagements_for_post(&self, post_id: PostId) -> Vec<Engagement> {
        let engagements = self.engagements.read();
        let indexes = self.indexes.read();
        indexes
            .engagements_on_post(post_id)
            .iter()
            .filter_map(|id| engagements.get(id).cloned())
            .collect()
    }

    /// Engagements authored by a user, ascending id.
    pub fn engagements_for_user(&self, user_id: UserId) -> Vec<Engagement> {
        let engagements = self.engagements.read();
        let indexes = self.indexes.read();
        indexes
            .engagements_of_user(user_id)
            .iter()
            .filter_map(|id| engagements.get(id).cloned())
            .collect()
    }

    /// Consistent copy of all three tables.
    pub fn snapshot(&self) -> Tables {
        let users = self.users.read();
        let posts = self.posts.read();
        let engagements = self.engagements.read();
        Tables {
            users: users.clone(),
            posts: posts.clone(),
            engagements: engagements.clone(),
        }
    }
}
