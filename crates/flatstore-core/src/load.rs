//! Bulk loading: read the three table files into private tables, then check
//! referential integrity before anything is shown to the store.
//!
//! The parallel variant is fork-join: one scoped worker per file, each owning
//! its own table, and a single join barrier. A failed or panicked worker is
//! reported through its join result.

use std::fs;
use std::path::Path;
use std::thread;

use tracing::warn;

use crate::codec::{parse_table, CsvRecord};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::model::{Engagement, Post, Table, User};

/// The three primary tables, either freshly parsed or copied out of a store.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Tables {
    pub users: Table<User>,
    pub posts: Table<Post>,
    pub engagements: Table<Engagement>,
}

/// Read and decode one table file. Unreadable files are errors; malformed
/// rows and duplicate ids are dropped and logged.
pub fn load_table<R: CsvRecord>(path: &Path) -> StoreResult<Table<R>> {
    let text = fs::read_to_string(path)
        .map_err(|e| StoreError::io(path, &e, "Failed to read table file"))?;
    let parsed = parse_table::<R>(&text);

    let mut table = Table::new();
    for record in parsed.records {
        let id = record.id();
        if table.contains_key(&id) {
            warn!(table = R::TABLE, id, path = %path.display(), "dropping row with duplicate id");
            continue;
        }
        table.insert(id, record);
    }
    Ok(table)
}

/// Load the three files one after another on the calling thread.
pub fn load_sequential(config: &StoreConfig) -> StoreResult<Tables> {
    let users = load_table::<User>(&config.users_path)?;
    let posts = load_table::<Post>(&config.posts_path)?;
    let engagements = load_table::<Engagement>(&config.engagements_path)?;
    Ok(Tables { users, posts, engagements })
}

/// Load the three files concurrently, one scoped worker per file.
pub fn load_parallel(config: &StoreConfig) -> StoreResult<Tables> {
    thread::scope(|scope| {
        let users = spawn_loader::<User>(scope, &config.users_path)?;
        let posts = spawn_loader::<Post>(scope, &config.posts_path)?;
        let engagements = spawn_loader::<Engagement>(scope, &config.engagements_path)?;

        // Join all three before looking at any result.
        let users = join_loader::<User>(users);
        let posts = join_loader::<Post>(posts);
        let engagements = join_loader::<Engagement>(engagements);

        Ok(Tables { users: users?, posts: posts?, engagements: engagements? })
    })
}

type LoaderHandle<'scope, R> = thread::ScopedJoinHandle<'scope, StoreResult<Table<R>>>;

fn spawn_loader<'scope, 'env, R>(
    scope: &'scope thread::Scope<'scope, 'env>,
    path: &'env Path,
) -> StoreResult<LoaderHandle<'scope, R>>
where
    R: CsvRecord + Send + 'scope,
{
    thread::Builder::new()
        .name(format!("flatstore-load-{}", R::TABLE))
        .spawn_scoped(scope, move || load_table::<R>(path))
        .map_err(|e| StoreError::io(path, &e, "Failed to spawn loader thread"))
}

fn join_loader<R: CsvRecord>(handle: LoaderHandle<'_, R>) -> StoreResult<Table<R>> {
    handle
        .join()
        .unwrap_or_else(|_| Err(StoreError::LoaderPanicked { table: R::TABLE }))
}

/// Every post author and every engagement's post and author must exist.
pub fn validate_integrity(tables: &Tables) -> StoreResult<()> {
    let usernames: hashbrown::HashSet<&str> =
        tables.users.values().map(|u| u.username.as_str()).collect();

    let mut violations = Vec::new();
    if usernames.len() != tables.users.len() {
        violations.push("usernames are not unique".to_string());
    }
    for post in tables.posts.values() {
        if !usernames.contains(post.author.as_str()) {
            violations.push(format!("post {} author '{}' does not exist", post.id, post.author));
        }
    }
    for engagement in tables.engagements.values() {
        if !tables.posts.contains_key(&engagement.post_id) {
            violations.push(format!(
                "engagement {} references missing post {}",
                engagement.id, engagement.post_id
            ));
        }
        if !usernames.contains(engagement.username.as_str()) {
            violations.push(format!(
                "engagement {} references missing user '{}'",
                engagement.id, engagement.username
            ));
        }
    }

    match violations.first() {
        None => Ok(()),
        Some(first) => Err(StoreError::IntegrityViolation {
            violations: violations.len(),
            first: first.clone(),
        }),
    }
}
