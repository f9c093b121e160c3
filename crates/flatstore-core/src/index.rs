//! Secondary indexes derived from the primary tables.
//!
//! Indexes are never patched in place: every load and every mutation that can
//! invalidate them (rename, new engagement) calls [`Indexes::rebuild`] before
//! it returns.

use hashbrown::HashMap;

use crate::model::{Engagement, EngagementId, Post, PostId, Table, User, UserId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Indexes {
    /// username -> user id
    pub username_to_id: HashMap<String, UserId>,
    /// user id -> engagement ids authored by that user, ascending
    pub user_engagements: HashMap<UserId, Vec<EngagementId>>,
    /// post id -> engagement ids on that post, ascending
    pub post_engagements: HashMap<PostId, Vec<EngagementId>>,
}

impl Indexes {
    /// Full rebuild from the current tables. Deterministic.
    ///
    /// Every existing user and post gets an entry, possibly empty. Engagements
    /// whose post or author is missing are not indexed; the store never holds
    /// such rows after a completed operation.
    pub fn rebuild(
        users: &Table<User>,
        posts: &Table<Post>,
        engagements: &Table<Engagement>,
    ) -> Self {
        let mut username_to_id = HashMap::with_capacity(users.len());
        let mut user_engagements: HashMap<UserId, Vec<EngagementId>> = HashMap::with_capacity(users.len());
        for user in users.values() {
            username_to_id.insert(user.username.clone(), user.id);
            user_engagements.insert(user.id, Vec::new());
        }

        let mut post_engagements: HashMap<PostId, Vec<EngagementId>> =
            posts.keys().map(|&id| (id, Vec::new())).collect();

        // Table iteration is ascending by id, so every list comes out sorted.
        for engagement in engagements.values() {
            if let Some(list) = post_engagements.get_mut(&engagement.post_id) {
                list.push(engagement.id);
            }
            if let Some(user_id) = username_to_id.get(&engagement.username) {
                if let Some(list) = user_engagements.get_mut(user_id) {
                    list.push(engagement.id);
                }
            }
        }

        Self { username_to_id, user_engagements, post_engagements }
    }

    pub fn user_id(&self, username: &str) -> Option<UserId> {
        self.username_to_id.get(username).copied()
    }

    pub fn engagements_of_user(&self, user_id: UserId) -> &[EngagementId] {
        self.user_engagements.get(&user_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn engagements_on_post(&self, post_id: PostId) -> &[EngagementId] {
        self.post_engagements.get(&post_id).map(Vec::as_slice).unwrap_or(&[])
    }
}
