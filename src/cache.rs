//! Keyed query cache.
//!
//! Every gateway read is stored under a [`QueryKey`]. Writes never patch
//! entries; they mark whole key families stale through [`KeyPrefix`]es so the
//! next read goes back to the gateway.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{CommentId, PostId, Principal};

/// Identity of one cached read: operation name plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Posts,
    Post(PostId),
    UserPosts(Principal),
    Comment(CommentId),
    PostComments(PostId),
    PostLikes(PostId),
    HasUserLiked(PostId, Principal),
    IsFollowing(Principal),
    Following,
    Followers,
    CurrentUserProfile,
    UserProfile(Principal),
    UserRole,
    IsAdmin,
}

impl QueryKey {
    /// Operation segment shared by every key of this kind
    pub fn family(&self) -> &'static str {
        match self {
            QueryKey::Posts => "posts",
            QueryKey::Post(_) => "post",
            QueryKey::UserPosts(_) => "userPosts",
            QueryKey::Comment(_) => "comment",
            QueryKey::PostComments(_) => "postComments",
            QueryKey::PostLikes(_) => "postLikes",
            QueryKey::HasUserLiked(..) => "hasUserLiked",
            QueryKey::IsFollowing(_) => "isFollowing",
            QueryKey::Following => "following",
            QueryKey::Followers => "followers",
            QueryKey::CurrentUserProfile => "currentUserProfile",
            QueryKey::UserProfile(_) => "userProfile",
            QueryKey::UserRole => "userRole",
            QueryKey::IsAdmin => "isAdmin",
        }
    }

    pub fn path(&self) -> Vec<String> {
        let mut path = vec![self.family().to_string()];
        match self {
            QueryKey::Post(id) | QueryKey::PostComments(id) | QueryKey::PostLikes(id) => {
                path.push(id.to_string())
            }
            QueryKey::Comment(id) => path.push(id.to_string()),
            QueryKey::HasUserLiked(post, viewer) => {
                path.push(post.to_string());
                path.push(viewer.to_string());
            }
            QueryKey::UserPosts(p) | QueryKey::IsFollowing(p) | QueryKey::UserProfile(p) => {
                path.push(p.to_string())
            }
            QueryKey::Posts
            | QueryKey::Following
            | QueryKey::Followers
            | QueryKey::CurrentUserProfile
            | QueryKey::UserRole
            | QueryKey::IsAdmin => {}
        }
        path
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.path().join(", "))
    }
}

/// Matches every key whose path starts with these segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPrefix(Vec<String>);

impl KeyPrefix {
    /// Every key of one operation, e.g. all cached comments.
    pub fn family(name: &str) -> Self {
        Self(vec![name.to_string()])
    }

    pub fn exact(key: &QueryKey) -> Self {
        Self(key.path())
    }

    /// Like-state of a post for every viewer.
    pub fn has_user_liked(post: PostId) -> Self {
        Self(vec!["hasUserLiked".to_string(), post.to_string()])
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        key.path().starts_with(&self.0)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl From<QueryKey> for KeyPrefix {
    fn from(key: QueryKey) -> Self {
        Self::exact(&key)
    }
}

impl fmt::Display for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, ..]", self.0.join(", "))
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    fetched_at: Instant,
    invalidated: bool,
}

/// Key → entry store with a stale time.
#[derive(Debug)]
pub struct QueryCache {
    entries: HashMap<QueryKey, CacheEntry>,
    stale_after: Duration,
    epoch: u64,
}

impl QueryCache {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            stale_after,
            epoch: 0,
        }
    }

    /// A fresh cached value, or `None` when the key must be fetched.
    pub fn get<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let entry = self.entries.get(key)?;
        if entry.invalidated || entry.fetched_at.elapsed() >= self.stale_after {
            return None;
        }
        match serde_json::from_value(entry.value.clone()) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Discarding unreadable cache entry {}: {}", key, e);
                None
            }
        }
    }

    pub fn insert<T: Serialize>(&mut self, key: QueryKey, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.entries.insert(
                    key,
                    CacheEntry {
                        value,
                        fetched_at: Instant::now(),
                        invalidated: false,
                    },
                );
            }
            Err(e) => tracing::warn!("Not caching {}: {}", key, e),
        }
    }

    /// Mark every matching entry stale. Returns how many were hit.
    pub fn invalidate(&mut self, prefix: &KeyPrefix) -> usize {
        let mut hit = 0;
        for (key, entry) in self.entries.iter_mut() {
            if prefix.matches(key) {
                entry.invalidated = true;
                hit += 1;
            }
        }
        self.epoch += 1;
        tracing::debug!("Invalidated {} entries under {}", hit, prefix);
        hit
    }

    /// Bumped by every invalidation and clear. A read that started in an
    /// earlier epoch may carry data from before a write and is not stored.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_fresh(&self, key: &QueryKey) -> bool {
        self.entries
            .get(key)
            .map(|e| !e.invalidated && e.fetched_at.elapsed() < self.stale_after)
            .unwrap_or(false)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.epoch += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Principal {
        Principal::from_text("alice").unwrap()
    }

    fn bob() -> Principal {
        Principal::from_text("bob").unwrap()
    }

    fn cache() -> QueryCache {
        QueryCache::new(Duration::from_secs(60))
    }

    #[test]
    fn hit_after_insert() {
        let mut c = cache();
        c.insert(QueryKey::PostLikes(PostId(1)), &3u64);
        assert_eq!(c.get::<u64>(&QueryKey::PostLikes(PostId(1))), Some(3));
        assert_eq!(c.get::<u64>(&QueryKey::PostLikes(PostId(2))), None);
    }

    #[test]
    fn zero_stale_time_always_refetches() {
        let mut c = QueryCache::new(Duration::ZERO);
        c.insert(QueryKey::Following, &Vec::<Principal>::new());
        assert!(c.get::<Vec<Principal>>(&QueryKey::Following).is_none());
    }

    #[test]
    fn exact_prefix_hits_one_key() {
        let mut c = cache();
        c.insert(QueryKey::PostLikes(PostId(1)), &1u64);
        c.insert(QueryKey::PostLikes(PostId(10)), &1u64);
        let hit = c.invalidate(&QueryKey::PostLikes(PostId(1)).into());
        assert_eq!(hit, 1);
        assert!(!c.is_fresh(&QueryKey::PostLikes(PostId(1))));
        assert!(c.is_fresh(&QueryKey::PostLikes(PostId(10))));
    }

    #[test]
    fn family_prefix_hits_every_argument() {
        let mut c = cache();
        c.insert(QueryKey::Comment(CommentId(1)), &Option::<u8>::None);
        c.insert(QueryKey::Comment(CommentId(2)), &Option::<u8>::None);
        c.insert(QueryKey::Posts, &Vec::<u8>::new());
        assert_eq!(c.invalidate(&KeyPrefix::family("comment")), 2);
        assert!(c.is_fresh(&QueryKey::Posts));
    }

    #[test]
    fn liked_prefix_covers_all_viewers_of_one_post() {
        let mut c = cache();
        c.insert(QueryKey::HasUserLiked(PostId(1), alice()), &true);
        c.insert(QueryKey::HasUserLiked(PostId(1), bob()), &false);
        c.insert(QueryKey::HasUserLiked(PostId(2), alice()), &true);
        assert_eq!(c.invalidate(&KeyPrefix::has_user_liked(PostId(1))), 2);
        assert!(c.is_fresh(&QueryKey::HasUserLiked(PostId(2), alice())));
    }

    #[test]
    fn invalidated_entry_refreshes_on_insert() {
        let mut c = cache();
        let key = QueryKey::IsFollowing(bob());
        c.insert(key.clone(), &false);
        c.invalidate(&KeyPrefix::exact(&key));
        assert_eq!(c.get::<bool>(&key), None);
        c.insert(key.clone(), &true);
        assert_eq!(c.get::<bool>(&key), Some(true));
    }

    #[test]
    fn wrong_type_reads_as_miss() {
        let mut c = cache();
        c.insert(QueryKey::UserRole, &"admin");
        assert_eq!(c.get::<u64>(&QueryKey::UserRole), None);
    }

    #[test]
    fn clear_drops_everything() {
        let mut c = cache();
        c.insert(QueryKey::Posts, &Vec::<u8>::new());
        c.insert(QueryKey::CurrentUserProfile, &Option::<u8>::None);
        c.clear();
        assert!(c.is_empty());
    }

    #[test]
    fn epoch_moves_on_invalidate_and_clear() {
        let mut c = cache();
        let start = c.epoch();
        c.invalidate(&KeyPrefix::family("posts"));
        assert_eq!(c.epoch(), start + 1);
        c.clear();
        assert_eq!(c.epoch(), start + 2);
    }

    #[test]
    fn key_paths() {
        assert_eq!(QueryKey::Posts.path(), vec!["posts"]);
        assert_eq!(
            QueryKey::HasUserLiked(PostId(4), alice()).path(),
            vec!["hasUserLiked", "4", "alice"]
        );
        assert_eq!(QueryKey::Comment(CommentId(9)).to_string(), "[comment, 9]");
    }
}
