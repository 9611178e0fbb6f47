//! Feed shaping and post cards.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use url::Url;

use crate::linkify::{linkify, Segment};
use crate::models::{Post, PostId, Principal};

pub const ADMIN_NOTICE: &str =
    "You have admin privileges. You can delete any post or comment by clicking the delete button.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedTab {
    #[default]
    All,
    Following,
}

/// What a feed tab shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedState {
    Posts(Vec<(PostId, Post)>),
    /// Nothing has been posted at all
    Empty,
    /// Following tab without a session
    LoggedOut,
    /// Following tab, signed in, following nobody
    NoFollows,
    /// Following tab, follows exist but none of them has posted
    FollowedHaveNoPosts,
}

impl FeedState {
    /// Title and body shown instead of posts.
    pub fn message(&self) -> Option<(&'static str, &'static str)> {
        match self {
            FeedState::Posts(_) => None,
            FeedState::Empty => Some((
                "No NFTs Yet",
                "Be the first to share your favorite NFT collection with the community!",
            )),
            FeedState::LoggedOut => Some((
                "Following",
                "Please log in to view posts from users you follow.",
            )),
            FeedState::NoFollows => Some((
                "Following",
                "Follow other users to see their posts here!",
            )),
            FeedState::FollowedHaveNoPosts => Some((
                "Following",
                "Users you follow haven't posted yet. Check back later!",
            )),
        }
    }

    pub fn posts(&self) -> &[(PostId, Post)] {
        match self {
            FeedState::Posts(posts) => posts,
            _ => &[],
        }
    }
}

/// Newest first; ties broken by id so the order is stable.
pub fn sort_newest_first(posts: &mut [(PostId, Post)]) {
    posts.sort_by(|(a_id, a), (b_id, b)| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b_id.cmp(a_id))
    });
}

/// Keep posts whose author is in `following`.
pub fn filter_following(posts: &[(PostId, Post)], following: &[Principal]) -> Vec<(PostId, Post)> {
    let authors: HashSet<&str> = following.iter().map(|p| p.as_str()).collect();
    posts
        .iter()
        .filter(|(_, post)| authors.contains(post.author.as_str()))
        .cloned()
        .collect()
}

pub fn all_feed(posts: Vec<(PostId, Post)>) -> FeedState {
    if posts.is_empty() {
        FeedState::Empty
    } else {
        FeedState::Posts(posts)
    }
}

/// `following` is `None` without a session.
pub fn following_feed(posts: &[(PostId, Post)], following: Option<&[Principal]>) -> FeedState {
    match following {
        None => FeedState::LoggedOut,
        Some([]) => FeedState::NoFollows,
        Some(following) => {
            let matching = filter_following(posts, following);
            if matching.is_empty() {
                FeedState::FollowedHaveNoPosts
            } else {
                FeedState::Posts(matching)
            }
        }
    }
}

pub fn like_label(count: u64) -> String {
    if count == 1 {
        "1 Like".to_string()
    } else {
        format!("{} Likes", count)
    }
}

pub fn comment_label(count: usize) -> String {
    if count == 1 {
        "1 comment".to_string()
    } else {
        format!("{} comments", count)
    }
}

/// Everything needed to show one post in a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostCard {
    pub id: PostId,
    pub author: Principal,
    pub author_name: String,
    pub timestamp: DateTime<Utc>,
    pub description: Vec<Segment>,
    pub images: Vec<Url>,
    pub likes: u64,
    pub liked: bool,
    pub following_author: bool,
    pub is_own_post: bool,
    pub can_delete: bool,
    pub comment_count: usize,
}

impl PostCard {
    pub fn like_label(&self) -> String {
        like_label(self.likes)
    }

    /// Follow control only shows for a signed-in viewer on someone else's post.
    pub fn shows_follow(&self, authenticated: bool) -> bool {
        authenticated && !self.is_own_post
    }
}

/// Per-viewer facts about one post, gathered by the client.
#[derive(Debug, Clone, Default)]
pub struct CardFacts {
    pub author_name: String,
    pub likes: u64,
    pub liked: bool,
    pub following_author: bool,
    pub viewer: Option<Principal>,
    pub is_admin: bool,
}

pub fn post_card(id: PostId, post: &Post, facts: CardFacts) -> PostCard {
    PostCard {
        id,
        author: post.author.clone(),
        author_name: facts.author_name,
        timestamp: post.timestamp,
        description: linkify(&post.metadata.description),
        images: post.images.iter().map(|i| i.url.clone()).collect(),
        likes: facts.likes,
        liked: facts.liked,
        following_author: facts.following_author,
        is_own_post: facts.viewer.as_ref() == Some(&post.author),
        can_delete: facts.is_admin,
        comment_count: post.comments.len(),
    }
}
