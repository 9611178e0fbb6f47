pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::blob::ExternalBlob;
use crate::models::{
    Comment, CommentId, Post, PostId, PostMetadata, Principal, UserProfile, UserRole,
};

pub use sqlite::{SqliteConnector, SqliteGateway};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Rejected(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Typed operations of the remote backend. Every call is made on behalf of
/// the caller the gateway was connected with.
#[async_trait]
pub trait Gateway: Send + Sync {
    // Posts
    async fn get_all_posts(&self) -> GatewayResult<Vec<(PostId, Post)>>;
    async fn get_post(&self, id: PostId) -> GatewayResult<Option<Post>>;
    async fn get_user_posts(&self, user: &Principal) -> GatewayResult<Vec<Post>>;
    async fn create_nft_post(
        &self,
        metadata: PostMetadata,
        images: Vec<ExternalBlob>,
    ) -> GatewayResult<PostId>;
    /// Admin only
    async fn delete_post(&self, id: PostId) -> GatewayResult<()>;

    // Comments
    async fn get_comment(&self, id: CommentId) -> GatewayResult<Option<Comment>>;
    async fn get_post_comments(&self, post_id: PostId) -> GatewayResult<Vec<Comment>>;
    async fn add_comment(
        &self,
        post_id: PostId,
        content: String,
        parent_id: Option<CommentId>,
    ) -> GatewayResult<CommentId>;
    /// Admin only
    async fn delete_comment(&self, id: CommentId) -> GatewayResult<()>;

    // Likes
    async fn get_post_likes(&self, post_id: PostId) -> GatewayResult<u64>;
    async fn has_user_liked(&self, post_id: PostId, user: &Principal) -> GatewayResult<bool>;
    /// Toggles the caller's like on the post
    async fn like_post(&self, post_id: PostId) -> GatewayResult<()>;

    // Follows
    async fn follow_user(&self, target: &Principal) -> GatewayResult<()>;
    async fn unfollow_user(&self, target: &Principal) -> GatewayResult<()>;
    async fn is_following_user(&self, target: &Principal) -> GatewayResult<bool>;
    async fn get_following(&self) -> GatewayResult<Vec<Principal>>;
    async fn get_followers(&self) -> GatewayResult<Vec<Principal>>;

    // Profiles and roles
    async fn get_caller_user_profile(&self) -> GatewayResult<Option<UserProfile>>;
    async fn get_user_profile(&self, user: &Principal) -> GatewayResult<Option<UserProfile>>;
    async fn save_caller_user_profile(&self, profile: UserProfile) -> GatewayResult<()>;
    async fn get_caller_user_role(&self) -> GatewayResult<UserRole>;
    async fn is_caller_admin(&self) -> GatewayResult<bool>;
    /// Admin only
    async fn assign_caller_user_role(&self, user: &Principal, role: UserRole)
        -> GatewayResult<()>;
}

/// Builds a gateway bound to a caller. The client reconnects whenever the
/// identity changes; `None` is the anonymous caller.
pub trait Connect: Send + Sync {
    fn connect(&self, caller: Option<Principal>) -> Arc<dyn Gateway>;
}
