use crate::cache::QueryKey;
use crate::error::{AppError, AppResult};
use crate::models::{Comment, CommentId, Post, PostId, Principal, UserProfile, UserRole};

use super::GalleryClient;

impl GalleryClient {
    /// Every post, newest first.
    pub async fn all_posts(&self) -> AppResult<Vec<(PostId, Post)>> {
        let mut posts = self
            .cached(QueryKey::Posts, |gw| async move { gw.get_all_posts().await })
            .await
            .map_err(|e| AppError::gateway("load posts", e))?;
        crate::gallery::sort_newest_first(&mut posts);
        Ok(posts)
    }

    pub async fn post(&self, id: PostId) -> AppResult<Option<Post>> {
        self.cached(QueryKey::Post(id), |gw| async move { gw.get_post(id).await })
            .await
            .map_err(|e| AppError::gateway("load post", e))
    }

    pub async fn user_posts(&self, user: &Principal) -> AppResult<Vec<Post>> {
        let owner = user.clone();
        self.cached(QueryKey::UserPosts(user.clone()), |gw| async move {
            gw.get_user_posts(&owner).await
        })
        .await
        .map_err(|e| AppError::gateway("load user posts", e))
    }

    pub async fn comment(&self, id: CommentId) -> AppResult<Option<Comment>> {
        self.cached(QueryKey::Comment(id), |gw| async move { gw.get_comment(id).await })
            .await
            .map_err(|e| AppError::gateway("load comment", e))
    }

    pub async fn post_comments(&self, post_id: PostId) -> AppResult<Vec<Comment>> {
        self.cached(QueryKey::PostComments(post_id), |gw| async move {
            gw.get_post_comments(post_id).await
        })
        .await
        .map_err(|e| AppError::gateway("load comments", e))
    }

    pub async fn post_likes(&self, post_id: PostId) -> AppResult<u64> {
        self.cached(QueryKey::PostLikes(post_id), |gw| async move {
            gw.get_post_likes(post_id).await
        })
        .await
        .map_err(|e| AppError::gateway("load likes", e))
    }

    /// Always false without a session; the gateway is not asked.
    pub async fn has_user_liked(&self, post_id: PostId) -> AppResult<bool> {
        let Some(viewer) = self.principal().await else {
            return Ok(false);
        };
        let key = QueryKey::HasUserLiked(post_id, viewer.clone());
        self.cached(key, |gw| async move { gw.has_user_liked(post_id, &viewer).await })
            .await
            .map_err(|e| AppError::gateway("load like state", e))
    }

    pub async fn is_following(&self, target: &Principal) -> AppResult<bool> {
        if !self.is_authenticated().await {
            return Ok(false);
        }
        let who = target.clone();
        self.cached(QueryKey::IsFollowing(target.clone()), |gw| async move {
            gw.is_following_user(&who).await
        })
        .await
        .map_err(|e| AppError::gateway("load follow state", e))
    }

    pub async fn following(&self) -> AppResult<Vec<Principal>> {
        self.cached(QueryKey::Following, |gw| async move { gw.get_following().await })
            .await
            .map_err(|e| AppError::gateway("load following", e))
    }

    pub async fn followers(&self) -> AppResult<Vec<Principal>> {
        self.cached(QueryKey::Followers, |gw| async move { gw.get_followers().await })
            .await
            .map_err(|e| AppError::gateway("load followers", e))
    }

    pub async fn caller_profile(&self) -> AppResult<Option<UserProfile>> {
        self.cached(QueryKey::CurrentUserProfile, |gw| async move {
            gw.get_caller_user_profile().await
        })
        .await
        .map_err(|e| AppError::gateway("load profile", e))
    }

    pub async fn user_profile(&self, user: &Principal) -> AppResult<Option<UserProfile>> {
        let who = user.clone();
        self.cached(QueryKey::UserProfile(user.clone()), |gw| async move {
            gw.get_user_profile(&who).await
        })
        .await
        .map_err(|e| AppError::gateway("load profile", e))
    }

    pub async fn caller_role(&self) -> AppResult<UserRole> {
        self.cached(QueryKey::UserRole, |gw| async move {
            gw.get_caller_user_role().await
        })
        .await
        .map_err(|e| AppError::gateway("load role", e))
    }

    pub async fn is_caller_admin(&self) -> AppResult<bool> {
        self.cached(QueryKey::IsAdmin, |gw| async move { gw.is_caller_admin().await })
            .await
            .map_err(|e| AppError::gateway("load role", e))
    }

    /// Display name for a principal, "User" when it has no profile or the
    /// lookup fails.
    pub async fn display_name_of(&self, user: &Principal) -> String {
        match self.user_profile(user).await {
            Ok(profile) => crate::profile::display_name(profile.as_ref()),
            Err(e) => {
                tracing::debug!("No display name for {}: {}", user, e);
                crate::profile::display_name(None)
            }
        }
    }
}
