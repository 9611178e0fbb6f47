use futures::future::join_all;

use crate::error::AppResult;
use crate::gallery::{self, CardFacts, FeedState, FeedTab, PostCard};
use crate::models::{Post, PostId};

use super::GalleryClient;

impl GalleryClient {
    pub async fn feed(&self, tab: FeedTab) -> AppResult<FeedState> {
        let posts = self.all_posts().await?;
        match tab {
            FeedTab::All => Ok(gallery::all_feed(posts)),
            FeedTab::Following => {
                if !self.is_authenticated().await {
                    return Ok(gallery::following_feed(&posts, None));
                }
                let following = self.following().await?;
                Ok(gallery::following_feed(&posts, Some(following.as_slice())))
            }
        }
    }

    /// Cards for a feed. Each card's reads run concurrently; a failed read
    /// shows as its empty value rather than dropping the card.
    pub async fn post_cards(&self, posts: &[(PostId, Post)]) -> Vec<PostCard> {
        let is_admin = self.is_caller_admin().await.unwrap_or(false);
        join_all(
            posts
                .iter()
                .map(|(id, post)| self.post_card(*id, post, is_admin)),
        )
        .await
    }

    async fn post_card(&self, id: PostId, post: &Post, is_admin: bool) -> PostCard {
        let (author_name, likes, liked, following_author) = futures::join!(
            self.display_name_of(&post.author),
            self.post_likes(id),
            self.has_user_liked(id),
            self.is_following(&post.author),
        );

        let facts = CardFacts {
            author_name,
            likes: likes.unwrap_or_else(|e| {
                tracing::warn!("Like count for post {} unavailable: {}", id, e);
                0
            }),
            liked: liked.unwrap_or(false),
            following_author: following_author.unwrap_or(false),
            viewer: self.principal().await,
            is_admin,
        };
        gallery::post_card(id, post, facts)
    }
}
