use crate::comments::{CommentView, ReplyTarget, ThreadWalk};
use crate::error::{AppError, AppResult};
use crate::models::{CommentId, PostId};

use super::GalleryClient;

impl GalleryClient {
    /// Resolve a post's thread comment by comment through the cache.
    ///
    /// A comment that is missing or fails to load is left out together with
    /// its replies; the rest of the thread still renders.
    pub async fn resolve_thread(&self, post_id: PostId, roots: &[CommentId]) -> Vec<CommentView> {
        let is_admin = self.is_caller_admin().await.unwrap_or(false);
        let mut walk = ThreadWalk::new(roots);
        let mut views = Vec::new();

        while let Some((id, depth)) = walk.next() {
            let comment = match self.comment(id).await {
                Ok(Some(comment)) => comment,
                Ok(None) => {
                    tracing::debug!("Comment {} no longer exists", id);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Skipping comment {}: {}", id, e);
                    continue;
                }
            };
            if comment.post_id != post_id {
                tracing::warn!("Comment {} belongs to post {}, not {}", id, comment.post_id, post_id);
                continue;
            }
            walk.descend(&comment.replies, depth);
            let author_name = self.display_name_of(&comment.author).await;
            views.push(CommentView::new(comment, depth, author_name, is_admin));
        }
        views
    }

    /// The full thread of a post, in display order.
    pub async fn post_thread(&self, post_id: PostId) -> AppResult<Vec<CommentView>> {
        let post = self.post(post_id).await?.ok_or_else(|| {
            AppError::Validation(format!("Post {} not found", post_id))
        })?;
        Ok(self.resolve_thread(post_id, &post.comments).await)
    }

    /// Find the comment to reply to as it appears in its post's thread.
    pub async fn reply_target(&self, post_id: PostId, comment_id: CommentId) -> AppResult<ReplyTarget> {
        let thread = self.post_thread(post_id).await?;
        let view = thread
            .iter()
            .find(|v| v.id == comment_id)
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Comment {} not found on post {}",
                    comment_id, post_id
                ))
            })?;
        view.reply_target().ok_or_else(|| {
            AppError::Validation(format!(
                "Replies can only be nested {} levels deep",
                crate::comments::MAX_REPLY_DEPTH
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use crate::cache::QueryKey;
    use crate::compose::{ImageSource, PostDraft};
    use crate::blob::UploadProgress;
    use crate::models::PostId;

    async fn seeded_post(client: &super::GalleryClient) -> PostId {
        let mut draft = PostDraft::new("gm");
        draft
            .attach(vec![ImageSource::Url(
                url::Url::parse("https://example.com/a.png").unwrap(),
            )])
            .unwrap();
        let (progress, _rx) = UploadProgress::new();
        client.create_post(draft, &progress).await.unwrap()
    }

    #[tokio::test]
    async fn thread_resolves_nested_replies() {
        let h = Harness::new();
        let (client, _) = h.member("alice").await;
        let post = seeded_post(&client).await;

        let top = client.add_comment(post, "first").await.unwrap();
        let target = client.reply_target(post, top).await.unwrap();
        let reply = client.add_reply(target, "second").await.unwrap();

        let thread = client.post_thread(post).await.unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].id, top);
        assert_eq!(thread[0].author_name, "alice");
        assert_eq!(thread[1].id, reply);
        assert_eq!(thread[1].depth, 1);
        assert!(client.is_cached(&QueryKey::Comment(reply)).await);
    }

    #[tokio::test]
    async fn fourth_level_cannot_be_targeted() {
        let h = Harness::new();
        let (client, _) = h.member("alice").await;
        let post = seeded_post(&client).await;

        let mut parent = client.add_comment(post, "depth 0").await.unwrap();
        for depth in 1..=3 {
            let target = client.reply_target(post, parent).await.unwrap();
            parent = client
                .add_reply(target, &format!("depth {}", depth))
                .await
                .unwrap();
        }
        let err = client.reply_target(post, parent).await.unwrap_err();
        assert!(err.to_string().contains("nested 3 levels"));
    }

    #[tokio::test]
    async fn unknown_roots_are_skipped() {
        let h = Harness::new();
        let (client, _) = h.member("alice").await;
        let post = seeded_post(&client).await;
        let top = client.add_comment(post, "kept").await.unwrap();

        let views = client
            .resolve_thread(post, &[crate::models::CommentId(999), top])
            .await;
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].id, top);
    }
}
