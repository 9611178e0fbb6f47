use crate::blob::UploadProgress;
use crate::comments::{ReplyTarget, MAX_REPLY_DEPTH};
use crate::compose::PostDraft;
use crate::error::{AppError, AppResult};
use crate::guards::Action;
use crate::invalidation::Mutation;
use crate::models::{CommentId, PostId, Principal, UserRole};
use crate::profile::ProfileDraft;

use super::GalleryClient;

impl GalleryClient {
    /// Publish a draft. Session checks come first, then the draft itself;
    /// nothing is read from disk or sent until both pass.
    pub async fn create_post(&self, draft: PostDraft, progress: &UploadProgress) -> AppResult<PostId> {
        self.authorize(Action::CreatePost).await?;
        if let Err(e) = draft.validate() {
            self.notifier.error(e.to_string());
            return Err(e);
        }

        let author = self.principal().await;
        let (metadata, images) = match draft.into_upload(author, progress).await {
            Ok(upload) => upload,
            Err(e) => {
                self.notifier.error(e.to_string());
                return Err(e);
            }
        };

        self.commit(Mutation::CreatePost, Some("Post created successfully!"), |gw| async move {
            gw.create_nft_post(metadata, images).await
        })
        .await
    }

    /// Top-level comment. Blank content is dropped without a round trip.
    pub async fn add_comment(&self, post_id: PostId, content: &str) -> AppResult<CommentId> {
        self.authorize(Action::Comment).await?;
        let content = non_empty(content)?;
        self.commit(
            Mutation::AddComment {
                post: post_id,
                parent: None,
            },
            Some("Comment added!"),
            |gw| async move { gw.add_comment(post_id, content, None).await },
        )
        .await
    }

    pub async fn add_reply(&self, target: ReplyTarget, content: &str) -> AppResult<CommentId> {
        self.authorize(Action::Reply).await?;
        if target.depth() >= MAX_REPLY_DEPTH {
            return Err(AppError::Validation(format!(
                "Replies can only be nested {} levels deep",
                MAX_REPLY_DEPTH
            )));
        }
        let content = non_empty(content)?;
        let post_id = target.post_id();
        let parent = target.comment_id();
        self.commit(
            Mutation::AddComment {
                post: post_id,
                parent: Some(parent),
            },
            Some("Comment added!"),
            |gw| async move { gw.add_comment(post_id, content, Some(parent)).await },
        )
        .await
    }

    pub async fn delete_post(&self, id: PostId) -> AppResult<()> {
        self.authorize(Action::DeletePost).await?;
        self.commit(Mutation::DeletePost(id), Some("Post deleted"), |gw| async move {
            gw.delete_post(id).await
        })
        .await
    }

    pub async fn delete_comment(&self, id: CommentId) -> AppResult<()> {
        self.authorize(Action::DeleteComment).await?;
        // Knowing the post narrows what has to be refreshed
        let post = match self.comment(id).await {
            Ok(comment) => comment.map(|c| c.post_id),
            Err(_) => None,
        };
        self.commit(
            Mutation::DeleteComment { post, comment: id },
            Some("Comment deleted"),
            |gw| async move { gw.delete_comment(id).await },
        )
        .await
    }

    /// Toggle the caller's like. Returns whether the post is now liked.
    ///
    /// Once the toggle is accepted the result is `Ok` even if the fresh
    /// like state can't be read back; the state is then inferred from the
    /// state before the toggle.
    pub async fn like_post(&self, post_id: PostId) -> AppResult<bool> {
        self.authorize(Action::Like).await?;
        let before = self.has_user_liked(post_id).await.ok();
        self.commit(Mutation::Like(post_id), None, |gw| async move {
            gw.like_post(post_id).await
        })
        .await?;
        match self.has_user_liked(post_id).await {
            Ok(liked) => Ok(liked),
            Err(e) => {
                tracing::warn!("Like on post {} applied, state not refreshed: {}", post_id, e);
                Ok(before.map_or(true, |liked| !liked))
            }
        }
    }

    pub async fn follow(&self, target: &Principal) -> AppResult<()> {
        self.authorize(Action::Follow).await?;
        let who = target.clone();
        self.commit(Mutation::Follow(target.clone()), Some("User followed!"), |gw| async move {
            gw.follow_user(&who).await
        })
        .await
    }

    pub async fn unfollow(&self, target: &Principal) -> AppResult<()> {
        self.authorize(Action::Unfollow).await?;
        let who = target.clone();
        self.commit(Mutation::Unfollow(target.clone()), Some("User unfollowed"), |gw| async move {
            gw.unfollow_user(&who).await
        })
        .await
    }

    /// Follow or unfollow depending on the current state. Returns the new
    /// state.
    pub async fn toggle_follow(&self, target: &Principal) -> AppResult<bool> {
        if self.is_following(target).await? {
            self.unfollow(target).await?;
            Ok(false)
        } else {
            self.follow(target).await?;
            Ok(true)
        }
    }

    pub async fn save_profile(&self, draft: &ProfileDraft) -> AppResult<()> {
        self.authorize(Action::SaveProfile).await?;
        let profile = match draft.validate() {
            Ok(profile) => profile,
            Err(e) => {
                self.notifier.error(e.to_string());
                return Err(e);
            }
        };
        let caller = self.principal().await;
        self.commit(
            Mutation::SaveProfile(caller),
            Some("Profile saved successfully!"),
            |gw| async move { gw.save_caller_user_profile(profile).await },
        )
        .await
    }

    /// Admin only; the gateway enforces it.
    pub async fn assign_role(&self, user: &Principal, role: UserRole) -> AppResult<()> {
        self.authorize(Action::AssignRole).await?;
        let who = user.clone();
        self.commit(
            Mutation::AssignRole(user.clone()),
            Some("Role updated"),
            |gw| async move { gw.assign_caller_user_role(&who, role).await },
        )
        .await
    }
}

fn non_empty(content: &str) -> AppResult<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Comment cannot be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::*;
    use crate::cache::QueryKey;
    use crate::compose::ImageSource;
    use crate::error::ErrorClass;
    use crate::notify::NoticeLevel;

    fn image() -> ImageSource {
        ImageSource::Url(url::Url::parse("https://example.com/ape.png").unwrap())
    }

    fn draft(caption: &str, images: usize) -> PostDraft {
        let mut draft = PostDraft::new(caption);
        draft.attach((0..images).map(|_| image()).collect()).unwrap();
        draft
    }

    async fn publish(client: &GalleryClient) -> PostId {
        let (progress, _rx) = UploadProgress::new();
        client.create_post(draft("gm", 1), &progress).await.unwrap()
    }

    #[tokio::test]
    async fn create_post_reports_success_and_progress() {
        let h = Harness::new();
        let (client, _) = h.member("alice").await;
        let mut notices = client.subscribe();

        let (progress, rx) = UploadProgress::new();
        let id = client.create_post(draft("gm", 2), &progress).await.unwrap();
        assert_eq!(*rx.borrow(), 100);

        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Success);
        assert_eq!(notice.message, "Post created successfully!");
        let posts = client.all_posts().await.unwrap();
        assert_eq!(posts[0].0, id);
    }

    #[tokio::test]
    async fn login_prompt_wins_over_draft_errors() {
        let h = Harness::new();
        let client = h.client();
        let (progress, _rx) = UploadProgress::new();
        let err = client.create_post(PostDraft::new(""), &progress).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::NoSession);
        assert_eq!(err.to_string(), "Please log in to create a post");
    }

    #[tokio::test]
    async fn post_without_images_is_refused_locally() {
        let h = Harness::new();
        let (client, _) = h.member("alice").await;
        let (progress, _rx) = UploadProgress::new();
        let err = client.create_post(draft("gm", 0), &progress).await.unwrap_err();
        assert_eq!(err.to_string(), "Please add at least one image");
        assert!(client.all_posts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_comment_is_not_sent() {
        let h = Harness::new();
        let (client, _) = h.member("alice").await;
        let post = publish(&client).await;
        let err = client.add_comment(post, "   ").await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Invalid);
        assert!(client.post_comments(post).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn like_toggles_and_refreshes_count() {
        let h = Harness::new();
        let (client, _) = h.member("alice").await;
        let post = publish(&client).await;

        assert_eq!(client.post_likes(post).await.unwrap(), 0);
        assert!(!client.has_user_liked(post).await.unwrap());

        assert!(client.like_post(post).await.unwrap());
        assert_eq!(client.post_likes(post).await.unwrap(), 1);

        assert!(!client.like_post(post).await.unwrap());
        assert_eq!(client.post_likes(post).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn gateway_rejection_becomes_failure_notice() {
        let h = Harness::new();
        let (admin, _) = h.member("alice").await;
        let post = publish(&admin).await;
        let (member, _) = h.member("bob").await;

        member.all_posts().await.unwrap();
        member.post(post).await.unwrap();

        let mut notices = member.subscribe();
        let err = member.delete_post(post).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Gateway);
        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.starts_with("Failed to delete post: "));
        // A rejected write leaves cached reads alone
        assert!(member.is_cached(&QueryKey::Posts).await);
        assert!(member.is_cached(&QueryKey::Post(post)).await);

        admin.delete_post(post).await.unwrap();
        assert!(admin.all_posts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn follow_refreshes_following_state() {
        let h = Harness::new();
        let (alice, _) = h.member("alice").await;
        let (_, bob) = h.member("bob").await;

        assert!(!alice.is_following(&bob).await.unwrap());
        assert!(alice.toggle_follow(&bob).await.unwrap());
        assert!(alice.is_following(&bob).await.unwrap());
        assert_eq!(alice.following().await.unwrap(), vec![bob.clone()]);

        assert!(!alice.toggle_follow(&bob).await.unwrap());
        assert!(alice.following().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn saving_profile_refreshes_display_name() {
        let h = Harness::new();
        let (client, me) = h.member("alice").await;
        assert_eq!(client.display_name_of(&me).await, "alice");

        client
            .save_profile(&ProfileDraft::new("alice2", "a2@example.com"))
            .await
            .unwrap();
        assert_eq!(client.display_name_of(&me).await, "alice2");
        assert_eq!(
            client.caller_profile().await.unwrap().unwrap().username,
            "alice2"
        );
    }

    #[tokio::test]
    async fn delete_comment_refreshes_post_comments() {
        let h = Harness::new();
        let (client, _) = h.member("alice").await;
        let post = publish(&client).await;
        let id = client.add_comment(post, "hello").await.unwrap();
        assert_eq!(client.post_comments(post).await.unwrap().len(), 1);

        client.delete_comment(id).await.unwrap();
        assert!(!client.is_cached(&QueryKey::PostComments(post)).await);
        assert!(client.post_comments(post).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn role_assignment_by_admin() {
        let h = Harness::new();
        let (admin, _) = h.member("alice").await;
        let (member, bob) = h.member("bob").await;

        admin.assign_role(&bob, UserRole::Admin).await.unwrap();
        assert!(member.is_caller_admin().await.unwrap());
    }
}
