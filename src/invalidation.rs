use crate::cache::{KeyPrefix, QueryKey};
use crate::guards::Action;
use crate::models::{CommentId, PostId, Principal};

/// A successful write, described by what it touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreatePost,
    AddComment {
        post: PostId,
        parent: Option<CommentId>,
    },
    DeleteComment {
        post: Option<PostId>,
        comment: CommentId,
    },
    DeletePost(PostId),
    Like(PostId),
    Follow(Principal),
    Unfollow(Principal),
    SaveProfile(Option<Principal>),
    AssignRole(Principal),
}

impl Mutation {
    pub fn action(&self) -> Action {
        match self {
            Mutation::CreatePost => Action::CreatePost,
            Mutation::AddComment { parent: None, .. } => Action::Comment,
            Mutation::AddComment { parent: Some(_), .. } => Action::Reply,
            Mutation::DeleteComment { .. } => Action::DeleteComment,
            Mutation::DeletePost(_) => Action::DeletePost,
            Mutation::Like(_) => Action::Like,
            Mutation::Follow(_) => Action::Follow,
            Mutation::Unfollow(_) => Action::Unfollow,
            Mutation::SaveProfile(_) => Action::SaveProfile,
            Mutation::AssignRole(_) => Action::AssignRole,
        }
    }

    /// The cache keys this write makes stale.
    pub fn invalidates(&self) -> Vec<KeyPrefix> {
        match self {
            Mutation::CreatePost | Mutation::DeletePost(_) => vec![QueryKey::Posts.into()],
            Mutation::AddComment { post, .. } => vec![
                QueryKey::Posts.into(),
                KeyPrefix::family("comment"),
                QueryKey::Post(*post).into(),
                QueryKey::PostComments(*post).into(),
            ],
            Mutation::DeleteComment { post, .. } => {
                let mut keys = vec![QueryKey::Posts.into(), KeyPrefix::family("comment")];
                match post {
                    Some(post) => {
                        keys.push(QueryKey::Post(*post).into());
                        keys.push(QueryKey::PostComments(*post).into());
                    }
                    None => {
                        keys.push(KeyPrefix::family("post"));
                        keys.push(KeyPrefix::family("postComments"));
                    }
                }
                keys
            }
            Mutation::Like(post) => vec![
                QueryKey::PostLikes(*post).into(),
                KeyPrefix::has_user_liked(*post),
            ],
            Mutation::Follow(target) | Mutation::Unfollow(target) => vec![
                QueryKey::Following.into(),
                QueryKey::IsFollowing(target.clone()).into(),
            ],
            Mutation::SaveProfile(caller) => {
                let mut keys = vec![QueryKey::CurrentUserProfile.into()];
                if let Some(caller) = caller {
                    keys.push(QueryKey::UserProfile(caller.clone()).into());
                }
                keys
            }
            Mutation::AssignRole(_) => vec![QueryKey::UserRole.into(), QueryKey::IsAdmin.into()],
        }
    }
}
