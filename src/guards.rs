// Client-side preconditions checked before any write reaches the gateway
use std::fmt;

use crate::models::UserProfile;

/// A user-initiated state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CreatePost,
    Comment,
    Reply,
    DeletePost,
    DeleteComment,
    Like,
    Follow,
    Unfollow,
    SaveProfile,
    AssignRole,
}

impl Action {
    /// Saving a profile is how a profile comes to exist, so it only needs a
    /// session.
    pub fn requires_profile(&self) -> bool {
        !matches!(self, Action::SaveProfile)
    }

    fn login_prompt(&self) -> &'static str {
        match self {
            Action::CreatePost => "Please log in to create a post",
            Action::Comment => "Please log in to comment",
            Action::Reply => "Please log in to reply",
            Action::DeletePost => "Please log in to delete posts",
            Action::DeleteComment => "Please log in to delete comments",
            Action::Like => "Please log in to like posts",
            Action::Follow | Action::Unfollow => "Please log in to follow users",
            Action::SaveProfile => "Please log in to save your profile",
            Action::AssignRole => "Please log in to manage roles",
        }
    }

    fn profile_prompt(&self) -> &'static str {
        match self {
            Action::CreatePost => "Please complete your profile before posting",
            Action::Comment => "Please complete your profile before commenting",
            Action::Reply => "Please complete your profile before replying",
            Action::DeletePost | Action::DeleteComment => {
                "Please complete your profile before moderating"
            }
            Action::Like => "Please complete your profile before liking posts",
            Action::Follow | Action::Unfollow => {
                "Please complete your profile before following users"
            }
            Action::SaveProfile | Action::AssignRole => "Please complete your profile setup",
        }
    }

    /// Label used in failure notices ("Failed to add comment").
    pub fn describe(&self) -> &'static str {
        match self {
            Action::CreatePost => "create post",
            Action::Comment => "add comment",
            Action::Reply => "add reply",
            Action::DeletePost => "delete post",
            Action::DeleteComment => "delete comment",
            Action::Like => "update like",
            Action::Follow => "follow user",
            Action::Unfollow => "unfollow user",
            Action::SaveProfile => "save profile",
            Action::AssignRole => "assign role",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardKind {
    NotAuthenticated,
    ProfileIncomplete,
}

/// Why an action was stopped before reaching the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardRejection {
    pub action: Action,
    pub kind: GuardKind,
}

impl fmt::Display for GuardRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prompt())
    }
}

impl std::error::Error for GuardRejection {}

impl GuardRejection {
    pub fn prompt(&self) -> &'static str {
        match self.kind {
            GuardKind::NotAuthenticated => self.action.login_prompt(),
            GuardKind::ProfileIncomplete => self.action.profile_prompt(),
        }
    }
}

/// The session facts a guard looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer<'a> {
    Anonymous,
    Authenticated { profile: Option<&'a UserProfile> },
}

impl fmt::Display for Viewer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Viewer::Anonymous => f.write_str("anonymous"),
            Viewer::Authenticated { profile: Some(p) } => write!(f, "{}", p.username),
            Viewer::Authenticated { profile: None } => f.write_str("profile-less user"),
        }
    }
}

/// Session first, then profile. An anonymous viewer is always told to log
/// in, whatever profile state might exist.
pub fn check(action: Action, viewer: Viewer<'_>) -> Result<(), GuardRejection> {
    match viewer {
        Viewer::Anonymous => Err(GuardRejection {
            action,
            kind: GuardKind::NotAuthenticated,
        }),
        Viewer::Authenticated { profile: None } if action.requires_profile() => {
            Err(GuardRejection {
                action,
                kind: GuardKind::ProfileIncomplete,
            })
        }
        Viewer::Authenticated { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Action; 10] = [
        Action::CreatePost,
        Action::Comment,
        Action::Reply,
        Action::DeletePost,
        Action::DeleteComment,
        Action::Like,
        Action::Follow,
        Action::Unfollow,
        Action::SaveProfile,
        Action::AssignRole,
    ];

    fn profile() -> UserProfile {
        UserProfile {
            username: "alice".into(),
            email: "alice@example.com".into(),
        }
    }

    #[test]
    fn anonymous_always_sees_login_prompt() {
        for action in ALL {
            let err = check(action, Viewer::Anonymous).unwrap_err();
            assert_eq!(err.kind, GuardKind::NotAuthenticated);
            assert!(err.prompt().starts_with("Please log in"), "{:?}", action);
        }
    }

    #[test]
    fn anonymous_commenter_never_sees_profile_prompt() {
        let err = check(Action::Comment, Viewer::Anonymous).unwrap_err();
        assert_eq!(err.to_string(), "Please log in to comment");
        assert!(!err.to_string().contains("profile"));
    }

    #[test]
    fn missing_profile_blocks_everything_but_saving_it() {
        for action in ALL {
            let result = check(action, Viewer::Authenticated { profile: None });
            if action == Action::SaveProfile {
                assert!(result.is_ok());
            } else {
                let err = result.unwrap_err();
                assert_eq!(err.kind, GuardKind::ProfileIncomplete);
                assert!(err.prompt().contains("complete your profile"));
            }
        }
    }

    #[test]
    fn complete_profile_passes() {
        let p = profile();
        for action in ALL {
            assert!(check(action, Viewer::Authenticated { profile: Some(&p) }).is_ok());
        }
    }

    #[test]
    fn prompts_name_the_action() {
        let err = check(Action::Reply, Viewer::Authenticated { profile: None }).unwrap_err();
        assert_eq!(err.prompt(), "Please complete your profile before replying");
        let err = check(Action::CreatePost, Viewer::Anonymous).unwrap_err();
        assert_eq!(err.prompt(), "Please log in to create a post");
    }
}
