use crate::error::AppError;
use crate::models::UserProfile;

/// Raw profile form input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileDraft {
    pub username: String,
    pub email: String,
}

impl ProfileDraft {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
        }
    }

    /// Pre-fill an edit form from the saved profile.
    pub fn from_profile(profile: &UserProfile) -> Self {
        Self::new(profile.username.clone(), profile.email.clone())
    }

    pub fn is_valid(&self) -> bool {
        !self.username.trim().is_empty() && !self.email.trim().is_empty()
    }

    pub fn validate(&self) -> Result<UserProfile, AppError> {
        if !self.is_valid() {
            return Err(AppError::Validation(
                "Username and email are required".to_string(),
            ));
        }
        Ok(UserProfile {
            username: self.username.trim().to_string(),
            email: self.email.trim().to_string(),
        })
    }
}

/// Name shown next to content. Authors without a profile show as "User".
pub fn display_name(profile: Option<&UserProfile>) -> String {
    profile
        .map(|p| p.username.clone())
        .unwrap_or_else(|| "User".to_string())
}

/// Whether to ask the viewer to set up a profile: only once the profile
/// read has completed for a signed-in viewer and came back empty.
pub fn needs_setup(authenticated: bool, fetched: bool, profile: Option<&UserProfile>) -> bool {
    authenticated && fetched && profile.is_none()
}
