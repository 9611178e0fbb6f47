pub mod keyfile;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{InvalidPrincipal, Principal};

pub use keyfile::KeyFileIdentity;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    InvalidPrincipal(#[from] InvalidPrincipal),

    #[error("Login failed: {0}")]
    Failed(String),
}

/// Where the login lifecycle currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoginStatus {
    #[default]
    Idle,
    LoggingIn,
    Success,
    LoginError(String),
}

impl LoginStatus {
    pub fn is_logging_in(&self) -> bool {
        matches!(self, LoginStatus::LoggingIn)
    }
}

/// External identity provider: proves who the caller is.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// A principal that is already signed in, if any.
    async fn restore(&self) -> Result<Option<Principal>, IdentityError>;

    async fn login(&self) -> Result<Principal, IdentityError>;

    async fn logout(&self) -> Result<(), IdentityError>;
}

/// The current authenticated principal and the state of the last login.
#[derive(Debug, Clone, Default)]
pub struct IdentitySession {
    principal: Option<Principal>,
    status: LoginStatus,
}

impl IdentitySession {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
            status: LoginStatus::Success,
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    pub fn status(&self) -> &LoginStatus {
        &self.status
    }

    pub(crate) fn begin_login(&mut self) {
        self.status = LoginStatus::LoggingIn;
    }

    pub(crate) fn finish_login(&mut self, result: &Result<Principal, IdentityError>) {
        match result {
            Ok(principal) => {
                self.principal = Some(principal.clone());
                self.status = LoginStatus::Success;
            }
            Err(e) => {
                self.status = LoginStatus::LoginError(e.to_string());
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.principal = None;
        self.status = LoginStatus::Idle;
    }
}
