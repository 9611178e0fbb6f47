use crate::gateway::GatewayError;
use crate::guards::{GuardKind, GuardRejection};
use crate::identity::IdentityError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Guard(#[from] GuardRejection),

    #[error("{0}")]
    Validation(String),

    #[error("Failed to {action}: {source}")]
    Gateway {
        action: &'static str,
        #[source]
        source: GatewayError,
    },

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a failure came from, which decides how it is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// No session; shown as an inline log-in prompt
    NoSession,
    /// Session without profile; shown as a complete-profile prompt
    IncompleteProfile,
    /// Rejected locally before any remote call
    Invalid,
    /// Network or remote rejection; shown as a transient notice
    Gateway,
    /// Local environment (identity store, files)
    Local,
}

impl AppError {
    pub fn gateway(action: &'static str, source: GatewayError) -> Self {
        AppError::Gateway { action, source }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::Guard(rejection) => match rejection.kind {
                GuardKind::NotAuthenticated => ErrorClass::NoSession,
                GuardKind::ProfileIncomplete => ErrorClass::IncompleteProfile,
            },
            AppError::Validation(_) => ErrorClass::Invalid,
            AppError::Gateway { .. } => ErrorClass::Gateway,
            AppError::Identity(_) | AppError::Io(_) => ErrorClass::Local,
        }
    }

    /// True for failures caught before the gateway was contacted.
    pub fn is_client_side(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::NoSession | ErrorClass::IncompleteProfile | ErrorClass::Invalid
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;
