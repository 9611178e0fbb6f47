use std::path::PathBuf;

use async_trait::async_trait;

use super::{IdentityError, IdentityProvider};
use crate::models::Principal;

/// Identity kept in a local key file. Logging in the first time generates a
/// principal and stores it; later logins reuse it. A marker file records
/// whether the principal is currently signed in.
pub struct KeyFileIdentity {
    key_path: PathBuf,
}

impl KeyFileIdentity {
    pub fn new(key_path: PathBuf) -> Self {
        Self { key_path }
    }

    fn session_marker(&self) -> PathBuf {
        self.key_path.with_extension("session")
    }

    async fn load_or_create(&self) -> Result<Principal, IdentityError> {
        match tokio::fs::read_to_string(&self.key_path).await {
            Ok(text) => Ok(Principal::from_text(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = self.key_path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let principal = Principal::generate();
                tokio::fs::write(&self.key_path, principal.as_str()).await?;
                tracing::info!("Generated new identity {}", principal);
                Ok(principal)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl IdentityProvider for KeyFileIdentity {
    async fn restore(&self) -> Result<Option<Principal>, IdentityError> {
        if !tokio::fs::try_exists(self.session_marker()).await? {
            return Ok(None);
        }
        match tokio::fs::read_to_string(&self.key_path).await {
            Ok(text) => Ok(Some(Principal::from_text(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn login(&self) -> Result<Principal, IdentityError> {
        let principal = self.load_or_create().await?;
        tokio::fs::write(self.session_marker(), b"").await?;
        Ok(principal)
    }

    async fn logout(&self) -> Result<(), IdentityError> {
        match tokio::fs::remove_file(self.session_marker()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn login_generates_then_reuses_principal() {
        let tmp = tempfile::tempdir().unwrap();
        let identity = KeyFileIdentity::new(tmp.path().join("keys/identity"));

        let first = identity.login().await.unwrap();
        let second = identity.login().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn restore_follows_login_and_logout() {
        let tmp = tempfile::tempdir().unwrap();
        let identity = KeyFileIdentity::new(tmp.path().join("identity"));

        assert!(identity.restore().await.unwrap().is_none());
        let who = identity.login().await.unwrap();
        assert_eq!(identity.restore().await.unwrap(), Some(who.clone()));

        identity.logout().await.unwrap();
        assert!(identity.restore().await.unwrap().is_none());
        // Logging out twice is harmless
        identity.logout().await.unwrap();

        // The key survives logout
        assert_eq!(identity.login().await.unwrap(), who);
    }

    #[tokio::test]
    async fn corrupt_key_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("identity");
        std::fs::write(&path, "NOT A PRINCIPAL").unwrap();
        let identity = KeyFileIdentity::new(path);
        assert!(matches!(
            identity.login().await.unwrap_err(),
            IdentityError::InvalidPrincipal(_)
        ));
    }
}
