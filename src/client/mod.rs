//! The gallery client: one session, one gateway binding, one query cache.
//!
//! Reads go through [`GalleryClient::cached`]. Writes go through the guard,
//! then the gateway, then invalidate the keys their [`Mutation`] names.

mod feed;
mod mutations;
mod queries;
mod threads;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::cache::{QueryCache, QueryKey};
use crate::error::{AppError, AppResult};
use crate::gateway::{Connect, Gateway, GatewayResult};
use crate::guards::{self, Action, Viewer};
use crate::identity::{IdentityProvider, IdentitySession, LoginStatus};
use crate::invalidation::Mutation;
use crate::models::Principal;
use crate::notify::{Notice, Notifier};

pub struct GalleryClient {
    connector: Arc<dyn Connect>,
    identity: Arc<dyn IdentityProvider>,
    session: RwLock<IdentitySession>,
    gateway: RwLock<Arc<dyn Gateway>>,
    cache: Mutex<QueryCache>,
    notifier: Notifier,
}

impl GalleryClient {
    /// Starts anonymous. Call [`restore_session`](Self::restore_session) to
    /// pick up an existing login.
    pub fn new(
        connector: Arc<dyn Connect>,
        identity: Arc<dyn IdentityProvider>,
        stale_after: Duration,
    ) -> Self {
        let gateway = connector.connect(None);
        Self {
            connector,
            identity,
            session: RwLock::new(IdentitySession::anonymous()),
            gateway: RwLock::new(gateway),
            cache: Mutex::new(QueryCache::new(stale_after)),
            notifier: Notifier::new(),
        }
    }

    pub async fn restore_session(&self) -> AppResult<Option<Principal>> {
        let restored = self.identity.restore().await?;
        if let Some(principal) = &restored {
            tracing::info!("Restored session for {}", principal);
            *self.session.write().await = IdentitySession::signed_in(principal.clone());
            self.rebind(Some(principal.clone())).await;
        }
        Ok(restored)
    }

    pub async fn login(&self) -> AppResult<Principal> {
        self.session.write().await.begin_login();
        let result = self.identity.login().await;
        self.session.write().await.finish_login(&result);

        match result {
            Ok(principal) => {
                tracing::info!("Logged in as {}", principal);
                self.rebind(Some(principal.clone())).await;
                Ok(principal)
            }
            Err(e) => {
                tracing::warn!("Login failed: {}", e);
                Err(e.into())
            }
        }
    }

    pub async fn logout(&self) -> AppResult<()> {
        self.identity.logout().await?;
        self.session.write().await.clear();
        self.rebind(None).await;
        tracing::info!("Logged out");
        Ok(())
    }

    pub async fn principal(&self) -> Option<Principal> {
        self.session.read().await.principal().cloned()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.is_authenticated()
    }

    pub async fn login_status(&self) -> LoginStatus {
        self.session.read().await.status().clone()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notifier.subscribe()
    }

    /// Number of cache entries, fresh or not.
    pub async fn cached_entries(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn is_cached(&self, key: &QueryKey) -> bool {
        self.cache.lock().await.is_fresh(key)
    }

    /// Identity changed: every cached read belonged to the old caller.
    async fn rebind(&self, caller: Option<Principal>) {
        *self.gateway.write().await = self.connector.connect(caller);
        self.cache.lock().await.clear();
    }

    pub(crate) async fn gateway(&self) -> Arc<dyn Gateway> {
        self.gateway.read().await.clone()
    }

    /// Serve `key` from the cache, or fetch it and store the result.
    pub(crate) async fn cached<T, F, Fut>(&self, key: QueryKey, fetch: F) -> GatewayResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Arc<dyn Gateway>) -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let epoch = {
            let cache = self.cache.lock().await;
            if let Some(hit) = cache.get::<T>(&key) {
                tracing::debug!("Cache hit {}", key);
                return Ok(hit);
            }
            cache.epoch()
        };

        tracing::debug!("Cache miss {}", key);
        let value = fetch(self.gateway().await).await?;

        let mut cache = self.cache.lock().await;
        if cache.epoch() == epoch {
            cache.insert(key, &value);
        } else {
            tracing::debug!("Not storing {}: invalidated while in flight", key);
        }
        Ok(value)
    }

    /// Check the session preconditions of `action`. The profile is only
    /// looked up once a session exists. A rejection is also sent as a notice.
    pub async fn authorize(&self, action: Action) -> AppResult<()> {
        let authenticated = self.is_authenticated().await;
        let profile = if authenticated && action.requires_profile() {
            self.caller_profile().await?
        } else {
            None
        };

        let viewer = if authenticated {
            Viewer::Authenticated {
                profile: profile.as_ref(),
            }
        } else {
            Viewer::Anonymous
        };

        guards::check(action, viewer).map_err(|rejection| {
            tracing::debug!("{} blocked for {}: {}", action.describe(), viewer, rejection);
            self.notifier.error(rejection.prompt());
            AppError::from(rejection)
        })
    }

    /// Run an already-authorized write, then invalidate what it touched.
    /// Failures come back as notices carrying the gateway's message.
    pub(crate) async fn commit<T, F, Fut>(
        &self,
        mutation: Mutation,
        success: Option<&str>,
        call: F,
    ) -> AppResult<T>
    where
        F: FnOnce(Arc<dyn Gateway>) -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let action = mutation.action();
        match call(self.gateway().await).await {
            Ok(value) => {
                let mut cache = self.cache.lock().await;
                for prefix in mutation.invalidates() {
                    cache.invalidate(&prefix);
                }
                drop(cache);
                if let Some(message) = success {
                    self.notifier.success(message);
                }
                Ok(value)
            }
            Err(source) => {
                let err = AppError::gateway(action.describe(), source);
                self.notifier.error(err.to_string());
                Err(err)
            }
        }
    }
}
