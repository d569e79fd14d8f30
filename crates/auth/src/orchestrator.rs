//! Top-level session acquisition: try the cache, fall back to a fresh
//! provider login, write successful fresh logins back.

use crate::cache::SessionCache;
use crate::provider::{
    AccountType, Credentials, IdentityProvider, LoginFailure, RedirectPrompt, create_provider,
};
use crate::session::SessionToken;
use craft_net::Transport;
use std::sync::Arc;
use tracing::{debug, info, warn};

type ProviderFactory = Arc<
    dyn Fn(AccountType, Arc<Transport>, Arc<dyn RedirectPrompt>) -> Box<dyn IdentityProvider>
        + Send
        + Sync,
>;

pub struct SessionOrchestrator {
    cache: SessionCache,
    transport: Arc<Transport>,
    prompt: Arc<dyn RedirectPrompt>,
    provider_factory: ProviderFactory,
}

impl SessionOrchestrator {
    pub fn new(
        cache: SessionCache,
        transport: Arc<Transport>,
        prompt: Arc<dyn RedirectPrompt>,
    ) -> Self {
        Self {
            cache,
            transport,
            prompt,
            provider_factory: Arc::new(create_provider),
        }
    }

    /// Swap out the provider construction. Used by tests to exercise the
    /// orchestration paths without network access.
    pub fn with_provider_factory(mut self, factory: ProviderFactory) -> Self {
        self.provider_factory = factory;
        self
    }

    /// Resolve a session for the given credentials.
    ///
    /// Performs at most one cache write, one remote validation and one
    /// fresh login. An empty password with no cached entry produces an
    /// offline session without touching the network.
    pub async fn get_session(
        &self,
        credentials: &Credentials,
    ) -> Result<SessionToken, LoginFailure> {
        let login = credentials.username.to_lowercase();
        let provider = (self.provider_factory)(
            credentials.account,
            self.transport.clone(),
            self.prompt.clone(),
        );

        match self.cache.get(&login).await {
            Some(cached) => match provider.validate(&cached).await {
                Ok(()) => {
                    info!(player = %cached.player_name, "cached session is still valid");
                    return Ok(cached);
                }
                Err(failure) => {
                    debug!(%failure, "cached session rejected, performing a fresh login");
                }
            },
            None if credentials.is_offline() => {
                info!(login = %credentials.username, "no password supplied, starting offline session");
                return Ok(SessionToken::offline(credentials.username.clone()));
            }
            None => {}
        }

        match provider.login(credentials).await {
            Ok(token) => {
                self.cache.store(&login, token.clone()).await;
                info!(player = %token.player_name, "logged in");
                Ok(token)
            }
            Err(failure) => {
                warn!(%failure, "login failed");
                Err(failure)
            }
        }
    }
}

/// The one human-facing line for a failed login. Display only; callers that
/// need to branch keep the [`LoginFailure`] itself.
pub fn login_failure_message(failure: &LoginFailure) -> String {
    format!("Login failed: {}", failure.user_message())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePaths;
    use crate::provider::LoginMethod;
    use async_trait::async_trait;
    use craft_net::TransportConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    const UUID: &str = "1234567890abcdef1234567890abcdef";
    const CLIENT: &str = "abcdef1234567890abcdef1234567890";

    struct NoPrompt;

    #[async_trait]
    impl RedirectPrompt for NoPrompt {
        async fn obtain_redirect(&self, _sign_in_url: &str) -> Option<String> {
            None
        }
    }

    #[derive(Default)]
    struct FakeProvider {
        validate_ok: bool,
        login_result: Option<SessionToken>,
        validations: Arc<AtomicU32>,
        logins: Arc<AtomicU32>,
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        async fn login(&self, _credentials: &Credentials) -> Result<SessionToken, LoginFailure> {
            self.logins.fetch_add(1, Ordering::Relaxed);
            self.login_result
                .clone()
                .ok_or(LoginFailure::WrongCredentials)
        }

        async fn validate(&self, _token: &SessionToken) -> Result<(), LoginFailure> {
            self.validations.fetch_add(1, Ordering::Relaxed);
            if self.validate_ok {
                Ok(())
            } else {
                Err(LoginFailure::LoginRequired)
            }
        }

        async fn refresh(&self, _token: &SessionToken) -> Result<SessionToken, LoginFailure> {
            Err(LoginFailure::LoginRequired)
        }
    }

    fn fresh_token(access: &str) -> SessionToken {
        SessionToken {
            access_token: access.to_string(),
            player_name: "Alice".to_string(),
            player_id: UUID.to_string(),
            client_id: CLIENT.to_string(),
        }
    }

    fn credentials(username: &str, password: &str) -> Credentials {
        Credentials {
            account: AccountType::Mojang,
            method: LoginMethod::Credentials,
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    struct Harness {
        orchestrator: SessionOrchestrator,
        cache: SessionCache,
        validations: Arc<AtomicU32>,
        logins: Arc<AtomicU32>,
        _dir: TempDir,
    }

    fn harness(validate_ok: bool, login_result: Option<SessionToken>) -> Harness {
        let dir = TempDir::new().unwrap();
        let cache = SessionCache::new(CachePaths::in_dir(dir.path()));
        let transport = Arc::new(
            Transport::new(None, TransportConfig::default(), CancellationToken::new()).unwrap(),
        );
        let validations = Arc::new(AtomicU32::new(0));
        let logins = Arc::new(AtomicU32::new(0));

        let (v, l) = (validations.clone(), logins.clone());
        let factory: ProviderFactory = Arc::new(move |_, _, _| {
            Box::new(FakeProvider {
                validate_ok,
                login_result: login_result.clone(),
                validations: v.clone(),
                logins: l.clone(),
            })
        });

        let orchestrator = SessionOrchestrator::new(cache.clone(), transport, Arc::new(NoPrompt))
            .with_provider_factory(factory);
        Harness {
            orchestrator,
            cache,
            validations,
            logins,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn offline_session_skips_network_and_cache_write() {
        let h = harness(true, None);
        let session = h
            .orchestrator
            .get_session(&credentials("Steve", ""))
            .await
            .unwrap();
        assert_eq!(session.player_id, "0");
        assert_eq!(session.player_name, "Steve");
        assert_eq!(h.validations.load(Ordering::Relaxed), 0);
        assert_eq!(h.logins.load(Ordering::Relaxed), 0);
        assert!(!h.cache.contains("steve").await);
    }

    #[tokio::test]
    async fn valid_cached_session_is_returned_unchanged() {
        let h = harness(true, None);
        h.cache.store("alice", fresh_token("CACHED")).await;

        let session = h
            .orchestrator
            .get_session(&credentials("Alice", "hunter2"))
            .await
            .unwrap();
        assert_eq!(session.access_token, "CACHED");
        assert_eq!(h.validations.load(Ordering::Relaxed), 1);
        assert_eq!(h.logins.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn rejected_cached_session_falls_back_to_fresh_login() {
        let h = harness(false, Some(fresh_token("FRESH")));
        h.cache.store("alice", fresh_token("STALE")).await;

        let session = h
            .orchestrator
            .get_session(&credentials("Alice", "hunter2"))
            .await
            .unwrap();
        assert_eq!(session.access_token, "FRESH");
        assert_eq!(h.validations.load(Ordering::Relaxed), 1);
        assert_eq!(h.logins.load(Ordering::Relaxed), 1);
        // The fresh token replaced the stale cache entry.
        assert_eq!(h.cache.get("alice").await.unwrap().access_token, "FRESH");
    }

    #[tokio::test]
    async fn fresh_login_is_written_back_under_lowercased_login() {
        let h = harness(true, Some(fresh_token("FRESH")));
        let session = h
            .orchestrator
            .get_session(&credentials("Alice", "hunter2"))
            .await
            .unwrap();
        assert_eq!(session.access_token, "FRESH");
        assert!(h.cache.contains("alice").await);
    }

    #[tokio::test]
    async fn failed_login_surfaces_the_failure_kind() {
        let h = harness(true, None);
        let failure = h
            .orchestrator
            .get_session(&credentials("Alice", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(failure, LoginFailure::WrongCredentials));
        assert_eq!(
            login_failure_message(&failure),
            "Login failed: Incorrect username or password."
        );
        assert!(!h.cache.contains("alice").await);
    }
}
