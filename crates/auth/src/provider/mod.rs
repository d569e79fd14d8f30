//! Identity providers: strategies that turn credentials into session tokens.

pub mod msa;
pub mod yggdrasil;

use crate::session::SessionToken;
use async_trait::async_trait;
use craft_net::{NetError, Transport};
use std::sync::Arc;
use thiserror::Error;

pub use msa::MsaProvider;
pub use yggdrasil::YggdrasilProvider;

/// Which account backend a login goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    Mojang,
    Microsoft,
}

/// How the multi-hop provider obtains its first token pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMethod {
    /// Exchange the local username/password directly.
    Credentials,
    /// The user completes sign-in in a browser and pastes the redirect back.
    Browser,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub account: AccountType,
    pub method: LoginMethod,
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// An empty password requests an offline, unauthenticated session.
    pub fn is_offline(&self) -> bool {
        self.password.is_empty()
    }
}

/// Closed set of login outcomes. Callers branch on the variant; free-form
/// text only rides along for diagnostics and display.
#[derive(Debug, Error)]
pub enum LoginFailure {
    #[error("wrong username or password")]
    WrongCredentials,

    #[error("account has been migrated")]
    AccountMigrated,

    #[error("authentication service unavailable")]
    ServiceUnavailable,

    #[error("unexpected response from the authentication service")]
    InvalidResponse,

    #[error("account is not entitled to the game")]
    NotEntitled,

    #[error("a new login is required")]
    LoginRequired,

    #[error("login cancelled by the user")]
    UserCancelled,

    #[error("transport failure: {0}")]
    Transport(#[from] NetError),

    #[error("login failed: {detail}")]
    Unknown { detail: String },
}

impl LoginFailure {
    pub fn unknown(detail: impl Into<String>) -> Self {
        Self::Unknown {
            detail: detail.into(),
        }
    }

    /// The fixed human-facing line for this outcome. Display text, never an
    /// API surface.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::WrongCredentials => "Incorrect username or password.",
            Self::AccountMigrated => {
                "This account has been migrated; use your e-mail address as the username."
            }
            Self::ServiceUnavailable => {
                "The authentication servers are unavailable. Please try again later."
            }
            Self::InvalidResponse => {
                "The authentication servers returned an unexpected response."
            }
            Self::NotEntitled => "This account does not own the game.",
            Self::LoginRequired => "The cached session is no longer valid; please log in again.",
            Self::UserCancelled => "Login cancelled.",
            Self::Transport(_) => "A network error occurred while contacting the login servers.",
            Self::Unknown { .. } => "Login failed for an unknown reason.",
        }
    }

    /// Whether an outer reconnect policy may reasonably try again without
    /// new input from the user.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ServiceUnavailable => true,
            Self::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// The provider capability: one strategy per account backend. Providers
/// never open sockets themselves; every call goes through the shared
/// [`Transport`].
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<SessionToken, LoginFailure>;

    /// Remote check that a cached token is still accepted.
    async fn validate(&self, token: &SessionToken) -> Result<(), LoginFailure>;

    /// Exchange a stale token for a fresh one. The returned token replaces
    /// the old value; tokens are never mutated in place.
    async fn refresh(&self, token: &SessionToken) -> Result<SessionToken, LoginFailure>;
}

/// How the browser-based sign-in hands its redirect back to the core. The
/// interactive front-end implements this; tests use canned values.
#[async_trait]
pub trait RedirectPrompt: Send + Sync {
    /// Present `sign_in_url` to the user and return the full redirect they
    /// pasted back, or `None` when they gave up.
    async fn obtain_redirect(&self, sign_in_url: &str) -> Option<String>;
}

/// Construct the provider for an account type. Closed dispatch: each variant
/// owns its whole exchange chain.
pub fn create_provider(
    account: AccountType,
    transport: Arc<Transport>,
    prompt: Arc<dyn RedirectPrompt>,
) -> Box<dyn IdentityProvider> {
    match account {
        AccountType::Mojang => Box::new(YggdrasilProvider::new(transport)),
        AccountType::Microsoft => Box::new(MsaProvider::new(transport, prompt)),
    }
}
