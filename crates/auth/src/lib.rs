//! Account authentication and session caching.
//!
//! This crate turns credentials (or a previously cached token) into a
//! validated [`SessionToken`]:
//!
//! - [`provider`] holds the identity providers — a single-request legacy
//!   provider and the multi-hop consumer OAuth / Xbox Live chain — behind
//!   one [`IdentityProvider`] capability.
//! - [`cache`] is the disk-backed session store, reconciled from three
//!   ranked sources and kept live through a debounced file watch.
//! - [`orchestrator`] is the entry point: cache first, fresh login second,
//!   write-back on success.
//! - [`services`] covers the session-adjacent remote calls (online-mode
//!   join handshake, Realms discovery).
//!
//! All network traffic goes through a shared [`craft_net::Transport`]; this
//! crate never opens sockets itself.

pub mod cache;
pub mod orchestrator;
pub mod provider;
pub mod services;
pub mod session;

pub use cache::{CachePaths, CacheSource, SessionCache};
pub use orchestrator::{SessionOrchestrator, login_failure_message};
pub use provider::{
    AccountType, Credentials, IdentityProvider, LoginFailure, LoginMethod, MsaProvider,
    RedirectPrompt, YggdrasilProvider, create_provider,
};
pub use services::{RealmsClient, RealmsWorld, ServiceError, join_server};
pub use session::{SessionToken, SessionTokenError};
