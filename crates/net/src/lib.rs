//! Proxy-aware raw transport.
//!
//! Produces connected, optionally proxy-tunneled TCP streams and performs
//! hand-framed HTTPS requests over them. The manual HTTP framing is
//! deliberate: identity-provider traffic must ride the same tunneled socket
//! a proxy gives us, which a high-level HTTP client would bypass.

pub mod error;
pub mod http;
pub mod proxy;
pub mod retry;
pub mod transport;

pub use error::NetError;
pub use http::{HttpResponse, RawRequest, UNPARSEABLE_STATUS};
pub use proxy::{ProxyAuth, ProxyKind, ProxySettings, Purpose};
pub use retry::RetryPolicy;
pub use transport::{Transport, TransportConfig};
