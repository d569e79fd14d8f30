use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("connection cancelled")]
    Cancelled,

    #[error("connection to {host}:{port} timed out")]
    ConnectTimeout { host: String, port: u16 },

    #[error("host {host} is unreachable")]
    HostUnreachable { host: String },

    #[error("host {host} could not be resolved")]
    HostNotFound { host: String },

    #[error("proxy {host}:{port} failed: {reason}")]
    Proxy {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("TLS error: {reason}")]
    Tls { reason: String },

    #[error("malformed HTTP response (status {status})")]
    MalformedResponse { status: u16 },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl NetError {
    pub fn proxy(host: impl Into<String>, port: u16, reason: impl Into<String>) -> Self {
        Self::Proxy {
            host: host.into(),
            port,
            reason: reason.into(),
        }
    }

    pub fn tls(reason: impl Into<String>) -> Self {
        Self::Tls {
            reason: reason.into(),
        }
    }

    /// Whether a surrounding reconnect policy may reasonably try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled | Self::HostNotFound { .. } | Self::MalformedResponse { .. } => false,
            Self::ConnectTimeout { .. }
            | Self::HostUnreachable { .. }
            | Self::Proxy { .. }
            | Self::Tls { .. }
            | Self::Io { .. } => true,
        }
    }
}
