/// Supported proxy protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ProxyKind {
    /// HTTP proxy speaking the `CONNECT` method.
    Http,
    /// SOCKS4: targets must resolve to an IPv4 address locally.
    Socks4,
    /// SOCKS4a: hostnames are resolved by the proxy.
    Socks4a,
    /// SOCKS5, optionally with username/password authentication.
    Socks5,
}

/// Credentials for an authenticating proxy.
#[derive(Debug, Clone)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

/// What a connection is for. Proxying is enabled per purpose, so account
/// traffic and game traffic can be tunneled independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Login,
    Gameplay,
}

#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub kind: ProxyKind,
    pub host: String,
    pub port: u16,
    pub auth: Option<ProxyAuth>,
    pub use_for_login: bool,
    pub use_for_gameplay: bool,
}

impl ProxySettings {
    pub fn enabled_for(&self, purpose: Purpose) -> bool {
        match purpose {
            Purpose::Login => self.use_for_login,
            Purpose::Gameplay => self.use_for_gameplay,
        }
    }
}
