//! Connection establishment: direct, or tunneled through a configured proxy.

use crate::error::NetError;
use crate::proxy::{ProxyKind, ProxySettings, Purpose};
use crate::retry::{RetryPolicy, retry_fixed};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_socks::tcp::{Socks4Stream, Socks5Stream};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use rustls_platform_verifier::BuilderVerifierExt;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bound on establishing a direct TCP connection.
    pub connect_timeout: Duration,
    /// Bound on reading a full HTTPS response.
    pub read_timeout: Duration,
    pub retry: RetryPolicy,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            user_agent: concat!("craft/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Proxy-aware stream factory. One instance owns the proxy configuration,
/// the TLS client config and the cancellation signal for every connection it
/// hands out.
pub struct Transport {
    proxy: Option<ProxySettings>,
    config: TransportConfig,
    tls: TlsConnector,
    token: CancellationToken,
}

impl Transport {
    pub fn new(
        proxy: Option<ProxySettings>,
        config: TransportConfig,
        token: CancellationToken,
    ) -> Result<Self, NetError> {
        let tls = TlsConnector::from(build_tls_config()?);
        Ok(Self {
            proxy,
            config,
            tls,
            token,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn user_agent(&self) -> &str {
        &self.config.user_agent
    }

    pub(crate) fn tls_connector(&self) -> &TlsConnector {
        &self.tls
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Open a TCP stream to `host:port`, tunneling through the configured
    /// proxy when it is enabled for `purpose`.
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
        purpose: Purpose,
    ) -> Result<TcpStream, NetError> {
        match self.proxy.as_ref().filter(|p| p.enabled_for(purpose)) {
            Some(proxy) => self.connect_via_proxy(proxy, host, port).await,
            None => self.connect_direct(host, port).await,
        }
    }

    async fn connect_direct(&self, host: &str, port: u16) -> Result<TcpStream, NetError> {
        let mut addrs =
            tokio::net::lookup_host((host, port))
                .await
                .map_err(|_| NetError::HostNotFound {
                    host: host.to_string(),
                })?;
        let Some(addr) = addrs.next() else {
            return Err(NetError::HostNotFound {
                host: host.to_string(),
            });
        };

        debug!(%addr, "connecting directly");
        match tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
            Err(_) => Err(NetError::ConnectTimeout {
                host: host.to_string(),
                port,
            }),
            Ok(Err(e)) if e.kind() == io::ErrorKind::HostUnreachable => {
                Err(NetError::HostUnreachable {
                    host: host.to_string(),
                })
            }
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(stream)) => Ok(stream),
        }
    }

    async fn connect_via_proxy(
        &self,
        proxy: &ProxySettings,
        host: &str,
        port: u16,
    ) -> Result<TcpStream, NetError> {
        debug!(
            proxy_host = %proxy.host,
            proxy_port = proxy.port,
            kind = ?proxy.kind,
            target = %host,
            "connecting through proxy"
        );
        retry_fixed(&self.config.retry, &self.token, |_| async move {
            self.proxy_connect_once(proxy, host, port).await
        })
        .await
    }

    async fn proxy_connect_once(
        &self,
        proxy: &ProxySettings,
        host: &str,
        port: u16,
    ) -> Result<TcpStream, NetError> {
        let proxy_addr = format!("{}:{}", proxy.host, proxy.port);
        let map_socks =
            |e: tokio_socks::Error| NetError::proxy(&proxy.host, proxy.port, e.to_string());

        match proxy.kind {
            ProxyKind::Http => self.http_connect_tunnel(proxy, host, port).await,
            ProxyKind::Socks4 => {
                // SOCKS4 proper carries no hostnames: resolve locally first.
                let target = tokio::net::lookup_host((host, port))
                    .await
                    .ok()
                    .and_then(|mut addrs| addrs.find(|a| a.is_ipv4()))
                    .ok_or_else(|| NetError::HostNotFound {
                        host: host.to_string(),
                    })?;
                let stream = match &proxy.auth {
                    Some(auth) => Socks4Stream::connect_with_userid(
                        proxy_addr.as_str(),
                        target,
                        &auth.username,
                    )
                    .await
                    .map_err(map_socks)?,
                    None => Socks4Stream::connect(proxy_addr.as_str(), target)
                        .await
                        .map_err(map_socks)?,
                };
                Ok(stream.into_inner())
            }
            ProxyKind::Socks4a => {
                let stream = match &proxy.auth {
                    Some(auth) => Socks4Stream::connect_with_userid(
                        proxy_addr.as_str(),
                        (host, port),
                        &auth.username,
                    )
                    .await
                    .map_err(map_socks)?,
                    None => Socks4Stream::connect(proxy_addr.as_str(), (host, port))
                        .await
                        .map_err(map_socks)?,
                };
                Ok(stream.into_inner())
            }
            ProxyKind::Socks5 => {
                let stream = match &proxy.auth {
                    Some(auth) => Socks5Stream::connect_with_password(
                        proxy_addr.as_str(),
                        (host, port),
                        &auth.username,
                        &auth.password,
                    )
                    .await
                    .map_err(map_socks)?,
                    None => Socks5Stream::connect(proxy_addr.as_str(), (host, port))
                        .await
                        .map_err(map_socks)?,
                };
                Ok(stream.into_inner())
            }
        }
    }

    /// Tunnel through an HTTP proxy with a hand-framed `CONNECT` request.
    async fn http_connect_tunnel(
        &self,
        proxy: &ProxySettings,
        host: &str,
        port: u16,
    ) -> Result<TcpStream, NetError> {
        let connect = TcpStream::connect((proxy.host.as_str(), proxy.port));
        let mut stream = tokio::time::timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| NetError::proxy(&proxy.host, proxy.port, "connect timed out"))?
            .map_err(|e| NetError::proxy(&proxy.host, proxy.port, e.to_string()))?;

        let mut request = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n");
        if let Some(auth) = &proxy.auth {
            use base64::Engine;
            let credentials = base64::engine::general_purpose::STANDARD
                .encode(format!("{}:{}", auth.username, auth.password));
            request.push_str(&format!("Proxy-Authorization: Basic {credentials}\r\n"));
        }
        request.push_str("\r\n");

        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| NetError::proxy(&proxy.host, proxy.port, e.to_string()))?;

        // Read the proxy's reply up to the end of its headers.
        let mut reply = Vec::with_capacity(256);
        let mut buf = [0u8; 256];
        loop {
            let n = stream
                .read(&mut buf)
                .await
                .map_err(|e| NetError::proxy(&proxy.host, proxy.port, e.to_string()))?;
            if n == 0 {
                return Err(NetError::proxy(
                    &proxy.host,
                    proxy.port,
                    "closed during CONNECT handshake",
                ));
            }
            reply.extend_from_slice(&buf[..n]);
            if reply.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
            if reply.len() > 8 * 1024 {
                return Err(NetError::proxy(&proxy.host, proxy.port, "oversized CONNECT reply"));
            }
        }

        let reply = String::from_utf8_lossy(&reply);
        let status = reply.split_whitespace().nth(1).unwrap_or("");
        if status != "200" {
            return Err(NetError::proxy(
                &proxy.host,
                proxy.port,
                format!("CONNECT rejected with status {status}"),
            ));
        }

        Ok(stream)
    }
}

fn build_tls_config() -> Result<Arc<rustls::ClientConfig>, NetError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| NetError::tls(e.to_string()))?
        .with_platform_verifier()
        .map_err(|e| NetError::tls(e.to_string()))?
        .with_no_client_auth();
    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyAuth;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::net::TcpListener;

    fn proxy_settings(port: u16, kind: ProxyKind) -> ProxySettings {
        ProxySettings {
            kind,
            host: "127.0.0.1".to_string(),
            port,
            auth: None,
            use_for_login: true,
            use_for_gameplay: false,
        }
    }

    fn quick_config() -> TransportConfig {
        TransportConfig {
            retry: RetryPolicy {
                max_retries: 3,
                delay: Duration::from_millis(1),
            },
            ..TransportConfig::default()
        }
    }

    #[tokio::test]
    async fn http_connect_tunnel_succeeds() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            assert!(request.starts_with("CONNECT example.com:80 HTTP/1.1\r\n"));
            socket
                .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                .await
                .unwrap();
        });

        let transport = Transport::new(
            Some(proxy_settings(port, ProxyKind::Http)),
            quick_config(),
            CancellationToken::new(),
        )
        .unwrap();
        let stream = transport.connect("example.com", 80, Purpose::Login).await;
        assert!(stream.is_ok());
    }

    #[tokio::test]
    async fn http_connect_tunnel_sends_basic_auth() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            // "user:pass" base64-encoded
            assert!(request.contains("Proxy-Authorization: Basic dXNlcjpwYXNz\r\n"));
            socket.write_all(b"HTTP/1.1 200 OK\r\n\r\n").await.unwrap();
        });

        let mut settings = proxy_settings(port, ProxyKind::Http);
        settings.auth = Some(ProxyAuth {
            username: "user".to_string(),
            password: "pass".to_string(),
        });
        let transport =
            Transport::new(Some(settings), quick_config(), CancellationToken::new()).unwrap();
        let stream = transport.connect("example.com", 80, Purpose::Login).await;
        assert!(stream.is_ok());
    }

    #[tokio::test]
    async fn failing_proxy_is_retried_then_terminal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        tokio::spawn(async move {
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                counter.fetch_add(1, Ordering::Relaxed);
                // Reject the CONNECT outright.
                drop(socket);
            }
        });

        let transport = Transport::new(
            Some(proxy_settings(port, ProxyKind::Http)),
            quick_config(),
            CancellationToken::new(),
        )
        .unwrap();
        let result = transport.connect("example.com", 80, Purpose::Login).await;
        assert!(matches!(result, Err(NetError::Proxy { .. })));
        // Initial try plus three retries.
        assert_eq!(attempts.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn gameplay_purpose_skips_login_only_proxy() {
        // The proxy port is dead, so only a direct attempt can get this far:
        // a gameplay connect must not touch the proxy at all.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target_port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let transport = Transport::new(
            Some(proxy_settings(1, ProxyKind::Http)),
            quick_config(),
            CancellationToken::new(),
        )
        .unwrap();
        let stream = transport
            .connect("127.0.0.1", target_port, Purpose::Gameplay)
            .await;
        assert!(stream.is_ok());
    }

    #[tokio::test]
    async fn unresolvable_host_is_reported_as_not_found() {
        let transport = Transport::new(None, quick_config(), CancellationToken::new()).unwrap();
        let result = transport
            .connect("host.does-not-exist.invalid", 80, Purpose::Login)
            .await;
        assert!(matches!(result, Err(NetError::HostNotFound { .. })));
    }
}
