//! Thin interactive front-end over the craftnet library crates: resolve a
//! session (cache or fresh login), then resolve the target server's address
//! and protocol plan.

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use craft_auth::{
    AccountType, CachePaths, Credentials, LoginMethod, RedirectPrompt, SessionCache,
    SessionOrchestrator, login_failure_message,
};
use craft_auth::{RealmsClient, SessionToken};
use craft_net::{ProxyAuth, ProxyKind, ProxySettings, Transport, TransportConfig};
use craft_protocol::{LATEST_GAME_VERSION, codec_family, lookup_service, protocol_for_version};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum AccountKind {
    Mojang,
    Microsoft,
}

impl From<AccountKind> for AccountType {
    fn from(kind: AccountKind) -> Self {
        match kind {
            AccountKind::Mojang => AccountType::Mojang,
            AccountKind::Microsoft => AccountType::Microsoft,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum MethodKind {
    /// Exchange username/password directly (no two-factor support).
    Credentials,
    /// Sign in with a browser and paste the redirect back.
    Browser,
}

impl From<MethodKind> for LoginMethod {
    fn from(kind: MethodKind) -> Self {
        match kind {
            MethodKind::Credentials => LoginMethod::Credentials,
            MethodKind::Browser => LoginMethod::Browser,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "craft", version, about = "Headless game client: login and session tooling")]
struct Args {
    /// Account login (e-mail address or player name)
    #[arg(long)]
    login: String,

    /// Account password. Omit to request an offline session.
    #[arg(long)]
    password: Option<String>,

    #[arg(long, value_enum, default_value_t = AccountKind::Microsoft)]
    account: AccountKind,

    #[arg(long, value_enum, default_value_t = MethodKind::Credentials)]
    method: MethodKind,

    /// Server address to resolve, host or host:port
    #[arg(long)]
    server: Option<String>,

    /// Game version to speak, e.g. "1.16.5"
    #[arg(long)]
    game_version: Option<String>,

    /// Directory holding the session cache files
    #[arg(long, default_value = ".")]
    cache_dir: PathBuf,

    /// Tunnel connections through a proxy of this kind
    #[arg(long, value_enum)]
    proxy_kind: Option<ProxyKind>,

    #[arg(long)]
    proxy_host: Option<String>,

    #[arg(long, default_value_t = 1080)]
    proxy_port: u16,

    #[arg(long)]
    proxy_username: Option<String>,

    #[arg(long)]
    proxy_password: Option<String>,

    /// Use the proxy for account/login traffic
    #[arg(long)]
    proxy_login: bool,

    /// Use the proxy for game server traffic
    #[arg(long)]
    proxy_gameplay: bool,

    /// List the account's joinable Realms worlds after login
    #[arg(long)]
    list_realms: bool,
}

/// Browser-flow plumbing: print the sign-in link, read the pasted redirect.
struct StdinPrompt;

#[async_trait]
impl RedirectPrompt for StdinPrompt {
    async fn obtain_redirect(&self, sign_in_url: &str) -> Option<String> {
        println!("Open this link in your browser and sign in:");
        println!("\n{sign_in_url}\n");
        println!(
            "Once signed in you will land on a blank page. Paste the full \
             address bar contents here and press enter:"
        );
        let line = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).ok().map(|_| line)
        })
        .await
        .ok()
        .flatten()?;
        let line = line.trim();
        if line.is_empty() {
            None
        } else {
            Some(line.to_string())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer())
        .init();

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            signal_token.cancel();
        }
    });

    let proxy = build_proxy(&args)?;
    let transport = Arc::new(Transport::new(
        proxy,
        TransportConfig::default(),
        token.clone(),
    )?);

    let cache = SessionCache::new(CachePaths::in_dir(&args.cache_dir));
    if cache.initialize().await {
        debug!("session cache seeded from disk");
    }

    let orchestrator = SessionOrchestrator::new(cache, transport.clone(), Arc::new(StdinPrompt));
    let credentials = Credentials {
        account: args.account.into(),
        method: args.method.into(),
        username: args.login.clone(),
        password: args.password.clone().unwrap_or_default(),
    };

    let session = match orchestrator.get_session(&credentials).await {
        Ok(session) => session,
        Err(failure) => {
            let message = login_failure_message(&failure);
            error!(retryable = failure.is_retryable(), "{message}");
            anyhow::bail!(message);
        }
    };
    info!(
        player = %session.player_name,
        uuid = %session.player_id,
        "session ready"
    );

    if args.list_realms {
        list_realms(&transport, &session, args.game_version.as_deref()).await?;
    }

    if let Some(server) = &args.server {
        resolve_server(server, args.game_version.as_deref()).await?;
    }

    Ok(())
}

async fn list_realms(
    transport: &Transport,
    session: &SessionToken,
    game_version: Option<&str>,
) -> anyhow::Result<()> {
    let version = game_version.unwrap_or(LATEST_GAME_VERSION);
    let client = RealmsClient::new(transport, session, version);
    let worlds = client.list_worlds().await?;
    if worlds.is_empty() {
        info!("no joinable Realms worlds for this account");
        return Ok(());
    }
    for world in &worlds {
        println!("[{}] {} ({})", world.id, world.name, world.owner);
    }
    Ok(())
}

fn build_proxy(args: &Args) -> anyhow::Result<Option<ProxySettings>> {
    let Some(kind) = args.proxy_kind else {
        return Ok(None);
    };
    let host = args
        .proxy_host
        .clone()
        .context("--proxy-host is required with --proxy-kind")?;
    let auth = match (&args.proxy_username, &args.proxy_password) {
        (Some(username), Some(password)) => Some(ProxyAuth {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => None,
    };
    Ok(Some(ProxySettings {
        kind,
        host,
        port: args.proxy_port,
        auth,
        use_for_login: args.proxy_login,
        use_for_gameplay: args.proxy_gameplay,
    }))
}

/// Resolve the endpoint to connect to (SRV discovery for bare domains) and
/// the protocol plan for the requested game version.
async fn resolve_server(address: &str, game_version: Option<&str>) -> anyhow::Result<()> {
    let (mut host, mut port, explicit_port) = match address.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .with_context(|| format!("invalid port in server address `{address}`"))?;
            (host.to_string(), port, true)
        }
        None => (address.to_string(), 25565, false),
    };

    // A hand-picked port wins over whatever DNS advertises.
    if !explicit_port
        && let Some((target, srv_port)) = lookup_service(&host).await
    {
        host = target;
        port = srv_port;
    }
    info!(%host, port, "server address resolved");

    if let Some(version) = game_version {
        let protocol = protocol_for_version(version);
        if protocol == 0 {
            anyhow::bail!("unknown game version `{version}`");
        }
        let family = codec_family(protocol)?;
        info!(version, protocol, family = ?family, "protocol plan selected");
    }

    Ok(())
}
