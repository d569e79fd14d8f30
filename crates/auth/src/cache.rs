//! Disk-backed session cache.
//!
//! The in-memory map is reconciled from three ranked on-disk sources, lowest
//! precedence loaded first so later sources overwrite earlier ones:
//!
//! 1. the launcher's profile store (read-only JSON),
//! 2. a legacy single-blob serialized map,
//! 3. the user-editable plaintext `login=accessToken,playerName,uuid,clientId`
//!    store, which is also the only file we write back.
//!
//! External edits to the plaintext store are picked up through a debounced
//! file watch. Stores that land during a reload window are queued and
//! replayed, in call order, once the reload finishes.

use crate::session::{SessionToken, is_hex_of_len};
use notify::{RecursiveMode, Watcher};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

const HEADER_BANNER: &str = concat!(
    "# Generated by craft v",
    env!("CARGO_PKG_VERSION"),
    " - edit at your own risk"
);
const FIELDS_BANNER: &str = "# login=accessToken,playerName,uuid,clientId";

/// Which on-disk source an entry came from. Later sources win when the same
/// login appears in several of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    LauncherProfiles,
    LegacyDb,
    Plaintext,
    /// Stored by a fresh login during this run.
    Runtime,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    token: SessionToken,
    #[allow(dead_code)]
    source: CacheSource,
}

/// Locations of the three cache sources.
#[derive(Debug, Clone)]
pub struct CachePaths {
    pub plaintext: PathBuf,
    pub legacy_db: PathBuf,
    pub launcher_profiles: PathBuf,
}

impl CachePaths {
    /// Conventional file names inside one directory.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            plaintext: dir.join("session-cache.ini"),
            legacy_db: dir.join("session-cache.db"),
            launcher_profiles: dir.join("launcher_profiles.json"),
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    sessions: HashMap<String, CacheEntry>,
    /// Stores that arrived while a reload window was open.
    pending: Vec<(String, SessionToken)>,
    reloading: bool,
    reloads: u64,
}

/// Process-wide session store. Cloning shares the underlying state; all
/// mutation and flushing serializes on one async mutex, which the debounce
/// task shares with direct callers.
#[derive(Clone)]
pub struct SessionCache {
    paths: Arc<CachePaths>,
    state: Arc<Mutex<CacheState>>,
}

impl SessionCache {
    pub fn new(paths: CachePaths) -> Self {
        Self {
            paths: Arc::new(paths),
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub async fn contains(&self, login: &str) -> bool {
        self.state
            .lock()
            .await
            .sessions
            .contains_key(&login.to_lowercase())
    }

    pub async fn get(&self, login: &str) -> Option<SessionToken> {
        self.state
            .lock()
            .await
            .sessions
            .get(&login.to_lowercase())
            .map(|entry| entry.token.clone())
    }

    /// Upsert a session and persist it, unless a reload debounce window is
    /// open — then the write is queued and replayed after the reload.
    pub async fn store(&self, login: &str, token: SessionToken) {
        let login = login.to_lowercase();
        let mut state = self.state.lock().await;
        if state.reloading {
            debug!(%login, "cache reload in flight, queueing store");
            state.pending.push((login, token));
            return;
        }
        state.sessions.insert(
            login,
            CacheEntry {
                token,
                source: CacheSource::Runtime,
            },
        );
        self.flush_locked(&state).await;
    }

    /// Load all three sources and start watching the plaintext store for
    /// external changes. Returns whether any entries were seeded.
    pub async fn initialize(&self) -> bool {
        let seeded = {
            let mut state = self.state.lock().await;
            self.reload_locked(&mut state).await;
            !state.sessions.is_empty()
        };
        self.spawn_watcher();
        seeded
    }

    async fn reload_locked(&self, state: &mut CacheState) {
        self.load_launcher_profiles(state).await;
        self.load_legacy_db(state).await;
        self.load_plaintext(state).await;
        state.reloads += 1;
    }

    async fn load_launcher_profiles(&self, state: &mut CacheState) {
        let path = &self.paths.launcher_profiles;
        let Ok(contents) = tokio::fs::read_to_string(path).await else {
            return;
        };
        debug!(path = %path.display(), "loading launcher profile store");

        let profiles: LauncherProfiles = match serde_json::from_str(&contents) {
            Ok(profiles) => profiles,
            Err(e) => {
                debug!(error = %e, "launcher profile store unreadable, skipping");
                return;
            }
        };

        let client_id = profiles.client_token.replace('-', "");
        for (key, profile) in profiles.authentication_database {
            if !is_hex_of_len(&key, 32) {
                continue;
            }
            let (Some(display_name), Some(access_token), Some(username), Some(uuid)) = (
                profile.display_name,
                profile.access_token,
                profile.username,
                profile.uuid,
            ) else {
                continue;
            };
            let token = SessionToken {
                access_token,
                player_name: display_name,
                player_id: uuid.replace('-', ""),
                client_id: client_id.clone(),
            };
            if !is_hex_of_len(&token.player_id, 32) || !is_hex_of_len(&token.client_id, 32) {
                debug!(login = %username, "skipping malformed launcher profile entry");
                continue;
            }
            let login = username.to_lowercase();
            debug!(%login, "loaded session from launcher profiles");
            state.sessions.insert(
                login,
                CacheEntry {
                    token,
                    source: CacheSource::LauncherProfiles,
                },
            );
        }
    }

    async fn load_legacy_db(&self, state: &mut CacheState) {
        let path = &self.paths.legacy_db;
        let Ok(contents) = tokio::fs::read_to_string(path).await else {
            return;
        };
        debug!(path = %path.display(), "loading legacy session blob");

        match serde_json::from_str::<HashMap<String, SessionToken>>(&contents) {
            Ok(sessions) => {
                for (login, token) in sessions {
                    state.sessions.insert(
                        login.to_lowercase(),
                        CacheEntry {
                            token,
                            source: CacheSource::LegacyDb,
                        },
                    );
                }
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "legacy session blob unreadable, skipping");
            }
        }
    }

    async fn load_plaintext(&self, state: &mut CacheState) {
        let path = &self.paths.plaintext;
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "session store unreadable, skipping");
                return;
            }
        };
        debug!(path = %path.display(), "loading session store");

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((login, value)) = line.split_once('=') else {
                debug!(line, "ignoring line without key=value shape");
                continue;
            };
            match SessionToken::from_line(value) {
                Ok(token) => {
                    let login = login.to_lowercase();
                    debug!(%login, "loaded session from store");
                    state.sessions.insert(
                        login,
                        CacheEntry {
                            token,
                            source: CacheSource::Plaintext,
                        },
                    );
                }
                Err(e) => {
                    debug!(error = %e, line, "ignoring malformed session line");
                }
            }
        }
    }

    /// Full rewrite of the plaintext store via a temp file and rename, so an
    /// interrupted write can never leave a truncated store behind.
    async fn flush_locked(&self, state: &CacheState) {
        let mut logins: Vec<&String> = state.sessions.keys().collect();
        logins.sort();

        let mut lines = vec![HEADER_BANNER.to_string(), FIELDS_BANNER.to_string()];
        for login in logins {
            lines.push(format!("{login}={}", state.sessions[login].token.to_line()));
        }
        let mut contents = lines.join("\n");
        contents.push('\n');

        let path = &self.paths.plaintext;
        let tmp = path.with_extension("tmp");
        let result = async {
            tokio::fs::write(&tmp, contents).await?;
            tokio::fs::rename(&tmp, path).await
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, path = %path.display(), "failed to persist session store");
        }
    }

    fn spawn_watcher(&self) {
        let Some(dir) = self.paths.plaintext.parent().map(Path::to_path_buf) else {
            return;
        };
        let file_name = match self.paths.plaintext.file_name() {
            Some(name) => name.to_os_string(),
            None => return,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = match notify::recommended_watcher(
            move |event: Result<notify::Event, notify::Error>| {
                if let Ok(event) = event
                    && event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()))
                {
                    let _ = tx.send(());
                }
            },
        ) {
            Ok(watcher) => watcher,
            Err(e) => {
                warn!(error = %e, "could not create session store watcher");
                return;
            }
        };
        if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            warn!(error = %e, dir = %dir.display(), "could not watch session store directory");
            return;
        }

        let cache = self.clone();
        tokio::spawn(async move {
            // The watcher must stay alive as long as the task runs.
            let _watcher = watcher;
            cache.debounce_loop(rx).await;
        });
    }

    /// React to change notifications once they go quiet for the debounce
    /// window; every further notification restarts the timer.
    async fn debounce_loop(&self, mut rx: mpsc::UnboundedReceiver<()>) {
        while rx.recv().await.is_some() {
            self.state.lock().await.reloading = true;
            loop {
                tokio::select! {
                    event = rx.recv() => {
                        if event.is_none() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(DEBOUNCE_WINDOW) => break,
                }
            }
            self.reload_and_replay().await;
        }
    }

    async fn reload_and_replay(&self) {
        let mut state = self.state.lock().await;
        self.reload_locked(&mut state).await;

        let pending: Vec<_> = state.pending.drain(..).collect();
        let replayed = !pending.is_empty();
        for (login, token) in pending {
            state.sessions.insert(
                login,
                CacheEntry {
                    token,
                    source: CacheSource::Runtime,
                },
            );
        }
        state.reloading = false;
        if replayed {
            self.flush_locked(&state).await;
        }
    }

    #[cfg(test)]
    async fn reload_count(&self) -> u64 {
        self.state.lock().await.reloads
    }

    #[cfg(test)]
    async fn set_reloading(&self, reloading: bool) {
        self.state.lock().await.reloading = reloading;
    }

    #[cfg(test)]
    pub(crate) async fn reload_from_disk(&self) {
        let mut state = self.state.lock().await;
        self.reload_locked(&mut state).await;
    }
}

#[derive(Deserialize)]
struct LauncherProfiles {
    #[serde(rename = "clientToken")]
    client_token: String,
    #[serde(rename = "authenticationDatabase", default)]
    authentication_database: HashMap<String, LauncherProfile>,
}

#[derive(Deserialize)]
struct LauncherProfile {
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
    username: Option<String>,
    uuid: Option<String>,
}
