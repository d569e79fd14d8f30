//! Remote session services: the join handshake for online-mode servers and
//! Realms world discovery. Both ride the raw transport with the session
//! cookie / JSON framing the services expect.

use crate::session::SessionToken;
use craft_net::{NetError, RawRequest, Transport};
use serde_json::{Value, json};
use thiserror::Error;

const SESSION_HOST: &str = "sessionserver.mojang.com";
const REALMS_HOST: &str = "pc.realms.minecraft.net";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("transport failure: {0}")]
    Transport(#[from] NetError),

    #[error("service rejected the request with HTTP {status}")]
    Rejected { status: u16 },

    #[error("unexpected response from the service")]
    InvalidResponse,
}

/// Prove to the session service that this client may join an online-mode
/// server. `server_hash` comes from the server's encryption handshake.
pub async fn join_server(
    transport: &Transport,
    token: &SessionToken,
    server_hash: &str,
) -> Result<(), ServiceError> {
    let body = json!({
        "accessToken": token.access_token,
        "selectedProfile": token.player_id,
        "serverId": server_hash,
    });
    let request = RawRequest::post_json(SESSION_HOST, "/session/minecraft/join", body.to_string());
    let response = transport.https_request(request).await?;
    match response.status {
        200 | 204 => Ok(()),
        status => Err(ServiceError::Rejected { status }),
    }
}

/// A joinable Realms world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealmsWorld {
    pub id: String,
    pub name: String,
    pub owner: String,
}

/// Realms discovery for one authenticated player.
pub struct RealmsClient<'a> {
    transport: &'a Transport,
    token: &'a SessionToken,
    client_version: &'a str,
}

impl<'a> RealmsClient<'a> {
    pub fn new(transport: &'a Transport, token: &'a SessionToken, client_version: &'a str) -> Self {
        Self {
            transport,
            token,
            client_version,
        }
    }

    fn session_cookie(&self) -> String {
        session_cookie(self.token, self.client_version)
    }

    /// The player's non-expired worlds.
    pub async fn list_worlds(&self) -> Result<Vec<RealmsWorld>, ServiceError> {
        let request =
            RawRequest::get(REALMS_HOST, "/worlds").with_header("Cookie", self.session_cookie());
        let response = self.transport.https_request(request).await?;
        if response.status != 200 {
            return Err(ServiceError::Rejected {
                status: response.status,
            });
        }
        parse_worlds(&response.body)
    }

    /// The `host:port` address of a world, by world id.
    pub async fn world_address(&self, world_id: &str) -> Result<String, ServiceError> {
        let path = format!("/worlds/v1/{world_id}/join/pc");
        let request = RawRequest::get(REALMS_HOST, path).with_header("Cookie", self.session_cookie());
        let response = self.transport.https_request(request).await?;
        if response.status != 200 {
            return Err(ServiceError::Rejected {
                status: response.status,
            });
        }
        parse_world_address(&response.body)
    }
}

fn session_cookie(token: &SessionToken, client_version: &str) -> String {
    format!(
        "sid=token:{}:{};user={};version={}",
        token.access_token, token.player_id, token.player_name, client_version
    )
}

fn parse_worlds(body: &str) -> Result<Vec<RealmsWorld>, ServiceError> {
    let value: Value = serde_json::from_str(body).map_err(|_| ServiceError::InvalidResponse)?;
    let Some(servers) = value["servers"].as_array() else {
        return Err(ServiceError::InvalidResponse);
    };

    let mut worlds = Vec::new();
    for server in servers {
        let (Some(id), Some(name), Some(owner)) = (
            server["id"].as_i64(),
            server["name"].as_str(),
            server["owner"].as_str(),
        ) else {
            continue;
        };
        if server["expired"].as_bool() == Some(true) {
            continue;
        }
        worlds.push(RealmsWorld {
            id: id.to_string(),
            name: name.to_string(),
            owner: owner.to_string(),
        });
    }
    Ok(worlds)
}

fn parse_world_address(body: &str) -> Result<String, ServiceError> {
    let value: Value = serde_json::from_str(body).map_err(|_| ServiceError::InvalidResponse)?;
    value["address"]
        .as_str()
        .map(str::to_string)
        .ok_or(ServiceError::InvalidResponse)
}
