//! Single-request identity provider speaking the legacy JSON auth scheme:
//! one HTTPS POST per operation against a fixed host.

use super::{Credentials, IdentityProvider, LoginFailure};
use crate::session::SessionToken;
use async_trait::async_trait;
use craft_net::{RawRequest, Transport};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

const AUTH_HOST: &str = "authserver.mojang.com";
const MIGRATION_MARKER: &str = "UserMigratedException";

pub struct YggdrasilProvider {
    transport: Arc<Transport>,
}

impl YggdrasilProvider {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    async fn post(&self, endpoint: &str, body: Value) -> Result<(u16, String), LoginFailure> {
        let request = RawRequest::post_json(AUTH_HOST, endpoint, body.to_string());
        let response = self.transport.https_request(request).await?;
        debug!(endpoint, status = response.status, "auth service reply");
        Ok((response.status, response.body))
    }
}

/// Map an `/authenticate` or `/refresh` reply onto a token or failure.
fn classify_login_response(
    status: u16,
    body: &str,
    client_id: String,
) -> Result<SessionToken, LoginFailure> {
    match status {
        200 => {
            if body.contains(r#""availableProfiles":[]"#) {
                return Err(LoginFailure::NotEntitled);
            }
            token_from_profile(body, client_id)
        }
        403 if body.contains(MIGRATION_MARKER) => Err(LoginFailure::AccountMigrated),
        403 => Err(LoginFailure::WrongCredentials),
        503 => Err(LoginFailure::ServiceUnavailable),
        status => Err(LoginFailure::unknown(format!(
            "authentication service returned HTTP {status}"
        ))),
    }
}

fn token_from_profile(body: &str, client_id: String) -> Result<SessionToken, LoginFailure> {
    let response: Value = serde_json::from_str(body).map_err(|_| LoginFailure::InvalidResponse)?;
    let profile = &response["selectedProfile"];
    match (
        response["accessToken"].as_str(),
        profile["id"].as_str(),
        profile["name"].as_str(),
    ) {
        (Some(access_token), Some(id), Some(name)) => Ok(SessionToken {
            access_token: access_token.to_string(),
            player_name: name.to_string(),
            player_id: id.to_string(),
            client_id,
        }),
        _ => Err(LoginFailure::InvalidResponse),
    }
}

#[async_trait]
impl IdentityProvider for YggdrasilProvider {
    async fn login(&self, credentials: &Credentials) -> Result<SessionToken, LoginFailure> {
        let client_id = SessionToken::new_client_id();
        let body = json!({
            "agent": { "name": "Minecraft", "version": 1 },
            "username": credentials.username,
            "password": credentials.password,
            "clientToken": client_id,
        });
        let (status, body) = self.post("/authenticate", body).await?;
        classify_login_response(status, &body, client_id)
    }

    async fn validate(&self, token: &SessionToken) -> Result<(), LoginFailure> {
        let body = json!({
            "accessToken": token.access_token,
            "clientToken": token.client_id,
        });
        let (status, _) = self.post("/validate", body).await?;
        match status {
            200 | 204 => Ok(()),
            403 => Err(LoginFailure::LoginRequired),
            status => Err(LoginFailure::unknown(format!(
                "token validation returned HTTP {status}"
            ))),
        }
    }

    async fn refresh(&self, token: &SessionToken) -> Result<SessionToken, LoginFailure> {
        let body = json!({
            "accessToken": token.access_token,
            "clientToken": token.client_id,
            "selectedProfile": {
                "id": token.player_id,
                "name": token.player_name,
            },
        });
        let (status, body) = self.post("/refresh", body).await?;
        match status {
            200 => token_from_profile(&body, token.client_id.clone()),
            403 => Err(LoginFailure::LoginRequired),
            status => Err(LoginFailure::unknown(format!(
                "token refresh returned HTTP {status}"
            ))),
        }
    }
}
