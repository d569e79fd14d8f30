//! Multi-hop identity provider: consumer OAuth sign-in, Xbox Live token
//! exchanges, game-service login, entitlement check and profile fetch.
//!
//! Two entry flows produce the same intermediate token pair: a direct
//! credential exchange against the sign-in form, or a browser sign-in whose
//! redirect the user pastes back. Everything downstream is one strictly
//! sequential chain, each step consuming the previous step's output.

use super::{Credentials, IdentityProvider, LoginFailure, LoginMethod, RedirectPrompt};
use crate::session::SessionToken;
use async_trait::async_trait;
use craft_net::{HttpResponse, RawRequest, Transport};
use regex::Regex;
use serde_json::{Value, json};
use std::sync::{Arc, LazyLock};
use tracing::debug;

const LIVE_HOST: &str = "login.live.com";
const XBL_HOST: &str = "user.auth.xboxlive.com";
const XSTS_HOST: &str = "xsts.auth.xboxlive.com";
const API_HOST: &str = "api.minecraftservices.com";

// Client id of the official launcher's consumer OAuth application.
const CLIENT_ID: &str = "00000000402b5328";
const SCOPE: &str = "service::user.auth.xboxlive.com::MBI_SSL";
const REDIRECT_URI: &str = "https://login.live.com/oauth20_desktop.srf";

static PPFT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"sFTTag:'.*?value="([^"]+)""#).unwrap());
static URL_POST_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"urlPost:'([^']+)'").unwrap());

/// Intermediate token pair produced by either entry flow.
#[derive(Debug, Clone)]
struct MsaTokens {
    access_token: String,
    #[allow(dead_code)]
    refresh_token: String,
}

/// An Xbox-side token plus the user hash both exchanges return.
#[derive(Debug, Clone)]
struct XboxToken {
    token: String,
    user_hash: String,
}

pub struct MsaProvider {
    transport: Arc<Transport>,
    prompt: Arc<dyn RedirectPrompt>,
}

impl MsaProvider {
    pub fn new(transport: Arc<Transport>, prompt: Arc<dyn RedirectPrompt>) -> Self {
        Self { transport, prompt }
    }

    fn authorize_path() -> String {
        format!(
            "/oauth20_authorize.srf?client_id={CLIENT_ID}&response_type=token&scope={}&redirect_uri={}",
            urlencoding::encode(SCOPE),
            urlencoding::encode(REDIRECT_URI)
        )
    }

    /// The sign-in URL shown to the user for the browser flow.
    pub fn sign_in_url() -> String {
        format!("https://{LIVE_HOST}{}", Self::authorize_path())
    }

    /// Pre-authentication handshake followed by the credential exchange.
    /// Only works for accounts without two-factor authentication.
    async fn credentials_flow(
        &self,
        username: &str,
        password: &str,
    ) -> Result<MsaTokens, LoginFailure> {
        let response = self
            .transport
            .https_request(RawRequest::get(LIVE_HOST, Self::authorize_path()))
            .await?;
        let cookies = collect_cookies(&response);
        let ppft = PPFT_REGEX
            .captures(&response.body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| LoginFailure::unknown("sign-in page is missing its PPFT token"))?;
        let url_post = URL_POST_REGEX
            .captures(&response.body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| LoginFailure::unknown("sign-in page is missing its form target"))?;

        let post_url = url::Url::parse(&url_post)
            .map_err(|_| LoginFailure::unknown("sign-in form target is not a valid URL"))?;
        let host = post_url
            .host_str()
            .ok_or_else(|| LoginFailure::unknown("sign-in form target has no host"))?
            .to_string();
        let mut path = post_url.path().to_string();
        if let Some(query) = post_url.query() {
            path = format!("{path}?{query}");
        }

        let form = format!(
            "login={}&loginfmt={}&passwd={}&PPFT={}",
            urlencoding::encode(username),
            urlencoding::encode(username),
            urlencoding::encode(password),
            urlencoding::encode(&ppft)
        );
        let request = RawRequest::post_form(host, path, form).with_header("Cookie", cookies);
        let response = self.transport.https_request(request).await?;

        // A successful exchange redirects to the desktop URI with the token
        // pair in the fragment.
        if let Some(location) = response.header("Location")
            && location.contains("access_token")
        {
            return parse_token_fragment(location)
                .ok_or(LoginFailure::InvalidResponse);
        }

        if response.body.contains("Help us protect your account") {
            return Err(LoginFailure::unknown(
                "two-factor authentication is enabled on this account; use the browser sign-in",
            ));
        }
        Err(LoginFailure::WrongCredentials)
    }

    /// Browser flow: show the sign-in URL, take back the pasted redirect.
    async fn browser_flow(&self) -> Result<MsaTokens, LoginFailure> {
        let url = Self::sign_in_url();
        let Some(redirect) = self.prompt.obtain_redirect(&url).await else {
            return Err(LoginFailure::UserCancelled);
        };
        // A redirect the user mangled or abandoned has no usable fragment.
        parse_token_fragment(&redirect).ok_or(LoginFailure::UserCancelled)
    }

    async fn xbox_authenticate(&self, msa: &MsaTokens) -> Result<XboxToken, LoginFailure> {
        let body = json!({
            "Properties": {
                "AuthMethod": "RPS",
                "SiteName": "user.auth.xboxlive.com",
                "RpsTicket": msa.access_token,
            },
            "RelyingParty": "http://auth.xboxlive.com",
            "TokenType": "JWT",
        });
        let request = RawRequest::post_json(XBL_HOST, "/user/authenticate", body.to_string())
            .with_header("Accept", "application/json");
        let response = self.transport.https_request(request).await?;
        if response.status != 200 {
            return Err(LoginFailure::unknown(format!(
                "Xbox Live authentication returned HTTP {}",
                response.status
            )));
        }
        parse_xbox_token(&response.body).ok_or(LoginFailure::InvalidResponse)
    }

    async fn xsts_authorize(&self, xbl: &XboxToken) -> Result<XboxToken, LoginFailure> {
        let body = json!({
            "Properties": {
                "SandboxId": "RETAIL",
                "UserTokens": [xbl.token],
            },
            "RelyingParty": "rp://api.minecraftservices.com/",
            "TokenType": "JWT",
        });
        let request = RawRequest::post_json(XSTS_HOST, "/xsts/authorize", body.to_string())
            .with_header("Accept", "application/json");
        let response = self.transport.https_request(request).await?;
        match response.status {
            200 => parse_xbox_token(&response.body).ok_or(LoginFailure::InvalidResponse),
            // Refusals here are account restrictions, not bad credentials.
            401 => Err(classify_xsts_restriction(&response.body)),
            status => Err(LoginFailure::unknown(format!(
                "security token exchange returned HTTP {status}"
            ))),
        }
    }

    async fn game_login(&self, xsts: &XboxToken) -> Result<String, LoginFailure> {
        let body = json!({
            "identityToken": format!("XBL3.0 x={};{}", xsts.user_hash, xsts.token),
        });
        let request = RawRequest::post_json(
            API_HOST,
            "/authentication/login_with_xbox",
            body.to_string(),
        );
        let response = self.transport.https_request(request).await?;
        if response.status != 200 {
            return Err(LoginFailure::unknown(format!(
                "game service login returned HTTP {}",
                response.status
            )));
        }
        let value: Value =
            serde_json::from_str(&response.body).map_err(|_| LoginFailure::InvalidResponse)?;
        value["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or(LoginFailure::InvalidResponse)
    }

    async fn owns_game(&self, access_token: &str) -> Result<bool, LoginFailure> {
        let request = RawRequest::get(API_HOST, "/entitlements/mcstore")
            .with_header("Authorization", format!("Bearer {access_token}"));
        let response = self.transport.https_request(request).await?;
        match response.status {
            200 => {
                let value: Value = serde_json::from_str(&response.body)
                    .map_err(|_| LoginFailure::InvalidResponse)?;
                Ok(value["items"]
                    .as_array()
                    .is_some_and(|items| !items.is_empty()))
            }
            401 => Err(LoginFailure::LoginRequired),
            status => Err(LoginFailure::unknown(format!(
                "entitlement check returned HTTP {status}"
            ))),
        }
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<(String, String), LoginFailure> {
        let request = RawRequest::get(API_HOST, "/minecraft/profile")
            .with_header("Authorization", format!("Bearer {access_token}"));
        let response = self.transport.https_request(request).await?;
        if response.status != 200 {
            return Err(LoginFailure::unknown(format!(
                "profile fetch returned HTTP {}",
                response.status
            )));
        }
        let value: Value =
            serde_json::from_str(&response.body).map_err(|_| LoginFailure::InvalidResponse)?;
        match (value["id"].as_str(), value["name"].as_str()) {
            (Some(id), Some(name)) => Ok((id.to_string(), name.to_string())),
            _ => Err(LoginFailure::InvalidResponse),
        }
    }

    /// The shared downstream chain both entry flows feed into.
    async fn complete_chain(&self, msa: MsaTokens) -> Result<SessionToken, LoginFailure> {
        let xbl = self.xbox_authenticate(&msa).await?;
        debug!(user_hash = %xbl.user_hash, "Xbox Live token acquired");
        let xsts = self.xsts_authorize(&xbl).await?;
        let access_token = self.game_login(&xsts).await?;
        if !self.owns_game(&access_token).await? {
            return Err(LoginFailure::NotEntitled);
        }
        let (player_id, player_name) = self.fetch_profile(&access_token).await?;
        Ok(SessionToken {
            access_token,
            player_name,
            player_id,
            client_id: SessionToken::new_client_id(),
        })
    }
}

#[async_trait]
impl IdentityProvider for MsaProvider {
    async fn login(&self, credentials: &Credentials) -> Result<SessionToken, LoginFailure> {
        let msa = match credentials.method {
            LoginMethod::Credentials => {
                self.credentials_flow(&credentials.username, &credentials.password)
                    .await?
            }
            LoginMethod::Browser => self.browser_flow().await?,
        };
        self.complete_chain(msa).await
    }

    async fn validate(&self, token: &SessionToken) -> Result<(), LoginFailure> {
        // An entitlement probe doubles as a liveness check for the token.
        self.owns_game(&token.access_token).await.map(|_| ())
    }

    async fn refresh(&self, _token: &SessionToken) -> Result<SessionToken, LoginFailure> {
        // The session token does not carry the OAuth refresh token, so a
        // stale session goes back through a full login.
        Err(LoginFailure::LoginRequired)
    }
}

/// Pull the token pair out of a redirect's `#` fragment.
fn parse_token_fragment(redirect: &str) -> Option<MsaTokens> {
    let (_, fragment) = redirect.split_once('#')?;
    let mut access_token = None;
    let mut refresh_token = None;
    for pair in fragment.split('&') {
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let value = urlencoding::decode(value).ok()?.into_owned();
        match name {
            "access_token" => access_token = Some(value),
            "refresh_token" => refresh_token = Some(value),
            _ => {}
        }
    }
    Some(MsaTokens {
        access_token: access_token?,
        refresh_token: refresh_token?,
    })
}

fn parse_xbox_token(body: &str) -> Option<XboxToken> {
    let value: Value = serde_json::from_str(body).ok()?;
    Some(XboxToken {
        token: value["Token"].as_str()?.to_string(),
        user_hash: value["DisplayClaims"]["xui"][0]["uhs"].as_str()?.to_string(),
    })
}

fn classify_xsts_restriction(body: &str) -> LoginFailure {
    let xerr = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["XErr"].as_u64());
    let detail = match xerr {
        Some(2148916233) => "this account has no Xbox profile",
        Some(2148916238) => "this is a child account and must be added to a family first",
        _ => "the Xbox security token exchange was refused",
    };
    LoginFailure::unknown(detail)
}

fn collect_cookies(response: &HttpResponse) -> String {
    response
        .headers_named("set-cookie")
        .filter_map(|cookie| cookie.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_fragment_yields_token_pair() {
        let redirect = "https://login.live.com/oauth20_desktop.srf?lc=1033#access_token=ACCESS%2B1&refresh_token=REFRESH&expires_in=86400";
        let tokens = parse_token_fragment(redirect).unwrap();
        assert_eq!(tokens.access_token, "ACCESS+1");
        assert_eq!(tokens.refresh_token, "REFRESH");
    }

    #[test]
    fn fragmentless_or_incomplete_redirects_are_rejected() {
        assert!(parse_token_fragment("https://login.live.com/oauth20_desktop.srf").is_none());
        assert!(parse_token_fragment("https://x/#refresh_token=only").is_none());
        assert!(parse_token_fragment("no fragment here").is_none());
    }

    #[test]
    fn xbox_reply_parses_token_and_user_hash() {
        let body = r#"{
            "IssueInstant": "2024-01-01T00:00:00Z",
            "Token": "xbl-token",
            "DisplayClaims": { "xui": [ { "uhs": "123456" } ] }
        }"#;
        let token = parse_xbox_token(body).unwrap();
        assert_eq!(token.token, "xbl-token");
        assert_eq!(token.user_hash, "123456");
        assert!(parse_xbox_token(r#"{"Token":"t"}"#).is_none());
    }

    #[test]
    fn xsts_refusal_is_never_wrong_credentials() {
        let child = classify_xsts_restriction(r#"{"XErr":2148916238}"#);
        assert!(matches!(child, LoginFailure::Unknown { .. }));
        let no_profile = classify_xsts_restriction(r#"{"XErr":2148916233}"#);
        assert!(matches!(no_profile, LoginFailure::Unknown { .. }));
        let opaque = classify_xsts_restriction("not json");
        assert!(matches!(opaque, LoginFailure::Unknown { .. }));
    }

    #[test]
    fn sign_in_page_markers_are_extracted() {
        let page = r#"var ServerData = { sFTTag:'<input type="hidden" name="PPFT" id="i0327" value="PPFT-VALUE"/>', urlPost:'https://login.live.com/ppsecure/post.srf?contextid=ABC' };"#;
        let ppft = PPFT_REGEX.captures(page).unwrap().get(1).unwrap().as_str();
        assert_eq!(ppft, "PPFT-VALUE");
        let url = URL_POST_REGEX.captures(page).unwrap().get(1).unwrap().as_str();
        assert_eq!(url, "https://login.live.com/ppsecure/post.srf?contextid=ABC");
    }

    #[test]
    fn cookies_are_folded_into_one_header_value() {
        let response = HttpResponse {
            status: 200,
            headers: vec![
                ("Set-Cookie".to_string(), "MSPRequ=abc; path=/; secure".to_string()),
                ("Set-Cookie".to_string(), "MSPOK=def; path=/".to_string()),
            ],
            body: String::new(),
        };
        assert_eq!(collect_cookies(&response), "MSPRequ=abc; MSPOK=def");
    }

    #[test]
    fn sign_in_url_is_fully_qualified() {
        let url = MsaProvider::sign_in_url();
        assert!(url.starts_with("https://login.live.com/oauth20_authorize.srf?client_id="));
        assert!(url.contains("response_type=token"));
    }
}
