//! Session token data model and its plaintext persistence format.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Credential bundle proving an authenticated identity to the game services.
///
/// Immutable once constructed: a refresh produces a new value, it never
/// mutates an existing one. `client_id` and `player_id` are hyphen-free hex
/// strings (32 characters) for every online session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    pub access_token: String,
    pub player_name: String,
    pub player_id: String,
    pub client_id: String,
}

#[derive(Debug, Error)]
pub enum SessionTokenError {
    #[error("expected 4 comma-separated fields, found {0}")]
    FieldCount(usize),
    #[error("invalid player uuid `{0}`")]
    InvalidPlayerId(String),
    #[error("invalid client id `{0}`")]
    InvalidClientId(String),
}

impl SessionToken {
    /// Fresh client id: a v4 UUID without separators.
    pub fn new_client_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    /// Offline sessions carry no credentials and never touch the network;
    /// the player id is the fixed `"0"`.
    pub fn offline(player_name: impl Into<String>) -> Self {
        Self {
            access_token: String::new(),
            player_name: player_name.into(),
            player_id: "0".to_string(),
            client_id: String::new(),
        }
    }

    /// Serialize to the plaintext cache field order:
    /// `accessToken,playerName,uuid,clientId`.
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{}",
            self.access_token, self.player_name, self.player_id, self.client_id
        )
    }

    /// Parse a plaintext cache value. Rejects anything that does not have
    /// exactly four fields with well-shaped uuid/client-id hex strings.
    pub fn from_line(line: &str) -> Result<Self, SessionTokenError> {
        let fields: Vec<&str> = line.split(',').collect();
        let [access_token, player_name, player_id, client_id] = fields[..] else {
            return Err(SessionTokenError::FieldCount(fields.len()));
        };
        if !is_hex_of_len(player_id, 32) {
            return Err(SessionTokenError::InvalidPlayerId(player_id.to_string()));
        }
        if !is_hex_of_len(client_id, 32) {
            return Err(SessionTokenError::InvalidClientId(client_id.to_string()));
        }
        Ok(Self {
            access_token: access_token.to_string(),
            player_name: player_name.to_string(),
            player_id: player_id.to_string(),
            client_id: client_id.to_string(),
        })
    }
}

pub(crate) fn is_hex_of_len(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SessionToken {
        SessionToken {
            access_token: "TOKEN123".to_string(),
            player_name: "Alice".to_string(),
            player_id: "1234567890abcdef1234567890abcdef".to_string(),
            client_id: "abcdef1234567890abcdef1234567890".to_string(),
        }
    }

    #[test]
    fn line_round_trip_preserves_token() {
        let token = sample();
        let parsed = SessionToken::from_line(&token.to_line()).unwrap();
        assert_eq!(parsed, token);
    }

    #[test]
    fn wrong_field_count_is_rejected() {
        assert!(matches!(
            SessionToken::from_line("a,b,c"),
            Err(SessionTokenError::FieldCount(3))
        ));
        assert!(matches!(
            SessionToken::from_line("a,b,c,d,e"),
            Err(SessionTokenError::FieldCount(5))
        ));
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert!(matches!(
            SessionToken::from_line("t,n,not-a-uuid,abcdef1234567890abcdef1234567890"),
            Err(SessionTokenError::InvalidPlayerId(_))
        ));
        assert!(matches!(
            SessionToken::from_line("t,n,1234567890abcdef1234567890abcdef,short"),
            Err(SessionTokenError::InvalidClientId(_))
        ));
        // Hyphenated uuids are not accepted in the persisted form.
        assert!(
            SessionToken::from_line("t,n,12345678-90ab-cdef-1234-567890abcdef,abcdef1234567890abcdef1234567890")
                .is_err()
        );
    }

    #[test]
    fn fresh_client_ids_are_hyphen_free_hex() {
        let id = SessionToken::new_client_id();
        assert!(is_hex_of_len(&id, 32));
    }

    #[test]
    fn offline_token_has_fixed_player_id() {
        let token = SessionToken::offline("steve");
        assert_eq!(token.player_id, "0");
        assert_eq!(token.player_name, "steve");
        assert!(token.access_token.is_empty());
    }
}
