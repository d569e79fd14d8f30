//! Mapping between human-readable game versions and protocol numbers.
//!
//! Marking a new version as supported means adding its table entry here and,
//! if it opens a new protocol id, extending the matching codec family set.

use thiserror::Error;

/// Packet codec families the client knows how to speak.
///
/// Protocol ids are partitioned into two disjoint sets; an id outside both
/// is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecFamily {
    /// Pre-netty wire format (1.4.6 through 1.6.4).
    Beta,
    /// Netty-era wire format (1.7.2 and later).
    Modern,
}

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("protocol version {0} is not supported")]
    UnsupportedProtocol(i32),
}

/// Newest game version this client knows about.
pub const LATEST_GAME_VERSION: &str = "1.17";

/// Version table in release order. Several human versions share one protocol
/// id; reverse lookups return the earliest entry for that id.
const VERSION_TABLE: &[(&str, i32)] = &[
    ("1.4.6", 51),
    ("1.4.7", 51),
    ("1.5.1", 60),
    ("1.5.2", 61),
    ("1.6", 72),
    ("1.6.0", 72),
    ("1.6.1", 73),
    ("1.6.2", 73),
    ("1.6.3", 73),
    ("1.6.4", 73),
    ("1.7.2", 4),
    ("1.7.3", 4),
    ("1.7.4", 4),
    ("1.7.5", 4),
    ("1.7.6", 5),
    ("1.7.7", 5),
    ("1.7.8", 5),
    ("1.7.9", 5),
    ("1.7.10", 5),
    ("1.8", 47),
    ("1.8.0", 47),
    ("1.8.1", 47),
    ("1.8.2", 47),
    ("1.8.3", 47),
    ("1.8.4", 47),
    ("1.8.5", 47),
    ("1.8.6", 47),
    ("1.8.7", 47),
    ("1.8.8", 47),
    ("1.8.9", 47),
    ("1.9", 107),
    ("1.9.0", 107),
    ("1.9.1", 108),
    ("1.9.2", 109),
    ("1.9.3", 110),
    ("1.9.4", 110),
    ("1.10", 210),
    ("1.10.0", 210),
    ("1.10.1", 210),
    ("1.10.2", 210),
    ("1.11", 315),
    ("1.11.0", 315),
    ("1.11.1", 316),
    ("1.11.2", 316),
    ("1.12", 335),
    ("1.12.0", 335),
    ("1.12.1", 338),
    ("1.12.2", 340),
    ("1.13", 393),
    ("1.13.1", 401),
    ("1.13.2", 404),
    ("1.14", 477),
    ("1.14.0", 477),
    ("1.14.1", 480),
    ("1.14.2", 485),
    ("1.14.3", 490),
    ("1.14.4", 498),
    ("1.15", 573),
    ("1.15.0", 573),
    ("1.15.1", 575),
    ("1.15.2", 578),
    ("1.16", 735),
    ("1.16.0", 735),
    ("1.16.1", 736),
    ("1.16.2", 751),
    ("1.16.3", 753),
    ("1.16.4", 754),
    ("1.16.5", 754),
    ("1.17", 755),
];

const BETA_PROTOCOLS: &[i32] = &[51, 60, 61, 72, 73, 74, 78];

const MODERN_PROTOCOLS: &[i32] = &[
    4, 5, 47, 107, 108, 109, 110, 210, 315, 316, 335, 338, 340, 393, 401, 404, 477, 480, 485, 490,
    498, 573, 575, 578, 735, 736, 751, 753, 754, 755,
];

/// Convert a human-readable version number to its network protocol number.
///
/// Anything after the first whitespace is ignored, so `"1.16.4 pre-1"` maps
/// like `"1.16.4"`. A string without a dot is treated as a bare protocol
/// number. Returns 0 when the version is unknown.
pub fn protocol_for_version(version: &str) -> i32 {
    let Some(word) = version.split_whitespace().next() else {
        return 0;
    };

    if !word.contains('.') {
        return word.parse().unwrap_or(0);
    }

    VERSION_TABLE
        .iter()
        .find(|(human, _)| *human == word)
        .map(|(_, protocol)| *protocol)
        .unwrap_or(0)
}

/// Convert a network protocol number to a human-readable version number.
///
/// When several versions share the protocol number, the earliest released
/// one is returned. Returns `"0.0"` for unmapped ids.
pub fn version_for_protocol(protocol: i32) -> &'static str {
    VERSION_TABLE
        .iter()
        .find(|(_, id)| *id == protocol)
        .map(|(human, _)| *human)
        .unwrap_or("0.0")
}

/// Select the packet codec family able to speak the given protocol number.
pub fn codec_family(protocol: i32) -> Result<CodecFamily, VersionError> {
    if BETA_PROTOCOLS.contains(&protocol) {
        Ok(CodecFamily::Beta)
    } else if MODERN_PROTOCOLS.contains(&protocol) {
        Ok(CodecFamily::Modern)
    } else {
        Err(VersionError::UnsupportedProtocol(protocol))
    }
}
