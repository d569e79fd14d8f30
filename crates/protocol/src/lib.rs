//! Protocol version bookkeeping and service discovery.
//!
//! Maps human-readable game versions to network protocol numbers (and back),
//! selects the packet codec family for a protocol number, and performs
//! optional SRV-based service discovery for bare domain names.

pub mod srv;
pub mod versions;

pub use srv::lookup_service;
pub use versions::{
    CodecFamily, LATEST_GAME_VERSION, VersionError, codec_family, protocol_for_version,
    version_for_protocol,
};
