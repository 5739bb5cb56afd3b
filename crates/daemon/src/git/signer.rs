// Attribution trailers for daemon-authored commits.
//
// The signature is an HMAC-SHA256 over `message + timestamp + version` keyed by
// the anonymous installation id. It marks provenance; the key is not secret.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::identity::IdentityStore;

type HmacSha256 = Hmac<Sha256>;

pub const COMMIT_TRAILER: &str = "Autopilot-Commit";
pub const VERSION_TRAILER: &str = "Autopilot-Version";
pub const USER_TRAILER: &str = "Autopilot-User";
pub const SIGNATURE_TRAILER: &str = "Autopilot-Signature";

pub const DAEMON_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustTrailer {
    pub version: String,
    pub user_id: String,
    pub signature: String,
}

impl TrustTrailer {
    pub fn lines(&self) -> [String; 4] {
        [
            format!("{COMMIT_TRAILER}: true"),
            format!("{VERSION_TRAILER}: {}", self.version),
            format!("{USER_TRAILER}: {}", self.user_id),
            format!("{SIGNATURE_TRAILER}: {}", self.signature),
        ]
    }
}

pub struct TrustSigner<'a> {
    identity: &'a IdentityStore,
    version: &'a str,
}

impl<'a> TrustSigner<'a> {
    pub fn new(identity: &'a IdentityStore) -> Self {
        Self { identity, version: DAEMON_VERSION }
    }

    pub fn with_version(mut self, version: &'a str) -> Self {
        self.version = version;
        self
    }

    pub fn trailer(&self, message: &str, at: DateTime<Utc>) -> TrustTrailer {
        let identity = self.identity.get();
        let signature = sign(&identity.id, message, &at.to_rfc3339(), self.version);
        TrustTrailer { version: self.version.to_string(), user_id: identity.id, signature }
    }

    /// Append the trailer block to `message`, separated by a blank line.
    pub fn sign_message(&self, message: &str, at: DateTime<Utc>) -> String {
        let trailer = self.trailer(message, at);
        append_trailers(message, &trailer.lines())
    }
}

/// Hex HMAC-SHA256 of `message + timestamp + version` under `key`.
pub fn sign(key: &str, message: &str, timestamp: &str, version: &str) -> String {
    // HMAC accepts keys of any length.
    let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
        return String::new();
    };
    mac.update(message.as_bytes());
    mac.update(timestamp.as_bytes());
    mac.update(version.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn append_trailers(message: &str, lines: &[String]) -> String {
    let mut output = message.trim_end_matches('\n').to_string();
    output.push_str("\n\n");
    output.push_str(&lines.join("\n"));
    output
}

/// True when a commit message carries the daemon's commit marker.
pub fn is_autopilot_message(message: &str) -> bool {
    let marker = format!("{COMMIT_TRAILER}: true");
    message.lines().any(|line| line.trim() == marker)
}
