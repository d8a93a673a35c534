use sha2::{Digest, Sha256};

/// Hex SHA-256 of the `|`-joined parts. Same inputs, same id, across runs.
pub fn stable_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join("|").as_bytes());
    hex::encode(hasher.finalize())
}

pub fn message_id(channel_id: &str, ts: &str) -> String {
    stable_id(&["slack_msg", channel_id, ts])
}

pub fn reaction_id(message_id: &str, reactor_id: &str, reaction: &str) -> String {
    stable_id(&["slack_rx", message_id, reactor_id, reaction])
}

/// For messages without a timestamp; these cannot be re-imported idempotently.
pub fn random_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
