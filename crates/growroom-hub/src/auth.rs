//! Authentication collaborator
//!
//! Credential exchange happens elsewhere; the coordinator only needs to turn
//! a token into an opaque principal id.

use growroom_core::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub trait Authenticator: Send + Sync {
    /// The player a token belongs to, if it is valid
    fn verify(&self, token: &str) -> Option<PlayerId>;

    /// Display name for a newly created player
    fn display_name(&self, player: PlayerId) -> String {
        player.to_string()
    }
}

/// One configured login
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub player: PlayerId,
    pub name: String,
}

/// Fixed token table, typically from the server config
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, PlayerId>,
    names: HashMap<PlayerId, String>,
}

impl StaticTokens {
    pub fn new(entries: impl IntoIterator<Item = TokenEntry>) -> Self {
        let mut table = Self::default();
        for entry in entries {
            table.tokens.insert(entry.token, entry.player);
            table.names.insert(entry.player, entry.name);
        }
        table
    }
}

impl Authenticator for StaticTokens {
    fn verify(&self, token: &str) -> Option<PlayerId> {
        self.tokens.get(token).copied()
    }

    fn display_name(&self, player: PlayerId) -> String {
        self.names
            .get(&player)
            .cloned()
            .unwrap_or_else(|| player.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_tokens() {
        let auth = StaticTokens::new([TokenEntry {
            token: "s3cret".into(),
            player: PlayerId(4),
            name: "Marley".into(),
        }]);
        assert_eq!(auth.verify("s3cret"), Some(PlayerId(4)));
        assert_eq!(auth.verify("guess"), None);
        assert_eq!(auth.display_name(PlayerId(4)), "Marley");
        assert_eq!(auth.display_name(PlayerId(5)), "player:5");
    }
}
