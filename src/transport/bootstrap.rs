//! Team-based crypto switching for broadcast peers.
//!
//! The referee box announces the two playing teams in a public broadcast.
//! A team peer turns on encryption once its own team is named and back off
//! when it no longer is, so a team that leaves the field falls back to the
//! public channel.

use tracing::info;

use crate::error::Result;
use crate::transport::peer::BroadcastPeer;

/// What a [`CryptoBootstrap`] decided for one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoAction {
    Enable,
    Disable,
    Keep,
}

#[derive(Debug, Clone)]
pub struct CryptoBootstrap {
    team_name: String,
    key: String,
    cipher: String,
    enabled: bool,
}

impl CryptoBootstrap {
    pub fn new(team_name: impl Into<String>, key: impl Into<String>, cipher: impl Into<String>) -> Self {
        Self {
            team_name: team_name.into(),
            key: key.into(),
            cipher: cipher.into(),
            enabled: false,
        }
    }

    pub fn team_name(&self) -> &str {
        &self.team_name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn decide(&self, team_names: &[&str]) -> CryptoAction {
        // empty slots mean no team is playing there
        let named = team_names
            .iter()
            .any(|name| !name.is_empty() && *name == self.team_name);
        match (named, self.enabled) {
            (true, false) => CryptoAction::Enable,
            (false, true) => CryptoAction::Disable,
            _ => CryptoAction::Keep,
        }
    }

    /// Record the teams named in a broadcast without touching a peer
    pub fn observe(&mut self, team_names: &[&str]) -> CryptoAction {
        let action = self.decide(team_names);
        match action {
            CryptoAction::Enable => self.enabled = true,
            CryptoAction::Disable => self.enabled = false,
            CryptoAction::Keep => {}
        }
        action
    }

    /// Observe and reconfigure `peer` accordingly.
    ///
    /// State only changes when the peer accepted the new setting.
    pub fn apply(&mut self, peer: &BroadcastPeer, team_names: &[&str]) -> Result<CryptoAction> {
        let action = self.decide(team_names);
        match action {
            CryptoAction::Enable => {
                peer.setup_crypto(&self.key, &self.cipher)?;
                info!(team = %self.team_name, "Team named, crypto enabled");
            }
            CryptoAction::Disable => {
                peer.setup_crypto("", "")?;
                info!(team = %self.team_name, "Team no longer named, crypto disabled");
            }
            CryptoAction::Keep => {}
        }
        self.observe(team_names);
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_once_then_keep() {
        let mut boot = CryptoBootstrap::new("Carologistics", "randomkey", "");
        assert_eq!(boot.observe(&["", ""]), CryptoAction::Keep);
        assert_eq!(boot.observe(&["Carologistics", "GRIPS"]), CryptoAction::Enable);
        assert_eq!(boot.observe(&["GRIPS", "Carologistics"]), CryptoAction::Keep);
        assert!(boot.is_enabled());
    }

    #[test]
    fn test_disable_when_unnamed() {
        let mut boot = CryptoBootstrap::new("Carologistics", "randomkey", "");
        boot.observe(&["Carologistics", ""]);
        assert_eq!(boot.observe(&["", "GRIPS"]), CryptoAction::Disable);
        assert!(!boot.is_enabled());
        assert_eq!(boot.observe(&["", ""]), CryptoAction::Keep);
    }

    #[test]
    fn test_empty_team_name_never_matches_empty_slots() {
        let mut boot = CryptoBootstrap::new("", "randomkey", "");
        assert_eq!(boot.observe(&["", ""]), CryptoAction::Keep);
        assert_eq!(boot.observe(&["Carologistics", ""]), CryptoAction::Keep);
        assert!(!boot.is_enabled());
    }
}
