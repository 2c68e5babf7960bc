//! Session identity resolution.
//!
//! Every outgoing request carries a player identifier. Which one depends on
//! connection state, in strict precedence order: the connected wallet address,
//! else the backend-assigned canonical connection id, else a provisional
//! identifier generated once at startup and stable for the process lifetime.
//!
//! The backend assigns the canonical id (`client_connected`) at some point
//! *after* the socket opens, so there is a bounded window in which requests go
//! out under the provisional id. That window is modelled explicitly by
//! [`SessionIdentity::canonical_pending`] rather than left implicit in call
//! ordering; the backend reconciles the two ids, not this client.

use uuid::Uuid;

/// Resolves "who am I" for outgoing requests.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    provisional: String,
    canonical: Option<String>,
    wallet: Option<String>,
    canonical_pending: bool,
}

impl SessionIdentity {
    /// Create an identity with a freshly generated provisional identifier.
    pub fn new() -> Self {
        Self {
            provisional: format!("player_{}", Uuid::new_v4().simple()),
            canonical: None,
            wallet: None,
            canonical_pending: true,
        }
    }

    /// The identifier to stamp on the next outgoing request.
    pub fn current(&self) -> &str {
        if let Some(wallet) = &self.wallet {
            wallet
        } else if let Some(canonical) = &self.canonical {
            canonical
        } else {
            &self.provisional
        }
    }

    /// Adopt the backend-assigned canonical connection id. All *future*
    /// requests use it (unless a wallet is connected, which takes precedence);
    /// requests already sent under the provisional id are the backend's to
    /// reconcile.
    pub fn adopt_canonical(&mut self, id: impl Into<String>) {
        self.canonical = Some(id.into());
        self.canonical_pending = false;
    }

    /// Connect or disconnect the wallet. A pure local switch — the new
    /// identifier reaches the backend as a field on the next outgoing request.
    pub fn set_wallet(&mut self, address: Option<String>) {
        self.wallet = address;
    }

    /// The connected wallet address, if any.
    pub fn wallet(&self) -> Option<&str> {
        self.wallet.as_deref()
    }

    pub fn is_wallet_connected(&self) -> bool {
        self.wallet.is_some()
    }

    /// True while no canonical id has been adopted for the current
    /// connection — the identity-reconciliation window.
    pub fn canonical_pending(&self) -> bool {
        self.canonical_pending
    }

    /// A reconnect invalidates the previous connection's canonical id; keep
    /// it as a best-effort identifier but reopen the pending window until the
    /// new assignment arrives.
    pub fn mark_reconnecting(&mut self) {
        self.canonical_pending = true;
    }
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn provisional_id_is_stable() {
        let identity = SessionIdentity::new();
        let first = identity.current().to_string();
        assert!(first.starts_with("player_"));
        assert_eq!(identity.current(), first);
        assert!(identity.canonical_pending());
    }

    #[test]
    fn canonical_adoption_supersedes_provisional() {
        let mut identity = SessionIdentity::new();
        identity.adopt_canonical("conn_42");
        assert_eq!(identity.current(), "conn_42");
        assert!(!identity.canonical_pending());
    }

    #[test]
    fn wallet_takes_precedence_and_reverts() {
        let mut identity = SessionIdentity::new();
        identity.adopt_canonical("conn_42");

        identity.set_wallet(Some("0xabc".into()));
        assert!(identity.is_wallet_connected());
        assert_eq!(identity.current(), "0xabc");

        identity.set_wallet(None);
        assert!(!identity.is_wallet_connected());
        assert_eq!(identity.current(), "conn_42");
    }

    #[test]
    fn wallet_connects_before_backend_learns_of_it() {
        // Connecting a wallet is purely local; it must win immediately even
        // while the canonical assignment is still pending.
        let mut identity = SessionIdentity::new();
        identity.set_wallet(Some("0xdef".into()));
        assert!(identity.canonical_pending());
        assert_eq!(identity.current(), "0xdef");
    }

    #[test]
    fn reconnect_reopens_pending_window() {
        let mut identity = SessionIdentity::new();
        identity.adopt_canonical("conn_1");
        identity.mark_reconnecting();
        assert!(identity.canonical_pending());
        // The stale canonical id is still the best available identifier.
        assert_eq!(identity.current(), "conn_1");

        identity.adopt_canonical("conn_2");
        assert_eq!(identity.current(), "conn_2");
        assert!(!identity.canonical_pending());
    }

    #[test]
    fn distinct_sessions_get_distinct_provisional_ids() {
        let a = SessionIdentity::new();
        let b = SessionIdentity::new();
        assert_ne!(a.current(), b.current());
    }
}
