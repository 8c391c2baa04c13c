//! Trust-based admission control for inbound calls
//!
//! The gate is a pure decision function: it looks at the identity an inbound
//! caller claims and the configured trust list, and returns either
//! [`Admission::Accept`] or [`Admission::Decline`]. A decline carries an
//! [`OwnerNotice`] that the orchestrator is expected to deliver to the owner
//! through the signaling engine. The gate itself never performs I/O.
//!
//! # Example
//!
//! ```rust
//! use doorbell_core::trust::{Admission, TrustGate, TrustList};
//!
//! let trusted = TrustList::new(vec![
//!     "sip:owner@example.com".to_string(),
//!     "sip:friend@example.com".to_string(),
//! ]).unwrap();
//! let gate = TrustGate::new(trusted);
//!
//! assert_eq!(gate.admit("sip:friend@example.com"), Admission::Accept);
//!
//! match gate.admit("sip:stranger@example.com") {
//!     Admission::Decline(notice) => {
//!         assert_eq!(notice.recipient, "sip:owner@example.com");
//!         assert!(notice.text.contains("sip:stranger@example.com"));
//!     }
//!     Admission::Accept => unreachable!(),
//! }
//! ```

use std::fmt;

use crate::error::{DoorbellError, DoorbellResult};

/// Ordered list of trusted caller identities
///
/// Entry 0 is the owner: the only destination for doorbell calls and the only
/// recipient of untrusted-caller notices. A `TrustList` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustList {
    entries: Vec<String>,
}

impl TrustList {
    /// Build a trust list, rejecting an empty one
    pub fn new(entries: Vec<String>) -> DoorbellResult<Self> {
        if entries.is_empty() {
            return Err(DoorbellError::config(
                "trust list is empty; the first entry must be the owner address",
            ));
        }
        Ok(Self { entries })
    }

    /// The owner address (first entry)
    pub fn owner(&self) -> &str {
        &self.entries[0]
    }

    /// Byte-equal membership test
    pub fn contains(&self, identity: &str) -> bool {
        self.entries.iter().any(|entry| entry == identity)
    }

    /// All entries, owner first
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Display for TrustList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.entries.join(", "))
    }
}

/// Message the owner must receive when an untrusted caller is turned away
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerNotice {
    /// Address to deliver the notice to (always the owner)
    pub recipient: String,
    /// The caller that was declined
    pub caller: String,
    /// Human-readable message text
    pub text: String,
}

impl OwnerNotice {
    fn untrusted_caller(owner: &str, caller: &str) -> Self {
        Self {
            recipient: owner.to_string(),
            caller: caller.to_string(),
            text: format!("Untrusted user {} tried to call the doorbell.", caller),
        }
    }
}

/// Outcome of an admission decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Caller is on the trust list; answer the call
    Accept,
    /// Caller is unknown; decline and deliver the notice
    Decline(OwnerNotice),
}

impl Admission {
    pub fn is_accept(&self) -> bool {
        matches!(self, Admission::Accept)
    }
}

/// Decide admission for `caller` against a raw trust list
///
/// Fails with a configuration error when `trusted` is empty instead of
/// silently declining every caller.
pub fn admit(caller: &str, trusted: &[String]) -> DoorbellResult<Admission> {
    let owner = trusted
        .first()
        .ok_or_else(|| DoorbellError::config("cannot evaluate admission: trust list is empty"))?;

    if trusted.iter().any(|entry| entry == caller) {
        Ok(Admission::Accept)
    } else {
        Ok(Admission::Decline(OwnerNotice::untrusted_caller(owner, caller)))
    }
}

/// Admission gate bound to a validated trust list
#[derive(Debug, Clone)]
pub struct TrustGate {
    trusted: TrustList,
}

impl TrustGate {
    pub fn new(trusted: TrustList) -> Self {
        Self { trusted }
    }

    /// Decide admission for `caller`
    pub fn admit(&self, caller: &str) -> Admission {
        if self.trusted.contains(caller) {
            Admission::Accept
        } else {
            Admission::Decline(OwnerNotice::untrusted_caller(self.trusted.owner(), caller))
        }
    }

    pub fn owner(&self) -> &str {
        self.trusted.owner()
    }

    pub fn trust_list(&self) -> &TrustList {
        &self.trusted
    }
}
