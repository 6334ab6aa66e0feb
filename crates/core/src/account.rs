use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two account shapes the pipeline distinguishes. The distinction
/// matters for sign normalization (bank statements show money out as
/// negative, card statements show purchases as positive) and for transfer
/// pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountKind {
    Bank,
    CreditCard,
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountKind::Bank => write!(f, "Bank"),
            AccountKind::CreditCard => write!(f, "CreditCard"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub kind: AccountKind,
    /// Short user-facing name ("Chequing", "Visa"). Used by the transfer
    /// detector to spot rows that mention a sibling account.
    pub alias: String,
    pub last4: Option<String>,
    /// Some institutions export amounts with the opposite sign of their
    /// own statement convention; this flips raw amounts before any other
    /// normalization.
    pub invert_amounts: bool,
}

impl Account {
    pub fn new(id: i64, kind: AccountKind, alias: &str) -> Self {
        Account {
            id: AccountId(id),
            kind,
            alias: alias.to_string(),
            last4: None,
            invert_amounts: false,
        }
    }

    pub fn with_last4(mut self, last4: &str) -> Self {
        self.last4 = Some(last4.to_string());
        self
    }
}
