use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Status of a ledger transaction, and of every token it produced.
///
/// Numeric codes are part of the persisted contract:
/// `Unknown=0, Pending=1, Confirmed=2, Deleted=3`.
///
/// Lifecycle: `Unknown → Pending → {Confirmed, Deleted}`. `Confirmed` and
/// `Deleted` are terminal.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum TxStatus {
    /// Nothing is known about the transaction.
    #[default]
    Unknown = 0,
    /// Submitted to the ledger, not yet final.
    Pending = 1,
    /// Committed by the ledger.
    Confirmed = 2,
    /// Dropped because the ledger failed to commit it.
    Deleted = 3,
}

impl TxStatus {
    /// All statuses in code order.
    pub const ALL: [TxStatus; 4] = [
        TxStatus::Unknown,
        TxStatus::Pending,
        TxStatus::Confirmed,
        TxStatus::Deleted,
    ];

    /// The persisted numeric code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode a persisted numeric code.
    pub fn from_code(code: u8) -> Result<Self, TypeError> {
        match code {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Pending),
            2 => Ok(Self::Confirmed),
            3 => Ok(Self::Deleted),
            other => Err(TypeError::InvalidStatusCode(other)),
        }
    }

    /// Returns `true` for `Confirmed` and `Deleted`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Deleted)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    ///
    /// Re-applying the current status is always permitted (a no-op).
    /// A transaction first seen at finality may jump straight from
    /// `Unknown` to a terminal status.
    pub fn can_transition_to(self, next: TxStatus) -> bool {
        if self == next {
            return true;
        }
        match self {
            Self::Unknown => next != Self::Unknown,
            Self::Pending => next.is_terminal(),
            Self::Confirmed | Self::Deleted => false,
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Pending => write!(f, "Pending"),
            Self::Confirmed => write!(f, "Confirmed"),
            Self::Deleted => write!(f, "Deleted"),
        }
    }
}

impl FromStr for TxStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unknown" | "" => Ok(Self::Unknown),
            "Pending" => Ok(Self::Pending),
            "Confirmed" => Ok(Self::Confirmed),
            "Deleted" => Ok(Self::Deleted),
            other => Err(TypeError::UnknownStatus(other.to_string())),
        }
    }
}

impl TryFrom<u8> for TxStatus {
    type Error = TypeError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

/// Kind of ledger action a transaction record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    /// New tokens created by an issuer.
    Issue,
    /// Tokens moved between parties.
    Transfer,
    /// Tokens taken out of circulation.
    Redeem,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Issue => write!(f, "Issue"),
            Self::Transfer => write!(f, "Transfer"),
            Self::Redeem => write!(f, "Redeem"),
        }
    }
}

impl FromStr for ActionType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Issue" => Ok(Self::Issue),
            "Transfer" => Ok(Self::Transfer),
            "Redeem" => Ok(Self::Redeem),
            other => Err(TypeError::UnknownActionType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn codes_match_persisted_contract() {
        assert_eq!(TxStatus::Unknown.code(), 0);
        assert_eq!(TxStatus::Pending.code(), 1);
        assert_eq!(TxStatus::Confirmed.code(), 2);
        assert_eq!(TxStatus::Deleted.code(), 3);
        assert_eq!(TxStatus::default(), TxStatus::Unknown);
    }

    #[test]
    fn invalid_code_is_rejected() {
        assert_eq!(TxStatus::from_code(4), Err(TypeError::InvalidStatusCode(4)));
        assert!(TxStatus::try_from(200u8).is_err());
    }

    #[test]
    fn lifecycle_transitions() {
        use TxStatus::*;
        assert!(Unknown.can_transition_to(Pending));
        assert!(Unknown.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Deleted));
        assert!(!Pending.can_transition_to(Unknown));
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Confirmed.can_transition_to(Deleted));
        assert!(!Deleted.can_transition_to(Confirmed));
    }

    #[test]
    fn empty_name_is_unknown() {
        assert_eq!("".parse::<TxStatus>().unwrap(), TxStatus::Unknown);
        assert!("Finalized".parse::<TxStatus>().is_err());
    }

    #[test]
    fn action_type_names() {
        assert_eq!(ActionType::Redeem.to_string(), "Redeem");
        assert_eq!("Issue".parse::<ActionType>().unwrap(), ActionType::Issue);
        assert_eq!(
            "Burn".parse::<ActionType>(),
            Err(TypeError::UnknownActionType("Burn".into()))
        );
    }

    proptest! {
        #[test]
        fn same_status_is_always_a_valid_transition(code in 0u8..4) {
            let status = TxStatus::from_code(code).unwrap();
            prop_assert!(status.can_transition_to(status));
            prop_assert_eq!(status.to_string().parse::<TxStatus>().unwrap(), status);
        }

        #[test]
        fn terminal_statuses_never_move(code in 0u8..4, next in 0u8..4) {
            let status = TxStatus::from_code(code).unwrap();
            let next = TxStatus::from_code(next).unwrap();
            if status.is_terminal() && status != next {
                prop_assert!(!status.can_transition_to(next));
            }
        }
    }
}
