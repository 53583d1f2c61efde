//! Participant legs of an order saga.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::state::LegStatus;

/// The participant a leg talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegKind {
    Shipment,
    Invoice,
}

impl LegKind {
    /// Every leg, in the order requests and compensations are issued.
    pub const ALL: [LegKind; 2] = [LegKind::Shipment, LegKind::Invoice];

    /// Returns the leg on the other side of the saga.
    pub fn other(&self) -> LegKind {
        match self {
            LegKind::Shipment => LegKind::Invoice,
            LegKind::Invoice => LegKind::Shipment,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LegKind::Shipment => "shipment",
            LegKind::Invoice => "invoice",
        }
    }
}

impl std::fmt::Display for LegKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown leg name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown leg '{0}', expected 'shipment' or 'invoice'")]
pub struct UnknownLeg(pub String);

impl FromStr for LegKind {
    type Err = UnknownLeg;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "shipment" => Ok(LegKind::Shipment),
            "invoice" => Ok(LegKind::Invoice),
            _ => Err(UnknownLeg(s.to_string())),
        }
    }
}

/// Progress of one participant leg.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    pub status: LegStatus,
    /// Resource id returned by the participant; set once the leg succeeded.
    pub external_id: Option<String>,
}
