// Draft order: the immutable sequence of pick slots supplied by the
// commissioner tooling.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use super::pick::TeamId;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("draft order contains no picks")]
    Empty,

    #[error("slot {index} has round 0 (rounds start at 1)")]
    ZeroRound { index: usize },

    #[error("slot {index} has an empty team")]
    EmptyTeam { index: usize },

    #[error("pick numbers must be strictly increasing: slot {index} has {found} after {previous}")]
    NotIncreasing {
        index: usize,
        previous: u32,
        found: u32,
    },

    #[error("failed to read draft order {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse draft order {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

/// Whether a round restricts selections to unowned or own players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundType {
    Protected,
    Unprotected,
}

impl RoundType {
    pub fn label(self) -> &'static str {
        match self {
            RoundType::Protected => "protected",
            RoundType::Unprotected => "unprotected",
        }
    }
}

impl fmt::Display for RoundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// Commissioner files are hand-edited, so accept any casing.
impl<'de> Deserialize<'de> for RoundType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "protected" => Ok(RoundType::Protected),
            "unprotected" => Ok(RoundType::Unprotected),
            other => Err(serde::de::Error::custom(format!(
                "unknown round_type '{other}', expected 'protected' or 'unprotected'"
            ))),
        }
    }
}

/// One entry of the draft order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickSlot {
    pub round: u32,
    /// Global pick number, unique and strictly increasing across the order.
    #[serde(alias = "pick")]
    pub pick_number: u32,
    pub team: TeamId,
    pub round_type: RoundType,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl PickSlot {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

// ---------------------------------------------------------------------------
// DraftOrder
// ---------------------------------------------------------------------------

/// Validated, immutable pick order. The team-per-round pattern is whatever
/// the commissioner supplied; no snake pattern is assumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PickSlot>", into = "Vec<PickSlot>")]
pub struct DraftOrder {
    slots: Vec<PickSlot>,
}

/// On-disk shapes accepted for an order file.
#[derive(Deserialize)]
#[serde(untagged)]
enum OrderFile {
    List(Vec<PickSlot>),
    Wrapped {
        #[serde(alias = "rounds")]
        picks: Vec<PickSlot>,
    },
}

impl DraftOrder {
    pub fn new(slots: Vec<PickSlot>) -> Result<Self, OrderError> {
        if slots.is_empty() {
            return Err(OrderError::Empty);
        }

        let mut previous: Option<u32> = None;
        for (index, slot) in slots.iter().enumerate() {
            if slot.round == 0 {
                return Err(OrderError::ZeroRound { index });
            }
            if slot.team.as_str().trim().is_empty() {
                return Err(OrderError::EmptyTeam { index });
            }
            if let Some(prev) = previous {
                if slot.pick_number <= prev {
                    return Err(OrderError::NotIncreasing {
                        index,
                        previous: prev,
                        found: slot.pick_number,
                    });
                }
            }
            previous = Some(slot.pick_number);
        }

        Ok(DraftOrder { slots })
    }

    /// Parse an order from JSON text: either a bare array of slots or an
    /// object with a `picks` (or `rounds`) array.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        let file: OrderFile = serde_json::from_str(text)?;
        let slots = match file {
            OrderFile::List(slots) => slots,
            OrderFile::Wrapped { picks } => picks,
        };
        DraftOrder::new(slots).map_err(serde::de::Error::custom)
    }

    pub fn load(path: &Path) -> Result<Self, OrderError> {
        let text = std::fs::read_to_string(path).map_err(|source| OrderError::Io {
            path: path.display().to_string(),
            source,
        })?;
        DraftOrder::from_json_str(&text).map_err(|source| OrderError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[PickSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&PickSlot> {
        self.slots.get(index)
    }

    /// The slot after `index`.
    pub fn on_deck(&self, index: usize) -> Option<&PickSlot> {
        self.slots.get(index + 1)
    }

    /// The slot two after `index`.
    pub fn in_the_hole(&self, index: usize) -> Option<&PickSlot> {
        self.slots.get(index + 2)
    }

    pub fn position_of_pick(&self, pick_number: u32) -> Option<usize> {
        self.slots
            .binary_search_by_key(&pick_number, |s| s.pick_number)
            .ok()
    }

    /// Distinct teams in order of first appearance.
    pub fn teams(&self) -> Vec<TeamId> {
        let mut seen: Vec<TeamId> = Vec::new();
        for slot in &self.slots {
            if !seen.contains(&slot.team) {
                seen.push(slot.team.clone());
            }
        }
        seen
    }

    pub fn contains_team(&self, team: &TeamId) -> bool {
        self.slots.iter().any(|s| s.team == *team)
    }

    pub fn pick_counts_by_team(&self) -> HashMap<TeamId, usize> {
        let mut counts = HashMap::new();
        for slot in &self.slots {
            *counts.entry(slot.team.clone()).or_insert(0) += 1;
        }
        counts
    }
}

impl TryFrom<Vec<PickSlot>> for DraftOrder {
    type Error = OrderError;

    fn try_from(slots: Vec<PickSlot>) -> Result<Self, Self::Error> {
        DraftOrder::new(slots)
    }
}

impl From<DraftOrder> for Vec<PickSlot> {
    fn from(order: DraftOrder) -> Self {
        order.slots
    }
}
