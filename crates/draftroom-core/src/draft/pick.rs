// Pick records and the identities they reference.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::order::{PickSlot, RoundType};

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Opaque league team identifier (e.g. "WIZ").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(String);

impl TeamId {
    pub fn new(id: impl Into<String>) -> Self {
        TeamId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TeamId {
    fn from(s: &str) -> Self {
        TeamId(s.to_string())
    }
}

/// Opaque player identifier supplied by the eligibility dataset. The engine
/// never derives one from free text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        PlayerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        PlayerId(s.to_string())
    }
}

/// A resolved player together with the team that owned it when it was
/// looked up. Two refs are equal when their ids are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRef {
    pub id: PlayerId,
    #[serde(default)]
    pub owner: Option<TeamId>,
}

impl PlayerRef {
    pub fn new(id: impl Into<String>, owner: Option<TeamId>) -> Self {
        PlayerRef {
            id: PlayerId::new(id),
            owner,
        }
    }
}

impl PartialEq for PlayerRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PlayerRef {}

// ---------------------------------------------------------------------------
// Pick records
// ---------------------------------------------------------------------------

/// How a pick was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PickSource {
    Manual,
    AutopickBoard,
    AutopickFallback,
}

impl PickSource {
    pub fn is_autopick(self) -> bool {
        !matches!(self, PickSource::Manual)
    }

    pub fn label(self) -> &'static str {
        match self {
            PickSource::Manual => "manual",
            PickSource::AutopickBoard => "autopick-board",
            PickSource::AutopickFallback => "autopick-fallback",
        }
    }
}

impl fmt::Display for PickSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single recorded selection. `picks[i]` always corresponds to
/// `order[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickRecord {
    pub round: u32,
    /// Global pick number copied from the order slot.
    pub pick_number: u32,
    pub team: TeamId,
    pub round_type: RoundType,
    pub player: PlayerRef,
    pub source: PickSource,
    pub timestamp: DateTime<Utc>,
}

impl PickRecord {
    /// Build the record for `slot` at the current wall-clock time.
    pub fn for_slot(slot: &PickSlot, player: PlayerRef, source: PickSource) -> Self {
        PickRecord {
            round: slot.round,
            pick_number: slot.pick_number,
            team: slot.team.clone(),
            round_type: slot.round_type,
            player,
            source,
            timestamp: Utc::now(),
        }
    }

    /// Whether this pick took a player owned by a different team.
    pub fn is_poach(&self) -> bool {
        self.player
            .owner
            .as_ref()
            .is_some_and(|owner| *owner != self.team)
    }
}

impl fmt::Display for PickRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "R{} #{} {} -> {} ({})",
            self.round, self.pick_number, self.team, self.player.id, self.source
        )
    }
}
