// Draft session: position pointer, pick history, status and boards.
//
// Every transition here is pure and synchronous. The engine applies them to
// a copy, persists the copy and only then swaps it in, so a failed write
// never leaves a half-applied change behind.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::board::BoardSet;
use super::order::{DraftOrder, PickSlot};
use super::pick::{PickRecord, PickSource, PlayerId, PlayerRef, TeamId};
use super::validator::{self, Advisory, Submitter, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DraftStatus {
    NotStarted,
    Running,
    Paused,
    Completed,
    /// No legal pick could be produced. Requires manual intervention.
    Halted,
}

impl DraftStatus {
    pub fn label(self) -> &'static str {
        match self {
            DraftStatus::NotStarted => "not_started",
            DraftStatus::Running => "running",
            DraftStatus::Paused => "paused",
            DraftStatus::Completed => "completed",
            DraftStatus::Halted => "halted",
        }
    }
}

impl fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of a successful `record_pick`.
#[derive(Debug, Clone, PartialEq)]
pub struct PickOutcome {
    pub record: PickRecord,
    pub advisory: Option<Advisory>,
    /// The pick filled the last slot.
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoundProgress {
    pub total: usize,
    pub made: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub total: usize,
    pub made: usize,
    pub remaining: usize,
    /// Percent complete, rounded to one decimal.
    pub percent: f64,
    /// Round of the slot on the clock, `None` once every slot is filled.
    pub current_round: Option<u32>,
    pub rounds: BTreeMap<u32, RoundProgress>,
}

/// The durable record of one draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredSession")]
pub struct DraftSession {
    id: String,
    order: DraftOrder,
    /// Index into `order` of the slot on the clock. Always `picks.len()`.
    current_index: usize,
    picks: Vec<PickRecord>,
    status: DraftStatus,
    #[serde(default)]
    boards: BoardSet,
    /// Absent teams drafting on the short clock.
    #[serde(default)]
    forklift: BTreeSet<TeamId>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    halt_reason: Option<String>,
}

/// A stored snapshot whose pick history disagrees with its order or pointer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("session {id} is inconsistent: pointer at {current_index}, {picks} picks, {slots} slots")]
pub struct InconsistentSession {
    pub id: String,
    pub current_index: usize,
    pub picks: usize,
    pub slots: usize,
}

/// Wire shape of `DraftSession`, checked before it becomes a live session.
#[derive(Deserialize)]
struct StoredSession {
    id: String,
    order: DraftOrder,
    current_index: usize,
    picks: Vec<PickRecord>,
    status: DraftStatus,
    #[serde(default)]
    boards: BoardSet,
    #[serde(default)]
    forklift: BTreeSet<TeamId>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    halt_reason: Option<String>,
}

impl TryFrom<StoredSession> for DraftSession {
    type Error = InconsistentSession;

    fn try_from(stored: StoredSession) -> Result<Self, Self::Error> {
        let session = DraftSession {
            id: stored.id,
            order: stored.order,
            current_index: stored.current_index,
            picks: stored.picks,
            status: stored.status,
            boards: stored.boards,
            forklift: stored.forklift,
            started_at: stored.started_at,
            completed_at: stored.completed_at,
            halt_reason: stored.halt_reason,
        };
        if session.is_consistent() {
            Ok(session)
        } else {
            Err(InconsistentSession {
                id: session.id,
                current_index: session.current_index,
                picks: session.picks.len(),
                slots: session.order.len(),
            })
        }
    }
}

impl DraftSession {
    pub fn new(id: impl Into<String>, order: DraftOrder) -> Self {
        DraftSession {
            id: id.into(),
            order,
            current_index: 0,
            picks: Vec::new(),
            status: DraftStatus::NotStarted,
            boards: BoardSet::default(),
            forklift: BTreeSet::new(),
            started_at: None,
            completed_at: None,
            halt_reason: None,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn order(&self) -> &DraftOrder {
        &self.order
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn picks(&self) -> &[PickRecord] {
        &self.picks
    }

    pub fn status(&self) -> DraftStatus {
        self.status
    }

    pub fn boards(&self) -> &BoardSet {
        &self.boards
    }

    pub fn boards_mut(&mut self) -> &mut BoardSet {
        &mut self.boards
    }

    pub fn forklift_teams(&self) -> &BTreeSet<TeamId> {
        &self.forklift
    }

    pub fn is_forklift(&self, team: &TeamId) -> bool {
        self.forklift.contains(team)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn halt_reason(&self) -> Option<&str> {
        self.halt_reason.as_deref()
    }

    /// The slot on the clock, or `None` once every slot has a pick.
    pub fn current_slot(&self) -> Option<&PickSlot> {
        self.order.slot(self.current_index)
    }

    pub fn on_clock(&self) -> Option<&TeamId> {
        self.current_slot().map(|s| &s.team)
    }

    pub fn on_deck(&self) -> Option<&PickSlot> {
        self.order.on_deck(self.current_index)
    }

    pub fn in_the_hole(&self) -> Option<&PickSlot> {
        self.order.in_the_hole(self.current_index)
    }

    pub fn last_pick(&self) -> Option<&PickRecord> {
        self.picks.last()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Player id -> team that drafted it.
    pub fn drafted_index(&self) -> HashMap<PlayerId, TeamId> {
        self.picks
            .iter()
            .map(|p| (p.player.id.clone(), p.team.clone()))
            .collect()
    }

    pub fn drafted_ids(&self) -> HashSet<PlayerId> {
        self.picks.iter().map(|p| p.player.id.clone()).collect()
    }

    pub fn drafted_by(&self, player: &PlayerId) -> Option<&TeamId> {
        self.picks
            .iter()
            .find(|p| p.player.id == *player)
            .map(|p| &p.team)
    }

    pub fn picks_by_team(&self, team: &TeamId) -> Vec<&PickRecord> {
        self.picks.iter().filter(|p| p.team == *team).collect()
    }

    pub fn picks_by_round(&self, round: u32) -> Vec<&PickRecord> {
        self.picks.iter().filter(|p| p.round == round).collect()
    }

    pub fn progress(&self) -> Progress {
        let total = self.order.len();
        let made = self.picks.len();

        let mut rounds: BTreeMap<u32, RoundProgress> = BTreeMap::new();
        for slot in self.order.slots() {
            rounds
                .entry(slot.round)
                .or_insert(RoundProgress { total: 0, made: 0 })
                .total += 1;
        }
        for pick in &self.picks {
            if let Some(r) = rounds.get_mut(&pick.round) {
                r.made += 1;
            }
        }

        let percent = if total == 0 {
            0.0
        } else {
            (made as f64 / total as f64 * 1000.0).round() / 10.0
        };

        Progress {
            total,
            made,
            remaining: total - made,
            percent,
            current_round: self.current_slot().map(|s| s.round),
            rounds,
        }
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// NotStarted -> Running. Returns `Ok(false)` when the draft is already
    /// running or paused.
    pub fn start(&mut self) -> Result<bool, ValidationError> {
        match self.status {
            DraftStatus::NotStarted => {
                self.status = DraftStatus::Running;
                self.started_at = Some(Utc::now());
                info!("Draft {} started ({} picks)", self.id, self.order.len());
                Ok(true)
            }
            DraftStatus::Running | DraftStatus::Paused => Ok(false),
            DraftStatus::Completed | DraftStatus::Halted => Err(ValidationError::DraftNotRunning),
        }
    }

    /// Validate and append a pick for the current slot, advancing the
    /// pointer and completing the draft when the order is exhausted.
    pub fn record_pick(
        &mut self,
        submitter: &Submitter,
        player: PlayerRef,
        source: PickSource,
    ) -> Result<PickOutcome, ValidationError> {
        let verdict = validator::validate(self, submitter, &player)?;
        let slot = self
            .current_slot()
            .ok_or(ValidationError::DraftNotRunning)?;

        let record = PickRecord::for_slot(slot, player, source);
        self.picks.push(record.clone());
        self.current_index += 1;

        let completed = self.current_index == self.order.len();
        if completed {
            self.status = DraftStatus::Completed;
            self.completed_at = Some(Utc::now());
            info!("Draft {} completed after {} picks", self.id, self.picks.len());
        }

        Ok(PickOutcome {
            record,
            advisory: verdict.advisory,
            completed,
        })
    }

    /// Pop the most recent pick. A completed draft returns to Running; a
    /// paused draft stays paused.
    pub fn undo(&mut self) -> Result<PickRecord, ValidationError> {
        match self.status {
            DraftStatus::Running | DraftStatus::Paused | DraftStatus::Completed => {}
            DraftStatus::NotStarted | DraftStatus::Halted => {
                return Err(ValidationError::DraftNotRunning)
            }
        }
        let record = self.picks.pop().ok_or(ValidationError::NothingToUndo)?;
        self.current_index -= 1;
        if self.status == DraftStatus::Completed {
            self.status = DraftStatus::Running;
            self.completed_at = None;
        }
        debug!("Undid {}", record);
        Ok(record)
    }

    pub fn pause(&mut self) -> Result<(), ValidationError> {
        if self.status != DraftStatus::Running {
            return Err(ValidationError::DraftNotRunning);
        }
        self.status = DraftStatus::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), ValidationError> {
        if self.status != DraftStatus::Paused {
            return Err(ValidationError::NotPaused);
        }
        self.status = DraftStatus::Running;
        Ok(())
    }

    /// Put `team` on (or take it off) the short forklift clock. Returns
    /// `false` when the team was already in the requested mode. Allowed in
    /// any status, so an absent manager can be flagged before the start.
    pub fn set_forklift(&mut self, team: &TeamId, enabled: bool) -> bool {
        let changed = if enabled {
            self.forklift.insert(team.clone())
        } else {
            self.forklift.remove(team)
        };
        if changed {
            info!(
                "Forklift mode {} for {} in draft {}",
                if enabled { "enabled" } else { "disabled" },
                team,
                self.id
            );
        }
        changed
    }

    /// Terminal stop after a configuration failure.
    pub fn halt(&mut self, reason: impl Into<String>) {
        self.status = DraftStatus::Halted;
        self.halt_reason = Some(reason.into());
    }

    /// Pointer and history agree and every pick sits in its own team's slot.
    pub fn is_consistent(&self) -> bool {
        self.current_index == self.picks.len()
            && self.picks.len() <= self.order.len()
            && self
                .picks
                .iter()
                .zip(self.order.slots())
                .all(|(p, s)| p.team == s.team && p.pick_number == s.pick_number)
    }
}
