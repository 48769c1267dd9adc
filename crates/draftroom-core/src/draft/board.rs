// Per-team target boards consulted by autopick.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::pick::{PlayerId, TeamId};

/// Default capacity of a single board.
pub const DEFAULT_BOARD_MAX_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("board is full ({max}/{max}); remove a player first")]
    Full { max: usize },

    #[error("player {0} is not on the board")]
    NotOnBoard(PlayerId),

    #[error("new order must contain exactly the players already on the board")]
    ReorderMismatch,

    #[error("player {0} is not in the player pool")]
    UnknownPlayer(PlayerId),

    #[error("team {0} has no picks in this draft")]
    UnknownTeam(TeamId),
}

/// Counts shown alongside a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoardStats {
    pub total: usize,
    pub available: usize,
    pub drafted: usize,
    pub slots_remaining: usize,
}

/// A ranked, de-duplicated want-list. Index 0 is the top target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetBoard {
    entries: Vec<PlayerId>,
}

impl TargetBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[PlayerId] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, player: &PlayerId) -> bool {
        self.entries.contains(player)
    }

    /// Append `player` to the bottom of the board.
    ///
    /// Returns `Ok(false)` if the player is already present so that retried
    /// bulk imports stay idempotent.
    pub fn add(&mut self, player: PlayerId, max_size: usize) -> Result<bool, BoardError> {
        if self.contains(&player) {
            return Ok(false);
        }
        if self.entries.len() >= max_size {
            return Err(BoardError::Full { max: max_size });
        }
        self.entries.push(player);
        Ok(true)
    }

    /// Remove `player`, returning the 1-indexed position it held.
    pub fn remove(&mut self, player: &PlayerId) -> Result<usize, BoardError> {
        let idx = self.index_of(player)?;
        self.entries.remove(idx);
        Ok(idx + 1)
    }

    /// Move `player` to a 1-indexed `position`, clamped to the board bounds.
    /// Returns the position the player ended up at.
    pub fn move_to_position(
        &mut self,
        player: &PlayerId,
        position: usize,
    ) -> Result<usize, BoardError> {
        let idx = self.index_of(player)?;
        let entry = self.entries.remove(idx);
        let target = position.saturating_sub(1).min(self.entries.len());
        self.entries.insert(target, entry);
        Ok(target + 1)
    }

    /// Replace the ranking wholesale. `new_order` must be a permutation of
    /// the current entries.
    pub fn reorder(&mut self, new_order: Vec<PlayerId>) -> Result<(), BoardError> {
        if new_order.len() != self.entries.len() {
            return Err(BoardError::ReorderMismatch);
        }
        let current: HashSet<&PlayerId> = self.entries.iter().collect();
        let proposed: HashSet<&PlayerId> = new_order.iter().collect();
        if current != proposed || proposed.len() != new_order.len() {
            return Err(BoardError::ReorderMismatch);
        }
        self.entries = new_order;
        Ok(())
    }

    /// Empty the board, returning how many players were removed.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Top `limit` entries nobody has drafted yet, in rank order.
    pub fn available<'a>(&'a self, drafted: &HashSet<PlayerId>, limit: usize) -> Vec<&'a PlayerId> {
        self.entries
            .iter()
            .filter(|p| !drafted.contains(*p))
            .take(limit)
            .collect()
    }

    pub fn stats(&self, drafted: &HashSet<PlayerId>, max_size: usize) -> BoardStats {
        let total = self.entries.len();
        let drafted_count = self.entries.iter().filter(|p| drafted.contains(*p)).count();
        BoardStats {
            total,
            available: total - drafted_count,
            drafted: drafted_count,
            slots_remaining: max_size.saturating_sub(total),
        }
    }

    fn index_of(&self, player: &PlayerId) -> Result<usize, BoardError> {
        self.entries
            .iter()
            .position(|p| p == player)
            .ok_or_else(|| BoardError::NotOnBoard(player.clone()))
    }
}

/// All boards for a session, keyed by team. Teams without a board read as
/// empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardSet {
    boards: BTreeMap<TeamId, TargetBoard>,
}

impl BoardSet {
    pub fn get(&self, team: &TeamId) -> Option<&TargetBoard> {
        self.boards.get(team)
    }

    pub fn get_or_create(&mut self, team: &TeamId) -> &mut TargetBoard {
        self.boards.entry(team.clone()).or_default()
    }

    pub fn entries(&self, team: &TeamId) -> &[PlayerId] {
        self.boards.get(team).map(|b| b.entries()).unwrap_or(&[])
    }

    pub fn teams(&self) -> impl Iterator<Item = &TeamId> {
        self.boards.keys()
    }
}
