// Pick validation: status, clock, uniqueness and round-type ownership rules.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::order::{PickSlot, RoundType};
use super::pick::{PlayerId, PlayerRef, TeamId};
use super::state::{DraftSession, DraftStatus};

/// Routine rejections. Returned as values; the session is never changed by a
/// rejected submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Protected round and the player belongs to a team other than the one
    /// on the clock.
    #[error("{player} is owned by {owner} and this is a protected round")]
    OwnedByOtherTeam { player: PlayerId, owner: TeamId },

    #[error("{player} was already drafted by {drafted_by}")]
    DuplicatePlayer { player: PlayerId, drafted_by: TeamId },

    #[error("{team} is not on the clock ({on_clock} is)")]
    NotOnClock { team: TeamId, on_clock: TeamId },

    #[error("the draft is not running")]
    DraftNotRunning,

    #[error("there are no picks to undo")]
    NothingToUndo,

    #[error("the draft is not paused")]
    NotPaused,

    /// The slot a timer or commissioner targeted is no longer on the clock.
    #[error("pick #{pick_number} is no longer on the clock")]
    SlotAlreadyFilled { pick_number: u32 },

    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),
}

/// Who is submitting a pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submitter {
    /// A team acting for itself. Must be on the clock.
    Manual(TeamId),
    /// The engine acting on behalf of the current slot.
    Autopick,
}

/// Non-fatal note attached to an accepted pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    /// Unprotected-round selection of a player another team owned.
    Poach { owner: TeamId },
}

/// An accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub advisory: Option<Advisory>,
}

/// Validate `player` for the session's current slot.
pub fn validate(
    session: &DraftSession,
    submitter: &Submitter,
    player: &PlayerRef,
) -> Result<Verdict, ValidationError> {
    if session.status() != DraftStatus::Running {
        return Err(ValidationError::DraftNotRunning);
    }
    let slot = session
        .current_slot()
        .ok_or(ValidationError::DraftNotRunning)?;

    if let Submitter::Manual(team) = submitter {
        if *team != slot.team {
            return Err(ValidationError::NotOnClock {
                team: team.clone(),
                on_clock: slot.team.clone(),
            });
        }
    }

    let drafted = session.drafted_index();
    check_candidate(slot, player, &drafted)
}

/// Slot-level rules shared by manual validation and the autopick walk:
/// global uniqueness, then round-type ownership.
pub fn check_candidate(
    slot: &PickSlot,
    player: &PlayerRef,
    drafted: &HashMap<PlayerId, TeamId>,
) -> Result<Verdict, ValidationError> {
    if let Some(team) = drafted.get(&player.id) {
        return Err(ValidationError::DuplicatePlayer {
            player: player.id.clone(),
            drafted_by: team.clone(),
        });
    }

    match (&player.owner, slot.round_type) {
        (None, _) => Ok(Verdict { advisory: None }),
        (Some(owner), _) if *owner == slot.team => Ok(Verdict { advisory: None }),
        (Some(owner), RoundType::Protected) => Err(ValidationError::OwnedByOtherTeam {
            player: player.id.clone(),
            owner: owner.clone(),
        }),
        (Some(owner), RoundType::Unprotected) => Ok(Verdict {
            advisory: Some(Advisory::Poach {
                owner: owner.clone(),
            }),
        }),
    }
}
