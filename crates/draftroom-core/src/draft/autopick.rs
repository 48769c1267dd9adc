// Autopick: the on-clock team's target board first, then the global ranking.

use tracing::debug;

use super::pick::{PickSource, PlayerRef};
use super::state::DraftSession;
use super::validator::{check_candidate, ValidationError};
use crate::error::{ConfigurationError, DraftError};
use crate::players::PlayerDirectory;

/// The player autopick settled on and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutopickChoice {
    pub player: PlayerRef,
    pub source: PickSource,
}

/// Choose a legal player for the session's current slot.
///
/// Deterministic for a given session and directory. Board entries are tried
/// in rank order; if none qualifies, the directory's ranking is walked. When
/// the slot carries one of `restricted_tags`, the ranking walk only
/// considers players with every such tag, and in the first round carrying
/// that tag it follows the pool's ranking within the tag. Running out of
/// candidates is a configuration error, never an invented pick.
pub fn resolve(
    session: &DraftSession,
    players: &dyn PlayerDirectory,
    restricted_tags: &[String],
) -> Result<AutopickChoice, DraftError> {
    let slot = session
        .current_slot()
        .ok_or(ValidationError::DraftNotRunning)?;
    let drafted = session.drafted_index();

    for id in session.boards().entries(&slot.team) {
        let Some(candidate) = players.resolve(id) else {
            debug!("board entry {} for {} is not in the pool", id, slot.team);
            continue;
        };
        match check_candidate(slot, &candidate, &drafted) {
            Ok(_) => {
                return Ok(AutopickChoice {
                    player: candidate,
                    source: PickSource::AutopickBoard,
                })
            }
            Err(reason) => debug!("skipping board entry {}: {}", id, reason),
        }
    }

    let required: Vec<&String> = restricted_tags
        .iter()
        .filter(|tag| slot.has_tag(tag))
        .collect();

    let ranking = match required.first() {
        Some(tag) if first_round_with_tag(session, tag) == Some(slot.round) => {
            debug!("pick #{} walks the {} ranking", slot.pick_number, tag);
            players.ranked_ids_for_tag(tag)
        }
        _ => players.ranked_ids(),
    };

    for id in ranking {
        if drafted.contains_key(&id) {
            continue;
        }
        if !required.iter().all(|tag| players.has_tag(&id, tag)) {
            continue;
        }
        let Some(candidate) = players.resolve(&id) else {
            continue;
        };
        if check_candidate(slot, &candidate, &drafted).is_ok() {
            return Ok(AutopickChoice {
                player: candidate,
                source: PickSource::AutopickFallback,
            });
        }
    }

    Err(ConfigurationError::NoLegalPick {
        pick_number: slot.pick_number,
        team: slot.team.clone(),
    }
    .into())
}

fn first_round_with_tag(session: &DraftSession, tag: &str) -> Option<u32> {
    session
        .order()
        .slots()
        .iter()
        .filter(|s| s.has_tag(tag))
        .map(|s| s.round)
        .min()
}
