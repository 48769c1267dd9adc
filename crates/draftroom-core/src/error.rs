// Error surface of the draft engine.

use thiserror::Error;

use crate::draft::board::BoardError;
use crate::draft::order::OrderError;
use crate::draft::pick::TeamId;
use crate::draft::validator::ValidationError;

/// The session cannot continue without manual intervention.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Neither the team's board nor the fallback ranking held a legal player.
    #[error("no legal player available for pick #{pick_number} ({team})")]
    NoLegalPick { pick_number: u32, team: TeamId },
}

#[derive(Debug, Error)]
pub enum DraftError {
    /// Routine rejection; nothing changed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Board(#[from] BoardError),

    #[error(transparent)]
    Order(#[from] OrderError),

    /// Fatal to the session.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The durable write failed; in-memory state was not advanced.
    #[error("persistence failed: {0:#}")]
    Persistence(anyhow::Error),
}

impl DraftError {
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            DraftError::Validation(e) => Some(e),
            _ => None,
        }
    }

    /// Validation and board errors leave the session untouched and can be
    /// resubmitted.
    pub fn is_routine(&self) -> bool {
        matches!(self, DraftError::Validation(_) | DraftError::Board(_))
    }
}
