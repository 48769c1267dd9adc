// Draft events and fire-and-forget delivery to collaborators.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::draft::order::PickSlot;
use crate::draft::pick::{PickRecord, PlayerId, TeamId};
use crate::draft::validator::Advisory;

/// Channel capacity for the event broadcast.
const CHANNEL_CAPACITY: usize = 256;

/// Everything collaborators are told about a session. Serialized as
/// `{"type": ..., "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum DraftEvent {
    Started {
        session_id: String,
        total_picks: usize,
    },
    OnTheClock {
        slot: PickSlot,
        deadline: DateTime<Utc>,
        /// Top undrafted entries of the team's board.
        board_preview: Vec<PlayerId>,
    },
    TimeWarning {
        pick_number: u32,
        team: TeamId,
        remaining_secs: u64,
    },
    PickMade {
        pick: PickRecord,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        advisory: Option<Advisory>,
    },
    PickUndone {
        pick: PickRecord,
    },
    Paused {
        pick_number: Option<u32>,
    },
    Resumed {
        pick_number: Option<u32>,
    },
    Completed {
        session_id: String,
        total_picks: usize,
    },
    Halted {
        reason: String,
    },
    /// Expiry fired but the autopick could not be stored. The session did
    /// not advance and no clock is running.
    AutopickFailed {
        pick_number: u32,
        team: TeamId,
        reason: String,
    },
    ForkliftChanged {
        team: TeamId,
        enabled: bool,
        /// Clock length the team now drafts on.
        timer_secs: u64,
    },
}

impl DraftEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DraftEvent::Started { .. } => "Started",
            DraftEvent::OnTheClock { .. } => "OnTheClock",
            DraftEvent::TimeWarning { .. } => "TimeWarning",
            DraftEvent::PickMade { .. } => "PickMade",
            DraftEvent::PickUndone { .. } => "PickUndone",
            DraftEvent::Paused { .. } => "Paused",
            DraftEvent::Resumed { .. } => "Resumed",
            DraftEvent::Completed { .. } => "Completed",
            DraftEvent::Halted { .. } => "Halted",
            DraftEvent::AutopickFailed { .. } => "AutopickFailed",
            DraftEvent::ForkliftChanged { .. } => "ForkliftChanged",
        }
    }
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// Broadcast hub. Publishing never fails and never waits on subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DraftEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: DraftEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DraftEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// A delivery target for draft events (chat notifier, board renderer, ...).
#[async_trait]
pub trait EventSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, event: &DraftEvent) -> anyhow::Result<()>;
}

/// Forward every event from `receiver` to each sink in order. Delivery
/// failures are logged and dropped; the loop ends when the bus closes.
pub fn spawn_dispatcher(
    mut receiver: broadcast::Receiver<DraftEvent>,
    sinks: Vec<Box<dyn EventSink>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    for sink in &sinks {
                        if let Err(e) = sink.deliver(&event).await {
                            warn!(
                                sink = sink.name(),
                                event_type = event.event_type(),
                                "Event delivery failed: {:#}",
                                e
                            );
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event dispatcher lagged; {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("Event dispatcher stopped");
    })
}

/// Writes a one-line summary of each event to the tracing log.
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, event: &DraftEvent) -> anyhow::Result<()> {
        match event {
            DraftEvent::PickMade { pick, advisory } => match advisory {
                Some(Advisory::Poach { owner }) => {
                    info!("Pick made: {} (poached from {})", pick, owner)
                }
                None => info!("Pick made: {}", pick),
            },
            DraftEvent::PickUndone { pick } => info!("Pick undone: {}", pick),
            DraftEvent::Halted { reason } => warn!("Draft halted: {}", reason),
            DraftEvent::AutopickFailed {
                pick_number,
                team,
                reason,
            } => error!(
                "Autopick for pick #{} ({}) failed: {}",
                pick_number, team, reason
            ),
            other => info!("Draft event: {}", other.event_type()),
        }
        Ok(())
    }
}

/// Appends each event as one JSON line to a file.
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EventSink for JsonLinesSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn deliver(&self, event: &DraftEvent) -> anyhow::Result<()> {
        use anyhow::Context;

        let mut line = serde_json::to_string(event).context("failed to serialize event")?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        Ok(())
    }
}
