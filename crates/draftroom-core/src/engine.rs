// Draft engine: the single writer for one session.
//
// Every mutation takes the writer lock, applies the change to a copy of the
// session, writes the copy to SQLite and only then swaps it in, re-arms the
// clock, publishes events and refreshes the status snapshot. Readers use the
// snapshot and never take the lock.

use std::io::Write;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_FORKLIFT_TIMER_SECS, DEFAULT_PICK_TIMER_SECS, DEFAULT_WARNING_SECS};
use crate::db::Database;
use crate::draft::autopick;
use crate::draft::board::{BoardError, BoardStats, TargetBoard, DEFAULT_BOARD_MAX_SIZE};
use crate::draft::order::{DraftOrder, PickSlot};
use crate::draft::pick::{PickRecord, PickSource, PlayerId, PlayerRef, TeamId};
use crate::draft::state::{DraftSession, DraftStatus, PickOutcome};
use crate::draft::validator::{Submitter, ValidationError};
use crate::error::{ConfigurationError, DraftError};
use crate::events::{DraftEvent, EventBus};
use crate::export::{self, ExportError};
use crate::players::PlayerDirectory;
use crate::timer::{ClockEvent, ClockSignal, PickClock};

/// How many undrafted board entries accompany an `OnTheClock` event.
const BOARD_PREVIEW_LEN: usize = 5;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub pick_timer: Duration,
    /// Remaining time at which `TimeWarning` is sent.
    pub warning: Duration,
    /// Clock for teams in forklift mode.
    pub forklift_timer: Duration,
    pub board_max_size: usize,
    pub restricted_tags: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            pick_timer: Duration::from_secs(DEFAULT_PICK_TIMER_SECS),
            warning: Duration::from_secs(DEFAULT_WARNING_SECS),
            forklift_timer: Duration::from_secs(DEFAULT_FORKLIFT_TIMER_SECS),
            board_max_size: DEFAULT_BOARD_MAX_SIZE,
            restricted_tags: Vec::new(),
        }
    }
}

/// Last committed state, readable without the writer lock.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub session: Arc<DraftSession>,
    /// Wall-clock deadline of the live pick clock.
    pub deadline: Option<DateTime<Utc>>,
    /// Order index the live pick clock belongs to.
    pub clock_slot: Option<usize>,
}

impl StatusSnapshot {
    pub fn status(&self) -> DraftStatus {
        self.session.status()
    }

    pub fn current_index(&self) -> usize {
        self.session.current_index()
    }

    pub fn on_clock(&self) -> Option<&PickSlot> {
        self.session.current_slot()
    }

    pub fn picks_made(&self) -> usize {
        self.session.picks().len()
    }

    pub fn total_picks(&self) -> usize {
        self.session.order().len()
    }

    pub fn last_pick(&self) -> Option<&PickRecord> {
        self.session.last_pick()
    }
}

/// One stored session as listed by `DraftEngine::sessions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: String,
    /// Rows in the session's pick mirror.
    pub picks: usize,
    /// This engine's session.
    pub current: bool,
}

struct Writer {
    session: DraftSession,
    clock: PickClock,
}

struct Inner {
    writer: Mutex<Writer>,
    snapshot: watch::Sender<StatusSnapshot>,
    events: EventBus,
    db: Arc<Database>,
    players: Arc<dyn PlayerDirectory>,
    settings: EngineSettings,
}

/// Handle to a running draft session. Cheap to clone.
#[derive(Clone)]
pub struct DraftEngine {
    inner: Arc<Inner>,
}

impl DraftEngine {
    /// Load `session_id` from the database, or create it from `order` when it
    /// does not exist yet. A stored session keeps its own order. If the
    /// stored session was running, its clock restarts with a full deadline.
    ///
    /// Spawns the clock worker, so it must run inside a Tokio runtime.
    pub async fn open(
        settings: EngineSettings,
        db: Arc<Database>,
        players: Arc<dyn PlayerDirectory>,
        session_id: &str,
        order: DraftOrder,
    ) -> Result<Self, DraftError> {
        let session = match db.load_session(session_id).map_err(DraftError::Persistence)? {
            Some(stored) => {
                if *stored.order() != order {
                    warn!(
                        "Stored session {} has a different draft order; keeping the stored one",
                        session_id
                    );
                }
                info!(
                    "Resuming session {} ({}, {}/{} picks)",
                    session_id,
                    stored.status(),
                    stored.picks().len(),
                    stored.order().len()
                );
                stored
            }
            None => {
                let fresh = DraftSession::new(session_id, order);
                db.save_session(&fresh).map_err(DraftError::Persistence)?;
                info!("Created session {} ({} picks)", session_id, fresh.order().len());
                fresh
            }
        };
        db.set_current_session_id(session_id)
            .map_err(DraftError::Persistence)?;

        let (clock_tx, clock_rx) = mpsc::unbounded_channel();
        let (snapshot, _) = watch::channel(StatusSnapshot {
            session: Arc::new(session.clone()),
            deadline: None,
            clock_slot: None,
        });

        let inner = Arc::new(Inner {
            writer: Mutex::new(Writer {
                session,
                clock: PickClock::new(clock_tx),
            }),
            snapshot,
            events: EventBus::new(),
            db,
            players,
            settings,
        });
        spawn_clock_worker(Arc::downgrade(&inner), clock_rx);

        {
            let mut w = inner.writer.lock().await;
            if w.session.status() == DraftStatus::Running {
                inner.arm_current(&mut w);
            }
            inner.publish_snapshot(&w);
        }

        Ok(DraftEngine { inner })
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn status(&self) -> StatusSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DraftEvent> {
        self.inner.events.subscribe()
    }

    pub fn session_id(&self) -> String {
        self.status().session.id().to_string()
    }

    /// Every session stored in the database, most recently updated first.
    pub fn sessions(&self) -> Result<Vec<SessionSummary>, DraftError> {
        let db = &self.inner.db;
        let own = self.session_id();
        db.list_sessions()
            .map_err(DraftError::Persistence)?
            .into_iter()
            .map(|id| {
                let picks = db.load_picks(&id).map_err(DraftError::Persistence)?.len();
                Ok(SessionSummary {
                    current: id == own,
                    id,
                    picks,
                })
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the draft. A no-op on a draft that is already running or
    /// paused.
    pub async fn start(&self) -> Result<StatusSnapshot, DraftError> {
        let inner = &self.inner;
        let mut w = inner.writer.lock().await;

        let mut next = w.session.clone();
        if !next.start()? {
            debug!("start() on live session {} is a no-op", next.id());
            if w.session.status() == DraftStatus::Running && !w.clock.is_armed() {
                inner.arm_current(&mut w);
                inner.publish_snapshot(&w);
            }
            return Ok(self.status());
        }

        inner.commit(&mut w, next)?;
        inner.events.publish(DraftEvent::Started {
            session_id: w.session.id().to_string(),
            total_picks: w.session.order().len(),
        });
        inner.arm_current(&mut w);
        inner.publish_snapshot(&w);
        Ok(self.status())
    }

    /// Manual pick by `team` for the slot on the clock.
    pub async fn pick(&self, team: &TeamId, player: &PlayerId) -> Result<PickOutcome, DraftError> {
        let inner = &self.inner;
        let mut w = inner.writer.lock().await;

        if w.session.status() != DraftStatus::Running {
            return Err(ValidationError::DraftNotRunning.into());
        }
        let player_ref = inner
            .players
            .resolve(player)
            .ok_or_else(|| ValidationError::UnknownPlayer(player.clone()))?;

        inner.submit(
            &mut w,
            &Submitter::Manual(team.clone()),
            player_ref,
            PickSource::Manual,
        )
    }

    /// Commissioner override: run autopick now for `pick_number`, which must
    /// be the slot on the clock.
    pub async fn autopick(&self, pick_number: u32) -> Result<PickOutcome, DraftError> {
        let inner = &self.inner;
        let mut w = inner.writer.lock().await;

        if w.session.status() != DraftStatus::Running {
            return Err(ValidationError::DraftNotRunning.into());
        }
        match w.session.order().position_of_pick(pick_number) {
            Some(index) => inner.autopick_locked(&mut w, index),
            None => Err(ValidationError::SlotAlreadyFilled { pick_number }.into()),
        }
    }

    /// Remove the most recent pick and put its slot back on the clock.
    pub async fn undo(&self) -> Result<PickRecord, DraftError> {
        let inner = &self.inner;
        let mut w = inner.writer.lock().await;

        let mut next = w.session.clone();
        let record = next.undo()?;
        inner.commit(&mut w, next)?;

        info!("Undid {}", record);
        inner.events.publish(DraftEvent::PickUndone {
            pick: record.clone(),
        });
        inner.arm_current(&mut w);
        inner.publish_snapshot(&w);
        Ok(record)
    }

    pub async fn pause(&self) -> Result<(), DraftError> {
        let inner = &self.inner;
        let mut w = inner.writer.lock().await;

        let mut next = w.session.clone();
        next.pause()?;
        inner.commit(&mut w, next)?;

        w.clock.cancel();
        let pick_number = w.session.current_slot().map(|s| s.pick_number);
        info!("Draft paused at pick {:?}", pick_number);
        inner.events.publish(DraftEvent::Paused { pick_number });
        inner.publish_snapshot(&w);
        Ok(())
    }

    /// Resume a paused draft with a fresh deadline for the current slot.
    pub async fn resume(&self) -> Result<(), DraftError> {
        let inner = &self.inner;
        let mut w = inner.writer.lock().await;

        let mut next = w.session.clone();
        next.resume()?;
        inner.commit(&mut w, next)?;

        let pick_number = w.session.current_slot().map(|s| s.pick_number);
        info!("Draft resumed at pick {:?}", pick_number);
        inner.events.publish(DraftEvent::Resumed { pick_number });
        inner.arm_current(&mut w);
        inner.publish_snapshot(&w);
        Ok(())
    }

    /// Put `team` in forklift mode (short clock, autopick from its board) or
    /// take it out. `Ok(false)` when the team was already in that mode. A
    /// team on the clock right now gets a fresh clock of the new length.
    pub async fn set_forklift(&self, team: &TeamId, enabled: bool) -> Result<bool, DraftError> {
        let inner = &self.inner;
        let mut w = inner.writer.lock().await;
        ensure_team(&w.session, team)?;

        let mut next = w.session.clone();
        if !next.set_forklift(team, enabled) {
            return Ok(false);
        }
        inner.commit(&mut w, next)?;

        inner.events.publish(DraftEvent::ForkliftChanged {
            team: team.clone(),
            enabled,
            timer_secs: inner.timer_for(&w.session, team).as_secs(),
        });
        if w.session.on_clock() == Some(team) {
            inner.arm_current(&mut w);
        }
        inner.publish_snapshot(&w);
        Ok(true)
    }

    /// Stop the pick clock. Every acknowledged mutation is already on disk.
    pub async fn shutdown(&self) {
        let mut w = self.inner.writer.lock().await;
        w.clock.cancel();
        info!("Draft engine for session {} shut down", w.session.id());
        self.inner.publish_snapshot(&w);
    }

    // ------------------------------------------------------------------
    // Target boards
    // ------------------------------------------------------------------

    pub fn board(&self, team: &TeamId) -> Result<Vec<PlayerId>, DraftError> {
        let snapshot = self.status();
        ensure_team(&snapshot.session, team)?;
        Ok(snapshot.session.boards().entries(team).to_vec())
    }

    pub fn board_stats(&self, team: &TeamId) -> Result<BoardStats, DraftError> {
        let snapshot = self.status();
        ensure_team(&snapshot.session, team)?;
        let drafted = snapshot.session.drafted_ids();
        let max = self.inner.settings.board_max_size;
        Ok(match snapshot.session.boards().get(team) {
            Some(board) => board.stats(&drafted, max),
            None => TargetBoard::new().stats(&drafted, max),
        })
    }

    /// Top `limit` board entries nobody has drafted yet.
    pub fn board_available(&self, team: &TeamId, limit: usize) -> Result<Vec<PlayerId>, DraftError> {
        let snapshot = self.status();
        ensure_team(&snapshot.session, team)?;
        let drafted = snapshot.session.drafted_ids();
        Ok(snapshot
            .session
            .boards()
            .get(team)
            .map(|b| b.available(&drafted, limit).into_iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Append to a team's board. `Ok(false)` when already present.
    pub async fn board_add(&self, team: &TeamId, player: &PlayerId) -> Result<bool, DraftError> {
        if self.inner.players.lookup(player).is_none() {
            return Err(BoardError::UnknownPlayer(player.clone()).into());
        }
        let player = player.clone();
        self.edit_board(team, move |board, max| board.add(player, max))
            .await
    }

    pub async fn board_remove(&self, team: &TeamId, player: &PlayerId) -> Result<usize, DraftError> {
        self.edit_board(team, |board, _| board.remove(player)).await
    }

    pub async fn board_move(
        &self,
        team: &TeamId,
        player: &PlayerId,
        position: usize,
    ) -> Result<usize, DraftError> {
        self.edit_board(team, |board, _| board.move_to_position(player, position))
            .await
    }

    pub async fn board_reorder(&self, team: &TeamId, order: Vec<PlayerId>) -> Result<(), DraftError> {
        self.edit_board(team, move |board, _| board.reorder(order))
            .await
    }

    pub async fn board_clear(&self, team: &TeamId) -> Result<usize, DraftError> {
        self.edit_board(team, |board, _| Ok(board.clear())).await
    }

    async fn edit_board<T, F>(&self, team: &TeamId, edit: F) -> Result<T, DraftError>
    where
        F: FnOnce(&mut TargetBoard, usize) -> Result<T, BoardError>,
    {
        let inner = &self.inner;
        let mut w = inner.writer.lock().await;
        ensure_team(&w.session, team)?;

        let mut next = w.session.clone();
        let out = edit(
            next.boards_mut().get_or_create(team),
            inner.settings.board_max_size,
        )?;
        inner.commit(&mut w, next)?;
        inner.publish_snapshot(&w);
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    pub fn export_json<W: Write>(&self, out: W) -> Result<(), ExportError> {
        export::write_json(&self.status().session, out)
    }

    pub fn export_csv<W: Write>(&self, out: W) -> Result<(), ExportError> {
        export::write_csv(&self.status().session, out)
    }
}

fn ensure_team(session: &DraftSession, team: &TeamId) -> Result<(), BoardError> {
    if session.order().contains_team(team) {
        Ok(())
    } else {
        Err(BoardError::UnknownTeam(team.clone()))
    }
}

impl Inner {
    /// Persist `next` and make it the live session. On failure the live
    /// session is left untouched.
    fn commit(&self, w: &mut Writer, next: DraftSession) -> Result<(), DraftError> {
        if let Err(e) = self.db.save_session(&next) {
            error!("Failed to persist session {}: {:#}", next.id(), e);
            return Err(DraftError::Persistence(e));
        }
        w.session = next;
        Ok(())
    }

    fn publish_snapshot(&self, w: &Writer) {
        self.snapshot.send_replace(StatusSnapshot {
            session: Arc::new(w.session.clone()),
            deadline: w.clock.deadline(),
            clock_slot: w.clock.armed_slot(),
        });
    }

    fn timer_for(&self, session: &DraftSession, team: &TeamId) -> Duration {
        if session.is_forklift(team) {
            self.settings.forklift_timer
        } else {
            self.settings.pick_timer
        }
    }

    /// Arm a fresh clock for the current slot when the draft is running;
    /// otherwise make sure no clock is live.
    fn arm_current(&self, w: &mut Writer) {
        if w.session.status() != DraftStatus::Running {
            w.clock.cancel();
            return;
        }
        let Some(slot) = w.session.current_slot().cloned() else {
            w.clock.cancel();
            return;
        };

        let deadline = w.clock.arm(
            w.session.current_index(),
            self.timer_for(&w.session, &slot.team),
            self.settings.warning,
        );
        let drafted = w.session.drafted_ids();
        let board_preview = w
            .session
            .boards()
            .get(&slot.team)
            .map(|b| {
                b.available(&drafted, BOARD_PREVIEW_LEN)
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        info!(
            "{} on the clock for pick #{} (round {}, {}{})",
            slot.team,
            slot.pick_number,
            slot.round,
            slot.round_type,
            if w.session.is_forklift(&slot.team) {
                ", forklift"
            } else {
                ""
            }
        );
        self.events.publish(DraftEvent::OnTheClock {
            slot,
            deadline,
            board_preview,
        });
    }

    /// Validate, persist and announce one pick, then move the clock on.
    fn submit(
        &self,
        w: &mut Writer,
        submitter: &Submitter,
        player: PlayerRef,
        source: PickSource,
    ) -> Result<PickOutcome, DraftError> {
        let mut next = w.session.clone();
        let outcome = match next.record_pick(submitter, player, source) {
            Ok(outcome) => outcome,
            Err(reason) => {
                debug!("Pick rejected: {}", reason);
                return Err(reason.into());
            }
        };
        self.commit(w, next)?;

        info!("Pick recorded: {}", outcome.record);
        self.events.publish(DraftEvent::PickMade {
            pick: outcome.record.clone(),
            advisory: outcome.advisory.clone(),
        });
        if outcome.completed {
            w.clock.cancel();
            self.events.publish(DraftEvent::Completed {
                session_id: w.session.id().to_string(),
                total_picks: w.session.picks().len(),
            });
        } else {
            self.arm_current(w);
        }
        self.publish_snapshot(w);
        Ok(outcome)
    }

    /// Autopick for order index `slot_index`, which must be on the clock.
    /// Running out of legal players halts the session.
    fn autopick_locked(&self, w: &mut Writer, slot_index: usize) -> Result<PickOutcome, DraftError> {
        if w.session.status() != DraftStatus::Running {
            return Err(ValidationError::DraftNotRunning.into());
        }
        if w.session.current_index() != slot_index {
            let pick_number = w
                .session
                .order()
                .slot(slot_index)
                .map(|s| s.pick_number)
                .unwrap_or_default();
            return Err(ValidationError::SlotAlreadyFilled { pick_number }.into());
        }

        let choice = match autopick::resolve(
            &w.session,
            self.players.as_ref(),
            &self.settings.restricted_tags,
        ) {
            Ok(choice) => choice,
            Err(DraftError::Configuration(cause)) => return Err(self.halt(w, cause)),
            Err(e) => return Err(e),
        };
        debug!(
            "Autopick chose {} from {}",
            choice.player.id, choice.source
        );
        self.submit(w, &Submitter::Autopick, choice.player, choice.source)
    }

    fn halt(&self, w: &mut Writer, cause: ConfigurationError) -> DraftError {
        error!("Halting session {}: {}", w.session.id(), cause);
        let mut next = w.session.clone();
        next.halt(cause.to_string());
        if let Err(e) = self.commit(w, next) {
            return e;
        }
        w.clock.cancel();
        self.events.publish(DraftEvent::Halted {
            reason: cause.to_string(),
        });
        self.publish_snapshot(w);
        DraftError::Configuration(cause)
    }

    async fn handle_clock(&self, signal: ClockSignal) {
        let mut w = self.writer.lock().await;
        if !w.clock.is_current(&signal) {
            debug!(
                slot_index = signal.slot_index,
                generation = signal.generation,
                "Ignoring stale clock signal"
            );
            return;
        }

        match signal.event {
            ClockEvent::Warning { remaining_secs } => {
                if let Some(slot) = w.session.current_slot() {
                    info!(
                        "{} has {}s left on pick #{}",
                        slot.team, remaining_secs, slot.pick_number
                    );
                    self.events.publish(DraftEvent::TimeWarning {
                        pick_number: slot.pick_number,
                        team: slot.team.clone(),
                        remaining_secs,
                    });
                }
            }
            ClockEvent::Expired => {
                info!("Pick clock expired for slot {}", signal.slot_index);
                match self.autopick_locked(&mut w, signal.slot_index) {
                    Ok(outcome) => info!("Autopicked {}", outcome.record),
                    Err(e) if e.is_routine() => warn!("Clock expiry rejected: {}", e),
                    // Already halted and announced.
                    Err(DraftError::Configuration(_)) => {}
                    Err(e) => self.expiry_failed(&mut w, &e),
                }
            }
        }
    }

    /// The countdown ran out but the autopick was not stored. Drop the spent
    /// countdown so status shows no live clock and `start` re-arms it.
    fn expiry_failed(&self, w: &mut Writer, cause: &DraftError) {
        error!(
            "Autopick on expiry failed: {}; re-arm with start or retry with a commissioner autopick",
            cause
        );
        w.clock.cancel();
        if let Some(slot) = w.session.current_slot() {
            self.events.publish(DraftEvent::AutopickFailed {
                pick_number: slot.pick_number,
                team: slot.team.clone(),
                reason: cause.to_string(),
            });
        }
        self.publish_snapshot(w);
    }
}

fn spawn_clock_worker(inner: Weak<Inner>, mut mailbox: mpsc::UnboundedReceiver<ClockSignal>) {
    tokio::spawn(async move {
        while let Some(signal) = mailbox.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.handle_clock(signal).await;
        }
        debug!("Clock worker stopped");
    });
}
