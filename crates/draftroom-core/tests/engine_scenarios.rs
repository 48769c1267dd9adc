// Integration tests for the draft engine.
//
// These tests drive a `DraftEngine` end-to-end through its public API with a
// real SQLite database and the fixture order/pool under tests/fixtures. They
// cover the round-type rules, the pick clock (warning, expiry autopick,
// pause/resume, forklift), undo, races between submitters, halting, crash
// recovery and export. Tokio's clock is paused so timer scenarios run instantly.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use draftroom_core::db::Database;
use draftroom_core::draft::order::DraftOrder;
use draftroom_core::draft::pick::{PickSource, PlayerId, TeamId};
use draftroom_core::draft::state::DraftStatus;
use draftroom_core::draft::validator::{Advisory, ValidationError};
use draftroom_core::engine::{DraftEngine, EngineSettings};
use draftroom_core::error::DraftError;
use draftroom_core::events::DraftEvent;
use draftroom_core::players::PlayerPool;

use tokio::sync::broadcast;

// ===========================================================================
// Test helpers
// ===========================================================================

/// Fixture directory path (relative to the crate root, which is the cwd for
/// `cargo test`).
const FIXTURES: &str = "tests/fixtures";

const SESSION: &str = "draft_test";

fn fixture_order() -> DraftOrder {
    DraftOrder::load(&Path::new(FIXTURES).join("draft_order.json")).unwrap()
}

fn fixture_pool() -> Arc<PlayerPool> {
    Arc::new(PlayerPool::load_csv(&Path::new(FIXTURES).join("players.csv")).unwrap())
}

fn settings() -> EngineSettings {
    EngineSettings {
        restricted_tags: vec!["fypd".into()],
        ..EngineSettings::default()
    }
}

fn memory_db() -> Arc<Database> {
    Arc::new(Database::open(":memory:").unwrap())
}

async fn open_engine(db: Arc<Database>, pool: Arc<PlayerPool>) -> DraftEngine {
    DraftEngine::open(settings(), db, pool, SESSION, fixture_order())
        .await
        .unwrap()
}

async fn started_engine() -> DraftEngine {
    let engine = open_engine(memory_db(), fixture_pool()).await;
    engine.start().await.unwrap();
    engine
}

fn team(s: &str) -> TeamId {
    TeamId::from(s)
}

fn player(s: &str) -> PlayerId {
    PlayerId::from(s)
}

/// Everything published so far, without waiting.
fn drain(rx: &mut broadcast::Receiver<DraftEvent>) -> Vec<DraftEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn event_types(events: &[DraftEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.event_type()).collect()
}

/// A scratch database file that is removed (with its WAL companions) on
/// drop.
struct ScratchDb {
    path: PathBuf,
}

impl ScratchDb {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "draftroom_{}_{}.db",
            name,
            std::process::id()
        ));
        let scratch = ScratchDb { path };
        scratch.remove();
        scratch
    }

    fn open(&self) -> Arc<Database> {
        Arc::new(Database::open(self.path.to_str().unwrap()).unwrap())
    }

    fn remove(&self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut p = self.path.as_os_str().to_owned();
            p.push(suffix);
            let _ = std::fs::remove_file(PathBuf::from(p));
        }
    }
}

impl Drop for ScratchDb {
    fn drop(&mut self) {
        self.remove();
    }
}

// ===========================================================================
// Round-type rules
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn protected_round_rejects_other_teams_player() {
    let engine = started_engine().await;

    let err = engine.pick(&team("WIZ"), &player("b")).await.unwrap_err();
    assert_eq!(
        err.as_validation(),
        Some(&ValidationError::OwnedByOtherTeam {
            player: player("b"),
            owner: team("HAM"),
        })
    );
    assert!(err.is_routine());
    assert_eq!(engine.status().current_index(), 0);
    assert_eq!(engine.status().picks_made(), 0);

    let outcome = engine.pick(&team("WIZ"), &player("a")).await.unwrap();
    assert_eq!(outcome.record.pick_number, 1);
    assert_eq!(outcome.record.source, PickSource::Manual);
    assert!(outcome.advisory.is_none());

    let snap = engine.status();
    assert_eq!(snap.current_index(), 1);
    assert_eq!(snap.on_clock().map(|s| s.team.clone()), Some(team("HAM")));
    assert_eq!(snap.clock_slot, Some(1));
}

#[tokio::test(start_paused = true)]
async fn protected_round_allows_own_player() {
    let engine = started_engine().await;
    engine.pick(&team("WIZ"), &player("a")).await.unwrap();

    let outcome = engine.pick(&team("HAM"), &player("b")).await.unwrap();
    assert!(outcome.advisory.is_none());
    assert_eq!(engine.status().session.drafted_by(&player("b")), Some(&team("HAM")));
}

#[tokio::test(start_paused = true)]
async fn unprotected_round_poach_is_advisory() {
    let engine = started_engine().await;
    for (t, p) in [("WIZ", "a"), ("HAM", "b"), ("HAM", "e"), ("WIZ", "f")] {
        engine.pick(&team(t), &player(p)).await.unwrap();
    }
    let mut rx = engine.subscribe();

    // Round 3 is unprotected: WIZ takes a player HAM owns.
    let outcome = engine.pick(&team("WIZ"), &player("h")).await.unwrap();
    assert_eq!(
        outcome.advisory,
        Some(Advisory::Poach {
            owner: team("HAM")
        })
    );

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        DraftEvent::PickMade {
            advisory: Some(Advisory::Poach { .. }),
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn duplicate_and_out_of_turn_picks_are_rejected() {
    let engine = started_engine().await;

    let err = engine.pick(&team("HAM"), &player("a")).await.unwrap_err();
    assert!(matches!(
        err.as_validation(),
        Some(ValidationError::NotOnClock { .. })
    ));

    engine.pick(&team("WIZ"), &player("a")).await.unwrap();
    let err = engine.pick(&team("HAM"), &player("a")).await.unwrap_err();
    assert_eq!(
        err.as_validation(),
        Some(&ValidationError::DuplicatePlayer {
            player: player("a"),
            drafted_by: team("WIZ"),
        })
    );

    let err = engine.pick(&team("HAM"), &player("nobody")).await.unwrap_err();
    assert_eq!(
        err.as_validation(),
        Some(&ValidationError::UnknownPlayer(player("nobody")))
    );
    assert_eq!(engine.status().picks_made(), 1);
}

#[tokio::test(start_paused = true)]
async fn picks_before_start_are_rejected() {
    let engine = open_engine(memory_db(), fixture_pool()).await;
    let err = engine.pick(&team("WIZ"), &player("a")).await.unwrap_err();
    assert_eq!(err.as_validation(), Some(&ValidationError::DraftNotRunning));
    assert!(engine.status().deadline.is_none());
}

// ===========================================================================
// Pick clock
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn start_announces_and_arms_the_clock() {
    let engine = open_engine(memory_db(), fixture_pool()).await;
    let mut rx = engine.subscribe();

    let snap = engine.start().await.unwrap();
    assert_eq!(snap.status(), DraftStatus::Running);
    assert_eq!(snap.clock_slot, Some(0));
    assert!(snap.deadline.is_some());

    let events = drain(&mut rx);
    assert_eq!(event_types(&events), vec!["Started", "OnTheClock"]);

    // A second start changes nothing and announces nothing.
    engine.start().await.unwrap();
    assert!(drain(&mut rx).is_empty());
    assert_eq!(engine.status().clock_slot, Some(0));
}

#[tokio::test(start_paused = true)]
async fn warning_fires_before_expiry() {
    let engine = started_engine().await;
    let mut rx = engine.subscribe();

    tokio::time::sleep(Duration::from_secs(181)).await;
    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![DraftEvent::TimeWarning {
            pick_number: 1,
            team: team("WIZ"),
            remaining_secs: 60,
        }]
    );
    assert_eq!(engine.status().picks_made(), 0);
}

#[tokio::test(start_paused = true)]
async fn expiry_autopicks_from_the_board() {
    let engine = open_engine(memory_db(), fixture_pool()).await;
    engine.board_add(&team("WIZ"), &player("c")).await.unwrap();
    engine.board_add(&team("WIZ"), &player("a")).await.unwrap();
    engine.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(241)).await;

    let snap = engine.status();
    assert_eq!(snap.current_index(), 1);
    let pick = snap.last_pick().unwrap();
    assert_eq!(pick.team, team("WIZ"));
    assert_eq!(pick.player.id, player("c"));
    assert_eq!(pick.source, PickSource::AutopickBoard);
    assert_eq!(snap.clock_slot, Some(1));
}

#[tokio::test(start_paused = true)]
async fn expiry_matches_a_manual_pick_of_the_same_player() {
    let timed = started_engine().await;
    timed.board_add(&team("WIZ"), &player("a")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(241)).await;

    let manual = started_engine().await;
    manual.board_add(&team("WIZ"), &player("a")).await.unwrap();
    manual.pick(&team("WIZ"), &player("a")).await.unwrap();

    let t = timed.status();
    let m = manual.status();
    assert_eq!(t.current_index(), m.current_index());
    assert_eq!(t.session.drafted_ids(), m.session.drafted_ids());
    let (tp, mp) = (t.last_pick().unwrap(), m.last_pick().unwrap());
    assert_eq!((tp.pick_number, &tp.team, &tp.player), (mp.pick_number, &mp.team, &mp.player));
    assert_eq!(tp.source, PickSource::AutopickBoard);
    assert_eq!(mp.source, PickSource::Manual);
}

#[tokio::test(start_paused = true)]
async fn expiry_without_board_uses_the_ranking() {
    let engine = started_engine().await;
    tokio::time::sleep(Duration::from_secs(241)).await;

    // b ranks first but HAM owns it in a protected round.
    let pick = engine.status().last_pick().cloned().unwrap();
    assert_eq!(pick.player.id, player("a"));
    assert_eq!(pick.source, PickSource::AutopickFallback);
}

#[tokio::test(start_paused = true)]
async fn manual_pick_just_before_expiry_cancels_the_old_clock() {
    let engine = started_engine().await;
    tokio::time::sleep(Duration::from_secs(239)).await;
    engine.pick(&team("WIZ"), &player("a")).await.unwrap();

    // The first deadline passes; the fresh clock for HAM is still running.
    tokio::time::sleep(Duration::from_secs(60)).await;
    let snap = engine.status();
    assert_eq!(snap.picks_made(), 1);
    assert_eq!(snap.clock_slot, Some(1));
    assert_eq!(snap.last_pick().unwrap().source, PickSource::Manual);
}

#[tokio::test(start_paused = true)]
async fn fully_autopicked_draft_completes_without_duplicates() {
    let engine = started_engine().await;
    let mut rx = engine.subscribe();

    tokio::time::sleep(Duration::from_secs(240 * 6 + 30)).await;

    let snap = engine.status();
    assert_eq!(snap.status(), DraftStatus::Completed);
    assert!(snap.deadline.is_none());
    assert!(snap.session.is_consistent());

    let ids: Vec<&str> = snap
        .session
        .picks()
        .iter()
        .map(|p| p.player.id.as_str())
        .collect();
    // Tagged slots draw only tagged players; HAM's last pick poaches d.
    assert_eq!(ids, vec!["a", "b", "e", "f", "c", "d"]);
    assert!(snap.session.picks().iter().all(|p| p.source.is_autopick()));

    let events = drain(&mut rx);
    assert!(matches!(
        events.last(),
        Some(DraftEvent::Completed { total_picks: 6, .. })
    ));
}

// ===========================================================================
// Pause / resume
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn pause_stops_the_clock_and_resume_grants_a_fresh_deadline() {
    let engine = started_engine().await;
    tokio::time::sleep(Duration::from_secs(200)).await;

    engine.pause().await.unwrap();
    let snap = engine.status();
    assert_eq!(snap.status(), DraftStatus::Paused);
    assert!(snap.deadline.is_none());

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(engine.status().picks_made(), 0);

    let err = engine.pick(&team("WIZ"), &player("a")).await.unwrap_err();
    assert_eq!(err.as_validation(), Some(&ValidationError::DraftNotRunning));

    engine.resume().await.unwrap();
    let snap = engine.status();
    assert_eq!(snap.status(), DraftStatus::Running);
    let deadline = snap.deadline.unwrap();
    assert!(deadline > Utc::now() + chrono::Duration::seconds(230));

    // 200s had elapsed before the pause; a resumed clock does not remember it.
    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(engine.status().picks_made(), 0);
}

#[tokio::test(start_paused = true)]
async fn resume_when_not_paused_is_rejected() {
    let engine = started_engine().await;
    let err = engine.resume().await.unwrap_err();
    assert_eq!(err.as_validation(), Some(&ValidationError::NotPaused));
}

// ===========================================================================
// Undo
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn undo_with_no_picks_changes_nothing() {
    let engine = started_engine().await;
    let before = engine.status();

    let err = engine.undo().await.unwrap_err();
    assert_eq!(err.as_validation(), Some(&ValidationError::NothingToUndo));

    let after = engine.status();
    assert_eq!(*after.session, *before.session);
    assert_eq!(after.clock_slot, before.clock_slot);
}

#[tokio::test(start_paused = true)]
async fn undo_restores_the_previous_state() {
    let engine = started_engine().await;
    engine.pick(&team("WIZ"), &player("a")).await.unwrap();
    let before = engine.status();

    engine.pick(&team("HAM"), &player("b")).await.unwrap();
    let undone = engine.undo().await.unwrap();
    assert_eq!(undone.player.id, player("b"));

    let after = engine.status();
    assert_eq!(*after.session, *before.session);
    assert_eq!(after.clock_slot, Some(1));
    assert_eq!(after.on_clock().map(|s| s.team.clone()), Some(team("HAM")));

    // The undone player is available again.
    engine.pick(&team("HAM"), &player("b")).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn undo_after_completion_reopens_the_draft() {
    let engine = started_engine().await;
    for (t, p) in [
        ("WIZ", "a"),
        ("HAM", "b"),
        ("HAM", "e"),
        ("WIZ", "f"),
        ("WIZ", "c"),
        ("HAM", "g"),
    ] {
        engine.pick(&team(t), &player(p)).await.unwrap();
    }
    assert_eq!(engine.status().status(), DraftStatus::Completed);

    engine.undo().await.unwrap();
    let snap = engine.status();
    assert_eq!(snap.status(), DraftStatus::Running);
    assert_eq!(snap.current_index(), 5);
    assert_eq!(snap.clock_slot, Some(5));
    assert!(snap.session.completed_at().is_none());
}

// ===========================================================================
// Races
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn manual_pick_and_commissioner_autopick_race() {
    let engine = started_engine().await;

    let wiz = team("WIZ");
    let a = player("a");
    let (manual, auto) = tokio::join!(engine.pick(&wiz, &a), engine.autopick(1));

    assert!(manual.is_ok() != auto.is_ok(), "exactly one submission wins");
    let loser = manual.err().or(auto.err()).unwrap();
    assert!(loser.is_routine());

    let snap = engine.status();
    assert_eq!(snap.picks_made(), 1);
    assert_eq!(snap.current_index(), 1);
    assert!(snap.session.is_consistent());
}

#[tokio::test(start_paused = true)]
async fn expiry_beats_a_manual_pick_that_arrives_after_the_deadline() {
    let engine = started_engine().await;
    tokio::time::sleep(Duration::from_millis(240_001)).await;

    let err = engine.pick(&team("WIZ"), &player("c")).await.unwrap_err();
    assert_eq!(
        err.as_validation(),
        Some(&ValidationError::NotOnClock {
            team: team("WIZ"),
            on_clock: team("HAM"),
        })
    );

    let snap = engine.status();
    assert_eq!(snap.picks_made(), 1);
    assert_eq!(snap.last_pick().unwrap().player.id, player("a"));
    assert!(snap.last_pick().unwrap().source.is_autopick());
    assert!(snap.session.is_consistent());
}

#[tokio::test(start_paused = true)]
async fn manual_pick_and_expiry_at_the_same_instant_record_one_pick() {
    let engine = started_engine().await;
    tokio::time::sleep(Duration::from_secs(240)).await;
    let manual = engine.pick(&team("WIZ"), &player("a")).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let snap = engine.status();
    assert_eq!(snap.picks_made(), 1);
    assert_eq!(snap.current_index(), 1);
    assert_eq!(snap.clock_slot, Some(1));
    assert!(snap.session.is_consistent());
    match manual {
        Ok(outcome) => assert_eq!(snap.last_pick(), Some(&outcome.record)),
        Err(e) => {
            assert!(e.is_routine());
            assert!(snap.last_pick().unwrap().source.is_autopick());
        }
    }
}

#[tokio::test(start_paused = true)]
async fn commissioner_autopick_for_a_filled_slot_is_rejected() {
    let engine = started_engine().await;
    engine.pick(&team("WIZ"), &player("a")).await.unwrap();

    let err = engine.autopick(1).await.unwrap_err();
    assert_eq!(
        err.as_validation(),
        Some(&ValidationError::SlotAlreadyFilled { pick_number: 1 })
    );

    let outcome = engine.autopick(2).await.unwrap();
    assert_eq!(outcome.record.team, team("HAM"));
    assert_eq!(outcome.record.player.id, player("b"));
}

// ===========================================================================
// Forklift mode
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn forklift_team_is_autopicked_from_its_board_after_ten_seconds() {
    let engine = open_engine(memory_db(), fixture_pool()).await;
    engine.board_add(&team("WIZ"), &player("c")).await.unwrap();
    assert!(engine.set_forklift(&team("WIZ"), true).await.unwrap());
    engine.start().await.unwrap();

    let deadline = engine.status().deadline.unwrap();
    assert!(deadline <= Utc::now() + chrono::Duration::seconds(10));

    tokio::time::sleep(Duration::from_secs(11)).await;
    let snap = engine.status();
    assert_eq!(snap.picks_made(), 1);
    let pick = snap.last_pick().unwrap();
    assert_eq!(pick.team, team("WIZ"));
    assert_eq!(pick.player.id, player("c"));
    assert_eq!(pick.source, PickSource::AutopickBoard);

    // HAM is not in forklift mode and keeps the full clock.
    assert_eq!(snap.clock_slot, Some(1));
    tokio::time::sleep(Duration::from_secs(200)).await;
    assert_eq!(engine.status().picks_made(), 1);
}

#[tokio::test(start_paused = true)]
async fn forklift_toggle_rearms_the_team_on_the_clock() {
    let engine = started_engine().await;
    tokio::time::sleep(Duration::from_secs(100)).await;
    let mut rx = engine.subscribe();

    assert!(engine.set_forklift(&team("WIZ"), true).await.unwrap());
    assert!(!engine.set_forklift(&team("WIZ"), true).await.unwrap());

    let events = drain(&mut rx);
    assert_eq!(event_types(&events), vec!["ForkliftChanged", "OnTheClock"]);
    assert!(matches!(
        &events[0],
        DraftEvent::ForkliftChanged { enabled: true, timer_secs: 10, .. }
    ));

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(engine.status().picks_made(), 1);
}

#[tokio::test(start_paused = true)]
async fn forklift_for_a_team_off_the_clock_leaves_the_clock_alone() {
    let engine = started_engine().await;
    let before = engine.status().deadline;
    let mut rx = engine.subscribe();

    engine.set_forklift(&team("HAM"), true).await.unwrap();
    assert_eq!(event_types(&drain(&mut rx)), vec!["ForkliftChanged"]);
    assert_eq!(engine.status().deadline, before);

    let err = engine.set_forklift(&team("NOPE"), true).await.unwrap_err();
    assert!(err.is_routine());
}

#[tokio::test(start_paused = true)]
async fn forklift_mode_survives_a_restart() {
    let scratch = ScratchDb::new("forklift");
    {
        let engine = open_engine(scratch.open(), fixture_pool()).await;
        engine.set_forklift(&team("WIZ"), true).await.unwrap();
        engine.start().await.unwrap();
    }

    let engine = open_engine(scratch.open(), fixture_pool()).await;
    assert!(engine.status().session.is_forklift(&team("WIZ")));
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(engine.status().picks_made(), 1);

    assert!(engine.set_forklift(&team("WIZ"), false).await.unwrap());
    assert!(!engine.status().session.is_forklift(&team("WIZ")));
}

// ===========================================================================
// Halting
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn empty_pool_halts_the_session() {
    let pool = Arc::new(PlayerPool::from_csv_str("id,name,owner,rank,tags\n").unwrap());
    let engine = open_engine(memory_db(), pool).await;
    engine.start().await.unwrap();
    let mut rx = engine.subscribe();

    let err = engine.autopick(1).await.unwrap_err();
    assert!(matches!(err, DraftError::Configuration(_)));
    assert!(!err.is_routine());

    let snap = engine.status();
    assert_eq!(snap.status(), DraftStatus::Halted);
    assert!(snap.session.halt_reason().is_some());
    assert!(snap.deadline.is_none());
    assert_eq!(snap.picks_made(), 0);
    assert_eq!(event_types(&drain(&mut rx)), vec!["Halted"]);

    // Nothing moves a halted session.
    assert!(engine.start().await.is_err());
    assert!(engine.resume().await.is_err());
    let err = engine.pick(&team("WIZ"), &player("a")).await.unwrap_err();
    assert_eq!(err.as_validation(), Some(&ValidationError::DraftNotRunning));
}

#[tokio::test(start_paused = true)]
async fn expiry_with_no_legal_player_halts() {
    // Everyone is owned by HAM, and WIZ is on the clock in a protected round.
    let pool = Arc::new(
        PlayerPool::from_csv_str("id,name,owner,rank,tags\nb,Bobby Baines,HAM,1,\n").unwrap(),
    );
    let engine = open_engine(memory_db(), pool).await;
    engine.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(241)).await;
    assert_eq!(engine.status().status(), DraftStatus::Halted);
}

// ===========================================================================
// Target boards
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn board_edits_validate_team_and_player() {
    let engine = open_engine(memory_db(), fixture_pool()).await;

    let err = engine.board_add(&team("NOPE"), &player("a")).await.unwrap_err();
    assert!(matches!(err, DraftError::Board(_)));
    let err = engine.board_add(&team("WIZ"), &player("zzz")).await.unwrap_err();
    assert!(matches!(err, DraftError::Board(_)));

    assert!(engine.board_add(&team("WIZ"), &player("a")).await.unwrap());
    assert!(!engine.board_add(&team("WIZ"), &player("a")).await.unwrap());
    engine.board_add(&team("WIZ"), &player("c")).await.unwrap();
    engine.board_add(&team("WIZ"), &player("e")).await.unwrap();

    assert_eq!(engine.board_move(&team("WIZ"), &player("e"), 1).await.unwrap(), 1);
    assert_eq!(
        engine.board(&team("WIZ")).unwrap(),
        vec![player("e"), player("a"), player("c")]
    );
    assert_eq!(engine.board_remove(&team("WIZ"), &player("a")).await.unwrap(), 2);
    assert!(engine.board(&team("HAM")).unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn board_availability_skips_drafted_players() {
    let engine = open_engine(memory_db(), fixture_pool()).await;
    for p in ["a", "c", "g"] {
        engine.board_add(&team("HAM"), &player(p)).await.unwrap();
    }
    engine.start().await.unwrap();
    engine.pick(&team("WIZ"), &player("a")).await.unwrap();

    assert_eq!(
        engine.board_available(&team("HAM"), 5).unwrap(),
        vec![player("c"), player("g")]
    );
    let stats = engine.board_stats(&team("HAM")).unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.available, 2);
    assert_eq!(stats.drafted, 1);
}

#[tokio::test(start_paused = true)]
async fn on_the_clock_event_previews_the_board() {
    let engine = open_engine(memory_db(), fixture_pool()).await;
    engine.board_add(&team("WIZ"), &player("c")).await.unwrap();
    let mut rx = engine.subscribe();
    engine.start().await.unwrap();

    let preview = drain(&mut rx).into_iter().find_map(|e| match e {
        DraftEvent::OnTheClock { board_preview, .. } => Some(board_preview),
        _ => None,
    });
    assert_eq!(preview, Some(vec![player("c")]));
}

// ===========================================================================
// Crash recovery
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn reopen_resumes_where_the_last_write_left_off() {
    let scratch = ScratchDb::new("recovery");

    {
        let engine = open_engine(scratch.open(), fixture_pool()).await;
        engine.board_add(&team("HAM"), &player("c")).await.unwrap();
        engine.start().await.unwrap();
        engine.pick(&team("WIZ"), &player("a")).await.unwrap();
        // Simulated crash: the engine goes away without a clean shutdown.
    }

    let db = scratch.open();
    assert_eq!(db.get_current_session_id().unwrap().as_deref(), Some(SESSION));

    let engine = open_engine(db, fixture_pool()).await;
    let snap = engine.status();
    assert_eq!(snap.status(), DraftStatus::Running);
    assert_eq!(snap.picks_made(), 1);
    assert_eq!(snap.current_index(), 1);
    assert_eq!(snap.clock_slot, Some(1));
    assert!(snap.deadline.unwrap() > Utc::now() + chrono::Duration::seconds(230));
    assert_eq!(engine.board(&team("HAM")).unwrap(), vec![player("c")]);

    // The restored clock still drives autopick from the restored board.
    tokio::time::sleep(Duration::from_secs(241)).await;
    let pick = engine.status().last_pick().cloned().unwrap();
    assert_eq!(pick.team, team("HAM"));
    assert_eq!(pick.player.id, player("c"));
    assert_eq!(pick.source, PickSource::AutopickBoard);
}

#[tokio::test(start_paused = true)]
async fn reopen_of_a_paused_session_stays_paused() {
    let scratch = ScratchDb::new("paused");
    {
        let engine = open_engine(scratch.open(), fixture_pool()).await;
        engine.start().await.unwrap();
        engine.pause().await.unwrap();
        engine.shutdown().await;
    }

    let engine = open_engine(scratch.open(), fixture_pool()).await;
    let snap = engine.status();
    assert_eq!(snap.status(), DraftStatus::Paused);
    assert!(snap.deadline.is_none());
}

// ===========================================================================
// Export
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn export_reflects_committed_picks() {
    let engine = started_engine().await;
    engine.pick(&team("WIZ"), &player("a")).await.unwrap();

    let mut csv = Vec::new();
    engine.export_csv(&mut csv).unwrap();
    let text = String::from_utf8(csv).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("1,1,WIZ,a,,protected,manual,"));

    let mut json = Vec::new();
    engine.export_json(&mut json).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
    assert_eq!(value["session_id"], SESSION);
    assert_eq!(value["picks"][0]["player"]["id"], "a");
}
