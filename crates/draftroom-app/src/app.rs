// Console loop: reads command lines, drives the engine, and prints engine
// events as they arrive.

use std::fs::File;
use std::io::{BufWriter, Write};

use anyhow::Context;
use chrono::Utc;
use draftroom_core::draft::validator::Advisory;
use draftroom_core::engine::{DraftEngine, StatusSnapshot};
use draftroom_core::error::DraftError;
use draftroom_core::events::DraftEvent;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::commands::{self, BoardCommand, Command, ExportFormat, HELP};

/// Run until `quit`, or until the input channel closes.
///
/// Events are drained before the next command so that what a command caused
/// is printed right after its reply.
pub async fn run<W: Write>(
    engine: &DraftEngine,
    mut lines: mpsc::Receiver<String>,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("Console loop started for session {}", engine.session_id());
    let mut events = engine.subscribe();
    let mut events_open = true;

    loop {
        tokio::select! {
            biased;

            event = events.recv(), if events_open => match event {
                Ok(event) => print_event(out, &event)?,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Console lagged; {} events skipped", skipped);
                }
                Err(RecvError::Closed) => events_open = false,
            },

            line = lines.recv() => {
                let Some(line) = line else {
                    info!("Input closed");
                    break;
                };
                match commands::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => {
                        info!("Quit requested");
                        break;
                    }
                    Ok(Some(command)) => {
                        debug!("Executing {:?}", command);
                        execute(engine, command, out).await?;
                    }
                    Err(e) => writeln!(out, "error: {e}")?,
                }
            }
        }
        out.flush()?;
    }

    out.flush()?;
    Ok(())
}

/// Run one command and print its reply. Engine failures are printed, not
/// returned; only a broken output stream ends the loop.
async fn execute<W: Write>(engine: &DraftEngine, command: Command, out: &mut W) -> std::io::Result<()> {
    match dispatch(engine, command).await {
        Ok(reply) => writeln!(out, "{reply}"),
        Err(e) => {
            let routine = e
                .downcast_ref::<DraftError>()
                .is_some_and(DraftError::is_routine);
            if routine {
                writeln!(out, "rejected: {e:#}")
            } else {
                warn!("Command failed: {:#}", e);
                writeln!(out, "error: {e:#}")
            }
        }
    }
}

async fn dispatch(engine: &DraftEngine, command: Command) -> anyhow::Result<String> {
    let reply = match command {
        Command::Start => {
            let snap = engine.start().await?;
            format!("Draft {} is {}", snap.session.id(), snap.status())
        }
        Command::Pick { team, player } => {
            let outcome = engine.pick(&team, &player).await?;
            match outcome.advisory {
                Some(Advisory::Poach { owner }) => {
                    format!("Accepted {} (poached from {})", outcome.record, owner)
                }
                None => format!("Accepted {}", outcome.record),
            }
        }
        Command::Autopick { pick_number } => {
            let outcome = engine.autopick(pick_number).await?;
            format!("Autopicked {}", outcome.record)
        }
        Command::Undo => {
            let record = engine.undo().await?;
            format!("Undid {record}")
        }
        Command::Pause => {
            engine.pause().await?;
            "Draft paused".to_string()
        }
        Command::Resume => {
            engine.resume().await?;
            "Draft resumed".to_string()
        }
        Command::Status => format_status(&engine.status()),
        Command::Board(board) => board_command(engine, board).await?,
        Command::ForkliftList => {
            let snap = engine.status();
            let teams = snap.session.forklift_teams();
            if teams.is_empty() {
                "No teams in forklift mode".to_string()
            } else {
                let names: Vec<&str> = teams.iter().map(|t| t.as_str()).collect();
                format!("Forklift mode: {}", names.join(", "))
            }
        }
        Command::Forklift { team, enabled } => {
            let changed = engine.set_forklift(&team, enabled).await?;
            let mode = if enabled { "on" } else { "off" };
            if changed {
                format!("Forklift mode {mode} for {team}")
            } else {
                format!("Forklift mode was already {mode} for {team}")
            }
        }
        Command::Sessions => {
            let sessions = engine.sessions()?;
            let mut text = "Stored sessions (* = open):".to_string();
            for s in &sessions {
                let marker = if s.current { "*" } else { " " };
                text.push_str(&format!("\n {} {} ({} picks)", marker, s.id, s.picks));
            }
            text
        }
        Command::Export { format, path } => {
            let file = File::create(&path).with_context(|| format!("failed to create {path}"))?;
            let writer = BufWriter::new(file);
            match format {
                ExportFormat::Json => engine.export_json(writer)?,
                ExportFormat::Csv => engine.export_csv(writer)?,
            }
            info!("Exported draft results to {}", path);
            format!("Exported {} picks to {}", engine.status().picks_made(), path)
        }
        Command::Help => HELP.to_string(),
        // Handled by the loop.
        Command::Quit => String::new(),
    };
    Ok(reply)
}

async fn board_command(engine: &DraftEngine, command: BoardCommand) -> anyhow::Result<String> {
    let reply = match command {
        BoardCommand::Show { team, limit } => {
            let stats = engine.board_stats(&team)?;
            let available = engine.board_available(&team, limit)?;
            let mut text = format!(
                "{} board: {} entries, {} available, {} drafted, {} slots free",
                team, stats.total, stats.available, stats.drafted, stats.slots_remaining
            );
            for (i, player) in available.iter().enumerate() {
                text.push_str(&format!("\n  {:>2}. {}", i + 1, player));
            }
            text
        }
        BoardCommand::Add { team, players } => {
            let mut added = 0;
            for player in &players {
                if engine.board_add(&team, player).await? {
                    added += 1;
                }
            }
            format!(
                "Added {} of {} to {}'s board ({} already present)",
                added,
                players.len(),
                team,
                players.len() - added
            )
        }
        BoardCommand::Remove { team, player } => {
            let position = engine.board_remove(&team, &player).await?;
            format!("Removed {player} from {team}'s board (was #{position})")
        }
        BoardCommand::Move {
            team,
            player,
            position,
        } => {
            let landed = engine.board_move(&team, &player, position).await?;
            format!("Moved {player} to #{landed} on {team}'s board")
        }
        BoardCommand::Reorder { team, players } => {
            let count = players.len();
            engine.board_reorder(&team, players).await?;
            format!("Reordered {count} entries on {team}'s board")
        }
        BoardCommand::Clear { team } => {
            let removed = engine.board_clear(&team).await?;
            format!("Cleared {removed} entries from {team}'s board")
        }
    };
    Ok(reply)
}

fn format_status(snap: &StatusSnapshot) -> String {
    let session = &snap.session;
    let progress = session.progress();
    let mut lines = vec![format!("Session {}: {}", session.id(), snap.status())];
    lines.push(format!(
        "{}/{} picks made ({:.1}%)",
        progress.made, progress.total, progress.percent
    ));

    if let Some(slot) = snap.on_clock() {
        let clock = match snap.deadline {
            Some(deadline) => {
                let left = (deadline - Utc::now()).num_seconds().max(0);
                format!("{left}s left")
            }
            None => "clock stopped".to_string(),
        };
        lines.push(format!(
            "On the clock: {} for pick #{} (round {}, {}), {}",
            slot.team, slot.pick_number, slot.round, slot.round_type, clock
        ));
    }
    if let Some(slot) = session.on_deck() {
        lines.push(format!("On deck: {} #{}", slot.team, slot.pick_number));
    }
    if let Some(slot) = session.in_the_hole() {
        lines.push(format!("In the hole: {} #{}", slot.team, slot.pick_number));
    }
    if let Some(pick) = snap.last_pick() {
        lines.push(format!("Last pick: {pick}"));
    }
    if !session.forklift_teams().is_empty() {
        let teams: Vec<&str> = session.forklift_teams().iter().map(|t| t.as_str()).collect();
        lines.push(format!("Forklift: {}", teams.join(", ")));
    }
    if let Some(reason) = session.halt_reason() {
        lines.push(format!("Halted: {reason}"));
    }
    lines.join("\n")
}

fn print_event<W: Write>(out: &mut W, event: &DraftEvent) -> std::io::Result<()> {
    match event {
        DraftEvent::Started {
            session_id,
            total_picks,
        } => writeln!(out, "* Draft {session_id} started ({total_picks} picks)"),
        DraftEvent::OnTheClock {
            slot,
            deadline,
            board_preview,
        } => {
            write!(
                out,
                "* {} on the clock for pick #{} (round {}, {}) until {}",
                slot.team,
                slot.pick_number,
                slot.round,
                slot.round_type,
                deadline.format("%H:%M:%S")
            )?;
            if !board_preview.is_empty() {
                let preview: Vec<&str> = board_preview.iter().map(|p| p.as_str()).collect();
                write!(out, "; board: {}", preview.join(", "))?;
            }
            writeln!(out)
        }
        DraftEvent::TimeWarning {
            pick_number,
            team,
            remaining_secs,
        } => writeln!(out, "* {team} has {remaining_secs}s left on pick #{pick_number}"),
        DraftEvent::PickMade { pick, advisory } => match advisory {
            Some(Advisory::Poach { owner }) => {
                writeln!(out, "* Pick: {pick} (poached from {owner})")
            }
            None => writeln!(out, "* Pick: {pick}"),
        },
        DraftEvent::PickUndone { pick } => writeln!(out, "* Undone: {pick}"),
        DraftEvent::Paused { pick_number } => match pick_number {
            Some(n) => writeln!(out, "* Draft paused at pick #{n}"),
            None => writeln!(out, "* Draft paused"),
        },
        DraftEvent::Resumed { pick_number } => match pick_number {
            Some(n) => writeln!(out, "* Draft resumed at pick #{n}"),
            None => writeln!(out, "* Draft resumed"),
        },
        DraftEvent::Completed { total_picks, .. } => {
            writeln!(out, "* Draft complete: {total_picks} picks")
        }
        DraftEvent::Halted { reason } => writeln!(out, "* DRAFT HALTED: {reason}"),
        DraftEvent::AutopickFailed {
            pick_number,
            team,
            reason,
        } => writeln!(
            out,
            "* AUTOPICK FAILED for pick #{pick_number} ({team}): {reason}. \
             The clock is stopped; 'start' re-arms it, 'autopick {pick_number}' retries now"
        ),
        DraftEvent::ForkliftChanged {
            team,
            enabled,
            timer_secs,
        } => {
            let mode = if *enabled { "on" } else { "off" };
            writeln!(out, "* Forklift mode {mode} for {team} ({timer_secs}s clock)")
        }
    }
}
