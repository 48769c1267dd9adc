// Draft results export (JSON and CSV).

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::draft::pick::PickRecord;
use crate::draft::state::{DraftSession, DraftStatus};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode JSON export: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to encode CSV export: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Serialize)]
struct JsonExport<'a> {
    session_id: &'a str,
    status: DraftStatus,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    picks: &'a [PickRecord],
}

#[derive(Serialize)]
struct CsvRow<'a> {
    round: u32,
    pick: u32,
    team: &'a str,
    player: &'a str,
    owner: &'a str,
    round_type: &'a str,
    source: &'a str,
    timestamp: String,
}

pub fn write_json<W: Write>(session: &DraftSession, mut out: W) -> Result<(), ExportError> {
    let doc = JsonExport {
        session_id: session.id(),
        status: session.status(),
        started_at: session.started_at(),
        completed_at: session.completed_at(),
        picks: session.picks(),
    };
    serde_json::to_writer_pretty(&mut out, &doc)?;
    out.write_all(b"\n")?;
    Ok(())
}

/// One row per pick: `round,pick,team,player,owner,round_type,source,timestamp`.
pub fn write_csv<W: Write>(session: &DraftSession, out: W) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_writer(out);
    for pick in session.picks() {
        writer.serialize(CsvRow {
            round: pick.round,
            pick: pick.pick_number,
            team: pick.team.as_str(),
            player: pick.player.id.as_str(),
            owner: pick.player.owner.as_ref().map(|o| o.as_str()).unwrap_or(""),
            round_type: pick.round_type.label(),
            source: pick.source.label(),
            timestamp: pick.timestamp.to_rfc3339(),
        })?;
    }
    if session.picks().is_empty() {
        writer.write_record([
            "round",
            "pick",
            "team",
            "player",
            "owner",
            "round_type",
            "source",
            "timestamp",
        ])?;
    }
    writer.flush()?;
    Ok(())
}
