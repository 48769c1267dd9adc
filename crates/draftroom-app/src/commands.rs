// Console command parsing. Pure; the app loop executes what this returns.

use draftroom_core::draft::pick::{PlayerId, TeamId};
use thiserror::Error;

/// Default number of board entries shown by `board TEAM`.
const DEFAULT_BOARD_SHOW: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Pick { team: TeamId, player: PlayerId },
    /// Commissioner override for the slot on the clock.
    Autopick { pick_number: u32 },
    Undo,
    Pause,
    Resume,
    Status,
    Board(BoardCommand),
    /// List the teams in forklift mode.
    ForkliftList,
    Forklift { team: TeamId, enabled: bool },
    Sessions,
    Export { format: ExportFormat, path: String },
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardCommand {
    Show { team: TeamId, limit: usize },
    Add { team: TeamId, players: Vec<PlayerId> },
    Remove { team: TeamId, player: PlayerId },
    Move { team: TeamId, player: PlayerId, position: usize },
    Reorder { team: TeamId, players: Vec<PlayerId> },
    Clear { team: TeamId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("'{value}' is not a valid {what}")]
    BadNumber { what: &'static str, value: String },
}

pub const HELP: &str = "\
Commands:
  start                          start the draft
  pick TEAM PLAYER               submit a pick for the team on the clock
  autopick PICK#                 commissioner autopick for the slot on the clock
  undo                           remove the most recent pick
  pause | resume                 stop or restart the pick clock
  status                         show the current state of the draft
  board TEAM [N]                 show the top N undrafted board entries
  board add TEAM PLAYER...       append players to a board
  board remove TEAM PLAYER       remove a player from a board
  board move TEAM PLAYER POS     move a player to a 1-based position
  board reorder TEAM PLAYER...   replace a board's ranking
  board clear TEAM               empty a board
  forklift [TEAM on|off]         list or toggle the short autopick clock
  sessions                       list the sessions stored in the database
  export json|csv PATH           write the draft results to a file
  help                           show this message
  quit                           exit";

/// Parse one input line. Blank lines parse to `None`.
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&head, args)) = words.split_first() else {
        return Ok(None);
    };

    let command = match head.to_ascii_lowercase().as_str() {
        "start" => Command::Start,
        "pick" => match args {
            [team, player] => Command::Pick {
                team: TeamId::from(*team),
                player: PlayerId::from(*player),
            },
            _ => return Err(ParseError::Usage("pick TEAM PLAYER")),
        },
        "autopick" => match args {
            [pick] => Command::Autopick {
                pick_number: number(pick, "pick number")?,
            },
            _ => return Err(ParseError::Usage("autopick PICK#")),
        },
        "undo" => Command::Undo,
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "status" | "s" => Command::Status,
        "board" | "b" => Command::Board(parse_board(args)?),
        "forklift" => match args {
            [] => Command::ForkliftList,
            [team, mode] => Command::Forklift {
                team: TeamId::from(*team),
                enabled: match mode.to_ascii_lowercase().as_str() {
                    "on" => true,
                    "off" => false,
                    _ => return Err(ParseError::Usage("forklift [TEAM on|off]")),
                },
            },
            _ => return Err(ParseError::Usage("forklift [TEAM on|off]")),
        },
        "sessions" => Command::Sessions,
        "export" => match args {
            [format, path] => Command::Export {
                format: match format.to_ascii_lowercase().as_str() {
                    "json" => ExportFormat::Json,
                    "csv" => ExportFormat::Csv,
                    _ => return Err(ParseError::Usage("export json|csv PATH")),
                },
                path: path.to_string(),
            },
            _ => return Err(ParseError::Usage("export json|csv PATH")),
        },
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn parse_board(args: &[&str]) -> Result<BoardCommand, ParseError> {
    let Some((&sub, rest)) = args.split_first() else {
        return Err(ParseError::Usage("board TEAM [N]"));
    };

    let command = match (sub.to_ascii_lowercase().as_str(), rest) {
        ("add", [team, players @ ..]) if !players.is_empty() => BoardCommand::Add {
            team: TeamId::from(*team),
            players: players.iter().map(|p| PlayerId::from(*p)).collect(),
        },
        ("add", _) => return Err(ParseError::Usage("board add TEAM PLAYER...")),
        ("remove" | "rm", [team, player]) => BoardCommand::Remove {
            team: TeamId::from(*team),
            player: PlayerId::from(*player),
        },
        ("remove" | "rm", _) => return Err(ParseError::Usage("board remove TEAM PLAYER")),
        ("move" | "mv", [team, player, position]) => BoardCommand::Move {
            team: TeamId::from(*team),
            player: PlayerId::from(*player),
            position: number(position, "position")?,
        },
        ("move" | "mv", _) => return Err(ParseError::Usage("board move TEAM PLAYER POS")),
        ("reorder", [team, players @ ..]) => BoardCommand::Reorder {
            team: TeamId::from(*team),
            players: players.iter().map(|p| PlayerId::from(*p)).collect(),
        },
        ("reorder", _) => return Err(ParseError::Usage("board reorder TEAM PLAYER...")),
        ("clear", [team]) => BoardCommand::Clear {
            team: TeamId::from(*team),
        },
        ("clear", _) => return Err(ParseError::Usage("board clear TEAM")),
        // Anything else is a team name.
        (_, []) => BoardCommand::Show {
            team: TeamId::from(sub),
            limit: DEFAULT_BOARD_SHOW,
        },
        (_, [limit]) => BoardCommand::Show {
            team: TeamId::from(sub),
            limit: number(limit, "count")?,
        },
        _ => return Err(ParseError::Usage("board TEAM [N]")),
    };
    Ok(command)
}

fn number<T: std::str::FromStr>(raw: &str, what: &'static str) -> Result<T, ParseError> {
    raw.trim_start_matches('#')
        .parse()
        .map_err(|_| ParseError::BadNumber {
            what,
            value: raw.to_string(),
        })
}
