// Player eligibility lookup and the global best-remaining ranking.
//
// The dataset itself is built elsewhere; the engine only reads it through
// `PlayerDirectory`. `PlayerPool` is the in-memory implementation loaded
// from a CSV export of that dataset.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::draft::pick::{PlayerId, PlayerRef, TeamId};

// ---------------------------------------------------------------------------
// Collaborator interface
// ---------------------------------------------------------------------------

/// What the eligibility dataset knows about a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerStatus {
    pub name: Option<String>,
    /// Team currently holding the player's rights, if any.
    pub owner: Option<TeamId>,
}

/// Read-only view of the player pool.
pub trait PlayerDirectory: Send + Sync {
    /// `None` when the id does not exist in the pool.
    fn lookup(&self, id: &PlayerId) -> Option<PlayerStatus>;

    /// Every player id ordered best-first. Deterministic for a given pool.
    fn ranked_ids(&self) -> Vec<PlayerId>;

    /// Whether the player carries `tag` (case-insensitive).
    fn has_tag(&self, id: &PlayerId, tag: &str) -> bool;

    /// Ranking for a tagged pool: players ranked within `tag` first, then
    /// everyone else in global order. Pools without per-tag ranks fall back
    /// to `ranked_ids`.
    fn ranked_ids_for_tag(&self, _tag: &str) -> Vec<PlayerId> {
        self.ranked_ids()
    }

    /// Resolve `id` into a `PlayerRef` carrying its current owner.
    fn resolve(&self, id: &PlayerId) -> Option<PlayerRef> {
        self.lookup(id).map(|status| PlayerRef {
            id: id.clone(),
            owner: status.owner,
        })
    }
}

// ---------------------------------------------------------------------------
// In-memory pool
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PlayerPoolError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("duplicate player id {0}")]
    DuplicateId(PlayerId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
    pub owner: Option<TeamId>,
    /// Lower is better. Unranked players sort after every ranked one.
    pub rank: Option<u32>,
    pub tags: Vec<String>,
    /// Rank inside a tagged pool, keyed by lowercase tag.
    pub tag_ranks: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Default)]
pub struct PlayerPool {
    players: HashMap<PlayerId, PlayerInfo>,
    ranked: Vec<PlayerId>,
}

/// CSV row: `id,name,owner,rank,tags[,tag_ranks]`. `tags` is `;`-separated
/// and `tag_ranks` holds `tag=rank` pairs, e.g. `fypd=3`. Extra columns are
/// ignored.
#[derive(Debug, Deserialize)]
struct RawPlayerRow {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    owner: String,
    #[serde(default)]
    rank: Option<u32>,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    tag_ranks: String,
}

impl PlayerPool {
    pub fn new(players: Vec<PlayerInfo>) -> Result<Self, PlayerPoolError> {
        let mut by_id = HashMap::with_capacity(players.len());
        for player in players {
            if by_id.contains_key(&player.id) {
                return Err(PlayerPoolError::DuplicateId(player.id));
            }
            by_id.insert(player.id.clone(), player);
        }

        let mut ranked: Vec<&PlayerInfo> = by_id.values().collect();
        ranked.sort_by(|a, b| match (a.rank, b.rank) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.id.cmp(&b.id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        });
        let ranked = ranked.into_iter().map(|p| p.id.clone()).collect();

        Ok(PlayerPool {
            players: by_id,
            ranked,
        })
    }

    pub fn load_csv(path: &Path) -> Result<Self, PlayerPoolError> {
        let file = std::fs::File::open(path).map_err(|source| PlayerPoolError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let players = players_from_reader(file).map_err(|source| PlayerPoolError::Csv {
            path: path.display().to_string(),
            source,
        })?;
        PlayerPool::new(players)
    }

    pub fn from_csv_str(text: &str) -> Result<Self, PlayerPoolError> {
        let players = players_from_reader(text.as_bytes()).map_err(|source| {
            PlayerPoolError::Csv {
                path: "<inline>".into(),
                source,
            }
        })?;
        PlayerPool::new(players)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn get(&self, id: &PlayerId) -> Option<&PlayerInfo> {
        self.players.get(id)
    }
}

fn players_from_reader<R: Read>(rdr: R) -> Result<Vec<PlayerInfo>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let mut players = Vec::new();
    for result in reader.deserialize::<RawPlayerRow>() {
        match result {
            Ok(raw) => {
                if raw.id.is_empty() {
                    warn!("skipping player row with empty id (name '{}')", raw.name);
                    continue;
                }
                let owner = (!raw.owner.is_empty()).then(|| TeamId::new(raw.owner));
                let tags = raw
                    .tags
                    .split(';')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect();
                let tag_ranks = parse_tag_ranks(&raw.id, &raw.tag_ranks);
                players.push(PlayerInfo {
                    id: PlayerId::new(raw.id),
                    name: raw.name,
                    owner,
                    rank: raw.rank,
                    tags,
                    tag_ranks,
                });
            }
            Err(e) => {
                warn!("skipping malformed player row: {}", e);
            }
        }
    }
    Ok(players)
}

fn parse_tag_ranks(id: &str, field: &str) -> BTreeMap<String, u32> {
    let mut ranks = BTreeMap::new();
    for pair in field.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let parsed = pair
            .split_once('=')
            .and_then(|(tag, rank)| Some((tag.trim(), rank.trim().parse::<u32>().ok()?)))
            .filter(|(tag, _)| !tag.is_empty());
        match parsed {
            Some((tag, rank)) => {
                ranks.insert(tag.to_ascii_lowercase(), rank);
            }
            None => warn!("ignoring malformed tag rank '{}' for player {}", pair, id),
        }
    }
    ranks
}

impl PlayerDirectory for PlayerPool {
    fn lookup(&self, id: &PlayerId) -> Option<PlayerStatus> {
        self.players.get(id).map(|p| PlayerStatus {
            name: Some(p.name.clone()),
            owner: p.owner.clone(),
        })
    }

    fn ranked_ids(&self) -> Vec<PlayerId> {
        self.ranked.clone()
    }

    fn has_tag(&self, id: &PlayerId, tag: &str) -> bool {
        self.players
            .get(id)
            .is_some_and(|p| p.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
    }

    fn ranked_ids_for_tag(&self, tag: &str) -> Vec<PlayerId> {
        let tag = tag.to_ascii_lowercase();
        let mut within: Vec<(u32, &PlayerId)> = self
            .players
            .values()
            .filter_map(|p| p.tag_ranks.get(&tag).map(|r| (*r, &p.id)))
            .collect();
        if within.is_empty() {
            return self.ranked.clone();
        }
        within.sort();

        let mut out: Vec<PlayerId> = within.into_iter().map(|(_, id)| id.clone()).collect();
        out.extend(
            self.ranked
                .iter()
                .filter(|id| {
                    !self
                        .players
                        .get(*id)
                        .is_some_and(|p| p.tag_ranks.contains_key(&tag))
                })
                .cloned(),
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
id,name,owner,rank,tags
p1,Jackson Chourio,,3,
p2,Kyle Teel,HAM,1,fypd
p3,James Wood,,,fypd;top100
p4,Unranked Guy,,,
p5,Second Best,WIZ,2,
";

    fn pid(s: &str) -> PlayerId {
        PlayerId::from(s)
    }

    #[test]
    fn loads_csv_and_resolves_owner() {
        let pool = PlayerPool::from_csv_str(SAMPLE).unwrap();
        assert_eq!(pool.len(), 5);

        let teel = pool.lookup(&pid("p2")).unwrap();
        assert_eq!(teel.owner, Some(TeamId::from("HAM")));
        assert_eq!(teel.name.as_deref(), Some("Kyle Teel"));

        let chourio = pool.lookup(&pid("p1")).unwrap();
        assert_eq!(chourio.owner, None);
        assert!(pool.lookup(&pid("nope")).is_none());
    }

    #[test]
    fn ranking_puts_unranked_last_and_breaks_ties_by_id() {
        let pool = PlayerPool::from_csv_str(SAMPLE).unwrap();
        let ranked: Vec<String> = pool.ranked_ids().iter().map(|p| p.to_string()).collect();
        assert_eq!(ranked, vec!["p2", "p5", "p1", "p3", "p4"]);
    }

    #[test]
    fn tags_are_split_and_case_insensitive() {
        let pool = PlayerPool::from_csv_str(SAMPLE).unwrap();
        assert!(pool.has_tag(&pid("p3"), "FYPD"));
        assert!(pool.has_tag(&pid("p3"), "top100"));
        assert!(!pool.has_tag(&pid("p1"), "fypd"));
        assert!(!pool.has_tag(&pid("missing"), "fypd"));
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let csv = "id,name,owner,rank,tags\np1,Good,,1,\np2,Bad Rank,,notanumber,\n,No Id,,2,\n";
        let pool = PlayerPool::from_csv_str(csv).unwrap();
        assert_eq!(pool.len(), 1);
        assert!(pool.get(&pid("p1")).is_some());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let csv = "id,name,owner,rank,tags\np1,A,,1,\np1,B,,2,\n";
        assert!(matches!(
            PlayerPool::from_csv_str(csv),
            Err(PlayerPoolError::DuplicateId(id)) if id == pid("p1")
        ));
    }

    #[test]
    fn tag_ranking_leads_with_ranked_players_then_global_order() {
        let csv = "\
id,name,owner,rank,tags,tag_ranks
p1,A,,1,,
p2,B,,2,fypd,fypd=2
p3,C,,3,fypd,FYPD=1
p4,D,,4,fypd,
p5,E,,5,,fypd=x;top=3
";
        let pool = PlayerPool::from_csv_str(csv).unwrap();
        let ids: Vec<String> = pool
            .ranked_ids_for_tag("fypd")
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(ids, vec!["p3", "p2", "p1", "p4", "p5"]);
        assert_eq!(pool.get(&pid("p5")).unwrap().tag_ranks.get("top"), Some(&3));

        // No player carries a rank for this tag: global order.
        assert_eq!(pool.ranked_ids_for_tag("other"), pool.ranked_ids());
    }

    #[test]
    fn resolve_builds_player_ref() {
        let pool = PlayerPool::from_csv_str(SAMPLE).unwrap();
        let r = pool.resolve(&pid("p5")).unwrap();
        assert_eq!(r.id, pid("p5"));
        assert_eq!(r.owner, Some(TeamId::from("WIZ")));
    }

    #[test]
    fn load_csv_reports_missing_file() {
        let err = PlayerPool::load_csv(Path::new("/nonexistent/players.csv")).unwrap_err();
        assert!(matches!(err, PlayerPoolError::Io { .. }));
    }
}
