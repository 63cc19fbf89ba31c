//! JSON-lines replay logs.
//!
//! The first non-empty line is a header describing the participants:
//!
//! ```text
//! {"local": "<uuid>", "group": false, "peers": [{"twincode": "<uuid>", "name": "Alice"}]}
//! ```
//!
//! Every following line is one `SourceEvent`. Lines starting with `#` are
//! comments.

use chrono::DateTime;
use serde::Deserialize;
use thiserror::Error;

use causerie_shared::{DeleteState, SourceEvent, TwincodeId};
use causerie_timeline::{ItemKind, Roster, TimelineItem};

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Replay log has no header line")]
    Empty,

    #[error("Invalid header: {0}")]
    Header(#[source] serde_json::Error),

    #[error("Invalid event on line {line}: {source}")]
    Event {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("A direct conversation needs exactly one peer, got {0}")]
    Roster(usize),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayPeer {
    pub twincode: TwincodeId,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayHeader {
    pub local: TwincodeId,
    #[serde(default)]
    pub group: bool,
    #[serde(default)]
    pub peers: Vec<ReplayPeer>,
}

impl ReplayHeader {
    pub fn roster(&self) -> Result<Roster, ReplayError> {
        if self.group {
            let mut roster = Roster::group(self.local);
            for peer in &self.peers {
                roster.add_peer(peer.twincode, peer.name.clone());
            }
            return Ok(roster);
        }
        match self.peers.as_slice() {
            [peer] => Ok(Roster::direct(self.local, peer.twincode, peer.name.clone())),
            peers => Err(ReplayError::Roster(peers.len())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplayLog {
    pub header: ReplayHeader,
    pub events: Vec<SourceEvent>,
}

pub fn parse_log(text: &str) -> Result<ReplayLog, ReplayError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));

    let (_, header) = lines.next().ok_or(ReplayError::Empty)?;
    let header: ReplayHeader = serde_json::from_str(header).map_err(ReplayError::Header)?;

    let events = lines
        .map(|(line, raw)| serde_json::from_str(raw).map_err(|source| ReplayError::Event { line, source }))
        .collect::<Result<Vec<SourceEvent>, _>>()?;

    Ok(ReplayLog { header, events })
}

/// One line of the human-readable timeline.
pub fn render_item(item: &TimelineItem, roster: &Roster) -> String {
    match item.kind() {
        ItemKind::Time => {
            let when = DateTime::from_timestamp_millis(item.timestamp())
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| item.timestamp().to_string());
            format!("---- {when} ----")
        }
        ItemKind::Name => format!("  [{}]", item.display_name().unwrap_or("?")),
        ItemKind::Typing => {
            let names: Vec<&str> = item
                .typists()
                .iter()
                .map(|peer| roster.display_name(peer).unwrap_or("?"))
                .collect();
            format!("  ... {} typing", names.join(", "))
        }
        kind => {
            let side = if item.is_peer_item() { "<" } else { ">" };
            let seq = item
                .descriptor_id()
                .map(|id| id.to_string())
                .unwrap_or_default();
            let mut line = format!("{side} {kind:?} {seq} corners={:#04x}", item.corners().bits());
            if item.avatar_visible() {
                line.push_str(" avatar");
            }
            if item.is_read_marker() {
                line.push_str(" seen");
            }
            if let Some(target) = item.reply_to() {
                line.push_str(&format!(" re={target}"));
            }
            if item.is_selected() {
                line.push_str(" selected");
            }
            if item.state() != DeleteState::Normal {
                line.push_str(&format!(" {:?}", item.state()));
            }
            line
        }
    }
}
