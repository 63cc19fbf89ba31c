//! Conversation participants.
//!
//! Maps twincodes to the side of the conversation they belong to, and keeps
//! the peers' display names used by NAME separators.

use std::collections::HashMap;

use tracing::debug;

use causerie_shared::TwincodeId;

/// Which side of the conversation authored an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    Local(TwincodeId),
    Peer(TwincodeId),
}

impl Sender {
    pub fn twincode(&self) -> TwincodeId {
        match self {
            Sender::Local(id) | Sender::Peer(id) => *id,
        }
    }

    pub fn is_peer(&self) -> bool {
        matches!(self, Sender::Peer(_))
    }
}

/// Profile of a remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerProfile {
    pub display_name: String,
}

/// Participant table of one conversation.
#[derive(Debug, Clone)]
pub struct Roster {
    local: TwincodeId,
    peers: HashMap<TwincodeId, PeerProfile>,
    is_group: bool,
}

impl Roster {
    /// A one-to-one conversation with a single peer.
    pub fn direct(local: TwincodeId, peer: TwincodeId, display_name: impl Into<String>) -> Self {
        let mut peers = HashMap::new();
        peers.insert(
            peer,
            PeerProfile {
                display_name: display_name.into(),
            },
        );
        Self {
            local,
            peers,
            is_group: false,
        }
    }

    /// A group conversation; members are added with [`Roster::add_peer`].
    pub fn group(local: TwincodeId) -> Self {
        Self {
            local,
            peers: HashMap::new(),
            is_group: true,
        }
    }

    pub fn add_peer(&mut self, peer: TwincodeId, display_name: impl Into<String>) {
        let display_name = display_name.into();
        debug!(peer = %peer, name = %display_name, "Adding conversation peer");
        self.peers.insert(peer, PeerProfile { display_name });
    }

    /// Change a peer's display name. Returns `false` for unknown peers.
    pub fn rename_peer(&mut self, peer: &TwincodeId, display_name: impl Into<String>) -> bool {
        match self.peers.get_mut(peer) {
            Some(profile) => {
                profile.display_name = display_name.into();
                true
            }
            None => false,
        }
    }

    /// Classify the author of a descriptor. `None` means the twincode is
    /// neither ours nor a known peer of this conversation.
    pub fn classify(&self, twincode: &TwincodeId) -> Option<Sender> {
        if *twincode == self.local {
            Some(Sender::Local(*twincode))
        } else if self.peers.contains_key(twincode) {
            Some(Sender::Peer(*twincode))
        } else {
            None
        }
    }

    pub fn display_name(&self, peer: &TwincodeId) -> Option<&str> {
        self.peers.get(peer).map(|p| p.display_name.as_str())
    }

    pub fn is_group(&self) -> bool {
        self.is_group
    }
}
