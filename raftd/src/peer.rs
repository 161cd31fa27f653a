//! Peer names and cluster membership.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use reqwest::Url;

/// Resolves a peer's logical name (`host:port`) to the URL of one of its
/// endpoints. Each segment is percent-encoded on the way in.
pub fn endpoint(peer: &str, segments: &[&str]) -> Option<Url> {
    if peer.contains('/') {
        return None;
    }
    let (host, port) = peer.rsplit_once(':')?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return None;
    }
    let mut url = Url::parse(&format!("http://{peer}")).ok()?;
    url.path_segments_mut().ok()?.clear().extend(segments);
    Some(url)
}

/// The numeric id the consensus library knows `name` by.
///
/// FNV-1a over the name bytes, so every node derives the same id for a peer
/// without coordination. Zero is reserved for "no node" and never returned.
pub fn peer_id(name: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let hash = name
        .bytes()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME));
    hash.max(1)
}

/// Peer names this node has heard of, and which of them joined the cluster.
///
/// Any sender of a consensus message becomes routable, but only names that
/// were admitted through a join (or carried in a snapshot) count as members.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Roster {
    addresses: BTreeMap<u64, String>,
    members: BTreeSet<u64>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a routable name, returning `true` when it was not known.
    pub fn learn(&mut self, name: &str) -> bool {
        match self.addresses.entry(peer_id(name)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(name.to_string());
                true
            }
        }
    }

    /// Records `name` as a member, returning `false` when it already was one.
    pub fn admit(&mut self, name: &str) -> bool {
        self.learn(name);
        self.members.insert(peer_id(name))
    }

    /// The name behind a consensus id.
    pub fn name(&self, id: u64) -> Option<&str> {
        self.addresses.get(&id).map(String::as_str)
    }

    /// Member names in name order.
    pub fn members(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .members
            .iter()
            .filter_map(|id| self.addresses.get(id).cloned())
            .collect();
        names.sort();
        names
    }

    pub fn member_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.members.iter().copied()
    }
}
