//! # Channels
//!
//! A channel is an immutable destination identity. Its name is derived
//! deterministically from environment, scope and kind, so every process in
//! one environment agrees on it without coordination.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Delivery topology of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topology {
    /// Point-to-point: each message goes to exactly one listener
    Queue,
    /// Broadcast: each message goes to every current listener
    Topic,
}

/// Who a channel belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelScope {
    /// Owned by one replica
    Replica(String),
    /// Shared by the whole deployment
    AllReplicas,
    /// The error channel
    Error,
}

/// The logical kind of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    /// Broadcast to every bitarchive machine of a replica (batch jobs, correct)
    AllBa,
    /// Any bitarchive machine of a replica (upload, get)
    AnyBa,
    /// The bitarchive monitor of a replica (batch coordination)
    TheBamon,
    /// The checksum store of a replica
    TheCr,
    /// The repository (upload replies, admin traffic)
    TheRepos,
    /// Reply queue of one client process
    ReposClient,
    /// Undeliverable and undecodable messages
    Error,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::AllBa => "ALL_BA",
            ChannelKind::AnyBa => "ANY_BA",
            ChannelKind::TheBamon => "THE_BAMON",
            ChannelKind::TheCr => "THE_CR",
            ChannelKind::TheRepos => "THE_REPOS",
            ChannelKind::ReposClient => "THIS_REPOS_CLIENT",
            ChannelKind::Error => "ERROR",
        }
    }

    pub fn topology(&self) -> Topology {
        match self {
            ChannelKind::AllBa => Topology::Topic,
            _ => Topology::Queue,
        }
    }

    /// Kinds that are scoped to a single replica.
    pub fn per_replica() -> [ChannelKind; 4] {
        [
            ChannelKind::AllBa,
            ChannelKind::AnyBa,
            ChannelKind::TheBamon,
            ChannelKind::TheCr,
        ]
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::per_replica()
            .into_iter()
            .chain([
                ChannelKind::TheRepos,
                ChannelKind::ReposClient,
                ChannelKind::Error,
            ])
            .find(|kind| kind.as_str() == suffix)
    }
}

/// A resolved destination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    name: String,
    kind: ChannelKind,
    scope: ChannelScope,
}

impl Channel {
    pub(crate) fn new(name: String, kind: ChannelKind, scope: ChannelScope) -> Self {
        Self { name, kind, scope }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn scope(&self) -> &ChannelScope {
        &self.scope
    }

    pub fn topology(&self) -> Topology {
        self.kind.topology()
    }

    pub fn is_topic(&self) -> bool {
        self.topology() == Topology::Topic
    }

    /// The replica owning this channel, if it is replica scoped.
    pub fn replica_id(&self) -> Option<&str> {
        match &self.scope {
            ChannelScope::Replica(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Whether a channel name denotes a topic.
pub fn is_topic(name: &str) -> bool {
    name.ends_with(ChannelKind::AllBa.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_all_ba_is_topic() {
        assert_eq!(ChannelKind::AllBa.topology(), Topology::Topic);
        for kind in [ChannelKind::AnyBa, ChannelKind::TheCr, ChannelKind::Error] {
            assert_eq!(kind.topology(), Topology::Queue);
        }
        assert!(is_topic("DEV_ONE_ALL_BA"));
        assert!(!is_topic("DEV_ONE_ANY_BA"));
    }

    #[test]
    fn test_kind_from_suffix() {
        assert_eq!(ChannelKind::from_suffix("THE_CR"), Some(ChannelKind::TheCr));
        assert_eq!(ChannelKind::from_suffix("NOPE"), None);
    }
}
