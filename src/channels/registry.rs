//! # Channel Registry
//!
//! Resolves logical destinations to channels. Names are
//! `<ENV>_<REPLICA>_<KIND>` for replica scoped channels and
//! `<ENV>_COMMON_<KIND>` for shared ones; the per-process reply queue
//! additionally carries the process instance id.

use std::collections::BTreeMap;

use super::channel::{Channel, ChannelKind, ChannelScope};
use super::errors::{ChannelError, ChannelResult};
use super::replica::{Replica, ReplicaType};

/// Location segment used by deployment-wide channels
pub const COMMON: &str = "COMMON";

/// Resolves channel names for one environment
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    environment: String,
    instance_id: String,
    replicas: BTreeMap<String, Replica>,
}

fn check_identifier(value: &str) -> ChannelResult<()> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if valid && value != COMMON {
        Ok(())
    } else {
        Err(ChannelError::InvalidIdentifier(value.to_string()))
    }
}

impl ChannelRegistry {
    /// Create a registry.
    ///
    /// The environment and every replica id must be non-empty upper case
    /// alphanumerics, so that names split back unambiguously.
    pub fn new(
        environment: impl Into<String>,
        instance_id: impl Into<String>,
        replicas: impl IntoIterator<Item = Replica>,
    ) -> ChannelResult<Self> {
        let environment = environment.into();
        check_identifier(&environment)?;

        let mut by_id = BTreeMap::new();
        for replica in replicas {
            check_identifier(&replica.id)?;
            if by_id.contains_key(&replica.id) {
                return Err(ChannelError::DuplicateReplica(replica.id));
            }
            by_id.insert(replica.id.clone(), replica);
        }

        Ok(Self {
            environment,
            instance_id: instance_id.into(),
            replicas: by_id,
        })
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// All known replicas, ordered by id
    pub fn replicas(&self) -> impl Iterator<Item = &Replica> {
        self.replicas.values()
    }

    pub fn replica(&self, replica_id: &str) -> ChannelResult<&Replica> {
        self.replicas
            .get(replica_id)
            .ok_or_else(|| ChannelError::UnknownReplica(replica_id.to_string()))
    }

    /// A replica scoped channel.
    pub fn replica_channel(&self, replica_id: &str, kind: ChannelKind) -> ChannelResult<Channel> {
        let replica = self.replica(replica_id)?;
        Ok(Channel::new(
            format!("{}_{}_{}", self.environment, replica.id, kind.as_str()),
            kind,
            ChannelScope::Replica(replica.id.clone()),
        ))
    }

    pub fn all_ba(&self, replica_id: &str) -> ChannelResult<Channel> {
        self.replica_channel(replica_id, ChannelKind::AllBa)
    }

    pub fn any_ba(&self, replica_id: &str) -> ChannelResult<Channel> {
        self.replica_channel(replica_id, ChannelKind::AnyBa)
    }

    pub fn the_bamon(&self, replica_id: &str) -> ChannelResult<Channel> {
        self.replica_channel(replica_id, ChannelKind::TheBamon)
    }

    pub fn the_cr(&self, replica_id: &str) -> ChannelResult<Channel> {
        self.replica_channel(replica_id, ChannelKind::TheCr)
    }

    pub fn the_repos(&self) -> Channel {
        Channel::new(
            format!("{}_{}_{}", self.environment, COMMON, ChannelKind::TheRepos.as_str()),
            ChannelKind::TheRepos,
            ChannelScope::AllReplicas,
        )
    }

    pub fn error(&self) -> Channel {
        Channel::new(
            format!("{}_{}_{}", self.environment, COMMON, ChannelKind::Error.as_str()),
            ChannelKind::Error,
            ChannelScope::Error,
        )
    }

    /// Reply queue of this process
    pub fn reply_channel(&self) -> Channel {
        Channel::new(
            format!(
                "{}_{}_{}_{}",
                self.environment,
                COMMON,
                ChannelKind::ReposClient.as_str(),
                self.instance_id
            ),
            ChannelKind::ReposClient,
            ChannelScope::AllReplicas,
        )
    }

    /// The channel a replica server listens on for requests.
    pub fn request_channel(&self, replica_id: &str) -> ChannelResult<Channel> {
        match self.replica(replica_id)?.replica_type {
            ReplicaType::Checksum => self.the_cr(replica_id),
            ReplicaType::Bitarchive => self.any_ba(replica_id),
        }
    }

    /// The channel batch jobs are published on.
    pub fn batch_channel(&self, replica_id: &str) -> ChannelResult<Channel> {
        match self.replica(replica_id)?.replica_type {
            ReplicaType::Checksum => self.the_cr(replica_id),
            ReplicaType::Bitarchive => self.all_ba(replica_id),
        }
    }

    /// Resolve the replica owning a replica scoped channel name.
    pub fn replica_from_channel(&self, name: &str) -> ChannelResult<&Replica> {
        let unresolvable = || ChannelError::UnresolvableChannel(name.to_string());

        let rest = name
            .strip_prefix(self.environment.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
            .ok_or_else(unresolvable)?;
        let (replica_id, suffix) = rest.split_once('_').ok_or_else(unresolvable)?;

        match ChannelKind::from_suffix(suffix) {
            Some(kind) if ChannelKind::per_replica().contains(&kind) => self.replica(replica_id),
            _ => Err(unresolvable()),
        }
    }

    /// Rebuild a channel from its name, as carried in a frame.
    pub fn resolve(&self, name: &str) -> ChannelResult<Channel> {
        if name == self.the_repos().name() {
            return Ok(self.the_repos());
        }
        if name == self.error().name() {
            return Ok(self.error());
        }
        let prefix = format!(
            "{}_{}_{}_",
            self.environment,
            COMMON,
            ChannelKind::ReposClient.as_str()
        );
        if name.starts_with(&prefix) {
            return Ok(Channel::new(
                name.to_string(),
                ChannelKind::ReposClient,
                ChannelScope::AllReplicas,
            ));
        }

        let replica = self.replica_from_channel(name)?;
        let suffix = &name[self.environment.len() + replica.id.len() + 2..];
        let kind = ChannelKind::from_suffix(suffix)
            .ok_or_else(|| ChannelError::UnresolvableChannel(name.to_string()))?;
        self.replica_channel(&replica.id, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ChannelRegistry {
        ChannelRegistry::new(
            "DEV",
            "A1",
            vec![
                Replica::bitarchive("ONE", "Bitarchive one"),
                Replica::checksum("CS", "Checksum store"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_names_are_deterministic() {
        let registry = registry();
        assert_eq!(registry.all_ba("ONE").unwrap().name(), "DEV_ONE_ALL_BA");
        assert_eq!(registry.the_cr("CS").unwrap().name(), "DEV_CS_THE_CR");
        assert_eq!(registry.error().name(), "DEV_COMMON_ERROR");
        assert_eq!(
            registry.reply_channel().name(),
            "DEV_COMMON_THIS_REPOS_CLIENT_A1"
        );
        assert_eq!(registry.all_ba("ONE").unwrap(), registry.all_ba("ONE").unwrap());
    }

    #[test]
    fn test_request_channel_follows_replica_type() {
        let registry = registry();
        assert_eq!(registry.request_channel("CS").unwrap().name(), "DEV_CS_THE_CR");
        assert_eq!(registry.request_channel("ONE").unwrap().name(), "DEV_ONE_ANY_BA");
        assert!(registry.batch_channel("ONE").unwrap().is_topic());
    }

    #[test]
    fn test_replica_from_channel() {
        let registry = registry();
        assert_eq!(registry.replica_from_channel("DEV_CS_THE_CR").unwrap().id, "CS");
        assert!(registry.replica_from_channel("DEV_COMMON_ERROR").is_err());
        assert!(registry.replica_from_channel("PROD_CS_THE_CR").is_err());
    }

    #[test]
    fn test_resolve_round_trips_every_kind() {
        let registry = registry();
        for channel in [
            registry.the_cr("CS").unwrap(),
            registry.all_ba("ONE").unwrap(),
            registry.the_repos(),
            registry.error(),
            registry.reply_channel(),
        ] {
            assert_eq!(registry.resolve(channel.name()).unwrap(), channel);
        }
    }

    #[test]
    fn test_rejects_bad_identifiers() {
        let dup = ChannelRegistry::new(
            "DEV",
            "A1",
            vec![Replica::checksum("CS", "a"), Replica::checksum("CS", "b")],
        );
        assert_eq!(dup.unwrap_err(), ChannelError::DuplicateReplica("CS".into()));

        let bad = ChannelRegistry::new("DEV", "A1", vec![Replica::checksum("C_S", "a")]);
        assert!(matches!(bad, Err(ChannelError::InvalidIdentifier(_))));

        assert!(ChannelRegistry::new("dev", "A1", Vec::new()).is_err());
    }

    #[test]
    fn test_unknown_replica() {
        let registry = registry();
        assert_eq!(
            registry.the_cr("TWO").unwrap_err(),
            ChannelError::UnknownReplica("TWO".into())
        );
    }
}
