//! # Capability Matrix
//!
//! Which request kinds each replica type accepts. Checked locally,
//! before anything is sent.

use crate::channels::ReplicaType;
use crate::protocol::MessageKind;

/// Kinds a checksum replica refuses: everything needing file content
const CONTENT_KINDS: [MessageKind; 4] = [
    MessageKind::Get,
    MessageKind::GetFile,
    MessageKind::RemoveAndGetFile,
    MessageKind::Batch,
];

pub fn permits(replica_type: ReplicaType, kind: MessageKind) -> bool {
    match replica_type {
        ReplicaType::Bitarchive => true,
        ReplicaType::Checksum => !CONTENT_KINDS.contains(&kind),
    }
}

/// Kinds a replica type accepts, in protocol order
pub fn permitted_kinds(replica_type: ReplicaType) -> Vec<MessageKind> {
    MessageKind::ALL
        .into_iter()
        .filter(|kind| permits(replica_type, *kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitarchive_permits_everything() {
        assert_eq!(permitted_kinds(ReplicaType::Bitarchive), MessageKind::ALL.to_vec());
    }

    #[test]
    fn test_checksum_matrix() {
        assert_eq!(
            permitted_kinds(ReplicaType::Checksum),
            vec![
                MessageKind::Upload,
                MessageKind::GetChecksum,
                MessageKind::GetAllChecksums,
                MessageKind::GetAllFilenames,
                MessageKind::Correct,
            ]
        );
        for kind in CONTENT_KINDS {
            assert!(!permits(ReplicaType::Checksum, kind));
        }
    }
}
