//! Deterministic conflict resolution.

use crate::remote::RemoteDocument;
use satchel_store::ChangeEntry;

/// How push conflicts are decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictStrategy {
    /// Newer timestamp wins; a tie keeps the local version.
    #[default]
    LastWriteWins,
    /// The remote version always wins.
    ServerWins,
    /// The local version always wins.
    ClientWins,
    /// Never decide automatically; record the conflict for review.
    Manual,
}

impl ConflictStrategy {
    /// True if deciding (or recording) requires the remote's current
    /// version of the document.
    #[must_use]
    pub fn needs_remote(&self) -> bool {
        matches!(self, Self::LastWriteWins | Self::Manual)
    }
}

/// The outcome of resolving one conflicted change entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Overwrite local state with the remote version.
    AcceptRemote,
    /// Re-send the local change with the force flag set.
    ForceLocal,
    /// Record the conflict for manual review and move on.
    Surface,
}

/// Decides a conflict between a rejected local change and the remote's
/// current version of the same document.
///
/// Pure and deterministic: the same inputs always produce the same
/// resolution. `remote` is `None` when the remote no longer has the
/// document; under [`ConflictStrategy::LastWriteWins`] that means the
/// local change stands.
#[must_use]
pub fn resolve(
    entry: &ChangeEntry,
    remote: Option<&RemoteDocument>,
    strategy: ConflictStrategy,
) -> Resolution {
    match strategy {
        ConflictStrategy::ServerWins => Resolution::AcceptRemote,
        ConflictStrategy::ClientWins => Resolution::ForceLocal,
        ConflictStrategy::Manual => Resolution::Surface,
        ConflictStrategy::LastWriteWins => match remote {
            Some(doc) if doc.updated_at > entry.timestamp => Resolution::AcceptRemote,
            // Tie or older remote: the local change stands
            _ => Resolution::ForceLocal,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_store::Operation;
    use serde_json::json;
    use uuid::Uuid;

    fn entry_at(timestamp: i64) -> ChangeEntry {
        ChangeEntry {
            id: Uuid::new_v4(),
            collection: "notes".to_string(),
            document_id: "a".to_string(),
            operation: Operation::Update,
            payload: Some(json!({"v": "local"})),
            timestamp,
            synced: false,
        }
    }

    fn remote_at(updated_at: i64) -> RemoteDocument {
        RemoteDocument {
            id: "a".to_string(),
            data: json!({"v": "remote"}),
            updated_at,
        }
    }

    #[test]
    fn last_write_wins_compares_timestamps() {
        let entry = entry_at(100);
        let strategy = ConflictStrategy::LastWriteWins;

        assert_eq!(
            resolve(&entry, Some(&remote_at(101)), strategy),
            Resolution::AcceptRemote
        );
        assert_eq!(
            resolve(&entry, Some(&remote_at(99)), strategy),
            Resolution::ForceLocal
        );
        // Equal timestamps keep the local version
        assert_eq!(
            resolve(&entry, Some(&remote_at(100)), strategy),
            Resolution::ForceLocal
        );
        // Remote side no longer has the document
        assert_eq!(resolve(&entry, None, strategy), Resolution::ForceLocal);
    }

    #[test]
    fn fixed_strategies_ignore_timestamps() {
        let entry = entry_at(100);
        let newer = remote_at(200);

        assert_eq!(
            resolve(&entry, Some(&newer), ConflictStrategy::ServerWins),
            Resolution::AcceptRemote
        );
        assert_eq!(
            resolve(&entry, Some(&newer), ConflictStrategy::ClientWins),
            Resolution::ForceLocal
        );
        assert_eq!(
            resolve(&entry, Some(&newer), ConflictStrategy::Manual),
            Resolution::Surface
        );
    }

    #[test]
    fn resolution_is_deterministic() {
        let entry = entry_at(50);
        let remote = remote_at(60);
        let first = resolve(&entry, Some(&remote), ConflictStrategy::LastWriteWins);
        for _ in 0..10 {
            assert_eq!(
                resolve(&entry, Some(&remote), ConflictStrategy::LastWriteWins),
                first
            );
        }
    }
}
