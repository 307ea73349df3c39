//! Last-write-wins reconciliation of a local record list with remote rows.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{SyncRecord, Timestamp};

/// Which side wins when both versions carry the same `updated_at`.
///
/// `PreferLocal` keeps the on-device edit, which is the historical
/// behaviour and the default. `PreferRemote` lets the server copy win.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    PreferLocal,
    PreferRemote,
}

/// Determines whether a remote version should overwrite the local one.
///
/// Rule:
/// 1. strictly newer remote timestamp wins
/// 2. if equal, the tie-break policy decides
pub fn should_replace(
    local_updated_at: Timestamp,
    remote_updated_at: Timestamp,
    tie_break: TieBreak,
) -> bool {
    match remote_updated_at.cmp(&local_updated_at) {
        Ordering::Greater => true,
        Ordering::Equal => tie_break == TieBreak::PreferRemote,
        Ordering::Less => false,
    }
}

/// Merges with the default [`TieBreak::PreferLocal`] policy.
pub fn merge<T: SyncRecord>(local: Vec<T>, remote: Vec<T>) -> Vec<T> {
    merge_with(local, remote, TieBreak::default())
}

/// Reconciles `local` and `remote` into one list.
///
/// Local order is preserved, local-only records are kept, remote-only
/// records are appended in remote order.
pub fn merge_with<T: SyncRecord>(local: Vec<T>, remote: Vec<T>, tie_break: TieBreak) -> Vec<T> {
    let mut merged = local;
    let mut positions: HashMap<String, usize> =
        HashMap::with_capacity(merged.len() + remote.len());
    for (idx, record) in merged.iter().enumerate() {
        positions.entry(record.id().to_string()).or_insert(idx);
    }

    for remote_record in remote {
        let existing = positions.get(remote_record.id()).copied();
        match existing {
            Some(idx) => {
                let local_updated_at = merged[idx].updated_at();
                if should_replace(local_updated_at, remote_record.updated_at(), tie_break) {
                    merged[idx] = remote_record;
                }
            }
            None => {
                positions.insert(remote_record.id().to_string(), merged.len());
                merged.push(remote_record);
            }
        }
    }

    merged
}
