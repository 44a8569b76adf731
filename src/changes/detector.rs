// ABOUTME: Lost-update detection over the change log.
// ABOUTME: Compares each mutation with the one before it on the same path.

use std::collections::HashMap;
use std::time::Duration;

use super::change::FileChange;
use super::conflict::FileConflict;

/// Find adjacent change pairs that look like a lost update.
///
/// For every mutating change, its predecessor is the previous mutating
/// change on the same path. The pair is flagged when a different actor made
/// the later change, its `previous_content` differs from the predecessor's
/// `new_content`, the gap between them is within `window` (if any), and no
/// conflict in `known` already records the pair.
///
/// Returns `(predecessor, successor)` index pairs into `changes`, in log order.
pub(crate) fn find_conflicting_pairs(
    changes: &[FileChange],
    known: &[FileConflict],
    window: Option<Duration>,
) -> Vec<(usize, usize)> {
    let mut last_on_path: HashMap<&str, usize> = HashMap::new();
    let mut pairs = Vec::new();

    for (idx, change) in changes.iter().enumerate() {
        if !change.operation.is_mutation() {
            continue;
        }

        if let Some(&prev_idx) = last_on_path.get(change.path.as_str()) {
            let prev = &changes[prev_idx];
            if prev.changed_by != change.changed_by
                && change.previous_content != prev.new_content
                && within(window, prev, change)
                && !known.iter().any(|c| c.covers(prev.id, change.id))
            {
                pairs.push((prev_idx, idx));
            }
        }
        last_on_path.insert(change.path.as_str(), idx);
    }

    pairs
}

fn within(window: Option<Duration>, earlier: &FileChange, later: &FileChange) -> bool {
    let Some(window) = window else {
        return true;
    };
    match (later.timestamp - earlier.timestamp).to_std() {
        Ok(gap) => gap <= window,
        // Negative gap: clock skew between writers, still concurrent.
        Err(_) => true,
    }
}
