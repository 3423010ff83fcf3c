//! Cache reconciliation after a mutation
//!
//! A successful mutation patches one cached list so the list reflects the
//! mutated entity without a refetch.

use serde_json::Value;

use super::{update_list, CacheError, ListTarget, PatchOutcome, QueryCache};
use crate::record::EntityId;

/// The edit a mutation makes to a cached list.
#[derive(Clone, Debug, PartialEq)]
pub enum CachePatch {
    /// A created entity becomes the first row.
    Prepend(Value),
    /// The row with the same id is replaced; order is preserved.
    Replace(Value),
    /// The row with this id is removed.
    Remove(EntityId),
}

impl CachePatch {
    /// Apply to a list of rows.
    pub fn apply(&self, rows: Vec<Value>) -> Vec<Value> {
        match self {
            CachePatch::Prepend(entity) => {
                let mut out = Vec::with_capacity(rows.len() + 1);
                out.push(entity.clone());
                out.extend(rows);
                out
            }
            CachePatch::Replace(entity) => {
                let Some(id) = EntityId::of(entity) else {
                    return rows;
                };
                rows.into_iter()
                    .map(|row| {
                        if EntityId::of(&row).as_ref() == Some(&id) {
                            entity.clone()
                        } else {
                            row
                        }
                    })
                    .collect()
            }
            CachePatch::Remove(id) => rows
                .into_iter()
                .filter(|row| EntityId::of(row).as_ref() != Some(id))
                .collect(),
        }
    }
}

/// Patch the cached list at `target`. A list that was never fetched is
/// skipped, not created.
pub fn reconcile(
    cache: &dyn QueryCache,
    target: &ListTarget,
    patch: &CachePatch,
) -> Result<PatchOutcome, CacheError> {
    let outcome = update_list(cache, target, |rows| patch.apply(rows))?;
    if outcome == PatchOutcome::Skipped {
        log::debug!("No cached snapshot for {}, skipping patch", target.key);
    }
    Ok(outcome)
}
