//! Whole-group diffing of desired against existing state.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::desired::{DesiredState, RuleGroup};
use crate::existing::ExistingState;
use crate::identity::GroupKey;

/// The groups each phase of the applier has to touch.
///
/// Upserts carry the full desired group, never a per-rule delta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    /// Desired groups with no remote counterpart.
    pub to_create: BTreeSet<GroupKey>,
    /// Desired groups whose remote projection differs.
    pub to_update: BTreeSet<GroupKey>,
    /// Remote groups no longer desired.
    pub to_delete: BTreeSet<GroupKey>,
    /// Desired groups already converged.
    pub unchanged: BTreeSet<GroupKey>,
}

impl DiffResult {
    /// Returns true if nothing needs to be written or deleted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    /// Returns the number of groups to create or update.
    #[must_use]
    pub fn upsert_count(&self) -> usize {
        self.to_create.len() + self.to_update.len()
    }

    /// Iterates the groups to write, with whether each one is new.
    pub fn upserts<'a>(
        &'a self,
        desired: &'a DesiredState,
    ) -> impl Iterator<Item = (&'a RuleGroup, bool)> + 'a {
        let created = self
            .to_create
            .iter()
            .filter_map(|key| desired.get(key))
            .map(|group| (group, true));
        let updated = self
            .to_update
            .iter()
            .filter_map(|key| desired.get(key))
            .map(|group| (group, false));
        created.chain(updated)
    }
}

/// Compares desired and existing state group by group.
///
/// Equality is order-sensitive over the four projected fields, so a
/// reordering of rules inside a group counts as a change.
#[must_use]
pub fn diff(desired: &DesiredState, existing: &ExistingState) -> DiffResult {
    let mut result = DiffResult::default();

    for key in existing.keys() {
        if !desired.contains_key(key) {
            debug!(group = %key, "group no longer desired");
            result.to_delete.insert(key.clone());
        }
    }

    for (key, group) in desired {
        match existing.get(key) {
            None => {
                result.to_create.insert(key.clone());
            }
            Some(installed) if installed.projection() != group.projection() => {
                debug!(group = %key, "group projection differs");
                result.to_update.insert(key.clone());
            }
            Some(_) => {
                result.unchanged.insert(key.clone());
            }
        }
    }

    result
}
