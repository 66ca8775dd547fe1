//! Cross-group unification
//!
//! Aspects that need total visibility across groups get one group to
//! inspect: either an existing group whose composition-relevant types
//! already cover every other group's, or a synthetic union. Coverage is
//! measured on real-object and data-contract types only, while the covering
//! group is then used with its entire set; that asymmetry is intentional.

use std::collections::BTreeSet;

use tracing::info;

use conflux_core::{ConfiguredTypeSet, IntrinsicRole};

use crate::group::Group;
use crate::registry::GroupId;

/// Outcome of unifying the finalized groups.
#[derive(Debug)]
pub enum Unification {
    /// The first group in `order` covers the composition-relevant union;
    /// no synthetic group was needed.
    Covered { order: Vec<GroupId> },
    /// No group covers the union: `unified` holds exactly the union and is
    /// inspected first, never executed.
    Synthesized { unified: Group, order: Vec<GroupId> },
}

impl Unification {
    /// Group order, covering group first when one exists.
    pub fn order(&self) -> &[GroupId] {
        match self {
            Self::Covered { order } => order,
            Self::Synthesized { order, .. } => order,
        }
    }

    pub fn synthetic(&self) -> Option<&Group> {
        match self {
            Self::Covered { .. } => None,
            Self::Synthesized { unified, .. } => Some(unified),
        }
    }
}

fn composition_relevant(set: &ConfiguredTypeSet) -> BTreeSet<&str> {
    set.iter()
        .filter(|(_, entry)| {
            matches!(
                entry.role,
                Some(IntrinsicRole::RealObject | IntrinsicRole::DataContract)
            )
        })
        .map(|(fqn, _)| fqn)
        .collect()
}

pub(crate) fn unify_groups(groups: &[(GroupId, &Group)]) -> Unification {
    if groups.len() < 2 {
        return Unification::Covered {
            order: groups.iter().map(|&(id, _)| id).collect(),
        };
    }

    let subsets: Vec<BTreeSet<&str>> = groups
        .iter()
        .map(|(_, group)| group.result().map(composition_relevant).unwrap_or_default())
        .collect();
    let union: BTreeSet<&str> = subsets.iter().flatten().copied().collect();

    if let Some(position) = subsets.iter().position(|subset| *subset == union) {
        let covering = groups[position].0;
        info!(
            covering = covering.index(),
            types = union.len(),
            "one group covers the composition-relevant union"
        );
        let mut order = vec![covering];
        order.extend(
            groups
                .iter()
                .map(|&(id, _)| id)
                .filter(|&id| id != covering),
        );
        return Unification::Covered { order };
    }

    let mut unified = ConfiguredTypeSet::new();
    for (_, group) in groups {
        let Some(result) = group.result() else {
            continue;
        };
        for (fqn, entry) in result.iter() {
            if union.contains(fqn) {
                unified.add(fqn.to_string(), entry.clone());
            }
        }
    }
    info!(types = unified.len(), "synthesized unified group");
    Unification::Synthesized {
        unified: Group::synthetic_union(unified),
        order: groups.iter().map(|&(id, _)| id).collect(),
    }
}
