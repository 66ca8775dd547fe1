//! Head-set maintenance
//!
//! A head is a feature module not reachable from any other currently known
//! feature. The set is adjusted incrementally as group seeds are resolved:
//! a newly discovered feature evicts the heads its closure covers and joins
//! the set when nothing covers it. Forced entries (explicitly requested
//! modules) always stay heads, redundant or not.

use std::collections::BTreeMap;

use tracing::debug;

use crate::cache::ModuleCache;
use crate::record::{ModuleId, ModuleRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadEntry {
    pub id: ModuleId,
    pub forced: bool,
}

/// Name-ordered head map of one group.
#[derive(Debug, Clone, Default)]
pub struct HeadSet {
    heads: BTreeMap<String, HeadEntry>,
}

impl HeadSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.heads.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<HeadEntry> {
        self.heads.get(name).copied()
    }

    /// Heads in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, HeadEntry)> {
        self.heads.iter().map(|(name, &entry)| (name.as_str(), entry))
    }

    pub fn names(&self) -> Vec<&str> {
        self.heads.keys().map(String::as_str).collect()
    }

    /// Feed one discovered feature, in discovery order.
    ///
    /// Non-features are ignored.
    pub fn on_feature(&mut self, cache: &ModuleCache, id: ModuleId, forced: bool) {
        let record = cache.get(id);
        if record.role() != ModuleRole::Feature {
            return;
        }
        let Some(closure) = record.closure() else {
            return;
        };

        // Evict covered heads; forced heads stay regardless.
        self.heads.retain(|name, entry| {
            let keep = entry.forced || !closure.all.contains(&entry.id);
            if !keep {
                debug!(head = name.as_str(), by = record.name(), "head covered");
            }
            keep
        });

        if let Some(existing) = self.heads.get_mut(record.name()) {
            existing.forced |= forced;
            return;
        }

        let covered = self.heads.values().any(|entry| {
            cache
                .get(entry.id)
                .closure()
                .is_some_and(|c| c.all.contains(&id))
        });
        if forced || !covered {
            debug!(head = record.name(), forced, "head added");
            self.heads
                .insert(record.name().to_string(), HeadEntry { id, forced });
        }
    }
}
