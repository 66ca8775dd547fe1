//! Group registry
//!
//! Deduplicates equivalent path configurations: the first registration of a
//! key runs the full analysis, later registrations of the same key share the
//! stored outcome. The registry owns the module cache, so classification
//! work crosses group boundaries for free.

use indexmap::IndexMap;
use tracing::{debug, info};

use conflux_core::{EngineOptions, ModuleCache, ModuleFilter, ModuleLoader, NoExclusions};

use crate::error::RegistryError;
use crate::group::{Group, GroupConfig, GroupKey};
use crate::unify::{unify_groups, Unification};

/// Handle of a registered group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(pub(crate) usize);

impl GroupId {
    pub fn index(self) -> usize {
        self.0
    }
}

pub struct GroupRegistry {
    options: EngineOptions,
    loader: Box<dyn ModuleLoader>,
    filter: Box<dyn ModuleFilter>,
    cache: ModuleCache,
    groups: Vec<Group>,
    by_key: IndexMap<GroupKey, GroupId>,
    closed: bool,
}

impl GroupRegistry {
    pub fn new(loader: Box<dyn ModuleLoader>) -> Self {
        Self {
            options: EngineOptions::default(),
            loader,
            filter: Box::new(NoExclusions),
            cache: ModuleCache::new(),
            groups: Vec::new(),
            by_key: IndexMap::new(),
            closed: false,
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_filter(mut self, filter: Box<dyn ModuleFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Register a configuration, running its analysis on first sight of the
    /// equivalence key. Analysis failures are stored on the group, not
    /// returned here; only registering after close errors.
    pub fn register(&mut self, config: GroupConfig) -> Result<GroupId, RegistryError> {
        if self.closed {
            return Err(RegistryError::RegistrationsClosed);
        }
        let key = config.key();
        if let Some(&id) = self.by_key.get(&key) {
            info!(
                group = %config.path().display(),
                "equivalent configuration shares existing analysis"
            );
            self.groups[id.0].share(config);
            return Ok(id);
        }
        let group = Group::analyze(
            config,
            &mut self.cache,
            self.loader.as_ref(),
            self.filter.as_ref(),
            &self.options,
        );
        let id = GroupId(self.groups.len());
        self.groups.push(group);
        self.by_key.insert(key, id);
        Ok(id)
    }

    /// Terminal call; idempotent. No `register` is permitted afterwards.
    pub fn close_registrations(&mut self) {
        if !self.closed {
            self.closed = true;
            info!(groups = self.groups.len(), "registrations closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[id.0]
    }

    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &Group)> {
        self.groups
            .iter()
            .enumerate()
            .map(|(index, group)| (GroupId(index), group))
    }

    pub fn cache(&self) -> &ModuleCache {
        &self.cache
    }

    /// Decide whether one group's composition-relevant types cover all
    /// others, synthesizing a unified group when none does. Failed groups
    /// do not participate.
    pub fn unify(&self) -> Unification {
        let participants: Vec<(GroupId, &Group)> = self
            .groups()
            .filter(|(_, group)| group.succeeded())
            .collect();
        let dropped = self.groups.len() - participants.len();
        if dropped > 0 {
            debug!(dropped, "failed groups do not participate in unification");
        }
        unify_groups(&participants)
    }
}
