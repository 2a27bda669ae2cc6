//! Per-scope run lock for optimization passes
//!
//! A global pass excludes every other pass; owner passes exclude a global
//! pass and another pass for the same owner. Acquisition never waits: a
//! conflicting trigger is dropped, not queued.

use std::collections::HashSet;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// What a pass covers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "owner_id", rename_all = "snake_case")]
pub enum RunScope {
    Global,
    Owner(String),
}

impl RunScope {
    pub fn from_owner(owner_id: Option<&str>) -> Self {
        match owner_id {
            Some(owner) => RunScope::Owner(owner.to_string()),
            None => RunScope::Global,
        }
    }

    pub fn owner_id(&self) -> Option<&str> {
        match self {
            RunScope::Global => None,
            RunScope::Owner(owner) => Some(owner),
        }
    }

    fn conflicts_with(&self, other: &RunScope) -> bool {
        match (self, other) {
            (RunScope::Global, _) | (_, RunScope::Global) => true,
            (RunScope::Owner(a), RunScope::Owner(b)) => a == b,
        }
    }
}

impl fmt::Display for RunScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunScope::Global => f.write_str("global"),
            RunScope::Owner(owner) => write!(f, "owner:{owner}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct RunLock {
    active: Mutex<HashSet<RunScope>>,
}

impl RunLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `scope`, or `None` if a conflicting pass is running
    pub fn try_acquire(&self, scope: RunScope) -> Option<RunGuard<'_>> {
        let mut active = self.active.lock();
        if active.iter().any(|running| running.conflicts_with(&scope)) {
            return None;
        }
        active.insert(scope.clone());
        Some(RunGuard { lock: self, scope })
    }

    /// Scopes with a pass in progress
    pub fn running(&self) -> Vec<RunScope> {
        self.active.lock().iter().cloned().collect()
    }

    pub fn is_idle(&self) -> bool {
        self.active.lock().is_empty()
    }
}

/// Releases the scope on drop
#[derive(Debug)]
pub struct RunGuard<'a> {
    lock: &'a RunLock,
    scope: RunScope,
}

impl RunGuard<'_> {
    pub fn scope(&self) -> &RunScope {
        &self.scope
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.lock.active.lock().remove(&self.scope);
    }
}
