//! Per-frame callback registry

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::store::Store;

use super::FrameContext;

/// Per-frame callback; receives the frame context and the delta in seconds
pub type FrameCallback = Rc<RefCell<dyn FnMut(&mut FrameContext<'_>, f32)>>;

/// When a subscription runs relative to the default render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Before the render
    Before,
    /// After the render
    After,
}

struct Entry {
    id: u64,
    stage: Stage,
    priority: i32,
    callback: FrameCallback,
}

pub(crate) struct Registry {
    entries: Vec<Entry>,
    next_id: u64,
    store: Store,
}

impl Registry {
    pub(crate) fn new(store: Store) -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
            store,
        }
    }

    /// Insert after every entry with a lower or equal priority
    pub(crate) fn insert(&mut self, stage: Stage, priority: i32, callback: FrameCallback) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        if stage == Stage::Before && priority != 0 {
            let claimed = self.priority_claims();
            if claimed > 0 {
                log::warn!(
                    "PriorityConflictWarning: {} subscriptions now claim a non-zero priority; \
                     they run in priority order and must agree on who renders",
                    claimed + 1
                );
            }
            self.store.adjust_priority(1);
        }

        let index = self
            .entries
            .iter()
            .position(|e| e.priority > priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(index, Entry { id, stage, priority, callback });
        id
    }

    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let Some(index) = self.entries.iter().position(|e| e.id == id) else {
            return false;
        };
        let entry = self.entries.remove(index);
        if entry.stage == Stage::Before && entry.priority != 0 {
            self.store.adjust_priority(-1);
        }
        true
    }

    pub(crate) fn contains(&self, id: u64) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Callbacks of one stage in execution order
    pub(crate) fn snapshot(&self, stage: Stage) -> Vec<(u64, FrameCallback)> {
        self.entries
            .iter()
            .filter(|e| e.stage == stage)
            .map(|e| (e.id, e.callback.clone()))
            .collect()
    }

    /// Pre-render entries that take over the default render
    pub(crate) fn priority_claims(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.stage == Stage::Before && e.priority != 0)
            .count()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        let ids: Vec<u64> = self.entries.iter().map(|e| e.id).collect();
        for id in ids {
            self.remove(id);
        }
    }
}

/// Registration returned by `use_frame` / `use_after_frame`
#[must_use = "keep the subscription to unsubscribe it later"]
pub struct FrameSubscription {
    id: u64,
    registry: Weak<RefCell<Registry>>,
}

impl FrameSubscription {
    pub(crate) fn new(id: u64, registry: &Rc<RefCell<Registry>>) -> Self {
        Self {
            id,
            registry: Rc::downgrade(registry),
        }
    }

    /// Whether the callback is still registered
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|r| r.borrow().contains(self.id))
    }

    /// Remove the callback; a callback unsubscribed mid-tick does not run
    /// later in that tick
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.borrow_mut().remove(self.id);
        }
    }
}

impl fmt::Debug for FrameSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSubscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
