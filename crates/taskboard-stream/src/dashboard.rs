//! Shared dashboard state between the stream reader and the apply phase
//!
//! The update queue, the id → action identity map, and the tree itself are
//! the only state touched from two flows of control, so they live together
//! under a single mutex. The empty-check on enqueue and the drain on apply
//! happen under that same lock — a dispatch can otherwise be lost between
//! the test and the set. The change notification is always invoked with the
//! lock released so a slow view cannot stall the producer.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use taskboard_core::prelude::*;
use taskboard_core::{FileResolver, NodeId, ProblemSink, StatusTree, TaskUpdate};

/// Zero-argument notification invoked after each batch apply. Must tolerate
/// the view being torn down concurrently.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

struct DashboardInner {
    queue: VecDeque<TaskUpdate>,
    actions_by_id: HashMap<u64, NodeId>,
    tree: StatusTree,
    project_root: Option<String>,
}

/// The live dashboard model: status tree plus the bookkeeping that maps the
/// daemon's flat id stream onto it.
pub struct Dashboard {
    inner: Mutex<DashboardInner>,
    on_change: ChangeCallback,
}

impl Dashboard {
    pub fn new(
        resolver: Arc<dyn FileResolver>,
        sink: Option<Arc<dyn ProblemSink>>,
        on_change: ChangeCallback,
    ) -> Self {
        Dashboard {
            inner: Mutex::new(DashboardInner {
                queue: VecDeque::new(),
                actions_by_id: HashMap::new(),
                tree: StatusTree::new(resolver, sink),
                project_root: None,
            }),
            on_change,
        }
    }

    fn lock(&self) -> MutexGuard<'_, DashboardInner> {
        // The lock is only ever held for synchronous tree mutation; a
        // poisoning panic there leaves no state worth salvaging.
        self.inner.lock().expect("dashboard state poisoned")
    }

    /// Append a decoded update to the queue. Returns true when the queue
    /// transitioned from empty to non-empty — the edge on which the caller
    /// must schedule exactly one dispatch.
    pub fn enqueue(&self, update: TaskUpdate) -> bool {
        let mut inner = self.lock();
        let was_empty = inner.queue.is_empty();
        inner.queue.push_back(update);
        was_empty
    }

    /// Drain the whole queue into the tree, then notify the view once.
    pub fn apply_pending(&self) {
        {
            let mut inner = self.lock();
            while let Some(update) = inner.queue.pop_front() {
                inner.apply(update);
            }
        }
        (self.on_change)();
    }

    /// Full reset on disconnect: the daemon replays complete state on
    /// reconnect, so nothing stale may survive. Notifies the view so it
    /// never shows the dead tree as current.
    pub fn clear_all(&self) {
        {
            let mut inner = self.lock();
            inner.queue.clear();
            inner.actions_by_id.clear();
            inner.tree.clear();
            inner.project_root = None;
        }
        (self.on_change)();
    }

    pub fn set_project_root(&self, root: String) {
        self.lock().project_root = Some(root);
    }

    /// Run a closure against the tree (and the last-seen project root)
    /// under the state lock. The closure must not block.
    pub fn with_tree<R>(&self, f: impl FnOnce(&StatusTree, Option<&str>) -> R) -> R {
        let inner = self.lock();
        f(&inner.tree, inner.project_root.as_deref())
    }

    /// Number of updates waiting to be applied
    pub fn pending_updates(&self) -> usize {
        self.lock().queue.len()
    }

    /// Number of live task ids currently mapped into the tree
    pub fn tracked_actions(&self) -> usize {
        self.lock().actions_by_id.len()
    }
}

impl DashboardInner {
    fn apply(&mut self, update: TaskUpdate) {
        match self.actions_by_id.get(&update.id) {
            None => {
                // Every id's first appearance must carry a noun to place it
                // in the tree; anything else is a malformed update.
                let Some(noun) = update.noun.clone() else {
                    warn!("update for unknown task id {} had no noun", update.id);
                    return;
                };
                let node = self.tree.new_action(&noun, &update);
                self.actions_by_id.insert(update.id, node);
            }
            Some(&node) => {
                if !self.tree.apply_update(node, &update) {
                    self.actions_by_id.remove(&update.id);
                }
            }
        }
    }
}
