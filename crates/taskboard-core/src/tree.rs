//! The live status tree
//!
//! Maps the daemon's flat stream of `(id, delta)` task updates onto a
//! hierarchical namespace of directories and actions, with derived status
//! rollups and parsed diagnostic children.
//!
//! Nodes live in an arena (`Vec<Node>` indexed by [`NodeId`]) with parent
//! back-references stored as ids, so the tree is strictly owning top-down
//! while rollup recomputation can still climb upward. Actions are never
//! physically removed from their parent's slot list: a deleted action keeps
//! its position so a later re-run of the same verb can reuse it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::diagnostic::{DiagnosticLine, Severity};
use crate::files::{FileResolver, NullResolver, Problem, ProblemSink};
use crate::protocol::{TaskState, TaskUpdate};

/// Parsed-line cap per action, to bound pathological log output
pub const MAX_PARSED_LINES: usize = 100;

/// Index of a node in the tree arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Display classification of a node, as consumed by a view
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    // Directories (derived from children only)
    Directory,
    DirectoryRunning,
    DirectoryWithErrors,
    DirectoryWithErrorsIgnored,

    // Actions (mirror the task lifecycle)
    Deleted,
    Pending,
    Running,
    Done,
    Passed,
    Failed,
    FailedIgnored,
    Blocked,

    // Log lines (mirror diagnostic severity)
    Info,
    Warning,
    Error,
}

/// Internal rollup classification of a directory.
///
/// The ignored-errors display variant is derived from the directory's own
/// ignore-failure flag at read time; propagation upward is unaffected by
/// the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DirRollup {
    #[default]
    Clean,
    Running,
    Errors,
}

#[derive(Debug)]
struct Node {
    parent: Option<NodeId>,
    ignore_failure: bool,
    kind: NodeKind,
}

impl Node {
    fn root() -> Self {
        Node {
            parent: None,
            ignore_failure: false,
            kind: NodeKind::Directory(DirectoryNode::named("")),
        }
    }
}

#[derive(Debug)]
enum NodeKind {
    Directory(DirectoryNode),
    Action(ActionNode),
    LogLine(LogLineNode),
}

#[derive(Debug)]
struct DirectoryNode {
    name: String,
    rollup: DirRollup,
    /// name → ordered slot list; multiple actions may share a name over time
    actions: BTreeMap<String, Vec<NodeId>>,
    /// path segment → child directory
    subdirs: BTreeMap<String, NodeId>,
}

impl DirectoryNode {
    fn named(name: &str) -> Self {
        DirectoryNode {
            name: name.to_string(),
            rollup: DirRollup::default(),
            actions: BTreeMap::new(),
            subdirs: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
struct ActionNode {
    /// Last path segment of the noun; stable for the life of the slot
    name: String,
    state: TaskState,
    noun: Option<String>,
    verb: Option<String>,
    silent: bool,
    /// File the action operates on, resolved from the noun
    file: Option<PathBuf>,
    /// Log text not yet terminated by a settled state
    leftover: String,
    /// Parsed log lines, in arrival order
    lines: Vec<NodeId>,
    /// Problems offered to the sink for the current run, kept for retraction
    problems: Vec<Problem>,
}

impl ActionNode {
    fn named(name: &str) -> Self {
        ActionNode {
            name: name.to_string(),
            state: TaskState::default(),
            noun: None,
            verb: None,
            silent: false,
            file: None,
            leftover: String::new(),
            lines: Vec::new(),
            problems: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct LogLineNode {
    line: DiagnosticLine,
    /// Authoritative position among siblings
    index: usize,
    /// Resolved file for open-in-editor, if the filename was found on disk
    file: Option<PathBuf>,
}

/// The incremental tree model
pub struct StatusTree {
    nodes: Vec<Node>,
    resolver: Arc<dyn FileResolver>,
    sink: Option<Arc<dyn ProblemSink>>,
}

impl Default for StatusTree {
    fn default() -> Self {
        Self::new(Arc::new(NullResolver), None)
    }
}

impl StatusTree {
    pub fn new(resolver: Arc<dyn FileResolver>, sink: Option<Arc<dyn ProblemSink>>) -> Self {
        StatusTree {
            nodes: vec![Node::root()],
            resolver,
            sink,
        }
    }

    /// The root directory. Its id survives `clear()`.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    // ─────────────────────────────────────────────────────────────
    // Update application
    // ─────────────────────────────────────────────────────────────

    /// Place a first-seen task in the tree by its noun path and apply its
    /// initial update. Reuses a deleted slot of the same name and verb when
    /// one exists; otherwise appends a new slot.
    pub fn new_action(&mut self, path: &str, update: &TaskUpdate) -> NodeId {
        let mut dir = self.root();
        let mut rest = path;
        while let Some((segment, suffix)) = rest.split_once('/') {
            dir = self.subdir(dir, segment);
            rest = suffix;
        }
        self.new_action_in(dir, rest, update)
    }

    /// Apply one partial update to an action. Absent fields leave the
    /// current value untouched. Returns false once the action is logically
    /// deleted, at which point the caller should drop its id mapping.
    pub fn apply_update(&mut self, id: NodeId, update: &TaskUpdate) -> bool {
        if let Some(state) = update.state {
            self.action_mut(id).state = state;
            // A restart (or deletion) invalidates all prior diagnostics.
            if matches!(
                state,
                TaskState::Deleted | TaskState::Pending | TaskState::Running
            ) {
                self.clear_log(id);
            }
            if let Some(parent) = self.nodes[id.0].parent {
                self.refresh_state(parent);
            }
        }

        if let Some(noun) = &update.noun {
            let file = self.resolver.resolve(noun);
            let action = self.action_mut(id);
            action.noun = Some(noun.clone());
            action.file = file;
        }

        if let Some(verb) = &update.verb {
            self.action_mut(id).verb = Some(verb.clone());
        }

        if let Some(silent) = update.silent {
            self.action_mut(id).silent = silent;
        }

        if let Some(log) = &update.log {
            self.action_mut(id).leftover.push_str(log);
        }

        // Only a settled task has complete diagnostics worth parsing.
        if let Some(state) = update.state {
            if state.is_terminal() {
                self.flush_log(id);
            }
        }

        self.action(id).state != TaskState::Deleted
    }

    /// Reassign a deleted slot to a newly observed task of the same verb.
    /// Fails without side effects when the slot is live or the verbs differ.
    pub fn try_reuse(&mut self, id: NodeId, update: &TaskUpdate) -> bool {
        let action = self.action(id);
        if action.state != TaskState::Deleted || action.verb.as_deref() != update.verb.as_deref() {
            return false;
        }

        self.action_mut(id).silent = false;
        self.apply_update(id, update);
        true
    }

    /// Recompute a directory's rollup from its children and propagate
    /// upward exactly as far as the stored value changes.
    pub fn refresh_state(&mut self, id: NodeId) {
        let computed = self.compute_rollup(id);
        if self.directory(id).rollup == computed {
            return;
        }
        self.directory_mut(id).rollup = computed;
        if let Some(parent) = self.nodes[id.0].parent {
            self.refresh_state(parent);
        }
    }

    /// Toggle ignore-failure on a node, refreshing the owning directory's
    /// rollup classification when the flag actually changes.
    pub fn set_ignore_failure(&mut self, id: NodeId, enabled: bool) {
        if self.nodes[id.0].ignore_failure == enabled {
            return;
        }
        self.nodes[id.0].ignore_failure = enabled;

        match &self.nodes[id.0].kind {
            NodeKind::Directory(_) => self.refresh_state(id),
            NodeKind::Action(_) => {
                if let Some(parent) = self.nodes[id.0].parent {
                    self.refresh_state(parent);
                }
            }
            NodeKind::LogLine(_) => {}
        }
    }

    /// Full resync reset: retract all offered problems, drop everything,
    /// and return the root to its default status.
    pub fn clear(&mut self) {
        if let Some(sink) = self.sink.as_deref() {
            for node in &self.nodes {
                if let NodeKind::Action(action) = &node.kind {
                    for problem in &action.problems {
                        sink.retract(problem);
                    }
                }
            }
        }
        self.nodes.clear();
        self.nodes.push(Node::root());
    }

    // ─────────────────────────────────────────────────────────────
    // Read side (view contract)
    // ─────────────────────────────────────────────────────────────

    pub fn status(&self, id: NodeId) -> NodeStatus {
        let node = &self.nodes[id.0];
        match &node.kind {
            NodeKind::Directory(dir) => match dir.rollup {
                DirRollup::Clean => NodeStatus::Directory,
                DirRollup::Running => NodeStatus::DirectoryRunning,
                DirRollup::Errors if node.ignore_failure => NodeStatus::DirectoryWithErrorsIgnored,
                DirRollup::Errors => NodeStatus::DirectoryWithErrors,
            },
            NodeKind::Action(action) => match action.state {
                TaskState::Failed if node.ignore_failure => NodeStatus::FailedIgnored,
                TaskState::Deleted => NodeStatus::Deleted,
                TaskState::Pending => NodeStatus::Pending,
                TaskState::Running => NodeStatus::Running,
                TaskState::Done => NodeStatus::Done,
                TaskState::Passed => NodeStatus::Passed,
                TaskState::Failed => NodeStatus::Failed,
                TaskState::Blocked => NodeStatus::Blocked,
            },
            NodeKind::LogLine(line) => match line.line.severity {
                Severity::Error => NodeStatus::Error,
                Severity::Warning => NodeStatus::Warning,
                Severity::Note | Severity::Prefix => NodeStatus::Info,
            },
        }
    }

    pub fn label(&self, id: NodeId) -> String {
        match &self.nodes[id.0].kind {
            NodeKind::Directory(dir) => dir.name.clone(),
            NodeKind::Action(action) => match &action.verb {
                Some(verb) => format!("{verb}: {}", action.name),
                None => action.name.clone(),
            },
            NodeKind::LogLine(line) => line.line.full_text.clone(),
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn ignore_failure(&self, id: NodeId) -> bool {
        self.nodes[id.0].ignore_failure
    }

    /// Children as a view should enumerate them: for a directory, every
    /// non-silent action across all slot lists followed by every
    /// subdirectory; for an action, its log lines in index order.
    pub fn visible_children(&self, id: NodeId) -> Vec<NodeId> {
        match &self.nodes[id.0].kind {
            NodeKind::Directory(dir) => {
                let mut children = Vec::new();
                for slots in dir.actions.values() {
                    for &slot in slots {
                        if !self.is_silent(slot) {
                            children.push(slot);
                        }
                    }
                }
                children.extend(dir.subdirs.values().copied());
                children
            }
            NodeKind::Action(action) => action.lines.clone(),
            NodeKind::LogLine(_) => Vec::new(),
        }
    }

    /// An action is hidden only while it is flagged silent, has produced no
    /// diagnostics, and has not failed. Failures always surface.
    pub fn is_silent(&self, id: NodeId) -> bool {
        let action = self.action(id);
        action.silent && action.lines.is_empty() && action.state != TaskState::Failed
    }

    pub fn task_state(&self, id: NodeId) -> Option<TaskState> {
        match &self.nodes[id.0].kind {
            NodeKind::Action(action) => Some(action.state),
            _ => None,
        }
    }

    pub fn noun(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Action(action) => action.noun.as_deref(),
            _ => None,
        }
    }

    /// Resolved on-disk file for open-in-editor: an action's noun file, or
    /// a log line's diagnostic file.
    pub fn file(&self, id: NodeId) -> Option<&Path> {
        match &self.nodes[id.0].kind {
            NodeKind::Action(action) => action.file.as_deref(),
            NodeKind::LogLine(line) => line.file.as_deref(),
            NodeKind::Directory(_) => None,
        }
    }

    /// Structured diagnostic record of a log line node
    pub fn diagnostic(&self, id: NodeId) -> Option<&DiagnosticLine> {
        match &self.nodes[id.0].kind {
            NodeKind::LogLine(line) => Some(&line.line),
            _ => None,
        }
    }

    pub fn log_line_index(&self, id: NodeId) -> Option<usize> {
        match &self.nodes[id.0].kind {
            NodeKind::LogLine(line) => Some(line.index),
            _ => None,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────

    fn subdir(&mut self, dir: NodeId, name: &str) -> NodeId {
        if let Some(&existing) = self.directory(dir).subdirs.get(name) {
            return existing;
        }
        let child = self.push_node(Some(dir), NodeKind::Directory(DirectoryNode::named(name)));
        self.directory_mut(dir)
            .subdirs
            .insert(name.to_string(), child);
        child
    }

    fn new_action_in(&mut self, dir: NodeId, name: &str, update: &TaskUpdate) -> NodeId {
        // Linear reuse scan, bounded by the number of historical runs under
        // this name.
        let slots = self
            .directory(dir)
            .actions
            .get(name)
            .cloned()
            .unwrap_or_default();
        for slot in slots {
            if self.try_reuse(slot, update) {
                return slot;
            }
        }

        let action = self.push_node(Some(dir), NodeKind::Action(ActionNode::named(name)));
        self.directory_mut(dir)
            .actions
            .entry(name.to_string())
            .or_default()
            .push(action);
        self.apply_update(action, update);
        action
    }

    fn compute_rollup(&self, id: NodeId) -> DirRollup {
        let dir = self.directory(id);
        let mut errors = false;

        for &sub in dir.subdirs.values() {
            match self.directory(sub).rollup {
                DirRollup::Running => return DirRollup::Running,
                DirRollup::Errors => errors = true,
                DirRollup::Clean => {}
            }
        }
        for slots in dir.actions.values() {
            for &slot in slots {
                // Raw failure detection; ignore-failure only changes how the
                // flagged node itself is classified, never what propagates.
                match self.action(slot).state {
                    TaskState::Running => return DirRollup::Running,
                    TaskState::Failed => errors = true,
                    _ => {}
                }
            }
        }

        if errors {
            DirRollup::Errors
        } else {
            DirRollup::Clean
        }
    }

    fn clear_log(&mut self, id: NodeId) {
        let action = self.action_mut(id);
        action.leftover.clear();
        // Line nodes are orphaned in the arena until the next full clear;
        // they are unreachable from any traversal.
        action.lines.clear();
        let problems = std::mem::take(&mut action.problems);

        if let Some(sink) = self.sink.as_deref() {
            for problem in &problems {
                sink.retract(problem);
            }
        }
    }

    fn flush_log(&mut self, id: NodeId) {
        let buffer = std::mem::take(&mut self.action_mut(id).leftover);
        for text in buffer.lines() {
            if self.action(id).lines.len() >= MAX_PARSED_LINES {
                debug!("action log exceeds {MAX_PARSED_LINES} lines, dropping the rest");
                break;
            }
            self.push_log_line(id, text);
        }
    }

    fn push_log_line(&mut self, action_id: NodeId, text: &str) {
        let parsed = DiagnosticLine::parse(text);
        let file = parsed
            .filename
            .as_deref()
            .and_then(|name| self.resolver.resolve(name));
        let index = self.action(action_id).lines.len();

        // Offer an editor annotation when there is something to anchor it to.
        if matches!(parsed.severity, Severity::Error | Severity::Warning) {
            if let (Some(file), Some(line)) = (&file, parsed.line) {
                let problem = Problem {
                    file: file.clone(),
                    line,
                    severity: parsed.severity,
                    message: parsed.message.clone(),
                };
                if let Some(sink) = self.sink.as_deref() {
                    sink.offer(&problem);
                }
                self.action_mut(action_id).problems.push(problem);
            }
        }

        let node = self.push_node(
            Some(action_id),
            NodeKind::LogLine(LogLineNode {
                line: parsed,
                index,
                file,
            }),
        );
        self.action_mut(action_id).lines.push(node);
    }

    fn push_node(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            ignore_failure: false,
            kind,
        });
        id
    }

    fn directory(&self, id: NodeId) -> &DirectoryNode {
        match &self.nodes[id.0].kind {
            NodeKind::Directory(dir) => dir,
            _ => panic!("node {id:?} is not a directory"),
        }
    }

    fn directory_mut(&mut self, id: NodeId) -> &mut DirectoryNode {
        match &mut self.nodes[id.0].kind {
            NodeKind::Directory(dir) => dir,
            _ => panic!("node {id:?} is not a directory"),
        }
    }

    fn action(&self, id: NodeId) -> &ActionNode {
        match &self.nodes[id.0].kind {
            NodeKind::Action(action) => action,
            _ => panic!("node {id:?} is not an action"),
        }
    }

    fn action_mut(&mut self, id: NodeId) -> &mut ActionNode {
        match &mut self.nodes[id.0].kind {
            NodeKind::Action(action) => action,
            _ => panic!("node {id:?} is not an action"),
        }
    }
}
