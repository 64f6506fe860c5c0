//! Headless mode - JSON event output for scripting and E2E testing
//!
//! Without a UI attached, each coalesced refresh is emitted as one NDJSON
//! line on stdout: a full snapshot of the visible status tree. Scripts get
//! a parseable stream instead of terminal escape codes.
//!
//! # Example Output
//!
//! ```json
//! {"event":"snapshot","project_root":"/work/proj","tasks":[{"label":"src","status":"directory_with_errors","children":[...]}],"timestamp":1704700001000}
//! ```

use std::io::{self, Write};

use chrono::Utc;
use serde::Serialize;
use taskboard_core::prelude::*;
use taskboard_core::{NodeId, NodeStatus, StatusTree};

/// Events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Full snapshot of the visible tree after a refresh
    Snapshot {
        project_root: Option<String>,
        tasks: Vec<NodeSnapshot>,
        timestamp: i64,
    },

    /// Error surfaced to the operator
    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },
}

/// One visible node, with its visible children nested below it
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub label: String,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

impl HeadlessEvent {
    /// Emit this event to stdout as one NDJSON line
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write headless event to stdout: {}", e);
            return;
        }

        // Flush to ensure immediate output
        if let Err(e) = stdout.flush() {
            error!("Failed to flush headless stdout: {}", e);
        }
    }

    /// Get current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    pub fn snapshot(tree: &StatusTree, project_root: Option<&str>) -> Self {
        Self::Snapshot {
            project_root: project_root.map(str::to_string),
            tasks: snapshot_children(tree, tree.root()),
            timestamp: Self::now(),
        }
    }

    pub fn error(message: String, fatal: bool) -> Self {
        Self::Error {
            message,
            fatal,
            timestamp: Self::now(),
        }
    }
}

fn snapshot_children(tree: &StatusTree, id: NodeId) -> Vec<NodeSnapshot> {
    tree.visible_children(id)
        .into_iter()
        .map(|child| NodeSnapshot {
            label: tree.label(child),
            status: tree.status(child),
            children: snapshot_children(tree, child),
        })
        .collect()
}
