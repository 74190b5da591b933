use chrono::{DateTime, Utc};
use serde::Serialize;

/// Classes of process resources that show up in snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandleKind {
    Timer,
    Socket,
    File,
    Other,
}

impl HandleKind {
    /// Whether an outstanding handle of this kind keeps a test process
    /// alive past suite completion.
    pub fn keeps_process_alive(&self) -> bool {
        matches!(self, HandleKind::Timer | HandleKind::Socket)
    }
}

/// One outstanding handle at snapshot time.
///
/// Identity for diffing purposes is the `id` string; two snapshots are
/// compared structurally by id, never by reference.
#[derive(Debug, Clone, Serialize)]
pub struct HandleDescriptor {
    pub id: String,
    pub kind: HandleKind,
    /// Creation call stack, present only when diagnostics were enabled at
    /// capture time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_stack: Option<String>,
}

/// Immutable view of the outstanding handles at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct HandleSnapshot {
    pub taken_at: DateTime<Utc>,
    pub handles: Vec<HandleDescriptor>,
}

impl HandleSnapshot {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Handles present in `self` but absent from `baseline`, by id.
    pub fn diff(&self, baseline: &HandleSnapshot) -> Vec<HandleDescriptor> {
        let known: std::collections::HashSet<&str> =
            baseline.handles.iter().map(|h| h.id.as_str()).collect();
        self.handles
            .iter()
            .filter(|h| !known.contains(h.id.as_str()))
            .cloned()
            .collect()
    }
}
