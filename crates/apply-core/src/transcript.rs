//! Transcript: the ordered, append-only record of one run.
//!
//! The transcript is the decision engine's working context. Insertion order
//! is the causal order of the run. Invariant: every `Decision` entry is
//! followed by exactly one `Observation` (its result) before the next
//! decision is requested; [`Transcript::awaiting_result`] exposes whether
//! that observation is still owed.

use serde::{Deserialize, Serialize};

use crate::tools::ToolCall;

/// One entry in the transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEntry {
    /// A page snapshot, tool result, or other input fed to the decision engine.
    Observation {
        /// Observation text.
        text: String,
        /// Whether this observation reports a failure the engine should react to.
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    /// A tool call chosen by the decision engine.
    Decision {
        /// The chosen call.
        call: ToolCall,
    },
    /// A loop-internal annotation (e.g. an intermediate status report).
    SystemNote {
        /// Note text.
        text: String,
    },
}

impl TranscriptEntry {
    /// Build an observation entry.
    #[must_use]
    pub fn observation(text: impl Into<String>) -> Self {
        Self::Observation {
            text: text.into(),
            is_error: None,
        }
    }

    /// Build an observation entry reporting a failure.
    #[must_use]
    pub fn error_observation(text: impl Into<String>) -> Self {
        Self::Observation {
            text: text.into(),
            is_error: Some(true),
        }
    }

    /// Build a decision entry.
    #[must_use]
    pub fn decision(call: ToolCall) -> Self {
        Self::Decision { call }
    }

    /// Build a system note entry.
    #[must_use]
    pub fn system_note(text: impl Into<String>) -> Self {
        Self::SystemNote { text: text.into() }
    }
}

/// Append-only ordered sequence of entries for one run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    /// Create an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Entries are never removed or reordered.
    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    /// All entries in causal order.
    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the transcript is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the most recent decision is still missing its result
    /// observation. The loop must not request another decision while this
    /// is true.
    #[must_use]
    pub fn awaiting_result(&self) -> bool {
        for entry in self.entries.iter().rev() {
            match entry {
                TranscriptEntry::Decision { .. } => return true,
                TranscriptEntry::Observation { .. } => return false,
                TranscriptEntry::SystemNote { .. } => {}
            }
        }
        false
    }

    /// Iterate over the decisions in order.
    pub fn decisions(&self) -> impl Iterator<Item = &ToolCall> {
        self.entries.iter().filter_map(|e| match e {
            TranscriptEntry::Decision { call } => Some(call),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn call(name: &str) -> ToolCall {
        ToolCall::new(name, Map::new())
    }

    #[test]
    fn push_preserves_order() {
        let mut t = Transcript::new();
        t.push(TranscriptEntry::observation("page"));
        t.push(TranscriptEntry::decision(call("click")));
        t.push(TranscriptEntry::observation("Clicked: Apply"));
        assert_eq!(t.len(), 3);
        assert!(matches!(
            t.entries()[1],
            TranscriptEntry::Decision { .. }
        ));
    }

    #[test]
    fn awaiting_result_after_decision() {
        let mut t = Transcript::new();
        assert!(!t.awaiting_result());

        t.push(TranscriptEntry::observation("page"));
        assert!(!t.awaiting_result());

        t.push(TranscriptEntry::decision(call("click")));
        assert!(t.awaiting_result());

        t.push(TranscriptEntry::observation("Clicked: Apply"));
        assert!(!t.awaiting_result());
    }

    #[test]
    fn system_note_does_not_satisfy_pending_decision() {
        let mut t = Transcript::new();
        t.push(TranscriptEntry::decision(call("report_status")));
        t.push(TranscriptEntry::system_note("status: filling form"));
        assert!(t.awaiting_result());

        t.push(TranscriptEntry::observation("Status sent"));
        assert!(!t.awaiting_result());
    }

    #[test]
    fn decisions_iterates_in_order() {
        let mut t = Transcript::new();
        t.push(TranscriptEntry::decision(call("goto")));
        t.push(TranscriptEntry::observation("ok"));
        t.push(TranscriptEntry::decision(call("fill")));
        t.push(TranscriptEntry::observation("ok"));

        let names: Vec<&str> = t.decisions().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["goto", "fill"]);
    }

    #[test]
    fn entry_serde_tagging() {
        let entry = TranscriptEntry::error_observation("Element not found");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "observation");
        assert_eq!(json["is_error"], true);

        let note = TranscriptEntry::system_note("debug mode active");
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["kind"], "system_note");
    }
}
