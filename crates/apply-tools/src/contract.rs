//! The fixed tool contract.
//!
//! A closed set of 13 tool names. The contract is exhaustive: adding a tool
//! means adding a [`ToolName`] variant, and the compiler will point at every
//! match that needs updating.

use std::fmt;

use serde_json::{Map, json};

use apply_core::tools::{ToolDefinition, ToolParameterSchema};

/// Upper bound accepted by the `wait` tool, so a confused decision engine
/// cannot park a run on a single call.
pub const MAX_WAIT_SECONDS: u64 = 30;

/// The closed set of tool names the decision engine may invoke.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolName {
    /// Structured description of the current page.
    PageSnapshot,
    /// Navigate to a URL.
    Goto,
    /// Click an element.
    Click,
    /// Fill a form field.
    Fill,
    /// Select a dropdown option.
    SelectOption,
    /// Upload a configured document to a file input.
    UploadFile,
    /// Scroll the page.
    Scroll,
    /// Wait for the page to settle.
    Wait,
    /// Capture a screenshot artifact.
    Screenshot,
    /// Report the current page URL.
    GetCurrentUrl,
    /// Ask the human a question and wait for the answer.
    AskUser,
    /// Report intermediate status to the human. Does not terminate the run.
    ReportStatus,
    /// Terminate the run with a final status.
    Done,
}

/// All tool names, in the order they are presented to the decision engine.
pub const ALL_TOOLS: [ToolName; 13] = [
    ToolName::PageSnapshot,
    ToolName::Goto,
    ToolName::Click,
    ToolName::Fill,
    ToolName::SelectOption,
    ToolName::UploadFile,
    ToolName::Scroll,
    ToolName::Wait,
    ToolName::Screenshot,
    ToolName::GetCurrentUrl,
    ToolName::AskUser,
    ToolName::ReportStatus,
    ToolName::Done,
];

impl ToolName {
    /// The wire name of this tool.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PageSnapshot => "page_snapshot",
            Self::Goto => "goto",
            Self::Click => "click",
            Self::Fill => "fill",
            Self::SelectOption => "select_option",
            Self::UploadFile => "upload_file",
            Self::Scroll => "scroll",
            Self::Wait => "wait",
            Self::Screenshot => "screenshot",
            Self::GetCurrentUrl => "get_current_url",
            Self::AskUser => "ask_user",
            Self::ReportStatus => "report_status",
            Self::Done => "done",
        }
    }

    /// Look up a tool by wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        ALL_TOOLS.into_iter().find(|t| t.as_str() == name)
    }

    /// The schema for this tool.
    #[must_use]
    pub fn definition(self) -> ToolDefinition {
        let (description, parameters) = match self {
            Self::PageSnapshot => (
                "Return a structured description of the current page: visible text, \
                 form fields, and buttons.",
                ToolParameterSchema::empty(),
            ),
            Self::Goto => (
                "Navigate the browser to the given URL.",
                object(
                    &[("url", json!({"type": "string", "description": "The URL to navigate to."}))],
                    &["url"],
                ),
            ),
            Self::Click => (
                "Click an element identified by visible text, label, or CSS selector.",
                object(
                    &[(
                        "target",
                        json!({"type": "string", "description": "Button text, link text, or CSS selector."}),
                    )],
                    &["target"],
                ),
            ),
            Self::Fill => (
                "Fill a form field with a value. The field is identified by label, \
                 placeholder, name attribute, or CSS selector.",
                object(
                    &[
                        (
                            "field",
                            json!({"type": "string", "description": "Field label, placeholder, name, or CSS selector."}),
                        ),
                        (
                            "value",
                            json!({"type": "string", "description": "The value to type into the field."}),
                        ),
                    ],
                    &["field", "value"],
                ),
            ),
            Self::SelectOption => (
                "Select a dropdown option by its visible text or value.",
                object(
                    &[
                        (
                            "field",
                            json!({"type": "string", "description": "Dropdown label or selector."}),
                        ),
                        (
                            "value",
                            json!({"type": "string", "description": "Option text or value to select."}),
                        ),
                    ],
                    &["field", "value"],
                ),
            ),
            Self::UploadFile => (
                "Upload one of the configured documents to a file input field.",
                object(
                    &[
                        (
                            "field",
                            json!({"type": "string", "description": "File input label or selector."}),
                        ),
                        (
                            "document",
                            json!({
                                "type": "string",
                                "enum": ["resume", "cover_letter"],
                                "description": "Which document to upload."
                            }),
                        ),
                    ],
                    &["field", "document"],
                ),
            ),
            Self::Scroll => (
                "Scroll the page up or down.",
                object(
                    &[(
                        "direction",
                        json!({"type": "string", "enum": ["up", "down"], "description": "Scroll direction."}),
                    )],
                    &["direction"],
                ),
            ),
            Self::Wait => (
                "Wait for the page to finish loading, up to 30 seconds per call.",
                object(
                    &[(
                        "seconds",
                        json!({"type": "integer", "description": "Seconds to wait (default 2, max 30)."}),
                    )],
                    &[],
                ),
            ),
            Self::Screenshot => (
                "Capture a screenshot of the current page as an artifact.",
                object(
                    &[(
                        "label",
                        json!({"type": "string", "description": "Short label for the captured image."}),
                    )],
                    &[],
                ),
            ),
            Self::GetCurrentUrl => (
                "Return the current page URL.",
                ToolParameterSchema::empty(),
            ),
            Self::AskUser => (
                "Ask the human user a question and wait for their reply. Use this for \
                 every situational question (salary, work authorization, codes).",
                object(
                    &[
                        (
                            "question",
                            json!({"type": "string", "description": "The question to ask the user."}),
                        ),
                        (
                            "choices",
                            json!({
                                "type": "array",
                                "items": {"type": "string"},
                                "description": "Suggested answers, if the form offers fixed options."
                            }),
                        ),
                    ],
                    &["question"],
                ),
            ),
            Self::ReportStatus => (
                "Send an informational progress update to the user. No reply is \
                 expected and the run continues.",
                object(
                    &[
                        (
                            "status",
                            json!({"type": "string", "description": "Short status keyword (e.g. \"filling_form\")."}),
                        ),
                        (
                            "message",
                            json!({"type": "string", "description": "Human-readable progress message."}),
                        ),
                    ],
                    &["status"],
                ),
            ),
            Self::Done => (
                "Signal that the run is complete. Terminates the loop.",
                object(
                    &[
                        (
                            "status",
                            json!({
                                "type": "string",
                                "enum": ["applied", "skipped", "failed"],
                                "description": "Final outcome."
                            }),
                        ),
                        (
                            "reason",
                            json!({"type": "string", "description": "Short explanation of the outcome."}),
                        ),
                    ],
                    &["status"],
                ),
            ),
        };

        ToolDefinition {
            name: self.as_str().to_owned(),
            description: description.to_owned(),
            parameters,
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All tool schemas, for the decision request.
#[must_use]
pub fn definitions() -> Vec<ToolDefinition> {
    ALL_TOOLS.into_iter().map(ToolName::definition).collect()
}

fn object(props: &[(&str, serde_json::Value)], required: &[&str]) -> ToolParameterSchema {
    let mut map = Map::new();
    for (name, schema) in props {
        let _ = map.insert((*name).to_owned(), schema.clone());
    }
    ToolParameterSchema::object(map, required)
}
