//! Typed actions parsed from raw tool calls.
//!
//! Parsing is the validation step: a raw [`ToolCall`] either becomes an
//! [`Action`] or an error message. Invalid calls are never executed; the
//! loop folds the message back into the transcript so the decision engine
//! can correct itself.

use serde_json::{Map, Value};

use apply_core::tools::ToolCall;

use crate::contract::{MAX_WAIT_SECONDS, ToolName};

/// Which configured document an upload refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentKind {
    /// The resume/CV file.
    Resume,
    /// The cover letter file.
    CoverLetter,
}

impl DocumentKind {
    /// Wire name of the document kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resume => "resume",
            Self::CoverLetter => "cover_letter",
        }
    }
}

/// Scroll direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollDirection {
    /// Toward the top of the page.
    Up,
    /// Toward the bottom of the page.
    Down,
}

impl ScrollDirection {
    /// Wire name of the direction.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// A validated tool call, ready to dispatch.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Describe the current page.
    PageSnapshot,
    /// Navigate to a URL.
    Goto {
        /// Target URL.
        url: String,
    },
    /// Click an element.
    Click {
        /// Visible text, label, or CSS selector.
        target: String,
    },
    /// Fill a form field.
    Fill {
        /// Field identifier.
        field: String,
        /// Value to enter.
        value: String,
    },
    /// Select a dropdown option.
    SelectOption {
        /// Dropdown identifier.
        field: String,
        /// Option text or value.
        value: String,
    },
    /// Upload a configured document.
    UploadFile {
        /// File input identifier.
        field: String,
        /// Which document to upload.
        document: DocumentKind,
    },
    /// Scroll the page.
    Scroll {
        /// Direction to scroll.
        direction: ScrollDirection,
    },
    /// Wait for the page to settle.
    Wait {
        /// Seconds to wait (bounded).
        seconds: u64,
    },
    /// Capture a screenshot artifact.
    Screenshot {
        /// Label for the artifact.
        label: String,
    },
    /// Report the current URL.
    GetCurrentUrl,
    /// Route a question to the human.
    AskUser {
        /// Question text.
        question: String,
        /// Suggested answers, possibly empty.
        choices: Vec<String>,
    },
    /// Report intermediate status. Does not terminate the run.
    ReportStatus {
        /// Short status keyword.
        status: String,
        /// Optional human-readable message.
        message: Option<String>,
    },
    /// Terminate the run.
    Done {
        /// Final status as stated by the decision engine.
        status: String,
        /// Reason text, possibly empty.
        reason: String,
    },
}

impl Action {
    /// Parse and validate a raw tool call against the contract.
    ///
    /// Returns a correctable error message on any mismatch: unknown tool
    /// name, missing required argument, or wrong argument type.
    pub fn parse(call: &ToolCall) -> Result<Self, String> {
        let Some(name) = ToolName::parse(&call.name) else {
            return Err(format!("Unknown tool: {}", call.name));
        };
        let args = &call.arguments;

        match name {
            ToolName::PageSnapshot => Ok(Self::PageSnapshot),
            ToolName::Goto => Ok(Self::Goto {
                url: require_str(args, "goto", "url")?,
            }),
            ToolName::Click => Ok(Self::Click {
                target: require_str(args, "click", "target")?,
            }),
            ToolName::Fill => Ok(Self::Fill {
                field: require_str(args, "fill", "field")?,
                value: require_str(args, "fill", "value")?,
            }),
            ToolName::SelectOption => Ok(Self::SelectOption {
                field: require_str(args, "select_option", "field")?,
                value: require_str(args, "select_option", "value")?,
            }),
            ToolName::UploadFile => {
                let document = match require_str(args, "upload_file", "document")?.as_str() {
                    "resume" => DocumentKind::Resume,
                    "cover_letter" => DocumentKind::CoverLetter,
                    other => {
                        return Err(format!(
                            "Invalid value for upload_file.document: \"{other}\" \
                             (expected \"resume\" or \"cover_letter\")"
                        ));
                    }
                };
                Ok(Self::UploadFile {
                    field: require_str(args, "upload_file", "field")?,
                    document,
                })
            }
            ToolName::Scroll => {
                let direction = match require_str(args, "scroll", "direction")?.as_str() {
                    "up" => ScrollDirection::Up,
                    "down" => ScrollDirection::Down,
                    other => {
                        return Err(format!(
                            "Invalid value for scroll.direction: \"{other}\" \
                             (expected \"up\" or \"down\")"
                        ));
                    }
                };
                Ok(Self::Scroll { direction })
            }
            ToolName::Wait => {
                let seconds = match args.get("seconds") {
                    None | Some(Value::Null) => 2,
                    Some(Value::Number(n)) => n
                        .as_u64()
                        .ok_or_else(|| wrong_type("wait", "seconds", "non-negative integer"))?,
                    Some(_) => return Err(wrong_type("wait", "seconds", "integer")),
                };
                Ok(Self::Wait {
                    seconds: seconds.min(MAX_WAIT_SECONDS),
                })
            }
            ToolName::Screenshot => Ok(Self::Screenshot {
                label: optional_str(args, "screenshot", "label")?
                    .unwrap_or_else(|| "page".to_owned()),
            }),
            ToolName::GetCurrentUrl => Ok(Self::GetCurrentUrl),
            ToolName::AskUser => {
                let choices = match args.get("choices") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => {
                        let mut out = Vec::with_capacity(items.len());
                        for item in items {
                            match item.as_str() {
                                Some(s) => out.push(s.to_owned()),
                                None => {
                                    return Err(wrong_type(
                                        "ask_user",
                                        "choices",
                                        "array of strings",
                                    ));
                                }
                            }
                        }
                        out
                    }
                    Some(_) => return Err(wrong_type("ask_user", "choices", "array of strings")),
                };
                Ok(Self::AskUser {
                    question: require_str(args, "ask_user", "question")?,
                    choices,
                })
            }
            ToolName::ReportStatus => Ok(Self::ReportStatus {
                status: require_str(args, "report_status", "status")?,
                message: optional_str(args, "report_status", "message")?,
            }),
            ToolName::Done => Ok(Self::Done {
                status: require_str(args, "done", "status")?,
                reason: optional_str(args, "done", "reason")?.unwrap_or_default(),
            }),
        }
    }

    /// The contract name this action dispatches as.
    #[must_use]
    pub fn tool_name(&self) -> ToolName {
        match self {
            Self::PageSnapshot => ToolName::PageSnapshot,
            Self::Goto { .. } => ToolName::Goto,
            Self::Click { .. } => ToolName::Click,
            Self::Fill { .. } => ToolName::Fill,
            Self::SelectOption { .. } => ToolName::SelectOption,
            Self::UploadFile { .. } => ToolName::UploadFile,
            Self::Scroll { .. } => ToolName::Scroll,
            Self::Wait { .. } => ToolName::Wait,
            Self::Screenshot { .. } => ToolName::Screenshot,
            Self::GetCurrentUrl => ToolName::GetCurrentUrl,
            Self::AskUser { .. } => ToolName::AskUser,
            Self::ReportStatus { .. } => ToolName::ReportStatus,
            Self::Done { .. } => ToolName::Done,
        }
    }
}

fn require_str(args: &Map<String, Value>, tool: &str, param: &str) -> Result<String, String> {
    match args.get(param) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::String(_) | Value::Null) | None => {
            Err(format!("Missing required parameter: {tool}.{param}"))
        }
        Some(_) => Err(wrong_type(tool, param, "string")),
    }
}

fn optional_str(
    args: &Map<String, Value>,
    tool: &str,
    param: &str,
) -> Result<Option<String>, String> {
    match args.get(param) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(wrong_type(tool, param, "string")),
    }
}

fn wrong_type(tool: &str, param: &str, expected: &str) -> String {
    format!("Invalid type for parameter: {tool}.{param} (expected {expected})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: Value) -> ToolCall {
        let arguments = args.as_object().cloned().unwrap_or_default();
        ToolCall::new(name, arguments)
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let err = Action::parse(&call("submit", json!({}))).unwrap_err();
        assert!(err.contains("Unknown tool: submit"));
    }

    #[test]
    fn goto_requires_url() {
        let err = Action::parse(&call("goto", json!({}))).unwrap_err();
        assert!(err.contains("goto.url"));

        let action = Action::parse(&call("goto", json!({"url": "https://a.test"}))).unwrap();
        assert_eq!(
            action,
            Action::Goto {
                url: "https://a.test".into()
            }
        );
    }

    #[test]
    fn empty_string_counts_as_missing() {
        let err = Action::parse(&call("click", json!({"target": ""}))).unwrap_err();
        assert!(err.contains("Missing required parameter"));
    }

    #[test]
    fn wrong_type_is_reported() {
        let err = Action::parse(&call("fill", json!({"field": 42, "value": "x"}))).unwrap_err();
        assert!(err.contains("expected string"));
    }

    #[test]
    fn fill_parses_both_params() {
        let action =
            Action::parse(&call("fill", json!({"field": "email", "value": "a@b.c"}))).unwrap();
        assert_eq!(
            action,
            Action::Fill {
                field: "email".into(),
                value: "a@b.c".into()
            }
        );
    }

    #[test]
    fn upload_document_enum_is_enforced() {
        let err = Action::parse(&call(
            "upload_file",
            json!({"field": "cv", "document": "portfolio"}),
        ))
        .unwrap_err();
        assert!(err.contains("upload_file.document"));

        let action = Action::parse(&call(
            "upload_file",
            json!({"field": "cv", "document": "cover_letter"}),
        ))
        .unwrap();
        assert_eq!(
            action,
            Action::UploadFile {
                field: "cv".into(),
                document: DocumentKind::CoverLetter
            }
        );
    }

    #[test]
    fn scroll_direction_enum_is_enforced() {
        let err = Action::parse(&call("scroll", json!({"direction": "left"}))).unwrap_err();
        assert!(err.contains("scroll.direction"));
    }

    #[test]
    fn wait_defaults_and_clamps() {
        let action = Action::parse(&call("wait", json!({}))).unwrap();
        assert_eq!(action, Action::Wait { seconds: 2 });

        let action = Action::parse(&call("wait", json!({"seconds": 600}))).unwrap();
        assert_eq!(action, Action::Wait { seconds: MAX_WAIT_SECONDS });

        let err = Action::parse(&call("wait", json!({"seconds": "two"}))).unwrap_err();
        assert!(err.contains("wait.seconds"));
    }

    #[test]
    fn screenshot_label_defaults() {
        let action = Action::parse(&call("screenshot", json!({}))).unwrap();
        assert_eq!(
            action,
            Action::Screenshot {
                label: "page".into()
            }
        );
    }

    #[test]
    fn ask_user_choices_optional() {
        let action = Action::parse(&call("ask_user", json!({"question": "Salary?"}))).unwrap();
        assert_eq!(
            action,
            Action::AskUser {
                question: "Salary?".into(),
                choices: vec![]
            }
        );

        let action = Action::parse(&call(
            "ask_user",
            json!({"question": "Visa?", "choices": ["yes", "no"]}),
        ))
        .unwrap();
        assert_matches::assert_matches!(action, Action::AskUser { choices, .. } if choices.len() == 2);
    }

    #[test]
    fn ask_user_choices_must_be_strings() {
        let err = Action::parse(&call(
            "ask_user",
            json!({"question": "Q", "choices": [1, 2]}),
        ))
        .unwrap_err();
        assert!(err.contains("array of strings"));
    }

    #[test]
    fn report_status_message_optional() {
        let action =
            Action::parse(&call("report_status", json!({"status": "filling_form"}))).unwrap();
        assert_eq!(
            action,
            Action::ReportStatus {
                status: "filling_form".into(),
                message: None
            }
        );
    }

    #[test]
    fn done_reason_defaults_to_empty() {
        let action = Action::parse(&call("done", json!({"status": "applied"}))).unwrap();
        assert_eq!(
            action,
            Action::Done {
                status: "applied".into(),
                reason: String::new()
            }
        );
    }

    #[test]
    fn tool_name_matches_parse_source() {
        let action = Action::parse(&call("get_current_url", json!({}))).unwrap();
        assert_eq!(action.tool_name(), ToolName::GetCurrentUrl);
    }

    #[test]
    fn extra_arguments_are_ignored() {
        let action = Action::parse(&call(
            "goto",
            json!({"url": "https://a.test", "unexpected": true}),
        ))
        .unwrap();
        assert_matches::assert_matches!(action, Action::Goto { .. });
    }
}
