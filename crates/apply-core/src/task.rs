//! Task types: the immutable input to one run.
//!
//! A [`Task`] is built once per application attempt and owned by the agent
//! loop for the duration of the run. Nothing here is mutated after
//! construction.

use serde::{Deserialize, Serialize};

/// A job posting to apply to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    /// Company name as shown to the user and stored with records.
    pub company_name: String,
    /// Job title.
    pub job_title: String,
    /// Posting URL the run starts from.
    pub job_url: String,
    /// Optional hint naming the hosting job board (e.g. "greenhouse").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_type: Option<String>,
}

/// Static identity data used to fill form fields directly.
///
/// Situational answers (salary, work authorization, notice period) are
/// intentionally absent: those are always routed to the human at
/// application time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantProfile {
    /// Full legal name.
    pub full_name: String,
    /// Contact email, also used for account creation.
    pub email: String,
    /// Phone number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Postal address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// File references for uploadable documents.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSet {
    /// Path to the resume/CV file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_path: Option<String>,
    /// Path to the cover letter file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_letter_path: Option<String>,
}

impl DocumentSet {
    /// Whether a resume file is available for upload.
    #[must_use]
    pub fn has_resume(&self) -> bool {
        self.resume_path.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// Whether a cover letter file is available for upload.
    #[must_use]
    pub fn has_cover_letter(&self) -> bool {
        self.cover_letter_path
            .as_ref()
            .is_some_and(|p| !p.is_empty())
    }
}

/// Immutable input to one run of the agent loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    /// The posting being applied to.
    pub job: JobPosting,
    /// Static profile data.
    pub profile: ApplicantProfile,
    /// Document file references.
    pub documents: DocumentSet,
    /// When set, the final submission is suppressed (dry run).
    pub debug: bool,
    /// Hard cap on loop cycles.
    pub max_steps: u32,
}

/// Default step cap for a run.
pub const DEFAULT_MAX_STEPS: u32 = 50;

impl Task {
    /// Build a task with the default step cap.
    #[must_use]
    pub fn new(job: JobPosting, profile: ApplicantProfile, documents: DocumentSet) -> Self {
        Self {
            job,
            profile,
            documents,
            debug: false,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Builder: enable debug mode (submission suppressed).
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Builder: override the step cap.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }
}
