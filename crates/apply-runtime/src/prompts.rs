//! The fixed system instruction and the task prompt builder.
//!
//! The system instruction encodes all recovery and abort policy; the loop
//! itself never second-guesses the decision engine except for the debug
//! gate on `done(applied)`.

use apply_core::task::Task;

/// Fixed system instruction for application runs.
pub const SYSTEM_PROMPT: &str = "\
You are a job application agent. You operate a web browser through tools to \
submit one job application on behalf of a human.

Each cycle you receive the result of your previous tool call. Decide one \
next tool call.

## Form fields

Two kinds of fields:

Static fields: full name, email, phone, address, profile links, and similar \
identity data. Fill these directly from the profile provided in the task.

Situational fields: anything whose correct answer depends on the specific \
job, country, or the user's current circumstances. Work authorization and \
visa status, salary expectation, relocation, notice period, security \
clearance, free-text essay questions, and any question where a wrong guess \
could disqualify or misrepresent the candidate. NEVER guess these. Use \
ask_user, relaying the exact question text and any fixed options, and fill \
in the user's reply verbatim.

## Uploads

Use upload_file with document \"resume\" for CV fields and document \
\"cover_letter\" for cover letter fields. The task says which documents are \
available.

## Accounts

Prefer applying as a guest when the page allows it. If login is required, \
create an account with the profile email and the account password given in \
the task. If the page says the account already exists, use the password \
reset flow: click the reset link, then ask_user for the reset code or link \
the user received. If the reply starts with http, goto it; otherwise fill \
the code into the current page. If a one-time verification code is \
required at any point, ask_user for it.

## Captchas

A text captcha you can read from a screenshot: take a screenshot, then \
ask_user for the solution. An image-selection captcha (pick all squares \
with traffic lights and similar): call done with status \"failed\" and a \
reason naming the image-based captcha. The same applies when login is \
only possible through a third-party OAuth provider: done(failed) with the \
reason.

## Submitting

Intermediate buttons such as Next, Continue, or Save & Continue move the \
form forward; click them freely. The FINAL submit is the button that \
irrevocably sends the application, usually labelled Submit, Submit \
Application, Apply, or Send Application, on the last step after a review \
of your answers.

When the task says debug mode is on: progress through every intermediate \
step, but when you identify the final submit button do NOT click it. Call \
done with status \"skipped\" and the reason \"Debug mode: final submit \
skipped\". When debug mode is off, click the final submit, then call done \
with status \"applied\".

## General

Call page_snapshot before deciding what to do on a new or changed page. If \
a page looks half-loaded, wait and snapshot again. If an element is \
reported missing, re-read the snapshot and try another identifier, or \
scroll. If you are stuck, ask_user for help. Use report_status to keep the \
user informed at milestones. Every run ends with exactly one done call.";

/// Build the opening task message for one run.
#[must_use]
pub fn build_task_prompt(task: &Task, account_password: Option<&str>) -> String {
    let profile = serde_json::json!({
        "full_name": task.profile.full_name,
        "email": task.profile.email,
        "phone": task.profile.phone,
        "address": task.profile.address,
    });

    let debug_line = if task.debug {
        "debug: on (do NOT click the final submit button)"
    } else {
        "debug: off (click the final submit button when the form is complete)"
    };

    let mut prompt = format!(
        "Apply to this job:\n\
         \n  URL:     {}\n  Company: {}\n  Title:   {}\n\
         \nApplicant profile (static fields, use directly):\n{}\n\
         \nAvailable documents:\n  resume:       {}\n  cover_letter: {}\n",
        task.job.job_url,
        task.job.company_name,
        task.job.job_title,
        serde_json::to_string_pretty(&profile).unwrap_or_default(),
        if task.documents.has_resume() { "yes" } else { "no" },
        if task.documents.has_cover_letter() { "yes" } else { "no" },
    );

    if let Some(password) = account_password {
        prompt.push_str(&format!(
            "\nIf account creation is required, use this password: {password}\n"
        ));
    }

    prompt.push_str(&format!(
        "\nMode:\n  {debug_line}\n\nStart by navigating to the job URL and taking a page snapshot."
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use apply_core::task::{ApplicantProfile, DocumentSet, JobPosting};

    fn make_task(debug: bool) -> Task {
        Task::new(
            JobPosting {
                company_name: "Acme".into(),
                job_title: "Engineer".into(),
                job_url: "https://jobs.acme.test/1".into(),
                board_type: None,
            },
            ApplicantProfile {
                full_name: "Jane Doe".into(),
                email: "jane@test.com".into(),
                phone: None,
                address: None,
            },
            DocumentSet {
                resume_path: Some("/data/resume.pdf".into()),
                cover_letter_path: None,
            },
        )
        .with_debug(debug)
    }

    #[test]
    fn system_prompt_covers_the_policy_areas() {
        assert!(SYSTEM_PROMPT.contains("ask_user"));
        assert!(SYSTEM_PROMPT.contains("upload_file"));
        assert!(SYSTEM_PROMPT.contains("captcha"));
        assert!(SYSTEM_PROMPT.contains("OAuth"));
        assert!(SYSTEM_PROMPT.contains("debug mode"));
        assert!(SYSTEM_PROMPT.contains("exactly one done call"));
    }

    #[test]
    fn task_prompt_includes_job_and_profile() {
        let prompt = build_task_prompt(&make_task(false), None);
        assert!(prompt.contains("https://jobs.acme.test/1"));
        assert!(prompt.contains("Acme"));
        assert!(prompt.contains("jane@test.com"));
        assert!(prompt.contains("resume:       yes"));
        assert!(prompt.contains("cover_letter: no"));
    }

    #[test]
    fn task_prompt_debug_lines() {
        assert!(build_task_prompt(&make_task(true), None).contains("debug: on"));
        assert!(build_task_prompt(&make_task(false), None).contains("debug: off"));
    }

    #[test]
    fn task_prompt_password_is_optional() {
        let with = build_task_prompt(&make_task(false), Some("auto-s3cret"));
        assert!(with.contains("auto-s3cret"));

        let without = build_task_prompt(&make_task(false), None);
        assert!(!without.contains("password"));
    }
}
