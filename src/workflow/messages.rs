//! Comment texts posted on requests.

use crate::selection::Selection;

const SUPERVISE_WIKI: &str = "https://github.com/ERGA-consortium/EARs/wiki/Assignees-section";
const REVIEW_WIKI: &str = "https://github.com/ERGA-consortium/EARs/wiki/Reviewers-section";
const ENA_UPLOAD: &str = "https://github.com/ERGA-consortium/ERGA-submission";

pub fn invalid_project(researcher: &str, valid: &[String]) -> String {
    format!(
        "Attention @{}, you have entered an invalid `Project:` field!\n\
         Please use one of the following project names: {}",
        researcher,
        valid.join(", ")
    )
}

pub fn missing_field(researcher: &str, field: &str) -> String {
    format!(
        "Attention @{}, the field `{}:` is missing or empty!\n\
         Please fix the issue by editing your first message (click on the three dots '…' in the top right corner of it)",
        researcher, field
    )
}

pub fn artifact_count(researcher: &str, found: usize, extension: &str) -> String {
    if found == 0 {
        format!(
            "Attention @{}, I could not find an EAR `{}` file in this PR!\nPlease add exactly one.",
            researcher, extension
        )
    } else {
        format!(
            "Attention @{}, this PR changes {} `{}` files!\nPlease submit exactly one EAR per PR.",
            researcher, found, extension
        )
    }
}

pub fn acknowledgment(researcher: &str, species: &str) -> String {
    format!(
        "Hi @{}, thanks for sending the EAR of _{}_.\n\
         I added the corresponding tag to the PR and will contact a supervisor and a reviewer ASAP.",
        researcher, species
    )
}

pub fn supervisor_prompt(supervisor: &str) -> String {
    format!(
        "Hi @{}, do you agree to [supervise]({}) this assembly?\n\
         Please reply to this message only with **OK** to give acknowledge.",
        supervisor, SUPERVISE_WIKI
    )
}

pub fn invalid_supervisor_reply(author: &str) -> String {
    format!(
        "Invalid confirmation!\nHi @{}, please reply only with **OK** if you agree to supervise this assembly.",
        author
    )
}

/// Selection table plus the explanation of the choice, as a code block
pub fn selection_report(selection: &Selection) -> String {
    format!("```\n{}\n{}\n```", selection.table(), selection.justification())
}

pub fn reviewer_prompt(invitee: &str, reply_by: &str) -> String {
    format!(
        "Hi @{}, do you agree to review this assembly?\n\
         Please reply to this message only with **Yes** or **No** by {}",
        invitee, reply_by
    )
}

pub fn declined(invitee: &str) -> String {
    format!("@{} Ok thank you, I will look for the next reviewer on the list :)", invitee)
}

pub fn timed_out(invitee: &str) -> String {
    format!("@{} Time is out! I will look for the next reviewer on the list :)", invitee)
}

pub fn reviewer_accepted() -> String {
    format!(
        "Thanks for agreeing!\n\
         I appointed you as the EAR reviewer.\n\
         I will keep your status as _Busy_ until you finish this review.\n\
         Please check the [Wiki]({}) if you need to refresh something. \
         (and remember that you must download the EAR PDF to be able to click on the link to the contact map file!)\n\
         Contact the PR assignee for any issues.",
        REVIEW_WIKI
    )
}

pub fn review_thanks(reviewer: &str, supervisor: &str, researcher: &str) -> String {
    format!(
        "Thanks @{} for the review.\n\
         I will add a new reviewed species for you to the table when @{} approves and merges the PR ;)\n\n\
         Congrats on the assembly @{}!\n\
         After merging, you can [upload the assembly to ENA]({}).",
        reviewer, supervisor, researcher, ENA_UPLOAD
    )
}

pub fn artifact_updated(reviewer: &str) -> String {
    format!(
        "The researcher has updated the EAR PDF. Please review the assembly @{}.",
        reviewer
    )
}

/// Escalation to whoever should sort out a stuck request
pub fn needs_attention(actor: &str, detail: &str) -> String {
    format!(
        "Hi @{}, it looks like there is a problem with this PR that requires your involvement to sort it out.\n> {}\n\n\
         Once it is sorted out, reply OK here and I will try again.",
        actor, detail
    )
}

/// A review arrived from someone who was never assigned
pub fn unexpected_reviewer(supervisor: &str, author: &str) -> String {
    format!(
        "Hi @{}, @{} submitted a review but is not the assigned reviewer of this PR. \
         Please check the assignment before merging.",
        supervisor, author
    )
}

pub fn closed_unmerged(supervisor: &str) -> String {
    format!(
        "Hi @{}, this PR was closed without merging. The reviewer keeps the _Busy_ status until you sort it out.",
        supervisor
    )
}

pub fn stale_ping(actor: &str, idle_days: i64) -> String {
    format!(
        "Hi @{}, there has been no activity on this PR for {} days. Could you have a look?",
        actor, idle_days
    )
}

pub fn report_failed(actor: &str, detail: &str) -> String {
    format!(
        "Hi @{}, I could not regenerate the EAR report after merging.\n> {}",
        actor, detail
    )
}

pub fn merged_notification(species: &str, reviewer: Option<&str>, url: &str) -> String {
    match reviewer {
        Some(reviewer) => format!("EAR of {} approved (reviewed by {}): {}", species, reviewer, url),
        None => format!("EAR of {} merged: {}", species, url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_address_the_actor() {
        assert!(supervisor_prompt("sup").starts_with("Hi @sup, do you agree to [supervise]"));
        assert!(reviewer_prompt("rev", "16-Jan-2025 at 13:00 CET").ends_with("by 16-Jan-2025 at 13:00 CET"));
        assert_eq!(
            timed_out("rev"),
            "@rev Time is out! I will look for the next reviewer on the list :)"
        );
    }

    #[test]
    fn test_invalid_project_lists_options() {
        let msg = invalid_project("me", &["ERGA-BGE".to_string(), "ERGA-Pilot".to_string()]);
        assert!(msg.contains("ERGA-BGE, ERGA-Pilot"));
    }

    #[test]
    fn test_artifact_count_wording() {
        assert!(artifact_count("me", 0, ".pdf").contains("could not find"));
        assert!(artifact_count("me", 2, ".pdf").contains("changes 2"));
    }

    #[test]
    fn test_needs_attention_explains_how_to_retry() {
        let msg = needs_attention("sup", "no eligible reviewer");
        assert!(msg.starts_with("Hi @sup, it looks like there is a problem"));
        assert!(msg.contains("> no eligible reviewer"));
        assert!(msg.ends_with("reply OK here and I will try again."));
    }
}
