//! Transition function: (state, event, context) -> outcome.
//!
//! Every event goes through `transition`. Handlers read the host snapshot
//! and the roster but never touch them; roster mutations, the ledger entry
//! and host calls all come back as data in the `Outcome`.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::RngCore;

use super::WorkflowRules;
use super::effect::Effect;
use super::messages;
use crate::deadline::DeadlinePolicy;
use crate::domain::{
    ErrorKind, Event, FileStatus, Invitation, InvitationResponse, LedgerEntry, OpenAction, Phase, RequestSnapshot,
    RequestState,
};
use crate::roster::{Roster, RosterChange};
use crate::selection::{SelectionRequest, Selector};

/// Read-only inputs of one transition
pub struct Context<'a> {
    pub snapshot: &'a RequestSnapshot,
    pub roster: &'a Roster,
    pub rules: &'a WorkflowRules,
    pub selector: &'a Selector,
    pub deadline: &'a DeadlinePolicy,
    pub now: DateTime<Utc>,
}

/// Everything a transition decided
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub state: RequestState,
    pub roster_changes: Vec<RosterChange>,
    pub ledger: Option<LedgerEntry>,
    pub effects: Vec<Effect>,
}

impl Outcome {
    pub fn new(state: RequestState) -> Self {
        Self {
            state,
            roster_changes: vec![],
            ledger: None,
            effects: vec![],
        }
    }

    fn comment(&mut self, body: impl Into<String>) {
        self.effects.push(Effect::comment(body));
    }

    /// Add a label unless the request already carries it
    fn label(&mut self, ctx: &Context, label: &str) {
        if !ctx.snapshot.has_label(label) {
            self.effects.push(Effect::add_label(label));
        }
    }

    fn unlabel(&mut self, ctx: &Context, label: &str) {
        if ctx.snapshot.has_label(label) {
            self.effects.push(Effect::RemoveLabel {
                label: label.to_string(),
            });
        }
    }

    fn release<I: IntoIterator<Item = String>>(&mut self, handles: I) {
        self.roster_changes
            .extend(handles.into_iter().map(|id| RosterChange::SetBusy { id, busy: false }));
    }
}

/// True if `word` appears in `text` as a whole word, ignoring case
pub fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|w| w.eq_ignore_ascii_case(word))
}

/// Apply one event to a request
pub fn transition(ctx: &Context, state: RequestState, event: &Event, rng: &mut dyn RngCore) -> Outcome {
    let mut out = Outcome::new(state);
    if out.state.phase.is_terminal() {
        debug!("Request #{} is closed, ignoring {}", ctx.snapshot.number, event.name());
        return out;
    }

    match event {
        Event::Opened { action } => on_opened(ctx, &mut out, *action, rng),
        Event::Commented { author, text } => on_comment(ctx, &mut out, author, text, rng),
        Event::ReviewSubmitted { reviewer } => on_review(ctx, &mut out, reviewer),
        Event::Closed { merged } => on_closed(ctx, &mut out, *merged),
        Event::Sweep => on_sweep(ctx, &mut out, rng),
    }
    out
}

fn on_opened(ctx: &Context, out: &mut Outcome, action: OpenAction, rng: &mut dyn RngCore) {
    let rerun = out.state.phase == Phase::New
        || (out.state.is_validation_error() && out.state.supervisor_candidate.is_none());

    if let Some(phase) = out.state.review_to_resume() {
        resume_review(ctx, out, phase);
    } else if rerun {
        intake(ctx, out, rng);
    } else if action == OpenAction::Synchronize && out.state.phase.has_reviewer() {
        on_artifact_update(ctx, out);
    } else {
        debug!(
            "Request #{}: {:?} in phase {} needs no action",
            ctx.snapshot.number,
            action,
            out.state.phase.name()
        );
    }
}

/// Declared fields of a valid request
struct Declaration {
    project: String,
    species: String,
    affiliation: String,
}

/// Check the request body and files; on failure returns (comment, reason)
fn validate(ctx: &Context) -> std::result::Result<Declaration, (String, String)> {
    let snap = ctx.snapshot;
    let researcher = snap.author.as_str();
    let missing = |field: &str| (messages::missing_field(researcher, field), format!("missing field {}", field));

    let declared = snap.declared_field("Project").ok_or_else(|| missing("Project"))?;
    let project = ctx.rules.project(&declared).ok_or_else(|| {
        (
            messages::invalid_project(researcher, &ctx.rules.valid_projects),
            format!("invalid project '{}'", declared),
        )
    })?;
    let species = snap.declared_field("Species").ok_or_else(|| missing("Species"))?;
    let affiliation = snap.declared_field("Affiliation").ok_or_else(|| missing("Affiliation"))?;

    let ext = ctx.rules.artifact_extension.as_str();
    let found = snap.artifacts(ext).count();
    if found != 1 {
        return Err((
            messages::artifact_count(researcher, found, ext),
            format!("expected one {} file, found {}", ext, found),
        ));
    }

    Ok(Declaration {
        project: project.to_string(),
        species,
        affiliation,
    })
}

fn intake(ctx: &Context, out: &mut Outcome, rng: &mut dyn RngCore) {
    let error_label = ctx.rules.error_label.as_str();
    let declaration = match validate(ctx) {
        Ok(d) => d,
        Err((comment, reason)) => {
            info!("Request #{} rejected: {}", ctx.snapshot.number, reason);
            out.comment(comment);
            out.label(ctx, error_label);
            out.state.fail(ErrorKind::Validation, reason);
            return;
        }
    };

    out.unlabel(ctx, error_label);
    out.label(ctx, &declaration.project);
    out.state.researcher = ctx.snapshot.author.clone();
    out.state.error = None;
    out.state.phase = Phase::New;

    let ack = messages::acknowledgment(&out.state.researcher, &declaration.species);
    if !out.state.acknowledged && !ctx.snapshot.has_automated_comment(&ack) {
        out.comment(ack);
    }
    out.state.acknowledged = true;
    out.state.project = Some(declaration.project);
    out.state.subject = Some(declaration.species);
    out.state.affiliation = Some(declaration.affiliation);

    if let Err(detail) = prompt_supervisor(ctx, out, rng) {
        halt(ctx, out, &detail);
    }
}

/// Pick a supervisor and ask for an OK
fn prompt_supervisor(ctx: &Context, out: &mut Outcome, rng: &mut dyn RngCore) -> std::result::Result<(), String> {
    let request = SelectionRequest::new(out.state.affiliation.clone().unwrap_or_default())
        .excluding([out.state.researcher.clone()]);
    let supervisor = ctx
        .selector
        .select_supervisor(ctx.roster, &request, rng)
        .map_err(|e| e.to_string())?;

    info!("Request #{}: prompting supervisor {}", ctx.snapshot.number, supervisor.id);
    out.comment(messages::supervisor_prompt(&supervisor.id));
    out.state.supervisor_candidate = Some(supervisor.id);
    out.state.phase = Phase::AwaitingSupervisorAck;
    Ok(())
}

/// Select the next reviewer, excluding everyone already asked
fn invite_next_reviewer(ctx: &Context, out: &mut Outcome, rng: &mut dyn RngCore) -> std::result::Result<(), String> {
    let supervisor = out
        .state
        .supervisor
        .clone()
        .ok_or_else(|| "no supervisor has confirmed this request".to_string())?;

    let mut exclude = out.state.invitees();
    exclude.push(out.state.researcher.clone());
    exclude.push(supervisor);
    let mut request = SelectionRequest::new(out.state.affiliation.clone().unwrap_or_default()).excluding(exclude);
    if let Some(project) = &out.state.project {
        request = request.with_project(project.clone());
    }

    let selection = ctx
        .selector
        .select_reviewer(ctx.roster, &request, rng)
        .map_err(|e| e.to_string())?;
    let invitee = selection.chosen_id().to_string();
    let reply_by = ctx.deadline.reply_by(ctx.now);
    info!(
        "Request #{}: inviting {} ({}), reply by {}",
        ctx.snapshot.number,
        invitee,
        selection.reason(),
        ctx.deadline.format(reply_by)
    );

    out.comment(messages::selection_report(&selection));
    out.comment(messages::reviewer_prompt(&invitee, &ctx.deadline.format(reply_by)));
    out.roster_changes.push(RosterChange::SetBusy {
        id: invitee.clone(),
        busy: true,
    });
    out.state.invitations.push(Invitation {
        invitee,
        invited_at: ctx.now,
        reply_by,
        response: None,
    });
    out.state.phase = Phase::AwaitingReviewerOffer;
    Ok(())
}

/// Supervisor of record, falling back to whoever the host shows as assignee
fn supervisor_of(ctx: &Context, state: &RequestState) -> Option<String> {
    state.supervisor.clone().or_else(|| ctx.snapshot.assignee.clone())
}

/// Who gets asked to sort out a halted request
fn attention_actor(ctx: &Context, state: &RequestState) -> String {
    supervisor_of(ctx, state)
        .or_else(|| state.supervisor_candidate.clone())
        .unwrap_or_else(|| state.researcher.clone())
}

/// Stop automatic progress and ask a human to step in
fn halt(ctx: &Context, out: &mut Outcome, detail: &str) {
    let actor = attention_actor(ctx, &out.state);
    warn!("Request #{} halted: {}", ctx.snapshot.number, detail);
    out.comment(messages::needs_attention(&actor, detail));
    out.label(ctx, &ctx.rules.error_label);
    out.state.fail(ErrorKind::Halted, detail);
}

fn on_artifact_update(ctx: &Context, out: &mut Outcome) {
    let ext = ctx.rules.artifact_extension.as_str();
    let artifacts: Vec<_> = ctx.snapshot.artifacts(ext).collect();

    if artifacts.len() > 1 {
        out.comment(messages::artifact_count(&out.state.researcher, artifacts.len(), ext));
        out.label(ctx, &ctx.rules.error_label);
        out.state
            .fail(ErrorKind::Validation, format!("expected one {} file, found {}", ext, artifacts.len()));
        return;
    }

    if artifacts.iter().any(|a| a.status == FileStatus::Modified) {
        info!("Request #{} modifies an existing report, labelling as update", ctx.snapshot.number);
        out.label(ctx, &ctx.rules.update_label);
        return;
    }

    let reviewer = out
        .state
        .reviewer
        .clone()
        .or_else(|| ctx.snapshot.requested_reviewers.first().cloned());
    if let Some(reviewer) = reviewer {
        out.comment(messages::artifact_updated(&reviewer));
    }
}

/// Back to the review phase once the files of a request that failed
/// validation mid-review are fixed
fn resume_review(ctx: &Context, out: &mut Outcome, phase: Phase) {
    let ext = ctx.rules.artifact_extension.as_str();
    let found = ctx.snapshot.artifacts(ext).count();
    if found > 1 {
        debug!("Request #{} still changes {} {} files", ctx.snapshot.number, found, ext);
        return;
    }

    info!("Request #{}: files fixed, back to {}", ctx.snapshot.number, phase.name());
    out.state.error = None;
    out.state.phase = phase;
    out.unlabel(ctx, &ctx.rules.error_label);
    on_artifact_update(ctx, out);
}

fn on_comment(ctx: &Context, out: &mut Outcome, author: &str, text: &str, rng: &mut dyn RngCore) {
    match out.state.phase {
        Phase::AwaitingSupervisorAck => supervisor_reply(ctx, out, author, text, rng),
        Phase::AwaitingReviewerOffer => reviewer_reply(ctx, out, author, text, rng),
        Phase::Error if out.state.is_halted() => resume_halted(ctx, out, author, text, rng),
        phase => debug!(
            "Request #{}: comment by {} in phase {} needs no action",
            ctx.snapshot.number,
            author,
            phase.name()
        ),
    }
}

fn supervisor_reply(ctx: &Context, out: &mut Outcome, author: &str, text: &str, rng: &mut dyn RngCore) {
    let Some(record) = ctx.roster.get(author).filter(|r| r.is_supervisor) else {
        debug!("{} is not a roster supervisor, ignoring comment", author);
        return;
    };
    if record.is(&out.state.researcher) {
        debug!("{} opened this request and cannot supervise it", author);
        return;
    }

    if !has_word(text, "ok") {
        out.comment(messages::invalid_supervisor_reply(author));
        out.label(ctx, &ctx.rules.error_label);
        return;
    }

    info!("Request #{}: {} agreed to supervise", ctx.snapshot.number, record.id);
    out.unlabel(ctx, &ctx.rules.error_label);
    out.state.supervisor = Some(record.id.clone());
    out.state.supervisor_candidate = None;
    out.effects.push(Effect::SetAssignee {
        login: record.id.clone(),
    });
    if let Err(detail) = invite_next_reviewer(ctx, out, rng) {
        halt(ctx, out, &detail);
    }
}

fn reviewer_reply(ctx: &Context, out: &mut Outcome, author: &str, text: &str, rng: &mut dyn RngCore) {
    let now = ctx.now;
    let Some(invitation) = out.state.pending_invitation_mut() else {
        debug!("Request #{} has no pending invitation", ctx.snapshot.number);
        return;
    };
    if !invitation.invitee.eq_ignore_ascii_case(author.trim_start_matches('@')) {
        debug!("{} is not the invited reviewer, ignoring comment", author);
        return;
    }

    if has_word(text, "yes") {
        invitation.response = Some(InvitationResponse::Accepted);
        let reviewer = invitation.invitee.clone();
        info!("Request #{}: {} accepted the review", ctx.snapshot.number, reviewer);

        // Anyone else still pending past their reply-by is recorded as timed out
        for other in out.state.invitations.iter_mut().filter(|i| i.is_overdue(now)) {
            other.response = Some(InvitationResponse::TimedOut);
        }
        out.state.reviewer = Some(reviewer.clone());
        out.state.phase = Phase::ReviewerAssigned;
        let others = out.state.other_invitees();
        out.release(others);
        out.effects.push(Effect::RequestReviewer { login: reviewer });
        out.comment(messages::reviewer_accepted());
    } else {
        invitation.response = Some(InvitationResponse::Declined);
        let invitee = invitation.invitee.clone();
        info!("Request #{}: {} declined the review", ctx.snapshot.number, invitee);
        out.comment(messages::declined(&invitee));
        if let Err(detail) = invite_next_reviewer(ctx, out, rng) {
            halt(ctx, out, &detail);
        }
    }
}

fn on_review(ctx: &Context, out: &mut Outcome, reviewer: &str) {
    let confirmed = out
        .state
        .reviewer
        .as_deref()
        .is_some_and(|r| r.eq_ignore_ascii_case(reviewer.trim_start_matches('@')));
    let supervisor = supervisor_of(ctx, &out.state);
    if !confirmed {
        let handle = reviewer.trim_start_matches('@');
        let requested = ctx
            .snapshot
            .requested_reviewers
            .iter()
            .any(|r| r.eq_ignore_ascii_case(handle));
        match supervisor {
            Some(supervisor) if !requested && !supervisor.eq_ignore_ascii_case(handle) => {
                warn!("Request #{}: review by unassigned {}", ctx.snapshot.number, handle);
                out.comment(messages::unexpected_reviewer(&supervisor, handle));
            }
            _ => debug!("Request #{}: review by {} needs no action", ctx.snapshot.number, handle),
        }
        return;
    }
    if out.state.phase != Phase::ReviewerAssigned {
        debug!(
            "Request #{}: review by {} in phase {} needs no action",
            ctx.snapshot.number,
            reviewer,
            out.state.phase.name()
        );
        return;
    }

    let supervisor = supervisor.unwrap_or_default();
    out.comment(messages::review_thanks(reviewer, &supervisor, &out.state.researcher));
    out.state.phase = Phase::UnderReview;
}

fn on_closed(ctx: &Context, out: &mut Outcome, merged: bool) {
    let snap = ctx.snapshot;
    let subject = out
        .state
        .subject
        .clone()
        .or_else(|| snap.declared_field("Species"))
        .unwrap_or_default();

    if !merged {
        let others = out.state.other_invitees();
        out.release(others);
        if out.state.reviewer.is_some() {
            if let Some(supervisor) = supervisor_of(ctx, &out.state) {
                out.comment(messages::closed_unmerged(&supervisor));
            }
        }
        out.state.phase = Phase::Closed { merged: false };
        return;
    }

    let reviewer = match &out.state.reviewer {
        Some(r) if snap.has_review_by(r) => Some(r.clone()),
        _ => snap.latest_review().map(|r| r.author.clone()),
    };

    match reviewer {
        Some(reviewer) => {
            let affiliation = out
                .state
                .affiliation
                .clone()
                .or_else(|| snap.declared_field("Affiliation"))
                .unwrap_or_default();
            let full_name = ctx
                .roster
                .get(&reviewer)
                .map(|r| r.full_name.clone())
                .unwrap_or_else(|| reviewer.clone());
            info!("Request #{} merged, reviewed by {}", snap.number, reviewer);

            out.ledger = Some(LedgerEntry {
                reviewer_name: full_name,
                institution: affiliation.clone(),
                subject: subject.clone(),
                link: snap.url.clone(),
            });
            out.roster_changes.extend([
                RosterChange::SetBusy {
                    id: reviewer.clone(),
                    busy: false,
                },
                RosterChange::AdjustScore {
                    id: reviewer.clone(),
                    delta: -ctx.rules.review_decrement,
                },
                RosterChange::RecordReview {
                    id: reviewer.clone(),
                    date: ctx.deadline.local_date(ctx.now),
                },
            ]);
            for late in out.state.timed_out_invitees() {
                out.roster_changes.push(RosterChange::AdjustScore {
                    id: late,
                    delta: ctx.rules.timeout_penalty,
                });
            }
            let institutions = ctx.selector.institutions();
            let owing: Vec<String> = ctx
                .roster
                .records()
                .filter(|r| institutions.same(&r.institution, &affiliation))
                .map(|r| r.id.clone())
                .collect();
            for id in owing {
                out.roster_changes.push(RosterChange::AdjustScore {
                    id,
                    delta: ctx.rules.institution_increment,
                });
            }
            let others: Vec<String> = out
                .state
                .invitees()
                .into_iter()
                .filter(|i| !i.eq_ignore_ascii_case(&reviewer))
                .collect();
            out.release(others);
            out.effects.push(Effect::Notify {
                text: messages::merged_notification(&subject, Some(&reviewer), &snap.url),
            });
            out.state.reviewer = Some(reviewer);
        }
        None => {
            info!("Request #{} merged without a review", snap.number);
            let invitees = out.state.invitees();
            out.release(invitees);
            out.effects.push(Effect::Notify {
                text: messages::merged_notification(&subject, None, &snap.url),
            });
        }
    }

    match snap.artifacts(&ctx.rules.artifact_extension).next() {
        Some(artifact) => out.effects.push(Effect::RegenerateReport {
            artifact: artifact.path.clone(),
        }),
        None => warn!("Request #{} merged without a {} file", snap.number, ctx.rules.artifact_extension),
    }
    out.state.phase = Phase::Closed { merged: true };
}

fn on_sweep(ctx: &Context, out: &mut Outcome, rng: &mut dyn RngCore) {
    match out.state.phase {
        Phase::AwaitingReviewerOffer => {
            let now = ctx.now;
            match out.state.pending_invitation_mut() {
                Some(invitation) if invitation.is_overdue(now) => {
                    invitation.response = Some(InvitationResponse::TimedOut);
                    let invitee = invitation.invitee.clone();
                    info!("Request #{}: {} did not answer in time", ctx.snapshot.number, invitee);
                    out.comment(messages::timed_out(&invitee));
                    if let Err(detail) = invite_next_reviewer(ctx, out, rng) {
                        halt(ctx, out, &detail);
                    }
                }
                Some(_) => {}
                None => {
                    info!("Request #{} has no pending invitation, selecting again", ctx.snapshot.number);
                    if let Err(detail) = invite_next_reviewer(ctx, out, rng) {
                        halt(ctx, out, &detail);
                    }
                }
            }
        }
        Phase::AwaitingSupervisorAck | Phase::ReviewerAssigned | Phase::UnderReview => ping_if_stale(ctx, out),
        // Halted requests wait for a human to reply OK
        Phase::Error | Phase::New | Phase::Closed { .. } => {}
    }
}

fn ping_if_stale(ctx: &Context, out: &mut Outcome) {
    let window = ctx.rules.stale_after;
    let idle = ctx.now - ctx.snapshot.last_activity();
    if idle <= window {
        return;
    }
    if out.state.last_ping_at.is_some_and(|at| ctx.now - at <= window) {
        return;
    }
    let Some(actor) = out.state.responsible_actor().map(str::to_string) else {
        return;
    };

    info!("Request #{} idle for {} days, pinging {}", ctx.snapshot.number, idle.num_days(), actor);
    out.comment(messages::stale_ping(&actor, idle.num_days()));
    out.state.last_ping_at = Some(ctx.now);
}

/// Retry the step that halted a request once a human replies OK
fn resume_halted(ctx: &Context, out: &mut Outcome, author: &str, text: &str, rng: &mut dyn RngCore) {
    let handle = author.trim_start_matches('@');
    let addressed = attention_actor(ctx, &out.state).eq_ignore_ascii_case(handle);
    let supervisor = ctx
        .roster
        .get(handle)
        .is_some_and(|r| r.is_supervisor && !r.is(&out.state.researcher));
    if !(addressed || supervisor) || !has_word(text, "ok") {
        debug!("Request #{} is halted, ignoring comment by {}", ctx.snapshot.number, handle);
        return;
    }
    if out.state.reviewer.is_some() {
        debug!("Request #{} already has a reviewer, nothing to retry", ctx.snapshot.number);
        return;
    }

    info!("Request #{}: {} asked to retry", ctx.snapshot.number, handle);
    let retried = if out.state.supervisor.is_some() {
        invite_next_reviewer(ctx, out, rng)
    } else {
        prompt_supervisor(ctx, out, rng)
    };
    match retried {
        Ok(()) => {
            out.state.error = None;
            out.unlabel(ctx, &ctx.rules.error_label);
        }
        Err(detail) => halt(ctx, out, &detail),
    }
}
