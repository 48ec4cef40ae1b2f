//! Engine: load, transition, commit, then run effects.
//!
//! Commit order for one event:
//! 1. roster read-modify-write (the transition runs inside the transaction
//!    and is re-run if the roster changed underneath it)
//! 2. ledger append
//! 3. request state save
//! 4. effects against the host, notifier and report tools
//!
//! Host failures abort with an error; the event is expected to be
//! redelivered. Notification failures are only logged.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use super::WorkflowRules;
use super::effect::Effect;
use super::messages;
use super::transition::{Context, Outcome, transition};
use crate::deadline::DeadlinePolicy;
use crate::domain::{Event, RequestSnapshot, RequestState};
use crate::error::Result;
use crate::host::RequestHost;
use crate::notify::{LogNotifier, Notifier};
use crate::report::{DocumentExtractor, ReportRenderer, report_path};
use crate::roster::{Ledger, RosterStore};
use crate::selection::Selector;
use crate::storage::{JsonlStorage, RequestStore};

/// Extraction and rendering tools plus the checkout they work in
pub struct ReportTools {
    pub extractor: Box<dyn DocumentExtractor>,
    pub renderer: Box<dyn ReportRenderer>,
    /// Root of the repository checkout that holds the artifacts
    pub workspace: PathBuf,
}

/// Result of one sweep over all open requests
#[derive(Debug, Default)]
pub struct SweepReport {
    pub checked: usize,
    /// Requests the sweep acted on
    pub acted: Vec<u64>,
    /// Open requests waiting for a human
    pub halted: Vec<u64>,
    pub failed: Vec<(u64, String)>,
}

impl SweepReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Engine {
    host: Arc<dyn RequestHost>,
    roster: RosterStore,
    ledger: Ledger,
    storage: JsonlStorage,
    rules: WorkflowRules,
    selector: Selector,
    deadline: DeadlinePolicy,
    reports: Option<ReportTools>,
    notifier: Box<dyn Notifier>,
    rng: Box<dyn RngCore + Send>,
    bot_login: Option<String>,
}

impl Engine {
    pub fn new(host: Arc<dyn RequestHost>, roster: RosterStore, ledger: Ledger, storage: JsonlStorage) -> Self {
        Self {
            host,
            roster,
            ledger,
            storage,
            rules: WorkflowRules::default(),
            selector: Selector::default(),
            deadline: DeadlinePolicy::default(),
            reports: None,
            notifier: Box::new(LogNotifier),
            rng: Box::new(StdRng::from_os_rng()),
            bot_login: None,
        }
    }

    pub fn with_rules(mut self, rules: WorkflowRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_deadline(mut self, deadline: DeadlinePolicy) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_reports(mut self, reports: ReportTools) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_rng(mut self, rng: Box<dyn RngCore + Send>) -> Self {
        self.rng = rng;
        self
    }

    /// Login of the bot account; its own comments never drive the workflow
    pub fn with_bot_login(mut self, login: impl Into<String>) -> Self {
        self.bot_login = Some(login.into());
        self
    }

    fn is_bot(&self, author: &str) -> bool {
        author.ends_with("[bot]")
            || self
                .bot_login
                .as_deref()
                .is_some_and(|b| b.eq_ignore_ascii_case(author))
    }

    pub async fn handle(&mut self, number: u64, event: &Event) -> Result<Outcome> {
        self.handle_at(number, event, Utc::now()).await
    }

    /// Process one event for request `number` as of `now`
    pub async fn handle_at(&mut self, number: u64, event: &Event, now: DateTime<Utc>) -> Result<Outcome> {
        debug!("Request #{}: handling {} event", number, event.name());
        let snapshot = self.host.snapshot(number).await?;
        let requests = RequestStore::new(&self.storage);
        let state = requests
            .get(number)?
            .unwrap_or_else(|| RequestState::new(number, &snapshot.author, snapshot.created_at));

        if let Event::Commented { author, .. } = event
            && self.is_bot(author)
        {
            debug!("Ignoring comment by bot account {}", author);
            return Ok(Outcome::new(state));
        }

        let rules = &self.rules;
        let selector = &self.selector;
        let deadline = &self.deadline;
        let rng = &mut self.rng;
        let outcome = self
            .roster
            .transact(|roster| {
                let ctx = Context {
                    snapshot: &snapshot,
                    roster: &*roster,
                    rules,
                    selector,
                    deadline,
                    now,
                };
                let out = transition(&ctx, state.clone(), event, &mut **rng);
                roster.apply(&out.roster_changes, rules.bounds);
                Ok(out)
            })
            .await?;

        if let Some(entry) = &outcome.ledger {
            self.ledger.append(entry)?;
        }

        if outcome.state != state {
            let mut next = outcome.state.clone();
            next.updated_at = now;
            requests.save(&next)?;
            if next.phase != state.phase {
                info!("Request #{}: {} -> {}", number, state.phase.name(), next.phase.name());
            }
        }

        self.run_effects(&snapshot, &outcome).await?;
        Ok(outcome)
    }

    async fn run_effects(&self, snapshot: &RequestSnapshot, outcome: &Outcome) -> Result<()> {
        let number = snapshot.number;
        for effect in &outcome.effects {
            debug!("Request #{}: {}", number, effect.name());
            match effect {
                Effect::Comment { body } => self.host.post_comment(number, body).await?,
                Effect::AddLabel { label } => self.host.add_label(number, label).await?,
                Effect::RemoveLabel { label } => self.host.remove_label(number, label).await?,
                Effect::SetAssignee { login } => self.host.set_assignee(number, login).await?,
                Effect::RequestReviewer { login } => self.host.request_reviewer(number, login).await?,
                Effect::Notify { text } => {
                    if let Err(e) = self.notifier.notify(text).await {
                        warn!("Notification for request #{} failed: {}", number, e);
                    }
                }
                Effect::RegenerateReport { artifact } => {
                    if let Err(e) = self.regenerate(artifact).await {
                        warn!("Report regeneration for request #{} failed: {}", number, e);
                        let state = &outcome.state;
                        let actor = state.supervisor.as_deref().unwrap_or(&state.researcher);
                        self.host
                            .post_comment(number, &messages::report_failed(actor, &e.to_string()))
                            .await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Re-extract the structured report from `artifact` and render it beside
    /// the source. The submitted artifact is only read.
    async fn regenerate(&self, artifact: &str) -> Result<()> {
        let Some(tools) = &self.reports else {
            info!("No report tools configured, not regenerating {}", artifact);
            return Ok(());
        };
        let source = tools.workspace.join(artifact);
        let output = report_path(&source);
        let report = tools.extractor.extract(&source).await?;
        tools.renderer.render(&report, &output).await?;
        info!(
            "Regenerated report for {} ({}) at {}",
            report.species(),
            report.tolid(),
            output.display()
        );
        Ok(())
    }

    pub async fn sweep(&mut self) -> Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Run the escalation sweep over every open request
    pub async fn sweep_at(&mut self, now: DateTime<Utc>) -> Result<SweepReport> {
        let open = self.host.list_open().await?;
        info!("Sweeping {} open requests", open.len());

        let mut report = SweepReport::default();
        for number in &open {
            report.checked += 1;
            match self.handle_at(*number, &Event::Sweep, now).await {
                Ok(outcome) if !outcome.effects.is_empty() || !outcome.roster_changes.is_empty() => {
                    report.acted.push(*number)
                }
                Ok(_) => {}
                Err(e) => {
                    if e.is_business() {
                        warn!("Sweep of request #{} skipped: {}", number, e);
                    } else {
                        error!("Sweep of request #{} failed: {}", number, e);
                    }
                    report.failed.push((*number, e.to_string()));
                }
            }
        }

        let requests = RequestStore::new(&self.storage);
        for state in requests.find_halted()? {
            match state.id.parse::<u64>() {
                Ok(number) if state.is_halted() && open.contains(&number) => {
                    warn!(
                        "Request #{} needs a human: {}",
                        number,
                        state.error.as_ref().map(|e| e.message.as_str()).unwrap_or_default()
                    );
                    report.halted.push(number);
                }
                _ => {}
            }
        }

        Ok(report)
    }
}
