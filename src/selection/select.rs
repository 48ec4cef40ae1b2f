//! Reviewer and supervisor selection.
//!
//! Reviewer selection filters the roster to eligible people, ranks them by
//! adjusted score and breaks ties with a fixed cascade:
//! 1. a single candidate holds the top adjusted score
//! 2. among the finalists, a single one has the oldest last review and the
//!    fewest total reviews
//! 3. uniform random choice among whoever is left
//!
//! Steps 1 and 2 are deterministic. Randomness comes only from the RNG the
//! caller passes in, and only reaches step 3.

use std::fmt::Write as _;

use rand::RngCore;
use rand::seq::IndexedRandom;

use super::institution::InstitutionTable;
use super::score::ScoringPolicy;
use crate::domain::ReviewerRecord;
use crate::error::{EarbotError, Result};
use crate::roster::Roster;

/// Constraints for one reviewer selection
#[derive(Debug, Clone, Default)]
pub struct SelectionRequest {
    /// Requester's declared institution; same-institution people are ineligible
    pub requester_institution: String,
    /// Project tag of the request, if known
    pub project: Option<String>,
    /// Handles that must not be picked (decliners, timed-out invitees, the requester)
    pub exclude: Vec<String>,
}

impl SelectionRequest {
    pub fn new(requester_institution: impl Into<String>) -> Self {
        Self {
            requester_institution: requester_institution.into(),
            ..Self::default()
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn excluding<I, S>(mut self, handles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(handles.into_iter().map(Into::into));
        self
    }

    fn excludes(&self, record: &ReviewerRecord) -> bool {
        self.exclude.iter().any(|h| record.is(h))
    }
}

/// An eligible person with the score computed for this selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub record: ReviewerRecord,
    pub adjusted_score: i64,
}

/// Which step of the cascade settled the choice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    HighestScore,
    OldestAndFewest,
    Random,
}

impl TieBreak {
    pub fn reason(&self) -> &'static str {
        match self {
            TieBreak::HighestScore => "highest adjusted score",
            TieBreak::OldestAndFewest => "oldest review and fewest reviews among finalists",
            TieBreak::Random => "random selection to break a tie",
        }
    }
}

/// Outcome of a reviewer selection
#[derive(Debug, Clone)]
pub struct Selection {
    /// Every eligible candidate, best first
    pub ranked: Vec<Candidate>,
    pub chosen: Candidate,
    pub tie_break: TieBreak,
}

impl Selection {
    pub fn chosen_id(&self) -> &str {
        &self.chosen.record.id
    }

    pub fn reason(&self) -> &'static str {
        self.tie_break.reason()
    }

    /// Human-readable explanation of why the chosen candidate won
    pub fn justification(&self) -> String {
        let r = &self.chosen.record;
        let mut out = format!("Selected reviewer: {} ({})\n", r.full_name, r.id);
        out.push_str("The decision was based on:\n");
        let _ = writeln!(out, "- different institution ('{}')", r.institution);
        out.push_str("- active\n");
        out.push_str("- not busy\n");
        let _ = writeln!(
            out,
            "- highest adjusted calling score in this selection ({})",
            self.chosen.adjusted_score
        );
        let _ = write!(out, "- {}", self.reason());
        out
    }

    /// Fixed-width table of the ranked candidates
    pub fn table(&self) -> String {
        let headers = [
            "Github ID",
            "Full Name",
            "Institution",
            "Total Reviews",
            "Last Review",
            "Calling Score",
            "Adjusted Score",
        ];
        let rows: Vec<[String; 7]> = self
            .ranked
            .iter()
            .map(|c| {
                [
                    c.record.id.clone(),
                    c.record.full_name.clone(),
                    c.record.institution.clone(),
                    c.record.total_reviews.to_string(),
                    c.record.last_review.render(),
                    c.record.calling_score.to_string(),
                    c.adjusted_score.to_string(),
                ]
            })
            .collect();

        let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
        for row in &rows {
            for (w, cell) in widths.iter_mut().zip(row.iter()) {
                *w = (*w).max(cell.chars().count());
            }
        }

        let header_row = pad_row(headers.iter().copied(), &widths);
        let mut out = format!("{}\n{}\n", header_row, "-".repeat(header_row.chars().count()));
        for row in &rows {
            out.push_str(&pad_row(row.iter().map(String::as_str), &widths));
            out.push('\n');
        }
        out
    }
}

fn pad_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(c, w)| format!("{:<width$}", c, width = *w))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Picks reviewers and supervisors from a roster
#[derive(Debug, Clone, Default)]
pub struct Selector {
    policy: ScoringPolicy,
    institutions: InstitutionTable,
}

impl Selector {
    pub fn new(policy: ScoringPolicy, institutions: InstitutionTable) -> Self {
        Self { policy, institutions }
    }

    pub fn institutions(&self) -> &InstitutionTable {
        &self.institutions
    }

    /// Base eligibility shared by reviewers and supervisors
    pub fn is_eligible(&self, record: &ReviewerRecord, requester_institution: &str) -> bool {
        record.active && !record.busy && !self.institutions.same(&record.institution, requester_institution)
    }

    /// Every eligible candidate, ranked best first
    pub fn rank(&self, roster: &Roster, request: &SelectionRequest) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = roster
            .records()
            .filter(|r| self.is_eligible(r, &request.requester_institution) && !request.excludes(r))
            .map(|r| Candidate {
                record: r.clone(),
                adjusted_score: self
                    .policy
                    .adjusted_score(r, request.project.as_deref(), &self.institutions),
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.adjusted_score
                .cmp(&a.adjusted_score)
                .then(a.record.total_reviews.cmp(&b.record.total_reviews))
                .then(a.record.last_review.cmp(&b.record.last_review))
                .then(a.record.key().cmp(&b.record.key()))
        });
        candidates
    }

    /// Choose the reviewer for a request
    pub fn select_reviewer(
        &self,
        roster: &Roster,
        request: &SelectionRequest,
        rng: &mut dyn RngCore,
    ) -> Result<Selection> {
        let ranked = self.rank(roster, request);
        let Some(top) = ranked.first().map(|c| c.adjusted_score) else {
            return Err(EarbotError::NoEligibleCandidates {
                filters: self.describe_filters(request, false),
            });
        };

        let finalists: Vec<&Candidate> = ranked.iter().take_while(|c| c.adjusted_score == top).collect();
        let (chosen, tie_break) = if let [only] = finalists.as_slice() {
            ((*only).clone(), TieBreak::HighestScore)
        } else {
            let oldest = finalists.iter().map(|c| &c.record.last_review).min();
            let by_date: Vec<&Candidate> = finalists
                .iter()
                .copied()
                .filter(|c| Some(&c.record.last_review) == oldest)
                .collect();
            let fewest = by_date.iter().map(|c| c.record.total_reviews).min();
            let remaining: Vec<&Candidate> = by_date
                .into_iter()
                .filter(|c| Some(c.record.total_reviews) == fewest)
                .collect();

            match remaining.as_slice() {
                [only] => ((*only).clone(), TieBreak::OldestAndFewest),
                _ => {
                    let picked = remaining.choose(rng).copied().ok_or_else(|| EarbotError::NoEligibleCandidates {
                        filters: self.describe_filters(request, false),
                    })?;
                    (picked.clone(), TieBreak::Random)
                }
            }
        };

        Ok(Selection {
            ranked,
            chosen,
            tie_break,
        })
    }

    /// Choose a supervisor uniformly at random among eligible supervisors
    pub fn select_supervisor(
        &self,
        roster: &Roster,
        request: &SelectionRequest,
        rng: &mut dyn RngCore,
    ) -> Result<ReviewerRecord> {
        let eligible: Vec<&ReviewerRecord> = roster
            .records()
            .filter(|r| r.is_supervisor)
            .filter(|r| self.is_eligible(r, &request.requester_institution) && !request.excludes(r))
            .collect();

        eligible
            .choose(rng)
            .map(|r| (*r).clone())
            .ok_or_else(|| EarbotError::NoEligibleCandidates {
                filters: self.describe_filters(request, true),
            })
    }

    fn describe_filters(&self, request: &SelectionRequest, supervisors: bool) -> String {
        let mut filters = vec![
            "active".to_string(),
            "not busy".to_string(),
            format!(
                "institution other than '{}'",
                self.institutions.canonicalize(&request.requester_institution)
            ),
        ];
        if supervisors {
            filters.push("supervisor".to_string());
        }
        if !request.exclude.is_empty() {
            filters.push(format!("excluding {}", request.exclude.join(", ")));
        }
        filters.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LastReview;
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn date(y: i32, m: u32, d: u32) -> LastReview {
        LastReview::On(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn person(id: &str, institution: &str, score: i64, total: u32, last: LastReview) -> ReviewerRecord {
        let mut r = ReviewerRecord::new(id, &format!("{} Name", id), institution);
        r.calling_score = score;
        r.total_reviews = total;
        r.last_review = last;
        r
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_never_reviewed_bonus_wins() {
        let roster = Roster::from_records(vec![
            person("alice", "X", 100, 0, LastReview::Never),
            person("bob", "Y", 90, 1, date(2024, 3, 1)),
        ]);
        let selector = Selector::default();
        let sel = selector
            .select_reviewer(&roster, &SelectionRequest::new("Z"), &mut rng())
            .unwrap();

        assert_eq!(sel.chosen_id(), "alice");
        assert_eq!(sel.chosen.adjusted_score, 150);
        assert_eq!(sel.reason(), "highest adjusted score");
        assert_eq!(sel.ranked.len(), 2);
        assert_eq!(sel.ranked[1].adjusted_score, 90);
    }

    #[test]
    fn test_requester_institution_is_excluded() {
        let roster = Roster::from_records(vec![
            person("alice", "X", 100, 0, LastReview::Never),
            person("bob", "Y", 90, 1, date(2024, 3, 1)),
        ]);
        let sel = Selector::default()
            .select_reviewer(&roster, &SelectionRequest::new("x"), &mut rng())
            .unwrap();
        assert_eq!(sel.chosen_id(), "bob");
        assert_eq!(sel.ranked.len(), 1);
    }

    #[test]
    fn test_never_picks_ineligible() {
        let mut busy = person("busy", "A", 500, 0, LastReview::Never);
        busy.busy = true;
        let mut inactive = person("inactive", "B", 500, 0, LastReview::Never);
        inactive.active = false;
        let same = person("same", "Req Inst", 500, 0, LastReview::Never);
        let ok = person("ok", "C", 0, 10, date(2020, 1, 1));
        let roster = Roster::from_records(vec![busy, inactive, same, ok]);

        let selector = Selector::default();
        for seed in 0..20 {
            let mut r = StdRng::seed_from_u64(seed);
            let sel = selector
                .select_reviewer(&roster, &SelectionRequest::new("req  inst"), &mut r)
                .unwrap();
            assert_eq!(sel.chosen_id(), "ok");
            assert!(sel.ranked.iter().all(|c| c.record.active && !c.record.busy));
        }
    }

    #[test]
    fn test_canonical_institution_excludes_variants() {
        let mut map = std::collections::BTreeMap::new();
        map.insert("CNAG".to_string(), vec!["CNAG-CRG".to_string()]);
        let selector = Selector::new(ScoringPolicy::default(), InstitutionTable::new(&map));
        let roster = Roster::from_records(vec![
            person("alice", "CNAG-CRG", 100, 0, LastReview::Never),
            person("bob", "Y", 90, 1, date(2024, 3, 1)),
        ]);
        let sel = selector
            .select_reviewer(&roster, &SelectionRequest::new("CNAG"), &mut rng())
            .unwrap();
        assert_eq!(sel.chosen_id(), "bob");
    }

    #[test]
    fn test_oldest_review_breaks_score_tie() {
        let roster = Roster::from_records(vec![
            person("recent", "A", 10, 1, date(2024, 6, 1)),
            person("older", "B", 10, 3, date(2023, 1, 1)),
            person("low", "C", 5, 0, date(2020, 1, 1)),
        ]);
        let selector = Selector::default();
        let first = selector
            .select_reviewer(&roster, &SelectionRequest::new("Z"), &mut StdRng::seed_from_u64(1))
            .unwrap();
        let second = selector
            .select_reviewer(&roster, &SelectionRequest::new("Z"), &mut StdRng::seed_from_u64(99))
            .unwrap();

        assert_eq!(first.chosen_id(), "older");
        assert_eq!(first.tie_break, TieBreak::OldestAndFewest);
        assert_eq!(second.chosen_id(), first.chosen_id());
        assert_eq!(second.reason(), first.reason());
    }

    #[test]
    fn test_fewest_reviews_breaks_date_tie() {
        let roster = Roster::from_records(vec![
            person("many", "A", 10, 4, date(2023, 1, 1)),
            person("few", "B", 10, 2, date(2023, 1, 1)),
        ]);
        let sel = Selector::default()
            .select_reviewer(&roster, &SelectionRequest::new("Z"), &mut rng())
            .unwrap();
        assert_eq!(sel.chosen_id(), "few");
        assert_eq!(sel.reason(), "oldest review and fewest reviews among finalists");
    }

    #[test]
    fn test_full_tie_is_random_and_seeded() {
        let roster = Roster::from_records(vec![
            person("a", "A", 10, 2, date(2023, 1, 1)),
            person("b", "B", 10, 2, date(2023, 1, 1)),
            person("c", "C", 10, 2, date(2023, 1, 1)),
        ]);
        let selector = Selector::default();
        let request = SelectionRequest::new("Z");

        let mut seen = std::collections::HashSet::new();
        for seed in 0..50 {
            let a = selector
                .select_reviewer(&roster, &request, &mut StdRng::seed_from_u64(seed))
                .unwrap();
            let b = selector
                .select_reviewer(&roster, &request, &mut StdRng::seed_from_u64(seed))
                .unwrap();
            assert_eq!(a.tie_break, TieBreak::Random);
            assert_eq!(a.reason(), "random selection to break a tie");
            assert_eq!(a.chosen_id(), b.chosen_id());
            seen.insert(a.chosen_id().to_string());
        }
        assert!(seen.len() > 1);
    }

    #[test]
    fn test_exclusions_are_honored() {
        let roster = Roster::from_records(vec![
            person("alice", "X", 100, 0, LastReview::Never),
            person("bob", "Y", 90, 1, date(2024, 3, 1)),
        ]);
        let request = SelectionRequest::new("Z").excluding(["@Alice"]);
        let sel = Selector::default()
            .select_reviewer(&roster, &request, &mut rng())
            .unwrap();
        assert_eq!(sel.chosen_id(), "bob");
    }

    #[test]
    fn test_no_candidates_names_filters() {
        let roster = Roster::from_records(vec![person("alice", "X", 100, 0, LastReview::Never)]);
        let request = SelectionRequest::new("X").excluding(["bob"]);
        let err = Selector::default()
            .select_reviewer(&roster, &request, &mut rng())
            .unwrap_err();
        match err {
            EarbotError::NoEligibleCandidates { filters } => {
                assert!(filters.contains("institution other than 'x'"));
                assert!(filters.contains("excluding bob"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_supervisor_selection() {
        let mut sup_a = person("sup_a", "A", 0, 0, LastReview::Never);
        sup_a.is_supervisor = true;
        let mut sup_b = person("sup_b", "B", 0, 0, LastReview::Never);
        sup_b.is_supervisor = true;
        let mut sup_same = person("sup_same", "Z", 0, 0, LastReview::Never);
        sup_same.is_supervisor = true;
        let plain = person("plain", "C", 100, 0, LastReview::Never);
        let roster = Roster::from_records(vec![sup_a, sup_b, sup_same, plain]);

        let selector = Selector::default();
        let request = SelectionRequest::new("Z").excluding(["sup_b"]);
        for seed in 0..20 {
            let chosen = selector
                .select_supervisor(&roster, &request, &mut StdRng::seed_from_u64(seed))
                .unwrap();
            assert_eq!(chosen.id, "sup_a");
        }
    }

    #[test]
    fn test_no_supervisor_available() {
        let roster = Roster::from_records(vec![person("plain", "C", 100, 0, LastReview::Never)]);
        let err = Selector::default()
            .select_supervisor(&roster, &SelectionRequest::new("Z"), &mut rng())
            .unwrap_err();
        assert!(matches!(err, EarbotError::NoEligibleCandidates { ref filters } if filters.contains("supervisor")));
    }

    #[test]
    fn test_justification_and_table() {
        let roster = Roster::from_records(vec![
            person("alice", "X", 100, 0, LastReview::Never),
            person("bob", "Y", 90, 1, date(2024, 3, 1)),
        ]);
        let sel = Selector::default()
            .select_reviewer(&roster, &SelectionRequest::new("Z"), &mut rng())
            .unwrap();

        let text = sel.justification();
        assert!(text.starts_with("Selected reviewer: alice Name (alice)"));
        assert!(text.ends_with("- highest adjusted score"));

        let table = sel.table();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Github ID"));
        assert!(lines[2].starts_with("alice"));
        assert!(lines[3].contains("2024-03-01"));
    }
}
