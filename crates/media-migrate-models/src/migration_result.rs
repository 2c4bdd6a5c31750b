use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::destination::DestinationShowMatch;
use crate::show_ids::ShowIds;

/// Per-show outcome of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationResult {
    pub title: String,
    pub source_ids: ShowIds,
    pub destination: DestinationShowMatch,
    pub episodes_marked: usize,
    pub seasons_marked: usize,
    /// Episodes skipped because the destination already had them logged
    pub already_watched: usize,
    pub errors: Vec<String>,
}

impl MigrationResult {
    pub fn new(title: impl Into<String>, source_ids: ShowIds, destination: DestinationShowMatch) -> Self {
        Self {
            title: title.into(),
            source_ids,
            destination,
            episodes_marked: 0,
            seasons_marked: 0,
            already_watched: 0,
            errors: Vec::new(),
        }
    }

    pub fn matched(&self) -> bool {
        self.destination.is_matched()
    }

    /// Matched, but at least one write or season lookup failed
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.matched() && !self.has_errors()
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }
}

/// Running counts shown on the console after every show.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tally {
    pub matched: usize,
    pub unresolved: usize,
    pub failed: usize,
}

impl Tally {
    pub fn record(&mut self, result: &MigrationResult) {
        if !result.matched() {
            self.unresolved += 1;
        } else if result.has_errors() {
            self.failed += 1;
        } else {
            self.matched += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.matched + self.unresolved + self.failed
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    /// Some shows were unresolved or had failed writes
    Partial,
    /// Run aborted mid-way, or no show migrated cleanly
    TotalFailure,
    Interrupted,
    /// Everything migrated but the log sink reported write failures
    LogIncomplete,
}

/// Run-level record appended to by the migration loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSummary {
    pub results: Vec<MigrationResult>,
    pub tally: Tally,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub interrupted: bool,
    /// Reason the run was aborted by a fatal error, if it was
    pub aborted: Option<String>,
    pub log_failures: usize,
}

impl MigrationSummary {
    pub fn new() -> Self {
        Self {
            results: Vec::new(),
            tally: Tally::default(),
            started_at: Utc::now(),
            finished_at: None,
            interrupted: false,
            aborted: None,
            log_failures: 0,
        }
    }

    pub fn push(&mut self, result: MigrationResult) {
        self.tally.record(&result);
        self.results.push(result);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn episodes_marked(&self) -> usize {
        self.results.iter().map(|r| r.episodes_marked).sum()
    }

    pub fn outcome(&self) -> RunOutcome {
        if self.aborted.is_some() {
            return RunOutcome::TotalFailure;
        }
        if self.interrupted {
            return RunOutcome::Interrupted;
        }
        if !self.results.is_empty() && self.tally.matched == 0 {
            return RunOutcome::TotalFailure;
        }
        if self.tally.unresolved > 0 || self.tally.failed > 0 {
            return RunOutcome::Partial;
        }
        if self.log_failures > 0 {
            return RunOutcome::LogIncomplete;
        }
        RunOutcome::Success
    }
}

impl Default for MigrationSummary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::MatchMethod;

    fn matched(title: &str) -> MigrationResult {
        MigrationResult::new(
            title,
            ShowIds::default(),
            DestinationShowMatch::Matched {
                show_id: 1,
                method: MatchMethod::ExternalId,
                score: 1.0,
            },
        )
    }

    fn unresolved(title: &str) -> MigrationResult {
        MigrationResult::new(
            title,
            ShowIds::default(),
            DestinationShowMatch::Unresolved {
                reason: "no search hits".to_string(),
            },
        )
    }

    #[test]
    fn test_tally_counts_each_show_once() {
        let mut summary = MigrationSummary::new();
        summary.push(matched("A"));
        let mut failed = matched("B");
        failed.record_error("S01E02: mark failed");
        summary.push(failed);
        summary.push(unresolved("C"));

        assert_eq!(summary.tally, Tally { matched: 1, unresolved: 1, failed: 1 });
        assert_eq!(summary.tally.total(), 3);
        assert_eq!(summary.outcome(), RunOutcome::Partial);
    }

    #[test]
    fn test_outcome_success_and_empty_history() {
        let mut summary = MigrationSummary::new();
        assert_eq!(summary.outcome(), RunOutcome::Success);
        summary.push(matched("A"));
        assert_eq!(summary.outcome(), RunOutcome::Success);
    }

    #[test]
    fn test_outcome_total_failure_when_nothing_migrated() {
        let mut summary = MigrationSummary::new();
        summary.push(unresolved("A"));
        summary.push(unresolved("B"));
        assert_eq!(summary.outcome(), RunOutcome::TotalFailure);
    }

    #[test]
    fn test_outcome_precedence() {
        let mut summary = MigrationSummary::new();
        summary.push(matched("A"));
        summary.log_failures = 2;
        assert_eq!(summary.outcome(), RunOutcome::LogIncomplete);

        summary.interrupted = true;
        assert_eq!(summary.outcome(), RunOutcome::Interrupted);

        summary.aborted = Some("serializd unavailable".to_string());
        assert_eq!(summary.outcome(), RunOutcome::TotalFailure);
    }
}
