use crate::core::DocError;

/// Result of one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Submission order within the writer, starting at 0.
    pub sequence: u64,
    /// Documents handed to the store.
    pub attempted: usize,
    /// Documents the store reports as written (inserted, matched or upserted).
    pub written: usize,
    pub error: Option<DocError>,
}

impl WriteOutcome {
    pub fn success(sequence: u64, attempted: usize, written: usize) -> Self {
        Self {
            sequence,
            attempted,
            written,
            error: None,
        }
    }

    pub fn failure(sequence: u64, attempted: usize, error: DocError) -> Self {
        Self {
            sequence,
            attempted,
            written: error.written(),
            error: Some(error),
        }
    }

    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate of everything a writer processed.
///
/// A writer never stops on a failed unit, so a report can mix successes and
/// failures. Check [`all_succeeded`](Self::all_succeeded) rather than relying
/// on the absence of a top-level error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Documents handed to the store across all units.
    pub handled: usize,
    /// Per-unit outcomes, in completion order.
    pub outcomes: Vec<WriteOutcome>,
}

impl WriteReport {
    pub fn new(outcomes: Vec<WriteOutcome>) -> Self {
        let handled = outcomes.iter().map(|o| o.attempted).sum();
        Self { handled, outcomes }
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(WriteOutcome::ok)
    }

    /// Documents actually written, including partial writes of failed units.
    pub fn best_effort_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.written).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &WriteOutcome> {
        self.outcomes.iter().filter(|o| !o.ok())
    }

    pub fn failed_units(&self) -> usize {
        self.failures().count()
    }

    /// Outcomes sorted by submission order.
    pub fn in_submission_order(&self) -> Vec<&WriteOutcome> {
        let mut sorted: Vec<&WriteOutcome> = self.outcomes.iter().collect();
        sorted.sort_by_key(|o| o.sequence);
        sorted
    }
}

/// Passed to drain callbacks when a writer's queue empties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Documents handed to the store since the writer was created.
    pub handled: usize,
    /// Documents written since the writer was created.
    pub written: usize,
    /// Units that recorded an error since the writer was created.
    pub failed_units: usize,
}

impl DrainSummary {
    pub fn ok(&self) -> bool {
        self.failed_units == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_aggregates() {
        let report = WriteReport::new(vec![
            WriteOutcome::success(1, 10, 10),
            WriteOutcome::failure(
                0,
                10,
                DocError::BulkWrite {
                    written: 4,
                    message: "dup".into(),
                },
            ),
            WriteOutcome::failure(2, 5, DocError::Write("down".into())),
        ]);

        assert_eq!(report.handled, 25);
        assert_eq!(report.best_effort_count(), 14);
        assert!(!report.all_succeeded());
        assert_eq!(report.failed_units(), 2);

        let order: Vec<u64> = report.in_submission_order().iter().map(|o| o.sequence).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_report_succeeds() {
        let report = WriteReport::default();
        assert!(report.all_succeeded());
        assert_eq!(report.best_effort_count(), 0);
    }
}
