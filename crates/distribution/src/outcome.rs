use serde::{Deserialize, Serialize};

/// Classification of an allocation against what was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    FullyMatched,
    PartiallyMatched,
    NotMatched,
}

impl MatchOutcome {
    /// `0` → not matched, less than requested → partial, otherwise full.
    pub fn classify(requested: u64, allocated: u64) -> Self {
        if allocated == 0 {
            MatchOutcome::NotMatched
        } else if allocated < requested {
            MatchOutcome::PartiallyMatched
        } else {
            MatchOutcome::FullyMatched
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOutcome::FullyMatched => "fully_matched",
            MatchOutcome::PartiallyMatched => "partially_matched",
            MatchOutcome::NotMatched => "not_matched",
        }
    }
}

impl core::fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-outcome counts for the operator's breakdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeTally {
    pub fully_matched: usize,
    pub partially_matched: usize,
    pub not_matched: usize,
}

impl OutcomeTally {
    pub fn record(&mut self, outcome: MatchOutcome) {
        match outcome {
            MatchOutcome::FullyMatched => self.fully_matched += 1,
            MatchOutcome::PartiallyMatched => self.partially_matched += 1,
            MatchOutcome::NotMatched => self.not_matched += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.fully_matched + self.partially_matched + self.not_matched
    }
}

impl FromIterator<MatchOutcome> for OutcomeTally {
    fn from_iter<T: IntoIterator<Item = MatchOutcome>>(iter: T) -> Self {
        let mut tally = OutcomeTally::default();
        for outcome in iter {
            tally.record(outcome);
        }
        tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_boundaries() {
        assert_eq!(MatchOutcome::classify(6, 0), MatchOutcome::NotMatched);
        assert_eq!(MatchOutcome::classify(6, 1), MatchOutcome::PartiallyMatched);
        assert_eq!(MatchOutcome::classify(6, 5), MatchOutcome::PartiallyMatched);
        assert_eq!(MatchOutcome::classify(6, 6), MatchOutcome::FullyMatched);
    }

    #[test]
    fn tally_counts_each_outcome() {
        let tally: OutcomeTally = [
            MatchOutcome::FullyMatched,
            MatchOutcome::NotMatched,
            MatchOutcome::FullyMatched,
            MatchOutcome::PartiallyMatched,
        ]
        .into_iter()
        .collect();

        assert_eq!(tally.fully_matched, 2);
        assert_eq!(tally.partially_matched, 1);
        assert_eq!(tally.not_matched, 1);
        assert_eq!(tally.total(), 4);
    }
}
