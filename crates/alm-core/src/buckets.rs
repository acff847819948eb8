//! Tenor buckets for liquidity and repricing gap tables.
//!
//! A bucket is identified by its label and the last day (relative to the
//! calculation date) it covers. The final bucket of a set may be open-ended.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AlmError;
use crate::AlmResult;

/// Days assumed for the width of an open-ended bucket when a midpoint is
/// needed.
const OPEN_BUCKET_MIDPOINT_OFFSET: i64 = 365;

const DAYS_PER_YEAR: Decimal = Decimal::from_parts(365, 0, 0, false, 0);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBucket {
    pub label: String,
    /// Last day covered (inclusive). `None` = open-ended.
    #[serde(default)]
    pub end_day: Option<i64>,
}

impl TimeBucket {
    pub fn closed(label: &str, end_day: i64) -> Self {
        TimeBucket {
            label: label.to_string(),
            end_day: Some(end_day),
        }
    }

    pub fn open(label: &str) -> Self {
        TimeBucket {
            label: label.to_string(),
            end_day: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketSet {
    pub buckets: Vec<TimeBucket>,
}

impl BucketSet {
    pub fn new(buckets: Vec<TimeBucket>) -> AlmResult<Self> {
        let set = BucketSet { buckets };
        set.validate()?;
        Ok(set)
    }

    /// Daily-granular liquidity ladder used by survival horizon and
    /// liquidity gaps.
    pub fn liquidity_default() -> Self {
        BucketSet {
            buckets: vec![
                TimeBucket::closed("overnight", 1),
                TimeBucket::closed("2-7d", 7),
                TimeBucket::closed("8-14d", 14),
                TimeBucket::closed("15-30d", 30),
                TimeBucket::closed("30-90d", 90),
                TimeBucket::closed("90-180d", 180),
                TimeBucket::closed("180-365d", 365),
                TimeBucket::closed("1-2y", 730),
                TimeBucket::open("2y+"),
            ],
        }
    }

    /// Repricing ladder used by interest-rate gaps.
    pub fn repricing_default() -> Self {
        BucketSet {
            buckets: vec![
                TimeBucket::closed("0-1m", 30),
                TimeBucket::closed("1-3m", 90),
                TimeBucket::closed("3-6m", 180),
                TimeBucket::closed("6-12m", 365),
                TimeBucket::closed("1-2y", 730),
                TimeBucket::closed("2-3y", 1095),
                TimeBucket::closed("3-5y", 1825),
                TimeBucket::closed("5-7y", 2555),
                TimeBucket::closed("7-10y", 3650),
                TimeBucket::open("10y+"),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.buckets.iter().map(|b| b.label.clone()).collect()
    }

    pub fn label(&self, idx: usize) -> &str {
        &self.buckets[idx].label
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.buckets.iter().position(|b| b.label == label)
    }

    pub fn validate(&self) -> AlmResult<()> {
        if self.buckets.is_empty() {
            return Err(AlmError::invalid("buckets", "At least one bucket is required"));
        }
        let mut prev_end: i64 = 0;
        for (i, b) in self.buckets.iter().enumerate() {
            if b.label.trim().is_empty() {
                return Err(AlmError::invalid(
                    format!("buckets[{i}].label"),
                    "Bucket label must not be empty",
                ));
            }
            if self.buckets[..i].iter().any(|p| p.label == b.label) {
                return Err(AlmError::invalid(
                    format!("buckets[{i}].label"),
                    format!("Duplicate bucket label '{}'", b.label),
                ));
            }
            match b.end_day {
                Some(end) => {
                    if end <= prev_end {
                        return Err(AlmError::invalid(
                            format!("buckets[{i}].end_day"),
                            "Bucket end days must be positive and strictly increasing",
                        ));
                    }
                    prev_end = end;
                }
                None => {
                    if i != self.buckets.len() - 1 {
                        return Err(AlmError::invalid(
                            format!("buckets[{i}].end_day"),
                            "Only the last bucket may be open-ended",
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Bucket index for a flow `days` after the calculation date. Past-due
    /// and same-day flows land in the first bucket.
    pub fn assign(&self, days: i64) -> Option<usize> {
        for (i, b) in self.buckets.iter().enumerate() {
            match b.end_day {
                Some(end) if days <= end => return Some(i),
                Some(_) => continue,
                None => return Some(i),
            }
        }
        None
    }

    pub fn start_day(&self, idx: usize) -> i64 {
        if idx == 0 {
            0
        } else {
            self.buckets[idx - 1].end_day.unwrap_or(0)
        }
    }

    /// End of the bucket in days; open-ended buckets report `cap`.
    pub fn horizon_days(&self, idx: usize, cap: i64) -> i64 {
        self.buckets[idx].end_day.unwrap_or(cap)
    }

    /// Representative day inside a bucket, used to date behavioral flows.
    pub fn midpoint_days(&self, idx: usize) -> i64 {
        let start = self.start_day(idx);
        let mid = match self.buckets[idx].end_day {
            Some(end) => start + (end - start + 1) / 2,
            None => start + OPEN_BUCKET_MIDPOINT_OFFSET,
        };
        mid.max(1)
    }

    /// Label for anything past the end of the ladder: the open bucket's own
    /// label, or the last closed label suffixed with `+`.
    pub fn tail_label(&self) -> String {
        match self.buckets.last() {
            Some(b) if b.end_day.is_none() => b.label.clone(),
            Some(b) => format!("{}+", b.label),
            None => String::new(),
        }
    }

    /// Midpoint expressed in years, a duration proxy for EVE.
    pub fn midpoint_years(&self, idx: usize) -> Decimal {
        Decimal::from(self.midpoint_days(idx)) / DAYS_PER_YEAR
    }
}
