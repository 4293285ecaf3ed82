//! Metrics aggregation over a normalized table and its income estimates.
//!
//! The bundle has a fixed shape: a five-bucket income histogram, the
//! age/income scatter series, gender and top-five city counts, and summary
//! statistics over the estimates. Aggregation is a pure function of its
//! inputs.

use std::collections::HashMap;

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::{
    error::{IncomeError, IncomeResult},
    normalize::{Cell, NormalizedTable},
};

pub const INCOME_BUCKET_LABELS: [&str; 5] = ["0-50k", "50-100k", "100-150k", "150-200k", "200k+"];
/// Inclusive upper bound of each histogram bucket.
pub const INCOME_BUCKET_UPPER: [f64; 5] = [50_000.0, 100_000.0, 150_000.0, 200_000.0, f64::INFINITY];
pub const TOP_CITIES: usize = 5;

pub const GENDER_COLUMN: &str = "gender";
pub const CITY_COLUMN: &str = "city";
pub const AGE_COLUMN: &str = "age";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabeledCounts {
    pub labels: Vec<String>,
    pub values: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgeVsIncome {
    /// Ages as supplied; `None` where the source cell was missing.
    pub ages: Vec<Option<Cell>>,
    pub incomes: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionStats {
    pub mean_income: f64,
    pub median_income: f64,
    pub min_income: f64,
    pub max_income: f64,
    pub total_users: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsBundle {
    pub income_distribution: LabeledCounts,
    pub age_vs_income: AgeVsIncome,
    pub gender_distribution: LabeledCounts,
    pub city_distribution: LabeledCounts,
    pub prediction_stats: PredictionStats,
}

pub fn aggregate(table: &NormalizedTable, estimates: &[f64]) -> IncomeResult<MetricsBundle> {
    if table.row_count() != estimates.len() {
        error!(
            "Cannot aggregate {} row(s) against {} estimate(s)",
            table.row_count(),
            estimates.len()
        );
        return Err(IncomeError::ShapeMismatch {
            rows: table.row_count(),
            estimates: estimates.len(),
        });
    }

    let bundle = MetricsBundle {
        income_distribution: income_histogram(estimates),
        age_vs_income: AgeVsIncome {
            ages: table
                .column(AGE_COLUMN)
                .map(|column| {
                    (0..table.row_count())
                        .map(|row| column.present(row).cloned())
                        .collect()
                })
                .unwrap_or_default(),
            incomes: estimates.to_vec(),
        },
        gender_distribution: value_counts(table, GENDER_COLUMN, None),
        city_distribution: value_counts(table, CITY_COLUMN, Some(TOP_CITIES)),
        prediction_stats: summarize(estimates, table.row_count()),
    };
    info!("Metrics calculated for {} row(s)", table.row_count());
    Ok(bundle)
}

pub fn bucket_index(value: f64) -> usize {
    INCOME_BUCKET_UPPER
        .iter()
        .position(|upper| value <= *upper)
        .unwrap_or(INCOME_BUCKET_UPPER.len() - 1)
}

pub fn income_histogram(estimates: &[f64]) -> LabeledCounts {
    let mut values = vec![0usize; INCOME_BUCKET_LABELS.len()];
    for estimate in estimates {
        values[bucket_index(*estimate)] += 1;
    }
    LabeledCounts {
        labels: INCOME_BUCKET_LABELS.iter().map(|l| l.to_string()).collect(),
        values,
    }
}

/// Counts supplied values of `column`, most frequent first; ties keep the
/// order in which values were first seen.
fn value_counts(table: &NormalizedTable, column: &str, top: Option<usize>) -> LabeledCounts {
    let Some(column) = table.column(column) else {
        return LabeledCounts::default();
    };
    let mut counter = FrequencyCounter::default();
    for row in 0..table.row_count() {
        if let Some(cell) = column.present(row) {
            counter.add(cell.label());
        }
    }
    counter.into_counts(top)
}

#[derive(Default)]
struct FrequencyCounter {
    positions: HashMap<String, usize>,
    items: Vec<(String, usize)>,
}

impl FrequencyCounter {
    fn add(&mut self, label: String) {
        match self.positions.get(&label) {
            Some(&idx) => self.items[idx].1 += 1,
            None => {
                self.positions.insert(label.clone(), self.items.len());
                self.items.push((label, 1));
            }
        }
    }

    fn into_counts(mut self, top: Option<usize>) -> LabeledCounts {
        // stable sort keeps first-seen order among equal counts
        self.items.sort_by(|a, b| b.1.cmp(&a.1));
        if let Some(limit) = top {
            self.items.truncate(limit);
        }
        let (labels, values) = self.items.into_iter().unzip();
        LabeledCounts { labels, values }
    }
}

fn summarize(estimates: &[f64], row_count: usize) -> PredictionStats {
    if estimates.is_empty() {
        return PredictionStats {
            total_users: row_count,
            ..PredictionStats::default()
        };
    }
    let mut sorted = estimates.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };
    PredictionStats {
        mean_income: sorted.iter().sum::<f64>() / sorted.len() as f64,
        median_income: median,
        min_income: sorted[0],
        max_income: sorted[sorted.len() - 1],
        total_users: row_count,
    }
}
