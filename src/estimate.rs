//! Deterministic income estimation.
//!
//! Each row draws a base figure from N(80000, 25000) using a generator seeded
//! with [`ESTIMATE_SEED`], so identical row counts always produce identical
//! base draws. An `age` column scales the base by `clamp(age / 40, 0.5, 2.0)`
//! where a missing or non-numeric age counts as [`DEFAULT_AGE`]. Results are
//! clamped to [`MIN_INCOME`, `MAX_INCOME`] and rounded to cents.

use log::info;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;

use crate::normalize::NormalizedTable;

pub const ESTIMATE_SEED: u64 = 42;
pub const BASE_MEAN: f64 = 80_000.0;
pub const BASE_STD_DEV: f64 = 25_000.0;
pub const MIN_INCOME: f64 = 30_000.0;
pub const MAX_INCOME: f64 = 300_000.0;
pub const DEFAULT_AGE: f64 = 35.0;
pub const AGE_COLUMN: &str = "age";

fn base_draws(count: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(ESTIMATE_SEED);
    (0..count)
        .map(|_| {
            let standard: f64 = rng.sample(StandardNormal);
            BASE_MEAN + BASE_STD_DEV * standard
        })
        .collect()
}

pub fn age_factor(age: f64) -> f64 {
    (age / 40.0).clamp(0.5, 2.0)
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Age used for scaling: the supplied value when it is numeric, otherwise
/// [`DEFAULT_AGE`]. Defaulted cells count as missing.
fn effective_ages(table: &NormalizedTable) -> Option<Vec<f64>> {
    let column = table.column(AGE_COLUMN)?;
    Some(
        (0..table.row_count())
            .map(|row| {
                column
                    .present(row)
                    .and_then(|cell| cell.as_f64())
                    .unwrap_or(DEFAULT_AGE)
            })
            .collect(),
    )
}

pub fn estimate_incomes(table: &NormalizedTable) -> Vec<f64> {
    let mut estimates = base_draws(table.row_count());

    if let Some(ages) = effective_ages(table) {
        for (estimate, age) in estimates.iter_mut().zip(ages) {
            *estimate *= age_factor(age);
        }
    }

    for estimate in &mut estimates {
        *estimate = round_cents(estimate.clamp(MIN_INCOME, MAX_INCOME));
    }
    info!("Generated income estimates for {} row(s)", estimates.len());
    estimates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{normalize::normalize, reader::parse_with_delimiter};

    fn table(text: &str) -> NormalizedTable {
        normalize(&parse_with_delimiter(text, b';').expect("parse"))
    }

    #[test]
    fn estimates_repeat_for_same_row_count() {
        let first = estimate_incomes(&table("id;city\n1;A\n2;B\n3;C\n"));
        let second = estimate_incomes(&table("id;city\n9;X\n8;Y\n7;Z\n"));
        assert_eq!(first, second);
    }

    #[test]
    fn base_draws_center_on_configured_mean() {
        let draws = base_draws(20_000);
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        let variance =
            draws.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / draws.len() as f64;
        assert!((mean - BASE_MEAN).abs() < 1_000.0, "mean {mean}");
        assert!((variance.sqrt() - BASE_STD_DEV).abs() < 1_000.0);
        assert_eq!(draws, base_draws(20_000));
    }

    #[test]
    fn age_factor_is_clamped() {
        assert_eq!(age_factor(10.0), 0.5);
        assert_eq!(age_factor(40.0), 1.0);
        assert_eq!(age_factor(120.0), 2.0);
    }

    #[test]
    fn missing_age_scales_as_default_age() {
        let estimates = estimate_incomes(&table("id;age\n1;30\n2;\n3;50\n"));
        let base = base_draws(3);
        let expected = [
            base[0] * age_factor(30.0),
            base[1] * age_factor(DEFAULT_AGE),
            base[2] * age_factor(50.0),
        ]
        .map(|v| round_cents(v.clamp(MIN_INCOME, MAX_INCOME)));
        assert_eq!(estimates, expected.to_vec());
    }

    #[test]
    fn textual_age_values_fall_back_to_default() {
        let with_text = estimate_incomes(&table("id;age\n1;unknown\n2;forty\n"));
        let defaulted = estimate_incomes(&table("id;age\n1;35\n2;35\n"));
        assert_eq!(with_text, defaulted);
    }

    #[test]
    fn estimates_stay_in_range_with_two_decimals() {
        let mut text = String::from("id;age\n");
        for i in 0..500 {
            text.push_str(&format!("{i};{}\n", i % 100));
        }
        for value in estimate_incomes(&table(&text)) {
            assert!((MIN_INCOME..=MAX_INCOME).contains(&value));
            assert_eq!(round_cents(value), value);
        }
    }
}
