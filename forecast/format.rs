//! Presentation helpers for a forecast: currency strings, the gauge scale, and
//! the ranked importance list.

use crate::inference::FeatureImportance;
use serde::{Deserialize, Serialize};

/// Number of features kept in the importance ranking by default.
pub const DEFAULT_TOP_K: usize = 10;

/// Smallest upper bound the gauge will ever show.
pub const DEFAULT_GAUGE_FLOOR: f64 = 10_000.0;

/// Multiplier applied to the prediction to leave room above the needle.
pub const DEFAULT_GAUGE_HEADROOM: f64 = 1.2;

/// Formats `value` as dollars with thousands separators and two decimals,
/// e.g. `$1,234.50`. Negative amounts render as `-$1,234.50`.
pub fn format_currency(value: f64) -> String {
    format_money(value, 2)
}

/// Dollars rounded to whole units, e.g. `$12,000`. Used for gauge tick labels.
pub fn format_currency_whole(value: f64) -> String {
    format_money(value, 0)
}

fn format_money(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return format!("${value}");
    }

    let fixed = format!("{:.*}", decimals, value.abs());
    let (whole, fraction) = match fixed.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (fixed.as_str(), None),
    };

    let grouped = group_thousands(whole);
    let body = match fraction {
        Some(fraction) => format!("{grouped}.{fraction}"),
        None => grouped,
    };

    // Values that round to zero lose their sign.
    let is_zero = fixed.chars().all(|c| c == '0' || c == '.');
    if value < 0.0 && !is_zero {
        format!("-${body}")
    } else {
        format!("${body}")
    }
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Display bounds of the revenue gauge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GaugeRange {
    pub min: f64,
    pub max: f64,
}

/// How the gauge's upper bound is derived from a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GaugeScale {
    pub floor: f64,
    pub headroom: f64,
}

impl Default for GaugeScale {
    fn default() -> Self {
        Self {
            floor: DEFAULT_GAUGE_FLOOR,
            headroom: DEFAULT_GAUGE_HEADROOM,
        }
    }
}

impl GaugeScale {
    /// `min` is always zero; `max` is the larger of the floor and the
    /// prediction scaled by the headroom factor.
    pub fn range(&self, value: f64) -> GaugeRange {
        GaugeRange {
            min: 0.0,
            max: self.floor.max(value * self.headroom),
        }
    }
}

/// Gauge bounds using the default floor and headroom.
pub fn gauge_range(value: f64) -> GaugeRange {
    GaugeScale::default().range(value)
}

/// The `k` most influential features, highest score first. Equal scores keep
/// their schema order.
pub fn top_k(importances: &[FeatureImportance], k: usize) -> Vec<FeatureImportance> {
    let mut ranked = importances.to_vec();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(k);
    ranked
}
