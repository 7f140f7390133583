//! # Feature Schema and Record Binding
//!
//! The model artifact fixes an ordered list of feature names. Every row handed
//! to inference must carry exactly those features in exactly that order, and
//! this module is where free-form values are forced into that shape.
//!
//! - Single-record binding never fails: names the caller did not supply are
//!   bound to `0.0` and names the schema does not know are dropped.
//! - The interactive form exposes only nine of the model's features. Their
//!   defaults and lower bounds live here alongside the binder.

use ahash::AHashMap;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::BuildHasher;
use thiserror::Error;

pub const ASSETS_TOTAL: &str = "Assets - Total";
pub const LIABILITIES_TOTAL: &str = "Liabilities - Total";
pub const EMPLOYEES: &str = "Employees";
pub const CASH: &str = "Cash";
pub const RETAINED_EARNINGS: &str = "Retained Earnings";
pub const MARKET_VALUE: &str = "Market Value - Total - Fiscal";
pub const INVENTORIES_TOTAL: &str = "Inventories - Total";
pub const STOCKHOLDERS_EQUITY: &str = "Stockholders Equity - Total";
pub const DEBT_TO_ASSETS: &str = "Total debt/total asset";

/// The nine feature names exposed by the single-record form, in display order.
pub const FORM_FIELDS: [&str; 9] = [
    ASSETS_TOTAL,
    LIABILITIES_TOTAL,
    EMPLOYEES,
    CASH,
    RETAINED_EARNINGS,
    MARKET_VALUE,
    INVENTORIES_TOTAL,
    STOCKHOLDERS_EQUITY,
    DEBT_TO_ASSETS,
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("The feature list is empty. A model must declare at least one input feature.")]
    Empty,
    #[error("The feature '{0}' appears more than once in the feature list.")]
    DuplicateFeature(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormError {
    #[error("The form field '{field}' must be at least {minimum}, but {value} was entered.")]
    BelowMinimum {
        field: &'static str,
        minimum: f64,
        value: f64,
    },
    #[error("The form field '{0}' must be a finite number.")]
    NonFinite(&'static str),
}

/// The ordered list of features a trained model consumes.
///
/// Construction rejects duplicates, so every name maps to exactly one column.
#[derive(Debug, Clone)]
pub struct FeatureSchema {
    names: Vec<String>,
    index: AHashMap<String, usize>,
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Result<Self, SchemaError> {
        if names.is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut index = AHashMap::with_capacity(names.len());
        for (position, name) in names.iter().enumerate() {
            if index.insert(name.clone(), position).is_some() {
                return Err(SchemaError::DuplicateFeature(name.clone()));
            }
        }

        Ok(Self { names, index })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Column position of `name`, if the model uses it.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}

/// Binds a partial set of named values to the schema.
///
/// The output has one entry per schema feature, in schema order. Features with
/// no supplied value are bound to `0.0`; supplied names outside the schema are
/// ignored.
pub fn bind<S: BuildHasher>(
    schema: &FeatureSchema,
    known_values: &HashMap<String, f64, S>,
) -> Array1<f64> {
    let ignored = known_values
        .keys()
        .filter(|name| !schema.contains(name))
        .count();
    if ignored > 0 {
        log::debug!("Ignoring {ignored} supplied values with no matching model feature");
    }

    schema
        .names()
        .iter()
        .map(|name| known_values.get(name).copied().unwrap_or(0.0))
        .collect()
}

/// Values entered into the single-record form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormInput {
    pub assets: f64,
    pub liabilities: f64,
    pub employees: u64,
    pub cash: f64,
    pub retained_earnings: f64,
    pub market_value: f64,
    pub inventory: f64,
    pub equity: f64,
    pub debt_ratio: f64,
}

impl Default for FormInput {
    fn default() -> Self {
        Self {
            assets: 5000.0,
            liabilities: 3000.0,
            employees: 120,
            cash: 800.0,
            retained_earnings: 1500.0,
            market_value: 12000.0,
            inventory: 400.0,
            equity: 2000.0,
            debt_ratio: 0.45,
        }
    }
}

impl FormInput {
    /// Checks the bounds the form enforces. Retained earnings and the debt
    /// ratio may be negative; everything else is non-negative and at least one
    /// employee is required.
    pub fn validate(&self) -> Result<(), FormError> {
        for (field, value) in self.fields() {
            if !value.is_finite() {
                return Err(FormError::NonFinite(field));
            }
        }

        let non_negative = [
            (ASSETS_TOTAL, self.assets),
            (LIABILITIES_TOTAL, self.liabilities),
            (CASH, self.cash),
            (MARKET_VALUE, self.market_value),
            (INVENTORIES_TOTAL, self.inventory),
            (STOCKHOLDERS_EQUITY, self.equity),
        ];
        for (field, value) in non_negative {
            if value < 0.0 {
                return Err(FormError::BelowMinimum {
                    field,
                    minimum: 0.0,
                    value,
                });
            }
        }

        if self.employees < 1 {
            return Err(FormError::BelowMinimum {
                field: EMPLOYEES,
                minimum: 1.0,
                value: self.employees as f64,
            });
        }

        Ok(())
    }

    /// The form values keyed by their model feature names, in display order.
    pub fn fields(&self) -> [(&'static str, f64); 9] {
        [
            (ASSETS_TOTAL, self.assets),
            (LIABILITIES_TOTAL, self.liabilities),
            (EMPLOYEES, self.employees as f64),
            (CASH, self.cash),
            (RETAINED_EARNINGS, self.retained_earnings),
            (MARKET_VALUE, self.market_value),
            (INVENTORIES_TOTAL, self.inventory),
            (STOCKHOLDERS_EQUITY, self.equity),
            (DEBT_TO_ASSETS, self.debt_ratio),
        ]
    }

    /// Validates the form and binds it to `schema`. Model features the form
    /// does not expose are bound to `0.0`.
    pub fn to_record(&self, schema: &FeatureSchema) -> Result<Array1<f64>, FormError> {
        self.validate()?;

        let known_values: AHashMap<String, f64> = self
            .fields()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();

        for name in FORM_FIELDS {
            if !schema.contains(name) {
                log::warn!("Form field '{name}' is not a feature of the loaded model and will not affect the forecast");
            }
        }

        Ok(bind(schema, &*known_values))
    }
}
