//! Calculation strategies reducing raw states to one aggregate value

use std::str::FromStr;

use hub_core::{State, STATE_OFF, STATE_ON, STATE_UNAVAILABLE};
use thiserror::Error;

use crate::config::AreaOptions;
use crate::kind::AggregateKind;

/// Errors from strategy selection
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CalculationError {
    #[error("unknown calculation strategy '{0}'")]
    UnknownStrategy(String),
}

/// A named reduction over the raw states of an area's contributors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calculation {
    Max,
    Min,
    Mean,
    Median,
    Last,
    All,
    One,
    None,
}

impl Calculation {
    pub fn key(self) -> &'static str {
        match self {
            Calculation::Max => "max",
            Calculation::Min => "min",
            Calculation::Mean => "mean",
            Calculation::Median => "median",
            Calculation::Last => "last",
            Calculation::All => "all",
            Calculation::One => "one",
            Calculation::None => "none",
        }
    }
}

impl FromStr for Calculation {
    type Err = CalculationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "max" => Ok(Calculation::Max),
            "min" => Ok(Calculation::Min),
            "mean" => Ok(Calculation::Mean),
            "median" => Ok(Calculation::Median),
            "last" => Ok(Calculation::Last),
            "all" => Ok(Calculation::All),
            "one" => Ok(Calculation::One),
            "none" => Ok(Calculation::None),
            other => Err(CalculationError::UnknownStrategy(other.to_string())),
        }
    }
}

/// The synthesized value of an aggregate
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateValue {
    Number(f64),
    Bool(bool),
    /// No contributor currently has a usable value
    Unavailable,
}

impl AggregateValue {
    /// The state string the aggregate entity is published with
    pub fn as_state(&self) -> String {
        match self {
            AggregateValue::Number(n) => format!("{n}"),
            AggregateValue::Bool(true) => STATE_ON.to_string(),
            AggregateValue::Bool(false) => STATE_OFF.to_string(),
            AggregateValue::Unavailable => STATE_UNAVAILABLE.to_string(),
        }
    }
}

/// Interpret a raw state as a boolean, accepting the usual truthy/falsy tokens
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "on" | "yes" | "true" | "1" => Some(true),
        "off" | "no" | "false" | "0" => Some(false),
        _ => Option::None,
    }
}

fn numeric_values(states: &[State]) -> Vec<f64> {
    states
        .iter()
        .filter_map(|s| s.state.parse::<f64>().ok())
        .collect()
}

/// Boolean-coercible values of a state list, in list order
pub fn boolean_values(states: &[State]) -> Vec<bool> {
    states
        .iter()
        .filter_map(|s| parse_bool(&s.state))
        .collect()
}

/// Reduce a list of raw states to one aggregate value
///
/// Every strategy filters to the values it can interpret; an empty filtered
/// list always yields [`AggregateValue::Unavailable`].
pub fn calculate(calculation: Calculation, states: &[State]) -> AggregateValue {
    match calculation {
        Calculation::Max => fold_numeric(states, |values| {
            values.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
        }),
        Calculation::Min => fold_numeric(states, |values| {
            values.iter().cloned().fold(f64::INFINITY, f64::min)
        }),
        Calculation::Mean => fold_numeric(states, |values| {
            values.iter().sum::<f64>() / values.len() as f64
        }),
        Calculation::Median => fold_numeric(states, median),
        Calculation::Last => last_updated_value(states),
        Calculation::All => fold_boolean(states, |values| values.iter().all(|v| *v)),
        Calculation::One => fold_boolean(states, |values| values.iter().any(|v| *v)),
        Calculation::None => fold_boolean(states, |values| !values.iter().any(|v| *v)),
    }
}

fn fold_numeric(states: &[State], f: impl FnOnce(&[f64]) -> f64) -> AggregateValue {
    let values = numeric_values(states);
    if values.is_empty() {
        AggregateValue::Unavailable
    } else {
        AggregateValue::Number(f(&values))
    }
}

fn fold_boolean(states: &[State], f: impl FnOnce(&[bool]) -> bool) -> AggregateValue {
    let values = boolean_values(states);
    if values.is_empty() {
        AggregateValue::Unavailable
    } else {
        AggregateValue::Bool(f(&values))
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// The most recently updated usable value; ties keep the earlier list entry
fn last_updated_value(states: &[State]) -> AggregateValue {
    let mut latest: Option<&State> = Option::None;
    for state in states.iter().filter(|s| s.is_usable()) {
        match latest {
            Some(current) if state.last_updated <= current.last_updated => {}
            _ => latest = Some(state),
        }
    }

    match latest {
        Option::None => AggregateValue::Unavailable,
        Some(state) => state
            .state
            .parse::<f64>()
            .ok()
            .map(AggregateValue::Number)
            .or_else(|| parse_bool(&state.state).map(AggregateValue::Bool))
            .unwrap_or(AggregateValue::Unavailable),
    }
}

/// Default strategy per aggregate kind
pub fn default_calculation(kind: AggregateKind) -> Calculation {
    match kind {
        AggregateKind::Illuminance => Calculation::Last,
        AggregateKind::Temperature => Calculation::Mean,
        AggregateKind::Humidity => Calculation::Max,
        AggregateKind::Presence => Calculation::All,
    }
}

/// Resolve the strategy for a kind from the options snapshot
///
/// An unknown override key is surfaced to the caller, never silently
/// replaced by the default.
pub fn calculation_for(
    options: &AreaOptions,
    kind: AggregateKind,
) -> Result<Calculation, CalculationError> {
    match options.calculation_override(kind) {
        Some(key) => key.parse(),
        Option::None => Ok(default_calculation(kind)),
    }
}
