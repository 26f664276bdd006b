//! Arithmetic left in test fixtures once placeholders have been substituted.
//!
//! Two shapes are recognised inside string leaves:
//!
//! - the droop formula `100±[c*]p[*(v±d)]`, evaluated to `(100 ± c·p)` or
//!   `(100 ± c·p)/100 · (v ± d)`;
//! - a plain coefficient product `c*v`, evaluated to `c·v`.
//!
//! A leaf whose rewritten text is a bare number becomes a JSON number.

use crate::value::format_decimal;
use regex::{Captures, Regex};
use serde_json::{Number, Value};
use std::sync::LazyLock;
use tracing::warn;

static DROOP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:100)([+-])(?:((?:\d*.)(?:\d+))(?:\*))?(\d+)(?:(?:\*\()(\d+)([+-])(\d+)(?:\)))?")
        .unwrap()
});

static COEFFICIENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:((?:-)?(?:\d*[.])?\d+)(?:\*))?((?:\d+)(?:[.]\d+)?)").unwrap());

static WILDCARD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\{\{\w+\}\}").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
}

impl Sign {
    fn parse(sign: &str) -> Self {
        if sign == "+" { Self::Plus } else { Self::Minus }
    }

    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Self::Plus => lhs + rhs,
            Self::Minus => lhs - rhs,
        }
    }
}

/// Terms of a droop formula `100<sign><coefficient>*<percent>*(<poi><sign><deadband>)`
#[derive(Debug, Clone, PartialEq)]
pub struct DroopExpression {
    pub sign: Sign,
    pub coefficient: Option<f64>,
    pub percent: f64,
    /// POI voltage, sign and deadband voltage
    pub voltage: Option<(f64, Sign, f64)>,
}

impl DroopExpression {
    /// Reads the terms out of a droop match. Returns `None` when a captured
    /// term is not a number.
    #[must_use]
    pub fn from_captures(caps: &Captures<'_>) -> Option<Self> {
        let number = |index: usize| caps.get(index).map(|m| m.as_str().parse::<f64>());

        let coefficient = number(2).transpose().ok()?;
        let percent = number(3)?.ok()?;
        let voltage = match (number(4), caps.get(5), number(6)) {
            (Some(poi), Some(sign), Some(deadband)) => {
                Some((poi.ok()?, Sign::parse(sign.as_str()), deadband.ok()?))
            }
            _ => None,
        };

        Some(Self {
            sign: Sign::parse(caps.get(1)?.as_str()),
            coefficient,
            percent,
            voltage,
        })
    }

    #[must_use]
    pub fn evaluate(&self) -> f64 {
        let percent = self.coefficient.map_or(self.percent, |c| c * self.percent);
        let percentage = self.sign.apply(100.0, percent);
        match self.voltage {
            Some((poi, sign, deadband)) => (percentage / 100.0) * sign.apply(poi, deadband),
            None => percentage,
        }
    }
}

/// Terms of a plain product `<coefficient>*<value>`, or a bare `<value>`
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientExpression<'t> {
    pub coefficient: Option<f64>,
    pub value: &'t str,
}

impl<'t> CoefficientExpression<'t> {
    #[must_use]
    pub fn from_captures(caps: &Captures<'t>) -> Option<Self> {
        let coefficient = match caps.get(1) {
            Some(c) => Some(c.as_str().parse::<f64>().ok()?),
            None => None,
        };
        Some(Self {
            coefficient,
            value: caps.get(2)?.as_str(),
        })
    }

    /// Replacement text: the product when a coefficient is present, the value
    /// verbatim otherwise.
    #[must_use]
    pub fn evaluate(&self) -> String {
        match self.coefficient {
            Some(coefficient) => match self.value.parse::<f64>() {
                Ok(value) => format_decimal(coefficient * value),
                Err(_) => self.value.to_string(),
            },
            None => self.value.to_string(),
        }
    }
}

fn rewrite_droop(caps: &Captures<'_>) -> String {
    DroopExpression::from_captures(caps)
        .map_or_else(|| caps[0].to_string(), |expr| format_decimal(expr.evaluate()))
}

fn rewrite_coefficient(caps: &Captures<'_>) -> String {
    CoefficientExpression::from_captures(caps)
        .map_or_else(|| caps[0].to_string(), |expr| expr.evaluate())
}

fn to_number(text: &str) -> Option<Value> {
    let number = text.trim().parse::<f64>().ok()?;
    Number::from_f64(number).map(Value::Number)
}

/// Evaluates the arithmetic in one string leaf.
///
/// The droop formula is rewritten first; if that alone leaves a bare number
/// the number is returned. Otherwise coefficient products are rewritten in the
/// result, which again becomes a number when nothing else is left.
#[must_use]
pub fn evaluate_string(text: &str) -> Value {
    if WILDCARD_RE.is_match(text) {
        warn!(leaf = text, "found an unreplaced wildcard");
    }

    let mut candidate = text.to_string();
    let droop = DROOP_RE.replace_all(text, rewrite_droop);
    if droop != text {
        if let Some(number) = to_number(&droop) {
            return number;
        }
        candidate = droop.into_owned();
    }

    let rewritten = COEFFICIENT_RE.replace_all(&candidate, rewrite_coefficient);
    if rewritten != candidate.as_str()
        && let Some(number) = to_number(&rewritten)
    {
        return number;
    }
    Value::String(rewritten.into_owned())
}

/// Rebuilds `value` with every string leaf evaluated. Mappings keep their key
/// order, sequences their element order; other scalars are returned as-is.
#[must_use]
pub fn walk(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, walk(v))).collect()),
        Value::Array(items) => Value::Array(items.into_iter().map(walk).collect()),
        Value::String(text) => evaluate_string(&text),
        other => other,
    }
}
