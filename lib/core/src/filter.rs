// Filter plans: typed clauses validated against their operator at parse time
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

pub type FilterId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Neq,
    In,
    Gte,
    Lte,
    Range,
    Contains,
}

impl Operator {
    /// Operators that compare against occurrence numbers
    #[inline]
    pub fn is_numeric(self) -> bool {
        matches!(self, Operator::Eq | Operator::Gte | Operator::Lte | Operator::Range)
    }

    /// Result of the operator when the item has no occurrence of the attribute.
    /// Negative assertions are vacuously true.
    #[inline]
    pub fn absent_result(self) -> bool {
        matches!(self, Operator::Neq | Operator::In)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::In => "in",
            Operator::Gte => "gte",
            Operator::Lte => "lte",
            Operator::Range => "range",
            Operator::Contains => "contains",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single string or number operand
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Number(f64),
}

impl Scalar {
    /// Numeric reading of the scalar. Numeric strings such as "2.5" count.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Scalar::Text(s) => Cow::Borrowed(s),
            Scalar::Number(n) => Cow::Owned(n.to_string()),
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Scalar::Text(s.clone())),
            Value::Number(n) => n.as_f64().map(Scalar::Number),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Scalar::Text(s) => Value::String(s.clone()),
            Scalar::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Number(n)
    }
}

/// Clause operand, shaped by the operator
#[derive(Debug, Clone, PartialEq)]
pub enum ClauseValue {
    Scalar(Scalar),
    /// Inclusive numeric bound
    Range { low: f64, high: f64 },
    List(Vec<Scalar>),
}

/// One attribute constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawClause", into = "RawClause")]
pub struct Clause {
    pub attr: String,
    pub op: Operator,
    pub value: ClauseValue,
    /// Unit the occurrence numbers are converted to before comparison
    pub unit: Option<String>,
}

impl Clause {
    /// Build and validate a clause from its wire parts
    pub fn new(attr: impl Into<String>, op: Operator, value: Value, unit: Option<&str>) -> Result<Self> {
        Clause::try_from(RawClause {
            attr: attr.into(),
            op,
            value,
            unit: unit.map(str::to_string),
        })
    }

    #[must_use]
    pub fn eq(attr: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::scalar(attr, Operator::Eq, value.into())
    }

    #[must_use]
    pub fn neq(attr: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::scalar(attr, Operator::Neq, value.into())
    }

    #[must_use]
    pub fn contains(attr: impl Into<String>, value: &str) -> Self {
        Self::scalar(attr, Operator::Contains, Scalar::from(value))
    }

    #[must_use]
    pub fn gte(attr: impl Into<String>, value: f64) -> Self {
        Self::scalar(attr, Operator::Gte, Scalar::Number(value))
    }

    #[must_use]
    pub fn lte(attr: impl Into<String>, value: f64) -> Self {
        Self::scalar(attr, Operator::Lte, Scalar::Number(value))
    }

    #[must_use]
    pub fn range(attr: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            attr: attr.into(),
            op: Operator::Range,
            value: ClauseValue::Range { low, high },
            unit: None,
        }
    }

    #[must_use]
    pub fn one_of(attr: impl Into<String>, values: Vec<Scalar>) -> Self {
        Self {
            attr: attr.into(),
            op: Operator::In,
            value: ClauseValue::List(values),
            unit: None,
        }
    }

    #[must_use]
    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    fn scalar(attr: impl Into<String>, op: Operator, value: Scalar) -> Self {
        Self {
            attr: attr.into(),
            op,
            value: ClauseValue::Scalar(value),
            unit: None,
        }
    }

    /// Scalar operand, if the clause has one
    pub fn scalar_value(&self) -> Option<&Scalar> {
        match &self.value {
            ClauseValue::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

/// Wire shape of a clause: `{attr, op, value, unit}` with an untyped value
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawClause {
    attr: String,
    op: Operator,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    unit: Option<String>,
}

impl TryFrom<RawClause> for Clause {
    type Error = Error;

    fn try_from(raw: RawClause) -> Result<Self> {
        let invalid = |msg: &str| Error::InvalidPlan(format!("{} {}: {}", raw.attr, raw.op, msg));

        if raw.attr.trim().is_empty() {
            return Err(Error::InvalidPlan("clause without attribute".to_string()));
        }

        let value = match raw.op {
            Operator::Range => {
                let (low, high) = match &raw.value {
                    Value::Object(bounds) => (
                        bounds.get("gte").and_then(Scalar::from_json),
                        bounds.get("lte").and_then(Scalar::from_json),
                    ),
                    Value::Array(items) if items.len() == 2 => {
                        (Scalar::from_json(&items[0]), Scalar::from_json(&items[1]))
                    }
                    _ => return Err(invalid("range expects {gte, lte} or [low, high]")),
                };
                let low = low
                    .and_then(|s| s.as_number())
                    .ok_or_else(|| invalid("range lower bound is not a number"))?;
                let high = high
                    .and_then(|s| s.as_number())
                    .ok_or_else(|| invalid("range upper bound is not a number"))?;
                if low > high {
                    return Err(invalid("range lower bound exceeds upper bound"));
                }
                ClauseValue::Range { low, high }
            }
            Operator::In => match &raw.value {
                Value::Array(items) => ClauseValue::List(
                    items
                        .iter()
                        .map(|v| Scalar::from_json(v).ok_or_else(|| invalid("list members must be strings or numbers")))
                        .collect::<Result<Vec<_>>>()?,
                ),
                other => ClauseValue::List(vec![
                    Scalar::from_json(other).ok_or_else(|| invalid("expects a list of scalars"))?
                ]),
            },
            Operator::Gte | Operator::Lte => {
                let scalar = Scalar::from_json(&raw.value)
                    .filter(|s| s.as_number().is_some())
                    .ok_or_else(|| invalid("expects a numeric bound"))?;
                ClauseValue::Scalar(scalar)
            }
            Operator::Eq | Operator::Neq | Operator::Contains => ClauseValue::Scalar(
                Scalar::from_json(&raw.value).ok_or_else(|| invalid("expects a string or number"))?,
            ),
        };

        Ok(Clause {
            unit: raw.unit.filter(|u| !u.trim().is_empty()),
            attr: raw.attr,
            op: raw.op,
            value,
        })
    }
}

impl From<Clause> for RawClause {
    fn from(clause: Clause) -> Self {
        let value = match &clause.value {
            ClauseValue::Scalar(s) => s.to_json(),
            ClauseValue::Range { low, high } => serde_json::json!({ "gte": low, "lte": high }),
            ClauseValue::List(items) => Value::Array(items.iter().map(Scalar::to_json).collect()),
        };
        RawClause {
            attr: clause.attr,
            op: clause.op,
            value,
            unit: clause.unit,
        }
    }
}

/// A boolean query over attribute clauses.
///
/// `should` is carried for shape compatibility; it never affects matching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterPlan {
    pub must: Vec<Clause>,
    pub must_not: Vec<Clause>,
    pub should: Vec<Clause>,
}

impl FilterPlan {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn must(mut self, clause: Clause) -> Self {
        self.must.push(clause);
        self
    }

    #[must_use]
    pub fn must_not(mut self, clause: Clause) -> Self {
        self.must_not.push(clause);
        self
    }

    #[must_use]
    pub fn should(mut self, clause: Clause) -> Self {
        self.should.push(clause);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty() && self.should.is_empty()
    }

    /// Parse and validate the JSON wire form
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidPlan(e.to_string()))
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::InvalidPlan(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A compiled plan persisted for reuse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedFilter {
    pub id: FilterId,
    pub name: String,
    pub plan: FilterPlan,
    pub created_at: DateTime<Utc>,
}

impl SavedFilter {
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<FilterId>, name: impl Into<String>, plan: FilterPlan) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            plan,
            created_at: Utc::now(),
        }
    }
}
