//! Scalar metadata and metadata filters
//!
//! Metadata is a flat map of string keys to scalar values. Filters parsed
//! from callers may carry any condition; only conjunctive equality on scalar
//! values is portable across backends. [`MetadataFilter::to_equality`]
//! enforces that and yields the [`EqualityFilter`] handed to adapters.

use crate::error::{VectorError, VectorResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Keys starting with this prefix are reserved for adapter bookkeeping
pub const RESERVED_METADATA_PREFIX: &str = "_vh";

/// Scalar metadata map
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Metadata scalar
///
/// Arrays and objects are rejected at ingestion and in filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value (stored as f64)
    Number(f64),
    /// String value
    String(String),
}

impl MetadataValue {
    /// Convert a JSON value, returning None for arrays and objects
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null => Some(MetadataValue::Null),
            JsonValue::Bool(b) => Some(MetadataValue::Bool(*b)),
            JsonValue::Number(n) => n.as_f64().map(MetadataValue::Number),
            JsonValue::String(s) => Some(MetadataValue::String(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => None,
        }
    }

    /// Convert to JSON
    ///
    /// Integral numbers are emitted as JSON integers so that backends
    /// comparing JSON documents structurally see `1` rather than `1.0`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            MetadataValue::Null => JsonValue::Null,
            MetadataValue::Bool(b) => JsonValue::Bool(*b),
            MetadataValue::Number(n) => number_to_json(*n),
            MetadataValue::String(s) => JsonValue::String(s.clone()),
        }
    }

    /// Check if this scalar matches a stored value
    pub fn matches(&self, stored: &MetadataValue) -> bool {
        match (self, stored) {
            (MetadataValue::Null, MetadataValue::Null) => true,
            (MetadataValue::Bool(a), MetadataValue::Bool(b)) => a == b,
            (MetadataValue::Number(a), MetadataValue::Number(b)) => a == b,
            (MetadataValue::String(a), MetadataValue::String(b)) => a == b,
            _ => false,
        }
    }

    /// Check if this is the null value
    pub fn is_null(&self) -> bool {
        matches!(self, MetadataValue::Null)
    }

    /// Type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            MetadataValue::Null => "null",
            MetadataValue::Bool(_) => "bool",
            MetadataValue::Number(_) => "number",
            MetadataValue::String(_) => "string",
        }
    }
}

fn number_to_json(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        JsonValue::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl From<i32> for MetadataValue {
    fn from(v: i32) -> Self {
        MetadataValue::Number(v as f64)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Number(v as f64)
    }
}

impl From<f32> for MetadataValue {
    fn from(v: f32) -> Self {
        MetadataValue::Number(v as f64)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Number(v)
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::String(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::String(v.to_string())
    }
}

/// Convert a JSON object into metadata
///
/// # Errors
///
/// `InvalidMetadata` if the value is not an object or any field is an
/// array or object.
pub fn metadata_from_json(value: &JsonValue) -> VectorResult<Metadata> {
    let obj = match value {
        JsonValue::Null => return Ok(Metadata::new()),
        JsonValue::Object(obj) => obj,
        other => {
            return Err(VectorError::InvalidMetadata {
                key: String::new(),
                reason: format!("metadata must be an object, got {}", json_type(other)),
            })
        }
    };

    let mut metadata = Metadata::new();
    for (key, value) in obj {
        let scalar = MetadataValue::from_json(value).ok_or_else(|| VectorError::InvalidMetadata {
            key: key.clone(),
            reason: format!("{} values are not supported", json_type(value)),
        })?;
        metadata.insert(key.clone(), scalar);
    }
    Ok(metadata)
}

/// Convert metadata into a JSON object
pub fn metadata_to_json(metadata: &Metadata) -> JsonValue {
    JsonValue::Object(
        metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

// =============================================================================
// Filters
// =============================================================================

/// One condition on a metadata key
#[derive(Debug, Clone, PartialEq)]
pub enum FilterCondition {
    /// Equal to
    Eq(JsonValue),
    /// Not equal to
    Ne(JsonValue),
    /// Greater than
    Gt(JsonValue),
    /// Greater than or equal
    Gte(JsonValue),
    /// Less than
    Lt(JsonValue),
    /// Less than or equal
    Lte(JsonValue),
    /// Member of
    In(Vec<JsonValue>),
    /// Not member of
    Nin(Vec<JsonValue>),
}

impl FilterCondition {
    /// Operator name as written by callers
    pub fn operator(&self) -> &'static str {
        match self {
            FilterCondition::Eq(_) => "$eq",
            FilterCondition::Ne(_) => "$ne",
            FilterCondition::Gt(_) => "$gt",
            FilterCondition::Gte(_) => "$gte",
            FilterCondition::Lt(_) => "$lt",
            FilterCondition::Lte(_) => "$lte",
            FilterCondition::In(_) => "$in",
            FilterCondition::Nin(_) => "$nin",
        }
    }

    fn parse(operator: &str, value: &JsonValue) -> Option<Self> {
        let list = || match value {
            JsonValue::Array(items) => items.clone(),
            other => vec![other.clone()],
        };
        match operator {
            "$eq" => Some(FilterCondition::Eq(value.clone())),
            "$ne" => Some(FilterCondition::Ne(value.clone())),
            "$gt" => Some(FilterCondition::Gt(value.clone())),
            "$gte" => Some(FilterCondition::Gte(value.clone())),
            "$lt" => Some(FilterCondition::Lt(value.clone())),
            "$lte" => Some(FilterCondition::Lte(value.clone())),
            "$in" => Some(FilterCondition::In(list())),
            "$nin" => Some(FilterCondition::Nin(list())),
            _ => None,
        }
    }
}

/// Metadata filter as supplied by a caller
///
/// All conditions must match (AND semantics). Only equality on scalar
/// values survives [`MetadataFilter::to_equality`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    conditions: BTreeMap<String, FilterCondition>,
}

impl MetadataFilter {
    /// Create an empty filter (matches all)
    pub fn new() -> Self {
        MetadataFilter::default()
    }

    /// Add an equality condition
    pub fn eq(self, field: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.with(field, FilterCondition::Eq(value.into().to_json()))
    }

    /// Add an arbitrary condition
    pub fn with(mut self, field: impl Into<String>, condition: FilterCondition) -> Self {
        self.conditions.insert(field.into(), condition);
        self
    }

    /// Parse a JSON filter document
    ///
    /// `{"k": v}` and `{"k": {"$eq": v}}` are equality; other `$` operators
    /// are parsed so they can be reported precisely.
    ///
    /// # Errors
    ///
    /// `BadRequest` if the document is not an object, `UnsupportedFilter`
    /// for unknown operators or several operators on one key.
    pub fn from_json(value: &JsonValue) -> VectorResult<Self> {
        let obj = match value {
            JsonValue::Null => return Ok(MetadataFilter::new()),
            JsonValue::Object(obj) => obj,
            other => {
                return Err(VectorError::BadRequest {
                    message: format!("filter must be an object, got {}", json_type(other)),
                })
            }
        };

        let mut filter = MetadataFilter::new();
        for (field, value) in obj {
            let condition = match value {
                JsonValue::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                    if ops.len() != 1 {
                        return Err(VectorError::UnsupportedFilter {
                            field: field.clone(),
                            reason: "only one operator per key is supported".to_string(),
                        });
                    }
                    let (operator, operand) = ops.iter().next().ok_or_else(|| {
                        VectorError::Internal("operator map emptied during parse".to_string())
                    })?;
                    FilterCondition::parse(operator, operand).ok_or_else(|| {
                        VectorError::UnsupportedFilter {
                            field: field.clone(),
                            reason: format!("unknown operator {}", operator),
                        }
                    })?
                }
                other => FilterCondition::Eq(other.clone()),
            };
            filter.conditions.insert(field.clone(), condition);
        }
        Ok(filter)
    }

    /// Reduce to a portable equality filter
    ///
    /// # Errors
    ///
    /// `UnsupportedFilter` for any non-equality condition or non-scalar
    /// operand. Conditions are never silently dropped.
    pub fn to_equality(&self) -> VectorResult<EqualityFilter> {
        let mut equals = BTreeMap::new();
        for (field, condition) in &self.conditions {
            if field.is_empty() {
                return Err(VectorError::UnsupportedFilter {
                    field: field.clone(),
                    reason: "empty metadata key".to_string(),
                });
            }
            let FilterCondition::Eq(value) = condition else {
                return Err(VectorError::UnsupportedFilter {
                    field: field.clone(),
                    reason: format!(
                        "operator {} is not supported, only equality is portable",
                        condition.operator()
                    ),
                });
            };
            let scalar =
                MetadataValue::from_json(value).ok_or_else(|| VectorError::UnsupportedFilter {
                    field: field.clone(),
                    reason: format!("{} operands are not supported", json_type(value)),
                })?;
            equals.insert(field.clone(), scalar);
        }
        Ok(EqualityFilter { equals })
    }

    /// Check if filter is empty (matches all)
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Get the number of conditions in the filter
    pub fn len(&self) -> usize {
        self.conditions.len()
    }
}

/// Conjunctive equality filter on scalar metadata
///
/// This is the only filter shape adapters receive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EqualityFilter {
    equals: BTreeMap<String, MetadataValue>,
}

impl EqualityFilter {
    /// Create an empty filter (matches all)
    pub fn new() -> Self {
        EqualityFilter::default()
    }

    /// Add an equality condition
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.equals.insert(field.into(), value.into());
        self
    }

    /// Check if metadata matches this filter
    ///
    /// A missing key never matches, not even a null condition.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.equals.iter().all(|(key, expected)| {
            metadata
                .get(key)
                .is_some_and(|actual| expected.matches(actual))
        })
    }

    /// Iterate over conditions in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.equals.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Check if filter is empty (matches all)
    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    /// Get the number of conditions in the filter
    pub fn len(&self) -> usize {
        self.equals.len()
    }
}
