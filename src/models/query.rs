//! Query-related data models.
//!
//! This module defines bound parameters, the result-shape selector and the shaped
//! output returned by query execution.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// One result row: column name to decoded value, in select-list order.
pub type Row = serde_json::Map<String, JsonValue>;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    /// NULL value
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    /// JSON document (bound as text on SQLite)
    Json(JsonValue),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }
}

macro_rules! impl_param_from {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for QueryParam {
                fn from(v: $ty) -> Self {
                    Self::$variant(v.into())
                }
            }
        )+
    };
}

impl_param_from! {
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => Int,
    u16 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => String,
    &str => String,
    Vec<u8> => Bytes,
    &[u8] => Bytes,
    JsonValue => Json,
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Parameters bound to a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    #[default]
    None,
    /// Bound in order to `?` / `$n` placeholders
    Positional(Vec<QueryParam>),
    /// Bound to `:name` placeholders
    Named(BTreeMap<String, QueryParam>),
}

impl Params {
    /// Build named parameters from `(name, value)` pairs. A leading `:` is ignored.
    pub fn named<K, V, I>(pairs: I) -> Self
    where
        K: AsRef<str>,
        V: Into<QueryParam>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.as_ref().trim_start_matches(':').to_string(), v.into()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Positional(values) => values.len(),
            Self::Named(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<QueryParam>> for Params {
    fn from(values: Vec<QueryParam>) -> Self {
        Self::Positional(values)
    }
}

impl<const N: usize> From<[QueryParam; N]> for Params {
    fn from(values: [QueryParam; N]) -> Self {
        Self::Positional(values.into())
    }
}

impl From<BTreeMap<String, QueryParam>> for Params {
    fn from(values: BTreeMap<String, QueryParam>) -> Self {
        Self::named(values)
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Self::None
    }
}

/// How a raw result set is reshaped before it is returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    /// Number of rows the statement affected; no rows are materialized
    AffectedRowCount,
    #[default]
    AllRows,
    FirstRow,
    /// Value of the first selected column, for every row
    FirstColumnAllRows,
    /// Value of the first column of the first row
    FirstCellOfFirstRow,
}

/// A shaped query result, one variant per [`ResultShape`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    RowCount(u64),
    Rows(Vec<Row>),
    /// Empty map when the statement returned no rows
    Row(Row),
    Column(Vec<JsonValue>),
    /// `None` when the statement returned no rows
    Scalar(Option<JsonValue>),
}

impl QueryOutput {
    /// The shape this output was produced for.
    pub fn shape(&self) -> ResultShape {
        match self {
            Self::RowCount(_) => ResultShape::AffectedRowCount,
            Self::Rows(_) => ResultShape::AllRows,
            Self::Row(_) => ResultShape::FirstRow,
            Self::Column(_) => ResultShape::FirstColumnAllRows,
            Self::Scalar(_) => ResultShape::FirstCellOfFirstRow,
        }
    }

    pub fn row_count(&self) -> Option<u64> {
        match self {
            Self::RowCount(n) => Some(*n),
            _ => None,
        }
    }

    pub fn into_rows(self) -> Option<Vec<Row>> {
        match self {
            Self::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn into_row(self) -> Option<Row> {
        match self {
            Self::Row(row) => Some(row),
            _ => None,
        }
    }

    pub fn into_column(self) -> Option<Vec<JsonValue>> {
        match self {
            Self::Column(values) => Some(values),
            _ => None,
        }
    }

    /// Outer `None`: not a scalar output. Inner `None`: no rows.
    pub fn into_scalar(self) -> Option<Option<JsonValue>> {
        match self {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }
}
