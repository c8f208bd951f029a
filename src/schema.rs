//! This module contains the typed schema and value model shared by the
//! storage layer and the query executor.

use ordered_float::OrderedFloat;

/// The column types a [`Schema`] can be built from. A database file's schema
/// is immutable for the life of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// A 4-byte little-endian signed integer.
    Int32,
    /// A 4-byte IEEE-754 little-endian float.
    Float32,
    /// A UTF-8 string, at most 255 bytes on disk.
    Str,
}

impl ColumnType {
    /// The descriptor tag used in the file header's comma-joined schema
    /// string (see the file-header layout in the storage module).
    fn tag(self) -> &'static str {
        match self {
            ColumnType::Int32 => "int",
            ColumnType::Float32 => "float",
            ColumnType::Str => "str",
        }
    }

    fn from_tag(tag: &str) -> Result<ColumnType, SchemaError> {
        match tag {
            "int" => Ok(ColumnType::Int32),
            "float" => Ok(ColumnType::Float32),
            "str" => Ok(ColumnType::Str),
            other => Err(SchemaError::UnknownTypeTag(other.to_string())),
        }
    }
}

/// An error that can occur while parsing or validating a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A type tag in the schema descriptor was not one of `int`, `float`, `str`.
    UnknownTypeTag(String),
    /// A schema must have at least one column.
    NoColumns,
}

impl ::std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        match self {
            SchemaError::UnknownTypeTag(tag) => write!(f, "unknown column type tag '{}'", tag),
            SchemaError::NoColumns => write!(f, "a schema must have at least one column"),
        }
    }
}

impl ::std::error::Error for SchemaError {}

/// An ordered, immutable sequence of column types. Schemas are positional:
/// there are no column names, only a type at each index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema(Vec<ColumnType>);

impl Schema {
    /// Build a schema from an ordered list of column types.
    ///
    /// # Errors
    /// Returns [`SchemaError::NoColumns`] if `columns` is empty.
    pub fn new(columns: Vec<ColumnType>) -> Result<Schema, SchemaError> {
        if columns.is_empty() {
            return Err(SchemaError::NoColumns);
        }
        Ok(Schema(columns))
    }

    /// The number of columns in the schema.
    pub fn num_columns(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the column types in order.
    pub fn columns(&self) -> impl Iterator<Item = &ColumnType> {
        self.0.iter()
    }

    /// The column type at `index`, if any.
    pub fn column_type(&self, index: usize) -> Option<ColumnType> {
        self.0.get(index).copied()
    }

    /// Render the schema as the comma-joined descriptor string stored in the
    /// database file header (e.g. `"int,str,str"`).
    pub fn to_descriptor(&self) -> String {
        self.0
            .iter()
            .map(|t| t.tag())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse a schema back out of a descriptor string, the inverse of
    /// [`Schema::to_descriptor`].
    ///
    /// # Errors
    /// Returns [`SchemaError::UnknownTypeTag`] if any comma-separated entry is
    /// not a recognized type tag, or [`SchemaError::NoColumns`] if `descriptor`
    /// is empty.
    pub fn parse(descriptor: &str) -> Result<Schema, SchemaError> {
        if descriptor.is_empty() {
            return Err(SchemaError::NoColumns);
        }
        let columns = descriptor
            .split(',')
            .map(ColumnType::from_tag)
            .collect::<Result<Vec<_>, _>>()?;
        Schema::new(columns)
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = &'a ColumnType;
    type IntoIter = std::slice::Iter<'a, ColumnType>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A single cell value. Structural equality and hashing are total (floats are
/// compared bit-for-bit via [`OrderedFloat`]), so `Value` can serve directly
/// as a hash-join or aggregation-group key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// An `Int32` cell.
    Int32(i32),
    /// A `Float32` cell.
    Float32(OrderedFloat<f32>),
    /// A `Str` cell.
    Str(String),
}

impl Value {
    /// Construct a float value from a plain `f32`.
    pub fn float(v: f32) -> Value {
        Value::Float32(OrderedFloat(v))
    }

    /// The column type this value was constructed as.
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Int32(_) => ColumnType::Int32,
            Value::Float32(_) => ColumnType::Float32,
            Value::Str(_) => ColumnType::Str,
        }
    }

    /// View this value as `f64`, for use by the aggregation operators.
    /// Returns `None` for `Str` values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(i) => Some(*i as f64),
            Value::Float32(f) => Some(f.into_inner() as f64),
            Value::Str(_) => None,
        }
    }
}

/// An ordered tuple of values. The i-th value's type must match the i-th
/// entry of the governing [`Schema`].
pub type Record = Vec<Value>;

/// Order two values of the same column type. Mismatched variants compare
/// equal, since sort/join keys are expected to be drawn from a single column.
pub fn compare_values(a: &Value, b: &Value) -> ::std::cmp::Ordering {
    use ::std::cmp::Ordering;
    match (a, b) {
        (Value::Int32(x), Value::Int32(y)) => x.cmp(y),
        (Value::Float32(x), Value::Float32(y)) => x.cmp(y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}
