//! Cell values and column definitions.

/// One cell value as it flows through inserts, scans and index callbacks.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Datum {
    #[default]
    Null,
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
}

impl Datum {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Whether this value can be stored in a column of type `ty`. `Null` fits everywhere.
    pub fn fits(&self, ty: ColumnType) -> bool {
        matches!(
            (self, ty),
            (Datum::Null, _)
                | (Datum::Integer(_), ColumnType::Integer)
                | (Datum::Float(_), ColumnType::Float)
                | (Datum::String(_), ColumnType::Utf8)
                | (Datum::Boolean(_), ColumnType::Boolean)
        )
    }

    /// Bytes this value contributes to a column block before encoding.
    pub fn encoded_width(&self) -> usize {
        match self {
            Datum::Null => 0,
            Datum::Integer(_) | Datum::Float(_) => 8,
            Datum::Boolean(_) => 1,
            Datum::String(s) => s.len() + 4,
        }
    }
}

impl From<i64> for Datum {
    fn from(value: i64) -> Self {
        Datum::Integer(value)
    }
}

impl From<f64> for Datum {
    fn from(value: f64) -> Self {
        Datum::Float(value)
    }
}

impl From<bool> for Datum {
    fn from(value: bool) -> Self {
        Datum::Boolean(value)
    }
}

impl From<String> for Datum {
    fn from(value: String) -> Self {
        Datum::String(value)
    }
}

impl From<&str> for Datum {
    fn from(value: &str) -> Self {
        Datum::String(value.to_string())
    }
}

impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(value: Option<T>) -> Self {
        value.map_or(Datum::Null, Into::into)
    }
}

/// Physical type of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Integer,
    Float,
    Utf8,
    Boolean,
}

/// Column definition as recorded in the table's attribute list.
///
/// Dropped columns keep their slot so column indexes stay stable; writers still append
/// `Null` cells for them and scans never project them.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    pub dropped: bool,
    /// Value reported for rows that predate the column (see `add_column`).
    pub missing_value: Datum,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            dropped: false,
            missing_value: Datum::Null,
        }
    }

    pub fn with_missing_value(mut self, value: Datum) -> Self {
        self.missing_value = value;
        self
    }
}
