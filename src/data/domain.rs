//! Core table definitions: cell values, column schema and record batches.

use serde::{Deserialize, Serialize};

use crate::common::error::{CoreError, CoreResult};

/// Textual spellings treated as a missing cell.
const MISSING_TOKENS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

/// A single cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Num(f64),
    Cat(String),
    Missing,
}

impl Value {
    /// True for an empty or NA cell.
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Numeric payload, `None` for categories and missing cells.
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(v) => Some(*v),
            _ => None,
        }
    }

    /// Category label, `None` for numbers and missing cells.
    pub fn as_cat(&self) -> Option<&str> {
        match self {
            Value::Cat(v) => Some(v),
            _ => None,
        }
    }

    /// Parse a raw text cell according to the column kind.
    pub fn parse(raw: &str, kind: ColumnKind) -> CoreResult<Self> {
        let raw = raw.trim();
        if is_missing_token(raw) {
            return Ok(Value::Missing);
        }
        match kind {
            ColumnKind::Numeric => match raw.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(Value::Num(v)),
                Ok(_) => Ok(Value::Missing),
                Err(_) => Err(CoreError::schema(format!(
                    "value {raw:?} in a numeric column"
                ))),
            },
            ColumnKind::Categorical => Ok(Value::Cat(raw.to_string())),
        }
    }

    /// Render the cell back to CSV text.
    pub fn render(&self) -> String {
        match self {
            Value::Num(v) => v.to_string(),
            Value::Cat(v) => v.clone(),
            Value::Missing => String::new(),
        }
    }
}

fn is_missing_token(raw: &str) -> bool {
    MISSING_TOKENS.contains(&raw)
}

/// How a column is routed through preprocessing.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

impl ColumnKind {
    /// A column is numeric iff every present cell parses as a finite number.
    /// Columns with no present cells default to numeric.
    pub fn infer<'a, I>(cells: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let categorical = cells
            .into_iter()
            .map(str::trim)
            .filter(|raw| !is_missing_token(raw))
            .any(|raw| raw.parse::<f64>().is_err());
        if categorical {
            ColumnKind::Categorical
        } else {
            ColumnKind::Numeric
        }
    }
}

/// Named, kind-tagged column.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub kind: ColumnKind,
}

impl Field {
    /// Field with the given name and kind.
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Ordered column layout, declared or inferred once and consulted everywhere.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Schema from fields; duplicate names are a schema error.
    pub fn new(fields: Vec<Field>) -> CoreResult<Self> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(CoreError::schema(format!("duplicate column {:?}", field.name)));
            }
        }
        Ok(Self { fields })
    }

    /// Fields in column order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Column names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Column position by name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Kind of the named column, if present.
    pub fn kind_of(&self, name: &str) -> Option<ColumnKind> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.kind)
    }

    /// Names of every column of the given kind, in schema order.
    pub fn names_of(&self, kind: ColumnKind) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.kind == kind)
            .map(|f| f.name.clone())
            .collect()
    }
}

/// Column-major record batch.
///
/// `index` holds the stream position of every row so that downstream results
/// can be aligned with the rows that survived filtering.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    schema: Schema,
    columns: Vec<Vec<Value>>,
    index: Vec<usize>,
}

impl Frame {
    /// Validated constructor: one column per field, one index entry per row,
    /// and every cell matching its field's kind.
    pub fn new(schema: Schema, columns: Vec<Vec<Value>>, index: Vec<usize>) -> CoreResult<Self> {
        if columns.len() != schema.len() {
            return Err(CoreError::schema(format!(
                "{} columns for a schema of {}",
                columns.len(),
                schema.len()
            )));
        }
        for (field, values) in schema.fields().iter().zip(&columns) {
            if values.len() != index.len() {
                return Err(CoreError::schema(format!(
                    "column {:?} has {} rows, expected {}",
                    field.name,
                    values.len(),
                    index.len()
                )));
            }
            let wrong_kind = values.iter().any(|v| match (field.kind, v) {
                (_, Value::Missing) => false,
                (ColumnKind::Numeric, Value::Num(_)) => false,
                (ColumnKind::Categorical, Value::Cat(_)) => false,
                _ => true,
            });
            if wrong_kind {
                return Err(CoreError::schema(format!(
                    "column {:?} holds values of the wrong kind",
                    field.name
                )));
            }
        }
        Ok(Self {
            schema,
            columns,
            index,
        })
    }

    /// Build from row-major values, indexing rows from zero.
    pub fn from_rows(schema: Schema, rows: Vec<Vec<Value>>) -> CoreResult<Self> {
        let mut columns = vec![Vec::with_capacity(rows.len()); schema.len()];
        for (i, row) in rows.iter().enumerate() {
            if row.len() != schema.len() {
                return Err(CoreError::schema(format!(
                    "row {i} has {} cells, expected {}",
                    row.len(),
                    schema.len()
                )));
            }
        }
        let n_rows = rows.len();
        for row in rows {
            for (col, value) in columns.iter_mut().zip(row) {
                col.push(value);
            }
        }
        Self::new(schema, columns, (0..n_rows).collect())
    }

    /// Frame with `schema` and no rows.
    pub fn empty(schema: Schema) -> Self {
        let columns = vec![Vec::new(); schema.len()];
        Self {
            schema,
            columns,
            index: Vec::new(),
        }
    }

    /// Column layout.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Stream position of each row.
    pub fn index(&self) -> &[usize] {
        &self.index
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// All columns, in schema order.
    pub fn columns(&self) -> &[Vec<Value>] {
        &self.columns
    }

    /// Values of the named column.
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.schema.position(name).map(|i| self.columns[i].as_slice())
    }

    /// Iterate over the cells of one row, in schema order.
    pub fn row(&self, row: usize) -> impl Iterator<Item = &Value> {
        self.columns.iter().map(move |col| &col[row])
    }

    /// Fail with a schema error unless every named column exists.
    pub fn require_columns(&self, names: &[&str]) -> CoreResult<()> {
        match names.iter().find(|name| self.schema.position(name).is_none()) {
            Some(name) => Err(CoreError::schema(format!("missing column {name:?}"))),
            None => Ok(()),
        }
    }

    /// Partition into (features, target); order-preserving and side-effect free.
    pub fn split_xy(&self, target: &str) -> CoreResult<(Frame, Frame)> {
        let pos = self
            .schema
            .position(target)
            .ok_or_else(|| CoreError::schema(format!("missing target column {target:?}")))?;

        let mut feature_fields = Vec::with_capacity(self.schema.len() - 1);
        let mut feature_cols = Vec::with_capacity(self.schema.len() - 1);
        for (i, (field, col)) in self.schema.fields().iter().zip(&self.columns).enumerate() {
            if i != pos {
                feature_fields.push(field.clone());
                feature_cols.push(col.clone());
            }
        }

        let features = Frame {
            schema: Schema {
                fields: feature_fields,
            },
            columns: feature_cols,
            index: self.index.clone(),
        };
        let target = Frame {
            schema: Schema {
                fields: vec![self.schema.fields()[pos].clone()],
            },
            columns: vec![self.columns[pos].clone()],
            index: self.index.clone(),
        };
        Ok((features, target))
    }

    /// Drop the named column if present.
    pub fn without_column(&self, name: &str) -> Frame {
        self.split_xy(name)
            .map(|(rest, _)| rest)
            .unwrap_or_else(|_| self.clone())
    }

    /// Project onto the named columns, in the order given.
    pub fn select(&self, names: &[&str]) -> CoreResult<Frame> {
        let mut fields = Vec::with_capacity(names.len());
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let pos = self
                .schema
                .position(name)
                .ok_or_else(|| CoreError::schema(format!("missing column {name:?}")))?;
            fields.push(self.schema.fields[pos].clone());
            columns.push(self.columns[pos].clone());
        }
        Ok(Frame {
            schema: Schema::new(fields)?,
            columns,
            index: self.index.clone(),
        })
    }

    /// Same rows, indexed by their position in this frame.
    pub fn reindexed(&self) -> Frame {
        Frame {
            schema: self.schema.clone(),
            columns: self.columns.clone(),
            index: (0..self.n_rows()).collect(),
        }
    }

    /// Join columns of two frames with the same row count; the index of `self` wins.
    pub fn hstack(&self, other: &Frame) -> CoreResult<Frame> {
        if self.n_rows() != other.n_rows() {
            return Err(CoreError::schema(format!(
                "cannot join {} rows with {} rows",
                self.n_rows(),
                other.n_rows()
            )));
        }
        let mut fields = self.schema.fields.clone();
        fields.extend(other.schema.fields.iter().cloned());
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        Ok(Frame {
            schema: Schema::new(fields)?,
            columns,
            index: self.index.clone(),
        })
    }

    /// Append the rows of `other`, which must share this frame's schema.
    pub fn append(&mut self, other: &Frame) -> CoreResult<()> {
        if self.schema != other.schema {
            return Err(CoreError::schema("appended batch has a different schema"));
        }
        for (col, extra) in self.columns.iter_mut().zip(&other.columns) {
            col.extend(extra.iter().cloned());
        }
        self.index.extend_from_slice(&other.index);
        Ok(())
    }

    /// Keep the rows whose flag is `true`.
    pub fn filter_rows(&self, keep: &[bool]) -> Frame {
        let pick = |values: &Vec<Value>| -> Vec<Value> {
            values
                .iter()
                .zip(keep)
                .filter(|(_, k)| **k)
                .map(|(v, _)| v.clone())
                .collect()
        };
        Frame {
            schema: self.schema.clone(),
            columns: self.columns.iter().map(pick).collect(),
            index: self
                .index
                .iter()
                .zip(keep)
                .filter(|(_, k)| **k)
                .map(|(i, _)| *i)
                .collect(),
        }
    }

    /// Contiguous slice of rows `[start, end)`, clamped to the frame.
    pub fn slice(&self, start: usize, end: usize) -> Frame {
        let end = end.min(self.n_rows());
        let start = start.min(end);
        Frame {
            schema: self.schema.clone(),
            columns: self.columns.iter().map(|c| c[start..end].to_vec()).collect(),
            index: self.index[start..end].to_vec(),
        }
    }

    /// Replace one column's values, keeping its schema entry.
    pub(crate) fn set_column(&mut self, pos: usize, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.n_rows());
        self.columns[pos] = values;
    }
}

/// Read position of a batch source, persisted next to the pipeline snapshot.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub position: usize,
}

/// Repository contract for cursor persistence.
pub trait CursorRepo {
    fn put_cursor(&self, cursor: &Cursor) -> CoreResult<()>;
    fn get_cursor(&self) -> CoreResult<Option<Cursor>>;
}
