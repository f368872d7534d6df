//! Filesystem access for tabular data: CSV reading/writing and the cursor snapshot.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::common::error::{CoreError, CoreResult};
use crate::common::fs;

use super::domain::{ColumnKind, Cursor, CursorRepo, Field, Frame, Schema, Value};

/// Load a CSV file. Without a schema, column kinds are inferred once from the
/// whole file; with one, the header must provide every schema column and any
/// extra columns are ignored.
pub fn read_csv(path: &Path, schema: Option<&Schema>) -> CoreResult<Frame> {
    let file = File::open(path).map_err(|e| CoreError::persistence(path, e))?;
    read_csv_from(file, schema)
}

/// [`read_csv`] over any reader.
pub fn read_csv_from<R: Read>(reader: R, schema: Option<&Schema>) -> CoreResult<Frame> {
    let (header, raw) = read_raw(reader)?;
    let schema = match schema {
        Some(schema) => schema.clone(),
        None => infer_schema(&header, &raw, None)?,
    };
    build_frame(&header, &raw, schema)
}

/// Load every column of a CSV file. Columns named in `known` must be present
/// and take their kind from it; the others are inferred.
pub fn read_csv_keeping(path: &Path, known: &Schema) -> CoreResult<Frame> {
    let file = File::open(path).map_err(|e| CoreError::persistence(path, e))?;
    read_csv_keeping_from(file, known)
}

/// [`read_csv_keeping`] over any reader.
pub fn read_csv_keeping_from<R: Read>(reader: R, known: &Schema) -> CoreResult<Frame> {
    let (header, raw) = read_raw(reader)?;
    if let Some(field) = known.fields().iter().find(|f| !header.contains(&f.name)) {
        return Err(CoreError::schema(format!("missing column {:?}", field.name)));
    }
    let schema = infer_schema(&header, &raw, Some(known))?;
    build_frame(&header, &raw, schema)
}

/// Header and raw cells, column by column.
fn read_raw<R: Read>(reader: R) -> CoreResult<(Vec<String>, Vec<Vec<String>>)> {
    let mut reader = csv::ReaderBuilder::new().flexible(false).from_reader(reader);
    let header: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut raw: Vec<Vec<String>> = vec![Vec::new(); header.len()];
    for record in reader.records() {
        let record = record?;
        for (col, cell) in raw.iter_mut().zip(record.iter()) {
            col.push(cell.to_string());
        }
    }
    Ok((header, raw))
}

fn infer_schema(header: &[String], raw: &[Vec<String>], known: Option<&Schema>) -> CoreResult<Schema> {
    Schema::new(
        header
            .iter()
            .zip(raw)
            .map(|(name, cells)| {
                let kind = known
                    .and_then(|k| k.kind_of(name))
                    .unwrap_or_else(|| ColumnKind::infer(cells.iter().map(String::as_str)));
                Field::new(name.clone(), kind)
            })
            .collect(),
    )
}

fn build_frame(header: &[String], raw: &[Vec<String>], schema: Schema) -> CoreResult<Frame> {
    let n_rows = raw.first().map_or(0, Vec::len);
    let mut columns = Vec::with_capacity(schema.len());
    for field in schema.fields() {
        let pos = header
            .iter()
            .position(|h| *h == field.name)
            .ok_or_else(|| CoreError::schema(format!("missing column {:?}", field.name)))?;
        let values = raw[pos]
            .iter()
            .map(|cell| Value::parse(cell, field.kind))
            .collect::<CoreResult<Vec<_>>>()?;
        columns.push(values);
    }

    Frame::new(schema, columns, (0..n_rows).collect())
}

/// Serialise a frame to CSV bytes, header first.
pub fn to_csv_bytes(frame: &Frame) -> CoreResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(frame.schema().names())?;
    for row in 0..frame.n_rows() {
        writer.write_record(frame.row(row).map(Value::render))?;
    }
    writer
        .into_inner()
        .map_err(|e| CoreError::Codec(e.to_string()))
}

/// Write a frame as CSV, replacing `path` atomically.
pub fn write_csv(path: &Path, frame: &Frame) -> CoreResult<()> {
    fs::write_atomic(path, &to_csv_bytes(frame)?)
}

/// Cursor snapshot stored as a small JSON file.
pub struct FsCursorRepo {
    path: PathBuf,
}

impl FsCursorRepo {
    /// Repository storing the cursor at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the cursor file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CursorRepo for FsCursorRepo {
    fn put_cursor(&self, cursor: &Cursor) -> CoreResult<()> {
        let bytes = serde_json::to_vec(cursor)?;
        fs::write_atomic(&self.path, &bytes)
    }

    fn get_cursor(&self) -> CoreResult<Option<Cursor>> {
        match fs::read_optional(&self.path)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
INSR_BEGIN,PREMIUM,TYPE,WITH_PAID
2020-01-01,100.5,car,1
2020-01-01,,truck,0
2020-01-02,80,NA,1
";

    #[test]
    fn infers_schema_and_missing_cells() {
        let frame = read_csv_from(SAMPLE.as_bytes(), None).unwrap();
        let schema = frame.schema();
        assert_eq!(schema.kind_of("INSR_BEGIN"), Some(ColumnKind::Categorical));
        assert_eq!(schema.kind_of("PREMIUM"), Some(ColumnKind::Numeric));
        assert_eq!(schema.kind_of("TYPE"), Some(ColumnKind::Categorical));
        assert_eq!(schema.kind_of("WITH_PAID"), Some(ColumnKind::Numeric));
        assert_eq!(frame.n_rows(), 3);
        assert_eq!(frame.column("PREMIUM").unwrap()[1], Value::Missing);
        assert_eq!(frame.column("TYPE").unwrap()[2], Value::Missing);
    }

    #[test]
    fn explicit_schema_selects_and_orders_columns() {
        let schema = Schema::new(vec![
            Field::new("TYPE", ColumnKind::Categorical),
            Field::new("PREMIUM", ColumnKind::Numeric),
        ])
        .unwrap();
        let frame = read_csv_from(SAMPLE.as_bytes(), Some(&schema)).unwrap();
        assert_eq!(frame.schema(), &schema);

        let missing = Schema::new(vec![Field::new("AGE", ColumnKind::Numeric)]).unwrap();
        let err = read_csv_from(SAMPLE.as_bytes(), Some(&missing));
        assert!(matches!(err, Err(CoreError::Schema(_))));
    }

    #[test]
    fn keeping_read_retains_extra_columns() {
        let known = Schema::new(vec![
            Field::new("TYPE", ColumnKind::Categorical),
            Field::new("WITH_PAID", ColumnKind::Categorical),
        ])
        .unwrap();
        let frame = read_csv_keeping_from(SAMPLE.as_bytes(), &known).unwrap();
        assert_eq!(
            frame.schema().names().collect::<Vec<_>>(),
            vec!["INSR_BEGIN", "PREMIUM", "TYPE", "WITH_PAID"]
        );
        assert_eq!(frame.schema().kind_of("PREMIUM"), Some(ColumnKind::Numeric));
        assert_eq!(frame.schema().kind_of("WITH_PAID"), Some(ColumnKind::Categorical));

        let missing = Schema::new(vec![Field::new("AGE", ColumnKind::Numeric)]).unwrap();
        let err = read_csv_keeping_from(SAMPLE.as_bytes(), &missing);
        assert!(matches!(err, Err(CoreError::Schema(_))));
    }

    #[test]
    fn csv_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let frame = read_csv_from(SAMPLE.as_bytes(), None).unwrap();
        write_csv(&path, &frame).unwrap();
        let back = read_csv(&path, Some(frame.schema())).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn cursor_persists() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsCursorRepo::new(dir.path().join("cursor.json"));
        assert_eq!(repo.get_cursor().unwrap(), None);
        repo.put_cursor(&Cursor { position: 150 }).unwrap();
        assert_eq!(repo.get_cursor().unwrap(), Some(Cursor { position: 150 }));
    }
}
