//! # Table sources and column-query plans
//!
//! The storage boundary of the crate. A [`TableSource`] is where catalog rows
//! live: a parquet file set on disk, or an in-memory [`Frame`] (tests,
//! synthetic catalogs). A [`ColumnQuery`] is the explicit *query plan* built
//! by catalog column access — source + column projection + optional row
//! filter — and nothing moves until [`ColumnQuery::collect`] is called.
//! Keeping the plan as a plain value makes the deferred/eager split auditable
//! without a live storage backend.
//!
//! ## Projection contract
//! -----------------
//! The frame returned by `collect` carries **exactly** the requested column
//! set (plus the row-label vector). Columns needed only by the row filter are
//! read alongside the projection and discarded before returning.
//!
//! ## Expected parquet schema
//! -----------------
//! * `id: UInt64` — unique row key, always read.
//! * Any number of `Float64`/`Float32` value columns, `Boolean` flag columns,
//!   and `Utf8` string columns. Other leaf types are reported as unsupported
//!   and excluded by catalog sanitization.

use std::fs::File;
use std::sync::Arc;

use arrow_array::{
    Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int64Array, RecordBatch,
    StringArray, UInt32Array, UInt64Array,
};
use arrow_schema::{DataType, Field, Schema};
use camino::{Utf8Path, Utf8PathBuf};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::arrow::ProjectionMask;

use crate::constants::{RowId, ID_COLUMN, PARQUET_BATCH_SIZE};
use crate::expr::{evaluate_predicate, scan_columns};
use crate::frame::{ColumnValues, Frame};
use crate::skyframe_errors::SkyframeError;

/// Column type as seen by the schema probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Float,
    Bool,
    Str,
    Id,
    Unsupported,
}

/// One schema entry: column name plus probed kind.
#[derive(Debug, Clone)]
pub struct ColumnSchema {
    pub name: String,
    pub kind: ColumnKind,
}

fn kind_of(data_type: &DataType, name: &str) -> ColumnKind {
    if name == ID_COLUMN {
        return ColumnKind::Id;
    }
    match data_type {
        DataType::Float64 | DataType::Float32 => ColumnKind::Float,
        DataType::Boolean => ColumnKind::Bool,
        DataType::Utf8 | DataType::LargeUtf8 => ColumnKind::Str,
        _ => ColumnKind::Unsupported,
    }
}

/// Where a catalog's rows live.
#[derive(Debug)]
pub enum TableSource {
    /// A set of parquet files sharing one schema.
    Parquet { files: Vec<Utf8PathBuf> },
    /// An already-materialized frame (synthetic catalogs, tests).
    Memory(Frame),
}

impl TableSource {
    /// Probe the schema. For parquet sources this opens the first file and
    /// reads its metadata; for memory sources it derives kinds from the
    /// stored columns. Fallible by design: an unusable source (no files,
    /// unreadable metadata) is detected here, not at construction.
    pub fn probe_schema(&self) -> Result<Vec<ColumnSchema>, SkyframeError> {
        match self {
            TableSource::Parquet { files } => {
                let first = files.first().ok_or_else(|| {
                    SkyframeError::IoError(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "empty parquet file list",
                    ))
                })?;
                let file = File::open(first.as_std_path())?;
                let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
                Ok(builder
                    .schema()
                    .fields()
                    .iter()
                    .map(|f| ColumnSchema {
                        name: f.name().clone(),
                        kind: kind_of(f.data_type(), f.name()),
                    })
                    .collect())
            }
            TableSource::Memory(frame) => {
                let mut schema = vec![ColumnSchema {
                    name: ID_COLUMN.to_string(),
                    kind: ColumnKind::Id,
                }];
                for name in frame.column_names() {
                    let kind = match frame.column(name) {
                        Some(ColumnValues::Float(_)) => ColumnKind::Float,
                        Some(ColumnValues::Bool(_)) => ColumnKind::Bool,
                        Some(ColumnValues::Str(_)) => ColumnKind::Str,
                        None => ColumnKind::Unsupported,
                    };
                    schema.push(ColumnSchema {
                        name: name.to_string(),
                        kind,
                    });
                }
                Ok(schema)
            }
        }
    }
}

/// Explicit lazy column selection: source + projection + optional row filter.
///
/// The plan is inert until [`collect`](ColumnQuery::collect); cloning or
/// inspecting it performs no I/O.
#[derive(Debug, Clone)]
pub struct ColumnQuery {
    source: Arc<TableSource>,
    projection: Vec<String>,
    filter: Option<String>,
}

impl ColumnQuery {
    pub fn new(source: Arc<TableSource>, projection: Vec<String>) -> Self {
        ColumnQuery {
            source,
            projection,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    pub fn projection(&self) -> &[String] {
        &self.projection
    }

    /// Execute the plan. This is the materialization boundary: storage is
    /// read here (projected to the requested set plus any filter columns),
    /// the filter is applied, and filter-only columns are dropped.
    pub fn collect(&self) -> Result<Frame, SkyframeError> {
        let mut read_set = self.projection.clone();
        if let Some(filter) = &self.filter {
            for col in scan_columns(filter) {
                if !read_set.contains(&col) {
                    read_set.push(col);
                }
            }
        }

        let frame = match self.source.as_ref() {
            TableSource::Parquet { files } => read_parquet(files, &read_set)?,
            TableSource::Memory(stored) => {
                // Fail cleanly if the filter references unknown columns; the
                // projection itself was sanitized upstream.
                for col in &read_set {
                    if !self.projection.contains(col) && !stored.has_column(col) {
                        return Err(SkyframeError::MissingColumn(col.clone()));
                    }
                }
                stored.select(&read_set)
            }
        };

        let frame = match &self.filter {
            Some(filter) => {
                let mask = evaluate_predicate(filter, &frame)?;
                frame.filter(&mask)
            }
            None => frame,
        };

        Ok(frame.select(&self.projection))
    }
}

fn column_from_array(array: &ArrayRef, name: &str) -> Result<ColumnValues, SkyframeError> {
    let n = array.len();
    if let Some(a) = array.as_any().downcast_ref::<Float64Array>() {
        return Ok(ColumnValues::Float(
            (0..n)
                .map(|i| if a.is_null(i) { f64::NAN } else { a.value(i) })
                .collect(),
        ));
    }
    if let Some(a) = array.as_any().downcast_ref::<Float32Array>() {
        return Ok(ColumnValues::Float(
            (0..n)
                .map(|i| {
                    if a.is_null(i) {
                        f64::NAN
                    } else {
                        a.value(i) as f64
                    }
                })
                .collect(),
        ));
    }
    if let Some(a) = array.as_any().downcast_ref::<BooleanArray>() {
        return Ok(ColumnValues::Bool(
            (0..n)
                .map(|i| if a.is_null(i) { None } else { Some(a.value(i)) })
                .collect(),
        ));
    }
    if let Some(a) = array.as_any().downcast_ref::<StringArray>() {
        return Ok(ColumnValues::Str(
            (0..n)
                .map(|i| {
                    if a.is_null(i) {
                        None
                    } else {
                        Some(a.value(i).to_string())
                    }
                })
                .collect(),
        ));
    }
    Err(SkyframeError::ColumnTypeMismatch {
        column: name.to_string(),
        expected: "float64, float32, bool or utf8",
    })
}

fn ids_from_batch(batch: &RecordBatch) -> Result<Vec<RowId>, SkyframeError> {
    let array = batch
        .column_by_name(ID_COLUMN)
        .ok_or_else(|| SkyframeError::MissingColumn(ID_COLUMN.to_string()))?;
    if let Some(a) = array.as_any().downcast_ref::<UInt64Array>() {
        return Ok(a.values().iter().copied().collect());
    }
    if let Some(a) = array.as_any().downcast_ref::<Int64Array>() {
        return Ok(a.values().iter().map(|&v| v as RowId).collect());
    }
    if let Some(a) = array.as_any().downcast_ref::<UInt32Array>() {
        return Ok(a.values().iter().map(|&v| v as RowId).collect());
    }
    Err(SkyframeError::ColumnTypeMismatch {
        column: ID_COLUMN.to_string(),
        expected: "uint64, int64 or uint32",
    })
}

/// Projection-first parquet scan over a file set, concatenating row groups
/// into one frame. Missing columns surface as a clean error rather than a
/// panic; upstream sanitization normally prevents them, except for columns
/// demanded only by a row-filter expression.
fn read_parquet(files: &[Utf8PathBuf], columns: &[String]) -> Result<Frame, SkyframeError> {
    let mut ids: Vec<RowId> = Vec::new();
    let mut cols: Vec<(String, ColumnValues)> = Vec::new();

    for path in files {
        let file = File::open(path.as_std_path())?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let schema_descr = builder.metadata().file_metadata().schema_descr().clone();

        let all_leaves = schema_descr.columns();
        let mut wanted: Vec<&str> = vec![ID_COLUMN];
        wanted.extend(columns.iter().map(String::as_str).filter(|c| *c != ID_COLUMN));
        let projection_indices: Vec<usize> = wanted
            .iter()
            .map(|name| {
                all_leaves
                    .iter()
                    .position(|f| f.name() == *name)
                    .ok_or_else(|| SkyframeError::MissingColumn(name.to_string()))
            })
            .collect::<Result<_, _>>()?;
        let mask = ProjectionMask::leaves(&schema_descr, projection_indices);

        let reader = builder
            .with_projection(mask)
            .with_batch_size(PARQUET_BATCH_SIZE)
            .build()?;

        for batch in reader {
            let batch = batch?;
            ids.extend(ids_from_batch(&batch)?);
            for name in &wanted[1..] {
                let array = batch
                    .column_by_name(name)
                    .ok_or_else(|| SkyframeError::MissingColumn(name.to_string()))?;
                let values = column_from_array(array, name)?;
                match cols.iter_mut().find(|(n, _)| n == name) {
                    Some((_, existing)) => append_values(existing, values),
                    None => cols.push((name.to_string(), values)),
                }
            }
        }
    }

    let mut frame = Frame::new(ids);
    for (name, values) in cols {
        frame.insert(name, values)?;
    }
    Ok(frame)
}

fn append_values(dst: &mut ColumnValues, src: ColumnValues) {
    match (dst, src) {
        (ColumnValues::Float(d), ColumnValues::Float(s)) => d.extend(s),
        (ColumnValues::Bool(d), ColumnValues::Bool(s)) => d.extend(s),
        (ColumnValues::Str(d), ColumnValues::Str(s)) => d.extend(s),
        // Mixed batch types within one column set cannot happen for a valid
        // parquet file set; keep the destination untouched.
        _ => {}
    }
}

/// Write a frame to a parquet file (scratch persistence and test fixtures).
pub fn write_parquet(frame: &Frame, path: &Utf8Path) -> Result<(), SkyframeError> {
    let mut fields: Vec<Field> = vec![Field::new(ID_COLUMN, DataType::UInt64, false)];
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(UInt64Array::from(frame.ids().to_vec()))];

    for name in frame.column_names().map(str::to_string).collect::<Vec<_>>() {
        let values = frame.column(&name).expect("column listed by the frame");
        let (field, array): (Field, ArrayRef) = match values {
            ColumnValues::Float(v) => (
                Field::new(&name, DataType::Float64, true),
                Arc::new(Float64Array::from(
                    v.iter()
                        .map(|x| if x.is_nan() { None } else { Some(*x) })
                        .collect::<Vec<_>>(),
                )),
            ),
            ColumnValues::Bool(v) => (
                Field::new(&name, DataType::Boolean, true),
                Arc::new(BooleanArray::from(v.clone())),
            ),
            ColumnValues::Str(v) => (
                Field::new(&name, DataType::Utf8, true),
                Arc::new(StringArray::from(
                    v.iter().map(|s| s.as_deref()).collect::<Vec<_>>(),
                )),
            ),
        };
        fields.push(field);
        arrays.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;
    let file = File::create(path.as_std_path())?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}
