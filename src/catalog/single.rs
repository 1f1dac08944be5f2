//! # Single catalogs
//!
//! A [`Catalog`] is a named, column-validated view over one table source. It
//! never owns row data: column access produces a
//! [`ColumnQuery`](crate::catalog::ColumnQuery) plan, and the only thing the
//! catalog materializes itself is its coordinate pair (once, cached for the
//! catalog's lifetime).
//!
//! Cloning a catalog is cheap and shares the source, the schema probe, and
//! the coordinate cache; replacing the catalog object is the only way to see
//! new data.

use std::sync::Arc;

use camino::Utf8PathBuf;
use once_cell::sync::OnceCell;
use tracing::warn;

use crate::catalog::source::{ColumnKind, ColumnQuery, ColumnSchema, TableSource};
use crate::constants::{Degree, RowId, COORD_DEC_COLUMN, COORD_RA_COLUMN, RADEG};
use crate::frame::Frame;
use crate::skyframe_errors::SkyframeError;

/// Cached degree coordinates of a catalog, keyed by row label.
#[derive(Debug, Clone)]
pub struct Coords {
    pub ids: Vec<RowId>,
    pub ra: Vec<Degree>,
    pub dec: Vec<Degree>,
}

/// A named columnar catalog: schema-validated column access plus cached
/// coordinates. See the module docs for the sharing semantics of `Clone`.
#[derive(Debug, Clone)]
pub struct Catalog {
    name: String,
    source: Arc<TableSource>,
    /// Declared photometric bands; empty for single-band catalogs.
    bands: Vec<String>,
    schema: Arc<OnceCell<Vec<ColumnSchema>>>,
    coords: Arc<OnceCell<Coords>>,
}

impl Catalog {
    /// View over a parquet file set. No I/O happens here; the schema is
    /// probed lazily on first column access.
    pub fn from_parquet(name: impl Into<String>, files: Vec<Utf8PathBuf>) -> Self {
        Catalog {
            name: name.into(),
            source: Arc::new(TableSource::Parquet { files }),
            bands: Vec::new(),
            schema: Arc::new(OnceCell::new()),
            coords: Arc::new(OnceCell::new()),
        }
    }

    /// View over an in-memory frame (synthetic catalogs, tests).
    pub fn from_frame(name: impl Into<String>, frame: Frame) -> Self {
        Catalog {
            name: name.into(),
            source: Arc::new(TableSource::Memory(frame)),
            bands: Vec::new(),
            schema: Arc::new(OnceCell::new()),
            coords: Arc::new(OnceCell::new()),
        }
    }

    /// Declare the photometric bands of a multiband catalog. Per-band columns
    /// are expected to follow the `{band}_{column}` naming scheme.
    pub fn with_bands(mut self, bands: Vec<String>) -> Self {
        self.bands = bands;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bands(&self) -> &[String] {
        &self.bands
    }

    pub fn source(&self) -> &Arc<TableSource> {
        &self.source
    }

    /// The probed schema; fails if the source cannot report its columns.
    /// This is the validity probe multi-catalog construction relies on.
    pub fn schema(&self) -> Result<&[ColumnSchema], SkyframeError> {
        self.schema
            .get_or_try_init(|| self.source.probe_schema())
            .map(|s| s.as_slice())
    }

    /// Names of all available columns.
    pub fn column_names(&self) -> Result<Vec<String>, SkyframeError> {
        Ok(self.schema()?.iter().map(|c| c.name.clone()).collect())
    }

    pub fn has_column(&self, name: &str) -> Result<bool, SkyframeError> {
        Ok(self.schema()?.iter().any(|c| c.name == name))
    }

    /// Boolean flag columns, by schema kind.
    pub fn flags(&self) -> Result<Vec<String>, SkyframeError> {
        Ok(self
            .schema()?
            .iter()
            .filter(|c| c.kind == ColumnKind::Bool)
            .map(|c| c.name.clone())
            .collect())
    }

    /// Drop requested names the schema does not know, warning once per call.
    /// Unknown columns degrade, they never fail.
    pub fn sanitize_columns(&self, requested: &[String]) -> Result<Vec<String>, SkyframeError> {
        let schema = self.schema()?;
        let mut good = Vec::with_capacity(requested.len());
        let mut bad: Vec<&str> = Vec::new();
        for name in requested {
            if schema.iter().any(|c| c.name == *name) {
                if !good.contains(name) {
                    good.push(name.clone());
                }
            } else {
                bad.push(name);
            }
        }
        if !bad.is_empty() {
            warn!(catalog = %self.name, columns = ?bad, "columns not available");
        }
        Ok(good)
    }

    /// Build a lazy plan for the requested columns, sanitized and
    /// deduplicated. Data movement is deferred to
    /// [`collect`](crate::catalog::ColumnQuery::collect).
    pub fn get_columns(&self, requested: &[String]) -> Result<ColumnQuery, SkyframeError> {
        let projection = self.sanitize_columns(requested)?;
        Ok(ColumnQuery::new(self.source.clone(), projection))
    }

    /// Degree coordinates, computed once from the raw radian columns and
    /// cached for the catalog's lifetime.
    pub fn coords(&self) -> Result<&Coords, SkyframeError> {
        self.coords.get_or_try_init(|| {
            let plan = self.get_columns(&[
                COORD_RA_COLUMN.to_string(),
                COORD_DEC_COLUMN.to_string(),
            ])?;
            let frame = plan.collect()?;
            let ra = frame.require_float(COORD_RA_COLUMN)?;
            let dec = frame.require_float(COORD_DEC_COLUMN)?;
            Ok(Coords {
                ids: frame.ids().to_vec(),
                ra: ra.iter().map(|x| x / RADEG).collect(),
                dec: dec.iter().map(|x| x / RADEG).collect(),
            })
        })
    }

    pub fn ra(&self) -> Result<&[Degree], SkyframeError> {
        Ok(&self.coords()?.ra)
    }

    pub fn dec(&self) -> Result<&[Degree], SkyframeError> {
        Ok(&self.coords()?.dec)
    }

    /// Row labels, in coordinate order.
    pub fn ids(&self) -> Result<&[RowId], SkyframeError> {
        Ok(&self.coords()?.ids)
    }
}

#[cfg(test)]
mod catalog_test {
    use super::*;
    use crate::frame::ColumnValues;

    fn catalog() -> Catalog {
        let mut frame = Frame::new(vec![1, 2]);
        frame
            .insert(COORD_RA_COLUMN, ColumnValues::Float(vec![0.0, RADEG * 90.0]))
            .unwrap();
        frame
            .insert(COORD_DEC_COLUMN, ColumnValues::Float(vec![0.0, RADEG * 45.0]))
            .unwrap();
        frame
            .insert(
                "flag_saturated",
                ColumnValues::Bool(vec![Some(false), Some(true)]),
            )
            .unwrap();
        Catalog::from_frame("test", frame)
    }

    #[test]
    fn test_sanitize_drops_unknown() {
        let cat = catalog();
        let good = cat
            .sanitize_columns(&["coord_ra".into(), "nope".into(), "coord_ra".into()])
            .unwrap();
        assert_eq!(good, vec!["coord_ra".to_string()]);
    }

    #[test]
    fn test_coords_in_degrees_and_cached() {
        let cat = catalog();
        let coords = cat.coords().unwrap();
        assert_eq!(coords.ra, vec![0.0, 90.0]);
        assert_eq!(coords.dec, vec![0.0, 45.0]);
        // Clones share the cache.
        let clone = cat.clone();
        assert!(std::ptr::eq(clone.coords().unwrap(), coords));
    }

    #[test]
    fn test_flags_are_bool_columns() {
        let cat = catalog();
        assert_eq!(cat.flags().unwrap(), vec!["flag_saturated".to_string()]);
    }
}
