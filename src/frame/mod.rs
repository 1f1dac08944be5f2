//! # In-memory columnar frames
//!
//! This module defines the small columnar table the functor layer computes on:
//! [`Frame`] (a set of equal-length named columns plus a `u64` row-label
//! vector), [`ColumnValues`] (typed column storage), and [`Series`] (one
//! labelled column).
//!
//! ## Conventions
//! -----------------
//! * Row labels are catalog-native `id` values, **not** positional offsets.
//!   All alignment between catalogs goes through label-keyed maps so column
//!   selections stay valid under arbitrary reordering.
//! * Null handling is per-type: float columns encode null as `NaN`,
//!   boolean and string columns as `None`.
//! * Reindexing a frame or series against labels it does not contain yields
//!   null at those positions rather than an error.
//!
//! Frames are produced at the materialization boundary of a
//! [`ColumnQuery`](crate::catalog::ColumnQuery) and consumed by functor
//! evaluation; they are plain owned data with no lazy behavior of their own.

pub mod result;

pub use result::{ColumnKey, ResultFrame, KEY_SEPARATOR};

use std::collections::HashMap;

use ahash::RandomState;

use crate::constants::RowId;
use crate::skyframe_errors::SkyframeError;

pub type FastHashMap<K, V> = HashMap<K, V, RandomState>;

/// Typed storage for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    /// Floating-point values; null is encoded as `NaN`.
    Float(Vec<f64>),
    /// Boolean flags; null is `None`.
    Bool(Vec<Option<bool>>),
    /// Categorical / string values; null is `None`.
    Str(Vec<Option<String>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Float(v) => v.len(),
            ColumnValues::Bool(v) => v.len(),
            ColumnValues::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable type name, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ColumnValues::Float(_) => "float",
            ColumnValues::Bool(_) => "bool",
            ColumnValues::Str(_) => "str",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnValues::Float(_))
    }

    /// Whether the value at `i` is null under this column's convention.
    pub fn is_null(&self, i: usize) -> bool {
        match self {
            ColumnValues::Float(v) => v[i].is_nan(),
            ColumnValues::Bool(v) => v[i].is_none(),
            ColumnValues::Str(v) => v[i].is_none(),
        }
    }

    /// Validity mask used by the dropna protocol: tries the numeric finite
    /// check first, falls back to a null check for types where finiteness is
    /// undefined.
    pub fn finite_or_valid_mask(&self) -> Vec<bool> {
        match self {
            ColumnValues::Float(v) => v.iter().map(|x| x.is_finite()).collect(),
            ColumnValues::Bool(v) => v.iter().map(|x| x.is_some()).collect(),
            ColumnValues::Str(v) => v.iter().map(|x| x.is_some()).collect(),
        }
    }

    pub fn as_float(&self) -> Option<&[f64]> {
        match self {
            ColumnValues::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Gather rows by optional position; `None` gathers a null.
    pub fn take(&self, rows: &[Option<usize>]) -> ColumnValues {
        match self {
            ColumnValues::Float(v) => ColumnValues::Float(
                rows.iter()
                    .map(|r| r.map_or(f64::NAN, |i| v[i]))
                    .collect(),
            ),
            ColumnValues::Bool(v) => {
                ColumnValues::Bool(rows.iter().map(|r| r.and_then(|i| v[i])).collect())
            }
            ColumnValues::Str(v) => ColumnValues::Str(
                rows.iter()
                    .map(|r| r.and_then(|i| v[i].clone()))
                    .collect(),
            ),
        }
    }

    /// Keep only rows where `mask` is true.
    pub fn filter(&self, mask: &[bool]) -> ColumnValues {
        let keep = |i: &usize| mask[*i];
        match self {
            ColumnValues::Float(v) => ColumnValues::Float(
                (0..v.len()).filter(keep).map(|i| v[i]).collect(),
            ),
            ColumnValues::Bool(v) => ColumnValues::Bool(
                (0..v.len()).filter(keep).map(|i| v[i]).collect(),
            ),
            ColumnValues::Str(v) => ColumnValues::Str(
                (0..v.len()).filter(keep).map(|i| v[i].clone()).collect(),
            ),
        }
    }

    /// Replace `±inf` with null (`NaN`). No-op for non-float columns.
    pub fn replace_infinite_with_null(&mut self) {
        if let ColumnValues::Float(v) = self {
            for x in v.iter_mut() {
                if x.is_infinite() {
                    *x = f64::NAN;
                }
            }
        }
    }

    /// Element-wise difference of two numeric columns of equal length.
    pub fn difference(&self, other: &ColumnValues) -> Result<ColumnValues, SkyframeError> {
        match (self, other) {
            (ColumnValues::Float(a), ColumnValues::Float(b)) => {
                if a.len() != b.len() {
                    return Err(SkyframeError::LengthMismatch(format!(
                        "difference of columns with lengths {} and {}",
                        a.len(),
                        b.len()
                    )));
                }
                Ok(ColumnValues::Float(
                    a.iter().zip(b).map(|(x, y)| x - y).collect(),
                ))
            }
            _ => Err(SkyframeError::ColumnTypeMismatch {
                column: "<difference>".into(),
                expected: "float",
            }),
        }
    }
}

/// One labelled column: a row-label vector plus values of the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub ids: Vec<RowId>,
    pub values: ColumnValues,
}

impl Series {
    pub fn new(ids: Vec<RowId>, values: ColumnValues) -> Result<Self, SkyframeError> {
        if ids.len() != values.len() {
            return Err(SkyframeError::LengthMismatch(format!(
                "series with {} labels but {} values",
                ids.len(),
                values.len()
            )));
        }
        Ok(Series { ids, values })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Align this series to `target_ids`; labels absent here become null.
    pub fn reindex(&self, target_ids: &[RowId]) -> Series {
        let positions = id_positions(&self.ids);
        let rows: Vec<Option<usize>> = target_ids
            .iter()
            .map(|id| positions.get(id).copied())
            .collect();
        Series {
            ids: target_ids.to_vec(),
            values: self.values.take(&rows),
        }
    }

    /// Drop rows that fail the finite-or-valid check.
    pub fn dropna(&self) -> Series {
        let mask = self.values.finite_or_valid_mask();
        let ids = self
            .ids
            .iter()
            .zip(&mask)
            .filter(|(_, m)| **m)
            .map(|(id, _)| *id)
            .collect();
        Series {
            ids,
            values: self.values.filter(&mask),
        }
    }
}

/// Label → position lookup for a row-id vector.
pub fn id_positions(ids: &[RowId]) -> FastHashMap<RowId, usize> {
    let mut map = FastHashMap::with_capacity_and_hasher(ids.len(), RandomState::new());
    for (i, id) in ids.iter().enumerate() {
        map.insert(*id, i);
    }
    map
}

/// A set of equal-length named columns sharing one row-label vector.
///
/// Column order is insertion order; lookups are linear since frames carry a
/// handful of columns at most.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    ids: Vec<RowId>,
    cols: Vec<(String, ColumnValues)>,
}

impl Frame {
    pub fn new(ids: Vec<RowId>) -> Self {
        Frame {
            ids,
            cols: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[RowId] {
        &self.ids
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.cols.iter().map(|(n, _)| n.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.cols.iter().any(|(n, _)| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnValues> {
        self.cols.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Fetch a column or fail with a clear missing-column error. This is the
    /// entry point functor implementations use, so an under-declared column
    /// set surfaces here rather than as silently wrong results.
    pub fn require(&self, name: &str) -> Result<&ColumnValues, SkyframeError> {
        self.column(name)
            .ok_or_else(|| SkyframeError::MissingColumn(name.to_string()))
    }

    /// Fetch a float column, failing on absence or type mismatch.
    pub fn require_float(&self, name: &str) -> Result<&[f64], SkyframeError> {
        self.require(name)?
            .as_float()
            .ok_or_else(|| SkyframeError::ColumnTypeMismatch {
                column: name.to_string(),
                expected: "float",
            })
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        values: ColumnValues,
    ) -> Result<(), SkyframeError> {
        if values.len() != self.ids.len() {
            return Err(SkyframeError::LengthMismatch(format!(
                "column of length {} inserted into frame of length {}",
                values.len(),
                self.ids.len()
            )));
        }
        let name = name.into();
        self.cols.retain(|(n, _)| *n != name);
        self.cols.push((name, values));
        Ok(())
    }

    /// Keep only rows where `mask` is true.
    pub fn filter(&self, mask: &[bool]) -> Frame {
        let ids = self
            .ids
            .iter()
            .zip(mask)
            .filter(|(_, m)| **m)
            .map(|(id, _)| *id)
            .collect();
        Frame {
            ids,
            cols: self
                .cols
                .iter()
                .map(|(n, v)| (n.clone(), v.filter(mask)))
                .collect(),
        }
    }

    /// Align every column to `target_ids`; absent labels become null rows.
    pub fn reindex(&self, target_ids: &[RowId]) -> Frame {
        let positions = id_positions(&self.ids);
        let rows: Vec<Option<usize>> = target_ids
            .iter()
            .map(|id| positions.get(id).copied())
            .collect();
        Frame {
            ids: target_ids.to_vec(),
            cols: self
                .cols
                .iter()
                .map(|(n, v)| (n.clone(), v.take(&rows)))
                .collect(),
        }
    }

    /// Restrict to a subset of columns, preserving request order. Unknown
    /// names are skipped; callers sanitize beforehand.
    pub fn select(&self, names: &[String]) -> Frame {
        let mut out = Frame::new(self.ids.clone());
        for name in names {
            if let Some(values) = self.column(name) {
                out.cols.push((name.clone(), values.clone()));
            }
        }
        out
    }

    /// Drop rows where any column in `subset` (all columns if `None`) is null.
    pub fn drop_null_rows(&self, subset: Option<&[String]>) -> Frame {
        let checked: Vec<&ColumnValues> = match subset {
            Some(names) => names.iter().filter_map(|n| self.column(n)).collect(),
            None => self.cols.iter().map(|(_, v)| v).collect(),
        };
        let mask: Vec<bool> = (0..self.len())
            .map(|i| checked.iter().all(|v| !v.is_null(i)))
            .collect();
        self.filter(&mask)
    }
}

#[cfg(test)]
mod frame_test {
    use super::*;

    fn sample_frame() -> Frame {
        let mut frame = Frame::new(vec![10, 11, 12, 13]);
        frame
            .insert(
                "flux",
                ColumnValues::Float(vec![1.0, f64::NAN, 3.0, 4.0]),
            )
            .unwrap();
        frame
            .insert(
                "flag",
                ColumnValues::Bool(vec![Some(true), Some(false), None, Some(true)]),
            )
            .unwrap();
        frame
    }

    #[test]
    fn test_reindex_fills_null() {
        let frame = sample_frame();
        let out = frame.reindex(&[12, 99, 10]);
        assert_eq!(out.ids(), &[12, 99, 10]);
        let flux = out.column("flux").unwrap().as_float().unwrap();
        assert_eq!(flux[0], 3.0);
        assert!(flux[1].is_nan());
        assert_eq!(flux[2], 1.0);
    }

    #[test]
    fn test_drop_null_rows_subset() {
        let frame = sample_frame();
        // Checking only `flux` keeps the row where `flag` is null.
        let out = frame.drop_null_rows(Some(&["flux".to_string()]));
        assert_eq!(out.ids(), &[10, 12, 13]);
        // Checking everything drops it too.
        let out = frame.drop_null_rows(None);
        assert_eq!(out.ids(), &[10, 13]);
    }

    #[test]
    fn test_series_dropna_numeric_then_null() {
        let s = Series::new(
            vec![1, 2, 3],
            ColumnValues::Float(vec![f64::INFINITY, 2.0, f64::NAN]),
        )
        .unwrap();
        let out = s.dropna();
        assert_eq!(out.ids, vec![2]);

        let s = Series::new(
            vec![1, 2],
            ColumnValues::Str(vec![None, Some("star".into())]),
        )
        .unwrap();
        let out = s.dropna();
        assert_eq!(out.ids, vec![2]);
    }

    #[test]
    fn test_insert_length_mismatch() {
        let mut frame = Frame::new(vec![1, 2]);
        let err = frame.insert("x", ColumnValues::Float(vec![1.0]));
        assert!(err.is_err());
    }

    #[test]
    fn test_replace_infinite_with_null() {
        let mut col = ColumnValues::Float(vec![1.0, f64::INFINITY, f64::NEG_INFINITY]);
        col.replace_infinite_with_null();
        let v = col.as_float().unwrap();
        assert_eq!(v[0], 1.0);
        assert!(v[1].is_nan());
        assert!(v[2].is_nan());
    }
}
