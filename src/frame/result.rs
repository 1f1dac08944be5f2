//! # Composite evaluation results
//!
//! A [`ResultFrame`] is the output of a
//! [`CompositeFunctor`](crate::functors::CompositeFunctor): one column per
//! functor key, all outer-joined on row label. Columns are addressed by a
//! [`ColumnKey`], a functor key plus an optional catalog tag — the tag is the
//! second level of the column hierarchy produced when a functor is evaluated
//! against every constituent of a multi-matched catalog (`How::All`).
//!
//! The frame also carries the collapse step used by the visualization
//! handoff: per-row standard deviation across a group's visit columns.

use crate::constants::RowId;
use crate::frame::{id_positions, ColumnValues, Frame, Series};
use crate::skyframe_errors::SkyframeError;

/// Separator used when flattening two-level keys for scratch persistence.
pub const KEY_SEPARATOR: &str = ".";

/// Address of one result column: functor key plus optional catalog tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnKey {
    pub name: String,
    pub tag: Option<String>,
}

impl ColumnKey {
    pub fn single(name: impl Into<String>) -> Self {
        ColumnKey {
            name: name.into(),
            tag: None,
        }
    }

    pub fn tagged(name: impl Into<String>, tag: impl Into<String>) -> Self {
        ColumnKey {
            name: name.into(),
            tag: Some(tag.into()),
        }
    }

    /// Flat `name` or `name.tag` spelling, used for the scratch parquet file.
    pub fn flat(&self) -> String {
        match &self.tag {
            Some(tag) => format!("{}{}{}", self.name, KEY_SEPARATOR, tag),
            None => self.name.clone(),
        }
    }

    /// Inverse of [`ColumnKey::flat`].
    pub fn from_flat(flat: &str) -> Self {
        match flat.split_once(KEY_SEPARATOR) {
            Some((name, tag)) => ColumnKey::tagged(name, tag),
            None => ColumnKey::single(flat),
        }
    }
}

/// Outer-joined table of functor results, keyed by [`ColumnKey`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultFrame {
    ids: Vec<RowId>,
    cols: Vec<(ColumnKey, ColumnValues)>,
}

impl ResultFrame {
    /// Assemble from labelled series: the row set is the union of all series
    /// labels in first-appearance order, each series reindexed against it.
    pub fn from_series(parts: Vec<(ColumnKey, Series)>) -> ResultFrame {
        let mut ids: Vec<RowId> = Vec::new();
        let mut seen = id_positions(&ids);
        for (_, series) in &parts {
            for id in &series.ids {
                if !seen.contains_key(id) {
                    seen.insert(*id, ids.len());
                    ids.push(*id);
                }
            }
        }
        let cols = parts
            .into_iter()
            .map(|(key, series)| {
                let aligned = series.reindex(&ids);
                (key, aligned.values)
            })
            .collect();
        ResultFrame { ids, cols }
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

    pub fn keys(&self) -> impl Iterator<Item = &ColumnKey> {
        self.cols.iter().map(|(k, _)| k)
    }

    pub fn column(&self, key: &ColumnKey) -> Option<&ColumnValues> {
        self.cols.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// All columns sharing a top-level functor key, with their tags.
    pub fn group(&self, name: &str) -> Vec<(Option<&str>, &ColumnValues)> {
        self.cols
            .iter()
            .filter(|(k, _)| k.name == name)
            .map(|(k, v)| (k.tag.as_deref(), v))
            .collect()
    }

    /// Append an already-aligned column.
    pub fn push(&mut self, key: ColumnKey, series: &Series) {
        let aligned = series.reindex(&self.ids);
        self.cols.retain(|(k, _)| *k != key);
        self.cols.push((key, aligned.values));
    }

    /// Replace every `±inf` with null, in place.
    pub fn replace_infinite_with_null(&mut self) {
        for (_, values) in &mut self.cols {
            values.replace_infinite_with_null();
        }
    }

    /// Keep rows where no checked column is null. When `subset` is given,
    /// only columns whose **top-level name** is in the subset are checked;
    /// this is how flag columns (validly null) are exempted.
    pub fn drop_null_rows(&self, subset: Option<&[String]>) -> ResultFrame {
        let checked: Vec<&ColumnValues> = self
            .cols
            .iter()
            .filter(|(k, _)| match subset {
                Some(names) => names.contains(&k.name),
                None => true,
            })
            .map(|(_, v)| v)
            .collect();
        let mask: Vec<bool> = (0..self.len())
            .map(|i| checked.iter().all(|v| !v.is_null(i)))
            .collect();
        self.filter(&mask)
    }

    pub fn filter(&self, mask: &[bool]) -> ResultFrame {
        let ids = self
            .ids
            .iter()
            .zip(mask)
            .filter(|(_, m)| **m)
            .map(|(id, _)| *id)
            .collect();
        ResultFrame {
            ids,
            cols: self
                .cols
                .iter()
                .map(|(k, v)| (k.clone(), v.filter(mask)))
                .collect(),
        }
    }

    /// Per-row standard deviation across the tagged columns of a group,
    /// skipping tags listed in `exclude` (the reference catalog) and rows
    /// with fewer than two finite samples.
    pub fn group_std(
        &self,
        name: &str,
        exclude: &[&str],
    ) -> Result<ColumnValues, SkyframeError> {
        let members: Vec<&[f64]> = self
            .group(name)
            .into_iter()
            .filter(|(tag, _)| tag.map_or(true, |t| !exclude.contains(&t)))
            .map(|(_, v)| {
                v.as_float().ok_or_else(|| SkyframeError::ColumnTypeMismatch {
                    column: name.to_string(),
                    expected: "float",
                })
            })
            .collect::<Result<_, _>>()?;
        let out = (0..self.len())
            .map(|i| {
                let samples: Vec<f64> = members
                    .iter()
                    .map(|v| v[i])
                    .filter(|x| x.is_finite())
                    .collect();
                if samples.len() < 2 {
                    return f64::NAN;
                }
                let n = samples.len() as f64;
                let mean = samples.iter().sum::<f64>() / n;
                let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
                var.sqrt()
            })
            .collect();
        Ok(ColumnValues::Float(out))
    }

    /// Flatten to a plain [`Frame`] with `name` / `name.tag` column names.
    pub fn to_flat_frame(&self) -> Frame {
        let mut frame = Frame::new(self.ids.clone());
        for (key, values) in &self.cols {
            // Keys are unique, lengths match by construction.
            let _ = frame.insert(key.flat(), values.clone());
        }
        frame
    }

    /// Rebuild from a flattened frame (scratch-file reload path).
    pub fn from_flat_frame(frame: &Frame) -> ResultFrame {
        let mut out = ResultFrame {
            ids: frame.ids().to_vec(),
            cols: Vec::new(),
        };
        for name in frame.column_names().map(str::to_string).collect::<Vec<_>>() {
            if let Some(values) = frame.column(&name) {
                out.cols.push((ColumnKey::from_flat(&name), values.clone()));
            }
        }
        out
    }
}

#[cfg(test)]
mod result_test {
    use super::*;

    #[test]
    fn test_outer_join_on_labels() {
        let a = Series::new(vec![1, 2], ColumnValues::Float(vec![1.0, 2.0])).unwrap();
        let b = Series::new(vec![2, 3], ColumnValues::Float(vec![20.0, 30.0])).unwrap();
        let rf = ResultFrame::from_series(vec![
            (ColumnKey::single("a"), a),
            (ColumnKey::single("b"), b),
        ]);
        assert_eq!(rf.ids(), &[1, 2, 3]);
        let b = rf.column(&ColumnKey::single("b")).unwrap().as_float().unwrap();
        assert!(b[0].is_nan());
        assert_eq!(b[1], 20.0);
        assert_eq!(b[2], 30.0);
    }

    #[test]
    fn test_group_std_excludes_reference() {
        let ids = vec![1, 2];
        let coadd = Series::new(ids.clone(), ColumnValues::Float(vec![100.0, 100.0])).unwrap();
        let v0 = Series::new(ids.clone(), ColumnValues::Float(vec![1.0, 1.0])).unwrap();
        let v1 = Series::new(ids.clone(), ColumnValues::Float(vec![3.0, f64::NAN])).unwrap();
        let rf = ResultFrame::from_series(vec![
            (ColumnKey::tagged("y", "coadd"), coadd),
            (ColumnKey::tagged("y", "visit_0"), v0),
            (ColumnKey::tagged("y", "visit_1"), v1),
        ]);
        let std = rf.group_std("y", &["coadd"]).unwrap();
        let std = std.as_float().unwrap();
        // std of [1, 3] is sqrt(2); the second row has a single finite sample.
        assert!((std[0] - 2f64.sqrt()).abs() < 1e-12);
        assert!(std[1].is_nan());
    }

    #[test]
    fn test_flat_round_trip() {
        let s = Series::new(vec![5], ColumnValues::Float(vec![1.5])).unwrap();
        let rf = ResultFrame::from_series(vec![(ColumnKey::tagged("y0", "visit_1"), s)]);
        let flat = rf.to_flat_frame();
        assert!(flat.has_column("y0.visit_1"));
        let back = ResultFrame::from_flat_frame(&flat);
        assert_eq!(back, rf);
    }
}
