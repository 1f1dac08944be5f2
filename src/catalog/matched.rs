//! # Matched catalog pairs
//!
//! A [`MatchedCatalog`] composes two catalogs through the positional matcher:
//! `cat1` is primary, every one of its rows either pairs with its nearest
//! `cat2` neighbour within the match radius ("good") or stays unmatched
//! ("bad"). The pairing is computed at most once per instance and cached; the
//! stored indices are catalog-native row labels, never positional offsets, so
//! later column selections stay valid under arbitrary reordering.

use once_cell::sync::OnceCell;
use tracing::info;

use crate::catalog::single::{Catalog, Coords};
use crate::catalog::source::ColumnQuery;
use crate::constants::{ArcSec, RowId, ARCSEC_PER_DEG, DEFAULT_MATCH_RADIUS};
use crate::frame::{ColumnValues, Series};
use crate::matcher::match_lists;
use crate::skyframe_errors::SkyframeError;

/// Cached outcome of one pairing: equal-length label vectors for the good
/// pairs, the separation series keyed by cat1 label, and the unmatched set.
#[derive(Debug, Clone)]
pub struct MatchState {
    pub ids1: Vec<RowId>,
    pub ids2: Vec<RowId>,
    /// Separation per good pair, in arcseconds, keyed by cat1 label.
    pub distance: Series,
    /// cat1 labels with no neighbour within the radius.
    pub bad_ids: Vec<RowId>,
}

/// Two catalogs composed by nearest-neighbour position matching.
#[derive(Debug)]
pub struct MatchedCatalog {
    cat1: Catalog,
    cat2: Catalog,
    match_radius: ArcSec,
    tags: [String; 2],
    state: OnceCell<MatchState>,
}

impl MatchedCatalog {
    pub fn new(cat1: Catalog, cat2: Catalog) -> Self {
        Self::with_radius(cat1, cat2, DEFAULT_MATCH_RADIUS)
    }

    pub fn with_radius(cat1: Catalog, cat2: Catalog, match_radius: ArcSec) -> Self {
        MatchedCatalog {
            cat1,
            cat2,
            match_radius,
            tags: ["1".to_string(), "2".to_string()],
            state: OnceCell::new(),
        }
    }

    /// Override the catalog tags used for two-level result columns.
    pub fn with_tags(mut self, tag1: impl Into<String>, tag2: impl Into<String>) -> Self {
        self.tags = [tag1.into(), tag2.into()];
        self
    }

    pub fn cat1(&self) -> &Catalog {
        &self.cat1
    }

    pub fn cat2(&self) -> &Catalog {
        &self.cat2
    }

    pub fn match_radius(&self) -> ArcSec {
        self.match_radius
    }

    pub fn tags(&self) -> (&str, &str) {
        (&self.tags[0], &self.tags[1])
    }

    /// The primary catalog's coordinates stand in for the pair.
    pub fn coords(&self) -> Result<&Coords, SkyframeError> {
        self.cat1.coords()
    }

    /// Run (or fetch) the match. Idempotent: the first successful call caches
    /// the state and every later call returns it unchanged.
    pub fn match_state(&self) -> Result<&MatchState, SkyframeError> {
        self.state.get_or_try_init(|| self.compute_match())
    }

    fn compute_match(&self) -> Result<MatchState, SkyframeError> {
        let c1 = self.cat1.coords()?;
        let c2 = self.cat2.coords()?;

        let result = match_lists(
            &c1.ra,
            &c1.dec,
            &c2.ra,
            &c2.dec,
            self.match_radius / ARCSEC_PER_DEG,
        );

        let mut ids1 = Vec::new();
        let mut ids2 = Vec::new();
        let mut distance = Vec::new();
        let mut bad_ids = Vec::new();
        for (slot, neighbour) in result.index.iter().enumerate() {
            match neighbour {
                Some(j) => {
                    ids1.push(c1.ids[slot]);
                    ids2.push(c2.ids[*j]);
                    distance.push(result.separation[slot] * ARCSEC_PER_DEG);
                }
                None => bad_ids.push(c1.ids[slot]),
            }
        }

        // Progress output, not part of the programmatic contract.
        info!(
            cat1 = %self.cat1.name(),
            cat2 = %self.cat2.name(),
            "{} good matches, {} bad.",
            ids1.len(),
            bad_ids.len()
        );

        let distance = Series::new(ids1.clone(), ColumnValues::Float(distance))?;
        Ok(MatchState {
            ids1,
            ids2,
            distance,
            bad_ids,
        })
    }

    /// Separation series (arcsec, keyed by cat1 label).
    pub fn match_distance(&self) -> Result<&Series, SkyframeError> {
        Ok(&self.match_state()?.distance)
    }

    /// Good-pair labels: (cat1 labels, cat2 labels), equal length.
    pub fn match_inds(&self) -> Result<(&[RowId], &[RowId]), SkyframeError> {
        let state = self.match_state()?;
        Ok((&state.ids1, &state.ids2))
    }

    /// Independent per-catalog column plans. The two plans are **not**
    /// aligned to the match; alignment happens when a caller joins on the
    /// cached match labels.
    pub fn get_columns(
        &self,
        requested: &[String],
    ) -> Result<(ColumnQuery, ColumnQuery), SkyframeError> {
        Ok((
            self.cat1.get_columns(requested)?,
            self.cat2.get_columns(requested)?,
        ))
    }
}

#[cfg(test)]
mod matched_test {
    use super::*;
    use crate::constants::{COORD_DEC_COLUMN, COORD_RA_COLUMN, RADEG};
    use crate::frame::Frame;

    fn catalog(name: &str, ids: Vec<RowId>, ra_deg: Vec<f64>, dec_deg: Vec<f64>) -> Catalog {
        let mut frame = Frame::new(ids);
        frame
            .insert(
                COORD_RA_COLUMN,
                ColumnValues::Float(ra_deg.iter().map(|x| x * RADEG).collect()),
            )
            .unwrap();
        frame
            .insert(
                COORD_DEC_COLUMN,
                ColumnValues::Float(dec_deg.iter().map(|x| x * RADEG).collect()),
            )
            .unwrap();
        Catalog::from_frame(name, frame)
    }

    #[test]
    fn test_match_labels_not_positions() {
        // cat2 rows are reordered relative to cat1; labels must still pair
        // the physically closest rows.
        let cat1 = catalog("one", vec![100, 101], vec![10.0, 10.1], vec![0.0, 0.0]);
        let cat2 = catalog("two", vec![200, 201], vec![10.1, 10.0], vec![0.0, 0.0]);
        let matched = MatchedCatalog::with_radius(cat1, cat2, 1.0);
        let (ids1, ids2) = matched.match_inds().unwrap();
        assert_eq!(ids1, &[100, 101]);
        assert_eq!(ids2, &[201, 200]);
    }

    #[test]
    fn test_match_is_idempotent() {
        let cat1 = catalog("one", vec![1], vec![10.0], vec![0.0]);
        let cat2 = catalog("two", vec![2], vec![10.0], vec![0.0]);
        let matched = MatchedCatalog::new(cat1, cat2);
        let first = matched.match_state().unwrap() as *const MatchState;
        let second = matched.match_state().unwrap() as *const MatchState;
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_matches_is_not_an_error() {
        let cat1 = catalog("one", vec![1], vec![10.0], vec![0.0]);
        let cat2 = catalog("two", vec![2], vec![50.0], vec![40.0]);
        let matched = MatchedCatalog::new(cat1, cat2);
        let state = matched.match_state().unwrap();
        assert!(state.ids1.is_empty());
        assert!(state.ids2.is_empty());
        assert_eq!(state.bad_ids, vec![1]);
    }

    #[test]
    fn test_distance_in_arcsec_within_radius() {
        // 0.3 arcsec offset in ra at dec=0.
        let offset = 0.3 / ARCSEC_PER_DEG;
        let cat1 = catalog("one", vec![1], vec![10.0], vec![0.0]);
        let cat2 = catalog("two", vec![2], vec![10.0 + offset], vec![0.0]);
        let matched = MatchedCatalog::with_radius(cat1, cat2, 0.5);
        let distance = matched.match_distance().unwrap();
        let values = distance.values.as_float().unwrap();
        assert_eq!(distance.ids, vec![1]);
        assert!((values[0] - 0.3).abs() < 1e-6);
        assert!(values[0] <= 0.5);
    }
}
