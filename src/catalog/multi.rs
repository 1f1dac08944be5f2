//! # Multi-matched catalogs
//!
//! One reference ("coadd") catalog matched independently against N per-visit
//! catalogs. Each coadd/visit pair is an ordinary
//! [`MatchedCatalog`](crate::catalog::MatchedCatalog); there is never a
//! global join across visits. Failure is isolated twice over: a visit that
//! cannot report its own columns is dropped at construction, and a sub-match
//! that errors is skipped with a warning while the remaining visits proceed.

use tracing::{debug, warn};

use crate::catalog::matched::{MatchedCatalog, MatchState};
use crate::catalog::single::{Catalog, Coords};
use crate::catalog::source::ColumnQuery;
use crate::constants::{ArcSec, RowId, DEFAULT_MATCH_RADIUS};
use crate::skyframe_errors::SkyframeError;

/// Tag used for the reference catalog in two-level result columns.
pub const COADD_TAG: &str = "coadd";

/// Tag for visit `i` in two-level result columns.
pub fn visit_tag(i: usize) -> String {
    format!("visit_{i}")
}

/// Per-visit matched label pair, aligned within that visit only.
#[derive(Debug, Clone)]
pub struct VisitMatchInds {
    pub visit: usize,
    pub coadd_ids: Vec<RowId>,
    pub visit_ids: Vec<RowId>,
}

/// A coadd catalog plus N independently matched visit catalogs.
#[derive(Debug)]
pub struct MultiMatchedCatalog {
    coadd: Catalog,
    visit_cats: Vec<Catalog>,
    subcats: Vec<MatchedCatalog>,
    match_radius: ArcSec,
}

impl MultiMatchedCatalog {
    pub fn new(coadd: Catalog, visit_cats: Vec<Catalog>) -> Self {
        Self::with_radius(coadd, visit_cats, DEFAULT_MATCH_RADIUS)
    }

    /// Visits failing the schema probe are silently excluded from the
    /// working set; everything else is paired with the coadd.
    pub fn with_radius(coadd: Catalog, visit_cats: Vec<Catalog>, match_radius: ArcSec) -> Self {
        let mut good = Vec::with_capacity(visit_cats.len());
        for visit in visit_cats {
            match visit.schema() {
                Ok(_) => good.push(visit),
                Err(e) => {
                    debug!(catalog = %visit.name(), error = %e, "excluding unusable visit catalog");
                }
            }
        }
        let subcats = good
            .iter()
            .map(|v| MatchedCatalog::with_radius(coadd.clone(), v.clone(), match_radius))
            .collect();
        MultiMatchedCatalog {
            coadd,
            visit_cats: good,
            subcats,
            match_radius,
        }
    }

    pub fn coadd(&self) -> &Catalog {
        &self.coadd
    }

    pub fn visit_cats(&self) -> &[Catalog] {
        &self.visit_cats
    }

    pub fn subcats(&self) -> &[MatchedCatalog] {
        &self.subcats
    }

    pub fn match_radius(&self) -> ArcSec {
        self.match_radius
    }

    /// The reference catalog's coordinates stand in for the composite.
    pub fn coords(&self) -> Result<&Coords, SkyframeError> {
        self.coadd.coords()
    }

    /// Run every sub-match. A failing sub-match is logged and skipped;
    /// partial failure never aborts the whole operation.
    pub fn match_all(&self) {
        for (i, subcat) in self.subcats.iter().enumerate() {
            if let Err(e) = subcat.match_state() {
                warn!(visit = i, error = %e, "skipping catalog");
            }
        }
    }

    /// Match state per visit, skipping visits whose sub-match failed.
    pub fn visit_states(&self) -> Vec<(usize, &MatchState)> {
        self.subcats
            .iter()
            .enumerate()
            .filter_map(|(i, subcat)| match subcat.match_state() {
                Ok(state) => Some((i, state)),
                Err(e) => {
                    warn!(visit = i, error = %e, "skipping catalog");
                    None
                }
            })
            .collect()
    }

    /// Independent column plans: the coadd's first, then one per usable
    /// visit, in visit order. Like the pairwise case, none of them are
    /// aligned to any match.
    pub fn get_columns(
        &self,
        requested: &[String],
    ) -> Result<(ColumnQuery, Vec<ColumnQuery>), SkyframeError> {
        let coadd = self.coadd.get_columns(requested)?;
        let visits = self
            .visit_cats
            .iter()
            .map(|v| v.get_columns(requested))
            .collect::<Result<_, _>>()?;
        Ok((coadd, visits))
    }

    /// Per-visit matched label pairs (coadd labels, visit labels), one entry
    /// per visit whose sub-match succeeded. Never a global join.
    pub fn match_inds(&self) -> Vec<VisitMatchInds> {
        self.visit_states()
            .into_iter()
            .map(|(visit, state)| VisitMatchInds {
                visit,
                coadd_ids: state.ids1.clone(),
                visit_ids: state.ids2.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod multi_test {
    use super::*;
    use crate::constants::{COORD_DEC_COLUMN, COORD_RA_COLUMN, RADEG};
    use crate::frame::{ColumnValues, Frame};
    use camino::Utf8PathBuf;

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
    fn test_unusable_visit_is_dropped_at_construction() {
        let coadd = catalog("coadd", vec![1], vec![10.0], vec![0.0]);
        let good = catalog("visit_ok", vec![2], vec![10.0], vec![0.0]);
        // A parquet source with no files cannot report its columns.
        let broken = Catalog::from_parquet("visit_broken", Vec::<Utf8PathBuf>::new());
        let multi = MultiMatchedCatalog::new(coadd, vec![broken, good]);
        assert_eq!(multi.visit_cats().len(), 1);
        assert_eq!(multi.visit_cats()[0].name(), "visit_ok");
    }

    #[test]
    fn test_match_inds_aligned_per_visit() {
        let coadd = catalog("coadd", vec![10, 11], vec![10.0, 10.1], vec![0.0, 0.0]);
        let v0 = catalog("v0", vec![20, 21], vec![10.0, 10.1], vec![0.0, 0.0]);
        // v1 only covers the second coadd row.
        let v1 = catalog("v1", vec![30], vec![10.1], vec![0.0]);
        let multi = MultiMatchedCatalog::with_radius(coadd, vec![v0, v1], 1.0);
        multi.match_all();
        let inds = multi.match_inds();
        assert_eq!(inds.len(), 2);
        assert_eq!(inds[0].coadd_ids, vec![10, 11]);
        assert_eq!(inds[0].visit_ids, vec![20, 21]);
        assert_eq!(inds[1].coadd_ids, vec![11]);
        assert_eq!(inds[1].visit_ids, vec![30]);
    }
}
