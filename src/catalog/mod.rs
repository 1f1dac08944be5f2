//! # Catalogs
//!
//! Column-validated views over large tabular source catalogs, plus their
//! positional compositions:
//!
//! * [`Catalog`] — one table (parquet file set or in-memory frame).
//! * [`MatchedCatalog`] — two catalogs paired by nearest-neighbour matching.
//! * [`MultiMatchedCatalog`] — one coadd catalog independently paired with N
//!   visit catalogs.
//! * [`SourceCatalog`] — the closed tagged union of the three kinds. Every
//!   behavior that depends on the catalog kind dispatches on this variant
//!   exactly once; there are no scattered type checks.
//!
//! Column access never raises for unknown names (they degrade with a
//! warning) and never moves data by itself: it produces [`ColumnQuery`]
//! plans executed at an explicit materialization boundary.

pub mod matched;
pub mod multi;
pub mod single;
pub mod source;

pub use matched::{MatchState, MatchedCatalog};
pub use multi::{visit_tag, MultiMatchedCatalog, VisitMatchInds, COADD_TAG};
pub use single::{Catalog, Coords};
pub use source::{ColumnKind, ColumnQuery, ColumnSchema, TableSource};

use tracing::warn;

use crate::frame::{Frame, Series};
use crate::functors::{EvalOptions, Functor, FunctorResult, How};
use crate::skyframe_errors::SkyframeError;

/// Closed set of catalog kinds. Composite evaluation, coordinate access, and
/// the dataset layer all dispatch on this tag once.
#[derive(Debug)]
pub enum SourceCatalog {
    Single(Catalog),
    Matched(MatchedCatalog),
    MultiMatched(MultiMatchedCatalog),
}

impl SourceCatalog {
    /// The catalog whose rows key the composite result: the single catalog
    /// itself, the primary of a pair, the coadd of a multi-match.
    pub fn primary(&self) -> &Catalog {
        match self {
            SourceCatalog::Single(cat) => cat,
            SourceCatalog::Matched(mc) => mc.cat1(),
            SourceCatalog::MultiMatched(mmc) => mmc.coadd(),
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(
            self,
            SourceCatalog::Matched(_) | SourceCatalog::MultiMatched(_)
        )
    }

    pub fn is_multi_matched(&self) -> bool {
        matches!(self, SourceCatalog::MultiMatched(_))
    }

    /// Cached degree coordinates of the primary catalog.
    pub fn coords(&self) -> Result<&Coords, SkyframeError> {
        match self {
            SourceCatalog::Single(cat) => cat.coords(),
            SourceCatalog::Matched(mc) => mc.coords(),
            SourceCatalog::MultiMatched(mmc) => mmc.coords(),
        }
    }

    /// Evaluate one functor against this catalog. This is the single
    /// dispatch point of the evaluation protocol: a plain catalog runs the
    /// computation once, a matched catalog runs it per side and combines
    /// according to [`How`], a multi-matched catalog fans out over the coadd
    /// and every visit.
    pub fn apply_functor(
        &self,
        functor: &dyn Functor,
        opts: &EvalOptions,
    ) -> Result<FunctorResult, SkyframeError> {
        match self {
            SourceCatalog::Single(cat) => {
                let series = evaluate_on_catalog(cat, functor, opts)?;
                Ok(FunctorResult::Single(series))
            }
            SourceCatalog::Matched(mc) => apply_matched(mc, functor, opts),
            SourceCatalog::MultiMatched(mmc) => apply_multi(mmc, functor, opts),
        }
    }
}

/// Collect the functor's declared columns from one catalog and run it.
fn evaluate_on_catalog(
    cat: &Catalog,
    functor: &dyn Functor,
    opts: &EvalOptions,
) -> Result<Series, SkyframeError> {
    let columns = functor.columns();
    let frame = cat
        .get_columns(&columns)?
        .with_filter(opts.query.clone())
        .collect()?;
    evaluate_on_frame(&frame, functor)
}

fn evaluate_on_frame(frame: &Frame, functor: &dyn Functor) -> Result<Series, SkyframeError> {
    let values = functor.evaluate(frame)?;
    Series::new(frame.ids().to_vec(), values)
}

fn apply_matched(
    mc: &MatchedCatalog,
    functor: &dyn Functor,
    opts: &EvalOptions,
) -> Result<FunctorResult, SkyframeError> {
    let state = mc.match_state()?;
    let columns = functor.columns();
    let (q1, q2) = mc.get_columns(&columns)?;

    let f1 = q1.with_filter(opts.query.clone()).collect()?;
    let f2 = q2.with_filter(opts.query.clone()).collect()?;

    // Evaluate per side, then align both to the good pairs: cat1 labels key
    // the pair, cat2 values are relabelled onto them.
    let s1 = evaluate_on_frame(&f1, functor)?.reindex(&state.ids1);
    let s2_matched = evaluate_on_frame(&f2, functor)?.reindex(&state.ids2);
    let s2 = Series::new(state.ids1.clone(), s2_matched.values)?;

    let how = opts.how.resolve(functor.allow_difference());
    match how {
        How::Difference => {
            if !functor.allow_difference() {
                return Err(SkyframeError::DifferenceNotAllowed(functor.name()));
            }
            if !s1.values.is_numeric() || !s2.values.is_numeric() {
                return Err(SkyframeError::NonNumericDifference(functor.name()));
            }
            let diff = s1.values.difference(&s2.values)?;
            Ok(FunctorResult::Single(Series::new(state.ids1.clone(), diff)?))
        }
        How::First => Ok(FunctorResult::Single(s1)),
        How::Second => Ok(FunctorResult::Single(s2)),
        _ => {
            let (tag1, tag2) = mc.tags();
            Ok(FunctorResult::Grouped(vec![
                (tag1.to_string(), s1),
                (tag2.to_string(), s2),
            ]))
        }
    }
}

fn apply_multi(
    mmc: &MultiMatchedCatalog,
    functor: &dyn Functor,
    opts: &EvalOptions,
) -> Result<FunctorResult, SkyframeError> {
    match opts.how {
        How::First => {
            let series = evaluate_on_catalog(mmc.coadd(), functor, opts)?;
            return Ok(FunctorResult::Single(series));
        }
        How::Difference => {
            // Pairwise differencing has no meaning across N catalogs.
            return Err(SkyframeError::DifferenceNotAllowed(functor.name()));
        }
        _ => {}
    }

    let mut entries = Vec::with_capacity(mmc.visit_cats().len() + 1);
    entries.push((
        COADD_TAG.to_string(),
        evaluate_on_catalog(mmc.coadd(), functor, opts)?,
    ));

    for (i, state) in mmc.visit_states() {
        let visit = &mmc.visit_cats()[i];
        // A visit that fails evaluation is skipped, like a failed sub-match;
        // the remaining visits still produce results.
        let series = match evaluate_on_catalog(visit, functor, opts) {
            Ok(series) => series,
            Err(e) => {
                warn!(visit = i, functor = %functor.name(), error = %e, "skipping catalog");
                continue;
            }
        };
        let aligned = series.reindex(&state.ids2);
        let relabelled = Series::new(state.ids1.clone(), aligned.values)?;
        entries.push((visit_tag(i), relabelled));
    }

    Ok(FunctorResult::Grouped(entries))
}
