//! # Functors
//!
//! A functor is a named, column-declaring, lazily-evaluated computation over
//! a catalog. The declared column list is the **exact** read set: composite
//! evaluation prunes storage reads to the union of declared columns, so a
//! functor implementation must never touch a column it has not declared —
//! the frame it receives simply does not contain anything else, and access
//! fails with a clear missing-column error.
//!
//! Calling a functor on a plain [`Frame`] runs the computation directly;
//! calling it on a [`SourceCatalog`](crate::catalog::SourceCatalog) goes
//! through the catalog's apply protocol, which is where matched and
//! multi-matched catalogs fan the same functor out over their constituents
//! (see [`How`]). After computation, `dropna` removes non-finite rows for
//! numeric results and null rows for types where finiteness is undefined.

pub mod column;
pub mod composite;
pub mod custom;
pub mod labeller;
pub mod mag;
pub mod shapes;

pub use column::{Column, CoordColumn, DecColumn, IdColumn, RaColumn};
pub use composite::CompositeFunctor;
pub use custom::CustomFunctor;
pub use labeller::{NumStarLabeller, StarGalaxyLabeller, NULL_LABEL};
pub use mag::{flux_name, Mag, MagDiff};
pub use shapes::{
    DeconvolvedMoments, FootprintNPix, HsmTraceSize, PsfHsmTraceSizeDiff, PsfSdssTraceSizeDiff,
    SdssTraceSize, Seeing,
};

use crate::catalog::SourceCatalog;
use crate::frame::{ColumnValues, Frame, Series};
use crate::skyframe_errors::SkyframeError;

/// How a functor's per-catalog values are combined on matched catalogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum How {
    /// Difference when the functor allows it, primary value otherwise.
    /// This is what the dataset layer uses, so label/coordinate/flag
    /// functors evaluate cleanly on matched catalogs.
    #[default]
    Auto,
    /// Primary (cat1 / coadd) value only.
    First,
    /// Secondary value, relabelled onto the primary's row labels.
    Second,
    /// cat1 − cat2. Rejected when the functor disallows differencing.
    Difference,
    /// Keep every constituent as a tagged column group.
    All,
}

impl How {
    /// Resolve `Auto` against a functor's differencing policy.
    pub fn resolve(self, allow_difference: bool) -> How {
        match self {
            How::Auto if allow_difference => How::Difference,
            How::Auto => How::First,
            other => other,
        }
    }
}

/// Options threaded through one evaluation pass.
#[derive(Debug, Clone)]
pub struct EvalOptions {
    /// Drop non-finite / null rows from each produced column.
    pub dropna: bool,
    pub how: How,
    /// Optional row-filter expression applied at the storage boundary.
    pub query: Option<String>,
}

impl Default for EvalOptions {
    fn default() -> Self {
        EvalOptions {
            dropna: true,
            how: How::Auto,
            query: None,
        }
    }
}

/// Which cached catalog coordinate a coordinate functor stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordAxis {
    Ra,
    Dec,
}

/// Outcome of evaluating one functor against a catalog.
#[derive(Debug, Clone)]
pub enum FunctorResult {
    Single(Series),
    /// One tagged series per constituent catalog (`How::All`).
    Grouped(Vec<(String, Series)>),
}

impl FunctorResult {
    fn map_series(self, f: impl Fn(Series) -> Series) -> FunctorResult {
        match self {
            FunctorResult::Single(s) => FunctorResult::Single(f(s)),
            FunctorResult::Grouped(parts) => {
                FunctorResult::Grouped(parts.into_iter().map(|(tag, s)| (tag, f(s))).collect())
            }
        }
    }

    pub fn into_single(self) -> Option<Series> {
        match self {
            FunctorResult::Single(s) => Some(s),
            FunctorResult::Grouped(_) => None,
        }
    }
}

/// A named derived-column computation with a declared read set.
pub trait Functor: Send + Sync {
    /// Human-readable name, used for dimension labels and error messages.
    fn name(&self) -> String;

    /// Source columns required by [`evaluate`](Functor::evaluate). This is
    /// the pruning contract: nothing outside this list is fetched.
    fn columns(&self) -> Vec<String>;

    /// Whether subtracting this quantity across matched catalogs is
    /// meaningful. False for labels, identifiers and coordinates.
    fn allow_difference(&self) -> bool {
        true
    }

    /// The computation itself, over an already-materialized frame.
    fn evaluate(&self, frame: &Frame) -> Result<ColumnValues, SkyframeError>;

    /// Labellers classify every row including bad ones; they force the
    /// dropna step off regardless of what the caller requested.
    fn forces_dropna_off(&self) -> bool {
        false
    }

    /// When set (and not recomputing), the default call path answers from
    /// the catalog's cached coordinates instead of re-reading storage.
    fn cached_coordinate(&self) -> Option<CoordAxis> {
        None
    }

    /// For magnitude functors: the flux column the magnitude derives from.
    /// The color machinery refuses any x-functor that returns `None`.
    fn magnitude_flux_column(&self) -> Option<String> {
        None
    }
}

/// Evaluate a functor against a catalog: the `__call__` of the protocol.
///
/// Delegates to the catalog's apply dispatch, except for coordinate functors
/// on their default path, which answer from the catalog's cached coordinate
/// pair. Applies the dropna policy afterwards.
pub fn call_functor(
    functor: &dyn Functor,
    catalog: &SourceCatalog,
    opts: &EvalOptions,
) -> Result<FunctorResult, SkyframeError> {
    let result = match functor.cached_coordinate() {
        Some(axis) => {
            let coords = catalog.coords()?;
            let values = match axis {
                CoordAxis::Ra => coords.ra.clone(),
                CoordAxis::Dec => coords.dec.clone(),
            };
            FunctorResult::Single(Series::new(coords.ids.clone(), ColumnValues::Float(values))?)
        }
        None => catalog.apply_functor(functor, opts)?,
    };

    if opts.dropna && !functor.forces_dropna_off() {
        Ok(result.map_series(|s| s.dropna()))
    } else {
        Ok(result)
    }
}
