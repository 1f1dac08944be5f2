//! # Constants and type definitions for Skyframe
//!
//! This module centralizes the **unit type aliases**, **conversion factors**, and
//! **well-known column names** used throughout the `skyframe` library.
//!
//! ## Overview
//!
//! - Angular unit aliases (`Degree`, `ArcSec`, `Radian`) used to document APIs
//! - Degree/arcsecond/radian conversion factors
//! - Catalog column conventions (row key, coordinate columns, flux suffix)
//! - Tuning knobs for the positional matcher and the parquet reader
//!
//! These definitions are used by all main modules, including the matcher, catalog
//! access, functor evaluation, and dataset assembly.

/// Right ascension / declination expressed in degrees.
pub type Degree = f64;

/// Angular separation or match radius expressed in arcseconds.
pub type ArcSec = f64;

/// Raw on-disk coordinate value, stored in radians.
pub type Radian = f64;

/// Row label type: every catalog row carries a unique `id`.
pub type RowId = u64;

/// Arcseconds per degree.
pub const ARCSEC_PER_DEG: f64 = 3600.0;

/// Degrees → radians.
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Name of the unique row-key column present in every catalog.
pub const ID_COLUMN: &str = "id";

/// Raw right ascension column (radians on disk).
pub const COORD_RA_COLUMN: &str = "coord_ra";

/// Raw declination column (radians on disk).
pub const COORD_DEC_COLUMN: &str = "coord_dec";

/// Suffix appended to a column name to obtain its flux counterpart.
pub const FLUX_SUFFIX: &str = "_flux";

/// Default match radius for positional cross-matching, in arcseconds.
pub const DEFAULT_MATCH_RADIUS: ArcSec = 0.5;

/// Below this many reference points the matcher scans linearly instead of
/// building a k-d tree. Tree construction only pays off past this size.
pub const MATCHER_BRUTE_FORCE_THRESHOLD: usize = 64;

/// Arrow reader batch size used for parquet scans.
pub const PARQUET_BATCH_SIZE: usize = 8192;
