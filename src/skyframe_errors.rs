use thiserror::Error;

/// Error type for every fallible operation in the crate.
///
/// The taxonomy mirrors how the library degrades: configuration problems
/// (unknown columns, unusable catalogs) are handled upstream with warnings and
/// never reach this type, while programmer errors (semantic misuse of
/// functors, malformed expressions, multiband misuse) are fatal and surface
/// here immediately.
#[derive(Error, Debug)]
pub enum SkyframeError {
    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow_schema::ArrowError),

    #[error("Column '{0}' not found")]
    MissingColumn(String),

    #[error("Column '{column}' has the wrong type, expected {expected}")]
    ColumnTypeMismatch {
        column: String,
        expected: &'static str,
    },

    #[error("Catalog '{0}' cannot report its columns: {1}")]
    UnusableCatalog(String, String),

    #[error("Functor '{0}' does not allow cross-catalog differences")]
    DifferenceNotAllowed(String),

    #[error("Difference requested on non-numeric result of functor '{0}'")]
    NonNumericDifference(String),

    #[error("Catalog '{0}' declares no bands, color decomposition is unavailable")]
    NotMultiband(String),

    #[error("Band '{0}' is not declared by this catalog")]
    UnknownBand(String),

    #[error("Functor '{0}' is not a magnitude, cannot build colors from it")]
    NotAMagnitude(String),

    #[error("Failed to parse expression '{expr}': {reason}")]
    ExpressionParse { expr: String, reason: String },

    #[error("Failed to evaluate expression '{expr}': {reason}")]
    ExpressionEval { expr: String, reason: String },

    #[error("Length mismatch: {0}")]
    LengthMismatch(String),

    #[error("No scratch file has been persisted for this dataset")]
    NoScratchFile,
}
