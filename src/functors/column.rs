//! Passthrough and coordinate functors.

use crate::constants::{COORD_DEC_COLUMN, COORD_RA_COLUMN, ID_COLUMN, RADEG};
use crate::frame::{ColumnValues, Frame};
use crate::functors::{CoordAxis, Functor};
use crate::skyframe_errors::SkyframeError;

/// Passthrough of one named source column.
#[derive(Debug, Clone)]
pub struct Column {
    col: String,
    allow_difference: bool,
}

impl Column {
    pub fn new(col: impl Into<String>) -> Self {
        Column {
            col: col.into(),
            allow_difference: true,
        }
    }

    pub fn with_allow_difference(mut self, allow: bool) -> Self {
        self.allow_difference = allow;
        self
    }
}

impl Functor for Column {
    fn name(&self) -> String {
        self.col.clone()
    }

    fn columns(&self) -> Vec<String> {
        vec![self.col.clone()]
    }

    fn allow_difference(&self) -> bool {
        self.allow_difference
    }

    fn evaluate(&self, frame: &Frame) -> Result<ColumnValues, SkyframeError> {
        Ok(frame.require(&self.col)?.clone())
    }
}

/// The unique row key as a column. Identifiers are never differenced.
#[derive(Debug, Clone, Default)]
pub struct IdColumn;

impl Functor for IdColumn {
    fn name(&self) -> String {
        ID_COLUMN.to_string()
    }

    fn columns(&self) -> Vec<String> {
        // Row labels ride along with every frame; nothing extra to read.
        Vec::new()
    }

    fn allow_difference(&self) -> bool {
        false
    }

    fn evaluate(&self, frame: &Frame) -> Result<ColumnValues, SkyframeError> {
        Ok(ColumnValues::Float(
            frame.ids().iter().map(|&id| id as f64).collect(),
        ))
    }
}

/// A raw radian coordinate column converted to degrees.
///
/// On the default path (`calculate = false`) the call protocol answers from
/// the catalog's cached coordinate pair instead of re-reading the raw
/// column; differencing is only allowed when explicitly recomputing.
#[derive(Debug, Clone)]
pub struct CoordColumn {
    col: String,
    axis: CoordAxis,
    calculate: bool,
}

impl CoordColumn {
    pub fn new(col: impl Into<String>, axis: CoordAxis) -> Self {
        CoordColumn {
            col: col.into(),
            axis,
            calculate: false,
        }
    }

    /// Recompute from the raw column instead of using the cached coordinate.
    pub fn calculated(mut self) -> Self {
        self.calculate = true;
        self
    }
}

impl Functor for CoordColumn {
    fn name(&self) -> String {
        match self.axis {
            CoordAxis::Ra => "RA".to_string(),
            CoordAxis::Dec => "Dec".to_string(),
        }
    }

    fn columns(&self) -> Vec<String> {
        vec![self.col.clone()]
    }

    fn allow_difference(&self) -> bool {
        self.calculate
    }

    fn cached_coordinate(&self) -> Option<CoordAxis> {
        if self.calculate {
            None
        } else {
            Some(self.axis)
        }
    }

    fn evaluate(&self, frame: &Frame) -> Result<ColumnValues, SkyframeError> {
        let raw = frame.require_float(&self.col)?;
        Ok(ColumnValues::Float(raw.iter().map(|x| x / RADEG).collect()))
    }
}

/// Right ascension in degrees.
#[derive(Debug, Clone)]
pub struct RaColumn(CoordColumn);

impl RaColumn {
    pub fn new() -> Self {
        RaColumn(CoordColumn::new(COORD_RA_COLUMN, CoordAxis::Ra))
    }

    pub fn calculated() -> Self {
        RaColumn(CoordColumn::new(COORD_RA_COLUMN, CoordAxis::Ra).calculated())
    }
}

impl Default for RaColumn {
    fn default() -> Self {
        Self::new()
    }
}

impl Functor for RaColumn {
    fn name(&self) -> String {
        self.0.name()
    }

    fn columns(&self) -> Vec<String> {
        self.0.columns()
    }

    fn allow_difference(&self) -> bool {
        self.0.allow_difference()
    }

    fn cached_coordinate(&self) -> Option<CoordAxis> {
        self.0.cached_coordinate()
    }

    fn evaluate(&self, frame: &Frame) -> Result<ColumnValues, SkyframeError> {
        self.0.evaluate(frame)
    }
}

/// Declination in degrees.
#[derive(Debug, Clone)]
pub struct DecColumn(CoordColumn);

impl DecColumn {
    pub fn new() -> Self {
        DecColumn(CoordColumn::new(COORD_DEC_COLUMN, CoordAxis::Dec))
    }

    pub fn calculated() -> Self {
        DecColumn(CoordColumn::new(COORD_DEC_COLUMN, CoordAxis::Dec).calculated())
    }
}

impl Default for DecColumn {
    fn default() -> Self {
        Self::new()
    }
}

impl Functor for DecColumn {
    fn name(&self) -> String {
        self.0.name()
    }

    fn columns(&self) -> Vec<String> {
        self.0.columns()
    }

    fn allow_difference(&self) -> bool {
        self.0.allow_difference()
    }

    fn cached_coordinate(&self) -> Option<CoordAxis> {
        self.0.cached_coordinate()
    }

    fn evaluate(&self, frame: &Frame) -> Result<ColumnValues, SkyframeError> {
        self.0.evaluate(frame)
    }
}

#[cfg(test)]
mod column_test {
    use super::*;

    #[test]
    fn test_column_passthrough() {
        let mut frame = Frame::new(vec![1, 2]);
        frame
            .insert("x", ColumnValues::Float(vec![1.0, 2.0]))
            .unwrap();
        let out = Column::new("x").evaluate(&frame).unwrap();
        assert_eq!(out, ColumnValues::Float(vec![1.0, 2.0]));
    }

    #[test]
    fn test_coord_column_converts_radians() {
        let mut frame = Frame::new(vec![1]);
        frame
            .insert(COORD_RA_COLUMN, ColumnValues::Float(vec![std::f64::consts::PI]))
            .unwrap();
        let out = RaColumn::calculated().evaluate(&frame).unwrap();
        assert_eq!(out, ColumnValues::Float(vec![180.0]));
    }

    #[test]
    fn test_coordinate_difference_policy() {
        assert!(!RaColumn::new().allow_difference());
        assert!(RaColumn::calculated().allow_difference());
        assert_eq!(RaColumn::new().cached_coordinate(), Some(CoordAxis::Ra));
        assert_eq!(RaColumn::calculated().cached_coordinate(), None);
    }

    #[test]
    fn test_id_column() {
        let frame = Frame::new(vec![41, 42]);
        let out = IdColumn.evaluate(&frame).unwrap();
        assert_eq!(out, ColumnValues::Float(vec![41.0, 42.0]));
        assert!(!IdColumn.allow_difference());
    }
}
