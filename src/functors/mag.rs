//! Magnitude functors: logarithmic transforms of flux columns.

use crate::constants::FLUX_SUFFIX;
use crate::frame::{ColumnValues, Frame};
use crate::functors::Functor;
use crate::skyframe_errors::SkyframeError;

/// Append the `_flux` suffix unless it is already there.
pub fn flux_name(col: &str) -> String {
    if col.ends_with(FLUX_SUFFIX) {
        col.to_string()
    } else {
        format!("{col}{FLUX_SUFFIX}")
    }
}

/// `-2.5 * log10(flux)`.
#[derive(Debug, Clone)]
pub struct Mag {
    col: String,
    allow_difference: bool,
}

impl Mag {
    /// `col` may name the flux column directly or omit the `_flux` suffix.
    pub fn new(col: impl AsRef<str>) -> Self {
        Mag {
            col: flux_name(col.as_ref()),
            allow_difference: true,
        }
    }

    /// Forbid differencing, for magnitudes used as a reference axis.
    pub fn with_allow_difference(mut self, allow: bool) -> Self {
        self.allow_difference = allow;
        self
    }

    pub fn flux_column(&self) -> &str {
        &self.col
    }
}

impl Functor for Mag {
    fn name(&self) -> String {
        format!("mag_{}", self.col)
    }

    fn columns(&self) -> Vec<String> {
        vec![self.col.clone()]
    }

    fn allow_difference(&self) -> bool {
        self.allow_difference
    }

    fn evaluate(&self, frame: &Frame) -> Result<ColumnValues, SkyframeError> {
        let flux = frame.require_float(&self.col)?;
        Ok(ColumnValues::Float(
            flux.iter().map(|x| -2.5 * x.log10()).collect(),
        ))
    }

    fn magnitude_flux_column(&self) -> Option<String> {
        Some(self.col.clone())
    }
}

/// `-2.5 * log10(flux1 / flux2)`: a magnitude difference straight from the
/// flux ratio.
#[derive(Debug, Clone)]
pub struct MagDiff {
    col1: String,
    col2: String,
}

impl MagDiff {
    pub fn new(col1: impl AsRef<str>, col2: impl AsRef<str>) -> Self {
        MagDiff {
            col1: flux_name(col1.as_ref()),
            col2: flux_name(col2.as_ref()),
        }
    }
}

impl Functor for MagDiff {
    fn name(&self) -> String {
        format!("(mag_{} - mag_{})", self.col1, self.col2)
    }

    fn columns(&self) -> Vec<String> {
        vec![self.col1.clone(), self.col2.clone()]
    }

    fn evaluate(&self, frame: &Frame) -> Result<ColumnValues, SkyframeError> {
        let f1 = frame.require_float(&self.col1)?;
        let f2 = frame.require_float(&self.col2)?;
        Ok(ColumnValues::Float(
            f1.iter()
                .zip(f2)
                .map(|(a, b)| -2.5 * (a / b).log10())
                .collect(),
        ))
    }
}

#[cfg(test)]
mod mag_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_flux_name_suffix() {
        assert_eq!(flux_name("base_PsfFlux"), "base_PsfFlux_flux");
        assert_eq!(flux_name("base_PsfFlux_flux"), "base_PsfFlux_flux");
    }

    #[test]
    fn test_mag_value() {
        let mut frame = Frame::new(vec![1, 2]);
        frame
            .insert("f_flux", ColumnValues::Float(vec![100.0, 0.0]))
            .unwrap();
        let mag = Mag::new("f");
        assert_eq!(mag.columns(), vec!["f_flux".to_string()]);
        let out = mag.evaluate(&frame).unwrap();
        let v = out.as_float().unwrap();
        assert_relative_eq!(v[0], -5.0);
        // log10(0) is -inf; normalization to null happens at the dataset layer.
        assert!(v[1].is_infinite());
    }

    #[test]
    fn test_mag_diff_of_ratio() {
        let mut frame = Frame::new(vec![1]);
        frame
            .insert("a_flux", ColumnValues::Float(vec![100.0]))
            .unwrap();
        frame
            .insert("b_flux", ColumnValues::Float(vec![10.0]))
            .unwrap();
        let out = MagDiff::new("a", "b").evaluate(&frame).unwrap();
        assert_relative_eq!(out.as_float().unwrap()[0], -2.5);
    }
}
