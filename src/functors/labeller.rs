//! Labellers: categorical classification functors.
//!
//! A labeller assigns every row a string label, including rows whose inputs
//! are missing. Because the label column must stay aligned with whatever
//! numeric columns sit next to it, labellers force the dropna step off and
//! emit the sentinel [`NULL_LABEL`] instead of dropping rows.

use crate::frame::{ColumnValues, Frame};
use crate::functors::Functor;
use crate::skyframe_errors::SkyframeError;

/// Label given to rows whose classification input is missing.
pub const NULL_LABEL: &str = "null";

/// Star/galaxy separation from the extendedness classifier.
///
/// Extendedness below 0.5 labels `"star"`, at or above labels `"galaxy"`,
/// missing input labels [`NULL_LABEL`]. Every row gets exactly one label.
#[derive(Debug, Clone)]
pub struct StarGalaxyLabeller {
    col: String,
}

impl StarGalaxyLabeller {
    pub fn new() -> Self {
        StarGalaxyLabeller {
            col: "base_ClassificationExtendedness_value".to_string(),
        }
    }
}

impl Default for StarGalaxyLabeller {
    fn default() -> Self {
        Self::new()
    }
}

impl Functor for StarGalaxyLabeller {
    fn name(&self) -> String {
        "star/galaxy".to_string()
    }

    fn columns(&self) -> Vec<String> {
        vec![self.col.clone()]
    }

    fn allow_difference(&self) -> bool {
        false
    }

    fn forces_dropna_off(&self) -> bool {
        true
    }

    fn evaluate(&self, frame: &Frame) -> Result<ColumnValues, SkyframeError> {
        let x = frame.require_float(&self.col)?;
        Ok(ColumnValues::Str(
            x.iter()
                .map(|&v| {
                    if v.is_nan() {
                        Some(NULL_LABEL.to_string())
                    } else if v < 0.5 {
                        Some("star".to_string())
                    } else {
                        Some("galaxy".to_string())
                    }
                })
                .collect(),
        ))
    }
}

/// Labels rows by how many visits flagged them as a star.
///
/// A row flagged in every visit is `"star"`, in none is `"noStar"`, anything
/// in between is `"maybe"`. The visit count is taken as the largest value
/// observed in the column.
#[derive(Debug, Clone)]
pub struct NumStarLabeller {
    col: String,
}

impl NumStarLabeller {
    pub fn new() -> Self {
        NumStarLabeller {
            col: "numStarFlags".to_string(),
        }
    }
}

impl Default for NumStarLabeller {
    fn default() -> Self {
        Self::new()
    }
}

impl Functor for NumStarLabeller {
    fn name(&self) -> String {
        "numStarFlags".to_string()
    }

    fn columns(&self) -> Vec<String> {
        vec![self.col.clone()]
    }

    fn allow_difference(&self) -> bool {
        false
    }

    fn forces_dropna_off(&self) -> bool {
        true
    }

    fn evaluate(&self, frame: &Frame) -> Result<ColumnValues, SkyframeError> {
        let x = frame.require_float(&self.col)?;
        let n_visits = x.iter().copied().filter(|v| v.is_finite()).fold(0.0, f64::max);
        Ok(ColumnValues::Str(
            x.iter()
                .map(|&v| {
                    if v.is_nan() {
                        Some(NULL_LABEL.to_string())
                    } else if v == 0.0 {
                        Some("noStar".to_string())
                    } else if v == n_visits {
                        Some("star".to_string())
                    } else {
                        Some("maybe".to_string())
                    }
                })
                .collect(),
        ))
    }
}

#[cfg(test)]
mod labeller_test {
    use super::*;

    #[test]
    fn test_star_galaxy_partition() {
        let mut frame = Frame::new(vec![1, 2, 3, 4]);
        frame
            .insert(
                "base_ClassificationExtendedness_value",
                ColumnValues::Float(vec![0.0, 0.5, 1.0, f64::NAN]),
            )
            .unwrap();
        let out = StarGalaxyLabeller::new().evaluate(&frame).unwrap();
        let ColumnValues::Str(labels) = out else {
            panic!("expected string labels");
        };
        let got: Vec<&str> = labels.iter().map(|l| l.as_deref().unwrap()).collect();
        assert_eq!(got, vec!["star", "galaxy", "galaxy", "null"]);
    }

    #[test]
    fn test_num_star_buckets() {
        let mut frame = Frame::new(vec![1, 2, 3, 4]);
        frame
            .insert("numStarFlags", ColumnValues::Float(vec![0.0, 2.0, 3.0, f64::NAN]))
            .unwrap();
        let out = NumStarLabeller::new().evaluate(&frame).unwrap();
        let ColumnValues::Str(labels) = out else {
            panic!("expected string labels");
        };
        let got: Vec<&str> = labels.iter().map(|l| l.as_deref().unwrap()).collect();
        assert_eq!(got, vec!["noStar", "maybe", "star", "null"]);
    }

    #[test]
    fn test_labellers_never_drop_rows() {
        assert!(StarGalaxyLabeller::new().forces_dropna_off());
        assert!(NumStarLabeller::new().forces_dropna_off());
        assert!(!StarGalaxyLabeller::new().allow_difference());
    }
}
