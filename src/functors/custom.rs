//! Arbitrary analyst-typed expression functors.

use crate::constants::FLUX_SUFFIX;
use crate::expr::{evaluate, mag_arguments, parse_expression, rewrite_mag, scan_columns};
use crate::frame::{ColumnValues, Frame};
use crate::functors::{flux_name, Functor};
use crate::skyframe_errors::SkyframeError;

/// A functor built from an expression string, e.g.
/// `"mag(modelfit_CModel) - mag(base_PsfFlux)"`.
///
/// `mag(x)` is magnitude-aware sugar: before parsing it is rewritten to
/// `-2.5*log10(x)`, with `x` resolved to `x_flux` when `x` is shorthand for
/// a flux column. Column discovery is the same best-effort lexical scan the
/// expression engine documents, adjusted for the rewrite so the declared
/// read set names the flux columns actually fetched.
#[derive(Debug, Clone)]
pub struct CustomFunctor {
    expr: String,
}

impl CustomFunctor {
    pub fn new(expr: impl Into<String>) -> Self {
        CustomFunctor { expr: expr.into() }
    }

    pub fn expression(&self) -> &str {
        &self.expr
    }
}

impl Functor for CustomFunctor {
    fn name(&self) -> String {
        self.expr.clone()
    }

    fn columns(&self) -> Vec<String> {
        let mut cols = scan_columns(&self.expr);
        for arg in mag_arguments(&self.expr) {
            if arg.ends_with(FLUX_SUFFIX) {
                continue;
            }
            // `mag(foo)` reads `foo_flux`, not `foo`.
            cols.retain(|c| c != &arg);
            let resolved = flux_name(&arg);
            if !cols.iter().any(|c| c == &resolved) {
                cols.push(resolved);
            }
        }
        cols
    }

    fn evaluate(&self, frame: &Frame) -> Result<ColumnValues, SkyframeError> {
        let rewritten = rewrite_mag(&self.expr, |name| {
            if name.ends_with(FLUX_SUFFIX) || frame.has_column(name) {
                name.to_string()
            } else {
                flux_name(name)
            }
        });
        let ast = parse_expression(&rewritten)?;
        evaluate(&ast, frame).map_err(|e| match e {
            err @ SkyframeError::MissingColumn(_) => err,
            other => SkyframeError::ExpressionEval {
                expr: self.expr.clone(),
                reason: other.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod custom_test {
    use super::*;
    use approx::assert_relative_eq;

    fn frame() -> Frame {
        let mut f = Frame::new(vec![1, 2]);
        f.insert("a_flux", ColumnValues::Float(vec![100.0, 10.0]))
            .unwrap();
        f.insert("b_flux", ColumnValues::Float(vec![10.0, 10.0]))
            .unwrap();
        f.insert("c", ColumnValues::Float(vec![1.0, 2.0])).unwrap();
        f
    }

    #[test]
    fn test_columns_resolve_mag_shorthand() {
        let f = CustomFunctor::new("mag(a) - mag(b_flux) + c");
        assert_eq!(
            f.columns(),
            vec!["b_flux".to_string(), "c".to_string(), "a_flux".to_string()]
        );
    }

    #[test]
    fn test_color_expression() {
        let f = CustomFunctor::new("mag(a) - mag(b)");
        let out = f.evaluate(&frame()).unwrap();
        let v = out.as_float().unwrap();
        assert_relative_eq!(v[0], -2.5);
        assert_relative_eq!(v[1], 0.0);
    }

    #[test]
    fn test_plain_arithmetic() {
        let f = CustomFunctor::new("c * 2 + 1");
        let out = f.evaluate(&frame()).unwrap();
        assert_eq!(out, ColumnValues::Float(vec![3.0, 5.0]));
    }

    #[test]
    fn test_bad_expression_is_parse_error() {
        let f = CustomFunctor::new("c +* 2");
        assert!(matches!(
            f.evaluate(&frame()),
            Err(SkyframeError::ExpressionParse { .. })
        ));
    }
}
