//! Shape and image-quality functors built on second-moment columns.
//!
//! Trace size is `sqrt(0.5*(Ixx + Iyy))` in pixels; the PSF variants compare
//! source size against the PSF model size as a percentage.

use crate::frame::{ColumnValues, Frame};
use crate::functors::Functor;
use crate::skyframe_errors::SkyframeError;

const SDSS_XX: &str = "base_SdssShape_xx";
const SDSS_YY: &str = "base_SdssShape_yy";
const SDSS_PSF_XX: &str = "base_SdssShape_psf_xx";
const SDSS_PSF_YY: &str = "base_SdssShape_psf_yy";
const HSM_XX: &str = "ext_shapeHSM_HsmSourceMoments_xx";
const HSM_YY: &str = "ext_shapeHSM_HsmSourceMoments_yy";
const HSM_PSF_XX: &str = "ext_shapeHSM_HsmPsfMoments_xx";
const HSM_PSF_YY: &str = "ext_shapeHSM_HsmPsfMoments_yy";

/// Plate scale of the camera, arcsec per pixel.
const PIXEL_SCALE: f64 = 0.168;
/// Gaussian sigma-to-FWHM factor.
const SIGMA_TO_FWHM: f64 = 2.35;

fn trace_size(xx: &[f64], yy: &[f64]) -> Vec<f64> {
    xx.iter()
        .zip(yy)
        .map(|(x, y)| (0.5 * (x + y)).sqrt())
        .collect()
}

fn percent_diff(src: &[f64], psf: &[f64]) -> Vec<f64> {
    src.iter()
        .zip(psf)
        .map(|(s, p)| 100.0 * (s - p) / s)
        .collect()
}

/// Second moments with the PSF subtracted: `Ixx + Iyy` of the source (HSM
/// where measured, SDSS adaptive moments otherwise) minus the PSF moments.
#[derive(Debug, Clone, Default)]
pub struct DeconvolvedMoments;

impl Functor for DeconvolvedMoments {
    fn name(&self) -> String {
        "Deconvolved Moments".to_string()
    }

    fn columns(&self) -> Vec<String> {
        [SDSS_XX, SDSS_YY, HSM_XX, HSM_YY, HSM_PSF_XX, HSM_PSF_YY]
            .iter()
            .map(|c| c.to_string())
            .collect()
    }

    fn evaluate(&self, frame: &Frame) -> Result<ColumnValues, SkyframeError> {
        let sdss_xx = frame.require_float(SDSS_XX)?;
        let sdss_yy = frame.require_float(SDSS_YY)?;

        // The HSM source columns are optional in older reductions; rows fall
        // back to the SDSS moments where HSM is absent or failed.
        let hsm: Vec<f64> = if frame.has_column(HSM_XX) && frame.has_column(HSM_YY) {
            let xx = frame.require_float(HSM_XX)?;
            let yy = frame.require_float(HSM_YY)?;
            xx.iter().zip(yy).map(|(x, y)| x + y).collect()
        } else {
            vec![f64::NAN; frame.len()]
        };

        if !frame.has_column(HSM_PSF_XX) || !frame.has_column(HSM_PSF_YY) {
            return Err(SkyframeError::MissingColumn(HSM_PSF_XX.to_string()));
        }
        let psf_xx = frame.require_float(HSM_PSF_XX)?;
        let psf_yy = frame.require_float(HSM_PSF_YY)?;

        let out = hsm
            .iter()
            .enumerate()
            .map(|(i, &h)| {
                let source = if h.is_finite() {
                    h
                } else {
                    sdss_xx[i] + sdss_yy[i]
                };
                source - (psf_xx[i] + psf_yy[i])
            })
            .collect();
        Ok(ColumnValues::Float(out))
    }
}

/// Source trace size from the SDSS adaptive moments, in pixels.
#[derive(Debug, Clone, Default)]
pub struct SdssTraceSize;

impl Functor for SdssTraceSize {
    fn name(&self) -> String {
        "SDSS Trace Size".to_string()
    }

    fn columns(&self) -> Vec<String> {
        vec![SDSS_XX.to_string(), SDSS_YY.to_string()]
    }

    fn evaluate(&self, frame: &Frame) -> Result<ColumnValues, SkyframeError> {
        Ok(ColumnValues::Float(trace_size(
            frame.require_float(SDSS_XX)?,
            frame.require_float(SDSS_YY)?,
        )))
    }
}

/// Percent difference between SDSS source and PSF-model trace sizes.
#[derive(Debug, Clone, Default)]
pub struct PsfSdssTraceSizeDiff;

impl Functor for PsfSdssTraceSizeDiff {
    fn name(&self) -> String {
        "PSF - SDSS Trace Size (percent)".to_string()
    }

    fn columns(&self) -> Vec<String> {
        [SDSS_XX, SDSS_YY, SDSS_PSF_XX, SDSS_PSF_YY]
            .iter()
            .map(|c| c.to_string())
            .collect()
    }

    fn evaluate(&self, frame: &Frame) -> Result<ColumnValues, SkyframeError> {
        let src = trace_size(
            frame.require_float(SDSS_XX)?,
            frame.require_float(SDSS_YY)?,
        );
        let psf = trace_size(
            frame.require_float(SDSS_PSF_XX)?,
            frame.require_float(SDSS_PSF_YY)?,
        );
        Ok(ColumnValues::Float(percent_diff(&src, &psf)))
    }
}

/// Source trace size from the HSM moments, in pixels.
#[derive(Debug, Clone, Default)]
pub struct HsmTraceSize;

impl Functor for HsmTraceSize {
    fn name(&self) -> String {
        "HSM Trace Size".to_string()
    }

    fn columns(&self) -> Vec<String> {
        vec![HSM_XX.to_string(), HSM_YY.to_string()]
    }

    fn evaluate(&self, frame: &Frame) -> Result<ColumnValues, SkyframeError> {
        Ok(ColumnValues::Float(trace_size(
            frame.require_float(HSM_XX)?,
            frame.require_float(HSM_YY)?,
        )))
    }
}

/// Percent difference between HSM source and PSF-model trace sizes.
#[derive(Debug, Clone, Default)]
pub struct PsfHsmTraceSizeDiff;

impl Functor for PsfHsmTraceSizeDiff {
    fn name(&self) -> String {
        "PSF - HSM Trace Size (percent)".to_string()
    }

    fn columns(&self) -> Vec<String> {
        [HSM_XX, HSM_YY, HSM_PSF_XX, HSM_PSF_YY]
            .iter()
            .map(|c| c.to_string())
            .collect()
    }

    fn evaluate(&self, frame: &Frame) -> Result<ColumnValues, SkyframeError> {
        let src = trace_size(frame.require_float(HSM_XX)?, frame.require_float(HSM_YY)?);
        let psf = trace_size(
            frame.require_float(HSM_PSF_XX)?,
            frame.require_float(HSM_PSF_YY)?,
        );
        Ok(ColumnValues::Float(percent_diff(&src, &psf)))
    }
}

/// PSF FWHM in arcsec from the PSF-model second moments.
#[derive(Debug, Clone, Default)]
pub struct Seeing;

impl Functor for Seeing {
    fn name(&self) -> String {
        "seeing".to_string()
    }

    fn columns(&self) -> Vec<String> {
        vec![SDSS_PSF_XX.to_string(), SDSS_PSF_YY.to_string()]
    }

    fn evaluate(&self, frame: &Frame) -> Result<ColumnValues, SkyframeError> {
        let xx = frame.require_float(SDSS_PSF_XX)?;
        let yy = frame.require_float(SDSS_PSF_YY)?;
        Ok(ColumnValues::Float(
            xx.iter()
                .zip(yy)
                .map(|(x, y)| PIXEL_SCALE * SIGMA_TO_FWHM * (0.5 * (x * x + y * y)).sqrt())
                .collect(),
        ))
    }
}

/// Detection footprint area in pixels.
#[derive(Debug, Clone, Default)]
pub struct FootprintNPix;

impl Functor for FootprintNPix {
    fn name(&self) -> String {
        "Footprint nPix".to_string()
    }

    fn columns(&self) -> Vec<String> {
        vec!["base_Footprint_nPix".to_string()]
    }

    fn evaluate(&self, frame: &Frame) -> Result<ColumnValues, SkyframeError> {
        Ok(frame.require("base_Footprint_nPix")?.clone())
    }
}
