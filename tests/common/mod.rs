use skyframe::catalog::Catalog;
use skyframe::constants::{RowId, COORD_DEC_COLUMN, COORD_RA_COLUMN, RADEG};
use skyframe::frame::{ColumnValues, Frame};

/// A frame holding the conventional catalog columns: radian coordinates, a
/// PSF flux and the extendedness classifier.
pub fn sky_frame(ids: Vec<RowId>, ra_deg: &[f64], dec_deg: &[f64]) -> Frame {
    let n = ids.len();
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
    frame
        .insert("base_PsfFlux_flux", ColumnValues::Float(vec![100.0; n]))
        .unwrap();
    frame
        .insert(
            "base_ClassificationExtendedness_value",
            ColumnValues::Float((0..n).map(|i| (i % 2) as f64).collect()),
        )
        .unwrap();
    frame
}

pub fn sky_catalog(name: &str, ids: Vec<RowId>, ra_deg: &[f64], dec_deg: &[f64]) -> Catalog {
    Catalog::from_frame(name, sky_frame(ids, ra_deg, dec_deg))
}
