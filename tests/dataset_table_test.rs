mod common;

use std::sync::Arc;

use camino::Utf8PathBuf;

use skyframe::catalog::{
    source, Catalog, MultiMatchedCatalog, SourceCatalog, COADD_TAG,
};
use skyframe::dataset::Dataset;
use skyframe::frame::{ColumnKey, ColumnValues};
use skyframe::functors::{Column, CompositeFunctor, CustomFunctor};

use common::{sky_catalog, sky_frame};

fn temp_path(stem: &str) -> Utf8PathBuf {
    let dir = Utf8PathBuf::from_path_buf(std::env::temp_dir()).unwrap();
    dir.join(format!("{stem}_{}.parquet", std::process::id()))
}

fn user_funcs() -> CompositeFunctor {
    let mut cf = CompositeFunctor::new();
    cf.insert("y0", Arc::new(CustomFunctor::new("mag(base_PsfFlux)")));
    cf
}

#[test]
fn test_malformed_visit_is_isolated() {
    let coadd = sky_catalog("coadd", vec![1, 2], &[10.0, 10.1], &[0.0, 0.0]);
    let good = sky_catalog("v0", vec![5, 6], &[10.0, 10.1], &[0.0, 0.0]);
    let broken = Catalog::from_parquet(
        "v1",
        vec![Utf8PathBuf::from("/nonexistent/visit.parquet")],
    );

    let multi = MultiMatchedCatalog::new(coadd, vec![good, broken]);
    assert_eq!(multi.visit_cats().len(), 1);

    // The remaining visit still matches and the dataset materializes.
    let mut ds = Dataset::new(SourceCatalog::MultiMatched(multi), user_funcs());
    let table = ds.df(None).unwrap();
    assert_eq!(table.ids(), &[1, 2]);
    assert!(table
        .column(&ColumnKey::tagged("y0", COADD_TAG))
        .is_some());
    assert!(table.column(&ColumnKey::tagged("y0", "visit_0")).is_some());
    assert!(table.column(&ColumnKey::tagged("y0", "visit_1")).is_none());
}

#[test]
fn test_infinities_become_nulls() {
    let mut frame = sky_frame(vec![1, 2, 3], &[10.0, 10.1, 10.2], &[0.0, 0.0, 0.0]);
    frame
        .insert(
            "weird",
            ColumnValues::Float(vec![1.0, f64::INFINITY, f64::NEG_INFINITY]),
        )
        .unwrap();
    let catalog = SourceCatalog::Single(Catalog::from_frame("cat", frame));

    let mut cf = user_funcs();
    cf.insert("w", Arc::new(Column::new("weird")));
    let mut ds = Dataset::new(catalog, cf);
    let table = ds.df(None).unwrap();

    // Rows whose value went infinite are dropped with the null rows.
    assert_eq!(table.ids(), &[1]);
    let w = table
        .column(&ColumnKey::single("w"))
        .unwrap()
        .as_float()
        .unwrap();
    assert!(w.iter().all(|x| x.is_finite()));
}

#[test]
fn test_parquet_round_trip_with_projection() {
    let path = temp_path("skyframe_catalog");
    let frame = sky_frame(vec![11, 12, 13], &[10.0, 10.1, 10.2], &[0.0, 0.1, 0.2]);
    source::write_parquet(&frame, &path).unwrap();

    let catalog = Catalog::from_parquet("disk", vec![path.clone()]);
    let plan = catalog
        .get_columns(&["base_PsfFlux_flux".to_string(), "nope".to_string()])
        .unwrap();
    // Unknown columns degrade; the projection contract stays exact.
    assert_eq!(plan.projection(), &["base_PsfFlux_flux".to_string()]);

    let out = plan.collect().unwrap();
    assert_eq!(out.ids(), &[11, 12, 13]);
    let names: Vec<&str> = out.column_names().collect();
    assert_eq!(names, vec!["base_PsfFlux_flux"]);

    std::fs::remove_file(path.as_std_path()).unwrap();
}

#[test]
fn test_scratch_persistence_round_trip() {
    let path = temp_path("skyframe_scratch");
    let catalog = SourceCatalog::Single(sky_catalog(
        "cat",
        vec![1, 2],
        &[10.0, 10.1],
        &[0.0, 0.0],
    ));
    let mut ds = Dataset::new(catalog, user_funcs());

    let before = ds.df(None).unwrap().clone();
    ds.persist_scratch(path.clone(), None).unwrap();
    assert!(path.as_std_path().exists());

    // The next access reloads from the scratch file.
    let after = ds.df(None).unwrap();
    assert_eq!(after.ids(), before.ids());
    let key = ColumnKey::single("y0");
    assert_eq!(
        after.column(&key).unwrap().as_float().unwrap(),
        before.column(&key).unwrap().as_float().unwrap()
    );

    // Dropping the dataset removes its scratch artifact.
    drop(ds);
    assert!(!path.as_std_path().exists());
}

#[test]
fn test_flat_df_collapses_visits() {
    let coadd = sky_catalog("coadd", vec![1, 2], &[10.0, 10.1], &[0.0, 0.0]);
    let v0 = sky_catalog("v0", vec![5, 6], &[10.0, 10.1], &[0.0, 0.0]);
    let v1 = sky_catalog("v1", vec![7, 8], &[10.0, 10.1], &[0.0, 0.0]);
    let multi = MultiMatchedCatalog::new(coadd, vec![v0, v1]);

    let mut ds = Dataset::new(SourceCatalog::MultiMatched(multi), user_funcs());
    let flat = ds.flat_df(None).unwrap();

    // One level only: every key is untagged after the collapse.
    assert!(flat.keys().all(|k| k.tag.is_none()));
    // All fluxes are equal, so the per-visit scatter of y0 is zero.
    let y0 = flat
        .column(&ColumnKey::single("y0"))
        .unwrap()
        .as_float()
        .unwrap();
    assert!(y0.iter().all(|x| x.abs() < 1e-12));
}
