//! # Dataset orchestration
//!
//! A [`Dataset`] binds one [`SourceCatalog`] to a set of functors and
//! materializes the full analysis table at most once per invalidation cycle:
//! the user's derived quantities plus the coordinates, the reference
//! magnitude axis, the requested flag columns, and the classification label,
//! all outer-joined on row label and normalized for plotting (no ±infinity,
//! no spurious null rows).
//!
//! Every setter marks the cached table stale; the next [`df`](Dataset::df)
//! call recomputes it. Out-of-memory mode persists the table to a scratch
//! parquet file, drops the in-memory copy, and reloads on demand; the scratch
//! file is removed when the dataset is dropped.

use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::cache::CacheState;
use crate::catalog::{ColumnQuery, SourceCatalog, TableSource, COADD_TAG};
use crate::constants::ID_COLUMN;
use crate::exec::ExecutionContext;
use crate::frame::{ColumnKey, ResultFrame, Series};
use crate::functors::{
    call_functor, Column, CompositeFunctor, DecColumn, EvalOptions, Functor, How, Mag, MagDiff,
    RaColumn, StarGalaxyLabeller,
};
use crate::skyframe_errors::SkyframeError;

const RA_KEY: &str = "ra";
const DEC_KEY: &str = "dec";
const X_KEY: &str = "x";
const LABEL_KEY: &str = "label";
const MATCH_DISTANCE_KEY: &str = "match_distance";

/// Pairs of declared bands whose magnitude difference becomes a color column.
#[derive(Debug, Clone, Default)]
pub struct ColorScheme {
    pairs: Vec<(String, String)>,
}

impl ColorScheme {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        ColorScheme { pairs }
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Column name of one color, e.g. `"g-r"`.
    pub fn color_name(band1: &str, band2: &str) -> String {
        format!("{band1}-{band2}")
    }
}

/// One plottable dimension: a flat column name plus its human label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub column: String,
    pub label: String,
}

impl Dimension {
    fn new(column: impl Into<String>, label: impl Into<String>) -> Self {
        Dimension {
            column: column.into(),
            label: label.into(),
        }
    }
}

/// The visualization handoff: key dimensions locate a row on the sky and in
/// magnitude, value dimensions carry the derived quantities.
#[derive(Debug, Clone)]
pub struct DatasetView {
    pub kdims: Vec<Dimension>,
    pub vdims: Vec<Dimension>,
}

/// Catalog + functors + presentation policy, with a cached result table.
pub struct Dataset {
    catalog: SourceCatalog,
    funcs: CompositeFunctor,
    x_func: Arc<dyn Functor>,
    labeller: Option<Arc<dyn Functor>>,
    flags: Vec<String>,
    query: Option<String>,
    colors: Option<ColorScheme>,
    table: CacheState<ResultFrame>,
    scratch: Option<Utf8PathBuf>,
}

impl Dataset {
    /// A dataset over `catalog` computing `funcs`, with the conventional
    /// defaults: PSF magnitude on the x axis (never differenced) and the
    /// star/galaxy labeller.
    pub fn new(catalog: SourceCatalog, funcs: CompositeFunctor) -> Self {
        Dataset {
            catalog,
            funcs,
            x_func: Arc::new(Mag::new("base_PsfFlux").with_allow_difference(false)),
            labeller: Some(Arc::new(StarGalaxyLabeller::new())),
            flags: Vec::new(),
            query: None,
            colors: None,
            table: CacheState::default(),
            scratch: None,
        }
    }

    pub fn catalog(&self) -> &SourceCatalog {
        &self.catalog
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    pub fn set_funcs(&mut self, funcs: CompositeFunctor) {
        self.funcs = funcs;
        self.table.invalidate();
    }

    pub fn set_x_func(&mut self, x_func: Arc<dyn Functor>) {
        self.x_func = x_func;
        self.table.invalidate();
    }

    /// `None` drops the label column entirely.
    pub fn set_labeller(&mut self, labeller: Option<Arc<dyn Functor>>) {
        self.labeller = labeller;
        self.table.invalidate();
    }

    pub fn set_flags(&mut self, flags: Vec<String>) {
        self.flags = flags;
        self.table.invalidate();
    }

    pub fn set_query(&mut self, query: Option<String>) {
        self.query = query;
        self.table.invalidate();
    }

    pub fn set_color_scheme(&mut self, colors: Option<ColorScheme>) {
        self.colors = colors;
        self.table.invalidate();
    }

    /// The full functor set evaluated by [`df`](Dataset::df): the user's
    /// functors plus coordinates, the x axis, one passthrough per flag, and
    /// the label. Later keys override earlier ones on collision.
    pub fn allfuncs(&self) -> CompositeFunctor {
        let mut all = self.funcs.clone();
        all.insert(RA_KEY, Arc::new(RaColumn::new()));
        all.insert(DEC_KEY, Arc::new(DecColumn::new()));
        all.insert(X_KEY, Arc::clone(&self.x_func));
        for flag in &self.flags {
            all.insert(
                flag.clone(),
                Arc::new(Column::new(flag.clone()).with_allow_difference(false)),
            );
        }
        if let Some(labeller) = &self.labeller {
            all.insert(LABEL_KEY, Arc::clone(labeller));
        }
        all
    }

    /// The materialized table, computing (or reloading from scratch) if the
    /// cache is not populated.
    pub fn df(
        &mut self,
        exec: Option<&dyn ExecutionContext>,
    ) -> Result<&ResultFrame, SkyframeError> {
        if !self.table.is_computed() {
            // A clean (never-invalidated) cache with a scratch file behind it
            // reloads from disk; a stale cache always recomputes.
            let reload = match (&self.table, &self.scratch) {
                (CacheState::Uncomputed, Some(path)) => Some(path.clone()),
                _ => None,
            };
            let value = match reload {
                Some(path) => self.reload_scratch(&path)?,
                None => self.build_table(exec)?,
            };
            return Ok(self.table.set(value));
        }
        match &self.table {
            CacheState::Computed(value) => Ok(value),
            _ => unreachable!(),
        }
    }

    fn build_table(
        &self,
        exec: Option<&dyn ExecutionContext>,
    ) -> Result<ResultFrame, SkyframeError> {
        let composite = self.allfuncs();
        let opts = EvalOptions {
            dropna: false,
            how: if self.catalog.is_multi_matched() {
                How::All
            } else {
                How::Auto
            },
            query: self.query.clone(),
        };
        let mut table = composite.call(&self.catalog, &opts, exec)?;
        table.replace_infinite_with_null();

        if let SourceCatalog::Matched(mc) = &self.catalog {
            table.push(ColumnKey::single(MATCH_DISTANCE_KEY), mc.match_distance()?);
        }

        let mut table = match &self.catalog {
            // Flags are validly null on unpaired rows; everything else must
            // hold a value for the row to survive.
            SourceCatalog::Matched(_) => {
                let checked: Vec<String> = table
                    .keys()
                    .map(|k| k.name.clone())
                    .filter(|name| !self.flags.contains(name))
                    .collect();
                table.drop_null_rows(Some(&checked))
            }
            // Per-visit columns are null wherever that visit lacks a match;
            // only the coadd-level view decides whether a row stays.
            SourceCatalog::MultiMatched(_) => {
                let mask = self.coadd_level_mask(&table);
                table.filter(&mask)
            }
            SourceCatalog::Single(_) => table.drop_null_rows(None),
        };

        if let Some(scheme) = &self.colors {
            self.append_colors(&mut table, scheme, &opts)?;
        }

        Ok(table)
    }

    /// Row mask keeping rows whose untagged and coadd-tagged non-flag columns
    /// are all non-null.
    fn coadd_level_mask(&self, table: &ResultFrame) -> Vec<bool> {
        let keys: Vec<ColumnKey> = table
            .keys()
            .filter(|k| {
                let coadd_level = k.tag.as_deref().map_or(true, |t| t == COADD_TAG);
                coadd_level && !self.flags.contains(&k.name)
            })
            .cloned()
            .collect();
        (0..table.len())
            .map(|i| {
                keys.iter().all(|k| {
                    table.column(k).map_or(true, |values| !values.is_null(i))
                })
            })
            .collect()
    }

    fn append_colors(
        &self,
        table: &mut ResultFrame,
        scheme: &ColorScheme,
        opts: &EvalOptions,
    ) -> Result<(), SkyframeError> {
        let primary = self.catalog.primary();
        let bands = primary.bands();
        if bands.is_empty() {
            return Err(SkyframeError::NotMultiband(primary.name().to_string()));
        }
        let flux = self
            .x_func
            .magnitude_flux_column()
            .ok_or_else(|| SkyframeError::NotAMagnitude(self.x_func.name()))?;

        let mut color_names = Vec::with_capacity(scheme.pairs().len());
        for (band1, band2) in scheme.pairs() {
            for band in [band1, band2] {
                if !bands.contains(band) {
                    return Err(SkyframeError::UnknownBand(band.clone()));
                }
            }
            let color = MagDiff::new(format!("{band1}_{flux}"), format!("{band2}_{flux}"));
            let result = call_functor(&color, &self.catalog, opts)?;
            let mut series = result
                .into_single()
                .ok_or_else(|| SkyframeError::NonNumericDifference(color.name()))?;
            series.values.replace_infinite_with_null();
            let name = ColorScheme::color_name(band1, band2);
            table.push(ColumnKey::single(name.clone()), &series);
            color_names.push(name);
        }
        // A row missing any color is useless on a color-color plane.
        *table = table.drop_null_rows(Some(&color_names));
        Ok(())
    }

    /// Dimension labels for the visualization layer. Key dimensions locate a
    /// row; value dimensions are the derived quantities, with their label
    /// rewritten to `diff(...)` / `std(...)` where the table actually holds a
    /// difference or a per-visit scatter.
    pub fn view(&self) -> DatasetView {
        let mut kdims = vec![
            Dimension::new(RA_KEY, RA_KEY),
            Dimension::new(DEC_KEY, DEC_KEY),
            Dimension::new(X_KEY, self.x_func.name()),
        ];
        if self.labeller.is_some() {
            kdims.push(Dimension::new(LABEL_KEY, LABEL_KEY));
        }
        for flag in &self.flags {
            kdims.push(Dimension::new(flag.clone(), flag.clone()));
        }

        let mut vdims = Vec::new();
        for (key, functor) in self.user_funcs() {
            let mut label = functor.name();
            if functor.allow_difference() {
                if self.catalog.is_multi_matched() {
                    label = format!("std({label})");
                } else if self.catalog.is_matched() {
                    label = format!("diff({label})");
                }
            }
            vdims.push(Dimension::new(key, label));
        }
        if let SourceCatalog::Matched(_) = &self.catalog {
            vdims.push(Dimension::new(
                MATCH_DISTANCE_KEY,
                "Match Distance [arcsec]",
            ));
        }

        DatasetView { kdims, vdims }
    }

    fn user_funcs(&self) -> Vec<(String, Arc<dyn Functor>)> {
        let reserved = [RA_KEY, DEC_KEY, X_KEY, LABEL_KEY];
        self.funcs
            .keys()
            .filter(|k| !reserved.contains(k) && !self.flags.iter().any(|f| f.as_str() == *k))
            .filter_map(|k| {
                self.funcs
                    .get(k)
                    .map(|f| (k.to_string(), Arc::clone(f)))
            })
            .collect()
    }

    /// The table with the two-level multi-matched hierarchy collapsed: each
    /// difference-allowed group becomes its per-row standard deviation across
    /// the visit columns, every other group keeps its coadd column. Matched
    /// and single-catalog tables are already flat and come back unchanged.
    pub fn flat_df(
        &mut self,
        exec: Option<&dyn ExecutionContext>,
    ) -> Result<ResultFrame, SkyframeError> {
        let allfuncs = self.allfuncs();
        let multi = self.catalog.is_multi_matched();
        let table = self.df(exec)?;
        if !multi {
            return Ok(table.clone());
        }

        let ids = table.ids().to_vec();
        let mut names: Vec<String> = Vec::new();
        for key in table.keys() {
            if !names.contains(&key.name) {
                names.push(key.name.clone());
            }
        }

        let mut parts: Vec<(ColumnKey, Series)> = Vec::new();
        for name in names {
            let group = table.group(&name);
            let values = if group.len() == 1 && group[0].0.is_none() {
                group[0].1.clone()
            } else {
                let allow = allfuncs
                    .get(&name)
                    .map(|f| f.allow_difference())
                    .unwrap_or(false);
                if allow {
                    table.group_std(&name, &[COADD_TAG])?
                } else {
                    let coadd = group
                        .iter()
                        .find(|(tag, _)| *tag == Some(COADD_TAG))
                        .or_else(|| group.first())
                        .map(|(_, v)| (*v).clone());
                    match coadd {
                        Some(v) => v,
                        None => continue,
                    }
                }
            };
            parts.push((ColumnKey::single(name), Series::new(ids.clone(), values)?));
        }
        Ok(ResultFrame::from_series(parts))
    }

    /// Out-of-memory mode: write the table to `path`, drop the in-memory
    /// copy, and reload lazily on the next [`df`](Dataset::df) call.
    pub fn persist_scratch(
        &mut self,
        path: impl Into<Utf8PathBuf>,
        exec: Option<&dyn ExecutionContext>,
    ) -> Result<(), SkyframeError> {
        let path = path.into();
        let flat = self.df(exec)?.to_flat_frame();
        crate::catalog::source::write_parquet(&flat, &path)?;
        self.scratch = Some(path);
        self.table.clear();
        Ok(())
    }

    pub fn scratch_path(&self) -> Option<&Utf8PathBuf> {
        self.scratch.as_ref()
    }

    fn reload_scratch(&self, path: &Utf8PathBuf) -> Result<ResultFrame, SkyframeError> {
        if !path.as_std_path().exists() {
            return Err(SkyframeError::NoScratchFile);
        }
        let source = Arc::new(TableSource::Parquet {
            files: vec![path.clone()],
        });
        let columns: Vec<String> = source
            .probe_schema()?
            .into_iter()
            .map(|c| c.name)
            .filter(|name| name != ID_COLUMN)
            .collect();
        let frame = ColumnQuery::new(source, columns).collect()?;
        Ok(ResultFrame::from_flat_frame(&frame))
    }
}

impl Drop for Dataset {
    fn drop(&mut self) {
        // Scratch files are cache artifacts; best-effort cleanup.
        if let Some(path) = &self.scratch {
            let _ = std::fs::remove_file(path.as_std_path());
        }
    }
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("catalog", &self.catalog)
            .field("funcs", &self.funcs)
            .field("flags", &self.flags)
            .field("query", &self.query)
            .field("cached", &self.table.is_computed())
            .finish()
    }
}
