//! Composition of independent functors into one tabular result.

use std::sync::Arc;

use itertools::Itertools;

use crate::catalog::SourceCatalog;
use crate::exec::{run_jobs, ExecutionContext, Job, JobOutput};
use crate::frame::{ColumnKey, ResultFrame};
use crate::functors::{call_functor, EvalOptions, Functor, FunctorResult};
use crate::skyframe_errors::SkyframeError;

/// A keyed collection of functors evaluated against one catalog and
/// assembled into a [`ResultFrame`].
///
/// Keys name the result columns; the functors themselves stay shared and
/// immutable, so the same instance can sit in several composites. Each
/// member is an independent evaluation job: with an
/// [`ExecutionContext`](crate::exec::ExecutionContext) they run in parallel,
/// without one they run inline in insertion order. Either way the assembled
/// column order follows insertion order.
#[derive(Clone, Default)]
pub struct CompositeFunctor {
    funcs: Vec<(String, Arc<dyn Functor>)>,
}

impl CompositeFunctor {
    pub fn new() -> Self {
        CompositeFunctor { funcs: Vec::new() }
    }

    pub fn from_pairs(pairs: Vec<(String, Arc<dyn Functor>)>) -> Self {
        let mut out = CompositeFunctor::new();
        for (key, functor) in pairs {
            out.insert(key, functor);
        }
        out
    }

    /// Add or replace the member under `key`.
    pub fn insert(&mut self, key: impl Into<String>, functor: Arc<dyn Functor>) {
        let key = key.into();
        self.funcs.retain(|(k, _)| *k != key);
        self.funcs.push((key, functor));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.funcs.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&Arc<dyn Functor>> {
        self.funcs.iter().find(|(k, _)| k == key).map(|(_, f)| f)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.funcs.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    /// Union of the members' declared columns, deduplicated. This is the
    /// whole composite's read set: shared columns are fetched once.
    pub fn columns(&self) -> Vec<String> {
        self.funcs
            .iter()
            .flat_map(|(_, functor)| functor.columns())
            .unique()
            .collect()
    }

    /// Evaluate every member against `catalog` and outer-join the results on
    /// row label. A member producing a grouped result (one series per
    /// constituent catalog) contributes one tagged column per constituent.
    pub fn call(
        &self,
        catalog: &SourceCatalog,
        opts: &EvalOptions,
        exec: Option<&dyn ExecutionContext>,
    ) -> Result<ResultFrame, SkyframeError> {
        let jobs: Vec<Job<'_, JobOutput>> = self
            .funcs
            .iter()
            .map(|(_, functor)| {
                let functor = Arc::clone(functor);
                Box::new(move || call_functor(functor.as_ref(), catalog, opts)) as Job<'_, JobOutput>
            })
            .collect();

        let mut parts: Vec<(ColumnKey, crate::frame::Series)> = Vec::new();
        for ((key, _), outcome) in self.funcs.iter().zip(run_jobs(exec, jobs)) {
            match outcome? {
                FunctorResult::Single(series) => {
                    parts.push((ColumnKey::single(key.clone()), series));
                }
                FunctorResult::Grouped(entries) => {
                    for (tag, series) in entries {
                        parts.push((ColumnKey::tagged(key.clone(), tag), series));
                    }
                }
            }
        }
        Ok(ResultFrame::from_series(parts))
    }
}

impl std::fmt::Debug for CompositeFunctor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeFunctor")
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod composite_test {
    use super::*;
    use crate::catalog::Catalog;
    use crate::constants::{COORD_DEC_COLUMN, COORD_RA_COLUMN};
    use crate::exec::ThreadPoolContext;
    use crate::frame::{ColumnValues, Frame};
    use crate::functors::{Column, CustomFunctor};
    use std::num::NonZeroUsize;

    fn catalog() -> SourceCatalog {
        let mut frame = Frame::new(vec![1, 2, 3]);
        frame
            .insert(COORD_RA_COLUMN, ColumnValues::Float(vec![0.0, 0.1, 0.2]))
            .unwrap();
        frame
            .insert(COORD_DEC_COLUMN, ColumnValues::Float(vec![0.0, 0.0, 0.0]))
            .unwrap();
        frame
            .insert("a", ColumnValues::Float(vec![1.0, 2.0, 3.0]))
            .unwrap();
        frame
            .insert("b_flux", ColumnValues::Float(vec![100.0, 100.0, 100.0]))
            .unwrap();
        SourceCatalog::Single(Catalog::from_frame("test", frame))
    }

    fn composite() -> CompositeFunctor {
        let mut cf = CompositeFunctor::new();
        cf.insert("a", Arc::new(Column::new("a")));
        cf.insert("m", Arc::new(CustomFunctor::new("mag(b) + a")));
        cf
    }

    #[test]
    fn test_columns_are_union() {
        assert_eq!(
            composite().columns(),
            vec!["a".to_string(), "b_flux".to_string()]
        );
    }

    #[test]
    fn test_call_assembles_columns() {
        let cat = catalog();
        let rf = composite()
            .call(&cat, &EvalOptions::default(), None)
            .unwrap();
        assert_eq!(rf.ids(), &[1, 2, 3]);
        let m = rf.column(&ColumnKey::single("m")).unwrap().as_float().unwrap();
        assert_eq!(m[0], -5.0 + 1.0);
        assert_eq!(m[2], -5.0 + 3.0);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let cat = catalog();
        let cf = composite();
        let serial = cf.call(&cat, &EvalOptions::default(), None).unwrap();
        let pool = ThreadPoolContext::new(NonZeroUsize::new(2).unwrap());
        let parallel = cf.call(&cat, &EvalOptions::default(), Some(&pool)).unwrap();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_insert_replaces_key() {
        let mut cf = composite();
        cf.insert("a", Arc::new(Column::new("b_flux")));
        assert_eq!(cf.len(), 2);
        assert_eq!(cf.get("a").unwrap().columns(), vec!["b_flux".to_string()]);
    }
}
