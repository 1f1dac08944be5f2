//! # Execution contexts
//!
//! Optional parallelism for independent evaluation jobs. The core never
//! manages threads on its own: operations that can fan out take an explicit
//! `Option<&dyn ExecutionContext>` and fall back to synchronous local
//! evaluation when none is supplied. There is no cancellation and no retry;
//! a job's error is returned in its slot, never escalated across jobs.

use std::num::NonZeroUsize;

/// A boxed unit of work producing a `T`.
pub type Job<'a, T> = Box<dyn FnOnce() -> T + Send + 'a>;

/// Maps a batch of independent jobs to their results, preserving order.
pub trait ExecutionContext: Sync {
    fn map_jobs<'a>(&self, jobs: Vec<Job<'a, JobOutput>>) -> Vec<JobOutput>;
}

/// Erased job result: evaluation outcomes cross the context boundary as
/// `Result`s so one failing job does not poison its batch.
pub type JobOutput = Result<crate::functors::FunctorResult, crate::skyframe_errors::SkyframeError>;

/// Run jobs with an optional context; `None` means run them inline, in order.
pub fn run_jobs<'a>(
    exec: Option<&dyn ExecutionContext>,
    jobs: Vec<Job<'a, JobOutput>>,
) -> Vec<JobOutput> {
    match exec {
        Some(context) => context.map_jobs(jobs),
        None => jobs.into_iter().map(|job| job()).collect(),
    }
}

/// Scoped-thread pool context: fans the batch out over a fixed number of
/// worker threads and joins before returning.
pub struct ThreadPoolContext {
    workers: NonZeroUsize,
}

impl ThreadPoolContext {
    pub fn new(workers: NonZeroUsize) -> Self {
        ThreadPoolContext { workers }
    }
}

impl ExecutionContext for ThreadPoolContext {
    fn map_jobs<'a>(&self, jobs: Vec<Job<'a, JobOutput>>) -> Vec<JobOutput> {
        let workers = self.workers.get();
        let n = jobs.len();
        let mut slots: Vec<Option<JobOutput>> = Vec::with_capacity(n);
        slots.resize_with(n, || None);

        // Hand each worker every `workers`-th job; result slots are indexed
        // so output order matches input order.
        let mut batches: Vec<Vec<(usize, Job<'a, JobOutput>)>> =
            (0..workers).map(|_| Vec::new()).collect();
        for (i, job) in jobs.into_iter().enumerate() {
            batches[i % workers].push((i, job));
        }
        std::thread::scope(|scope| {
            let handles: Vec<_> = batches
                .into_iter()
                .filter(|batch| !batch.is_empty())
                .map(|batch| {
                    scope.spawn(move || {
                        batch
                            .into_iter()
                            .map(|(i, job)| (i, job()))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            for handle in handles {
                for (i, out) in handle.join().expect("worker thread panicked") {
                    slots[i] = Some(out);
                }
            }
        });
        slots
            .into_iter()
            .map(|slot| slot.expect("every job slot filled"))
            .collect()
    }
}
