use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::error::{Result, RfmError};

type Job<T> = Box<dyn FnOnce() -> Result<T> + Send + 'static>;

/// Fixed-size worker pool over a bounded job queue (one pending job per
/// worker, so a fast producer blocks). The result channel stays unbounded:
/// it is drained only after `process` joins the workers.
pub struct JobHandler<T> {
    jobs: Sender<Job<T>>,
    results: Receiver<T>,
    workers: Vec<JoinHandle<Vec<RfmError>>>,
}

impl<T: Send + 'static> JobHandler<T> {
    pub fn new(nproc: usize) -> Self {
        let nproc = nproc.max(1);
        let (jobs, job_rx) = bounded::<Job<T>>(nproc);
        let (result_tx, results) = unbounded();

        let mut workers = Vec::with_capacity(nproc);
        for _ in 0..nproc {
            let rx: Receiver<Job<T>> = job_rx.clone();
            let tx: Sender<T> = result_tx.clone();
            workers.push(thread::spawn(move || {
                let mut failures = Vec::new();
                while let Ok(job) = rx.recv() {
                    match job() {
                        Ok(out) => {
                            // The pool half of the channel outlives the
                            // workers; a send cannot fail here.
                            let _ = tx.send(out);
                        }
                        Err(e) => failures.push(e),
                    }
                }
                failures
            }));
        }

        JobHandler { jobs, results, workers }
    }

    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        // The receive side lives as long as the workers; if every worker
        // died the failure surfaces in process() via join.
        let _ = self.jobs.send(Box::new(job));
    }

    /// Close the queue, wait until every submitted task has completed, and
    /// drain the results. Task failures aggregate into one `Worker` error.
    pub fn process(self) -> Result<Vec<T>> {
        drop(self.jobs);
        let mut failures = Vec::new();
        for w in self.workers {
            match w.join() {
                Ok(errs) => failures.extend(errs),
                Err(_) => failures.push(RfmError::Format("worker thread panicked".into())),
            }
        }
        let results: Vec<T> = self.results.try_iter().collect();
        if failures.is_empty() {
            Ok(results)
        } else {
            Err(RfmError::Worker(failures))
        }
    }
}
