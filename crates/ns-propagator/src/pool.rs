//! Fixed-size worker pool for per-sample jobs.
//!
//! Jobs are partitioned by index into one contiguous chunk per worker; each
//! chunk only touches its own items, so no locking happens inside a job.

use ns_core::{Error, Result};
use rayon::ThreadPool;

/// Worker pool built once per run and reused across load and evaluation.
#[derive(Debug)]
pub struct WorkerPool {
    pool: ThreadPool,
    n_threads: usize,
    low_latency: bool,
}

impl WorkerPool {
    /// Build a pool with `n_threads` workers (0 = one per logical CPU).
    pub fn new(n_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|i| format!("ns-worker-{i}"))
            .build()
            .map_err(|e| Error::Computation(format!("failed to create thread pool: {e}")))?;
        let n_threads = pool.current_num_threads();
        Ok(Self { pool, n_threads, low_latency: false })
    }

    /// Number of workers
    pub fn n_threads(&self) -> usize {
        self.n_threads
    }

    /// In low-latency mode the calling thread runs the first partition itself
    /// instead of parking until the workers finish.
    pub fn set_low_latency(&mut self, enabled: bool) {
        self.low_latency = enabled;
    }

    /// Current low-latency flag.
    pub fn is_low_latency(&self) -> bool {
        self.low_latency
    }

    /// Run `job(index, item)` on every item and wait for completion.
    pub fn run_job<T, F>(&self, items: &mut [T], job: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync,
    {
        if items.is_empty() {
            return;
        }
        let n_chunks = self.n_threads.min(items.len()).max(1);
        if n_chunks == 1 {
            for (i, item) in items.iter_mut().enumerate() {
                job(i, item);
            }
            return;
        }

        let chunk_size = items.len().div_ceil(n_chunks);
        let job = &job;
        let run_chunk = move |offset: usize, chunk: &mut [T]| {
            for (i, item) in chunk.iter_mut().enumerate() {
                job(offset + i, item);
            }
        };

        if self.low_latency {
            let mut chunks = items.chunks_mut(chunk_size).enumerate();
            let first = chunks.next();
            self.pool.in_place_scope(|scope| {
                for (c, chunk) in chunks {
                    scope.spawn(move |_| run_chunk(c * chunk_size, chunk));
                }
                if let Some((_, chunk)) = first {
                    run_chunk(0, chunk);
                }
            });
        } else {
            self.pool.scope(|scope| {
                for (c, chunk) in items.chunks_mut(chunk_size).enumerate() {
                    scope.spawn(move |_| run_chunk(c * chunk_size, chunk));
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_item_visited_once_with_its_index() {
        let pool = WorkerPool::new(4).unwrap();
        let mut items = vec![0usize; 11];
        pool.run_job(&mut items, |i, item| *item += i + 1);
        assert_eq!(items, (1..=11).collect::<Vec<_>>());
    }

    #[test]
    fn test_low_latency_mode() {
        let mut pool = WorkerPool::new(3).unwrap();
        pool.set_low_latency(true);
        assert!(pool.is_low_latency());
        let mut items = vec![1.0f64; 7];
        pool.run_job(&mut items, |i, item| *item *= i as f64);
        assert_eq!(items[6], 6.0);
        assert_eq!(items[0], 0.0);
    }

    #[test]
    fn test_single_thread_and_empty() {
        let pool = WorkerPool::new(1).unwrap();
        let mut empty: Vec<u8> = Vec::new();
        pool.run_job(&mut empty, |_, _| unreachable!());
        let mut items = vec![0u8; 3];
        pool.run_job(&mut items, |i, item| *item = i as u8);
        assert_eq!(items, vec![0, 1, 2]);
    }
}
