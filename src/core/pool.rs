use crate::types::{DtmError, DtmResult};

/// Bounded worker pool sized by the configured CPU budget
#[derive(Debug, Clone, Copy)]
pub struct TilePool {
    threads: usize,
}

impl TilePool {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Apply `f` to every item on at most `threads` workers. Results keep input order.
    #[cfg(feature = "parallel")]
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> DtmResult<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        use rayon::prelude::*;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| DtmError::Processing(format!("Failed to build worker pool: {}", e)))?;

        Ok(pool.install(|| items.par_iter().map(|item| f(item)).collect()))
    }

    #[cfg(not(feature = "parallel"))]
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> DtmResult<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        Ok(items.iter().map(f).collect())
    }
}
