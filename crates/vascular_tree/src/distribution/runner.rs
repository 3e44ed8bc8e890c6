//! Independent distribution tries on scoped threads.
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use rand::rngs::StdRng;
use rand::SeedableRng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::distribution::flow_tree::TractTree;
use crate::distribution::{distribute, Distribution, DistributionConfig};
use crate::error::{Error, Result};
use crate::random::SeedSequence;

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TriesConfig {
    pub tries: usize,
    /// Master seed; try `i` uses the `i`-th value of a [`SeedSequence`] over it.
    pub seed: u64,
    /// How often progress is reported while tries are running.
    pub poll_interval: Duration,
}

impl Default for TriesConfig {
    fn default() -> Self {
        Self {
            tries: 1,
            seed: 0,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl TriesConfig {
    pub fn new(tries: usize) -> Self {
        Self {
            tries,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Validates the configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.tries == 0 {
            return Err(Error::InvalidConfig("tries must be > 0".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidConfig("poll_interval must be > 0".into()));
        }
        Ok(())
    }
}

/// Runs `tries.tries` independent distributions of `count` particles, one thread each.
///
/// While waiting, the progress of every try (0 to 100) is passed to `on_progress` once per
/// poll interval. Results come back in try order; the first failing try fails the whole run.
pub fn run_tries<P>(
    tree: &TractTree,
    count: u64,
    config: &DistributionConfig,
    tries: &TriesConfig,
    mut on_progress: P,
) -> Result<Vec<Distribution>>
where
    P: FnMut(&[u8]),
{
    config.validate()?;
    tries.validate()?;

    let progress: Vec<Arc<AtomicU8>> = (0..tries.tries)
        .map(|_| Arc::new(AtomicU8::new(0)))
        .collect();
    let seeds: Vec<u64> = SeedSequence::new(tries.seed).take(tries.tries).collect();
    let (tx, rx) = crossbeam_channel::unbounded();

    let mut results: Vec<Option<Result<Distribution>>> = (0..tries.tries).map(|_| None).collect();
    thread::scope(|scope| {
        for (i, (seed, pct)) in seeds.iter().zip(&progress).enumerate() {
            let tx = tx.clone();
            let pct = Arc::clone(pct);
            let seed = *seed;
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                let out = distribute(tree, count, config, &mut rng, &pct);
                debug!("Try {} finished", i);
                // The receiver outlives every sender inside the scope.
                let _ = tx.send((i, out));
            });
        }
        drop(tx);

        let mut done = 0;
        while done < tries.tries {
            match rx.recv_timeout(tries.poll_interval) {
                Ok((i, out)) => {
                    results[i] = Some(out);
                    done += 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    let snapshot: Vec<u8> = progress
                        .iter()
                        .map(|p| p.load(Ordering::Relaxed))
                        .collect();
                    info!("Progress: {:?}", snapshot);
                    on_progress(&snapshot);
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    });

    results
        .into_iter()
        .enumerate()
        .map(|(i, r)| r.unwrap_or_else(|| Err(Error::Other(format!("try {i} did not finish")))))
        .collect()
}
