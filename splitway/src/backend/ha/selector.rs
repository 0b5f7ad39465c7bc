//! Pick one datasource out of several.
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::seq::SliceRandom;

use super::DbIndex;
use crate::config::LoadBalancingStrategy;

#[derive(Debug)]
pub struct Selector {
    strategy: LoadBalancingStrategy,
    counter: AtomicUsize,
}

impl Selector {
    pub fn new(strategy: LoadBalancingStrategy) -> Self {
        Self {
            strategy,
            counter: AtomicUsize::new(0),
        }
    }

    /// Pick according to the load balancing strategy.
    pub fn pick(&self, candidates: &[DbIndex]) -> Option<DbIndex> {
        if candidates.is_empty() {
            return None;
        }

        match self.strategy {
            LoadBalancingStrategy::Random => Self::random(candidates),
            LoadBalancingStrategy::RoundRobin => {
                let next = self.counter.fetch_add(1, Ordering::Relaxed);
                candidates.get(next % candidates.len()).cloned()
            }
        }
    }

    /// Pick uniformly at random.
    pub fn random(candidates: &[DbIndex]) -> Option<DbIndex> {
        candidates.choose(&mut rand::thread_rng()).cloned()
    }
}
