//! Uniform record sampling.

use crate::dataset::{DatasetStore, Record};
use rand::prelude::*;

/// Draws records uniformly at random. One sampler per VU.
#[derive(Debug)]
pub struct Sampler {
    rng: StdRng,
}

impl Sampler {
    /// Use seed if provided for reproducible tests, otherwise use entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = if let Some(seed) = seed {
            StdRng::seed_from_u64(seed)
        } else {
            StdRng::from_entropy()
        };
        Self { rng }
    }

    /// Sampler for VU `vu_id`, derived from the run's base seed.
    pub fn for_vu(base_seed: Option<u64>, vu_id: usize) -> Self {
        Self::new(base_seed.map(|seed| seed.wrapping_add(vu_id as u64)))
    }

    pub fn sample_index(&mut self, len: usize) -> usize {
        assert!(len > 0, "sampled from an empty dataset");
        self.rng.gen_range(0..len)
    }

    /// Draw one record.
    ///
    /// # Panics
    ///
    /// Panics if the store is empty, which `DatasetStore::load` rules out.
    pub fn sample<'a>(&mut self, store: &'a DatasetStore) -> &'a Record {
        let index = self.sample_index(store.len());
        match store.get(index) {
            Ok(record) => record,
            Err(e) => panic!("sampler drew an invalid index: {}", e),
        }
    }
}
