//! Deterministic embedding provider for tests and offline development.
//!
//! Hashes the input text into a seed and expands it into a unit vector.
//! Identical texts always produce identical vectors; unrelated texts land in
//! effectively random directions.

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::EngramResult;
use crate::memory::l2_normalize;

pub struct StaticEmbedding {
    dimensions: usize,
}

impl StaticEmbedding {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Expand an FNV-1a seed through an xorshift generator.
    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut seed: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.bytes() {
            seed ^= byte as u64;
            seed = seed.wrapping_mul(0x0000_0100_0000_01b3);
        }
        if seed == 0 {
            seed = 1;
        }

        let mut state = seed;
        let mut vector = Vec::with_capacity(self.dimensions);
        for _ in 0..self.dimensions {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            // Map to [-1, 1]
            vector.push((state as i64 as f64 / i64::MAX as f64) as f32);
        }
        l2_normalize(&vector)
    }
}

#[async_trait]
impl EmbeddingProvider for StaticEmbedding {
    async fn embed(&self, text: &str) -> EngramResult<Vec<f32>> {
        Ok(self.vector_for(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
