//! Sentence encoding
//!
//! The ranker needs fixed-dimension text embeddings for schema nodes and
//! questions. `SentenceEncoder` is the seam: a transformer-backed encoder
//! plugs in behind the same trait, and the shipped `HashingEncoder` gives
//! deterministic unit vectors so the pipeline (and its tests) run without
//! model downloads.

use sha2::{Digest, Sha256};

/// Deterministic text-to-vector encoder. Must be thread-safe and produce
/// the same vector for the same text every time.
pub trait SentenceEncoder: Send + Sync {
    /// Output dimension
    fn dim(&self) -> usize;

    /// Encode one text into a vector of `dim()` floats
    fn encode(&self, text: &str) -> Vec<f32>;

    /// Encode a batch; the default maps `encode` over the slice
    fn encode_batch(&self, texts: &[&str]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.encode(t)).collect()
    }
}

/// Hash-seeded pseudo-random unit vectors.
///
/// Equal texts map to equal vectors, different texts to (almost surely)
/// different ones. No semantic signal, but exactly the determinism and
/// shape contract the ranker needs as a stand-in encoder.
pub struct HashingEncoder {
    dim: usize,
}

impl HashingEncoder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl SentenceEncoder for HashingEncoder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        let mut seed = u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"));

        let mut v: Vec<f32> = (0..self.dim)
            .map(|_| {
                seed = splitmix64(seed);
                // Map to [-1, 1)
                (seed >> 11) as f32 / (1u64 << 53) as f32 * 2.0 - 1.0
            })
            .collect();

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

fn splitmix64(state: u64) -> u64 {
    let mut z = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Cosine similarity between two equal-length vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}
