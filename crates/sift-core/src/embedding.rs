//! Embedding trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! the deterministic offline [`HashingEmbedder`], and pure helpers for
//! vector serialization and similarity.
//!
//! Network-backed providers (OpenAI, Ollama) and the local fastembed
//! model live in the `sift` app crate.

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::ImageTensor;

/// An opaque embedding function: text or image to a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded alongside stored vectors.
    fn model_name(&self) -> &str;

    /// Vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts. The output has one vector per input, in order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a decoded image. Text-only providers keep the default.
    async fn embed_image(&self, _image: &ImageTensor) -> Result<Vec<f32>> {
        bail!("embedding model '{}' does not accept images", self.model_name())
    }
}

/// Feature-hashing embedder with no model files and no network.
///
/// Text: each lowercase alphanumeric token is hashed (FNV-1a) into one of
/// `dims` buckets with a hash-derived sign. Images: a normalized histogram
/// of mean pixel intensity over `dims` buckets. Both outputs are
/// L2-normalized, so texts sharing words score higher than texts that
/// share none.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
    name: String,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        let dims = dims.max(1);
        Self {
            dims,
            name: format!("hashing-{dims}"),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let h = fnv1a(token.to_lowercase().as_bytes());
            let bucket = (h % self.dims as u64) as usize;
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        normalize(&mut v);
        v
    }

    fn embed_pixels(&self, image: &ImageTensor) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        let channels = image.channels.max(1) as usize;
        for px in image.pixels.chunks(channels) {
            let mean = px.iter().map(|&b| b as usize).sum::<usize>() / px.len();
            let bucket = mean * self.dims / 256;
            v[bucket.min(self.dims - 1)] += 1.0;
        }
        normalize(&mut v);
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    async fn embed_image(&self, image: &ImageTensor) -> Result<Vec<f32>> {
        Ok(self.embed_pixels(image))
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or
/// zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip() {
        let v = vec![1.0f32, -2.5, 3.125];
        assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
    }

    #[test]
    fn cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn hashing_embedder_is_deterministic_and_normalized() {
        let e = HashingEmbedder::new(64);
        let a = e.embed_texts(&["Hello, world".into()]).await.unwrap();
        let b = e.embed_texts(&["hello WORLD".into()]).await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_words_score_higher() {
        let e = HashingEmbedder::new(256);
        let v = e
            .embed_texts(&[
                "pineapple pizza from hawaii".into(),
                "oranges grow in florida".into(),
                "hawaii".into(),
            ])
            .await
            .unwrap();
        let to_pineapple = cosine_similarity(&v[2], &v[0]);
        let to_oranges = cosine_similarity(&v[2], &v[1]);
        assert!(to_pineapple > to_oranges);
    }

    #[tokio::test]
    async fn hashing_embedder_accepts_images() {
        let e = HashingEmbedder::new(16);
        let img = ImageTensor {
            height: 1,
            width: 2,
            channels: 3,
            pixels: vec![0, 0, 0, 255, 255, 255],
        };
        let v = e.embed_image(&img).await.unwrap();
        assert_eq!(v.len(), 16);
        assert!(v[0] > 0.0 && v[15] > 0.0);
    }
}
