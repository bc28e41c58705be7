//! Hashed bag-of-n-grams text vectors.
//!
//! Each character trigram and each whitespace-separated word is hashed into
//! one of [`EMBED_DIMENSION`] buckets; the accumulated vector is
//! L2-normalized. Bucket hashes come from BLAKE3 so vectors are identical
//! across processes and restarts.

use errata_core::defaults::{EMBED_DIMENSION, TRIGRAM_WEIGHT, WORD_WEIGHT};

/// Stable 64-bit hash of a token: the first 8 bytes of its BLAKE3 digest, little-endian.
pub fn token_hash(token: &str) -> u64 {
    let digest = blake3::hash(token.as_bytes());
    let mut first = [0u8; 8];
    first.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(first)
}

fn bucket(token: &str, dim: usize) -> usize {
    (token_hash(token) % dim as u64) as usize
}

/// Embed `text` into a normalized vector of `dim` buckets.
///
/// Empty (or whitespace-only) text yields the zero vector.
pub fn text_to_vector_with_dim(text: &str, dim: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dim];
    let text = text.trim().to_lowercase();
    if text.is_empty() || dim == 0 {
        return vec;
    }

    let chars: Vec<char> = text.chars().collect();
    let mut trigram = String::with_capacity(12);
    for window in chars.windows(3) {
        trigram.clear();
        trigram.extend(window);
        vec[bucket(&trigram, dim)] += TRIGRAM_WEIGHT;
    }

    for word in text.split_whitespace() {
        vec[bucket(word, dim)] += WORD_WEIGHT;
    }

    normalize(&mut vec);
    vec
}

/// Embed `text` at the default dimension.
pub fn text_to_vector(text: &str) -> Vec<f32> {
    text_to_vector_with_dim(text, EMBED_DIMENSION)
}

/// Scale `vec` to unit length in place. The zero vector is left unchanged.
pub fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

/// Cosine similarity. Mismatched lengths or a zero vector score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let nb = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let v = text_to_vector("   \n ");
        assert_eq!(v.len(), EMBED_DIMENSION);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_vectors_are_unit_length() {
        let v = text_to_vector("Newton's second law relates force and acceleration");
        assert!((norm(&v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_case_and_padding_do_not_matter() {
        assert_eq!(text_to_vector("  Photosynthesis "), text_to_vector("photosynthesis"));
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(token_hash("abc"), token_hash("abc"));
        assert_ne!(token_hash("abc"), token_hash("abd"));
    }

    #[test]
    fn test_two_char_word_only_counts_word_bucket() {
        let v = text_to_vector_with_dim("ab", 16);
        let nonzero: Vec<_> = v.iter().filter(|x| **x > 0.0).collect();
        assert_eq!(nonzero.len(), 1);
        assert!((nonzero[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similar_text_scores_higher() {
        let q = text_to_vector("quadratic equation roots");
        let close = text_to_vector("finding the roots of a quadratic equation");
        let far = text_to_vector("mitochondria produce cellular energy");
        assert!(cosine_similarity(&q, &close) > cosine_similarity(&q, &far));
    }

    #[test]
    fn test_cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
