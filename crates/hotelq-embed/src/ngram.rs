use std::hash::{Hash, Hasher};

use hotelq_core::{EmbedError, Embedder};
use twox_hash::XxHash64;

/// Hashed character n-gram embedder.
///
/// Each text is lower-cased, stripped of whitespace, and bracketed with
/// boundary markers; every unigram and bigram is hashed into one of `dim`
/// buckets. The bag is L2-normalized so inner product equals cosine
/// similarity. Short CJK place names that share most characters land close
/// together without any model download.
pub struct NgramEmbedder {
    dim: usize,
    id: String,
}

impl NgramEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1), id: format!("ngram:d{}", dim.max(1)) }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let chars: Vec<char> = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        let mut v = vec![0f32; self.dim];
        if chars.is_empty() {
            return v;
        }
        for c in &chars {
            v[self.bucket(&[*c])] += 1.0;
        }
        let mut padded = Vec::with_capacity(chars.len() + 2);
        padded.push('\u{2}');
        padded.extend_from_slice(&chars);
        padded.push('\u{3}');
        for pair in padded.windows(2) {
            v[self.bucket(pair)] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }

    fn bucket(&self, gram: &[char]) -> usize {
        let mut hasher = XxHash64::with_seed(0);
        gram.hash(&mut hasher);
        (hasher.finish() % self.dim as u64) as usize
    }
}

impl Embedder for NgramEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cos(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn whitespace_and_case_are_ignored() {
        let e = NgramEmbedder::new(64);
        assert_eq!(e.embed_one("Da An"), e.embed_one("daan"));
    }

    #[test]
    fn shared_characters_score_higher() {
        let e = NgramEmbedder::new(256);
        let xinyi = e.embed_one("信義區");
        assert!(cos(&xinyi, &e.embed_one("信義")) > cos(&xinyi, &e.embed_one("北投區")));
    }

    #[test]
    fn empty_text_is_the_zero_vector() {
        let e = NgramEmbedder::new(16);
        assert!(e.embed_one("   ").iter().all(|x| *x == 0.0));
    }
}
