use crate::error::ServiceError;
use async_trait::async_trait;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

/// Turns text into fixed-length vectors. An index is only meaningful when it
/// is queried with the same `model()` it was built with.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError>;

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl<T: Embedder + ?Sized> Embedder for Box<T> {
    fn model(&self) -> &str {
        (**self).model()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ServiceError> {
        (**self).embed_batch(texts).await
    }
}

/// Offline embedder hashing character trigrams into buckets.
#[derive(Debug, Clone)]
pub struct CharacterNgramEmbedder {
    dimensions: usize,
    model: String,
}

impl CharacterNgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model: format!("ngram-3/{dimensions}"),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Counts padded character trigrams into hashed buckets and L2-normalizes.
    /// Padding gives one- and two-character texts a non-zero vector.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];

        let padded: Vec<char> = std::iter::once(BOUNDARY)
            .chain(text.chars().flat_map(char::to_lowercase))
            .chain(std::iter::once(BOUNDARY))
            .collect();
        if padded.len() == 2 {
            return vector;
        }

        for trigram in padded.windows(3) {
            vector[bucket_of(trigram, self.dimensions)] += 1.0;
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        vector.iter_mut().for_each(|value| *value /= norm);
        vector
    }
}

const BOUNDARY: char = '\u{2}';

/// FNV-1a over the UTF-8 bytes of the trigram.
fn bucket_of(trigram: &[char], buckets: usize) -> usize {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    for c in trigram {
        let mut buffer = [0u8; 4];
        for byte in c.encode_utf8(&mut buffer).bytes() {
            hash = (hash ^ u64::from(byte)).wrapping_mul(PRIME);
        }
    }

    (hash % buckets as u64) as usize
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        Ok(self.embed_sync(text))
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();

    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}

#[cfg(test)]
mod tests {
    use super::{cosine_similarity, CharacterNgramEmbedder, Embedder};

    #[tokio::test]
    async fn embedder_is_deterministic() -> Result<(), Box<dyn std::error::Error>> {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Hydraulic pressure and flow").await?;
        let second = embedder.embed("Hydraulic pressure and flow").await?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder::new(32);
        assert_eq!(embedder.embed_sync("abc").len(), 32);
        assert_eq!(embedder.model(), "ngram-3/32");
    }

    #[tokio::test]
    async fn batch_matches_single_embeddings() -> Result<(), Box<dyn std::error::Error>> {
        let embedder = CharacterNgramEmbedder::default();
        let batch = embedder.embed_batch(&["alpha beta", "gamma delta"]).await?;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], embedder.embed_sync("gamma delta"));
        Ok(())
    }

    #[test]
    fn short_texts_still_embed() {
        let embedder = CharacterNgramEmbedder::default();
        let ab = embedder.embed_sync("ab");
        let x = embedder.embed_sync("x");

        assert!(ab.iter().any(|value| *value > 0.0));
        assert!(x.iter().any(|value| *value > 0.0));
        assert!((cosine_similarity(&ab, &ab) - 1.0).abs() < 1e-5);
        assert!(embedder.embed_sync("").iter().all(|value| *value == 0.0));
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let embedder = CharacterNgramEmbedder::default();
        let vector = embedder.embed_sync("glacier retreat");
        assert!((cosine_similarity(&vector, &vector) - 1.0).abs() < 1e-5);
        assert_eq!(cosine_similarity(&vector, &vec![0.0; vector.len()]), 0.0);
    }
}
