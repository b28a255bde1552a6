use crate::error::{Error, Result};

/// Default dimension of [`NgramEmbedder`] vectors.
pub const DEFAULT_DIMENSION: usize = 256;

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.35;

/// Turns a string into a fixed-dimension vector.
///
/// Implementations are pure: the same text always yields the same vector.
pub trait Embedder: Send + Sync {
    /// Identifier persisted next to stored vectors, so a snapshot is never
    /// queried with vectors from a different model.
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Feature-hashing embedder over lowercase words and their character
/// trigrams.
///
/// Words sharing most trigrams land close together, which makes single
/// character typos (`mustafa` / `mostafa`) near neighbors. Vectors are
/// L2-normalized.
#[derive(Debug, Clone)]
pub struct NgramEmbedder {
    dimension: usize,
}

impl NgramEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::Config(
                "embedding dimension must be positive".to_string(),
            ));
        }
        Ok(Self { dimension })
    }
}

impl Default for NgramEmbedder {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
        }
    }
}

impl Embedder for NgramEmbedder {
    fn name(&self) -> &str {
        "ngram-v1"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vec = vec![0.0f32; self.dimension];
        for word in words(text) {
            accumulate_feature(&mut vec, &word, WORD_WEIGHT);
            for trigram in char_trigrams(&word) {
                accumulate_feature(
                    &mut vec,
                    &format!("tri:{trigram}"),
                    TRIGRAM_WEIGHT,
                );
            }
        }
        normalize_vector(&mut vec);
        Ok(vec)
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Trigrams of the word padded with `^` and `$`, so short words still
/// produce features and word boundaries are weighted.
fn char_trigrams(word: &str) -> Vec<String> {
    let chars: Vec<char> = std::iter::once('^')
        .chain(word.chars())
        .chain(std::iter::once('$'))
        .collect();
    chars.windows(3).map(|w| w.iter().collect()).collect()
}

fn accumulate_feature(vec: &mut [f32], feature: &str, weight: f32) {
    let hash = blake3::hash(feature.as_bytes());
    let bytes = hash.as_bytes();
    let idx = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        as usize
        % vec.len();
    vec[idx] += weight;
}

pub(crate) fn normalize_vector(vec: &mut [f32]) {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vec {
            *value /= norm;
        }
    }
}
