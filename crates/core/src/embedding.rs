#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEmbedderConfig {
    pub dimensions: usize,
    pub seed: u64,
}

impl Default for HashEmbedderConfig {
    fn default() -> Self {
        Self {
            dimensions: 384,
            seed: 1337,
        }
    }
}

/// Bag-of-words embedder: each lowercase alphanumeric token lands in a hashed
/// bucket and the vector is L2-normalized. Deterministic and offline.
///
/// Buckets come from blake3 over the seed and the token, so vectors stay the
/// same across toolchains and a persisted index remains valid.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    config: HashEmbedderConfig,
}

impl HashEmbedder {
    pub fn new(config: HashEmbedderConfig) -> Self {
        Self { config }
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions.max(1)
    }

    pub fn seed(&self) -> u64 {
        self.config.seed
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions()];
        for token in tokens(text) {
            let bucket = self.bucket_for(&token);
            vector[bucket] += 1.0;
        }
        normalize(&mut vector);
        vector
    }

    fn bucket_for(&self, token: &str) -> usize {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.config.seed.to_le_bytes());
        hasher.update(token.as_bytes());
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        (u64::from_le_bytes(head) % self.dimensions() as u64) as usize
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
}

pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}
