use std::fmt;
use std::str::FromStr;

use crate::error::IndexError;
use crate::RetrievalResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    /// `1 - cosine similarity`, in `[0, 2]`.
    #[default]
    Cosine,
    /// Euclidean distance.
    L2,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::L2 => "l2",
        }
    }

    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => 1.0 - cosine_similarity(a, b),
            Metric::L2 => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

impl FromStr for Metric {
    type Err = IndexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "cosine" => Ok(Metric::Cosine),
            "l2" | "euclidean" => Ok(Metric::L2),
            other => Err(IndexError::UnknownMetric(other.to_string())),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut a_norm = 0.0f32;
    let mut b_norm = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        a_norm += x * x;
        b_norm += y * y;
    }
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    dot / (a_norm.sqrt() * b_norm.sqrt())
}

/// Closest first. The sort is stable so equal distances keep insertion order.
pub(crate) fn rank(mut hits: Vec<RetrievalResult>, k: usize) -> Vec<RetrievalResult> {
    hits.sort_by(|a, b| {
        let da = a.distance.unwrap_or(f32::INFINITY);
        let db = b.distance.unwrap_or(f32::INFINITY);
        da.total_cmp(&db)
    });
    hits.truncate(k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_distance_of_identical_vectors_is_zero() {
        let v = [0.6, 0.8];
        assert!(Metric::Cosine.distance(&v, &v).abs() < 1e-6);
        assert!((Metric::Cosine.distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_distance() {
        assert!((Metric::L2.distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn parses_names() {
        assert_eq!("COSINE".parse::<Metric>().unwrap(), Metric::Cosine);
        assert_eq!("euclidean".parse::<Metric>().unwrap(), Metric::L2);
        assert!("dot".parse::<Metric>().is_err());
    }
}
