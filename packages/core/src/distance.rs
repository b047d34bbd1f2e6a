//! Vector distance metrics.
//!
//! Every metric is expressed as a distance: lower means closer, and search
//! results rank by ascending distance.

use serde::{Deserialize, Serialize};

use crate::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// L2 distance.
    #[default]
    Euclidean,
    /// `1 - cos(a, b)`; 1.0 when either vector has zero norm.
    Cosine,
    /// Negated dot product.
    InnerProduct,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Euclidean => "euclidean",
            Metric::Cosine => "cosine",
            Metric::InnerProduct => "inner_product",
        }
    }

    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Some(Metric::Euclidean),
            "cosine" => Some(Metric::Cosine),
            "inner_product" | "dot" | "dot_product" => Some(Metric::InnerProduct),
            _ => None,
        }
    }

    /// Distance between two vectors of equal length.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Result<f32, Error> {
        if a.len() != b.len() {
            return Err(Error::DimensionMismatch {
                expected: a.len(),
                actual: b.len(),
            });
        }
        Ok(match self {
            Metric::Euclidean => euclidean(a, b),
            Metric::Cosine => {
                let (na, nb) = (l2_norm(a), l2_norm(b));
                if na == 0.0 || nb == 0.0 {
                    1.0
                } else {
                    1.0 - dot(a, b) / (na * nb)
                }
            }
            Metric::InnerProduct => -dot(a, b),
        })
    }
}

/// Reject empty vectors and non-finite components.
pub fn validate_vector(vector: &[f32]) -> Result<(), Error> {
    if vector.is_empty() {
        return Err(Error::InvalidVector {
            message: "vector is empty".to_string(),
        });
    }
    if let Some(i) = vector.iter().position(|x| !x.is_finite()) {
        return Err(Error::InvalidVector {
            message: format!("component {} is not finite", i),
        });
    }
    Ok(())
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}
