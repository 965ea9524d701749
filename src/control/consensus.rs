use serde::{Serialize, Deserialize};

use crate::core::NeighborSnapshot;
use crate::util::{dequantize, sign};

/// How neighbor virtual states are aggregated into the consensus term `gi`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusTerm {
    /// `-sign(z - z_j) * sqrt(|z - z_j|)` per neighbor, for finite-time convergence
    #[default]
    FiniteTime,
    /// `z_j - z` per neighbor, i.e. `-(count * z - sum z_j)`
    Laplacian,
}

impl ConsensusTerm {
    /// Picks the term from the update's `laplacian` flag
    pub fn from_laplacian_flag(laplacian: bool) -> Self {
        if laplacian {
            ConsensusTerm::Laplacian
        } else {
            ConsensusTerm::FiniteTime
        }
    }

    /// Evaluates `gi` for own virtual state `vstate` over enabled neighbors
    ///
    /// Disabled neighbors are skipped; with none enabled the term is 0.
    pub fn evaluate(&self, vstate: f64, neighbors: &NeighborSnapshot) -> f64 {
        let enabled = neighbors
            .iter()
            .filter(|n| n.enabled)
            .map(|n| dequantize(n.vstate));

        match self {
            ConsensusTerm::FiniteTime => enabled
                .map(|z_j| {
                    let diff = vstate - z_j;
                    -sign(diff) * diff.abs().sqrt()
                })
                .sum(),
            ConsensusTerm::Laplacian => {
                let (count, total) = enabled.fold((0usize, 0.0), |(c, s), z_j| (c + 1, s + z_j));
                -(count as f64 * vstate - total)
            }
        }
    }
}

/// Mean of `x_j - x` over enabled neighbors, 0 without any
pub fn mean_error(value: f64, neighbors: &NeighborSnapshot) -> f64 {
    let (count, total) = neighbors
        .iter()
        .filter(|n| n.enabled)
        .fold((0usize, 0.0), |(c, s), n| (c + 1, s + dequantize(n.vstate) - value));
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}
