use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::schema::{FEATURE_COLUMNS, VISUAL_COLUMNS};
use crate::table::Table;

/// Fixed default seed so repeated runs over the same table reproduce the
/// same labels and centroids exactly.
pub const DEFAULT_SEED: u64 = 42;

const MAX_ITERATIONS: usize = 300;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("unknown feature column {0:?}")]
    UnknownFeature(String),
    #[error("clustering needs at least 2 feature columns, got {0}")]
    TooFewFeatures(usize),
    #[error("cluster count must be at least 1")]
    ZeroClusters,
    #[error("table has no rows to cluster")]
    EmptyTable,
    #[error("k = {k} exceeds the {distinct} distinct feature rows")]
    TooFewDistinctRows { k: usize, distinct: usize },
}

pub type Result<T> = std::result::Result<T, ClusterError>;

/// K-means output: a label per input row plus one centroid per cluster,
/// both in the feature space given by `features` (scaled where applicable).
#[derive(Debug)]
pub struct ClusterResult {
    /// Column order of the centroid rows.
    pub features: Vec<String>,
    /// One label per input row, in input row order, each in `[0, k)`.
    pub labels: Vec<usize>,
    /// One row per cluster.
    pub centroids: Vec<Vec<f64>>,
}

/// Run k-means over a user-chosen feature subset.
///
/// Features outside the visual (already [0,1]-bounded) set are min-max
/// scaled first. All parameter problems are reported here, before any
/// computation starts.
pub fn cluster_tracks(
    table: &Table,
    features: &[String],
    k: usize,
    seed: u64,
) -> Result<ClusterResult> {
    for name in features {
        if !FEATURE_COLUMNS.contains(&name.as_str()) {
            return Err(ClusterError::UnknownFeature(name.clone()));
        }
    }
    if features.len() < 2 {
        return Err(ClusterError::TooFewFeatures(features.len()));
    }
    if k == 0 {
        return Err(ClusterError::ZeroClusters);
    }
    if table.is_empty() {
        return Err(ClusterError::EmptyTable);
    }

    let mut matrix = feature_matrix(table, features)?;
    scale_features(&mut matrix, features);

    let distinct = distinct_rows(&matrix);
    if k > distinct {
        return Err(ClusterError::TooFewDistinctRows { k, distinct });
    }

    let (labels, centroids) = kmeans(&matrix, k, seed);

    Ok(ClusterResult {
        features: features.to_vec(),
        labels,
        centroids,
    })
}

/// Extract the numeric matrix, one row per track in table order.
fn feature_matrix(table: &Table, features: &[String]) -> Result<Vec<Vec<f64>>> {
    table
        .iter()
        .map(|row| {
            features
                .iter()
                .map(|col| {
                    row.feature(col)
                        .ok_or_else(|| ClusterError::UnknownFeature(col.clone()))
                })
                .collect()
        })
        .collect()
}

/// Min-max scale each non-visual column to [0,1] in place. Visual columns
/// are already bounded and pass through unscaled. A constant column scales
/// to all zeros.
fn scale_features(matrix: &mut [Vec<f64>], features: &[String]) {
    for (d, name) in features.iter().enumerate() {
        if VISUAL_COLUMNS.contains(&name.as_str()) {
            continue;
        }
        let min = matrix.iter().map(|r| r[d]).fold(f64::INFINITY, f64::min);
        let max = matrix.iter().map(|r| r[d]).fold(f64::NEG_INFINITY, f64::max);
        let span = max - min;
        for row in matrix.iter_mut() {
            row[d] = if span > 0.0 { (row[d] - min) / span } else { 0.0 };
        }
    }
}

/// Count distinct rows by exact bit pattern.
fn distinct_rows(matrix: &[Vec<f64>]) -> usize {
    let mut keys: Vec<Vec<u64>> = matrix
        .iter()
        .map(|row| row.iter().map(|v| v.to_bits()).collect())
        .collect();
    keys.sort();
    keys.dedup();
    keys.len()
}

/// Lloyd's algorithm with k-means++ seeding from a deterministic RNG.
fn kmeans(data: &[Vec<f64>], k: usize, seed: u64) -> (Vec<usize>, Vec<Vec<f64>>) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut centroids = plus_plus_init(data, k, &mut rng);
    let mut labels = vec![0usize; data.len()];

    for _ in 0..MAX_ITERATIONS {
        let new_labels: Vec<usize> = data
            .iter()
            .map(|point| nearest_centroid(point, &centroids))
            .collect();

        let new_labels = repair_empty_clusters(data, &centroids, new_labels, k);

        let converged = new_labels == labels;
        labels = new_labels;

        // Recompute centroids as per-cluster means
        let dim = centroids[0].len();
        let mut sums = vec![vec![0.0f64; dim]; k];
        let mut counts = vec![0usize; k];
        for (point, &label) in data.iter().zip(&labels) {
            counts[label] += 1;
            for (d, &v) in point.iter().enumerate() {
                sums[label][d] += v;
            }
        }
        for (c, (sum, &count)) in sums.iter().zip(&counts).enumerate() {
            if count > 0 {
                centroids[c] = sum.iter().map(|s| s / count as f64).collect();
            }
        }

        if converged {
            break;
        }
    }

    (labels, centroids)
}

/// K-means++: spread the initial centers, weighting candidate points by
/// squared distance to the nearest already-chosen center.
fn plus_plus_init(data: &[Vec<f64>], k: usize, rng: &mut SmallRng) -> Vec<Vec<f64>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data[rng.gen_range(0..data.len())].clone());

    while centroids.len() < k {
        let weights: Vec<f64> = data
            .iter()
            .map(|point| {
                centroids
                    .iter()
                    .map(|c| sq_dist(point, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = weights.iter().sum();

        // k <= distinct rows, so some point is strictly away from every
        // chosen center and total stays positive
        let mut target = rng.gen_range(0.0..total);
        let mut chosen = data.len() - 1;
        for (i, &w) in weights.iter().enumerate() {
            if w <= 0.0 {
                continue;
            }
            target -= w;
            if target <= 0.0 {
                chosen = i;
                break;
            }
        }
        centroids.push(data[chosen].clone());
    }

    centroids
}

/// Give every empty cluster the point farthest from its current centroid,
/// so exactly k labels appear in the output.
fn repair_empty_clusters(
    data: &[Vec<f64>],
    centroids: &[Vec<f64>],
    mut labels: Vec<usize>,
    k: usize,
) -> Vec<usize> {
    loop {
        let mut counts = vec![0usize; k];
        for &label in &labels {
            counts[label] += 1;
        }
        let empty = match counts.iter().position(|&c| c == 0) {
            Some(c) => c,
            None => return labels,
        };

        // Steal the worst-fitting point from a cluster that can spare one
        let mut worst: Option<(usize, f64)> = None;
        for (i, point) in data.iter().enumerate() {
            if counts[labels[i]] <= 1 {
                continue;
            }
            let dist = sq_dist(point, &centroids[labels[i]]);
            if worst.map_or(true, |(_, d)| dist > d) {
                worst = Some((i, dist));
            }
        }
        match worst {
            Some((i, _)) => labels[i] = empty,
            None => return labels,
        }
    }
}

fn nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (c, centroid) in centroids.iter().enumerate() {
        let dist = sq_dist(point, centroid);
        if dist < best_dist {
            best = c;
            best_dist = dist;
        }
    }
    best
}

fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
