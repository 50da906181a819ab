//! Nearest-neighbor index over L2-normalized embeddings.

use crate::error::{AppError, Result};
use crate::search::ranking::descending;
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// A similarity index that ranks rows by inner product with a query.
pub trait VectorIndex: Send + Sync {
    /// Append rows. Row `i` of the first batch gets id `i`, and so on.
    fn add(&mut self, vectors: &Array2<f32>) -> Result<()>;

    /// Return up to `k` `(scores, row ids)` pairs, scores descending.
    fn search(&self, query: &Array1<f32>, k: usize) -> Result<(Vec<f32>, Vec<usize>)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimension(&self) -> usize;
}

/// Exact inner-product index: every query scans all rows.
///
/// For a catalog of a few thousand listings a scan is a single small
/// matrix-vector product, so no approximate structure is needed.
pub struct FlatIpIndex {
    dimension: usize,
    vectors: Array2<f32>,
}

impl FlatIpIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Array2::zeros((0, dimension)),
        }
    }
}

impl VectorIndex for FlatIpIndex {
    fn add(&mut self, vectors: &Array2<f32>) -> Result<()> {
        if vectors.ncols() != self.dimension {
            return Err(AppError::IndexBuildError(format!(
                "Vector dimension mismatch: expected {}, got {}",
                self.dimension,
                vectors.ncols()
            )));
        }

        self.vectors
            .append(Axis(0), vectors.view())
            .map_err(|e| AppError::IndexBuildError(e.to_string()))
    }

    fn search(&self, query: &Array1<f32>, k: usize) -> Result<(Vec<f32>, Vec<usize>)> {
        if query.len() != self.dimension {
            return Err(AppError::QueryError(format!(
                "Query dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            )));
        }

        let similarities = self.vectors.dot(query);

        let mut ranked: Vec<(usize, f32)> = similarities.iter().copied().enumerate().collect();
        // Stable: equal scores keep ascending row order.
        ranked.sort_by(|a, b| descending(f64::from(a.1), f64::from(b.1)));
        ranked.truncate(k);

        Ok(ranked.into_iter().map(|(idx, score)| (score, idx)).unzip())
    }

    fn len(&self) -> usize {
        self.vectors.nrows()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Scale every row to unit length in place. All-zero rows are left as is.
pub fn normalize_rows(matrix: &mut Array2<f32>) {
    for mut row in matrix.rows_mut() {
        let norm = l2_norm(row.view());
        if norm > 0.0 {
            row.mapv_inplace(|v| v / norm);
        }
    }
}

/// Scale a single vector to unit length.
pub fn normalize_vector(vector: &mut Array1<f32>) {
    let norm = l2_norm(vector.view());
    if norm > 0.0 {
        vector.mapv_inplace(|v| v / norm);
    }
}

fn l2_norm(v: ArrayView1<'_, f32>) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_search_orders_by_inner_product() {
        let mut index = FlatIpIndex::new(2);
        index
            .add(&array![[1.0, 0.0], [0.0, 1.0], [0.6, 0.8]])
            .unwrap();

        let (scores, ids) = index.search(&array![0.0, 1.0], 3).unwrap();

        assert_eq!(ids, vec![1, 2, 0]);
        assert!((scores[0] - 1.0).abs() < 1e-6);
        assert!((scores[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_k_larger_than_index() {
        let mut index = FlatIpIndex::new(2);
        index.add(&array![[1.0, 0.0]]).unwrap();

        let (scores, ids) = index.search(&array![1.0, 0.0], 10).unwrap();
        assert_eq!(ids, vec![0]);
        assert_eq!(scores.len(), 1);
    }

    #[test]
    fn test_ties_keep_row_order() {
        let mut index = FlatIpIndex::new(2);
        index
            .add(&array![[0.0, 1.0], [1.0, 0.0], [1.0, 0.0]])
            .unwrap();

        let (_, ids) = index.search(&array![1.0, 0.0], 2).unwrap();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_nan_rows_rank_last() {
        let mut index = FlatIpIndex::new(2);
        index
            .add(&array![[f32::NAN, 0.0], [1.0, 0.0], [0.0, 1.0]])
            .unwrap();

        let (_, ids) = index.search(&array![1.0, 0.0], 3).unwrap();
        assert_eq!(ids, vec![1, 2, 0]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = FlatIpIndex::new(3);
        assert!(matches!(
            index.add(&array![[1.0, 0.0]]),
            Err(AppError::IndexBuildError(_))
        ));
        assert!(matches!(
            index.search(&array![1.0, 0.0], 1),
            Err(AppError::QueryError(_))
        ));
    }

    #[test]
    fn test_normalize_rows() {
        let mut m = array![[3.0, 4.0], [0.0, 0.0]];
        normalize_rows(&mut m);
        assert!((m[[0, 0]] - 0.6).abs() < 1e-6);
        assert!((m[[0, 1]] - 0.8).abs() < 1e-6);
        assert_eq!(m[[1, 0]], 0.0);
    }
}
