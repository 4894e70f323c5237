//! Exact cosine similarity ranking over the whole catalog.
//!
//! Every query is scored against every row, O(N * D). Catalogs in scope are small enough that
//! no approximate index is kept.

use ndarray::ArrayView1;
use serde::Serialize;

use crate::catalog::CatalogIndex;

/// One catalog match. `similarity` is the cosine similarity in [-1, 1], higher is more similar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub identifier: String,
    pub similarity: f32,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum RankError {
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Index is empty, cannot rank")]
    EmptyIndex,
    #[error("top_k must be at least 1")]
    InvalidTopK,
}

/// Cosine similarity of two equally long vectors. A zero vector on either side has similarity 0.
pub fn cosine_similarity(a: ArrayView1<f32>, b: ArrayView1<f32>) -> Result<f32, RankError> {
    if a.len() != b.len() {
        return Err(RankError::DimensionMismatch { expected: a.len(), actual: b.len() });
    }

    Ok(normalized(a.dot(&b), a.dot(&a).sqrt(), b.dot(&b).sqrt()))
}

/// Ranks every catalog entry by cosine similarity to `query` and returns the best `top_k`,
/// sorted by descending similarity. Equal similarities keep catalog row order. A `top_k` larger
/// than the catalog returns the whole catalog.
pub fn rank(query: &[f32], index: &CatalogIndex, top_k: usize) -> Result<Vec<RankedResult>, RankError> {
    if top_k == 0 {
        return Err(RankError::InvalidTopK);
    }
    if index.is_empty() {
        return Err(RankError::EmptyIndex);
    }
    if query.len() != index.dimension() {
        return Err(RankError::DimensionMismatch { expected: index.dimension(), actual: query.len() });
    }

    let query = ArrayView1::from(query);
    let query_norm = query.dot(&query).sqrt();
    let dots = index.features().dot(&query);

    let mut scored: Vec<(usize, f32)> = dots.iter()
        .zip(index.row_norms().iter())
        .map(|(dot, row_norm)| normalized(*dot, query_norm, *row_norm))
        .enumerate()
        .collect();
    scored.sort_by(|(a_row, a_sim), (b_row, b_sim)| b_sim.total_cmp(a_sim).then(a_row.cmp(b_row)));

    let image_paths = index.image_paths();
    Ok(scored.into_iter()
        .take(top_k.min(index.len()))
        .map(|(row, similarity)| RankedResult { identifier: image_paths[row].clone(), similarity })
        .collect())
}

// Private functions

fn normalized(dot: f32, norm_a: f32, norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let similarity = dot / (norm_a * norm_b);
    if similarity.is_finite() {
        // Rounding can push parallel vectors slightly outside [-1, 1]
        similarity.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{arr1, array, Array2};

    use super::*;

    fn toy_index() -> CatalogIndex {
        CatalogIndex::new(
            array![[1.0, 0.0], [0.0, 1.0], [0.9, 0.1]],
            vec!["A".to_owned(), "B".to_owned(), "C".to_owned()],
        ).unwrap()
    }

    #[test]
    fn test_cosine_similarity() {
        let v1 = arr1(&[1.0, 2.0, 3.0]);
        let v3 = arr1(&[-1.0, -2.0, -3.0]);
        let v4 = arr1(&[2.0, 4.0, 6.0]);
        let v5 = arr1(&[1.0, 0.0, 0.0]);
        let v6 = arr1(&[0.0, 1.0, 0.0]);
        let zero = arr1(&[0.0, 0.0, 0.0]);

        assert!((cosine_similarity(v1.view(), v1.view()).unwrap() - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(v1.view(), v3.view()).unwrap() + 1.0).abs() < 1e-6);
        assert!((cosine_similarity(v1.view(), v4.view()).unwrap() - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(v5.view(), v6.view()).unwrap().abs() < 1e-6);
        assert_eq!(cosine_similarity(v1.view(), zero.view()).unwrap(), 0.0);
        assert_eq!(cosine_similarity(v1.view(), v6.view()).unwrap(), cosine_similarity(v6.view(), v1.view()).unwrap());
    }

    #[test]
    fn test_cosine_dimension_mismatch() {
        let v1 = arr1(&[1.0, 2.0]);
        let v2 = arr1(&[1.0, 2.0, 3.0]);
        assert_eq!(cosine_similarity(v1.view(), v2.view()), Err(RankError::DimensionMismatch { expected: 2, actual: 3 }));
    }

    #[test]
    fn test_rank_toy_catalog() {
        let results = rank(&[1.0, 0.0], &toy_index(), 2).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].identifier, "A");
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
        assert_eq!(results[1].identifier, "C");
        assert!((results[1].similarity - 0.9939).abs() < 1e-3);
    }

    #[test]
    fn test_top_k_is_clamped() {
        let results = rank(&[1.0, 0.0], &toy_index(), 50).unwrap();
        let identifiers: Vec<&str> = results.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(identifiers, vec!["A", "C", "B"]);
        assert!(results.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn test_ties_keep_row_order() {
        let index = CatalogIndex::new(
            array![[0.0, 1.0], [2.0, 0.0], [0.0, 3.0], [5.0, 0.0]],
            vec!["w".to_owned(), "x".to_owned(), "y".to_owned(), "z".to_owned()],
        ).unwrap();

        let results = rank(&[1.0, 0.0], &index, 4).unwrap();
        let identifiers: Vec<&str> = results.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(identifiers, vec!["x", "z", "w", "y"]);
    }

    #[test]
    fn test_zero_rows_score_zero() {
        let index = CatalogIndex::new(
            array![[0.0, 0.0], [-1.0, 0.0]],
            vec!["blank".to_owned(), "opposite".to_owned()],
        ).unwrap();

        let results = rank(&[1.0, 0.0], &index, 2).unwrap();
        assert_eq!(results[0], RankedResult { identifier: "blank".to_owned(), similarity: 0.0 });
        assert_eq!(results[1].identifier, "opposite");
        assert!((results[1].similarity + 1.0).abs() < 1e-6);

        let from_zero_query = rank(&[0.0, 0.0], &index, 2).unwrap();
        assert!(from_zero_query.iter().all(|r| r.similarity == 0.0));
    }

    #[test]
    fn test_rank_preconditions() {
        let index = toy_index();
        assert_eq!(rank(&[1.0, 0.0], &index, 0), Err(RankError::InvalidTopK));
        assert_eq!(rank(&[1.0, 0.0, 0.0], &index, 1), Err(RankError::DimensionMismatch { expected: 2, actual: 3 }));
    }

    #[test]
    fn test_large_catalog_self_match() {
        let rows = 200;
        let dimension = 16;
        let features = Array2::from_shape_fn((rows, dimension), |(r, c)| ((r * 31 + c * 7) % 13) as f32 - 6.0);
        let paths = (0..rows).map(|r| format!("img_{r:03}.png")).collect();
        let index = CatalogIndex::new(features, paths).unwrap();

        let query = index.features().row(123).to_vec();
        let results = rank(&query, &index, 3).unwrap();
        assert!((results[0].similarity - 1.0).abs() < 1e-5);
        assert!(results.len() == 3);
    }
}
