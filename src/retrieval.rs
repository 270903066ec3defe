//! Ranking code snippets against requirement descriptions.

use crate::error::ReqVerError;
use crate::utils::l2_normalize;
use burn::prelude::*;

/// A ranked snippet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Row of the snippet in the index.
    pub index: usize,
    /// Cosine similarity to the query.
    pub score: f32,
}

/// Normalized code embeddings searched by cosine similarity.
#[derive(Debug, Clone)]
pub struct RetrievalIndex<B: Backend> {
    /// # Shape
    /// [n_snippets, output_units]
    embeddings: Tensor<B, 2>,
}

impl<B: Backend> RetrievalIndex<B> {
    /// # Shapes
    ///   - Input [n_snippets, output_units], as returned by `encode_code`
    pub fn new(code_embeddings: Tensor<B, 2>) -> Self {
        Self {
            embeddings: l2_normalize(code_embeddings),
        }
    }

    /// Appends more snippets, e.g. from another batch.
    pub fn extend(&mut self, code_embeddings: Tensor<B, 2>) {
        let embeddings = l2_normalize(code_embeddings);
        self.embeddings = Tensor::cat(vec![self.embeddings.clone(), embeddings], 0);
    }

    pub fn len(&self) -> usize {
        self.embeddings.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the `k` best snippets for every query, best first.
    ///
    /// Equal scores are ordered by index; `k` is clamped to the index size.
    /// Queries must have as many units as the indexed snippets.
    ///
    /// # Shapes
    ///   - Input [n_queries, output_units], as returned by `encode_desc`
    pub fn search(
        &self,
        query_embeddings: Tensor<B, 2>,
        k: usize,
    ) -> Result<Vec<Vec<Hit>>, ReqVerError> {
        let [n_queries, units] = query_embeddings.dims();
        let [n_snippets, units_] = self.embeddings.dims();
        if units != units_ {
            return Err(ReqVerError::WidthMismatch {
                query: units,
                index: units_,
            });
        }
        if n_snippets == 0 {
            return Ok(vec![Vec::new(); n_queries]);
        }

        let scores = l2_normalize(query_embeddings).matmul(self.embeddings.clone().transpose());
        let scores = scores.into_data().convert::<f32>().to_vec::<f32>()?;
        let k = k.min(n_snippets);

        Ok(scores
            .chunks(n_snippets)
            .map(|row| {
                let mut hits: Vec<Hit> = row
                    .iter()
                    .enumerate()
                    .map(|(index, &score)| Hit { index, score })
                    .collect();
                hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));
                hits.truncate(k);
                hits
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn index(device: &<TestBackend as Backend>::Device) -> RetrievalIndex<TestBackend> {
        RetrievalIndex::new(Tensor::from_floats(
            [[1.0, 0.0], [0.0, 2.0], [3.0, 3.0]],
            device,
        ))
    }

    #[test]
    fn ranks_by_cosine() {
        let device = Default::default();
        let index = index(&device);
        assert_eq!(index.len(), 3);
        let query = Tensor::<TestBackend, 2>::from_floats([[0.0, 5.0], [1.0, 0.1]], &device);
        let hits = index.search(query, 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].iter().map(|h| h.index).collect::<Vec<_>>(), vec![1, 2]);
        assert!((hits[0][0].score - 1.0).abs() < 1e-4);
        assert_eq!(hits[1].iter().map(|h| h.index).collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn k_is_clamped_and_ties_keep_index_order() {
        let device = Default::default();
        let mut index = index(&device);
        index.extend(Tensor::from_floats([[0.0, 7.0]], &device));
        assert_eq!(index.len(), 4);
        let query = Tensor::<TestBackend, 2>::from_floats([[0.0, 1.0]], &device);
        let hits = index.search(query, 10).unwrap();
        assert_eq!(hits[0].len(), 4);
        assert_eq!(hits[0][0].index, 1);
        assert_eq!(hits[0][1].index, 3);
    }

    #[test]
    fn query_width_must_match_the_index() {
        let device = Default::default();
        let index = index(&device);
        let query = Tensor::<TestBackend, 2>::from_floats([[0.0, 1.0, 0.0]], &device);
        assert!(matches!(
            index.search(query, 1),
            Err(ReqVerError::WidthMismatch { query: 3, index: 2 })
        ));
    }
}
