use anyhow::{Context, Result};

use crate::chunk::Chunk;
use crate::config::Number;
use crate::embed::Embedder;
use crate::store::Corpus;

/// One retrieval hit: the chunk, its ordinal in the corpus, and its squared
/// L2 distance from the query.
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub ordinal: usize,
    pub distance: Number,
    pub chunk: Chunk,
}

/// Orchestrates query-time lookup: embed the query, search the index, map
/// result ordinals back to chunks. Generic over the embedder so tests can
/// run without the hosted service.
pub struct Retriever<'a, E: Embedder> {
    corpus: &'a Corpus,
    embedder: &'a E,
}

impl<'a, E: Embedder> Retriever<'a, E> {
    pub fn new(corpus: &'a Corpus, embedder: &'a E) -> Self {
        Self { corpus, embedder }
    }

    /// Nearest-first chunks for `query`, at most `min(k, corpus size)`.
    /// An empty corpus yields an empty result, not an error.
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Retrieved>> {
        if self.corpus.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.embedder.embed(&[query.to_string()])?;
        let query_vector = vectors
            .into_iter()
            .next()
            .context("Embedding service returned no vector for the query")?;

        let hits = self.corpus.index.search(&query_vector, k)?;
        hits.into_iter()
            .map(|(ordinal, distance)| {
                let chunk = self
                    .corpus
                    .chunk(ordinal)
                    .with_context(|| {
                        format!("Index ordinal {} has no matching chunk", ordinal)
                    })?
                    .clone();
                Ok(Retrieved {
                    ordinal,
                    distance,
                    chunk,
                })
            })
            .collect()
    }
}

/// Concatenate retrieved chunk texts, blank-line separated, preserving
/// retrieval order. Ranking order is itself a signal for the answer model.
pub fn assemble_context(results: &[Retrieved]) -> String {
    results
        .iter()
        .map(|retrieved| retrieved.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Metadata;
    use crate::index::VectorIndex;

    /// Test double returning a canned vector for any input.
    struct FixedEmbedder {
        vector: Vec<Number>,
    }

    impl Embedder for FixedEmbedder {
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<Number>>> {
            Ok(texts.iter().map(|_| self.vector.clone()).collect())
        }
    }

    fn menu_corpus() -> Corpus {
        let chunks = vec![
            chunk("Burgers", "Category: Burgers\nItems: Big Mac; Cheeseburger"),
            chunk("Drinks", "Category: Drinks\nItems: Coke; Sprite"),
            chunk("Desserts", "Category: Desserts\nItems: McFlurry"),
        ];
        let mut index = VectorIndex::new();
        index
            .insert(&[
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
            ])
            .unwrap();
        Corpus { chunks, index }
    }

    fn chunk(category: &str, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            metadata: Metadata {
                category: category.to_string(),
                source_file: "menu.csv".to_string(),
            },
        }
    }

    #[test]
    fn retrieves_nearest_chunk_first() {
        let corpus = menu_corpus();
        let embedder = FixedEmbedder {
            vector: vec![0.9, 0.1, 0.0],
        };
        let retriever = Retriever::new(&corpus, &embedder);

        let results = retriever.retrieve("What burgers are there?", 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].ordinal, 0);
        assert_eq!(results[0].chunk.metadata.category, "Burgers");
        assert!((results[0].distance - 0.02).abs() < 1e-6);
    }

    #[test]
    fn k_beyond_corpus_size_clamps() {
        let corpus = menu_corpus();
        let embedder = FixedEmbedder {
            vector: vec![0.0, 1.0, 0.0],
        };
        let retriever = Retriever::new(&corpus, &embedder);

        let results = retriever.retrieve("drinks", 50).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].chunk.metadata.category, "Drinks");
        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn empty_corpus_returns_empty_results() {
        let corpus = Corpus {
            chunks: Vec::new(),
            index: VectorIndex::new(),
        };
        let embedder = FixedEmbedder {
            vector: vec![1.0, 0.0, 0.0],
        };
        let retriever = Retriever::new(&corpus, &embedder);

        let results = retriever.retrieve("anything", 5).unwrap();
        assert!(results.is_empty());
        assert_eq!(assemble_context(&results), "");
    }

    #[test]
    fn context_joins_texts_in_retrieval_order() {
        let corpus = menu_corpus();
        let embedder = FixedEmbedder {
            vector: vec![0.9, 0.1, 0.0],
        };
        let retriever = Retriever::new(&corpus, &embedder);

        let results = retriever.retrieve("menu", 2).unwrap();
        let context = assemble_context(&results);
        assert_eq!(
            context,
            "Category: Burgers\nItems: Big Mac; Cheeseburger\n\nCategory: Drinks\nItems: Coke; Sprite"
        );
    }
}
