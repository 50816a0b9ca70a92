//! Question/expected-context datasets.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;

use ragkit_core::{RagError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One generated question and the segments it was generated from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QaPair {
    /// Query id (a UUID v4 for generated pairs).
    pub id: String,
    /// The question text.
    pub query: String,
    /// Ids of the segments that answer the question.
    pub expected_segment_ids: Vec<String>,
}

/// An ordered set of [`QaPair`]s plus the text of every referenced segment.
///
/// Pairs keep generation order: segment order, then question order within a
/// segment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QaPairSet {
    pairs: Vec<QaPair>,
    /// Segment id to segment text.
    corpus: BTreeMap<String, String>,
    /// Query id to position in `pairs`.
    #[serde(skip)]
    positions: HashMap<String, usize>,
}

impl QaPairSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a segment's text to the corpus.
    pub fn insert_segment(&mut self, segment_id: impl Into<String>, text: impl Into<String>) {
        self.corpus.insert(segment_id.into(), text.into());
    }

    /// Append a pair.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] if the id is already used or an
    /// expected segment is missing from the corpus.
    pub fn push(&mut self, pair: QaPair) -> Result<()> {
        if self.positions.contains_key(&pair.id) {
            return Err(RagError::InvalidInput(format!("duplicate query id '{}'", pair.id)));
        }
        if let Some(missing) =
            pair.expected_segment_ids.iter().find(|id| !self.corpus.contains_key(*id))
        {
            return Err(RagError::InvalidInput(format!(
                "query '{}' expects unknown segment '{missing}'",
                pair.id
            )));
        }
        self.positions.insert(pair.id.clone(), self.pairs.len());
        self.pairs.push(pair);
        Ok(())
    }

    /// The pairs, in order.
    pub fn pairs(&self) -> &[QaPair] {
        &self.pairs
    }

    /// Query id to query text, in order.
    pub fn queries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|p| (p.id.as_str(), p.query.as_str()))
    }

    /// Expected segment ids for `query_id`.
    pub fn relevant_docs(&self, query_id: &str) -> Option<&[String]> {
        self.get(query_id).map(|p| p.expected_segment_ids.as_slice())
    }

    /// Segment id to segment text.
    pub fn corpus(&self) -> &BTreeMap<String, String> {
        &self.corpus
    }

    /// Look up a pair by query id.
    pub fn get(&self, query_id: &str) -> Option<&QaPair> {
        self.positions.get(query_id).map(|&i| &self.pairs[i])
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Write the set to `path` as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        let mut writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        info!(path = %path.as_ref().display(), pair_count = self.len(), "saved QA pairs");
        Ok(())
    }

    /// Read a set previously written by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// I/O and parse failures, plus [`RagError::InvalidInput`] if the file
    /// holds duplicate ids or references segments missing from its corpus.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let raw: QaPairSet = serde_json::from_reader(std::io::BufReader::new(file))?;

        let mut set = QaPairSet { corpus: raw.corpus, ..QaPairSet::default() };
        set.pairs.reserve(raw.pairs.len());
        for pair in raw.pairs {
            set.push(pair)?;
        }
        info!(path = %path.as_ref().display(), pair_count = set.len(), "loaded QA pairs");
        Ok(set)
    }
}
