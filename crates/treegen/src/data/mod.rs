//! Loading AST corpora from line-delimited JSON files.
//!
//! Each line of a corpus file holds one tree as a JSON array in the format
//! accepted by [`TreeStorage::from_json`]. JSON parsing fans out over a
//! bounded worker pool; tree construction stays sequential because the
//! string interner is the one piece of shared mutable state.

use std::path::Path;

use rayon::prelude::*;
use serde_json::Value;

use crate::interner::StringInterner;
use crate::tree::{AstJsonError, TreeStorage};

/// Trees with more nodes than this are dropped after loading; for
/// JavaScript corpora this removes about 1% of files.
pub const DEFAULT_MAX_TREE_SIZE: usize = 30_000;

/// Workers parsing corpus JSON concurrently.
pub const DEFAULT_PARSE_THREADS: usize = 8;

/// Options for [`load_corpus`].
#[derive(Clone, Copy, Debug)]
pub struct CorpusOptions {
    /// Maximum number of records read from the file.
    pub max_records: usize,
    /// Trees larger than this are silently dropped.
    pub max_tree_size: usize,
    /// Size of the JSON parsing pool; 1 parses on the calling thread.
    pub parse_threads: usize,
}

impl Default for CorpusOptions {
    fn default() -> Self {
        Self {
            max_records: 100_000,
            max_tree_size: DEFAULT_MAX_TREE_SIZE,
            parse_threads: DEFAULT_PARSE_THREADS,
        }
    }
}

impl CorpusOptions {
    /// Parses the filtered corpus lines into JSON values on a pool of
    /// exactly `parse_threads` workers. Record order is preserved.
    fn parse_json_lines(
        &self,
        records: Vec<(usize, &str)>,
    ) -> Vec<Result<(usize, Value), CorpusError>> {
        let parse_line = |(line, text): (usize, &str)| {
            serde_json::from_str::<Value>(text)
                .map(|value| (line, value))
                .map_err(|source| CorpusError::Json { line, source })
        };
        if self.parse_threads <= 1 {
            return records.into_iter().map(parse_line).collect();
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parse_threads)
            .build()
            .expect("failed to create the corpus parsing pool");
        pool.install(|| records.into_par_iter().map(parse_line).collect())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("cannot read `{path}`: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid JSON on line {line}: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },
    #[error("invalid AST on line {line}: {source}")]
    Ast {
        line: usize,
        source: AstJsonError,
    },
}

/// Reads up to `max_records` trees from `path`.
///
/// Empty lines, `[]` and lines without a closing `]` are skipped, matching
/// the tolerant line filter of the corpus producers. JSON parsing runs on
/// the options' worker pool; interning and tree construction are a single
/// sequential phase. Oversized trees are dropped after loading.
pub fn load_corpus(
    path: impl AsRef<Path>,
    options: &CorpusOptions,
    interner: &mut StringInterner,
) -> Result<Vec<TreeStorage<'static>>, CorpusError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| CorpusError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let records: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|&(_, line)| line.len() > 2 && line != "[]" && line.ends_with(']'))
        .take(options.max_records)
        .collect();

    let parsed = options.parse_json_lines(records);

    let mut trees = Vec::with_capacity(parsed.len());
    for result in parsed {
        let (line, value) = result?;
        let tree = TreeStorage::from_json(&value, interner)
            .map_err(|source| CorpusError::Ast { line, source })?;
        if tree.len() <= options.max_tree_size {
            trees.push(tree);
        }
    }
    tracing::info!(
        path = %path.display(),
        trees = trees.len(),
        max_tree_size = options.max_tree_size,
        "corpus loaded"
    );
    Ok(trees)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(content: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "treegen-corpus-{}-{:p}.json",
            std::process::id(),
            content.as_ptr(),
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn loads_trees_and_skips_junk_lines() {
        let content = concat!(
            "[{\"id\":0,\"type\":\"Program\",\"children\":[1]},{\"id\":1,\"type\":\"Identifier\",\"value\":\"x\"},0]\n",
            "\n",
            "[]\n",
            "this line has no closing bracket\n",
            "[{\"id\":0,\"type\":\"Program\"}]\n",
        );
        let path = write_temp(content);
        let mut interner = StringInterner::new();
        let options = CorpusOptions {
            parse_threads: 1,
            ..CorpusOptions::default()
        };
        let trees = load_corpus(&path, &options, &mut interner).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(trees.len(), 2);
        assert_eq!(trees[0].len(), 2);
        assert_eq!(trees[0].node(1).value_id(), interner.lookup("x"));
        assert_eq!(trees[1].len(), 1);
    }

    #[test]
    fn record_limit_applies() {
        let content = "[{\"type\":\"A\"}]\n[{\"type\":\"B\"}]\n[{\"type\":\"C\"}]\n";
        let path = write_temp(content);
        let mut interner = StringInterner::new();
        let options = CorpusOptions {
            max_records: 2,
            parse_threads: 1,
            ..CorpusOptions::default()
        };
        let trees = load_corpus(&path, &options, &mut interner).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(trees.len(), 2);
    }

    #[test]
    fn oversized_trees_are_dropped() {
        let content = concat!(
            "[{\"id\":0,\"type\":\"Program\",\"children\":[1]},{\"id\":1,\"type\":\"Identifier\"}]\n",
            "[{\"id\":0,\"type\":\"Program\"}]\n",
        );
        let path = write_temp(content);
        let mut interner = StringInterner::new();
        let options = CorpusOptions {
            max_tree_size: 1,
            parse_threads: 1,
            ..CorpusOptions::default()
        };
        let trees = load_corpus(&path, &options, &mut interner).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0].len(), 1);
    }

    #[test]
    fn bad_child_order_is_an_error() {
        let content = "[{\"id\":0,\"type\":\"Program\",\"children\":[0]}]\n";
        let path = write_temp(content);
        let mut interner = StringInterner::new();
        let options = CorpusOptions {
            parse_threads: 1,
            ..CorpusOptions::default()
        };
        let err = load_corpus(&path, &options, &mut interner).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, CorpusError::Ast { line: 1, .. }));
    }

    #[test]
    fn pooled_parsing_preserves_record_order() {
        let content = "[{\"type\":\"A\"}]\n[{\"type\":\"B\"}]\n[{\"type\":\"C\"}]\n";
        let path = write_temp(content);

        let mut sequential = StringInterner::new();
        let trees_seq = load_corpus(
            &path,
            &CorpusOptions {
                parse_threads: 1,
                ..CorpusOptions::default()
            },
            &mut sequential,
        )
        .unwrap();
        let mut pooled = StringInterner::new();
        let trees_par = load_corpus(&path, &CorpusOptions::default(), &mut pooled).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(trees_seq.len(), trees_par.len());
        for (a, b) in trees_seq.iter().zip(&trees_par) {
            assert_eq!(
                a.debug_string(Some(&sequential)),
                b.debug_string(Some(&pooled))
            );
        }
    }
}
