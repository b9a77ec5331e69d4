//! The TGen program table: an indexed collection of straight-line and
//! branched programs. The entry with the highest index is the start program.

use std::path::Path;

use crate::interner::StringInterner;

use super::branched::BranchCondProgram;
use super::simple::SimpleCondProgram;
use super::tcond::ProgramParseError;

/// One addressable entry of a [`TGenProgram`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgramEntry {
    Simple(SimpleCondProgram),
    Branched(BranchCondProgram),
}

/// Errors raised while loading a program file.
#[derive(Debug, thiserror::Error)]
pub enum TGenLoadError {
    #[error("cannot read `{path}`: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ProgramParseError),
}

/// An ordered table of conditioning programs, addressable by index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TGenProgram {
    entries: Vec<ProgramEntry>,
}

impl TGenProgram {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The start program: the entry with the highest index.
    ///
    /// # Panics
    ///
    /// Panics on an empty table.
    pub fn start_id(&self) -> usize {
        assert!(!self.entries.is_empty(), "empty program table");
        self.entries.len() - 1
    }

    #[inline]
    pub fn entry(&self, id: usize) -> &ProgramEntry {
        &self.entries[id]
    }

    pub fn entries(&self) -> &[ProgramEntry] {
        &self.entries
    }

    pub fn is_branched(&self, id: usize) -> bool {
        matches!(self.entries[id], ProgramEntry::Branched(_))
    }

    /// Adds a straight-line program; returns its id.
    pub fn push_simple(&mut self, program: SimpleCondProgram) -> usize {
        self.entries.push(ProgramEntry::Simple(program));
        self.entries.len() - 1
    }

    /// Adds a branched program; returns its id.
    pub fn push_branched(&mut self, program: BranchCondProgram) -> usize {
        self.entries.push(ProgramEntry::Branched(program));
        self.entries.len() - 1
    }

    pub fn find_simple(&self, program: &SimpleCondProgram) -> Option<usize> {
        self.entries.iter().position(
            |entry| matches!(entry, ProgramEntry::Simple(existing) if existing == program),
        )
    }

    pub fn find_branched(&self, program: &BranchCondProgram) -> Option<usize> {
        self.entries.iter().position(
            |entry| matches!(entry, ProgramEntry::Branched(existing) if existing == program),
        )
    }

    /// Adds a straight-line program unless an equal one exists; returns the
    /// id either way.
    pub fn push_simple_if_absent(&mut self, program: SimpleCondProgram) -> usize {
        match self.find_simple(&program) {
            Some(id) => id,
            None => self.push_simple(program),
        }
    }

    /// Adds a branched program unless an equal one exists; returns the id
    /// either way.
    pub fn push_branched_if_absent(&mut self, program: BranchCondProgram) -> usize {
        match self.find_branched(&program) {
            Some(id) => id,
            None => self.push_branched(program),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Op count of the entry plus all programs it references; tables are
    /// acyclic by construction.
    pub fn recursive_size(&self, id: usize) -> usize {
        match &self.entries[id] {
            ProgramEntry::Simple(simple) => simple.size(),
            ProgramEntry::Branched(branched) => {
                let mut size = branched.cond.program.len();
                for target in branched.referenced_programs() {
                    size += self.recursive_size(target);
                }
                size
            }
        }
    }

    // =========================================================================
    // Text format
    // =========================================================================

    /// Parses the newline-separated text form; lines starting with `switch`
    /// are branched entries, blank lines are skipped.
    pub fn parse(text: &str, interner: &mut StringInterner) -> Result<Self, ProgramParseError> {
        let mut table = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with("switch") {
                table.push_branched(BranchCondProgram::parse_switch_line(line, interner)?);
            } else {
                table.push_simple(SimpleCondProgram::parse(line)?);
            }
        }
        Ok(table)
    }

    /// The newline-separated text form; inverse of
    /// [`parse`](TGenProgram::parse).
    pub fn to_text(&self, interner: &StringInterner) -> String {
        let mut result = String::new();
        for id in 0..self.len() {
            result.push_str(&self.entry_to_string(id, interner));
            result.push('\n');
        }
        result
    }

    pub fn entry_to_string(&self, id: usize, interner: &StringInterner) -> String {
        match &self.entries[id] {
            ProgramEntry::Simple(simple) => simple.to_string(),
            ProgramEntry::Branched(branched) => branched.to_program_line(interner),
        }
    }

    pub fn load_from_path(
        path: impl AsRef<Path>,
        interner: &mut StringInterner,
    ) -> Result<Self, TGenLoadError> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "loading TGen program");
        let text = std::fs::read_to_string(path).map_err(|source| TGenLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::parse(&text, interner)?)
    }

    pub fn save_to_path(
        &self,
        path: impl AsRef<Path>,
        interner: &StringInterner,
    ) -> Result<(), TGenLoadError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_text(interner)).map_err(|source| TGenLoadError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}
