//! Branched ("switch") conditioning programs.
//!
//! A [`BranchCondProgram`] runs a TCond condition, looks its emission vector
//! up in a case table and tail-calls another program of the table:
//!
//! ```text
//! switch <COND> : on "V1|V2" goto N1; on "V3" goto N2; else goto ND
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::interner::StringInterner;
use crate::tree::SlicedCursor;

use super::exec::ExecutionContext;
use super::simple::{case_item_to_string, unescape_separators};
use super::tcond::{Op, OpCode, ProgramParseError, TCondProgram};

// =============================================================================
// BranchCond
// =============================================================================

/// The condition of a switch: a TCond program, possibly given by one of the
/// shorthand names `type`, `parent_type` or `type_parent_type`.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct BranchCond {
    pub program: TCondProgram,
}

impl BranchCond {
    pub fn type_cond() -> Self {
        Self {
            program: TCondProgram::new(vec![Op::new(OpCode::WriteType)]),
        }
    }

    pub fn parent_type_cond() -> Self {
        Self {
            program: TCondProgram::new(vec![Op::new(OpCode::Up), Op::new(OpCode::WriteType)]),
        }
    }

    pub fn type_and_parent_type_cond() -> Self {
        Self {
            program: TCondProgram::new(vec![
                Op::new(OpCode::WriteType),
                Op::new(OpCode::Up),
                Op::new(OpCode::WriteType),
            ]),
        }
    }

    pub fn parse(s: &str) -> Result<Self, ProgramParseError> {
        Ok(match s {
            "type" => Self::type_cond(),
            "parent_type" => Self::parent_type_cond(),
            "type_parent_type" => Self::type_and_parent_type_cond(),
            other => Self {
                program: other.parse()?,
            },
        })
    }
}

impl std::fmt::Display for BranchCond {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)
    }
}

// =============================================================================
// BranchCondProgram
// =============================================================================

/// A switch over the emission vector of a condition program.
///
/// Case keys are interned-id sequences, ordered so serialization is
/// deterministic. The `else` target receives every unmatched emission
/// vector.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BranchCondProgram {
    pub cond: BranchCond,
    pub cases: BTreeMap<Vec<i32>, usize>,
    pub default_target: usize,
}

impl BranchCondProgram {
    /// Runs the condition on a copy of `cursor` and returns the called
    /// program id.
    pub fn evaluate<'a>(&self, exec: &ExecutionContext<'a>, cursor: &SlicedCursor<'a>) -> usize {
        let mut emissions = Vec::new();
        let mut probe = *cursor;
        exec.execute(&self.cond.program, &mut probe, &mut |v| emissions.push(v));
        self.target_for(&emissions)
    }

    /// The program id an emission vector dispatches to.
    #[inline]
    pub fn target_for(&self, emissions: &[i32]) -> usize {
        self.cases
            .get(emissions)
            .copied()
            .unwrap_or(self.default_target)
    }

    /// All program ids this switch can call (including the default).
    pub fn referenced_programs(&self) -> BTreeSet<usize> {
        let mut programs: BTreeSet<usize> = self.cases.values().copied().collect();
        programs.insert(self.default_target);
        programs
    }

    pub fn size(&self) -> usize {
        self.cond.program.len() + self.cases.len()
    }

    /// Parses a `switch <COND>: on "…" goto N; …; else goto N` line.
    ///
    /// Quirk kept for compatibility with existing program files: an *empty
    /// item* inside a space-separated case value wipes the whole key, so
    /// `"A  B"` (double space) denotes the same case as `""`, the empty
    /// emission vector.
    pub fn parse_switch_line(
        line: &str,
        interner: &mut StringInterner,
    ) -> Result<Self, ProgramParseError> {
        let missing = |expected: &'static str| ProgramParseError::MissingToken {
            expected,
            line: line.to_owned(),
        };

        if !line.starts_with("switch ") {
            return Err(ProgramParseError::NotASwitch {
                line: line.to_owned(),
            });
        }
        let colon = line.find(':').ok_or(missing(":"))?;
        let cond = BranchCond::parse(line[7..colon].trim())?;

        let mut cases = BTreeMap::new();
        let mut default_target = None;
        for segment in line[colon + 1..].split(';') {
            let segment = segment.trim();
            if let Some(rest) = segment.strip_prefix("else goto") {
                default_target = Some(parse_target(rest, line)?);
                continue;
            }
            let rest = segment.strip_prefix("on ").ok_or(missing("on"))?;
            let q1 = rest.find('"').ok_or(missing("opening quote"))?;
            let q2 = rest[q1 + 1..]
                .find('"')
                .map(|i| i + q1 + 1)
                .ok_or(missing("closing quote"))?;
            let target = parse_target(
                rest[q2 + 1..]
                    .trim()
                    .strip_prefix("goto")
                    .ok_or(missing("goto"))?,
                line,
            )?;

            for value in rest[q1 + 1..q2].split('|') {
                let key = parse_case_value(value.trim(), line, interner)?;
                cases.insert(key, target);
            }
        }

        Ok(Self {
            cond,
            cases,
            default_target: default_target.ok_or(missing("else"))?,
        })
    }

    /// Parses the legacy filter form `COND == V1|V2`: matching cases go to
    /// program 1, everything else to program 0.
    pub fn parse_filter(
        filter: &str,
        interner: &mut StringInterner,
    ) -> Result<Self, ProgramParseError> {
        let eq = filter
            .find("==")
            .ok_or_else(|| ProgramParseError::MissingToken {
                expected: "==",
                line: filter.to_owned(),
            })?;
        let cond = BranchCond::parse(filter[..eq].trim())?;
        let mut cases = BTreeMap::new();
        for value in filter[eq + 2..].split('|') {
            cases.insert(parse_case_value(value.trim(), filter, interner)?, 1);
        }
        Ok(Self {
            cond,
            cases,
            default_target: 0,
        })
    }

    /// The canonical text form. Case groups are printed in ascending target
    /// order, cases mapped to the default target are folded into `else`.
    pub fn to_program_line(&self, interner: &StringInterner) -> String {
        let mut result = format!("switch {}:", self.cond);

        let mut programs = self.referenced_programs();
        programs.remove(&self.default_target);

        for &target in &programs {
            result.push_str(" on \"");
            let mut first = true;
            for (key, &key_target) in &self.cases {
                if key_target != target {
                    continue;
                }
                if !first {
                    result.push('|');
                }
                first = false;
                result.push_str(&case_to_string(key, interner));
            }
            result.push_str(&format!("\" goto {target};"));
        }
        result.push_str(&format!(" else goto {}", self.default_target));
        result
    }
}

fn parse_target(text: &str, line: &str) -> Result<usize, ProgramParseError> {
    text.trim()
        .parse::<usize>()
        .map_err(|_| ProgramParseError::InvalidNumber {
            token: text.trim().to_owned(),
            line: line.to_owned(),
        })
}

/// Space-joined case items: negative integers stand for themselves,
/// everything else is interned after unescaping. An empty item clears the
/// key (see [`BranchCondProgram::parse_switch_line`]).
fn parse_case_value(
    value: &str,
    line: &str,
    interner: &mut StringInterner,
) -> Result<Vec<i32>, ProgramParseError> {
    let mut ids = Vec::new();
    for token in value.split(' ') {
        if token.is_empty() {
            ids.clear();
            break;
        }
        if token.starts_with('-') {
            let id = token
                .parse::<i32>()
                .map_err(|_| ProgramParseError::InvalidNumber {
                    token: token.to_owned(),
                    line: line.to_owned(),
                })?;
            ids.push(id);
        } else {
            ids.push(interner.intern(&unescape_separators(token)));
        }
    }
    Ok(ids)
}

fn case_to_string(key: &[i32], interner: &StringInterner) -> String {
    key.iter()
        .map(|&id| case_item_to_string(id, interner))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_switch() {
        let mut interner = StringInterner::new();
        let text = "switch WRITE_TYPE: on \"Property\" goto 1; else goto 0";
        let program = BranchCondProgram::parse_switch_line(text, &mut interner).unwrap();

        assert_eq!(program.default_target, 0);
        assert_eq!(program.cases.len(), 1);
        let property = interner.lookup("Property");
        assert_ne!(property, -1);
        assert_eq!(program.cases[&vec![property]], 1);
        assert_eq!(program.to_program_line(&interner), text);
    }

    #[test]
    fn parse_multi_target_switch() {
        let mut interner = StringInterner::new();
        let text = "switch WRITE_TYPE: on \"Expression\" goto 2; on \"Loop\" goto 3; else goto 0";
        let program = BranchCondProgram::parse_switch_line(text, &mut interner).unwrap();
        assert_eq!(program.to_program_line(&interner), text);
    }

    #[test]
    fn parse_switch_with_empty_case_and_negatives() {
        let mut interner = StringInterner::new();
        let text = "switch WRITE_TYPE RIGHT WRITE_TYPE: on \"\" goto 1; on \"Expression\" goto 2; on \"Loop -1\" goto 3; else goto 0";
        let program = BranchCondProgram::parse_switch_line(text, &mut interner).unwrap();

        assert_eq!(program.cases[&vec![]], 1);
        let loop_id = interner.lookup("Loop");
        assert_eq!(program.cases[&vec![loop_id, -1]], 3);
        assert_eq!(program.to_program_line(&interner), text);
    }

    #[test]
    fn empty_item_wipes_the_key() {
        let mut interner = StringInterner::new();
        let with_gap =
            BranchCondProgram::parse_switch_line("switch WRITE_TYPE: on \"A  B\" goto 1; else goto 0", &mut interner)
                .unwrap();
        let explicit_empty =
            BranchCondProgram::parse_switch_line("switch WRITE_TYPE: on \"\" goto 1; else goto 0", &mut interner)
                .unwrap();
        assert_eq!(with_gap.cases, explicit_empty.cases);
    }

    #[test]
    fn filter_form_desugars_shorthands() {
        let mut interner = StringInterner::new();
        let program = BranchCondProgram::parse_filter("type == Property", &mut interner).unwrap();
        assert_eq!(program.default_target, 0);
        let property = interner.lookup("Property");
        assert_eq!(program.cases[&vec![property]], 1);
        assert_eq!(
            program.to_program_line(&interner),
            "switch WRITE_TYPE: on \"Property\" goto 1; else goto 0"
        );

        let program =
            BranchCondProgram::parse_filter("type == Expression|If", &mut interner).unwrap();
        assert_eq!(program.cases.len(), 2);
        assert_eq!(
            program.to_program_line(&interner),
            "switch WRITE_TYPE: on \"Expression|If\" goto 1; else goto 0"
        );
    }

    #[test]
    fn filter_with_escaped_space_roundtrips() {
        let mut interner = StringInterner::new();
        let program = BranchCondProgram::parse_filter(
            "type_parent_type == Expression Expression | If\\sExpr If",
            &mut interner,
        )
        .unwrap();
        let expr = interner.lookup("Expression");
        let if_expr = interner.lookup("If Expr");
        let if_plain = interner.lookup("If");
        assert_ne!(if_expr, -1);
        assert_eq!(program.cases[&vec![expr, expr]], 1);
        assert_eq!(program.cases[&vec![if_expr, if_plain]], 1);
        assert_eq!(
            program.to_program_line(&interner),
            "switch WRITE_TYPE UP WRITE_TYPE: on \"Expression Expression|If\\sExpr If\" goto 1; else goto 0"
        );

        let reparsed = BranchCondProgram::parse_switch_line(
            &program.to_program_line(&interner),
            &mut interner,
        )
        .unwrap();
        assert_eq!(reparsed, program);
    }

    #[test]
    fn else_clause_is_required() {
        let mut interner = StringInterner::new();
        let err = BranchCondProgram::parse_switch_line(
            "switch WRITE_TYPE: on \"A\" goto 1",
            &mut interner,
        )
        .unwrap_err();
        assert!(matches!(err, ProgramParseError::MissingToken { expected: "else", .. }));
    }
}
