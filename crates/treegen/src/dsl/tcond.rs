//! The TCond language: straight-line tree-walking programs.
//!
//! A program is an ordered list of [`Op`]s. The text form is
//! whitespace-separated tokens, each `NAME` or `NAME@ARG`; parsing and
//! [`Display`](std::fmt::Display) round-trip modulo whitespace.

use std::fmt;
use std::str::FromStr;

/// Errors raised while parsing program text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgramParseError {
    #[error("invalid op `{token}` in `{line}`")]
    UnknownOp { token: String, line: String },
    #[error("invalid number `{token}` in `{line}`")]
    InvalidNumber { token: String, line: String },
    #[error("not a switch: `{line}`")]
    NotASwitch { line: String },
    #[error("missing `{expected}` in `{line}`")]
    MissingToken {
        expected: &'static str,
        line: String,
    },
}

/// The opcodes of the TCond language.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpCode {
    WriteType,
    WriteValue,
    WritePos,
    Up,
    Left,
    Right,
    DownFirst,
    DownLast,
    PrevDfs,
    PrevLeaf,
    NextLeaf,
    PrevNodeValue,
    PrevNodeType,
    PrevNodeContext,
}

impl OpCode {
    pub const ALL: [OpCode; 14] = [
        OpCode::WriteType,
        OpCode::WriteValue,
        OpCode::WritePos,
        OpCode::Up,
        OpCode::Left,
        OpCode::Right,
        OpCode::DownFirst,
        OpCode::DownLast,
        OpCode::PrevDfs,
        OpCode::PrevLeaf,
        OpCode::NextLeaf,
        OpCode::PrevNodeValue,
        OpCode::PrevNodeType,
        OpCode::PrevNodeContext,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OpCode::WriteType => "WRITE_TYPE",
            OpCode::WriteValue => "WRITE_VALUE",
            OpCode::WritePos => "WRITE_POS",
            OpCode::Up => "UP",
            OpCode::Left => "LEFT",
            OpCode::Right => "RIGHT",
            OpCode::DownFirst => "DOWN_FIRST",
            OpCode::DownLast => "DOWN_LAST",
            OpCode::PrevDfs => "PREV_DFS",
            OpCode::PrevLeaf => "PREV_LEAF",
            OpCode::NextLeaf => "NEXT_LEAF",
            OpCode::PrevNodeValue => "PREV_NODE_VALUE",
            OpCode::PrevNodeType => "PREV_NODE_TYPE",
            OpCode::PrevNodeContext => "PREV_NODE_CONTEXT",
        }
    }
}

/// One program step: an opcode plus an optional integer argument
/// (`-1` when absent).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Op {
    pub code: OpCode,
    pub arg: i32,
}

impl Op {
    pub fn new(code: OpCode) -> Self {
        Self { code, arg: -1 }
    }

    pub fn with_arg(code: OpCode, arg: i32) -> Self {
        Self { code, arg }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code.as_str())?;
        if self.arg != -1 {
            write!(f, "@{}", self.arg)?;
        }
        Ok(())
    }
}

/// A straight-line TCond program.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TCondProgram {
    ops: Vec<Op>,
}

impl TCondProgram {
    pub fn new(ops: Vec<Op>) -> Self {
        Self { ops }
    }

    #[inline]
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl FromStr for TCondProgram {
    type Err = ProgramParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut ops = Vec::new();
        for token in s.split_whitespace() {
            let (name, arg) = match token.split_once('@') {
                Some((name, arg)) => {
                    let arg = arg.parse::<i32>().map_err(|_| ProgramParseError::InvalidNumber {
                        token: token.to_owned(),
                        line: s.to_owned(),
                    })?;
                    (name, arg)
                }
                None => (token, -1),
            };
            let code = OpCode::ALL
                .iter()
                .copied()
                .find(|code| code.as_str() == name)
                .ok_or_else(|| ProgramParseError::UnknownOp {
                    token: token.to_owned(),
                    line: s.to_owned(),
                })?;
            ops.push(Op { code, arg });
        }
        Ok(Self { ops })
    }
}

impl fmt::Display for TCondProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{op}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parse_and_serialize_roundtrip() {
        let text = "WRITE_TYPE UP WRITE_TYPE";
        let program: TCondProgram = text.parse().unwrap();
        assert_eq!(program.len(), 3);
        assert_eq!(program.to_string(), text);
    }

    #[test]
    fn parse_empty_program() {
        let program: TCondProgram = "".parse().unwrap();
        assert!(program.is_empty());
        assert_eq!(program.to_string(), "");
    }

    #[rstest]
    #[case("WRITE_TYPE")]
    #[case("WRITE_VALUE WRITE_POS")]
    #[case("UP LEFT RIGHT DOWN_FIRST DOWN_LAST")]
    #[case("PREV_DFS PREV_LEAF NEXT_LEAF")]
    #[case("PREV_NODE_VALUE PREV_NODE_TYPE PREV_NODE_CONTEXT")]
    #[case("LEFT@2 WRITE_POS")]
    fn roundtrips(#[case] text: &str) {
        let program: TCondProgram = text.parse().unwrap();
        assert_eq!(program.to_string(), text);
    }

    #[test]
    fn whitespace_is_normalized() {
        let program: TCondProgram = "  WRITE_TYPE   UP  ".parse().unwrap();
        assert_eq!(program.to_string(), "WRITE_TYPE UP");
    }

    #[test]
    fn unknown_op_is_rejected() {
        let err = "WRITE_TYPE FLY".parse::<TCondProgram>().unwrap_err();
        match err {
            ProgramParseError::UnknownOp { token, .. } => assert_eq!(token, "FLY"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn op_argument_roundtrip() {
        let program: TCondProgram = "LEFT@3".parse().unwrap();
        assert_eq!(program.ops()[0], Op::with_arg(OpCode::Left, 3));
        assert_eq!(program.to_string(), "LEFT@3");
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_programs_roundtrip(
            ops in proptest::collection::vec(
                (0usize..OpCode::ALL.len(), proptest::option::of(0i32..1000)),
                0..12,
            )
        ) {
            let program = TCondProgram::new(
                ops.iter()
                    .map(|&(code, arg)| Op {
                        code: OpCode::ALL[code],
                        arg: arg.unwrap_or(-1),
                    })
                    .collect(),
            );
            let text = program.to_string();
            proptest::prop_assert_eq!(text.parse::<TCondProgram>().unwrap(), program);
        }
    }
}
