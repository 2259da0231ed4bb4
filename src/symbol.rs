use std::{ops::Range, str::FromStr};

use fxhash::FxHashMap;
use miette::{miette, Result, SourceSpan};

/// Maps label names to the byte address of the next emitted word.
/// Populated during parsing, consulted during backpatching.
pub type LabelTable = FxHashMap<String, u16>;

/// Absolute address operand of a two-word instruction.
///
/// Holds either a resolved byte address or a label name waiting for
/// backpatching once the whole program has been walked.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Label {
    Ref(u16),
    Unfilled(String),
}

impl Label {
    /// Resolve immediately if the label was already defined, otherwise
    /// leave a forward reference for the backpatch pass.
    pub fn try_fill(name: &str, table: &LabelTable) -> Self {
        match table.get(name) {
            Some(addr) => Label::Ref(*addr),
            None => Label::Unfilled(name.to_string()),
        }
    }

    /// Used once every label definition is guaranteed to be in the table.
    pub fn filled(self, table: &LabelTable, line: u32) -> Result<Self> {
        match &self {
            Self::Unfilled(name) => match table.get(name.as_str()) {
                Some(addr) => Ok(Self::Ref(*addr)),
                None => Err(miette!(
                    code = "asm::unknown_label",
                    help = "labels are case-sensitive and must be defined somewhere in the file",
                    "Unknown label '{name}' referenced on line {line}"
                )),
            },
            Self::Ref(_) => Ok(self),
        }
    }

    /// Resolved byte address. Must only be called after backpatching.
    pub fn addr(&self) -> u16 {
        match self {
            Label::Ref(addr) => *addr,
            Label::Unfilled(_) => panic!("tried to emit an unfilled label"),
        }
    }
}

/// Location within source str.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Span {
    offs: SrcOffset,
    len: usize,
}

impl Span {
    pub fn new(offs: SrcOffset, len: usize) -> Self {
        Span { offs, len }
    }

    /// Returns a range that can be used to index the source
    pub fn as_range(&self) -> Range<usize> {
        self.offs()..self.end()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn offs(&self) -> usize {
        self.offs.0
    }

    pub fn end(&self) -> usize {
        self.offs.0 + self.len
    }
}

// Used for miette conversion
impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

impl From<Span> for Range<usize> {
    fn from(value: Span) -> Self {
        value.offs()..value.end()
    }
}

/// Used to refer to offsets from the start of a source file.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct SrcOffset(pub usize);

/// Represents the CPU registers as written in assembly source.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Register {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
}

impl FromStr for Register {
    type Err = ();

    /// Accepts `R0`..`R7` in either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some('r' | 'R'), Some(digit), None) => match digit {
                '0' => Ok(Register::R0),
                '1' => Ok(Register::R1),
                '2' => Ok(Register::R2),
                '3' => Ok(Register::R3),
                '4' => Ok(Register::R4),
                '5' => Ok(Register::R5),
                '6' => Ok(Register::R6),
                '7' => Ok(Register::R7),
                _ => Err(()),
            },
            _ => Err(()),
        }
    }
}

/// Assembler directives.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DirKind {
    /// Emit one 16-bit word
    Word,
    /// Emit one byte
    Byte,
    /// Set the current emission address
    Org,
    /// Emit the bytes of a string literal, no terminator
    Ascii,
}

impl FromStr for DirKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            ".word" => Ok(DirKind::Word),
            ".byte" => Ok(DirKind::Byte),
            ".org" => Ok(DirKind::Org),
            ".ascii" => Ok(DirKind::Ascii),
            _ => Err(()),
        }
    }
}
