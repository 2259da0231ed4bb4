use miette::{miette, LabeledSpan, Report, Severity};

use crate::lexer::Token;
use crate::parser::Bits;
use crate::symbol::Span;

// Lexer errors

pub fn lex_unknown(span: Span, src: &'static str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::unknown",
        help = "tokens are labels, mnemonics, registers, literals, and directives",
        labels = vec![LabeledSpan::at(span, "unknown token")],
        "Encountered an unknown token",
    )
    .with_source_code(src)
}

pub fn lex_bad_literal(span: Span, src: &'static str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::bad_lit",
        help = "decimal from -32,768 to 65,535 or hex from 0x0 to 0xFFFF",
        labels = vec![LabeledSpan::at(span, "incorrect literal")],
        "Encountered an invalid numeric literal",
    )
    .with_source_code(src)
}

pub fn lex_unclosed_str(span: Span, src: &'static str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::str_lit",
        help = "make sure to close string literals with a \" character",
        labels = vec![LabeledSpan::at(span, "incorrect literal")],
        "Encountered an unterminated string literal",
    )
    .with_source_code(src)
}

pub fn lex_bad_char(span: Span, src: &'static str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::char_lit",
        help = "character literals hold one ASCII character, like 'A' or '\\n'",
        labels = vec![LabeledSpan::at(span, "incorrect literal")],
        "Encountered an invalid character literal",
    )
    .with_source_code(src)
}

pub fn lex_invalid_dir(span: Span, src: &'static str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::dir",
        help = "available directives are .word, .byte, .org, and .ascii",
        labels = vec![LabeledSpan::at(span, "incorrect directive")],
        "Encountered an invalid directive",
    )
    .with_source_code(src)
}

pub fn lex_bad_ind_reg(span: Span, src: &'static str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::ind_reg",
        help = "indirect operands name one register in brackets, like [R3]",
        labels = vec![LabeledSpan::at(span, "incorrect operand")],
        "Expected a bracketed register",
    )
    .with_source_code(src)
}

// Parser errors

pub fn parse_unknown_mnemonic(span: Span, src: &'static str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::mnemonic",
        help = "lines start with an instruction mnemonic or a directive",
        labels = vec![LabeledSpan::at(span, "unknown mnemonic")],
        "Unknown instruction mnemonic",
    )
    .with_source_code(src)
}

pub fn parse_unexpected(src: &'static str, expected: &str, found: &Token) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::unexpected_token",
        help = "check the operands allowed for this instruction",
        labels = vec![LabeledSpan::at(found.span, "unexpected token")],
        "Expected {expected}, found {}",
        found.kind
    )
    .with_source_code(src)
}

pub fn parse_missing_operand(line: u32, src: &'static str, expected: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::missing_operand",
        help = "you may be missing operands in this statement",
        "Expected {expected} on line {line} before the end of the line",
    )
    .with_source_code(src)
}

pub fn parse_trailing(span: Span, src: &'static str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::trailing",
        help = "each line holds at most one statement",
        labels = vec![LabeledSpan::at(span, "extra token")],
        "Trailing token after a complete statement",
    )
    .with_source_code(src)
}

pub fn parse_imm_range(span: Span, src: &'static str, bits: &Bits, value: i32) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::imm_range",
        help = format!("this operand must fit in {bits} bits"),
        labels = vec![LabeledSpan::at(span, "out-of-range literal")],
        "Immediate value {value} does not fit the field",
    )
    .with_source_code(src)
}

pub fn parse_duplicate_label(span: Span, src: &'static str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::duplicate_label",
        help = "label names are unique across the whole program",
        labels = vec![LabeledSpan::at(span, "duplicate label")],
        "Duplicate label definition",
    )
    .with_source_code(src)
}

pub fn parse_too_large(span: Span, src: &'static str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::too_large",
        help = "the address space ends at 0xFFFF",
        labels = vec![LabeledSpan::at(span, "does not fit")],
        "Program does not fit in the 64 KiB address space",
    )
    .with_source_code(src)
}
