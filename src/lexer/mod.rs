//! Line-oriented tokenizer.
//!
//! Comments run from `;` to end of line; commas and whitespace separate
//! tokens. The output is grouped by source line because the assembler is
//! strictly line-oriented: one statement per line, optionally preceded by
//! a label definition.

use std::fmt;
use std::str::FromStr;

use miette::Result;

use crate::error;
use crate::symbol::{DirKind, Register, Span, SrcOffset};

mod cursor;
use cursor::Cursor;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LiteralKind {
    /// Decimal, possibly negative
    Dec(i32),
    /// `0x`-prefixed, raw bit pattern
    Hex(u16),
    /// Character literal, one ASCII byte
    Char(u8),
    /// String literal; contents read back through the span
    Str,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TokenKind {
    /// Label definition; the span covers the name, not the `:`
    Label,
    /// Mnemonic or label reference
    Ident,
    Reg(Register),
    /// Register in brackets, `[R3]`
    IndReg(Register),
    Lit(LiteralKind),
    Dir(DirKind),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Label => "label",
            TokenKind::Ident => "identifier",
            TokenKind::Reg(_) => "register",
            TokenKind::IndReg(_) => "indirect register",
            TokenKind::Lit(_) => "literal",
            TokenKind::Dir(_) => "directive",
        };
        f.write_str(text)
    }
}

/// One source line's worth of tokens. Blank and comment-only lines are
/// dropped before the parser sees them.
#[derive(Debug)]
pub struct Line {
    pub number: u32,
    pub tokens: Vec<Token>,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Split the whole source into line-grouped tokens.
pub fn tokenize(src: &'static str) -> Result<Vec<Line>> {
    let mut cur = Cursor::new(src);
    let mut lines = Vec::new();
    let mut tokens = Vec::new();
    let mut number = 1u32;

    loop {
        if cur.is_eof() {
            if !tokens.is_empty() {
                lines.push(Line { number, tokens });
            }
            break;
        }

        let start = cur.pos();
        match cur.first() {
            '\n' => {
                cur.bump();
                if !tokens.is_empty() {
                    lines.push(Line {
                        number,
                        tokens: std::mem::take(&mut tokens),
                    });
                }
                number += 1;
            }
            c if c == ',' || (c.is_whitespace() && c != '\n') => {
                cur.take_while(|c| c == ',' || (c.is_whitespace() && c != '\n'));
            }
            ';' => cur.take_while(|c| c != '\n'),
            '"' => tokens.push(lex_string(&mut cur, src)?),
            '\'' => tokens.push(lex_char(&mut cur, src)?),
            '[' => tokens.push(lex_ind_reg(&mut cur, src)?),
            '.' => {
                cur.bump();
                cur.take_while(is_ident_char);
                let span = span_from(start, &cur);
                let kind = DirKind::from_str(cur.str_from(start))
                    .map_err(|()| error::lex_invalid_dir(span, src))?;
                tokens.push(Token {
                    kind: TokenKind::Dir(kind),
                    span,
                });
            }
            c if c == '-' || c.is_ascii_digit() => tokens.push(lex_number(&mut cur, src)?),
            c if is_ident_start(c) => {
                cur.take_while(is_ident_char);
                let span = span_from(start, &cur);
                let text = cur.str_from(start);
                let kind = if cur.first() == ':' {
                    cur.bump();
                    TokenKind::Label
                } else if let Ok(reg) = Register::from_str(text) {
                    TokenKind::Reg(reg)
                } else {
                    TokenKind::Ident
                };
                tokens.push(Token { kind, span });
            }
            _ => {
                cur.bump();
                return Err(error::lex_unknown(span_from(start, &cur), src));
            }
        }
    }

    Ok(lines)
}

fn span_from(start: usize, cur: &Cursor) -> Span {
    Span::new(SrcOffset(start), cur.pos() - start)
}

fn lex_number(cur: &mut Cursor, src: &'static str) -> Result<Token> {
    let start = cur.pos();
    let negative = cur.first() == '-';
    if negative {
        cur.bump();
    }

    let kind = if cur.first() == '0' && matches!(cur.second(), 'x' | 'X') {
        cur.bump();
        cur.bump();
        let digits_at = cur.pos();
        cur.take_while(|c| c.is_ascii_hexdigit());
        let span = span_from(start, cur);
        if negative || cur.pos() == digits_at {
            return Err(error::lex_bad_literal(span, src));
        }
        let value = u16::from_str_radix(cur.str_from(digits_at), 16)
            .map_err(|_| error::lex_bad_literal(span, src))?;
        LiteralKind::Hex(value)
    } else {
        cur.take_while(|c| c.is_ascii_digit());
        let span = span_from(start, cur);
        let value: i32 = cur
            .str_from(start)
            .parse()
            .map_err(|_| error::lex_bad_literal(span, src))?;
        if !(-0x8000..=0xFFFF).contains(&value) {
            return Err(error::lex_bad_literal(span, src));
        }
        LiteralKind::Dec(value)
    };

    Ok(Token {
        kind: TokenKind::Lit(kind),
        span: span_from(start, cur),
    })
}

fn lex_string(cur: &mut Cursor, src: &'static str) -> Result<Token> {
    let start = cur.pos();
    cur.bump();
    loop {
        match cur.bump() {
            Some('"') => break,
            Some('\\') => {
                cur.bump();
            }
            Some('\n') | None => {
                return Err(error::lex_unclosed_str(span_from(start, cur), src));
            }
            Some(_) => (),
        }
    }
    Ok(Token {
        kind: TokenKind::Lit(LiteralKind::Str),
        span: span_from(start, cur),
    })
}

fn lex_char(cur: &mut Cursor, src: &'static str) -> Result<Token> {
    let start = cur.pos();
    cur.bump();
    let value = match cur.bump() {
        Some('\\') => match cur.bump() {
            Some('n') => b'\n',
            Some('t') => b'\t',
            Some('r') => b'\r',
            Some('0') => b'\0',
            Some('\\') => b'\\',
            Some('\'') => b'\'',
            _ => return Err(error::lex_bad_char(span_from(start, cur), src)),
        },
        Some(c) if c != '\'' && c != '\n' && (c as u32) < 0x80 => c as u8,
        _ => return Err(error::lex_bad_char(span_from(start, cur), src)),
    };
    if cur.bump() != Some('\'') {
        return Err(error::lex_bad_char(span_from(start, cur), src));
    }
    Ok(Token {
        kind: TokenKind::Lit(LiteralKind::Char(value)),
        span: span_from(start, cur),
    })
}

fn lex_ind_reg(cur: &mut Cursor, src: &'static str) -> Result<Token> {
    let start = cur.pos();
    cur.bump();
    let name_at = cur.pos();
    cur.take_while(is_ident_char);
    let reg = Register::from_str(cur.str_from(name_at));
    if reg.is_err() || cur.first() != ']' {
        cur.take_while(|c| c != ']' && c != '\n');
        if cur.first() == ']' {
            cur.bump();
        }
        return Err(error::lex_bad_ind_reg(span_from(start, cur), src));
    }
    cur.bump();
    Ok(Token {
        kind: TokenKind::IndReg(reg.unwrap()),
        span: span_from(start, cur),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn kinds(src: &'static str) -> Vec<Vec<TokenKind>> {
        tokenize(src)
            .unwrap()
            .into_iter()
            .map(|line| line.tokens.into_iter().map(|t| t.kind).collect())
            .collect()
    }

    #[test]
    fn comments_and_blanks_disappear() {
        let lines = tokenize("; header\n\n  nop ; trailing\n").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].number, 3);
        assert_eq!(lines[0].tokens.len(), 1);
    }

    #[test]
    fn labels_registers_idents() {
        let lines = kinds("loop: ADD R1, r2, R3\n jmp loop");
        assert_eq!(
            lines[0],
            vec![
                TokenKind::Label,
                TokenKind::Ident,
                TokenKind::Reg(Register::R1),
                TokenKind::Reg(Register::R2),
                TokenKind::Reg(Register::R3),
            ]
        );
        assert_eq!(lines[1], vec![TokenKind::Ident, TokenKind::Ident]);
    }

    #[test]
    fn numeric_literals() {
        let lines = kinds("movi R0, 10\nmovi R0, -3\nmovi R0, 0x7F");
        assert_eq!(lines[0][2], TokenKind::Lit(LiteralKind::Dec(10)));
        assert_eq!(lines[1][2], TokenKind::Lit(LiteralKind::Dec(-3)));
        assert_eq!(lines[2][2], TokenKind::Lit(LiteralKind::Hex(0x7F)));
    }

    #[test]
    fn literal_range_checks() {
        assert!(tokenize(".word 65536").is_err());
        assert!(tokenize(".word -32769").is_err());
        assert!(tokenize(".word 0x10000").is_err());
        assert!(tokenize(".word -0x10").is_err());
        assert!(tokenize(".word 65535").is_ok());
    }

    #[test]
    fn char_literals() {
        let lines = kinds("movi R0, 'H'\nmovi R0, '\\n'");
        assert_eq!(lines[0][2], TokenKind::Lit(LiteralKind::Char(b'H')));
        assert_eq!(lines[1][2], TokenKind::Lit(LiteralKind::Char(b'\n')));
        assert!(tokenize("movi R0, 'ab'").is_err());
    }

    #[test]
    fn string_literals() {
        let lines = tokenize(".ascii \"Hi, there\"").unwrap();
        assert_eq!(lines[0].tokens[1].kind, TokenKind::Lit(LiteralKind::Str));
        assert!(tokenize(".ascii \"open ended").is_err());
    }

    #[test]
    fn indirect_registers() {
        let lines = kinds("load_ind R1, [R2]\nstore_ind [r0], R3");
        assert_eq!(lines[0][2], TokenKind::IndReg(Register::R2));
        assert_eq!(lines[1][1], TokenKind::IndReg(Register::R0));
        assert!(tokenize("load_ind R1, [R9]").is_err());
        assert!(tokenize("load_ind R1, [R2").is_err());
    }

    #[test]
    fn directives() {
        let lines = kinds(".org 0x8000\n.word 5\n.byte 1\n.ascii \"x\"");
        assert_eq!(lines[0][0], TokenKind::Dir(DirKind::Org));
        assert_eq!(lines[1][0], TokenKind::Dir(DirKind::Word));
        assert_eq!(lines[2][0], TokenKind::Dir(DirKind::Byte));
        assert_eq!(lines[3][0], TokenKind::Dir(DirKind::Ascii));
        assert!(tokenize(".fill 3").is_err());
    }

    #[test]
    fn unknown_token() {
        assert!(tokenize("add R0, R1, @").is_err());
    }
}
