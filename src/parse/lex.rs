//! Tokenizing MIPS assembly.
//!
//! This module holds the tokens that characterize MIPS assembly ([`Token`]).
//! This module is used by the parser to facilitate the conversion of
//! assembly source code into an AST.
//!
//! The module's key data structure is the [`Token`] enum,
//! which lists all of the tokens of MIPS assembly.

use std::num::IntErrorKind;

use logos::{Lexer, Logos};

use crate::ast::Reg;

/// A unit of information in MIPS source code.
#[derive(Debug, Logos, PartialEq, Eq, Clone)]
#[logos(skip r"[ \t\r]+", error = LexErr)]
pub enum Token {
    // Note, these regexes span over tokens that are technically invalid
    // (e.g., 23trst matches for an integer even though it shouldn't).
    // This is intended.
    // These regexes collect what would be considered one discernable unit
    // and validates it using the validator function.

    /// A numeric value (e.g., `9`, `-14`, `0x7F`, `0b101`, `'a'`).
    ///
    /// Integer literals must fit in 32 bits, either as a signed or as an unsigned word.
    #[regex(r"-?\d\w*", lex_int)]
    #[regex(r"'([^'\\\n]|\\.)'", lex_char)]
    Int(i64),

    /// A register (e.g., `$t0`, `$8`, `$sp`)
    #[regex(r"\$\w*", lex_reg)]
    Reg(Reg),

    /// An identifier.
    ///
    /// This can refer to either:
    /// - a label (e.g., `main`, `loop`, `end_if`)
    /// - an instruction mnemonic (e.g. `add`, `lw`, `li`)
    #[regex(r"[A-Za-z_][\w.]*", |lx| lx.slice().to_string())]
    Ident(String),

    /// A directive (e.g., `.text`, `.word`).
    ///
    /// The name is stored in lowercase, without the leading dot.
    #[regex(r"\.[A-Za-z_]\w*", |lx| lx.slice()[1..].to_lowercase())]
    Directive(String),

    /// A string literal (e.g., `"Hello!"`)
    #[token(r#"""#, lex_str_literal)]
    String(String),

    /// A colon, which appears after labels
    #[token(":")]
    Colon,

    /// A comma, which delineate operands of an instruction
    #[token(",")]
    Comma,

    /// An opening parenthesis (of a base register)
    #[token("(")]
    LParen,

    /// A closing parenthesis (of a base register)
    #[token(")")]
    RParen,

    /// A plus sign (in `label+4`)
    #[token("+")]
    Plus,

    /// A minus sign (in `label - 4`)
    #[token("-")]
    Minus,

    /// A comment, which starts with a hash and spans the remaining part of the line.
    #[regex(r"#.*")]
    Comment,

    /// A new line
    #[regex(r"\n")]
    NewLine
}

/// Any errors raised in attempting to tokenize an input stream.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum LexErr {
    /// Numeric literal cannot fit within a 32-bit word
    DoesNotFitWord,
    /// Numeric literal could not be parsed as a decimal literal because it has invalid digits (i.e., not 0-9)
    InvalidNumeric,
    /// Hex literal (starting with 0x) has invalid hex digits
    InvalidHex,
    /// Binary literal (starting with 0b) has invalid binary digits
    InvalidBin,
    /// Hex literal (starting with 0x) doesn't have digits after it.
    InvalidHexEmpty,
    /// Binary literal (starting with 0b) doesn't have digits after it.
    InvalidBinEmpty,
    /// Int parsing failed but the reason why is unknown
    UnknownIntErr,
    /// String literal is missing an end quotation mark.
    UnclosedStrLit,
    /// Character literal has an unknown escape.
    InvalidCharLit,
    /// Token had the format $name, but name isn't a register.
    InvalidReg,
    /// A symbol was used which is not allowed in MIPS assembly files
    #[default]
    InvalidSymbol
}
impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErr::DoesNotFitWord  => f.write_str("numeric token does not fit 32-bit word"),
            LexErr::InvalidNumeric  => f.write_str("invalid decimal literal"),
            LexErr::InvalidHex      => f.write_str("invalid hex literal"),
            LexErr::InvalidBin      => f.write_str("invalid binary literal"),
            LexErr::InvalidHexEmpty => f.write_str("invalid hex literal"),
            LexErr::InvalidBinEmpty => f.write_str("invalid binary literal"),
            LexErr::UnknownIntErr   => f.write_str("could not parse integer"),
            LexErr::UnclosedStrLit  => f.write_str("unclosed string literal"),
            LexErr::InvalidCharLit  => f.write_str("invalid character literal"),
            LexErr::InvalidReg      => f.write_str("invalid register"),
            LexErr::InvalidSymbol   => f.write_str("unrecognized symbol"),
        }
    }
}
impl std::error::Error for LexErr {}
impl crate::err::Error for LexErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LexErr::DoesNotFitWord   => Some(format!("the range for a word is [{}, {}]", i32::MIN, u32::MAX).into()),
            LexErr::InvalidNumeric   => Some("a decimal literal only consists of digits 0-9".into()),
            LexErr::InvalidHex       => Some("a hex literal starts with '0x' and consists of 0-9, A-F".into()),
            LexErr::InvalidBin       => Some("a binary literal starts with '0b' and consists of 0-1".into()),
            LexErr::InvalidHexEmpty  => Some("there should be hex digits (0-9, A-F) here".into()),
            LexErr::InvalidBinEmpty  => Some("there should be binary digits (0-1) here".into()),
            LexErr::UnknownIntErr    => None,
            LexErr::UnclosedStrLit   => Some("add a quote to the end of the string literal".into()),
            LexErr::InvalidCharLit   => Some("valid escapes are \\n, \\r, \\t, \\0, \\\\, \\', and \\\"".into()),
            LexErr::InvalidReg       => Some("this must be $0-$31 or a register name such as $t0 (floating point registers are not supported)".into()),
            LexErr::InvalidSymbol    => Some("this char does not occur in any token in MIPS assembly".into()),
        }
    }
}
/// Helper that converts an int error kind to its corresponding LexErr, based on the provided inputs.
fn convert_int_error(
    e: &std::num::IntErrorKind,
    invalid_digits_err: LexErr,
    empty_err: LexErr,
) -> LexErr {
    match e {
        IntErrorKind::Empty        => empty_err,
        IntErrorKind::InvalidDigit => invalid_digits_err,
        IntErrorKind::PosOverflow  => LexErr::DoesNotFitWord,
        IntErrorKind::NegOverflow  => LexErr::DoesNotFitWord,
        _ => LexErr::UnknownIntErr,
    }
}
fn lex_int(lx: &Lexer<'_, Token>) -> Result<i64, LexErr> {
    let slice = lx.slice();
    let (negative, digits) = match slice.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, slice),
    };

    let (radix, body, invalid_err, empty_err) = match digits.get(..2) {
        Some("0x" | "0X") => (16, &digits[2..], LexErr::InvalidHex, LexErr::InvalidHexEmpty),
        Some("0b" | "0B") => (2, &digits[2..], LexErr::InvalidBin, LexErr::InvalidBinEmpty),
        _ => (10, digits, LexErr::InvalidNumeric, LexErr::InvalidNumeric),
    };

    let magnitude = u64::from_str_radix(body, radix)
        .map_err(|e| convert_int_error(e.kind(), invalid_err, empty_err))?;

    match negative {
        true if magnitude <= 1 << 31 => Ok(-(magnitude as i64)),
        false if magnitude <= u64::from(u32::MAX) => Ok(magnitude as i64),
        _ => Err(LexErr::DoesNotFitWord)
    }
}
/// Maps the character after a backslash to the character it escapes.
fn unescape(c: char) -> Option<char> {
    match c {
        'n'  => Some('\n'),
        'r'  => Some('\r'),
        't'  => Some('\t'),
        '0'  => Some('\0'),
        '\\' => Some('\\'),
        '\'' => Some('\''),
        '"'  => Some('"'),
        _ => None
    }
}
fn lex_char(lx: &Lexer<'_, Token>) -> Result<i64, LexErr> {
    let slice = lx.slice();
    let inner = &slice[1..(slice.len() - 1)];

    let c = match inner.strip_prefix('\\') {
        Some(esc) => esc.chars().next().and_then(unescape),
        None => inner.chars().next(),
    };
    c.map(|c| i64::from(u32::from(c)))
        .ok_or(LexErr::InvalidCharLit)
}
fn lex_reg(lx: &Lexer<'_, Token>) -> Result<Reg, LexErr> {
    Reg::from_name(&lx.slice()[1..])
        .ok_or(LexErr::InvalidReg)
}
fn lex_str_literal(lx: &mut Lexer<'_, Token>) -> Result<String, LexErr> {
    let rem = lx.remainder();
    let mut buf = String::new();

    let mut chars = rem.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                // consume up to and including the closing quote
                lx.bump(i + 1);
                return Ok(buf);
            },
            '\n' => break,
            '\\' => match chars.next() {
                Some((_, '\n')) | None => break,
                Some((_, e)) => match unescape(e) {
                    Some(u) => buf.push(u),
                    None => {
                        buf.push('\\');
                        buf.push(e);
                    }
                }
            },
            c => buf.push(c)
        }
    }

    // unclosed, so consume the rest of the line
    lx.bump(rem.find('\n').unwrap_or(rem.len()));
    Err(LexErr::UnclosedStrLit)
}

#[cfg(test)]
mod tests {
    use logos::Logos;

    use crate::ast::reg_consts::{FP, RA, SP, T0, ZERO};
    use crate::ast::Reg;
    use crate::err::LexErr;
    use crate::parse::lex::Token;

    fn ident(s: &str) -> Token {
        Token::Ident(s.to_string())
    }
    fn directive(s: &str) -> Token {
        Token::Directive(s.to_string())
    }
    fn str_literal(s: &str) -> Token {
        Token::String(s.to_string())
    }

    #[test]
    fn test_numeric_success() {
        let mut tokens = Token::lexer("0 123 456 -789 0x7F 0XAbCd 0b1011 -0x10 08");
        assert_eq!(tokens.next(), Some(Ok(Token::Int(0))));
        assert_eq!(tokens.next(), Some(Ok(Token::Int(123))));
        assert_eq!(tokens.next(), Some(Ok(Token::Int(456))));
        assert_eq!(tokens.next(), Some(Ok(Token::Int(-789))));
        assert_eq!(tokens.next(), Some(Ok(Token::Int(0x7F))));
        assert_eq!(tokens.next(), Some(Ok(Token::Int(0xABCD))));
        assert_eq!(tokens.next(), Some(Ok(Token::Int(0b1011))));
        assert_eq!(tokens.next(), Some(Ok(Token::Int(-0x10))));
        assert_eq!(tokens.next(), Some(Ok(Token::Int(8))));
        assert_eq!(tokens.next(), None);
    }

    #[test]
    fn test_numeric_overflow() {
        let mut tokens = Token::lexer("4294967295 0xFFFFFFFF -2147483648 -0x80000000");
        assert_eq!(tokens.next(), Some(Ok(Token::Int(4294967295))));
        assert_eq!(tokens.next(), Some(Ok(Token::Int(0xFFFF_FFFF))));
        assert_eq!(tokens.next(), Some(Ok(Token::Int(-2147483648))));
        assert_eq!(tokens.next(), Some(Ok(Token::Int(-0x8000_0000))));
        assert_eq!(tokens.next(), None);

        assert_eq!(Token::lexer("4294967296").next(), Some(Err(LexErr::DoesNotFitWord)));
        assert_eq!(Token::lexer("0x100000000").next(), Some(Err(LexErr::DoesNotFitWord)));
        assert_eq!(Token::lexer("-2147483649").next(), Some(Err(LexErr::DoesNotFitWord)));
        assert_eq!(Token::lexer("999999999999999999999999999999").next(), Some(Err(LexErr::DoesNotFitWord)));
    }

    #[test]
    fn test_numeric_invalid() {
        assert_eq!(Token::lexer("3Q").next(), Some(Err(LexErr::InvalidNumeric)));
        assert_eq!(Token::lexer("0xQ").next(), Some(Err(LexErr::InvalidHex)));
        assert_eq!(Token::lexer("0b2").next(), Some(Err(LexErr::InvalidBin)));
        assert_eq!(Token::lexer("0x").next(), Some(Err(LexErr::InvalidHexEmpty)));
        assert_eq!(Token::lexer("0b").next(), Some(Err(LexErr::InvalidBinEmpty)));
    }

    #[test]
    fn test_char_literals() {
        let mut tokens = Token::lexer(r"'a' 'Z' ' ' '\n' '\0' '\''");
        assert_eq!(tokens.next(), Some(Ok(Token::Int(97))));
        assert_eq!(tokens.next(), Some(Ok(Token::Int(90))));
        assert_eq!(tokens.next(), Some(Ok(Token::Int(32))));
        assert_eq!(tokens.next(), Some(Ok(Token::Int(10))));
        assert_eq!(tokens.next(), Some(Ok(Token::Int(0))));
        assert_eq!(tokens.next(), Some(Ok(Token::Int(39))));
        assert_eq!(tokens.next(), None);

        assert_eq!(Token::lexer(r"'\q'").next(), Some(Err(LexErr::InvalidCharLit)));
    }

    #[test]
    fn test_regs() {
        let mut tokens = Token::lexer("$0 $zero $8 $t0 $sp $29 $fp $s8 $ra");
        assert_eq!(tokens.next(), Some(Ok(Token::Reg(ZERO))));
        assert_eq!(tokens.next(), Some(Ok(Token::Reg(ZERO))));
        assert_eq!(tokens.next(), Some(Ok(Token::Reg(T0))));
        assert_eq!(tokens.next(), Some(Ok(Token::Reg(T0))));
        assert_eq!(tokens.next(), Some(Ok(Token::Reg(SP))));
        assert_eq!(tokens.next(), Some(Ok(Token::Reg(SP))));
        assert_eq!(tokens.next(), Some(Ok(Token::Reg(FP))));
        assert_eq!(tokens.next(), Some(Ok(Token::Reg(FP))));
        assert_eq!(tokens.next(), Some(Ok(Token::Reg(RA))));
        assert_eq!(tokens.next(), None);

        for n in 0..32 {
            let reg = Reg::try_from(n).unwrap();
            assert_eq!(Token::lexer(&format!("${n}")).next(), Some(Ok(Token::Reg(reg))));
        }

        assert_eq!(Token::lexer("$32").next(), Some(Err(LexErr::InvalidReg)));
        assert_eq!(Token::lexer("$f0").next(), Some(Err(LexErr::InvalidReg)));
        assert_eq!(Token::lexer("$").next(), Some(Err(LexErr::InvalidReg)));
        assert_eq!(Token::lexer("$t10").next(), Some(Err(LexErr::InvalidReg)));
    }

    #[test]
    fn test_str() {
        let mut tokens = Token::lexer(r#" " " "abc" "" "!@$%^&*()" "#);
        assert_eq!(tokens.next(), Some(Ok(str_literal(" "))));
        assert_eq!(tokens.next(), Some(Ok(str_literal("abc"))));
        assert_eq!(tokens.next(), Some(Ok(str_literal(""))));
        assert_eq!(tokens.next(), Some(Ok(str_literal("!@$%^&*()"))));
        assert_eq!(tokens.next(), None);

        // the comment character is part of the string
        let mut tokens = Token::lexer(r##""# not a comment" # a comment"##);
        assert_eq!(tokens.next(), Some(Ok(str_literal("# not a comment"))));
        assert_eq!(tokens.next(), Some(Ok(Token::Comment)));
        assert_eq!(tokens.next(), None);
    }

    #[test]
    fn test_str_escape() {
        let mut tokens = Token::lexer(r#" "\n" "\r" "\t" "\\" "\"" "\0" "\e" "a\"b" "#);
        assert_eq!(tokens.next(), Some(Ok(str_literal("\n"))));
        assert_eq!(tokens.next(), Some(Ok(str_literal("\r"))));
        assert_eq!(tokens.next(), Some(Ok(str_literal("\t"))));
        assert_eq!(tokens.next(), Some(Ok(str_literal("\\"))));
        assert_eq!(tokens.next(), Some(Ok(str_literal("\""))));
        assert_eq!(tokens.next(), Some(Ok(str_literal("\0"))));
        assert_eq!(tokens.next(), Some(Ok(str_literal("\\e"))));
        assert_eq!(tokens.next(), Some(Ok(str_literal("a\"b"))));
        assert_eq!(tokens.next(), None);
    }

    #[test]
    fn test_str_unclosed() {
        assert_eq!(Token::lexer(r#"""#).next(), Some(Err(LexErr::UnclosedStrLit)));
        assert_eq!(Token::lexer(r#""abc\""#).next(), Some(Err(LexErr::UnclosedStrLit)));

        let mut tokens = Token::lexer("\"abc\nxyz");
        assert_eq!(tokens.next(), Some(Err(LexErr::UnclosedStrLit)));
        assert_eq!(tokens.next(), Some(Ok(Token::NewLine)));
        assert_eq!(tokens.next(), Some(Ok(ident("xyz"))));
    }

    #[test]
    fn test_idents() {
        let mut tokens = Token::lexer("add ADD main loop_1 _start a.b");
        assert_eq!(tokens.next(), Some(Ok(ident("add"))));
        assert_eq!(tokens.next(), Some(Ok(ident("ADD"))));
        assert_eq!(tokens.next(), Some(Ok(ident("main"))));
        assert_eq!(tokens.next(), Some(Ok(ident("loop_1"))));
        assert_eq!(tokens.next(), Some(Ok(ident("_start"))));
        assert_eq!(tokens.next(), Some(Ok(ident("a.b"))));
        assert_eq!(tokens.next(), None);

        // an addend is lexed as a separate integer
        let mut tokens = Token::lexer("arr-4 arr+4 arr - 4");
        assert_eq!(tokens.next(), Some(Ok(ident("arr"))));
        assert_eq!(tokens.next(), Some(Ok(Token::Int(-4))));
        assert_eq!(tokens.next(), Some(Ok(ident("arr"))));
        assert_eq!(tokens.next(), Some(Ok(Token::Plus)));
        assert_eq!(tokens.next(), Some(Ok(Token::Int(4))));
        assert_eq!(tokens.next(), Some(Ok(ident("arr"))));
        assert_eq!(tokens.next(), Some(Ok(Token::Minus)));
        assert_eq!(tokens.next(), Some(Ok(Token::Int(4))));
        assert_eq!(tokens.next(), None);
    }

    #[test]
    fn test_directive() {
        let mut tokens = Token::lexer(".text .DATA .asciiz ._");
        assert_eq!(tokens.next(), Some(Ok(directive("text"))));
        assert_eq!(tokens.next(), Some(Ok(directive("data"))));
        assert_eq!(tokens.next(), Some(Ok(directive("asciiz"))));
        assert_eq!(tokens.next(), Some(Ok(directive("_"))));
        assert_eq!(tokens.next(), None);
    }

    #[test]
    fn test_punct() {
        let mut tokens = Token::lexer("main: lw $t0, -4($sp) # comment, with (punct)\n");
        assert_eq!(tokens.next(), Some(Ok(ident("main"))));
        assert_eq!(tokens.next(), Some(Ok(Token::Colon)));
        assert_eq!(tokens.next(), Some(Ok(ident("lw"))));
        assert_eq!(tokens.next(), Some(Ok(Token::Reg(T0))));
        assert_eq!(tokens.next(), Some(Ok(Token::Comma)));
        assert_eq!(tokens.next(), Some(Ok(Token::Int(-4))));
        assert_eq!(tokens.next(), Some(Ok(Token::LParen)));
        assert_eq!(tokens.next(), Some(Ok(Token::Reg(SP))));
        assert_eq!(tokens.next(), Some(Ok(Token::RParen)));
        assert_eq!(tokens.next(), Some(Ok(Token::Comment)));
        assert_eq!(tokens.next(), Some(Ok(Token::NewLine)));
        assert_eq!(tokens.next(), None);
    }

    #[test]
    fn test_invalid_symbol() {
        for c in "@!%&*;<=>?[]^`{|}~/\\".chars() {
            let string = c.to_string();
            assert_eq!(
                Token::lexer(&string).next(),
                Some(Err(LexErr::InvalidSymbol)),
                "Expected {string:?} to be an invalid symbol"
            );
        }
    }
}
