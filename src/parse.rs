//! Parsing assembly source code into an AST.
//!
//! This module is used to convert strings (which represent assembly source code)
//! into abstract syntax trees (`Vec<`[`Stmt`]`>`).
//!
//! Source code is parsed one line at a time. A line that fails to parse
//! produces a [`ParseErr`] and parsing continues with the next line,
//! so every syntax error of a file is reported at once.
//!
//! # Example
//! ```
//! use mips_ensemble::parse::parse_source;
//!
//! let src = "
//!     .text
//!     main: addi $t0, $zero, 5
//!           li $v0, 10
//!           syscall
//! ";
//! let ast = parse_source(src).unwrap();
//! assert_eq!(ast.len(), 4);
//! ```
//!
//! [`Stmt`]: crate::ast::asm::Stmt
pub mod lex;

use std::borrow::Cow;
use std::collections::HashMap;
use std::ops::Range;

use logos::Logos;

use crate::asm::pseudo;
use crate::ast::asm::{AsmInstr, DataItem, DataValue, Directive, Operand, Stmt, StmtKind};
use crate::ast::sim::Op;
use crate::ast::{Label, Reg};
use lex::{LexErr, Token};

/// Kinds of errors that can occur while parsing a line.
///
/// See [`ParseErr`] for this error type with location information included.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum ParseErrKind {
    /// A token could not be lexed.
    Lex(LexErr),
    /// A token appeared where it is not allowed.
    UnexpectedToken {
        /// A description of the token that was found.
        found: String,
        /// A description of what was expected instead.
        expected: &'static str
    },
    /// The line ended early.
    UnexpectedEol {
        /// A description of what was expected.
        expected: &'static str
    },
    /// A directive with this name does not exist.
    UnknownDirective(String),
    /// A directive with this name exists but is not supported.
    UnsupportedDirective(String),
    /// An instruction with this mnemonic does not exist.
    UnknownMnemonic(String),
    /// A directive argument has the right type but an invalid value.
    InvalidArgument {
        /// A description of the valid values.
        expected: &'static str
    },
    /// An `.eqv` directive is malformed.
    InvalidEqv,
}
impl std::fmt::Display for ParseErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseErrKind::Lex(e) => e.fmt(f),
            ParseErrKind::UnexpectedToken { found, expected } => write!(f, "unexpected {found}, expected {expected}"),
            ParseErrKind::UnexpectedEol { expected } => write!(f, "unexpected end of line, expected {expected}"),
            ParseErrKind::UnknownDirective(d) => write!(f, "unknown directive .{d}"),
            ParseErrKind::UnsupportedDirective(d) => write!(f, "unsupported directive .{d}"),
            ParseErrKind::UnknownMnemonic(m) => write!(f, "unknown instruction '{m}'"),
            ParseErrKind::InvalidArgument { expected } => write!(f, "invalid argument, expected {expected}"),
            ParseErrKind::InvalidEqv => f.write_str("invalid .eqv definition"),
        }
    }
}
impl ParseErrKind {
    pub(crate) fn help(&self) -> Option<Cow<str>> {
        use crate::err::Error as _;

        match self {
            ParseErrKind::Lex(e) => e.help(),
            ParseErrKind::UnexpectedToken { .. } => None,
            ParseErrKind::UnexpectedEol { .. } => None,
            ParseErrKind::UnknownDirective(_) => Some("see the list of supported directives, such as .text, .data, .word, .asciiz".into()),
            ParseErrKind::UnsupportedDirective(d) => match &**d {
                "float" | "double" => Some("floating point is not supported by this simulator".into()),
                _ => Some("macros and file inclusion are not supported; assemble multiple files instead".into()),
            },
            ParseErrKind::UnknownMnemonic(m) if m.contains('.') => Some("floating point instructions are not supported".into()),
            ParseErrKind::UnknownMnemonic(_) => None,
            ParseErrKind::InvalidArgument { .. } => None,
            ParseErrKind::InvalidEqv => Some("an .eqv directive has the form `.eqv NAME value`".into()),
        }
    }
}

/// Error from parsing a line of assembly source code.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct ParseErr {
    /// The kind of error.
    pub kind: ParseErrKind,
    /// The 1-based line number the error occurred on.
    pub line: usize,
    /// The span (in the line) associated with this error.
    pub span: Range<usize>,
}
impl ParseErr {
    fn new(kind: ParseErrKind, span: Range<usize>) -> Self {
        // line is filled in once the line number is known
        ParseErr { kind, line: 0, span }
    }
}
impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}
impl std::error::Error for ParseErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ParseErrKind::Lex(e) => Some(e),
            _ => None
        }
    }
}
impl crate::err::Error for ParseErr {
    fn span(&self) -> Option<crate::err::ErrSpan> {
        Some(self.span.clone().into())
    }

    fn help(&self) -> Option<Cow<str>> {
        self.kind.help()
    }
}

/// Parses a full assembly source file into a list of statements.
///
/// Lines which hold neither a label, an instruction, nor a directive
/// (e.g., blank lines and comments) do not produce a statement.
///
/// If any line fails to parse, this returns every error found in the file.
pub fn parse_source(src: &str) -> Result<Vec<Stmt>, Vec<ParseErr>> {
    let (stmts, errors) = parse_lines(src);
    match errors.is_empty() {
        true  => Ok(stmts),
        false => Err(errors),
    }
}

/// Parses a full assembly source file, returning the statements of all lines that
/// successfully parsed and the errors of all lines that did not.
pub(crate) fn parse_lines(src: &str) -> (Vec<Stmt>, Vec<ParseErr>) {
    let mut parser = Parser::default();
    let mut stmts = vec![];
    let mut errors = vec![];

    for (i, line) in src.lines().enumerate() {
        match parser.parse_line(line, i + 1) {
            Ok(Some(stmt)) => stmts.push(stmt),
            Ok(None) => {},
            Err(e) => errors.push(e),
        }
    }

    (stmts, errors)
}

/// Parses a single line of assembly source code.
///
/// This does not have access to `.eqv` definitions from other lines.
/// Use [`parse_source`] to parse a full file.
///
/// ```
/// use mips_ensemble::parse::parse_line;
/// use mips_ensemble::ast::asm::{Operand, StmtKind};
/// use mips_ensemble::ast::reg_consts::{T0, SP};
///
/// let stmt = parse_line("loop: lw $t0, 4($sp)  # load", 1).unwrap().unwrap();
/// assert_eq!(stmt.labels[0].name, "loop");
///
/// let Some(StmtKind::Instr(instr)) = stmt.kind else { unreachable!() };
/// assert_eq!(instr.mnemonic, "lw");
/// assert_eq!(instr.operands, [
///     Operand::Reg(T0),
///     Operand::Addr { label: None, offset: 4, base: SP },
/// ]);
///
/// assert!(parse_line("   # comment only", 2).unwrap().is_none());
/// ```
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<Stmt>, ParseErr> {
    Parser::default().parse_line(line, line_no)
}

/// Parser state which persists across lines of a file.
#[derive(Default)]
struct Parser {
    /// Textual constants defined by `.eqv`.
    eqvs: HashMap<String, Vec<Token>>
}
impl Parser {
    fn parse_line(&mut self, line: &str, line_no: usize) -> Result<Option<Stmt>, ParseErr> {
        self.parse_line_inner(line, line_no)
            .map_err(|mut e| {
                e.line = line_no;
                e
            })
    }

    fn parse_line_inner(&mut self, line: &str, line_no: usize) -> Result<Option<Stmt>, ParseErr> {
        let (tokens, lex_err) = self.lex_line(line);
        let mut cursor = Cursor { tokens: &tokens, index: 0, line_len: line.len() };

        let mut labels = vec![];
        while let [(Token::Ident(name), span), (Token::Colon, _), ..] = cursor.rest() {
            labels.push(Label::new(name.clone(), span.clone()));
            cursor.index += 2;
        }

        if let Some(err) = lex_err {
            // an unknown mnemonic takes precedence over errors in its operands
            if let Some((Token::Ident(_), _)) = cursor.peek() {
                cursor.parse_mnemonic()?;
            }
            return Err(err);
        }

        let Some((token, span)) = cursor.peek() else {
            return Ok((!labels.is_empty()).then(|| Stmt { line: line_no, labels, kind: None, span: line.len()..line.len() }));
        };
        let start = span.start;

        let kind = match token {
            Token::Directive(d) if d == "eqv" => {
                cursor.advance();
                self.define_eqv(&mut cursor)?;
                None
            },
            Token::Directive(_) => Some(StmtKind::Directive(cursor.parse_directive()?)),
            Token::Ident(_) => Some(StmtKind::Instr(cursor.parse_instr()?)),
            _ => return Err(cursor.unexpected("instruction, directive, or label")),
        };

        if let Some((_, span)) = cursor.peek() {
            let span = span.clone();
            return Err(cursor.unexpected_at("end of line", span));
        }

        let end = cursor.last_end().max(start);
        match (kind, labels.is_empty()) {
            (None, true) => Ok(None),
            (kind, _) => Ok(Some(Stmt { line: line_no, labels, kind, span: start..end })),
        }
    }

    /// Lexes a line, dropping comments and substituting `.eqv` definitions.
    ///
    /// Lexing stops at the first invalid token, which is returned alongside the tokens before it.
    fn lex_line(&self, line: &str) -> (Vec<(Token, Range<usize>)>, Option<ParseErr>) {
        let mut tokens = vec![];
        let mut defining_eqv = false;

        for (result, span) in Token::lexer(line).spanned() {
            let token = match result {
                Ok(token) => token,
                Err(e) => return (tokens, Some(ParseErr::new(ParseErrKind::Lex(e), span))),
            };
            if matches!(token, Token::Comment | Token::NewLine) { continue; }

            let replacement = match &token {
                // the name being defined is never substituted
                Token::Ident(name) if !defining_eqv => self.eqvs.get(name),
                _ => None
            };
            defining_eqv = matches!(&token, Token::Directive(d) if d == "eqv");

            match replacement {
                Some(r) => tokens.extend(r.iter().map(|t| (t.clone(), span.clone()))),
                None => tokens.push((token, span)),
            }
        }

        (tokens, None)
    }

    fn define_eqv(&mut self, cursor: &mut Cursor<'_>) -> Result<(), ParseErr> {
        let Some((Token::Ident(name), span)) = cursor.advance() else {
            return Err(ParseErr::new(ParseErrKind::InvalidEqv, cursor.here()));
        };
        let (name, span) = (name.clone(), span.clone());

        let value: Vec<_> = cursor.rest().iter().map(|(t, _)| t.clone()).collect();
        if value.is_empty() {
            return Err(ParseErr::new(ParseErrKind::InvalidEqv, span));
        }
        cursor.index = cursor.tokens.len();

        self.eqvs.insert(name, value);
        Ok(())
    }
}

/// A position in the token list of one line.
struct Cursor<'t> {
    tokens: &'t [(Token, Range<usize>)],
    index: usize,
    line_len: usize,
}
impl<'t> Cursor<'t> {
    fn rest(&self) -> &'t [(Token, Range<usize>)] {
        &self.tokens[self.index..]
    }
    fn peek(&self) -> Option<&'t (Token, Range<usize>)> {
        self.tokens.get(self.index)
    }
    fn peek_token(&self) -> Option<&'t Token> {
        self.peek().map(|(t, _)| t)
    }
    fn advance(&mut self) -> Option<&'t (Token, Range<usize>)> {
        let next = self.tokens.get(self.index)?;
        self.index += 1;
        Some(next)
    }
    /// Consumes the next token if it matches.
    fn eat(&mut self, token: &Token) -> bool {
        let matched = self.peek_token() == Some(token);
        if matched { self.index += 1; }
        matched
    }
    /// The span of the next token (or the end of line).
    fn here(&self) -> Range<usize> {
        match self.peek() {
            Some((_, span)) => span.clone(),
            None => self.line_len..self.line_len,
        }
    }
    /// The end of the last consumed token.
    fn last_end(&self) -> usize {
        self.index.checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |(_, span)| span.end)
    }

    fn unexpected(&self, expected: &'static str) -> ParseErr {
        self.unexpected_at(expected, self.here())
    }
    fn unexpected_at(&self, expected: &'static str, span: Range<usize>) -> ParseErr {
        let kind = match self.tokens.iter().find(|(_, s)| *s == span) {
            Some((token, _)) => ParseErrKind::UnexpectedToken { found: describe(token), expected },
            None => ParseErrKind::UnexpectedEol { expected },
        };
        ParseErr::new(kind, span)
    }

    fn expect_reg(&mut self) -> Result<Reg, ParseErr> {
        match self.peek_token() {
            Some(&Token::Reg(r)) => {
                self.index += 1;
                Ok(r)
            },
            _ => Err(self.unexpected("register")),
        }
    }
    fn expect_int(&mut self, expected: &'static str) -> Result<(i64, Range<usize>), ParseErr> {
        match self.peek() {
            Some((Token::Int(n), span)) => {
                self.index += 1;
                Ok((*n, span.clone()))
            },
            _ => Err(self.unexpected(expected)),
        }
    }
    fn expect_label(&mut self) -> Result<Label, ParseErr> {
        match self.peek() {
            Some((Token::Ident(name), span)) => {
                self.index += 1;
                Ok(Label::new(name.clone(), span.clone()))
            },
            _ => Err(self.unexpected("label")),
        }
    }
    fn expect_u32(&mut self, expected: &'static str) -> Result<u32, ParseErr> {
        let (n, span) = self.expect_int(expected)?;
        u32::try_from(n).map_err(|_| ParseErr::new(ParseErrKind::InvalidArgument { expected }, span))
    }
    /// Parses the `(base)` part of an address operand. The `(` has already been consumed.
    fn finish_base(&mut self) -> Result<Reg, ParseErr> {
        let base = self.expect_reg()?;
        match self.eat(&Token::RParen) {
            true  => Ok(base),
            false => Err(self.unexpected("')'")),
        }
    }
    /// Parses an optional addend after a label (`+4`, `-4`).
    fn parse_addend(&mut self) -> Result<i64, ParseErr> {
        match self.peek_token() {
            Some(Token::Plus) => {
                self.index += 1;
                Ok(self.expect_int("integer")?.0)
            },
            Some(Token::Minus) => {
                self.index += 1;
                Ok(-self.expect_int("integer")?.0)
            },
            // `label-4` lexes as a label followed by a negative integer
            Some(&Token::Int(n)) if n < 0 => {
                self.index += 1;
                Ok(n)
            },
            _ => Ok(0),
        }
    }

    /// Parses an instruction's mnemonic, checking that the instruction exists.
    fn parse_mnemonic(&mut self) -> Result<String, ParseErr> {
        let Some((Token::Ident(name), span)) = self.advance() else {
            return Err(self.unexpected("instruction"));
        };
        let mnemonic = name.to_lowercase();
        if Op::from_mnemonic(&mnemonic).is_none() && mnemonic != "nop" && !pseudo::is_pseudo(&mnemonic) {
            return Err(ParseErr::new(ParseErrKind::UnknownMnemonic(mnemonic), span.clone()));
        }
        Ok(mnemonic)
    }

    fn parse_instr(&mut self) -> Result<AsmInstr, ParseErr> {
        let mnemonic = self.parse_mnemonic()?;

        let mut operands = vec![];
        while self.peek().is_some() {
            operands.push(self.parse_operand()?);
            // commas between operands are optional
            self.eat(&Token::Comma);
        }

        Ok(AsmInstr { mnemonic, operands })
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseErr> {
        let Some((token, span)) = self.peek() else {
            return Err(self.unexpected("operand"));
        };

        match token {
            &Token::Reg(r) => {
                self.index += 1;
                Ok(Operand::Reg(r))
            },
            &Token::Int(n) => {
                self.index += 1;
                match self.eat(&Token::LParen) {
                    true  => Ok(Operand::Addr { label: None, offset: n, base: self.finish_base()? }),
                    false => Ok(Operand::Imm(n)),
                }
            },
            Token::Minus => {
                self.index += 1;
                let (n, _) = self.expect_int("integer")?;
                Ok(Operand::Imm(-n))
            },
            Token::LParen => {
                self.index += 1;
                Ok(Operand::Addr { label: None, offset: 0, base: self.finish_base()? })
            },
            Token::Ident(name) => {
                self.index += 1;
                let label = Label::new(name.clone(), span.clone());
                let addend = self.parse_addend()?;
                match self.eat(&Token::LParen) {
                    true  => Ok(Operand::Addr { label: Some(label), offset: addend, base: self.finish_base()? }),
                    false => Ok(Operand::Label { label, addend }),
                }
            },
            _ => Err(self.unexpected("operand")),
        }
    }

    fn parse_directive(&mut self) -> Result<Directive, ParseErr> {
        let Some((Token::Directive(name), span)) = self.advance() else {
            return Err(self.unexpected("directive"));
        };

        let directive = match &**name {
            "text"  => Directive::Text(self.parse_opt_addr()?),
            "data"  => Directive::Data(self.parse_opt_addr()?),
            "ktext" => Directive::KText(self.parse_opt_addr()?),
            "kdata" => Directive::KData(self.parse_opt_addr()?),
            "word"  => Directive::Word(self.parse_data_values(true)?),
            "half"  => Directive::Half(self.parse_data_values(false)?),
            "byte"  => Directive::Byte(self.parse_data_values(false)?),
            "ascii"  => Directive::Ascii(self.parse_string()?),
            "asciiz" => Directive::Asciiz(self.parse_string()?),
            "space" => Directive::Space(self.expect_u32("a non-negative byte count")?),
            "align" => {
                let (n, span) = self.expect_int("an alignment between 0 and 3")?;
                match n {
                    0..=3 => Directive::Align(n as u32),
                    _ => return Err(ParseErr::new(ParseErrKind::InvalidArgument { expected: "an alignment between 0 and 3" }, span)),
                }
            },
            "globl" | "global" => {
                let mut labels = vec![self.expect_label()?];
                while self.peek().is_some() {
                    self.eat(&Token::Comma);
                    labels.push(self.expect_label()?);
                }
                Directive::Globl(labels)
            },
            "extern" => {
                let label = self.expect_label()?;
                self.eat(&Token::Comma);
                let (size, span) = self.expect_int("a positive size")?;
                match u32::try_from(size) {
                    Ok(size) if size > 0 => Directive::Extern(label, size),
                    _ => return Err(ParseErr::new(ParseErrKind::InvalidArgument { expected: "a positive size" }, span)),
                }
            },
            "set" => {
                let option = match self.advance() {
                    Some((Token::Ident(opt), _)) => opt.clone(),
                    _ => String::new(),
                };
                // remaining options are ignored along with the directive
                self.index = self.tokens.len();
                Directive::Set(option)
            },
            "float" | "double" | "macro" | "end_macro" | "include" => {
                return Err(ParseErr::new(ParseErrKind::UnsupportedDirective(name.clone()), span.clone()));
            },
            _ => return Err(ParseErr::new(ParseErrKind::UnknownDirective(name.clone()), span.clone())),
        };

        Ok(directive)
    }

    fn parse_opt_addr(&mut self) -> Result<Option<u32>, ParseErr> {
        match self.peek_token() {
            Some(Token::Int(_)) => self.expect_u32("an address").map(Some),
            _ => Ok(None),
        }
    }

    fn parse_string(&mut self) -> Result<String, ParseErr> {
        match self.peek() {
            Some((Token::String(s), _)) => {
                self.index += 1;
                Ok(s.clone())
            },
            _ => Err(self.unexpected("string literal")),
        }
    }

    /// Parses the values of `.word`, `.half`, and `.byte`.
    ///
    /// Each value can be repeated with `value:count`.
    /// Repeats are kept as counts so that their size can be checked before anything is emitted.
    fn parse_data_values(&mut self, allow_labels: bool) -> Result<Vec<DataItem>, ParseErr> {
        let mut values = vec![];

        loop {
            let value = match self.peek() {
                Some(&(Token::Int(n), _)) => {
                    self.index += 1;
                    DataValue::Int(n)
                },
                Some((Token::Ident(name), span)) if allow_labels => {
                    self.index += 1;
                    let label = Label::new(name.clone(), span.clone());
                    DataValue::Label(label, self.parse_addend()?)
                },
                _ if values.is_empty() => return Err(self.unexpected("value")),
                _ => return Err(self.unexpected("value or end of line")),
            };

            let count = match self.eat(&Token::Colon) {
                true  => self.expect_u32("a repeat count")?,
                false => 1,
            };
            values.push((value, count));

            self.eat(&Token::Comma);
            if self.peek().is_none() { break; }
        }

        Ok(values)
    }
}

/// A description of a token, used in error messages.
fn describe(token: &Token) -> String {
    match token {
        Token::Int(n)       => format!("integer {n}"),
        Token::Reg(r)       => format!("register {r}"),
        Token::Ident(s)     => format!("identifier '{s}'"),
        Token::Directive(d) => format!("directive .{d}"),
        Token::String(_)    => "string literal".to_string(),
        Token::Colon        => "':'".to_string(),
        Token::Comma        => "','".to_string(),
        Token::LParen       => "'('".to_string(),
        Token::RParen       => "')'".to_string(),
        Token::Plus         => "'+'".to_string(),
        Token::Minus        => "'-'".to_string(),
        Token::Comment      => "comment".to_string(),
        Token::NewLine      => "new line".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::asm::{AsmInstr, DataValue, Directive, Operand, Stmt, StmtKind};
    use crate::ast::reg_consts::{A0, SP, T0, T1, T2, V0, ZERO};
    use crate::ast::Label;
    use crate::err::LexErr;

    use super::{parse_line, parse_source, ParseErrKind};

    fn instr(line: &str) -> AsmInstr {
        match parse_line(line, 1) {
            Ok(Some(Stmt { kind: Some(StmtKind::Instr(instr)), .. })) => instr,
            r => panic!("expected instruction from {line:?}, got {r:?}"),
        }
    }
    fn directive(line: &str) -> Directive {
        match parse_line(line, 1) {
            Ok(Some(Stmt { kind: Some(StmtKind::Directive(d)), .. })) => d,
            r => panic!("expected directive from {line:?}, got {r:?}"),
        }
    }
    fn err_kind(line: &str) -> ParseErrKind {
        match parse_line(line, 1) {
            Err(e) => e.kind,
            Ok(r) => panic!("expected error from {line:?}, got {r:?}"),
        }
    }

    #[test]
    fn test_operands() {
        assert_eq!(instr("add $t2, $t0, $t1").operands, [Operand::Reg(T2), Operand::Reg(T0), Operand::Reg(T1)]);
        // commas are optional
        assert_eq!(instr("add $t2 $t0 $t1").operands, [Operand::Reg(T2), Operand::Reg(T0), Operand::Reg(T1)]);
        assert_eq!(instr("addi $t0, $zero, -5").operands, [Operand::Reg(T0), Operand::Reg(ZERO), Operand::Imm(-5)]);
        assert_eq!(instr("li $a0, 'x'").operands, [Operand::Reg(A0), Operand::Imm(120)]);
        assert_eq!(instr("sw $t0, -8($sp)").operands, [
            Operand::Reg(T0),
            Operand::Addr { label: None, offset: -8, base: SP }
        ]);
        assert_eq!(instr("sw $t0, ($sp)").operands, [
            Operand::Reg(T0),
            Operand::Addr { label: None, offset: 0, base: SP }
        ]);
        assert_eq!(instr("lw $t0, arr").operands, [
            Operand::Reg(T0),
            Operand::Label { label: Label::new("arr".to_string(), 8..11), addend: 0 }
        ]);
        assert_eq!(instr("lw $t0, arr+8").operands, [
            Operand::Reg(T0),
            Operand::Label { label: Label::new("arr".to_string(), 8..11), addend: 8 }
        ]);
        assert_eq!(instr("lw $t0, arr-8").operands, [
            Operand::Reg(T0),
            Operand::Label { label: Label::new("arr".to_string(), 8..11), addend: -8 }
        ]);
        assert_eq!(instr("lw $t0, arr + 8($t1)").operands, [
            Operand::Reg(T0),
            Operand::Addr { label: Some(Label::new("arr".to_string(), 8..11)), offset: 8, base: T1 }
        ]);
        assert_eq!(instr("syscall").operands, []);
        assert_eq!(instr("NOP").mnemonic, "nop");
    }

    #[test]
    fn test_labels() {
        let stmts = parse_source("start: end: li $v0, 10\nonly:\n\n# comment\n").unwrap();
        assert_eq!(stmts.len(), 2);

        assert_eq!(stmts[0].line, 1);
        assert_eq!(stmts[0].labels, [Label::new("start".to_string(), 0..5), Label::new("end".to_string(), 7..10)]);
        assert_eq!(stmts[0].span, 12..22);
        assert_eq!(stmts[0].kind, Some(StmtKind::Instr(AsmInstr {
            mnemonic: "li".to_string(),
            operands: vec![Operand::Reg(V0), Operand::Imm(10)]
        })));

        assert_eq!(stmts[1].line, 2);
        assert_eq!(stmts[1].labels, [Label::new("only".to_string(), 0..4)]);
        assert_eq!(stmts[1].kind, None);
    }

    #[test]
    fn test_directives() {
        assert_eq!(directive(".text"), Directive::Text(None));
        assert_eq!(directive(".data 0x10010100"), Directive::Data(Some(0x1001_0100)));
        assert_eq!(directive(".ktext"), Directive::KText(None));
        assert_eq!(directive(".word 1, -2, 0x30"), Directive::Word(vec![(DataValue::Int(1), 1), (DataValue::Int(-2), 1), (DataValue::Int(0x30), 1)]));
        assert_eq!(directive(".word 7:3"), Directive::Word(vec![(DataValue::Int(7), 3)]));
        assert_eq!(directive(".word main+4"), Directive::Word(vec![(DataValue::Label(Label::new("main".to_string(), 6..10), 4), 1)]));
        assert_eq!(directive(".byte 'a' 'b'"), Directive::Byte(vec![(DataValue::Int(97), 1), (DataValue::Int(98), 1)]));
        assert_eq!(directive(".half 1, 2"), Directive::Half(vec![(DataValue::Int(1), 1), (DataValue::Int(2), 1)]));
        assert_eq!(directive(".byte 0:0xFFFFFFFF"), Directive::Byte(vec![(DataValue::Int(0), u32::MAX)]));
        assert_eq!(directive(".asciiz \"hi\\n\""), Directive::Asciiz("hi\n".to_string()));
        assert_eq!(directive(".ascii \"\""), Directive::Ascii(String::new()));
        assert_eq!(directive(".space 12"), Directive::Space(12));
        assert_eq!(directive(".align 2"), Directive::Align(2));
        assert_eq!(directive(".globl main, f"), Directive::Globl(vec![
            Label::new("main".to_string(), 7..11),
            Label::new("f".to_string(), 13..14)
        ]));
        assert_eq!(directive(".global main"), Directive::Globl(vec![Label::new("main".to_string(), 8..12)]));
        assert_eq!(directive(".extern buf 64"), Directive::Extern(Label::new("buf".to_string(), 8..11), 64));
        assert_eq!(directive(".set noat"), Directive::Set("noat".to_string()));
    }

    #[test]
    fn test_directive_errors() {
        assert_eq!(err_kind(".float 1"), ParseErrKind::UnsupportedDirective("float".to_string()));
        assert_eq!(err_kind(".macro m"), ParseErrKind::UnsupportedDirective("macro".to_string()));
        assert_eq!(err_kind(".orig 0x3000"), ParseErrKind::UnknownDirective("orig".to_string()));
        assert_eq!(err_kind(".align 4"), ParseErrKind::InvalidArgument { expected: "an alignment between 0 and 3" });
        assert_eq!(err_kind(".space -1"), ParseErrKind::InvalidArgument { expected: "a non-negative byte count" });
        assert!(matches!(err_kind(".half label"), ParseErrKind::UnexpectedToken { .. }));
        assert!(matches!(err_kind(".word"), ParseErrKind::UnexpectedEol { .. }));
        assert!(matches!(err_kind(".asciiz 5"), ParseErrKind::UnexpectedToken { expected: "string literal", .. }));
    }

    #[test]
    fn test_instr_errors() {
        assert_eq!(err_kind("frobnicate $t0"), ParseErrKind::UnknownMnemonic("frobnicate".to_string()));
        assert_eq!(err_kind("add.s $f0, $f1, $f2"), ParseErrKind::UnknownMnemonic("add.s".to_string()));
        assert_eq!(err_kind("lw $t0, 4($sp"), ParseErrKind::UnexpectedEol { expected: "')'" });
        assert_eq!(err_kind("add $t0, $t1, $t2 @"), ParseErrKind::Lex(LexErr::InvalidSymbol));
        assert_eq!(err_kind("add $f0, $t1, $t2"), ParseErrKind::Lex(LexErr::InvalidReg));
        assert_eq!(err_kind("loop: mul.d $f0, $f2, $f4"), ParseErrKind::UnknownMnemonic("mul.d".to_string()));
        assert!(matches!(err_kind("lw $t0, 4(8)"), ParseErrKind::UnexpectedToken { expected: "register", .. }));
        assert!(matches!(err_kind("42"), ParseErrKind::UnexpectedToken { expected: "instruction, directive, or label", .. }));
        assert!(matches!(err_kind(".text main"), ParseErrKind::UnexpectedToken { expected: "end of line", .. }));
    }

    #[test]
    fn test_errors_accumulate() {
        let src = "add $t0, $t1, $t2\nbogus $t0\nlw $t0, ($t1\n.text\n.float 2";
        let errors = parse_source(src).unwrap_err();
        let lines: Vec<_> = errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, [2, 3, 5]);
        assert_eq!(errors[0].span, 0..5);
    }

    #[test]
    fn test_eqv() {
        let src = ".eqv SIZE 16\n.eqv PTR $t0\naddi PTR, PTR, SIZE\n";
        let stmts = parse_source(src).unwrap();
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].kind, Some(StmtKind::Instr(AsmInstr {
            mnemonic: "addi".to_string(),
            operands: vec![Operand::Reg(T0), Operand::Reg(T0), Operand::Imm(16)]
        })));

        let errors = parse_source(".eqv\n.eqv NAME\n").unwrap_err();
        assert!(errors.iter().all(|e| e.kind == ParseErrKind::InvalidEqv));
        assert_eq!(errors.len(), 2);
    }
}
