//! Assembling assembly source files into programs.
//!
//! This module is used to convert source files ([`SourceFile`]) into a [`Program`]
//! that can be loaded into the simulator.
//!
//! The assembler module notably consists of:
//! - [`assemble`]: The main function, which parses and assembles a list of source files.
//! - [`SymbolTable`]: a struct holding the address of every label, computed in the first assembler pass
//! - [`Program`]: a struct holding the assembled machine code and data
//! - [`AsmErrors`]: every diagnostic raised while assembling (if assembly fails)
//!
//! Assembly happens in two passes:
//! 1. Every statement is placed at an address, and every label is bound to an address.
//!    Pseudo-instructions are expanded at this point only to compute their size.
//! 2. Every statement is encoded, with labels resolved through the symbol table
//!    (first in the statement's own file, then in the global table).
//!
//! # Example
//! ```
//! use mips_ensemble::asm::{assemble, SourceFile};
//! use mips_ensemble::config::Settings;
//!
//! let src = "
//!     .data
//!     msg: .asciiz \"hi\"
//!     .text
//!     main: la $a0, msg
//!           li $v0, 4
//!           syscall
//! ";
//! let program = assemble(&[SourceFile::new("hello.s", src)], &Settings::default()).unwrap();
//! assert_eq!(program.symbols.lookup(0, "msg").map(|s| s.address), Some(0x1001_0000));
//! assert_eq!(program.statements[0].source.as_deref(), Some("    main: la $a0, msg"));
//! ```
pub mod pseudo;

use std::borrow::Cow;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;

use crate::ast::asm::{DataItem, DataValue, Directive, Operand, Stmt, StmtKind};
use crate::ast::sim::SimInstr;
use crate::ast::Label;
use crate::config::{Segment, Settings};
use crate::parse::{parse_lines, ParseErrKind};
use pseudo::ExpandCtx;

/// An assembly source file.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SourceFile {
    /// The name of the file (used in diagnostics).
    pub name: String,
    /// The source text.
    pub text: String,
}
impl SourceFile {
    /// Creates a new source file.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self { name: name.into(), text: text.into() }
    }

    /// Reads a source file from disk, naming it by its path.
    pub fn read(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Ok(Self::new(path.display().to_string(), text))
    }
}

/// How severe a diagnostic is.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum Severity {
    /// Assembly fails.
    Error,
    /// Assembly succeeds (unless warnings are treated as errors).
    Warning,
}
impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error   => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// Kinds of diagnostics that can occur from assembling given assembly code.
///
/// See [`AsmDiagnostic`] for this type with location information included.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum AsmErrKind {
    /// The line could not be parsed.
    Syntax(ParseErrKind),
    /// A label was defined more than once in a file,
    /// or a global label was defined in more than one file (pass 1).
    DuplicateLabel(String),
    /// A label was used but never defined (pass 2).
    UndefinedLabel(String),
    /// An immediate does not fit its field.
    ImmOutOfRange {
        /// The immediate.
        value: i64,
        /// The size of the field.
        bits: u8,
        /// Whether the field is signed.
        signed: bool
    },
    /// A branch target is too far away (the value is the word offset).
    BranchOutOfRange(i64),
    /// A branch or jump target is not word-aligned.
    MisalignedTarget(u32),
    /// A jump target is not in the same 256 MiB region as the jump.
    JumpOutOfRegion(u32),
    /// A pseudo-instruction or extended form was used while the extended assembler is disabled.
    ExtendedDisabled(String),
    /// The operands do not match any form of the instruction.
    OperandMismatch {
        /// The mnemonic of the instruction.
        mnemonic: String,
        /// A description of the accepted operands.
        expected: &'static str
    },
    /// An instruction appeared outside of a text segment (pass 1).
    InstrInData,
    /// A data directive appeared in a text segment (pass 1).
    DataInText(&'static str),
    /// The address of a `.text`/`.data`/`.ktext`/`.kdata` directive lies outside of its segment,
    /// or is misaligned (pass 1).
    InvalidSegmentAddress {
        /// The address.
        addr: u32,
        /// The segment the directive switches to.
        segment: Segment
    },
    /// A segment grew past its end (pass 1).
    SegmentOverflow(Segment),
    /// An address was assigned twice (pass 2).
    OverlappingCode(u32),
    /// A directive had no effect (warning).
    DirectiveIgnored(&'static str),
    /// A data value did not fit its width and was truncated (warning).
    ValueTruncated {
        /// The value.
        value: i64,
        /// The width it was truncated to.
        bits: u8
    },
}
impl AsmErrKind {
    /// The severity of this kind of diagnostic
    /// (before warnings are possibly promoted to errors).
    pub fn severity(&self) -> Severity {
        match self {
            AsmErrKind::DirectiveIgnored(_) | AsmErrKind::ValueTruncated { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }
}
impl std::fmt::Display for AsmErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax(e) => e.fmt(f),
            Self::DuplicateLabel(l) => write!(f, "label '{l}' was defined multiple times"),
            Self::UndefinedLabel(l) => write!(f, "label '{l}' is not defined"),
            Self::ImmOutOfRange { value, bits, signed: true } => write!(f, "immediate {value} does not fit in a signed {bits}-bit field"),
            Self::ImmOutOfRange { value, bits, signed: false } => write!(f, "immediate {value} does not fit in an unsigned {bits}-bit field"),
            Self::BranchOutOfRange(off) => write!(f, "branch offset of {off} words is out of range"),
            Self::MisalignedTarget(addr) => write!(f, "target address {addr:#010x} is not word-aligned"),
            Self::JumpOutOfRegion(addr) => write!(f, "jump target {addr:#010x} is out of range of this jump"),
            Self::ExtendedDisabled(m) => write!(f, "'{m}' with these operands requires the extended assembler"),
            Self::OperandMismatch { mnemonic, expected } => write!(f, "invalid operands for '{mnemonic}', expected {expected}"),
            Self::InstrInData => f.write_str("instructions cannot appear in a data segment"),
            Self::DataInText(d) => write!(f, ".{d} cannot appear in a text segment"),
            Self::InvalidSegmentAddress { addr, segment } => write!(f, "address {addr:#010x} is not a valid {segment} address"),
            Self::SegmentOverflow(seg) => write!(f, "{seg} segment is full"),
            Self::OverlappingCode(addr) => write!(f, "address {addr:#010x} was assigned more than once"),
            Self::DirectiveIgnored(d) => write!(f, ".{d} is ignored"),
            Self::ValueTruncated { value, bits } => write!(f, "value {value} was truncated to {bits} bits"),
        }
    }
}
impl AsmErrKind {
    fn help(&self) -> Option<Cow<str>> {
        match self {
            Self::Syntax(e) => e.help(),
            Self::DuplicateLabel(_) => Some("labels must be unique within a file, and global labels must be unique across all files".into()),
            Self::UndefinedLabel(_) => Some("labels from another file must be declared with .globl in that file".into()),
            Self::ImmOutOfRange { .. } => Some("enable the extended assembler to load large immediates through $at".into()),
            Self::BranchOutOfRange(_) => Some("branches can only reach 32768 instructions in either direction, try a jump instead".into()),
            Self::MisalignedTarget(_) => None,
            Self::JumpOutOfRegion(_) => Some("try jr with a register holding the target address".into()),
            Self::ExtendedDisabled(_) => Some("enable the extended assembler in the settings".into()),
            Self::OperandMismatch { .. } => None,
            Self::InstrInData => Some("try adding a .text directive before this instruction".into()),
            Self::DataInText(_) => Some("try adding a .data directive before this directive".into()),
            Self::InvalidSegmentAddress { .. } => None,
            Self::SegmentOverflow(_) => None,
            Self::OverlappingCode(_) => Some("try moving the starting address of one of these segments".into()),
            Self::DirectiveIgnored(_) => None,
            Self::ValueTruncated { .. } => None,
        }
    }
}

/// A diagnostic raised while assembling.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct AsmDiagnostic {
    /// The index of the file (in the list of assembled files).
    pub file: usize,
    /// The name of the file.
    pub file_name: String,
    /// The 1-based line number.
    pub line: usize,
    /// The span (in the line) associated with this diagnostic.
    pub span: Range<usize>,
    /// The severity of this diagnostic.
    pub severity: Severity,
    /// The kind of diagnostic.
    pub kind: AsmErrKind,
}
impl std::fmt::Display for AsmDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}: {}", self.file_name, self.line, self.severity, self.kind)
    }
}
impl std::error::Error for AsmDiagnostic {}
impl crate::err::Error for AsmDiagnostic {
    fn span(&self) -> Option<crate::err::ErrSpan> {
        Some(self.span.clone().into())
    }

    fn help(&self) -> Option<Cow<str>> {
        self.kind.help()
    }
}

/// Every diagnostic raised by a failed assembly, sorted by file and line.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AsmErrors(pub Vec<AsmDiagnostic>);
impl AsmErrors {
    /// The diagnostics which caused assembly to fail.
    pub fn errors(&self) -> impl Iterator<Item=&AsmDiagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Error)
    }
}
impl std::fmt::Display for AsmErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, d) in self.0.iter().enumerate() {
            if i != 0 { f.write_str("\n")?; }
            d.fmt(f)?;
        }
        Ok(())
    }
}
impl std::error::Error for AsmErrors {}
impl crate::err::Error for AsmErrors {}

/// Whether a symbol is visible only in its own file or in every file.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum SymbolKind {
    /// Visible in its own file.
    Local,
    /// Declared with `.globl` or `.extern`.
    Global,
}

/// A label and its address.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Symbol {
    /// The name of the label.
    pub name: String,
    /// The address of the label.
    pub address: u32,
    /// The segment the address lies in (`.extern` symbols are in the data segment).
    pub segment: Segment,
    /// Whether the label is local or global.
    pub kind: SymbolKind,
    /// The index of the file where the label is defined.
    pub file: usize,
}

/// The symbol table created in the first assembler pass.
///
/// It consists of one table of local labels per file
/// and one table of global labels shared by every file.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct SymbolTable {
    locals: Vec<BTreeMap<String, Symbol>>,
    globals: BTreeMap<String, Symbol>,
}
impl SymbolTable {
    fn new(n_files: usize) -> Self {
        Self { locals: vec![BTreeMap::new(); n_files], globals: BTreeMap::new() }
    }

    /// Gets a label as seen from the given file
    /// (first from that file's local labels, then from the global labels).
    pub fn lookup(&self, file: usize, name: &str) -> Option<&Symbol> {
        self.locals.get(file)
            .and_then(|t| t.get(name))
            .or_else(|| self.globals.get(name))
    }

    /// Gets a global label.
    pub fn lookup_global(&self, name: &str) -> Option<&Symbol> {
        self.globals.get(name)
    }

    /// Gets the name of a label at a given address (if one exists).
    ///
    /// Global labels are preferred over local labels.
    pub fn rev_lookup(&self, addr: u32) -> Option<&str> {
        self.iter()
            .find(|s| s.address == addr)
            .map(|s| &*s.name)
    }

    /// Iterates over every symbol (global symbols first).
    pub fn iter(&self) -> impl Iterator<Item=&Symbol> + '_ {
        self.globals.values()
            .chain(self.locals.iter().flat_map(|t| t.values()))
    }
}

/// One machine instruction of an assembled program.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ProgramStatement {
    /// The address of this instruction.
    pub address: u32,
    /// The encoded machine word.
    pub word: u32,
    /// The decoded instruction.
    pub instr: SimInstr,
    /// The index of the file this instruction was assembled from.
    pub file: usize,
    /// The 1-based line this instruction was assembled from.
    pub line: usize,
    /// The source line (only present for the first instruction of a line).
    pub source: Option<String>,
    /// The disassembly of this instruction.
    pub basic: String,
}

/// An assembled program.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Program {
    /// The machine instructions, sorted by address.
    pub statements: Vec<ProgramStatement>,
    /// The initialized data bytes.
    pub data: BTreeMap<u32, u8>,
    /// The symbol table.
    pub symbols: SymbolTable,
    /// The address execution starts at.
    pub entry: u32,
    /// Every warning raised while assembling.
    pub warnings: Vec<AsmDiagnostic>,
    /// The names of the assembled files.
    pub files: Vec<String>,
}
impl Program {
    /// Gets the statement at a given address.
    pub fn statement_at(&self, addr: u32) -> Option<&ProgramStatement> {
        self.statements.binary_search_by_key(&addr, |s| s.address)
            .ok()
            .map(|i| &self.statements[i])
    }
}

/// Assembles a list of source files into a program.
///
/// If assembly fails, every diagnostic (including warnings) is returned.
///
/// # Example
/// ```
/// use mips_ensemble::asm::{assemble, AsmErrKind, SourceFile};
/// use mips_ensemble::config::Settings;
///
/// let src = "
///     main: addi $t0, $zero, 5
///           j nowhere
/// ";
/// let errs = assemble(&[SourceFile::new("bad.s", src)], &Settings::default()).unwrap_err();
/// assert_eq!(errs.0.len(), 1);
/// assert_eq!(errs.0[0].line, 3);
/// assert_eq!(errs.0[0].kind, AsmErrKind::UndefinedLabel("nowhere".to_string()));
/// ```
pub fn assemble(sources: &[SourceFile], settings: &Settings) -> Result<Program, AsmErrors> {
    let mut diags = Diagnostics { sources, list: vec![] };

    let parsed: Vec<_> = sources.iter()
        .enumerate()
        .map(|(file, src)| {
            let (stmts, errors) = parse_lines(&src.text);
            for e in errors {
                diags.push(file, e.line, e.span, AsmErrKind::Syntax(e.kind));
            }
            stmts
        })
        .collect();

    let mut first = FirstPass::new(settings, sources.len());
    for (file, stmts) in parsed.iter().enumerate() {
        first.place_file(file, stmts, &mut diags);
    }
    let (symbols, placed) = first.finish(&mut diags);
    tracing::debug!(
        "pass 1: placed {} statements, {} symbols",
        placed.len(),
        symbols.iter().count()
    );

    let (statements, data) = second_pass(&placed, &symbols, settings, sources, &mut diags);
    tracing::debug!("pass 2: emitted {} instructions, {} data bytes", statements.len(), data.len());

    let mut list = diags.list;
    list.sort_by_key(|d| (d.file, d.line));
    if settings.warnings_are_errors {
        for d in &mut list {
            d.severity = Severity::Error;
        }
    }

    if list.iter().any(|d| d.severity == Severity::Error) {
        return Err(AsmErrors(list));
    }
    for w in &list {
        tracing::warn!("{w}");
    }

    let entry = match settings.start_at_main {
        true => symbols.lookup_global("main").map_or(settings.layout.text_base, |s| s.address),
        false => settings.layout.text_base,
    };

    Ok(Program {
        statements,
        data,
        symbols,
        entry,
        warnings: list,
        files: sources.iter().map(|s| s.name.clone()).collect(),
    })
}

/// Accumulates diagnostics.
struct Diagnostics<'a> {
    sources: &'a [SourceFile],
    list: Vec<AsmDiagnostic>,
}
impl Diagnostics<'_> {
    fn push(&mut self, file: usize, line: usize, span: Range<usize>, kind: AsmErrKind) {
        let file_name = self.sources.get(file).map(|s| s.name.clone()).unwrap_or_default();
        self.list.push(AsmDiagnostic { file, file_name, line, span, severity: kind.severity(), kind });
    }
}

/// The parts of memory that statements can be placed into.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Area {
    Text,
    Data,
    KText,
    KData,
}
impl Area {
    fn segment(self) -> Segment {
        match self {
            Area::Text  => Segment::Text,
            Area::Data  => Segment::Data,
            Area::KText => Segment::KernelText,
            Area::KData => Segment::KernelData,
        }
    }
    fn is_text(self) -> bool {
        matches!(self, Area::Text | Area::KText)
    }
}

/// A statement which was given an address in the first pass.
struct Placed<'s> {
    file: usize,
    stmt: &'s Stmt,
    addr: u32,
}

/// State of the first assembler pass.
struct FirstPass<'s> {
    settings: &'s Settings,
    /// Location counters (indexed by [`Area`]). These persist across files.
    counters: [u64; 4],
    /// Where the next `.extern` symbol is allocated.
    extern_counter: u64,
    symbols: SymbolTable,
    /// Labels declared with `.globl`.
    globls: Vec<(usize, usize, &'s Label)>,
    placed: Vec<Placed<'s>>,
}
impl<'s> FirstPass<'s> {
    fn new(settings: &'s Settings, n_files: usize) -> Self {
        let layout = &settings.layout;
        Self {
            settings,
            counters: [
                u64::from(layout.text_base),
                u64::from(layout.data_base),
                u64::from(layout.ktext_base),
                u64::from(layout.kdata_base),
            ],
            extern_counter: u64::from(layout.extern_base),
            symbols: SymbolTable::new(n_files),
            globls: vec![],
            placed: vec![],
        }
    }

    /// The first address past the end of an area.
    fn area_end(&self, area: Area) -> u64 {
        let layout = &self.settings.layout;
        match area {
            Area::Text  => u64::from(layout.extern_base),
            Area::Data  => u64::from(layout.heap_base),
            Area::KText => u64::from(layout.kdata_base),
            Area::KData => 1 << 32,
        }
    }

    fn define(&mut self, file: usize, label: &Label, addr: u64, area: Area, diags: &mut Diagnostics, line: usize) {
        let table = &mut self.symbols.locals[file];
        match table.entry(label.name.clone()) {
            Entry::Occupied(_) => diags.push(file, line, label.span(), AsmErrKind::DuplicateLabel(label.name.clone())),
            Entry::Vacant(e) => {
                e.insert(Symbol {
                    name: label.name.clone(),
                    address: addr as u32,
                    segment: area.segment(),
                    kind: SymbolKind::Local,
                    file,
                });
            },
        }
    }

    fn place_file(&mut self, file: usize, stmts: &'s [Stmt], diags: &mut Diagnostics) {
        let mut area = Area::Text;
        // Labels not yet bound to an address, with the line they appeared on.
        let mut pending: Vec<(&'s Label, usize)> = vec![];

        for stmt in stmts {
            pending.extend(stmt.labels.iter().map(|l| (l, stmt.line)));

            let size = match &stmt.kind {
                None => continue,
                Some(StmtKind::Instr(instr)) => {
                    if !area.is_text() {
                        diags.push(file, stmt.line, stmt.span.clone(), AsmErrKind::InstrInData);
                        continue;
                    }
                    let ctx = ExpandCtx {
                        pc: self.counters[area as usize] as u32,
                        extended: self.settings.extended_assembler,
                        delayed_branching: self.settings.delayed_branching,
                        resolver: None,
                    };
                    match pseudo::expand(instr, &ctx) {
                        Ok(instrs) => 4 * instrs.len() as u64,
                        Err(e) => {
                            self.bind_pending(file, &mut pending, area, diags);
                            diags.push(file, stmt.line, stmt.span.clone(), e);
                            continue;
                        }
                    }
                },
                Some(StmtKind::Directive(d)) => match d {
                    Directive::Text(addr)  => { area = self.switch(file, stmt, Area::Text, *addr, diags); continue },
                    Directive::Data(addr)  => { area = self.switch(file, stmt, Area::Data, *addr, diags); continue },
                    Directive::KText(addr) => { area = self.switch(file, stmt, Area::KText, *addr, diags); continue },
                    Directive::KData(addr) => { area = self.switch(file, stmt, Area::KData, *addr, diags); continue },
                    Directive::Align(n) => {
                        let c = &mut self.counters[area as usize];
                        *c = align_up(*c, 1 << *n);
                        continue;
                    },
                    Directive::Globl(labels) => {
                        self.globls.extend(labels.iter().map(|l| (file, stmt.line, l)));
                        continue;
                    },
                    Directive::Extern(label, size) => {
                        self.allocate_extern(file, stmt, label, *size, diags);
                        continue;
                    },
                    Directive::Set(_) => {
                        diags.push(file, stmt.line, stmt.span.clone(), AsmErrKind::DirectiveIgnored("set"));
                        continue;
                    },
                    d if area.is_text() => {
                        diags.push(file, stmt.line, stmt.span.clone(), AsmErrKind::DataInText(d.name()));
                        continue;
                    },
                    d => {
                        let c = &mut self.counters[area as usize];
                        *c = align_up(*c, data_alignment(d));
                        data_size(d)
                    }
                },
            };

            self.bind_pending(file, &mut pending, area, diags);

            let addr = self.counters[area as usize];
            let end = addr + size;
            if end > self.area_end(area) {
                diags.push(file, stmt.line, stmt.span.clone(), AsmErrKind::SegmentOverflow(area.segment()));
                continue;
            }
            self.counters[area as usize] = end;
            self.placed.push(Placed { file, stmt, addr: addr as u32 });
        }

        self.bind_pending(file, &mut pending, area, diags);
    }

    fn bind_pending(&mut self, file: usize, pending: &mut Vec<(&'s Label, usize)>, area: Area, diags: &mut Diagnostics) {
        let addr = self.counters[area as usize];
        for (label, line) in pending.drain(..) {
            self.define(file, label, addr, area, diags, line);
        }
    }

    /// Switches to an area, returning the new current area.
    fn switch(&mut self, file: usize, stmt: &Stmt, area: Area, addr: Option<u32>, diags: &mut Diagnostics) -> Area {
        if let Some(addr) = addr {
            let in_segment = self.settings.layout.segment_of(addr) == Some(area.segment());
            let aligned = !area.is_text() || addr % 4 == 0;
            match in_segment && aligned {
                true  => self.counters[area as usize] = u64::from(addr),
                false => diags.push(file, stmt.line, stmt.span.clone(), AsmErrKind::InvalidSegmentAddress { addr, segment: area.segment() }),
            }
        }
        area
    }

    fn allocate_extern(&mut self, file: usize, stmt: &Stmt, label: &Label, size: u32, diags: &mut Diagnostics) {
        // the same symbol can be declared external in several files
        if self.symbols.globals.contains_key(&label.name) {
            return;
        }

        let addr = align_up(self.extern_counter, 4);
        let end = addr + u64::from(size);
        if end > u64::from(self.settings.layout.data_base) {
            diags.push(file, stmt.line, stmt.span.clone(), AsmErrKind::SegmentOverflow(Segment::Data));
            return;
        }
        self.extern_counter = end;
        self.symbols.globals.insert(label.name.clone(), Symbol {
            name: label.name.clone(),
            address: addr as u32,
            segment: Segment::Data,
            kind: SymbolKind::Global,
            file,
        });
    }

    /// Promotes `.globl` labels into the global table.
    fn finish(mut self, diags: &mut Diagnostics) -> (SymbolTable, Vec<Placed<'s>>) {
        for (file, line, label) in std::mem::take(&mut self.globls) {
            match self.symbols.locals[file].remove(&label.name) {
                Some(sym) => match self.symbols.globals.entry(label.name.clone()) {
                    Entry::Occupied(_) => diags.push(file, line, label.span(), AsmErrKind::DuplicateLabel(label.name.clone())),
                    Entry::Vacant(e) => { e.insert(Symbol { kind: SymbolKind::Global, ..sym }); },
                },
                // declared twice in the same file
                None if self.symbols.globals.get(&label.name).is_some_and(|s| s.file == file) => {},
                None => diags.push(file, line, label.span(), AsmErrKind::UndefinedLabel(label.name.clone())),
            }
        }

        (self.symbols, self.placed)
    }
}

fn align_up(addr: u64, align: u64) -> u64 {
    (addr + align - 1) & !(align - 1)
}
fn data_alignment(d: &Directive) -> u64 {
    match d {
        Directive::Word(_) => 4,
        Directive::Half(_) => 2,
        _ => 1,
    }
}
fn data_size(d: &Directive) -> u64 {
    let count = |v: &[DataItem]| v.iter().map(|&(_, n)| u64::from(n)).sum::<u64>();
    match d {
        Directive::Word(v)   => 4 * count(v),
        Directive::Half(v)   => 2 * count(v),
        Directive::Byte(v)   => count(v),
        Directive::Ascii(s)  => s.len() as u64,
        Directive::Asciiz(s) => s.len() as u64 + 1,
        Directive::Space(n)  => u64::from(*n),
        _ => 0,
    }
}

/// The span of a label used in an instruction or directive (or the span of the whole statement).
fn label_span(stmt: &Stmt, name: &str) -> Range<usize> {
    let labels: Vec<&Label> = match &stmt.kind {
        Some(StmtKind::Instr(instr)) => instr.operands.iter()
            .filter_map(|o| match o {
                Operand::Label { label, .. } => Some(label),
                Operand::Addr { label, .. } => label.as_ref(),
                _ => None
            })
            .collect(),
        Some(StmtKind::Directive(Directive::Word(values))) => values.iter()
            .filter_map(|(v, _)| match v {
                DataValue::Label(label, _) => Some(label),
                DataValue::Int(_) => None
            })
            .collect(),
        _ => vec![],
    };

    labels.into_iter()
        .find(|l| l.name == name)
        .map_or_else(|| stmt.span.clone(), |l| l.span())
}

fn second_pass(
    placed: &[Placed],
    symbols: &SymbolTable,
    settings: &Settings,
    sources: &[SourceFile],
    diags: &mut Diagnostics
) -> (Vec<ProgramStatement>, BTreeMap<u32, u8>) {
    let lines: Vec<Vec<&str>> = sources.iter()
        .map(|s| s.text.lines().collect())
        .collect();

    let mut statements = BTreeMap::new();
    let mut data = BTreeMap::new();

    for p in placed {
        let Placed { file, stmt, addr } = *p;
        let resolve = |label: &Label| {
            symbols.lookup(file, &label.name)
                .map(|s| s.address)
                .ok_or_else(|| AsmErrKind::UndefinedLabel(label.name.clone()))
        };
        let error_span = |e: &AsmErrKind| match e {
            AsmErrKind::UndefinedLabel(name) => label_span(stmt, name),
            _ => stmt.span.clone(),
        };

        match &stmt.kind {
            Some(StmtKind::Instr(instr)) => {
                let ctx = ExpandCtx {
                    pc: addr,
                    extended: settings.extended_assembler,
                    delayed_branching: settings.delayed_branching,
                    resolver: Some(&resolve),
                };
                let instrs = match pseudo::expand(instr, &ctx) {
                    Ok(instrs) => instrs,
                    Err(e) => {
                        diags.push(file, stmt.line, error_span(&e), e);
                        continue;
                    }
                };

                for (i, instr) in instrs.into_iter().enumerate() {
                    let address = addr.wrapping_add(4 * i as u32);
                    let source = match i {
                        0 => lines[file].get(stmt.line - 1).map(|l| l.to_string()),
                        _ => None,
                    };
                    let ps = ProgramStatement {
                        address,
                        word: instr.encode(),
                        instr,
                        file,
                        line: stmt.line,
                        source,
                        basic: instr.display_at(address).to_string(),
                    };
                    match statements.entry(address) {
                        Entry::Occupied(_) => diags.push(file, stmt.line, stmt.span.clone(), AsmErrKind::OverlappingCode(address)),
                        Entry::Vacant(e) => { e.insert(ps); },
                    }
                }
            },
            Some(StmtKind::Directive(d)) => {
                let bytes = match data_bytes(d, &resolve) {
                    Ok((bytes, warnings)) => {
                        for w in warnings {
                            diags.push(file, stmt.line, stmt.span.clone(), w);
                        }
                        bytes
                    },
                    Err(e) => {
                        diags.push(file, stmt.line, error_span(&e), e);
                        continue;
                    }
                };

                let overlap = (0..bytes.len() as u32)
                    .map(|i| addr + i)
                    .find(|a| data.contains_key(a));
                if let Some(a) = overlap {
                    diags.push(file, stmt.line, stmt.span.clone(), AsmErrKind::OverlappingCode(a));
                    continue;
                }
                data.extend(bytes.into_iter().enumerate().map(|(i, b)| (addr + i as u32, b)));
            },
            None => {},
        }
    }

    (statements.into_values().collect(), data)
}

/// Computes the bytes a data directive emits, along with any warnings.
///
/// `.space` emits no bytes (reserved memory reads as zero).
fn data_bytes(d: &Directive, resolve: &dyn Fn(&Label) -> Result<u32, AsmErrKind>) -> Result<(Vec<u8>, Vec<AsmErrKind>), AsmErrKind> {
    let mut bytes = vec![];
    let mut warnings = vec![];

    let mut truncate = |n: i64, bits: u8| {
        let (min, max) = (-(1i64 << (bits - 1)), (1i64 << bits) - 1);
        if !(min..=max).contains(&n) {
            warnings.push(AsmErrKind::ValueTruncated { value: n, bits });
        }
        n
    };

    match d {
        Directive::Word(values) => for (v, count) in values {
            let word = match v {
                DataValue::Int(n) => *n as u32,
                DataValue::Label(label, addend) => resolve(label)?.wrapping_add(*addend as u32),
            };
            for _ in 0..*count {
                bytes.extend(word.to_le_bytes());
            }
        },
        Directive::Half(values) => for (v, count) in values {
            if let &DataValue::Int(n) = v {
                let half = truncate(n, 16) as u16;
                for _ in 0..*count {
                    bytes.extend(half.to_le_bytes());
                }
            }
        },
        Directive::Byte(values) => for (v, count) in values {
            if let &DataValue::Int(n) = v {
                let byte = truncate(n, 8) as u8;
                bytes.extend(std::iter::repeat(byte).take(*count as usize));
            }
        },
        Directive::Ascii(s) => bytes.extend(s.bytes()),
        Directive::Asciiz(s) => {
            bytes.extend(s.bytes());
            bytes.push(0);
        },
        _ => {},
    }

    Ok((bytes, warnings))
}

#[cfg(test)]
mod tests {
    use crate::asm::pseudo::{expand, ExpandCtx};
    use crate::ast::asm::StmtKind;
    use crate::config::{MemoryLayout, Segment, Settings};
    use crate::parse::parse_line;

    use super::{assemble, AsmErrKind, AsmErrors, Program, Severity, SourceFile, SymbolKind};

    fn assemble_src(src: &str) -> Result<Program, AsmErrors> {
        assemble(&[SourceFile::new("test.s", src)], &Settings::default())
    }
    fn assemble_with(src: &str, settings: &Settings) -> Result<Program, AsmErrors> {
        assemble(&[SourceFile::new("test.s", src)], settings)
    }
    #[track_caller]
    fn assert_asm_fail(r: Result<Program, AsmErrors>, kinds: &[AsmErrKind]) {
        let errs = r.unwrap_err();
        let found: Vec<_> = errs.errors().map(|d| d.kind.clone()).collect();
        assert_eq!(found, kinds);
    }
    fn addr_of(program: &Program, name: &str) -> Option<u32> {
        program.symbols.lookup(0, name).map(|s| s.address)
    }

    #[test]
    fn test_sym_basic() {
        let src = "
        .text
        a:  addi $t0, $zero, 5
            addi $t1, $zero, 7
        b:
        c:  add $t2, $t0, $t1
            li $t3, 0x12345678
        d:  nop
        .data
        x:  .byte 1
        y:  .word 2
        z:  .asciiz \"hi\"
        w:
            .half 3
        ";

        let program = assemble_src(src).unwrap();
        assert_eq!(addr_of(&program, "a"), Some(0x0040_0000));
        assert_eq!(addr_of(&program, "b"), Some(0x0040_0008));
        assert_eq!(addr_of(&program, "c"), Some(0x0040_0008));
        assert_eq!(addr_of(&program, "d"), Some(0x0040_0014));
        assert_eq!(addr_of(&program, "x"), Some(0x1001_0000));
        // auto-aligned:
        assert_eq!(addr_of(&program, "y"), Some(0x1001_0004));
        assert_eq!(addr_of(&program, "z"), Some(0x1001_0008));
        assert_eq!(addr_of(&program, "w"), Some(0x1001_000C));
        assert_eq!(addr_of(&program, "nothing"), None);

        let sym = program.symbols.lookup(0, "x").unwrap();
        assert_eq!(sym.segment, Segment::Data);
        assert_eq!(sym.kind, SymbolKind::Local);
        assert_eq!(program.symbols.rev_lookup(0x0040_0014), Some("d"));
        assert_eq!(program.entry, 0x0040_0000);
    }

    #[test]
    fn test_statements() {
        let src = "
        .text
        main:  li $t0, 0x12345678
               lw $t1, val
        .data
        val:   .word 7
        ";

        let program = assemble_src(src).unwrap();
        let basics: Vec<_> = program.statements.iter().map(|s| &*s.basic).collect();
        assert_eq!(basics, [
            "lui $at, 4660",
            "ori $t0, $at, 22136",
            "lui $at, 4097",
            "lw $t1, 0($at)",
        ]);

        let addrs: Vec<_> = program.statements.iter().map(|s| s.address).collect();
        assert_eq!(addrs, [0x0040_0000, 0x0040_0004, 0x0040_0008, 0x0040_000C]);

        // source is only attached to the first instruction of an expansion
        assert_eq!(program.statements[0].source.as_deref(), Some("        main:  li $t0, 0x12345678"));
        assert_eq!(program.statements[1].source, None);
        assert_eq!(program.statements[2].line, 4);
        assert_eq!(program.statements[0].word, 0x3C01_1234);

        let stmt = program.statement_at(0x0040_000C).unwrap();
        assert_eq!(stmt.line, 4);
        assert!(program.statement_at(0x0040_0010).is_none());
    }

    #[test]
    fn test_data() {
        let src = "
        .data
            .byte 1, 2, -1
            .word 0x11223344, lbl
            .half 0x5566:2
            .ascii \"ab\"
            .asciiz \"c\"
            .space 3
            .byte 9
        .text
        lbl: nop
        ";

        let program = assemble_src(src).unwrap();
        let bytes: Vec<(u32, u8)> = program.data.iter().map(|(&a, &b)| (a - 0x1001_0000, b)).collect();
        assert_eq!(bytes, [
            (0, 1), (1, 2), (2, 0xFF),
            (4, 0x44), (5, 0x33), (6, 0x22), (7, 0x11),
            (8, 0x00), (9, 0x00), (10, 0x40), (11, 0x00),
            (12, 0x66), (13, 0x55), (14, 0x66), (15, 0x55),
            (16, b'a'), (17, b'b'),
            (18, b'c'), (19, 0),
            (23, 9),
        ]);
    }

    #[test]
    fn test_multi_file() {
        let main = SourceFile::new("main.s", "
            .globl main
            main: jal helper
                  j done
            done: nop
        ");
        let lib = SourceFile::new("lib.s", "
            .globl helper
            helper: jr $ra
            done: nop
        ");

        let program = assemble(&[lib.clone(), main.clone()], &Settings::default()).unwrap();

        let helper = program.symbols.lookup_global("helper").unwrap();
        assert_eq!(helper.address, 0x0040_0000);
        assert_eq!(helper.kind, SymbolKind::Global);
        assert_eq!(program.entry, 0x0040_0008);

        // local labels of the same name do not conflict
        assert_eq!(program.symbols.lookup(0, "done").map(|s| s.address), Some(0x0040_0004));
        assert_eq!(program.symbols.lookup(1, "done").map(|s| s.address), Some(0x0040_0010));
        assert_eq!(program.statement_at(0x0040_0008).unwrap().basic, "jal 0x00400000");
        assert_eq!(program.statement_at(0x0040_000C).unwrap().basic, "j 0x00400010");
        assert_eq!(program.files, ["lib.s", "main.s"]);

        let settings = Settings { start_at_main: false, ..Default::default() };
        let program = assemble(&[lib, main], &settings).unwrap();
        assert_eq!(program.entry, 0x0040_0000);
    }

    #[test]
    fn test_label_errors() {
        assert_asm_fail(assemble_src("
            a: nop
            a: nop
        "), &[AsmErrKind::DuplicateLabel("a".to_string())]);

        assert_asm_fail(assemble_src("
            j missing
        "), &[AsmErrKind::UndefinedLabel("missing".to_string())]);

        // locals are not visible to other files
        let a = SourceFile::new("a.s", "j there");
        let b = SourceFile::new("b.s", "there: nop");
        let errs = assemble(&[a, b], &Settings::default()).unwrap_err();
        assert_eq!(errs.0[0].file_name, "a.s");
        assert_eq!(errs.0[0].span, 2..7);

        // duplicate global
        let a = SourceFile::new("a.s", ".globl f\nf: nop");
        let b = SourceFile::new("b.s", ".globl f\nf: nop");
        let errs = assemble(&[a, b], &Settings::default()).unwrap_err();
        assert_eq!(errs.0.len(), 1);
        assert_eq!(errs.0[0].file, 1);
        assert_eq!(errs.0[0].kind, AsmErrKind::DuplicateLabel("f".to_string()));
    }

    #[test]
    fn test_segment_errors() {
        assert_asm_fail(assemble_src("
            .data
            add $t0, $t1, $t2
        "), &[AsmErrKind::InstrInData]);

        assert_asm_fail(assemble_src("
            .text
            .word 5
        "), &[AsmErrKind::DataInText("word")]);

        assert_asm_fail(assemble_src("
            .data 0x00400000
        "), &[AsmErrKind::InvalidSegmentAddress { addr: 0x0040_0000, segment: Segment::Data }]);

        assert_asm_fail(assemble_src("
            .text 0x00400002
        "), &[AsmErrKind::InvalidSegmentAddress { addr: 0x0040_0002, segment: Segment::Text }]);

        let settings = Settings { layout: MemoryLayout::compact(), ..Default::default() };
        assert_asm_fail(assemble_with("
            .data
            .space 0x1000
            .byte 1
        ", &settings), &[AsmErrKind::SegmentOverflow(Segment::Data)]);

        // repeat counts are sized before they are emitted
        assert_asm_fail(assemble_src("
            .data
            .byte 0:0x7FFFFFFF
        "), &[AsmErrKind::SegmentOverflow(Segment::Data)]);
        assert_asm_fail(assemble_src("
            .data
            .word 0:0xFFFFFFFF
        "), &[AsmErrKind::SegmentOverflow(Segment::Data)]);

        assert_asm_fail(assemble_src("
            .text
            nop
            .text 0x00400000
            nop
        "), &[AsmErrKind::OverlappingCode(0x0040_0000)]);
    }

    #[test]
    fn test_error_accumulation() {
        let src = "
            add $t0
            addi $t0, $t0, 1
            lw $t0, %
            j nowhere
        ";
        let errs = assemble_src(src).unwrap_err();
        let lines: Vec<_> = errs.0.iter().map(|d| d.line).collect();
        assert_eq!(lines, [2, 4, 5]);
        assert!(matches!(errs.0[1].kind, AsmErrKind::Syntax(_)));
        assert!(errs.to_string().starts_with("test.s:2: error: invalid operands for 'add'"));
    }

    #[test]
    fn test_extended_disabled() {
        let settings = Settings { extended_assembler: false, ..Default::default() };
        assert_asm_fail(assemble_with("
            li $t0, 5
        ", &settings), &[AsmErrKind::ExtendedDisabled("li".to_string())]);

        assert!(assemble_with("addi $t0, $zero, 5", &settings).is_ok());
    }

    #[test]
    fn test_warnings() {
        let src = "
            .set noreorder
            .data
            .byte 300
        ";
        let program = assemble_src(src).unwrap();
        let kinds: Vec<_> = program.warnings.iter().map(|d| d.kind.clone()).collect();
        assert_eq!(kinds, [
            AsmErrKind::DirectiveIgnored("set"),
            AsmErrKind::ValueTruncated { value: 300, bits: 8 },
        ]);
        assert!(program.warnings.iter().all(|d| d.severity == Severity::Warning));
        assert_eq!(program.data.get(&0x1001_0000), Some(&44));

        let settings = Settings { warnings_are_errors: true, ..Default::default() };
        let errs = assemble_with(src, &settings).unwrap_err();
        assert_eq!(errs.errors().count(), 2);
    }

    #[test]
    fn test_extern_and_kernel() {
        let src = "
            .extern buf 10
            .extern count 4
            .kdata
            kd: .word 1
            .ktext 0x80000180
            handler: eret
            .text
            lw $t0, count
        ";
        let program = assemble_src(src).unwrap();
        let buf = program.symbols.lookup_global("buf").unwrap();
        assert_eq!(buf.address, 0x1000_0000);
        assert_eq!(program.symbols.lookup_global("count").unwrap().address, 0x1000_000C);
        assert_eq!(addr_of(&program, "kd"), Some(0x9000_0000));
        assert_eq!(addr_of(&program, "handler"), Some(0x8000_0180));
        assert_eq!(program.symbols.lookup(0, "handler").unwrap().segment, Segment::KernelText);
        assert_eq!(program.statement_at(0x8000_0180).unwrap().basic, "eret");
        assert_eq!(program.statement_at(0x0040_0000).unwrap().basic, "lui $at, 4096");
    }

    #[test]
    fn test_disassembly_reassembles() {
        let src = "
            .text
            main:  addi $t0, $zero, 5
                   li $t1, -70000
                   blt $t0, $t1, main
                   sw $t0, arr+8
                   jal main
                   bgez $t0, end
                   mfc0 $t2, $13
                   sll $t3, $t3, 2
                   rem $t4, $t0, 3
                   break 4
            end:   syscall
            .data
            arr:   .word 0:4
        ";

        for delayed_branching in [false, true] {
            let settings = Settings { delayed_branching, ..Default::default() };
            let program = assemble_with(src, &settings).unwrap();

            let fail = |label: &crate::ast::Label| -> Result<u32, AsmErrKind> {
                Err(AsmErrKind::UndefinedLabel(label.name.clone()))
            };
            for stmt in &program.statements {
                let Ok(Some(parsed)) = parse_line(&stmt.basic, 1) else {
                    panic!("could not parse {:?}", stmt.basic)
                };
                let Some(StmtKind::Instr(instr)) = parsed.kind else { unreachable!() };
                let ctx = ExpandCtx { pc: stmt.address, extended: false, delayed_branching, resolver: Some(&fail) };
                let words: Vec<_> = expand(&instr, &ctx)
                    .unwrap_or_else(|e| panic!("{:?} did not reassemble: {e}", stmt.basic))
                    .into_iter()
                    .map(|i| i.encode())
                    .collect();
                assert_eq!(words, [stmt.word], "{:?} reassembled differently", stmt.basic);
            }
        }
    }
}
