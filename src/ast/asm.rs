//! This module holds the AST of assembly source code.
//!
//! Each source line is parsed into one [`Stmt`], which holds the labels
//! defined on that line and at most one instruction or directive.

use std::fmt::Write as _;
use std::ops::Range;

use super::{Label, Reg};

/// One parsed line of assembly source code.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Stmt {
    /// The 1-based line number of this statement.
    pub line: usize,
    /// The labels defined on this line.
    pub labels: Vec<Label>,
    /// The instruction or directive on this line (if any).
    pub kind: Option<StmtKind>,
    /// The span (in the line) of the instruction or directive.
    pub span: Range<usize>,
}

/// The instruction or directive of a statement.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum StmtKind {
    #[allow(missing_docs)]
    Instr(AsmInstr),
    #[allow(missing_docs)]
    Directive(Directive),
}

/// An assembly instruction, which may be a real machine operation
/// or a pseudo-instruction.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AsmInstr {
    /// The lowercase mnemonic.
    pub mnemonic: String,
    /// The operands of the instruction.
    pub operands: Vec<Operand>,
}
impl std::fmt::Display for AsmInstr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.mnemonic)?;
        for (i, op) in self.operands.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            op.fmt(f)?;
        }
        Ok(())
    }
}

/// An operand of an instruction.
///
/// ## Examples
/// ```text
/// addi $t0, $t0, -1        # Reg, Reg, Imm
/// lw   $t1, 8($sp)         # Reg, Addr
/// lw   $t1, ($sp)          # Reg, Addr
/// la   $a0, message        # Reg, Label
/// lw   $t2, array+8        # Reg, Label (with addend)
/// lw   $t2, array+8($t0)   # Reg, Addr (with label)
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Operand {
    /// A register.
    Reg(Reg),
    /// An integer (or character literal).
    Imm(i64),
    /// A label, offset by an addend.
    Label {
        /// The label.
        label: Label,
        /// A constant to add to the label's address.
        addend: i64
    },
    /// A base register, offset by an optional label and a constant.
    Addr {
        /// A label whose address is added to the offset.
        label: Option<Label>,
        /// The constant offset.
        offset: i64,
        /// The base register.
        base: Reg
    },
}
impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn fmt_addend(f: &mut std::fmt::Formatter<'_>, n: i64) -> std::fmt::Result {
            match n.cmp(&0) {
                std::cmp::Ordering::Less    => write!(f, "{n}"),
                std::cmp::Ordering::Equal   => Ok(()),
                std::cmp::Ordering::Greater => write!(f, "+{n}"),
            }
        }

        match self {
            Operand::Reg(r) => r.fmt(f),
            Operand::Imm(n) => n.fmt(f),
            Operand::Label { label, addend } => {
                label.fmt(f)?;
                fmt_addend(f, *addend)
            },
            Operand::Addr { label: Some(label), offset, base } => {
                label.fmt(f)?;
                fmt_addend(f, *offset)?;
                write!(f, "({base})")
            },
            Operand::Addr { label: None, offset, base } => {
                if *offset != 0 { write!(f, "{offset}")?; }
                f.write_char('(')?;
                base.fmt(f)?;
                f.write_char(')')
            },
        }
    }
}

/// A value of a data directive (`.word`, `.half`, `.byte`).
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum DataValue {
    /// An integer.
    Int(i64),
    /// The address of a label, offset by an addend (`.word` only).
    Label(Label, i64),
}

/// A data directive value along with how many times it repeats (`value:count`).
pub type DataItem = (DataValue, u32);

/// An assembly directive.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Directive {
    /// `.text [addr]`: switch to the text segment.
    Text(Option<u32>),
    /// `.data [addr]`: switch to the data segment.
    Data(Option<u32>),
    /// `.ktext [addr]`: switch to the kernel text segment.
    KText(Option<u32>),
    /// `.kdata [addr]`: switch to the kernel data segment.
    KData(Option<u32>),
    /// `.word v, ...`
    Word(Vec<DataItem>),
    /// `.half v, ...`
    Half(Vec<DataItem>),
    /// `.byte v, ...`
    Byte(Vec<DataItem>),
    /// `.ascii "str"`
    Ascii(String),
    /// `.asciiz "str"` (null-terminated)
    Asciiz(String),
    /// `.space n`: reserve `n` bytes.
    Space(u32),
    /// `.align n`: align to `2^n` bytes.
    Align(u32),
    /// `.globl label, ...`
    Globl(Vec<Label>),
    /// `.extern label size`
    Extern(Label, u32),
    /// `.set option` (accepted and ignored)
    Set(String),
}
impl Directive {
    /// The name of this directive (without the leading dot).
    pub fn name(&self) -> &'static str {
        match self {
            Directive::Text(_)      => "text",
            Directive::Data(_)      => "data",
            Directive::KText(_)     => "ktext",
            Directive::KData(_)     => "kdata",
            Directive::Word(_)      => "word",
            Directive::Half(_)      => "half",
            Directive::Byte(_)      => "byte",
            Directive::Ascii(_)     => "ascii",
            Directive::Asciiz(_)    => "asciiz",
            Directive::Space(_)     => "space",
            Directive::Align(_)     => "align",
            Directive::Globl(_)     => "globl",
            Directive::Extern(_, _) => "extern",
            Directive::Set(_)       => "set",
        }
    }

    /// Whether this directive emits or reserves bytes in a data segment.
    pub fn is_data(&self) -> bool {
        matches!(self,
            Directive::Word(_) | Directive::Half(_) | Directive::Byte(_)
            | Directive::Ascii(_) | Directive::Asciiz(_) | Directive::Space(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::reg_consts::{SP, T0};
    use crate::ast::Label;

    use super::{AsmInstr, Operand};

    #[test]
    fn test_display_instr() {
        let instr = AsmInstr {
            mnemonic: "lw".to_string(),
            operands: vec![
                Operand::Reg(T0),
                Operand::Addr { label: Some(Label::new("arr".to_string(), 8..11)), offset: -4, base: SP },
            ]
        };
        assert_eq!(instr.to_string(), "lw $t0, arr-4($sp)");

        let instr = AsmInstr {
            mnemonic: "la".to_string(),
            operands: vec![
                Operand::Reg(T0),
                Operand::Label { label: Label::new("msg".to_string(), 8..11), addend: 2 },
            ]
        };
        assert_eq!(instr.to_string(), "la $t0, msg+2");

        let instr = AsmInstr {
            mnemonic: "sw".to_string(),
            operands: vec![Operand::Reg(T0), Operand::Addr { label: None, offset: 0, base: SP }]
        };
        assert_eq!(instr.to_string(), "sw $t0, ($sp)");
    }
}
