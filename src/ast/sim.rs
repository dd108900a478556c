//! This module is used for holding simulation instructions ([`SimInstr`]),
//! which are instructions that directly map to machine words in memory.
//!
//! Every machine operation is listed once in [`Op`], together with its
//! mnemonic, its [`Encoding`] (which opcode/function fields identify it),
//! its operand [`Format`], and its [`InstrClass`].
//! Decoding a word is a lookup in a table keyed by [`Encoding`].

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::OnceLock;

use super::Reg;

/// The fields of a machine word which identify its operation.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Encoding {
    /// Opcode `0x00`, identified by the function field.
    Special(u8),
    /// Opcode `0x01`, identified by the `rt` field.
    RegImm(u8),
    /// Identified by the opcode alone.
    Primary(u8),
    /// Opcode `0x1C`, identified by the function field.
    Special2(u8),
    /// Opcode `0x10` (coprocessor 0), identified by the `rs` field.
    Cop0(u8),
    /// Opcode `0x10` with the CO bit set, identified by the function field.
    Cop0Fn(u8),
}
impl Encoding {
    /// Computes the encoding key of a given machine word.
    pub fn of(word: u32) -> Self {
        let opcode = (word >> 26) as u8;
        let rs = ((word >> 21) & 0x1F) as u8;
        let rt = ((word >> 16) & 0x1F) as u8;
        let funct = (word & 0x3F) as u8;

        match opcode {
            0x00 => Encoding::Special(funct),
            0x01 => Encoding::RegImm(rt),
            0x1C => Encoding::Special2(funct),
            0x10 if rs & 0x10 != 0 => Encoding::Cop0Fn(funct),
            0x10 => Encoding::Cop0(rs),
            op   => Encoding::Primary(op),
        }
    }

    /// The bits of a word that are fixed by this encoding.
    fn base(self) -> u32 {
        match self {
            Encoding::Special(f)  => u32::from(f),
            Encoding::RegImm(rt)  => (0x01 << 26) | (u32::from(rt) << 16),
            Encoding::Primary(op) => u32::from(op) << 26,
            Encoding::Special2(f) => (0x1C << 26) | u32::from(f),
            Encoding::Cop0(rs)    => (0x10 << 26) | (u32::from(rs) << 21),
            Encoding::Cop0Fn(f)   => (0x10 << 26) | (0x10 << 21) | u32::from(f),
        }
    }
}

/// The operand layout of an operation, as written in assembly.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Format {
    /// `rd, rs, rt`
    R3,
    /// `rd, rt, shamt`
    Shift,
    /// `rd, rt, rs`
    ShiftV,
    /// `rs`
    Rs,
    /// `rd, rs`, or `rs` (linking into `$ra`)
    Jalr,
    /// `rd`
    Rd,
    /// `rs, rt`
    RsRt,
    /// `rd, rs`
    RdRs,
    /// No operands.
    Bare,
    /// An optional 20-bit code.
    Code,
    /// `rt, rs, simm16`
    ImmSigned,
    /// `rt, rs, uimm16`
    ImmUnsigned,
    /// `rt, uimm16`
    Lui,
    /// `rs, rt, label`
    Branch2,
    /// `rs, label`
    Branch1,
    /// `rs, simm16`
    TrapImm,
    /// `target`
    Jump,
    /// `rt, offset(base)`
    Mem,
    /// `rt, rd` (where `rd` names a coprocessor 0 register)
    Cop0Move,
}
impl Format {
    /// A human readable description of the operands of this format.
    pub fn signature(self) -> &'static str {
        match self {
            Format::R3          => "$rd, $rs, $rt",
            Format::Shift       => "$rd, $rt, shamt",
            Format::ShiftV      => "$rd, $rt, $rs",
            Format::Rs          => "$rs",
            Format::Jalr        => "$rd, $rs",
            Format::Rd          => "$rd",
            Format::RsRt        => "$rs, $rt",
            Format::RdRs        => "$rd, $rs",
            Format::Bare        => "no operands",
            Format::Code        => "an optional code",
            Format::ImmSigned   => "$rt, $rs, signed 16-bit immediate",
            Format::ImmUnsigned => "$rt, $rs, unsigned 16-bit immediate",
            Format::Lui         => "$rt, unsigned 16-bit immediate",
            Format::Branch2     => "$rs, $rt, label",
            Format::Branch1     => "$rs, label",
            Format::TrapImm     => "$rs, signed 16-bit immediate",
            Format::Jump        => "label",
            Format::Mem         => "$rt, offset($base)",
            Format::Cop0Move    => "$rt, $cop0 register",
        }
    }
}

/// The broad category of an operation.
///
/// The simulator reports it in its instruction trace,
/// and it can be reused by anything that renders instructions by category.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum InstrClass {
    /// Signed and unsigned addition, subtraction, conditional moves, and bit counting.
    Arithmetic,
    /// Bitwise operations.
    Logical,
    /// Shifts.
    Shift,
    /// Multiplication, division, and HI/LO access.
    MulDiv,
    /// Set-on-less-than.
    Compare,
    /// PC-relative conditional branches.
    Branch,
    /// Jumps.
    Jump,
    /// Memory loads.
    Load,
    /// Memory stores.
    Store,
    /// Conditional traps.
    Trap,
    /// System calls, breakpoints, and coprocessor 0 access.
    System,
}

macro_rules! ops {
    ($($name:ident => $mnemonic:literal, $ek:ident($ev:literal), $fmt:ident, $class:ident;)+) => {
        /// A machine operation.
        #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
        pub enum Op {
            $(
                #[allow(missing_docs)]
                $name
            ),+
        }

        impl Op {
            /// All operations.
            pub const ALL: &'static [Op] = &[$(Op::$name),+];

            /// The assembly mnemonic of this operation.
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Op::$name => $mnemonic),+
                }
            }

            /// Looks up an operation by its (lowercase) mnemonic.
            pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
                match mnemonic {
                    $($mnemonic => Some(Op::$name),)+
                    _ => None
                }
            }

            /// The fields which identify this operation in a machine word.
            pub fn encoding(self) -> Encoding {
                match self {
                    $(Op::$name => Encoding::$ek($ev)),+
                }
            }

            /// The operand layout of this operation.
            pub fn format(self) -> Format {
                match self {
                    $(Op::$name => Format::$fmt),+
                }
            }

            /// The category of this operation.
            pub fn class(self) -> InstrClass {
                match self {
                    $(Op::$name => InstrClass::$class),+
                }
            }
        }
    };
}

ops! {
    Sll     => "sll",     Special(0x00),  Shift,       Shift;
    Srl     => "srl",     Special(0x02),  Shift,       Shift;
    Sra     => "sra",     Special(0x03),  Shift,       Shift;
    Sllv    => "sllv",    Special(0x04),  ShiftV,      Shift;
    Srlv    => "srlv",    Special(0x06),  ShiftV,      Shift;
    Srav    => "srav",    Special(0x07),  ShiftV,      Shift;
    Jr      => "jr",      Special(0x08),  Rs,          Jump;
    Jalr    => "jalr",    Special(0x09),  Jalr,        Jump;
    Movz    => "movz",    Special(0x0A),  R3,          Arithmetic;
    Movn    => "movn",    Special(0x0B),  R3,          Arithmetic;
    Syscall => "syscall", Special(0x0C),  Bare,        System;
    Break   => "break",   Special(0x0D),  Code,        System;
    Mfhi    => "mfhi",    Special(0x10),  Rd,          MulDiv;
    Mthi    => "mthi",    Special(0x11),  Rs,          MulDiv;
    Mflo    => "mflo",    Special(0x12),  Rd,          MulDiv;
    Mtlo    => "mtlo",    Special(0x13),  Rs,          MulDiv;
    Mult    => "mult",    Special(0x18),  RsRt,        MulDiv;
    Multu   => "multu",   Special(0x19),  RsRt,        MulDiv;
    Div     => "div",     Special(0x1A),  RsRt,        MulDiv;
    Divu    => "divu",    Special(0x1B),  RsRt,        MulDiv;
    Add     => "add",     Special(0x20),  R3,          Arithmetic;
    Addu    => "addu",    Special(0x21),  R3,          Arithmetic;
    Sub     => "sub",     Special(0x22),  R3,          Arithmetic;
    Subu    => "subu",    Special(0x23),  R3,          Arithmetic;
    And     => "and",     Special(0x24),  R3,          Logical;
    Or      => "or",      Special(0x25),  R3,          Logical;
    Xor     => "xor",     Special(0x26),  R3,          Logical;
    Nor     => "nor",     Special(0x27),  R3,          Logical;
    Slt     => "slt",     Special(0x2A),  R3,          Compare;
    Sltu    => "sltu",    Special(0x2B),  R3,          Compare;
    Tge     => "tge",     Special(0x30),  RsRt,        Trap;
    Tgeu    => "tgeu",    Special(0x31),  RsRt,        Trap;
    Tlt     => "tlt",     Special(0x32),  RsRt,        Trap;
    Tltu    => "tltu",    Special(0x33),  RsRt,        Trap;
    Teq     => "teq",     Special(0x34),  RsRt,        Trap;
    Tne     => "tne",     Special(0x36),  RsRt,        Trap;
    Bltz    => "bltz",    RegImm(0x00),   Branch1,     Branch;
    Bgez    => "bgez",    RegImm(0x01),   Branch1,     Branch;
    Tgei    => "tgei",    RegImm(0x08),   TrapImm,     Trap;
    Tgeiu   => "tgeiu",   RegImm(0x09),   TrapImm,     Trap;
    Tlti    => "tlti",    RegImm(0x0A),   TrapImm,     Trap;
    Tltiu   => "tltiu",   RegImm(0x0B),   TrapImm,     Trap;
    Teqi    => "teqi",    RegImm(0x0C),   TrapImm,     Trap;
    Tnei    => "tnei",    RegImm(0x0E),   TrapImm,     Trap;
    Bltzal  => "bltzal",  RegImm(0x10),   Branch1,     Branch;
    Bgezal  => "bgezal",  RegImm(0x11),   Branch1,     Branch;
    J       => "j",       Primary(0x02),  Jump,        Jump;
    Jal     => "jal",     Primary(0x03),  Jump,        Jump;
    Beq     => "beq",     Primary(0x04),  Branch2,     Branch;
    Bne     => "bne",     Primary(0x05),  Branch2,     Branch;
    Blez    => "blez",    Primary(0x06),  Branch1,     Branch;
    Bgtz    => "bgtz",    Primary(0x07),  Branch1,     Branch;
    Addi    => "addi",    Primary(0x08),  ImmSigned,   Arithmetic;
    Addiu   => "addiu",   Primary(0x09),  ImmSigned,   Arithmetic;
    Slti    => "slti",    Primary(0x0A),  ImmSigned,   Compare;
    Sltiu   => "sltiu",   Primary(0x0B),  ImmSigned,   Compare;
    Andi    => "andi",    Primary(0x0C),  ImmUnsigned, Logical;
    Ori     => "ori",     Primary(0x0D),  ImmUnsigned, Logical;
    Xori    => "xori",    Primary(0x0E),  ImmUnsigned, Logical;
    Lui     => "lui",     Primary(0x0F),  Lui,         Logical;
    Lb      => "lb",      Primary(0x20),  Mem,         Load;
    Lh      => "lh",      Primary(0x21),  Mem,         Load;
    Lw      => "lw",      Primary(0x23),  Mem,         Load;
    Lbu     => "lbu",     Primary(0x24),  Mem,         Load;
    Lhu     => "lhu",     Primary(0x25),  Mem,         Load;
    Sb      => "sb",      Primary(0x28),  Mem,         Store;
    Sh      => "sh",      Primary(0x29),  Mem,         Store;
    Sw      => "sw",      Primary(0x2B),  Mem,         Store;
    Mfc0    => "mfc0",    Cop0(0x00),     Cop0Move,    System;
    Mtc0    => "mtc0",    Cop0(0x04),     Cop0Move,    System;
    Eret    => "eret",    Cop0Fn(0x18),   Bare,        System;
    Madd    => "madd",    Special2(0x00), RsRt,        MulDiv;
    Maddu   => "maddu",   Special2(0x01), RsRt,        MulDiv;
    Mul     => "mul",     Special2(0x02), R3,          MulDiv;
    Msub    => "msub",    Special2(0x04), RsRt,        MulDiv;
    Msubu   => "msubu",   Special2(0x05), RsRt,        MulDiv;
    Clz     => "clz",     Special2(0x20), RdRs,        Arithmetic;
    Clo     => "clo",     Special2(0x21), RdRs,        Arithmetic;
}

fn decode_table() -> &'static HashMap<Encoding, Op> {
    static TABLE: OnceLock<HashMap<Encoding, Op>> = OnceLock::new();
    TABLE.get_or_init(|| {
        Op::ALL.iter()
            .map(|&op| (op.encoding(), op))
            .collect()
    })
}

/// A machine instruction.
///
/// This holds the decoded operation alongside the full machine word,
/// so encoding an instruction that was decoded yields the exact same word.
///
/// Instructions are built with [`SimInstr::new_r`], [`SimInstr::new_i`],
/// [`SimInstr::new_j`], and [`SimInstr::new_code`], or decoded from
/// a word with [`SimInstr::decode`].
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct SimInstr {
    op: Op,
    word: u32
}

impl SimInstr {
    /// The canonical no-op (`sll $zero, $zero, 0`, which encodes to 0).
    pub const NOP: SimInstr = SimInstr { op: Op::Sll, word: 0 };

    /// Creates a register-format instruction.
    pub fn new_r(op: Op, rd: Reg, rs: Reg, rt: Reg, shamt: u8) -> Self {
        let word = op.encoding().base()
            | (u32::from(rs.0) << 21)
            | (u32::from(rt.0) << 16)
            | (u32::from(rd.0) << 11)
            | (u32::from(shamt & 0x1F) << 6);
        Self { op, word }
    }

    /// Creates an immediate-format instruction.
    ///
    /// For [`Encoding::RegImm`] operations, `rt` is fixed by the operation and should be `$zero`.
    pub fn new_i(op: Op, rs: Reg, rt: Reg, imm: u16) -> Self {
        let word = op.encoding().base()
            | (u32::from(rs.0) << 21)
            | (u32::from(rt.0) << 16)
            | u32::from(imm);
        Self { op, word }
    }

    /// Creates a jump-format instruction from a 26-bit word index.
    pub fn new_j(op: Op, target: u32) -> Self {
        Self { op, word: op.encoding().base() | (target & 0x03FF_FFFF) }
    }

    /// Creates an instruction carrying a 20-bit code (`syscall`, `break`).
    pub fn new_code(op: Op, code: u32) -> Self {
        Self { op, word: op.encoding().base() | ((code & 0xF_FFFF) << 6) }
    }

    /// Decodes a machine word, returning `None` if the word does not
    /// correspond to any operation.
    ///
    /// ```
    /// # use mips_ensemble::ast::sim::{Op, SimInstr};
    /// let instr = SimInstr::decode(0x2008_0005).unwrap();
    /// assert_eq!(instr.op(), Op::Addi);
    /// assert_eq!(instr.to_string(), "addi $t0, $zero, 5");
    /// assert_eq!(instr.encode(), 0x2008_0005);
    /// ```
    pub fn decode(word: u32) -> Option<Self> {
        decode_table()
            .get(&Encoding::of(word))
            .map(|&op| Self { op, word })
    }

    /// Encodes this instruction into a machine word.
    pub fn encode(self) -> u32 {
        self.word
    }

    /// The operation of this instruction.
    pub fn op(self) -> Op {
        self.op
    }

    /// The `rs` field.
    pub fn rs(self) -> Reg {
        Reg(((self.word >> 21) & 0x1F) as u8)
    }
    /// The `rt` field.
    pub fn rt(self) -> Reg {
        Reg(((self.word >> 16) & 0x1F) as u8)
    }
    /// The `rd` field.
    pub fn rd(self) -> Reg {
        Reg(((self.word >> 11) & 0x1F) as u8)
    }
    /// The shift amount field.
    pub fn shamt(self) -> u32 {
        (self.word >> 6) & 0x1F
    }
    /// The 16-bit immediate field.
    pub fn imm(self) -> u16 {
        self.word as u16
    }
    /// The 16-bit immediate field, sign-extended.
    pub fn simm(self) -> i32 {
        i32::from(self.word as u16 as i16)
    }
    /// The 26-bit jump index.
    pub fn target(self) -> u32 {
        self.word & 0x03FF_FFFF
    }
    /// The 20-bit code field of `syscall` and `break`.
    pub fn code(self) -> u32 {
        (self.word >> 6) & 0xF_FFFF
    }

    /// The address a branch at `pc` would go to if taken.
    pub fn branch_target(self, pc: u32) -> u32 {
        pc.wrapping_add(4).wrapping_add_signed(self.simm() << 2)
    }
    /// The address a jump at `pc` goes to.
    pub fn jump_target(self, pc: u32) -> u32 {
        (pc.wrapping_add(4) & 0xF000_0000) | (self.target() << 2)
    }

    /// Disassembles this instruction, assuming it is located at `pc`.
    ///
    /// The address is needed to compute the destination of jumps.
    pub fn display_at(self, pc: u32) -> Disassembly {
        Disassembly { instr: self, pc }
    }
}
impl std::fmt::Display for SimInstr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.display_at(0).fmt(f)
    }
}

/// The disassembly of an instruction at a given address (see [`SimInstr::display_at`]).
///
/// The output can be fed back into the assembler (at the same address),
/// producing the same machine word.
pub struct Disassembly {
    instr: SimInstr,
    pc: u32
}
impl std::fmt::Display for Disassembly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let i = self.instr;
        if i.encode() == 0 {
            return f.write_str("nop");
        }

        f.write_str(i.op.mnemonic())?;
        match i.op.format() {
            Format::R3          => write!(f, " {}, {}, {}", i.rd(), i.rs(), i.rt()),
            Format::Shift       => write!(f, " {}, {}, {}", i.rd(), i.rt(), i.shamt()),
            Format::ShiftV      => write!(f, " {}, {}, {}", i.rd(), i.rt(), i.rs()),
            Format::Rs          => write!(f, " {}", i.rs()),
            Format::Jalr        => write!(f, " {}, {}", i.rd(), i.rs()),
            Format::Rd          => write!(f, " {}", i.rd()),
            Format::RsRt        => write!(f, " {}, {}", i.rs(), i.rt()),
            Format::RdRs        => write!(f, " {}, {}", i.rd(), i.rs()),
            Format::Bare        => Ok(()),
            Format::Code if i.code() == 0 => Ok(()),
            Format::Code        => write!(f, " {}", i.code()),
            Format::ImmSigned   => write!(f, " {}, {}, {}", i.rt(), i.rs(), i.simm()),
            Format::ImmUnsigned => write!(f, " {}, {}, {}", i.rt(), i.rs(), i.imm()),
            Format::Lui         => write!(f, " {}, {}", i.rt(), i.imm()),
            Format::Branch2     => write!(f, " {}, {}, {}", i.rs(), i.rt(), i.simm()),
            Format::Branch1     => write!(f, " {}, {}", i.rs(), i.simm()),
            Format::TrapImm     => write!(f, " {}, {}", i.rs(), i.simm()),
            Format::Jump        => write!(f, " {:#010x}", i.jump_target(self.pc)),
            Format::Mem         => write!(f, " {}, {}({})", i.rt(), i.simm(), i.rs()),
            Format::Cop0Move    => {
                write!(f, " {}, ", i.rt())?;
                f.write_char('$')?;
                write!(f, "{}", i.rd().reg_no())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::ast::reg_consts::{RA, SP, T0, T1, T2, ZERO};
    use super::{Encoding, InstrClass, Op, SimInstr};

    #[test]
    fn test_encodings_unique() {
        let encodings: HashSet<_> = Op::ALL.iter().map(|op| op.encoding()).collect();
        assert_eq!(encodings.len(), Op::ALL.len(), "two operations share an encoding");

        for &op in Op::ALL {
            assert_eq!(Op::from_mnemonic(op.mnemonic()), Some(op));
        }
    }

    #[test]
    fn test_classes() {
        assert_eq!(Op::Add.class(), InstrClass::Arithmetic);
        assert_eq!(Op::Nor.class(), InstrClass::Logical);
        assert_eq!(Op::Sll.class(), InstrClass::Shift);
        assert_eq!(Op::Mult.class(), InstrClass::MulDiv);
        assert_eq!(Op::Slt.class(), InstrClass::Compare);
        assert_eq!(Op::Beq.class(), InstrClass::Branch);
        assert_eq!(Op::Jal.class(), InstrClass::Jump);
        assert_eq!(Op::Lw.class(), InstrClass::Load);
        assert_eq!(Op::Sw.class(), InstrClass::Store);
        assert_eq!(Op::Teq.class(), InstrClass::Trap);
        assert_eq!(Op::Syscall.class(), InstrClass::System);
    }

    #[test]
    fn test_known_words() {
        // add $t2, $t0, $t1
        assert_eq!(SimInstr::new_r(Op::Add, T2, T0, T1, 0).encode(), 0x0109_5020);
        // addi $t0, $zero, 5
        assert_eq!(SimInstr::new_i(Op::Addi, ZERO, T0, 5).encode(), 0x2008_0005);
        // lw $ra, 4($sp)
        assert_eq!(SimInstr::new_i(Op::Lw, SP, RA, 4).encode(), 0x8FBF_0004);
        // jr $ra
        assert_eq!(SimInstr::new_r(Op::Jr, ZERO, RA, ZERO, 0).encode(), 0x03E0_0008);
        // syscall
        assert_eq!(SimInstr::new_code(Op::Syscall, 0).encode(), 0x0000_000C);
        // j 0x00400000
        assert_eq!(SimInstr::new_j(Op::J, 0x0040_0000 >> 2).encode(), 0x0810_0000);
        // eret
        assert_eq!(SimInstr::new_code(Op::Eret, 0).encode(), 0x4200_0018);
        // bgez $t0, 2
        assert_eq!(SimInstr::new_i(Op::Bgez, T0, ZERO, 2).encode(), 0x0501_0002);
    }

    #[test]
    fn test_decode() {
        for &op in Op::ALL {
            let word = match op.encoding() {
                Encoding::Primary(_) | Encoding::RegImm(_) => SimInstr::new_i(op, T0, ZERO, 0xFFFC).encode(),
                // rs selects the coprocessor operation
                Encoding::Cop0(_) | Encoding::Cop0Fn(_) => SimInstr::new_r(op, T2, ZERO, T1, 0).encode(),
                _ => SimInstr::new_r(op, T2, T0, T1, 0).encode(),
            };
            let decoded = SimInstr::decode(word).unwrap();
            assert_eq!(decoded.op(), op, "{word:08X} decoded incorrectly");
            assert_eq!(decoded.encode(), word);
        }

        // opcode 0x3F is unused
        assert_eq!(SimInstr::decode(0xFC00_0000), None);
        // SPECIAL funct 0x01 is unused
        assert_eq!(SimInstr::decode(0x0000_0001), None);
    }

    #[test]
    fn test_disassemble() {
        let fmt = |word, pc| SimInstr::decode(word).unwrap().display_at(pc).to_string();

        assert_eq!(fmt(0x0000_0000, 0), "nop");
        assert_eq!(fmt(0x0109_5020, 0), "add $t2, $t0, $t1");
        assert_eq!(fmt(0x8FBF_0004, 0), "lw $ra, 4($sp)");
        assert_eq!(fmt(0x2508_FFFF, 0), "addiu $t0, $t0, -1");
        assert_eq!(fmt(0x3508_FFFF, 0), "ori $t0, $t0, 65535");
        assert_eq!(fmt(0x1109_FFFE, 0), "beq $t0, $t1, -2");
        assert_eq!(fmt(0x0810_0003, 0x0040_0000), "j 0x0040000c");
        assert_eq!(fmt(0x0810_0003, 0x8000_0000), "j 0x8040000c");
        assert_eq!(fmt(0x4008_6000, 0), "mfc0 $t0, $12");
        assert_eq!(fmt(0x0000_000D, 0), "break");
        assert_eq!(fmt(0x0001_C00D, 0), "break 1792");
    }

    #[test]
    fn test_targets() {
        let beq = SimInstr::new_i(Op::Beq, T0, T1, (-1i16) as u16);
        assert_eq!(beq.branch_target(0x0040_0004), 0x0040_0004);
        let bne = SimInstr::new_i(Op::Bne, T0, T1, 3);
        assert_eq!(bne.branch_target(0x0040_0000), 0x0040_0010);
    }
}
