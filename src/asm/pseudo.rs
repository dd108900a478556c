//! Conversion of instruction statements into machine instructions.
//!
//! Every instruction statement becomes one or more [`SimInstr`]s.
//! A statement whose operands fit a machine operation directly is encoded as is.
//! Otherwise, it is expanded as a pseudo-instruction (e.g., `li`, `blt`)
//! or an extended form of a real instruction (e.g., `lw $t0, label`,
//! `addi $t0, $t0, 100000`), which is only permitted if
//! the extended assembler is enabled.
//!
//! Expansions use `$at` as their scratch register.
//!
//! The number of instructions an expansion produces depends only on the
//! statement itself (never on the addresses of labels), so the first assembler pass
//! can size each statement before any label is known.

use crate::asm::AsmErrKind;
use crate::ast::asm::{AsmInstr, Operand as O};
use crate::ast::reg_consts::{AT, RA, ZERO};
use crate::ast::sim::{Format, Op, SimInstr};
use crate::ast::{Label, Reg};

/// Pseudo-instruction mnemonics and the operands they accept.
const PSEUDO: &[(&str, &str)] = &[
    ("li",    "$rd, 32-bit immediate"),
    ("la",    "$rd, label or $rd, offset($base)"),
    ("move",  "$rd, $rs"),
    ("not",   "$rd, $rs"),
    ("neg",   "$rd, $rs"),
    ("negu",  "$rd, $rs"),
    ("abs",   "$rd, $rs"),
    ("b",     "label"),
    ("bal",   "label"),
    ("beqz",  "$rs, label"),
    ("bnez",  "$rs, label"),
    ("blt",   "$rs, $rt or immediate, label"),
    ("bltu",  "$rs, $rt or immediate, label"),
    ("bgt",   "$rs, $rt or immediate, label"),
    ("bgtu",  "$rs, $rt or immediate, label"),
    ("ble",   "$rs, $rt or immediate, label"),
    ("bleu",  "$rs, $rt or immediate, label"),
    ("bge",   "$rs, $rt or immediate, label"),
    ("bgeu",  "$rs, $rt or immediate, label"),
    ("seq",   "$rd, $rs, $rt or immediate"),
    ("sne",   "$rd, $rs, $rt or immediate"),
    ("sgt",   "$rd, $rs, $rt or immediate"),
    ("sgtu",  "$rd, $rs, $rt or immediate"),
    ("sge",   "$rd, $rs, $rt or immediate"),
    ("sgeu",  "$rd, $rs, $rt or immediate"),
    ("sle",   "$rd, $rs, $rt or immediate"),
    ("sleu",  "$rd, $rs, $rt or immediate"),
    ("rol",   "$rd, $rs, $rt or shamt"),
    ("ror",   "$rd, $rs, $rt or shamt"),
    ("subi",  "$rt, $rs, 32-bit immediate"),
    ("subiu", "$rt, $rs, 32-bit immediate"),
    ("rem",   "$rd, $rs, $rt or immediate"),
    ("remu",  "$rd, $rs, $rt or immediate"),
];

/// Whether this (lowercase) mnemonic is a pseudo-instruction
/// (one that has no machine operation of the same name).
///
/// ```
/// use mips_ensemble::asm::pseudo::is_pseudo;
///
/// assert!(is_pseudo("li"));
/// assert!(is_pseudo("blt"));
/// assert!(!is_pseudo("addi"));
/// ```
pub fn is_pseudo(mnemonic: &str) -> bool {
    PSEUDO.iter().any(|&(m, _)| m == mnemonic)
}

/// A description of the operands a mnemonic accepts.
pub fn operand_signature(mnemonic: &str) -> &'static str {
    if mnemonic == "nop" {
        return Format::Bare.signature();
    }
    Op::from_mnemonic(mnemonic)
        .map(|op| op.format().signature())
        .or_else(|| PSEUDO.iter().find(|&&(m, _)| m == mnemonic).map(|&(_, sig)| sig))
        .unwrap_or("valid operands")
}

/// Resolves a label into its address.
pub(crate) type Resolver<'a> = &'a dyn Fn(&Label) -> Result<u32, AsmErrKind>;

/// The context an instruction statement is expanded in.
pub(crate) struct ExpandCtx<'a> {
    /// The address of the first instruction.
    pub pc: u32,
    /// Whether pseudo-instructions and extended forms are permitted.
    pub extended: bool,
    /// Whether branches have a delay slot.
    pub delayed_branching: bool,
    /// Label resolution, or `None` while sizing statements
    /// (in which case any label address is a placeholder).
    pub resolver: Option<Resolver<'a>>,
}
impl ExpandCtx<'_> {
    fn resolve(&self, label: &Label, addend: i64) -> Result<Option<u32>, AsmErrKind> {
        match self.resolver {
            Some(resolve) => Ok(Some(resolve(label)?.wrapping_add(addend as u32))),
            None => Ok(None),
        }
    }
    fn sizing(&self) -> bool {
        self.resolver.is_none()
    }
}

fn fits_i16(n: i64) -> bool {
    (-0x8000..=0x7FFF).contains(&n)
}
fn fits_u16(n: i64) -> bool {
    (0..=0xFFFF).contains(&n)
}
fn simm16(n: i64) -> Result<u16, AsmErrKind> {
    match fits_i16(n) {
        true  => Ok(n as u16),
        false => Err(AsmErrKind::ImmOutOfRange { value: n, bits: 16, signed: true }),
    }
}
fn uimm16(n: i64) -> Result<u16, AsmErrKind> {
    match fits_u16(n) {
        true  => Ok(n as u16),
        false => Err(AsmErrKind::ImmOutOfRange { value: n, bits: 16, signed: false }),
    }
}
fn shamt(n: i64) -> Result<u8, AsmErrKind> {
    match n {
        0..=31 => Ok(n as u8),
        _ => Err(AsmErrKind::ImmOutOfRange { value: n, bits: 5, signed: false }),
    }
}
/// Converts a value which fits in a word, either as a signed or as an unsigned integer.
fn word(n: i64) -> Result<u32, AsmErrKind> {
    match (-0x8000_0000..=0xFFFF_FFFF).contains(&n) {
        true  => Ok(n as u32),
        false => Err(AsmErrKind::ImmOutOfRange { value: n, bits: 32, signed: false }),
    }
}
/// The upper half of an address, adjusted for the sign extension of the lower half.
fn hi_adj(addr: u32) -> u16 {
    (addr.wrapping_add(0x8000) >> 16) as u16
}
fn is_target(o: &O) -> bool {
    matches!(o, O::Imm(_) | O::Label { .. })
}

/// Computes the offset field of a branch at `pc`.
///
/// A label target is converted to an offset. An integer target is already an offset.
fn branch_offset(target: &O, pc: u32, ctx: &ExpandCtx<'_>) -> Result<Option<u16>, AsmErrKind> {
    let offset = match target {
        &O::Imm(n) => n,
        O::Label { label, addend } => {
            let Some(addr) = ctx.resolve(label, *addend)? else { return Ok(Some(0)) };
            if addr % 4 != 0 {
                return Err(AsmErrKind::MisalignedTarget(addr));
            }
            (i64::from(addr) - i64::from(pc) - 4) >> 2
        },
        _ => return Ok(None),
    };

    match fits_i16(offset) {
        true  => Ok(Some(offset as u16)),
        false => Err(AsmErrKind::BranchOutOfRange(offset)),
    }
}

/// Computes the target field of a jump at `pc`.
///
/// Both label and integer targets are absolute addresses.
fn jump_index(target: &O, pc: u32, ctx: &ExpandCtx<'_>) -> Result<Option<u32>, AsmErrKind> {
    let addr = match target {
        &O::Imm(n) => word(n)?,
        O::Label { label, addend } => match ctx.resolve(label, *addend)? {
            Some(addr) => addr,
            None => return Ok(Some(0)),
        },
        _ => return Ok(None),
    };

    if addr % 4 != 0 {
        return Err(AsmErrKind::MisalignedTarget(addr));
    }
    // the jump can only change the lower 28 bits of the PC
    if !ctx.sizing() && (addr & 0xF000_0000) != (pc.wrapping_add(4) & 0xF000_0000) {
        return Err(AsmErrKind::JumpOutOfRegion(addr));
    }
    Ok(Some((addr >> 2) & 0x03FF_FFFF))
}

/// Encodes an instruction whose operands fit its machine operation.
///
/// This returns `Ok(None)` if the operands do not have the shape the operation requires.
fn encode_real(op: Op, ops: &[O], ctx: &ExpandCtx<'_>) -> Result<Option<SimInstr>, AsmErrKind> {
    let pc = ctx.pc;

    let instr = match (op.format(), ops) {
        (Format::R3, [O::Reg(rd), O::Reg(rs), O::Reg(rt)]) => SimInstr::new_r(op, *rd, *rs, *rt, 0),
        (Format::Shift, [O::Reg(rd), O::Reg(rt), O::Imm(sh)]) => SimInstr::new_r(op, *rd, ZERO, *rt, shamt(*sh)?),
        (Format::ShiftV, [O::Reg(rd), O::Reg(rt), O::Reg(rs)]) => SimInstr::new_r(op, *rd, *rs, *rt, 0),
        (Format::Rs, [O::Reg(rs)]) => SimInstr::new_r(op, ZERO, *rs, ZERO, 0),
        (Format::Jalr, [O::Reg(rs)]) => SimInstr::new_r(op, RA, *rs, ZERO, 0),
        (Format::Jalr, [O::Reg(rd), O::Reg(rs)]) => SimInstr::new_r(op, *rd, *rs, ZERO, 0),
        (Format::Rd, [O::Reg(rd)]) => SimInstr::new_r(op, *rd, ZERO, ZERO, 0),
        (Format::RsRt, [O::Reg(rs), O::Reg(rt)]) => SimInstr::new_r(op, ZERO, *rs, *rt, 0),
        // clz/clo repeat rd in the rt field
        (Format::RdRs, [O::Reg(rd), O::Reg(rs)]) => SimInstr::new_r(op, *rd, *rs, *rd, 0),
        (Format::Bare, []) => SimInstr::new_code(op, 0),
        (Format::Code, []) => SimInstr::new_code(op, 0),
        (Format::Code, [O::Imm(code)]) => match *code {
            0..=0xF_FFFF => SimInstr::new_code(op, *code as u32),
            _ => return Err(AsmErrKind::ImmOutOfRange { value: *code, bits: 20, signed: false }),
        },
        (Format::ImmSigned, [O::Reg(rt), O::Reg(rs), O::Imm(n)]) => SimInstr::new_i(op, *rs, *rt, simm16(*n)?),
        (Format::ImmUnsigned, [O::Reg(rt), O::Reg(rs), O::Imm(n)]) => SimInstr::new_i(op, *rs, *rt, uimm16(*n)?),
        (Format::Lui, [O::Reg(rt), O::Imm(n)]) => SimInstr::new_i(op, ZERO, *rt, uimm16(*n)?),
        (Format::TrapImm, [O::Reg(rs), O::Imm(n)]) => SimInstr::new_i(op, *rs, ZERO, simm16(*n)?),
        (Format::Branch2, [O::Reg(rs), O::Reg(rt), target]) => match branch_offset(target, pc, ctx)? {
            Some(offset) => SimInstr::new_i(op, *rs, *rt, offset),
            None => return Ok(None),
        },
        (Format::Branch1, [O::Reg(rs), target]) => match branch_offset(target, pc, ctx)? {
            Some(offset) => SimInstr::new_i(op, *rs, ZERO, offset),
            None => return Ok(None),
        },
        (Format::Jump, [target]) => match jump_index(target, pc, ctx)? {
            Some(index) => SimInstr::new_j(op, index),
            None => return Ok(None),
        },
        (Format::Mem, [O::Reg(rt), O::Addr { label: None, offset, base }]) => SimInstr::new_i(op, *base, *rt, simm16(*offset)?),
        (Format::Cop0Move, [O::Reg(rt), O::Reg(rd)]) => SimInstr::new_r(op, *rd, ZERO, *rt, 0),
        _ => return Ok(None),
    };

    Ok(Some(instr))
}

/// Expands an instruction statement into machine instructions,
/// assuming the first instruction is located at `ctx.pc`.
pub(crate) fn expand(instr: &AsmInstr, ctx: &ExpandCtx<'_>) -> Result<Vec<SimInstr>, AsmErrKind> {
    let mnemonic = &*instr.mnemonic;
    let ops = &*instr.operands;
    let mismatch = || AsmErrKind::OperandMismatch {
        mnemonic: mnemonic.to_string(),
        expected: operand_signature(mnemonic)
    };

    if mnemonic == "nop" {
        return match ops {
            [] => Ok(vec![SimInstr::NOP]),
            _ => Err(mismatch()),
        };
    }

    let real_err = match Op::from_mnemonic(mnemonic) {
        Some(op) => match encode_real(op, ops, ctx) {
            Ok(Some(instr)) => return Ok(vec![instr]),
            Ok(None) => None,
            Err(e) => Some(e),
        },
        None => None,
    };

    let mut em = Emitter { ctx, out: vec![] };
    let matched = expand_pseudo(mnemonic, ops, &mut em);

    if !ctx.extended {
        return Err(match (matched, real_err) {
            (_, Some(e)) => e,
            (Ok(false), None) => mismatch(),
            (_, None) => AsmErrKind::ExtendedDisabled(mnemonic.to_string()),
        });
    }
    match (matched?, real_err) {
        (true, _) => Ok(em.out),
        (false, Some(e)) => Err(e),
        (false, None) => Err(mismatch()),
    }
}

/// Accumulates the instructions of an expansion.
struct Emitter<'c, 'a> {
    ctx: &'c ExpandCtx<'a>,
    out: Vec<SimInstr>,
}
impl Emitter<'_, '_> {
    /// The address of the next emitted instruction.
    fn pc(&self) -> u32 {
        self.ctx.pc.wrapping_add(4 * self.out.len() as u32)
    }
    fn push(&mut self, instr: SimInstr) {
        self.out.push(instr);
    }
    fn r(&mut self, op: Op, rd: Reg, rs: Reg, rt: Reg) {
        self.push(SimInstr::new_r(op, rd, rs, rt, 0));
    }
    fn i(&mut self, op: Op, rs: Reg, rt: Reg, imm: u16) {
        self.push(SimInstr::new_i(op, rs, rt, imm));
    }
    fn shift(&mut self, op: Op, rd: Reg, value: Reg, sh: u8) {
        self.push(SimInstr::new_r(op, rd, ZERO, value, sh));
    }
    fn shiftv(&mut self, op: Op, rd: Reg, value: Reg, amount: Reg) {
        self.push(SimInstr::new_r(op, rd, amount, value, 0));
    }
    fn li(&mut self, rd: Reg, n: i64) -> Result<(), AsmErrKind> {
        if fits_i16(n) {
            self.i(Op::Addiu, ZERO, rd, n as u16);
        } else if fits_u16(n) {
            self.i(Op::Ori, ZERO, rd, n as u16);
        } else {
            let w = word(n)?;
            self.i(Op::Lui, ZERO, AT, (w >> 16) as u16);
            self.i(Op::Ori, AT, rd, w as u16);
        }
        Ok(())
    }
    /// Loads a register or an immediate (into `$at`), returning the register holding the value.
    fn reg_or_at(&mut self, o: &O) -> Result<Option<Reg>, AsmErrKind> {
        match o {
            &O::Reg(r) => Ok(Some(r)),
            &O::Imm(n) => self.li(AT, n).map(|_| Some(AT)),
            _ => Ok(None),
        }
    }
    fn addr(&self, label: &Label, addend: i64) -> Result<u32, AsmErrKind> {
        Ok(self.ctx.resolve(label, addend)?.unwrap_or(0))
    }
    fn branch(&mut self, op: Op, rs: Reg, rt: Reg, target: &O) -> Result<(), AsmErrKind> {
        let offset = branch_offset(target, self.pc(), self.ctx)?
            .ok_or_else(|| AsmErrKind::OperandMismatch { mnemonic: op.mnemonic().to_string(), expected: "label" })?;
        self.i(op, rs, rt, offset);
        Ok(())
    }
    /// Expands another statement in place.
    fn nested(&mut self, mnemonic: &str, operands: Vec<O>) -> Result<(), AsmErrKind> {
        let ctx = ExpandCtx { pc: self.pc(), ..*self.ctx };
        let instr = AsmInstr { mnemonic: mnemonic.to_string(), operands };
        let instrs = expand(&instr, &ctx)?;
        self.out.extend(instrs);
        Ok(())
    }
}

/// The immediate counterpart of a register-register operation.
///
/// The boolean is true if the immediate is sign-extended.
fn imm_form(op: Op) -> Option<(Op, bool)> {
    match op {
        Op::Add  => Some((Op::Addi, true)),
        Op::Addu => Some((Op::Addiu, true)),
        Op::Slt  => Some((Op::Slti, true)),
        Op::Sltu => Some((Op::Sltiu, true)),
        Op::And  => Some((Op::Andi, false)),
        Op::Or   => Some((Op::Ori, false)),
        Op::Xor  => Some((Op::Xori, false)),
        _ => None
    }
}
/// The register-register counterpart of an immediate operation.
fn reg_form(op: Op) -> Option<Op> {
    match op {
        Op::Addi  => Some(Op::Add),
        Op::Addiu => Some(Op::Addu),
        Op::Slti  => Some(Op::Slt),
        Op::Sltiu => Some(Op::Sltu),
        Op::Andi  => Some(Op::And),
        Op::Ori   => Some(Op::Or),
        Op::Xori  => Some(Op::Xor),
        _ => None
    }
}
fn trap_imm_form(op: Op) -> Option<Op> {
    match op {
        Op::Teq  => Some(Op::Teqi),
        Op::Tne  => Some(Op::Tnei),
        Op::Tge  => Some(Op::Tgei),
        Op::Tgeu => Some(Op::Tgeiu),
        Op::Tlt  => Some(Op::Tlti),
        Op::Tltu => Some(Op::Tltiu),
        _ => None
    }
}
/// Register-register operations which accept an immediate third operand.
fn accepts_imm_operand(op: Op) -> bool {
    matches!(op,
        Op::Add | Op::Addu | Op::Sub | Op::Subu | Op::And | Op::Or
        | Op::Xor | Op::Nor | Op::Slt | Op::Sltu | Op::Mul
    )
}

/// Expands a pseudo-instruction or extended form.
///
/// This returns `Ok(false)` if no form matches the operands.
fn expand_pseudo(m: &str, ops: &[O], em: &mut Emitter<'_, '_>) -> Result<bool, AsmErrKind> {
    if let Some(matched) = expand_compare(m, ops, em)? {
        return Ok(matched);
    }

    match (m, ops) {
        ("li", [O::Reg(rd), O::Imm(n)]) => em.li(*rd, *n)?,
        ("la", [O::Reg(rd), O::Imm(n)]) => em.li(*rd, *n)?,
        ("la", [O::Reg(rd), O::Label { label, addend }]) => {
            let addr = em.addr(label, *addend)?;
            em.i(Op::Lui, ZERO, AT, (addr >> 16) as u16);
            em.i(Op::Ori, AT, *rd, addr as u16);
        },
        ("la", [O::Reg(rd), O::Addr { label: None, offset, base }]) if fits_i16(*offset) => {
            em.i(Op::Addiu, *base, *rd, *offset as u16);
        },
        ("la", [O::Reg(rd), O::Addr { label, offset, base }]) => {
            let addr = match label {
                Some(label) => em.addr(label, *offset)?,
                None => word(*offset)?,
            };
            em.i(Op::Lui, ZERO, AT, (addr >> 16) as u16);
            em.i(Op::Ori, AT, AT, addr as u16);
            em.r(Op::Addu, *rd, AT, *base);
        },
        ("move", [O::Reg(rd), O::Reg(rs)]) => em.r(Op::Addu, *rd, ZERO, *rs),
        ("not",  [O::Reg(rd), O::Reg(rs)]) => em.r(Op::Nor, *rd, *rs, ZERO),
        ("neg",  [O::Reg(rd), O::Reg(rs)]) => em.r(Op::Sub, *rd, ZERO, *rs),
        ("negu", [O::Reg(rd), O::Reg(rs)]) => em.r(Op::Subu, *rd, ZERO, *rs),
        ("abs",  [O::Reg(rd), O::Reg(rs)]) => {
            em.shift(Op::Sra, AT, *rs, 31);
            em.r(Op::Xor, *rd, AT, *rs);
            em.r(Op::Subu, *rd, *rd, AT);
        },
        ("b",    [t]) if is_target(t) => em.branch(Op::Beq, ZERO, ZERO, t)?,
        ("bal",  [t]) if is_target(t) => em.branch(Op::Bgezal, ZERO, ZERO, t)?,
        ("beqz", [O::Reg(rs), t]) if is_target(t) => em.branch(Op::Beq, *rs, ZERO, t)?,
        ("bnez", [O::Reg(rs), t]) if is_target(t) => em.branch(Op::Bne, *rs, ZERO, t)?,
        ("beq" | "bne", [O::Reg(rs), O::Imm(n), t]) if is_target(t) => {
            let op = if m == "beq" { Op::Beq } else { Op::Bne };
            em.li(AT, *n)?;
            em.branch(op, *rs, AT, t)?;
        },
        ("subi" | "subiu", [O::Reg(rt), O::Reg(rs), O::Imm(n)]) => {
            let (iop, rop) = match m {
                "subi" => (Op::Addi, Op::Sub),
                _ => (Op::Addiu, Op::Subu),
            };
            match fits_i16(-n) {
                true => em.i(iop, *rs, *rt, (-n) as u16),
                false => {
                    em.li(AT, *n)?;
                    em.r(rop, *rt, *rs, AT);
                }
            }
        },
        ("div" | "divu" | "rem" | "remu", [O::Reg(rd), O::Reg(rs), divisor @ (O::Reg(_) | O::Imm(_))]) => {
            let op = if m.ends_with('u') { Op::Divu } else { Op::Div };
            let mf = if m.starts_with("rem") { Op::Mfhi } else { Op::Mflo };
            match divisor {
                &O::Reg(rt) => {
                    // skip the break if the divisor is nonzero
                    let skip = if em.ctx.delayed_branching { 2 } else { 1 };
                    em.i(Op::Bne, rt, ZERO, skip);
                    if em.ctx.delayed_branching { em.push(SimInstr::NOP); }
                    em.push(SimInstr::new_code(Op::Break, 0));
                    em.r(op, ZERO, *rs, rt);
                },
                _ => {
                    let Some(rt) = em.reg_or_at(divisor)? else { return Ok(false) };
                    em.r(op, ZERO, *rs, rt);
                }
            }
            em.r(mf, *rd, ZERO, ZERO);
        },
        ("rol" | "ror", [O::Reg(rd), O::Reg(rs), O::Reg(rt)]) => {
            let (first, second) = match m {
                "rol" => (Op::Srlv, Op::Sllv),
                _ => (Op::Sllv, Op::Srlv),
            };
            em.r(Op::Subu, AT, ZERO, *rt);
            em.shiftv(first, AT, *rs, AT);
            em.shiftv(second, *rd, *rs, *rt);
            em.r(Op::Or, *rd, *rd, AT);
        },
        ("rol" | "ror", [O::Reg(rd), O::Reg(rs), O::Imm(n)]) => {
            let (first, second) = match m {
                "rol" => (Op::Srl, Op::Sll),
                _ => (Op::Sll, Op::Srl),
            };
            let sh = shamt(*n)?;
            em.shift(first, AT, *rs, (32 - sh) & 31);
            em.shift(second, *rd, *rs, sh);
            em.r(Op::Or, *rd, *rd, AT);
        },
        _ => return expand_extended(m, ops, em),
    }

    Ok(true)
}

/// Expands the comparison pseudo-instructions (`blt`, `sge`, etc.).
///
/// This returns `Ok(None)` if the mnemonic is not a comparison.
fn expand_compare(m: &str, ops: &[O], em: &mut Emitter<'_, '_>) -> Result<Option<bool>, AsmErrKind> {
    let unsigned = m.ends_with('u');
    let base = match unsigned {
        true  => &m[..m.len() - 1],
        false => m,
    };
    let slt = if unsigned { Op::Sltu } else { Op::Slt };

    match base {
        // branch if a comparison holds: (swap operands, branch if slt result is nonzero)
        "blt" | "bgt" | "ble" | "bge" => {
            let [O::Reg(rs), rt, t] = ops else { return Ok(Some(false)) };
            if !is_target(t) { return Ok(Some(false)); }
            let Some(rt) = em.reg_or_at(rt)? else { return Ok(Some(false)) };

            let (swap, branch) = match base {
                "blt" => (false, Op::Bne),
                "bge" => (false, Op::Beq),
                "bgt" => (true, Op::Bne),
                _     => (true, Op::Beq),
            };
            let (a, b) = if swap { (rt, *rs) } else { (*rs, rt) };
            em.r(slt, AT, a, b);
            em.branch(branch, AT, ZERO, t)?;
        },
        "seq" | "sne" | "sgt" | "sge" | "sle" => {
            let [O::Reg(rd), O::Reg(rs), rt] = ops else { return Ok(Some(false)) };
            let Some(rt) = em.reg_or_at(rt)? else { return Ok(Some(false)) };
            let (rd, rs) = (*rd, *rs);

            match base {
                "seq" => {
                    em.r(Op::Subu, rd, rs, rt);
                    em.i(Op::Ori, ZERO, AT, 1);
                    em.r(Op::Sltu, rd, rd, AT);
                },
                "sne" => {
                    em.r(Op::Subu, rd, rs, rt);
                    em.r(Op::Sltu, rd, ZERO, rd);
                },
                "sgt" => em.r(slt, rd, rt, rs),
                _ => {
                    // sge is !(rs < rt), sle is !(rt < rs)
                    match base {
                        "sge" => em.r(slt, rd, rs, rt),
                        _     => em.r(slt, rd, rt, rs),
                    }
                    em.i(Op::Ori, ZERO, AT, 1);
                    em.r(Op::Subu, rd, AT, rd);
                }
            }
        },
        _ => return Ok(None),
    }

    Ok(Some(true))
}

/// Expands extended forms of real instructions.
fn expand_extended(m: &str, ops: &[O], em: &mut Emitter<'_, '_>) -> Result<bool, AsmErrKind> {
    let Some(op) = Op::from_mnemonic(m) else { return Ok(false) };

    match (op.format(), ops) {
        // immediate third operand
        (Format::R3, [O::Reg(rd), O::Reg(rs), O::Imm(n)]) if accepts_imm_operand(op) => {
            let (rd, rs, n) = (*rd, *rs, *n);
            match (imm_form(op), op) {
                (Some((iop, true)), _) if fits_i16(n) => em.i(iop, rs, rd, n as u16),
                (Some((iop, false)), _) if fits_u16(n) => em.i(iop, rs, rd, n as u16),
                (_, Op::Sub) if fits_i16(-n) => em.i(Op::Addi, rs, rd, (-n) as u16),
                (_, Op::Subu) if fits_i16(-n) => em.i(Op::Addiu, rs, rd, (-n) as u16),
                _ => {
                    em.li(AT, n)?;
                    em.r(op, rd, rs, AT);
                }
            }
        },
        // out of range immediate
        (Format::ImmSigned | Format::ImmUnsigned, [O::Reg(rt), O::Reg(rs), O::Imm(n)]) => {
            let Some(rop) = reg_form(op) else { return Ok(false) };
            em.li(AT, *n)?;
            em.r(rop, *rt, *rs, AT);
        },
        // two operand shorthand (`addi $t0, 1` is `addi $t0, $t0, 1`)
        (Format::R3, [O::Reg(rd), rt @ (O::Reg(_) | O::Imm(_))]) if accepts_imm_operand(op) => {
            em.nested(m, vec![O::Reg(*rd), O::Reg(*rd), rt.clone()])?;
        },
        (Format::ImmSigned | Format::ImmUnsigned, [O::Reg(rt), imm @ O::Imm(_)]) => {
            em.nested(m, vec![O::Reg(*rt), O::Reg(*rt), imm.clone()])?;
        },
        (Format::RsRt, [O::Reg(rs), O::Imm(n)]) => {
            let Some(iop) = trap_imm_form(op) else { return Ok(false) };
            match fits_i16(*n) {
                true => em.i(iop, *rs, ZERO, *n as u16),
                false => {
                    em.li(AT, *n)?;
                    em.r(op, ZERO, *rs, AT);
                }
            }
        },
        // absolute address
        (Format::Mem, [O::Reg(rt), O::Imm(n)]) => {
            let addr = word(*n)?;
            match fits_i16(*n) {
                true => em.i(op, ZERO, *rt, addr as u16),
                false => {
                    em.i(Op::Lui, ZERO, AT, hi_adj(addr));
                    em.i(op, AT, *rt, addr as u16);
                }
            }
        },
        (Format::Mem, [O::Reg(rt), O::Label { label, addend }]) => {
            let addr = em.addr(label, *addend)?;
            em.i(Op::Lui, ZERO, AT, hi_adj(addr));
            em.i(op, AT, *rt, addr as u16);
        },
        // label with base register, or a large offset
        (Format::Mem, [O::Reg(rt), O::Addr { label, offset, base }]) => {
            let addr = match label {
                Some(label) => em.addr(label, *offset)?,
                None => word(*offset)?,
            };
            em.i(Op::Lui, ZERO, AT, hi_adj(addr));
            em.r(Op::Addu, AT, AT, *base);
            em.i(op, AT, *rt, addr as u16);
        },
        _ => return Ok(false),
    }

    Ok(true)
}
