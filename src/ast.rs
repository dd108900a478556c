//! Components relating to the abstract syntax trees (ASTs)
//! used in representing assembly instructions.
//!
//! These components together are used to construct...
//! - [`asm::Stmt`] (a data structure holding one line of assembly source code),
//! - [`asm::Directive`] (a data structure holding an assembly source code directive),
//! - and [`sim::SimInstr`] (a data structure holding a machine instruction).

pub mod asm;
pub mod sim;

use std::num::TryFromIntError;

/// A general-purpose register. Must be between 0 and 31.
///
/// This `Reg` struct can either be constructed by selecting a register from [`reg_consts`],
/// by name with [`Reg::from_name`], or by number with [`Reg::try_from`].
///
/// ## Examples
///
/// ```text
/// addi $t0, $zero, 5
///      ~~~  ~~~~~
/// lw $ra, 4($sp)
///    ~~~    ~~~
/// add $10, $8, $9
///     ~~~  ~~  ~~
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct Reg(pub(crate) u8);

const REG_NAMES: [&str; 32] = [
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3",
    "t0",   "t1", "t2", "t3", "t4", "t5", "t6", "t7",
    "s0",   "s1", "s2", "s3", "s4", "s5", "s6", "s7",
    "t8",   "t9", "k0", "k1", "gp", "sp", "fp", "ra",
];

/// Register constants!
#[allow(missing_docs)]
pub mod reg_consts {
    use super::Reg;

    pub const ZERO: Reg = Reg(0);
    pub const AT: Reg = Reg(1);
    pub const V0: Reg = Reg(2);
    pub const V1: Reg = Reg(3);
    pub const A0: Reg = Reg(4);
    pub const A1: Reg = Reg(5);
    pub const A2: Reg = Reg(6);
    pub const A3: Reg = Reg(7);
    pub const T0: Reg = Reg(8);
    pub const T1: Reg = Reg(9);
    pub const T2: Reg = Reg(10);
    pub const T3: Reg = Reg(11);
    pub const T4: Reg = Reg(12);
    pub const T5: Reg = Reg(13);
    pub const T6: Reg = Reg(14);
    pub const T7: Reg = Reg(15);
    pub const S0: Reg = Reg(16);
    pub const S1: Reg = Reg(17);
    pub const S2: Reg = Reg(18);
    pub const S3: Reg = Reg(19);
    pub const S4: Reg = Reg(20);
    pub const S5: Reg = Reg(21);
    pub const S6: Reg = Reg(22);
    pub const S7: Reg = Reg(23);
    pub const T8: Reg = Reg(24);
    pub const T9: Reg = Reg(25);
    pub const K0: Reg = Reg(26);
    pub const K1: Reg = Reg(27);
    pub const GP: Reg = Reg(28);
    pub const SP: Reg = Reg(29);
    pub const FP: Reg = Reg(30);
    pub const RA: Reg = Reg(31);
}
impl Reg {
    /// Gets the register number of this [`Reg`]. This is always between 0 and 31.
    pub fn reg_no(self) -> u8 {
        self.0
    }

    /// The conventional name of this register (without the `$`).
    pub fn name(self) -> &'static str {
        REG_NAMES[usize::from(self.0)]
    }

    /// Looks up a register by its name (without the `$`).
    ///
    /// This accepts both numeric names (`"8"`) and conventional names (`"t0"`).
    /// `"s8"` is accepted as an alias for `"fp"`.
    ///
    /// ```
    /// # use mips_ensemble::ast::Reg;
    /// # use mips_ensemble::ast::reg_consts::{T0, FP};
    /// assert_eq!(Reg::from_name("t0"), Some(T0));
    /// assert_eq!(Reg::from_name("8"), Some(T0));
    /// assert_eq!(Reg::from_name("s8"), Some(FP));
    /// assert_eq!(Reg::from_name("32"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<Self> {
        if name.bytes().all(|b| b.is_ascii_digit()) && !name.is_empty() {
            return name.parse::<u8>().ok()
                .and_then(|n| Reg::try_from(n).ok());
        }

        match name {
            "s8" => Some(reg_consts::FP),
            _ => REG_NAMES.iter()
                .position(|&n| n == name)
                .map(|i| Reg(i as u8))
        }
    }
}
impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}", self.name())
    }
}
impl From<Reg> for usize {
    // Used for indexing the reg file in [`crate::sim::mem::RegFile`].
    fn from(value: Reg) -> Self {
        usize::from(value.0)
    }
}
impl TryFrom<u8> for Reg {
    type Error = TryFromIntError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0..=31 => Ok(Reg(value)),
            // there's no public constructor for this error, so borrow one from a failing conversion
            _      => u8::try_from(256u16).map(|_| unreachable!("should've been TryFromIntError")),
        }
    }
}

/// A label.
///
/// This struct stores the name of the label (accessible by the `name` field)
/// and the column where the label is located in its source line.
///
/// # Examples
/// ```text
/// .data
/// value: .word 8464
/// ~~~~~
/// .text
/// main:
/// ~~~~
///     lw $t0, value
///             ~~~~~
///     beq $t0, $zero, end
///                     ~~~
/// end:
/// ~~~
///     li $v0, 10
///     syscall
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Label {
    /// The label's identifier
    pub name: String,

    /// The start of the label in its source line.
    ///
    /// The name stores the length of the label, so the end doesn't need to be stored.
    start: usize
}
impl Label {
    /// Creates a new label.
    ///
    /// Only the start of the span is kept.
    pub fn new(name: String, span: std::ops::Range<usize>) -> Self {
        Label { name, start: span.start }
    }
    /// Returns the span of the label in its source line.
    pub fn span(&self) -> std::ops::Range<usize> {
        self.start .. (self.start + self.name.len())
    }
}
impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.name.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::reg_consts::{RA, SP, T0, ZERO};
    use super::{Label, Reg};

    #[test]
    fn test_reg_names() {
        for n in 0..32u8 {
            let reg = Reg::try_from(n).unwrap();
            assert_eq!(Reg::from_name(reg.name()), Some(reg));
            assert_eq!(Reg::from_name(&n.to_string()), Some(reg));
        }

        assert_eq!(ZERO.to_string(), "$zero");
        assert_eq!(T0.to_string(), "$t0");
        assert_eq!(SP.to_string(), "$sp");
        assert_eq!(RA.to_string(), "$ra");

        assert!(Reg::try_from(32).is_err());
        assert_eq!(Reg::from_name(""), None);
        assert_eq!(Reg::from_name("t10"), None);
        assert_eq!(Reg::from_name("f0"), None);
    }

    #[test]
    fn test_label_span() {
        let label = Label::new("loop".to_string(), 4..8);
        assert_eq!(label.span(), 4..8);
        assert_eq!(label.to_string(), "loop");
    }
}
