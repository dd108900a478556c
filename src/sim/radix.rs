//! Number bases for displaying register and memory values.
//!
//! ```
//! use mips_ensemble::sim::radix::NumberBase;
//!
//! assert_eq!(NumberBase::Hexadecimal.format(0xFFFF_FFFE), "0xfffffffe");
//! assert_eq!(NumberBase::Decimal.format(0xFFFF_FFFE), "-2");
//! assert_eq!(NumberBase::Decimal.format_unsigned(0xFFFF_FFFE), "4294967294");
//! ```

/// A base that values can be displayed in.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum NumberBase {
    /// Base 2, as all 32 bits.
    Binary,
    /// Base 3, signed.
    Ternary,
    /// Base 4, signed.
    Quaternary,
    /// Base 5, signed.
    Quinary,
    /// Base 6, signed.
    Senary,
    /// Base 8, unsigned.
    Octal,
    /// Base 10, signed.
    Decimal,
    /// Base 16, as 8 digits with a `0x` prefix.
    #[default]
    Hexadecimal,
    /// The 4 bytes of the word as characters (most significant byte first).
    Ascii,
}
impl NumberBase {
    /// Every number base.
    pub const ALL: &'static [NumberBase] = &[
        NumberBase::Binary, NumberBase::Ternary, NumberBase::Quaternary,
        NumberBase::Quinary, NumberBase::Senary, NumberBase::Octal,
        NumberBase::Decimal, NumberBase::Hexadecimal, NumberBase::Ascii,
    ];

    /// Gets the base with the given radix (where ASCII has a radix of 0).
    pub fn from_radix(radix: u32) -> Option<Self> {
        NumberBase::ALL.iter()
            .copied()
            .find(|b| b.radix() == radix)
    }

    /// The radix of this base (0 for ASCII).
    pub fn radix(self) -> u32 {
        match self {
            NumberBase::Binary      => 2,
            NumberBase::Ternary     => 3,
            NumberBase::Quaternary  => 4,
            NumberBase::Quinary     => 5,
            NumberBase::Senary      => 6,
            NumberBase::Octal       => 8,
            NumberBase::Decimal     => 10,
            NumberBase::Hexadecimal => 16,
            NumberBase::Ascii       => 0,
        }
    }

    /// The name of this base.
    pub fn name(self) -> &'static str {
        match self {
            NumberBase::Binary      => "Binary",
            NumberBase::Ternary     => "Ternary",
            NumberBase::Quaternary  => "Quaternary",
            NumberBase::Quinary     => "Quinary",
            NumberBase::Senary      => "Senary",
            NumberBase::Octal       => "Octal",
            NumberBase::Decimal     => "Decimal",
            NumberBase::Hexadecimal => "Hexadecimal",
            NumberBase::Ascii       => "ASCII",
        }
    }

    /// Formats a word in this base.
    pub fn format(self, value: u32) -> String {
        match self {
            NumberBase::Binary      => format!("{value:032b}"),
            NumberBase::Octal       => format!("{value:o}"),
            NumberBase::Decimal     => (value as i32).to_string(),
            NumberBase::Hexadecimal => format!("{value:#010x}"),
            NumberBase::Ascii       => value.to_be_bytes().into_iter().map(ascii).collect(),
            b => signed_radix(value as i32, b.radix()),
        }
    }

    /// Formats a word in this base, treating it as unsigned.
    ///
    /// Every base other than hexadecimal displays the unsigned decimal value.
    pub fn format_unsigned(self, value: u32) -> String {
        match self {
            NumberBase::Hexadecimal => self.format(value),
            _ => value.to_string(),
        }
    }
}
impl std::fmt::Display for NumberBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn signed_radix(value: i32, radix: u32) -> String {
    let mut n = value.unsigned_abs();
    let mut digits = vec![];
    loop {
        // radix is at most 6, so every digit is in 0..=9
        digits.push(b'0' + (n % radix) as u8);
        n /= radix;
        if n == 0 { break; }
    }
    if value < 0 { digits.push(b'-'); }

    digits.iter().rev().map(|&d| char::from(d)).collect()
}

fn ascii(byte: u8) -> String {
    match byte {
        0     => "\\0".to_string(),
        b'\n' => "\\n".to_string(),
        b'\t' => "\\t".to_string(),
        b'\r' => "\\r".to_string(),
        0x20..=0x7E => char::from(byte).to_string(),
        _ => ".".to_string(),
    }
}
