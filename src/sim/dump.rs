//! Formatters which write a range of simulator memory out to a file.
//!
//! The [`DumpFormat`] trait describes an implementation of a memory dump.
//! This module provides these implementations of the trait:
//! - [`BinaryFormat`]: Raw little-endian words
//! - [`HexTextFormat`]: One word per line, as 8 hexadecimal digits
//! - [`BinaryTextFormat`]: One word per line, as 32 binary digits
//!
//! All formats can be looked up by name through [`find_format`].

use std::fmt::Write;
use std::ops::Range;

use super::mem::Memory;

/// A format for dumping memory.
pub trait DumpFormat: Send + Sync {
    /// The name of this format.
    fn name(&self) -> &'static str;
    /// The file extension typically used for this format.
    fn extension(&self) -> &'static str;
    /// Serializes the words in the given address range.
    ///
    /// The range is widened to word boundaries,
    /// and words which were never written are dumped as zero.
    fn dump(&self, mem: &Memory, range: Range<u32>) -> Vec<u8>;
}
impl dyn DumpFormat {} // assert DumpFormat is dyn safe

fn words(mem: &Memory, range: Range<u32>) -> impl Iterator<Item=u32> + '_ {
    let start = u64::from(range.start & !3);
    let end = (u64::from(range.end) + 3) & !3;
    (start..end)
        .step_by(4)
        .map(move |addr| mem.get_raw(addr as u32))
}

/// Raw little-endian words.
#[derive(Debug, Clone, Copy)]
pub struct BinaryFormat;
impl DumpFormat for BinaryFormat {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn extension(&self) -> &'static str {
        "bin"
    }

    fn dump(&self, mem: &Memory, range: Range<u32>) -> Vec<u8> {
        words(mem, range)
            .flat_map(u32::to_le_bytes)
            .collect()
    }
}

/// One word per line, as 8 lowercase hexadecimal digits.
#[derive(Debug, Clone, Copy)]
pub struct HexTextFormat;
impl DumpFormat for HexTextFormat {
    fn name(&self) -> &'static str {
        "hex"
    }

    fn extension(&self) -> &'static str {
        "hex"
    }

    fn dump(&self, mem: &Memory, range: Range<u32>) -> Vec<u8> {
        let mut out = String::new();
        for word in words(mem, range) {
            // writing into a String is infallible
            let _ = writeln!(out, "{word:08x}");
        }
        out.into_bytes()
    }
}

/// One word per line, as 32 binary digits.
#[derive(Debug, Clone, Copy)]
pub struct BinaryTextFormat;
impl DumpFormat for BinaryTextFormat {
    fn name(&self) -> &'static str {
        "binary-text"
    }

    fn extension(&self) -> &'static str {
        "txt"
    }

    fn dump(&self, mem: &Memory, range: Range<u32>) -> Vec<u8> {
        let mut out = String::new();
        for word in words(mem, range) {
            let _ = writeln!(out, "{word:032b}");
        }
        out.into_bytes()
    }
}

const FORMATS: &[&dyn DumpFormat] = &[&BinaryFormat, &HexTextFormat, &BinaryTextFormat];

/// All available dump formats.
pub fn formats() -> &'static [&'static dyn DumpFormat] {
    FORMATS
}

/// Finds a dump format by its name.
///
/// ```
/// use mips_ensemble::sim::dump::find_format;
///
/// assert_eq!(find_format("hex").map(|f| f.extension()), Some("hex"));
/// assert!(find_format("elf").is_none());
/// ```
pub fn find_format(name: &str) -> Option<&'static dyn DumpFormat> {
    formats().iter()
        .copied()
        .find(|f| f.name().eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use crate::config::MemoryLayout;
    use crate::sim::mem::Memory;

    use super::{find_format, formats, BinaryFormat, BinaryTextFormat, DumpFormat, HexTextFormat};

    fn memory() -> Memory {
        let mut mem = Memory::new(MemoryLayout::default(), false);
        mem.set_word_raw(0x1001_0000, 0x1234_5678);
        mem.set_word_raw(0x1001_0008, 0x0000_0005);
        mem
    }

    #[test]
    fn test_binary() {
        let bytes = BinaryFormat.dump(&memory(), 0x1001_0000..0x1001_000C);
        assert_eq!(bytes, [0x78, 0x56, 0x34, 0x12, 0, 0, 0, 0, 5, 0, 0, 0]);
    }

    #[test]
    fn test_text() {
        let hex = HexTextFormat.dump(&memory(), 0x1001_0000..0x1001_000A);
        assert_eq!(String::from_utf8(hex).unwrap(), "12345678\n00000000\n00000005\n");

        let bin = BinaryTextFormat.dump(&memory(), 0x1001_0008..0x1001_000C);
        assert_eq!(String::from_utf8(bin).unwrap(), format!("{}101\n", "0".repeat(29)));
    }

    #[test]
    fn test_registry() {
        let names: Vec<_> = formats().iter().map(|f| f.name()).collect();
        assert_eq!(names, ["binary", "hex", "binary-text"]);
        assert_eq!(find_format("BINARY").map(|f| f.name()), Some("binary"));
    }
}
