//! Memory handling for the MIPS simulator.
//!
//! This module consists of:
//! - [`Memory`]: The segmented memory.
//! - [`RegFile`]: The register file (general purpose registers, PC, HI, and LO).
//! - [`Cop0`]: The coprocessor 0 registers.
//! - [`Machine`]: All of the state an instruction can mutate.
//!
//! Every mutating accessor takes a [`MutationSink`], which is notified of the prior value
//! before the new value is written. The `*_raw` accessors bypass the sink
//! (and access checks) and are meant for loading programs and for observers.
use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;

use crate::ast::Reg;
use crate::ast::reg_consts::{A0, A1, GP, SP};
use crate::config::MemoryLayout;

use super::backstep::{MutationSink, UndoEntry};

/// The width of a memory access.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Width {
    /// 1 byte.
    Byte,
    /// 2 bytes.
    Half,
    /// 4 bytes.
    Word,
}
impl Width {
    /// The number of bytes of this width.
    pub fn bytes(self) -> u32 {
        match self {
            Width::Byte => 1,
            Width::Half => 2,
            Width::Word => 4,
        }
    }
    fn mask(self) -> u32 {
        match self {
            Width::Byte => 0xFF,
            Width::Half => 0xFFFF,
            Width::Word => 0xFFFF_FFFF,
        }
    }
}

/// Errors from an invalid memory access.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum MemErr {
    /// The address is not a multiple of the access width.
    Misaligned(u32),
    /// The address is unmapped, or lies in a segment this access may not touch.
    SegmentAccess(u32),
}
impl MemErr {
    /// The address of the invalid access.
    pub fn addr(self) -> u32 {
        match self {
            MemErr::Misaligned(a) | MemErr::SegmentAccess(a) => a,
        }
    }
}
impl std::fmt::Display for MemErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemErr::Misaligned(a)    => write!(f, "address {a:#010x} is not aligned on a boundary of its access width"),
            MemErr::SegmentAccess(a) => write!(f, "address {a:#010x} is out of range or not accessible"),
        }
    }
}
impl std::error::Error for MemErr {}
impl crate::err::Error for MemErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            MemErr::Misaligned(_) => Some("words must be accessed at multiples of 4 and halfwords at multiples of 2".into()),
            MemErr::SegmentAccess(_) => Some("the text segment can only be accessed if self-modifying code is enabled".into()),
        }
    }
}

/// The memory of the simulator.
///
/// Words are stored sparsely (keyed by word-aligned address), and bytes within a word
/// are little-endian. A word that was never written reads as zero, but it is *absent*,
/// which matters when fetching instructions (see [`Memory::fetch`]).
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Memory {
    words: BTreeMap<u32, u32>,
    layout: MemoryLayout,
    self_modifying_code: bool,
}
impl Memory {
    /// Creates an empty memory.
    pub fn new(layout: MemoryLayout, self_modifying_code: bool) -> Self {
        Self { words: BTreeMap::new(), layout, self_modifying_code }
    }

    /// The layout of this memory.
    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    /// Checks that a load or store of this width can access this address.
    pub(crate) fn check_data_access(&self, addr: u32, width: Width) -> Result<(), MemErr> {
        if addr % width.bytes() != 0 {
            return Err(MemErr::Misaligned(addr));
        }
        match self.layout.segment_of(addr) {
            None => Err(MemErr::SegmentAccess(addr)),
            Some(seg) if seg.is_text() && !self.self_modifying_code => Err(MemErr::SegmentAccess(addr)),
            Some(_) => Ok(()),
        }
    }

    /// Loads a value (zero-extended) from memory.
    ///
    /// ```
    /// use mips_ensemble::config::MemoryLayout;
    /// use mips_ensemble::sim::mem::{MemErr, Memory, Width};
    ///
    /// let mut mem = Memory::new(MemoryLayout::default(), false);
    /// mem.write(0x1001_0000, Width::Word, 0x1122_3344, &mut ()).unwrap();
    /// assert_eq!(mem.read(0x1001_0001, Width::Byte), Ok(0x33));
    /// assert_eq!(mem.read(0x1001_0002, Width::Half), Ok(0x1122));
    /// assert_eq!(mem.read(0x1001_0002, Width::Word), Err(MemErr::Misaligned(0x1001_0002)));
    /// assert_eq!(mem.read(0x0040_0000, Width::Word), Err(MemErr::SegmentAccess(0x0040_0000)));
    /// ```
    pub fn read(&self, addr: u32, width: Width) -> Result<u32, MemErr> {
        self.check_data_access(addr, width)?;
        Ok(self.read_unchecked(addr, width))
    }

    /// Loads a value (zero-extended) from memory, only checking alignment.
    pub fn read_raw(&self, addr: u32, width: Width) -> Result<u32, MemErr> {
        if addr % width.bytes() != 0 {
            return Err(MemErr::Misaligned(addr));
        }
        Ok(self.read_unchecked(addr, width))
    }

    fn read_unchecked(&self, addr: u32, width: Width) -> u32 {
        let word = self.get_raw(addr & !3);
        (word >> (8 * (addr & 3))) & width.mask()
    }

    /// Stores a value into memory (truncated to the access width).
    pub fn write(&mut self, addr: u32, width: Width, value: u32, sink: &mut dyn MutationSink) -> Result<(), MemErr> {
        self.check_data_access(addr, width)?;

        let aligned = addr & !3;
        let prior = self.words.get(&aligned).copied();
        let shift = 8 * (addr & 3);
        let mask = width.mask() << shift;
        let new = (prior.unwrap_or(0) & !mask) | ((value << shift) & mask);

        sink.record(UndoEntry::Mem { addr: aligned, prior });
        self.words.insert(aligned, new);
        Ok(())
    }

    /// Stores a value into memory without logging, only checking alignment.
    pub fn write_raw(&mut self, addr: u32, width: Width, value: u32) -> Result<(), MemErr> {
        if addr % width.bytes() != 0 {
            return Err(MemErr::Misaligned(addr));
        }
        let shift = 8 * (addr & 3);
        let mask = width.mask() << shift;
        let word = self.words.entry(addr & !3).or_insert(0);
        *word = (*word & !mask) | ((value << shift) & mask);
        Ok(())
    }

    /// Fetches an instruction word.
    ///
    /// This returns `None` if no word was ever written at this address.
    pub fn fetch(&self, addr: u32) -> Result<Option<u32>, MemErr> {
        if addr % 4 != 0 {
            return Err(MemErr::Misaligned(addr));
        }
        match self.layout.segment_of(addr) {
            None => Err(MemErr::SegmentAccess(addr)),
            Some(seg) if !seg.is_text() && !self.self_modifying_code => Err(MemErr::SegmentAccess(addr)),
            Some(_) => Ok(self.words.get(&addr).copied()),
        }
    }

    /// Reads the word containing this address (zero if absent), without any checks.
    pub fn get_raw(&self, addr: u32) -> u32 {
        self.get_word(addr).unwrap_or(0)
    }

    /// Reads the word containing this address (if it is present), without any checks.
    pub fn get_word(&self, addr: u32) -> Option<u32> {
        self.words.get(&(addr & !3)).copied()
    }

    /// Writes a word without any checks or logging.
    pub fn set_word_raw(&mut self, addr: u32, value: u32) {
        self.words.insert(addr & !3, value);
    }

    /// Writes a byte without any checks or logging.
    pub fn set_byte_raw(&mut self, addr: u32, value: u8) {
        let shift = 8 * (addr & 3);
        let word = self.words.entry(addr & !3).or_insert(0);
        *word = (*word & !(0xFF << shift)) | (u32::from(value) << shift);
    }

    /// Restores a word to a prior state (which may be absent).
    pub(crate) fn restore_word(&mut self, addr: u32, prior: Option<u32>) {
        match prior {
            Some(w) => { self.words.insert(addr, w); },
            None => { self.words.remove(&addr); },
        }
    }

    /// Iterates over every present word, in address order.
    pub fn words(&self) -> impl Iterator<Item=(u32, u32)> + '_ {
        self.words.iter().map(|(&a, &w)| (a, w))
    }
}

/// The register file: the 32 general purpose registers, the PC, HI, and LO.
///
/// Register `$zero` is hard-wired to 0.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RegFile {
    gprs: [u32; 32],
    pc: u32,
    hi: u32,
    lo: u32,
}
impl RegFile {
    /// Creates a register file with `$gp` and `$sp` initialized from the layout.
    pub fn new(layout: &MemoryLayout, pc: u32) -> Self {
        let mut gprs = [0; 32];
        gprs[usize::from(GP.reg_no())] = layout.global_pointer;
        gprs[usize::from(SP.reg_no())] = layout.stack_pointer;
        Self { gprs, pc, hi: 0, lo: 0 }
    }

    /// Reads a register.
    pub fn get(&self, reg: Reg) -> u32 {
        self.gprs[usize::from(reg.reg_no())]
    }

    /// Writes a register. Writes to `$zero` are ignored (and not recorded).
    ///
    /// ```
    /// use mips_ensemble::ast::reg_consts::{T0, ZERO};
    /// use mips_ensemble::config::MemoryLayout;
    /// use mips_ensemble::sim::mem::RegFile;
    ///
    /// let mut regs = RegFile::new(&MemoryLayout::default(), 0x0040_0000);
    /// regs.set(ZERO, 5, &mut ());
    /// regs.set(T0, 5, &mut ());
    /// assert_eq!(regs.get(ZERO), 0);
    /// assert_eq!(regs.get(T0), 5);
    /// ```
    pub fn set(&mut self, reg: Reg, value: u32, sink: &mut dyn MutationSink) {
        if reg.reg_no() == 0 { return; }

        let slot = &mut self.gprs[usize::from(reg.reg_no())];
        sink.record(UndoEntry::Reg { reg, prior: *slot });
        *slot = value;
    }

    /// Writes a register without logging.
    pub fn set_raw(&mut self, reg: Reg, value: u32) {
        if reg.reg_no() != 0 {
            self.gprs[usize::from(reg.reg_no())] = value;
        }
    }

    /// All general purpose registers.
    pub fn gprs(&self) -> &[u32; 32] {
        &self.gprs
    }

    /// The program counter.
    pub fn pc(&self) -> u32 {
        self.pc
    }
    /// Writes the program counter.
    pub fn set_pc(&mut self, value: u32, sink: &mut dyn MutationSink) {
        sink.record(UndoEntry::Pc(self.pc));
        self.pc = value;
    }
    pub(crate) fn set_pc_raw(&mut self, value: u32) {
        self.pc = value;
    }

    /// The HI register.
    pub fn hi(&self) -> u32 {
        self.hi
    }
    /// Writes the HI register.
    pub fn set_hi(&mut self, value: u32, sink: &mut dyn MutationSink) {
        sink.record(UndoEntry::Hi(self.hi));
        self.hi = value;
    }
    pub(crate) fn set_hi_raw(&mut self, value: u32) {
        self.hi = value;
    }

    /// The LO register.
    pub fn lo(&self) -> u32 {
        self.lo
    }
    /// Writes the LO register.
    pub fn set_lo(&mut self, value: u32, sink: &mut dyn MutationSink) {
        sink.record(UndoEntry::Lo(self.lo));
        self.lo = value;
    }
    pub(crate) fn set_lo_raw(&mut self, value: u32) {
        self.lo = value;
    }
}

/// Register numbers of the coprocessor 0 registers.
pub mod cop0_regs {
    /// The address of the last invalid memory access.
    pub const BAD_VADDR: u8 = 8;
    /// The status register.
    pub const STATUS: u8 = 12;
    /// The cause of the last exception.
    pub const CAUSE: u8 = 13;
    /// The PC of the last exception.
    pub const EPC: u8 = 14;
}

/// The coprocessor 0 registers.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Cop0([u32; 32]);
impl Cop0 {
    /// The initial value of the status register
    /// (user mode, interrupts enabled, all interrupt masks set).
    pub const INITIAL_STATUS: u32 = 0x0000_FF11;

    /// The exception level bit of the status register.
    pub const STATUS_EXL: u32 = 1 << 1;
    /// The branch delay bit of the cause register.
    pub const CAUSE_BD: u32 = 1 << 31;

    /// Creates the coprocessor 0 registers in their initial state.
    pub fn new() -> Self {
        let mut regs = [0; 32];
        regs[usize::from(cop0_regs::STATUS)] = Self::INITIAL_STATUS;
        Self(regs)
    }

    /// Reads a register.
    pub fn get(&self, reg: u8) -> u32 {
        self.0[usize::from(reg & 0x1F)]
    }

    /// Writes a register.
    pub fn set(&mut self, reg: u8, value: u32, sink: &mut dyn MutationSink) {
        let reg = reg & 0x1F;
        let slot = &mut self.0[usize::from(reg)];
        sink.record(UndoEntry::Cop0 { reg, prior: *slot });
        *slot = value;
    }
    pub(crate) fn set_raw(&mut self, reg: u8, value: u32) {
        self.0[usize::from(reg & 0x1F)] = value;
    }

    /// All registers.
    pub fn regs(&self) -> &[u32; 32] {
        &self.0
    }
}
impl Default for Cop0 {
    fn default() -> Self {
        Self::new()
    }
}

/// All state that executing an instruction can mutate.
#[derive(Debug, Clone)]
pub struct Machine {
    /// The memory.
    pub mem: Memory,
    /// The register file.
    pub regs: RegFile,
    /// The coprocessor 0 registers.
    pub cop0: Cop0,
    pending_branch: Option<u32>,
    heap_break: u32,
    randoms: HashMap<u32, StdRng>,
}
impl Machine {
    /// Creates a machine with empty memory, starting at the given PC.
    pub fn new(layout: MemoryLayout, self_modifying_code: bool, pc: u32) -> Self {
        Self {
            mem: Memory::new(layout, self_modifying_code),
            regs: RegFile::new(&layout, pc),
            cop0: Cop0::new(),
            pending_branch: None,
            heap_break: layout.heap_base,
            randoms: HashMap::new(),
        }
    }

    /// Copies program arguments to the top of the stack.
    ///
    /// The null-terminated strings are packed downward from the stack base.
    /// Below them (or at the initial `$sp`, if there is room) is `argc`,
    /// followed by the `argv` pointers and a null pointer.
    /// `$sp` is set to the address of `argc`, `$a0` to `argc`, and `$a1` to `argv`.
    ///
    /// This does nothing if there are no arguments.
    pub fn store_program_arguments(&mut self, args: &[String]) {
        if args.is_empty() { return; }
        let layout = *self.mem.layout();

        let mut high = layout.stack_base;
        let mut starts = Vec::with_capacity(args.len());
        for arg in args {
            self.mem.set_byte_raw(high, 0);
            for &b in arg.as_bytes().iter().rev() {
                high = high.wrapping_sub(1);
                self.mem.set_byte_raw(high, b);
            }
            starts.push(high);
            high = high.wrapping_sub(1);
        }

        let mut addr = match high < layout.stack_pointer {
            true  => (high & !3).wrapping_sub(4),
            false => layout.stack_pointer,
        };
        self.mem.set_word_raw(addr, 0);
        for &start in starts.iter().rev() {
            addr = addr.wrapping_sub(4);
            self.mem.set_word_raw(addr, start);
        }
        addr = addr.wrapping_sub(4);
        self.mem.set_word_raw(addr, args.len() as u32);

        self.regs.set_raw(SP, addr);
        self.regs.set_raw(A0, args.len() as u32);
        self.regs.set_raw(A1, addr.wrapping_add(4));
    }

    /// The target of a taken branch whose delay slot has not executed yet.
    pub fn pending_branch(&self) -> Option<u32> {
        self.pending_branch
    }
    /// Sets or clears the pending branch.
    pub fn set_pending_branch(&mut self, target: Option<u32>, sink: &mut dyn MutationSink) {
        sink.record(UndoEntry::PendingBranch(self.pending_branch));
        self.pending_branch = target;
    }

    /// The first unallocated address of the heap.
    pub fn heap_break(&self) -> u32 {
        self.heap_break
    }
    /// Moves the heap break.
    pub fn set_heap_break(&mut self, value: u32, sink: &mut dyn MutationSink) {
        sink.record(UndoEntry::HeapBreak(self.heap_break));
        self.heap_break = value;
    }

    /// Gets a random stream for mutation, creating it (with the given fallback) if needed.
    pub(crate) fn random_stream(&mut self, id: u32, create: impl FnOnce() -> StdRng, sink: &mut dyn MutationSink) -> &mut StdRng {
        sink.record(UndoEntry::Random { id, prior: self.randoms.get(&id).cloned().map(Box::new) });
        self.randoms.entry(id).or_insert_with(create)
    }
    /// Replaces a random stream.
    pub(crate) fn set_random_stream(&mut self, id: u32, rng: StdRng, sink: &mut dyn MutationSink) {
        let prior = self.randoms.insert(id, rng);
        sink.record(UndoEntry::Random { id, prior: prior.map(Box::new) });
    }

    /// Applies the prior value of an undo entry.
    pub(crate) fn undo(&mut self, entry: UndoEntry) {
        match entry {
            UndoEntry::Reg { reg, prior } => self.regs.set_raw(reg, prior),
            UndoEntry::Mem { addr, prior } => self.mem.restore_word(addr, prior),
            UndoEntry::Pc(prior) => self.regs.set_pc_raw(prior),
            UndoEntry::Hi(prior) => self.regs.set_hi_raw(prior),
            UndoEntry::Lo(prior) => self.regs.set_lo_raw(prior),
            UndoEntry::Cop0 { reg, prior } => self.cop0.set_raw(reg, prior),
            UndoEntry::PendingBranch(prior) => self.pending_branch = prior,
            UndoEntry::HeapBreak(prior) => self.heap_break = prior,
            UndoEntry::Random { id, prior: Some(rng) } => { self.randoms.insert(id, *rng); },
            UndoEntry::Random { id, prior: None } => { self.randoms.remove(&id); },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::reg_consts::{A0, A1, GP, SP, T0, ZERO};
    use crate::config::MemoryLayout;
    use crate::sim::backstep::UndoEntry;

    use super::{Machine, MemErr, Memory, RegFile, Width};

    #[test]
    fn test_alignment() {
        let mut mem = Memory::new(MemoryLayout::default(), true);
        for addr in [0x0040_0001, 0x1001_0002, 0x1004_0003, 0x7FFF_EFFE, 0x8000_0001, 0x9000_0002] {
            assert_eq!(mem.read(addr, Width::Word), Err(MemErr::Misaligned(addr)));
            assert_eq!(mem.write(addr, Width::Word, 0, &mut ()), Err(MemErr::Misaligned(addr)));
        }
        assert_eq!(mem.read(0x1001_0001, Width::Half), Err(MemErr::Misaligned(0x1001_0001)));
        assert_eq!(mem.read(0x1001_0001, Width::Byte), Ok(0));
        assert_eq!(mem.fetch(0x0040_0002), Err(MemErr::Misaligned(0x0040_0002)));
    }

    #[test]
    fn test_segments() {
        let mut mem = Memory::new(MemoryLayout::default(), false);
        // unmapped
        assert_eq!(mem.read(0x0000_0000, Width::Word), Err(MemErr::SegmentAccess(0)));
        // text is protected
        assert_eq!(mem.write(0x0040_0000, Width::Word, 1, &mut ()), Err(MemErr::SegmentAccess(0x0040_0000)));
        // data cannot be executed
        assert_eq!(mem.fetch(0x1001_0000), Err(MemErr::SegmentAccess(0x1001_0000)));
        assert_eq!(mem.fetch(0x0040_0000), Ok(None));

        let mut mem = Memory::new(MemoryLayout::default(), true);
        mem.write(0x0040_0000, Width::Word, 0x2008_0005, &mut ()).unwrap();
        assert_eq!(mem.fetch(0x0040_0000), Ok(Some(0x2008_0005)));
        assert_eq!(mem.fetch(0x1001_0000), Ok(None));
    }

    #[test]
    fn test_byte_order() {
        let mut mem = Memory::new(MemoryLayout::default(), false);
        mem.write(0x1001_0000, Width::Byte, 0x1FF, &mut ()).unwrap();
        mem.write(0x1001_0002, Width::Half, 0xABCD, &mut ()).unwrap();
        assert_eq!(mem.read(0x1001_0000, Width::Word), Ok(0xABCD_00FF));

        mem.set_byte_raw(0x1001_0005, 0x7F);
        assert_eq!(mem.get_word(0x1001_0004), Some(0x7F00));
        assert_eq!(mem.get_word(0x1001_0008), None);
        assert_eq!(mem.get_raw(0x1001_0008), 0);
    }

    #[test]
    fn test_regs() {
        let layout = MemoryLayout::default();
        let mut regs = RegFile::new(&layout, 0x0040_0000);
        assert_eq!(regs.get(GP), 0x1000_8000);
        assert_eq!(regs.get(SP), 0x7FFF_EFFC);

        let mut log: Vec<UndoEntry> = vec![];
        regs.set(ZERO, 9, &mut log);
        regs.set(T0, 9, &mut log);
        regs.set_pc(0x0040_0004, &mut log);
        assert_eq!(regs.get(ZERO), 0);
        assert_eq!(log, [UndoEntry::Reg { reg: T0, prior: 0 }, UndoEntry::Pc(0x0040_0000)]);
    }

    #[test]
    fn test_undo() {
        let mut machine = Machine::new(MemoryLayout::default(), false, 0x0040_0000);
        let before = machine.mem.clone();

        let mut log: Vec<UndoEntry> = vec![];
        machine.mem.write(0x1001_0000, Width::Byte, 1, &mut log).unwrap();
        machine.mem.write(0x1001_0000, Width::Byte, 2, &mut log).unwrap();
        machine.set_heap_break(0x1004_0010, &mut log);
        for entry in log.into_iter().rev() {
            machine.undo(entry);
        }

        assert_eq!(machine.mem, before);
        assert_eq!(machine.mem.get_word(0x1001_0000), None);
        assert_eq!(machine.heap_break(), 0x1004_0000);
    }

    #[test]
    fn test_program_arguments() {
        let layout = MemoryLayout::default();
        let mut machine = Machine::new(layout, false, 0x0040_0000);
        machine.store_program_arguments(&[]);
        assert_eq!(machine.regs.get(SP), layout.stack_pointer);
        assert_eq!(machine.mem.words().count(), 0);

        let args = ["ab".to_string(), "c".to_string()];
        machine.store_program_arguments(&args);

        // "ab" ends at the stack base, and "c" is right below it
        assert_eq!(machine.mem.get_raw(0x7FFF_FFF8), u32::from(b'c') | (u32::from(b'a') << 16) | (u32::from(b'b') << 24));
        assert_eq!(machine.mem.get_raw(0x7FFF_FFFC), 0);

        let sp = layout.stack_pointer - 12;
        assert_eq!(machine.regs.get(SP), sp);
        assert_eq!(machine.regs.get(A0), 2);
        assert_eq!(machine.regs.get(A1), sp + 4);
        assert_eq!(machine.mem.get_raw(sp), 2);
        assert_eq!(machine.mem.get_raw(sp + 4), 0x7FFF_FFFA);
        assert_eq!(machine.mem.get_raw(sp + 8), 0x7FFF_FFF8);
        assert_eq!(machine.mem.get_raw(sp + 12), 0);
    }
}
