//! Undo logging for the simulator.
//!
//! Every mutation of the machine state first reports the prior value to a [`MutationSink`].
//! The [`BackStepper`] groups those reports per executed instruction,
//! which lets the simulator undo instructions one at a time.
use std::collections::VecDeque;

use rand::rngs::StdRng;

use crate::ast::Reg;

use super::mem::Machine;

/// The prior value of a piece of machine state, from before a mutation.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum UndoEntry {
    /// A general purpose register.
    Reg {
        /// The register.
        reg: Reg,
        /// Its prior value.
        prior: u32
    },
    /// A memory word. The prior value is `None` if the word was absent.
    Mem {
        /// The word-aligned address.
        addr: u32,
        /// Its prior value.
        prior: Option<u32>
    },
    /// The PC.
    Pc(u32),
    /// The HI register.
    Hi(u32),
    /// The LO register.
    Lo(u32),
    /// A coprocessor 0 register.
    Cop0 {
        /// The register number.
        reg: u8,
        /// Its prior value.
        prior: u32
    },
    /// The pending branch target.
    PendingBranch(Option<u32>),
    /// The heap break.
    HeapBreak(u32),
    /// A random number stream. The prior value is `None` if the stream did not exist.
    Random {
        /// The stream's ID.
        id: u32,
        /// Its prior state.
        prior: Option<Box<StdRng>>
    },
}

/// Something which accepts records of mutations.
pub trait MutationSink {
    /// Records the prior value of some state which is about to be mutated.
    fn record(&mut self, entry: UndoEntry);
}
/// Discards every record.
impl MutationSink for () {
    fn record(&mut self, _entry: UndoEntry) {}
}
impl MutationSink for Vec<UndoEntry> {
    fn record(&mut self, entry: UndoEntry) {
        self.push(entry);
    }
}

/// A bounded log of executed instructions which can be undone.
///
/// Each instruction's mutations are collected into a group
/// between [`BackStepper::begin`] and [`BackStepper::end`].
/// Once more than `limit` groups are held, the oldest group is discarded.
#[derive(Debug, Clone)]
pub struct BackStepper {
    enabled: bool,
    limit: usize,
    groups: VecDeque<Vec<UndoEntry>>,
    open: Option<Vec<UndoEntry>>,
}
impl BackStepper {
    /// Creates a new back-stepper.
    ///
    /// If it is not enabled, it records nothing.
    pub fn new(enabled: bool, limit: usize) -> Self {
        Self { enabled, limit, groups: VecDeque::new(), open: None }
    }

    /// Whether this back-stepper records anything.
    pub fn is_enabled(&self) -> bool {
        self.enabled && self.limit > 0
    }

    /// Opens a new group.
    pub fn begin(&mut self) {
        if self.is_enabled() {
            self.open = Some(vec![]);
        }
    }

    /// Closes the open group, committing it to the log.
    pub fn end(&mut self) {
        let Some(group) = self.open.take() else { return };

        self.groups.push_back(group);
        while self.groups.len() > self.limit {
            self.groups.pop_front();
        }
    }

    /// Closes the open group without committing it,
    /// returning what was recorded so far.
    pub fn abort(&mut self) -> Vec<UndoEntry> {
        self.open.take().unwrap_or_default()
    }

    /// Undoes the most recent group.
    ///
    /// This returns whether there was a group to undo.
    pub fn step_back(&mut self, machine: &mut Machine) -> bool {
        let Some(group) = self.groups.pop_back() else { return false };

        for entry in group.into_iter().rev() {
            machine.undo(entry);
        }
        true
    }

    /// Discards every group.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.open = None;
    }

    /// The number of groups which can be undone.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether there are no groups which can be undone.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
impl MutationSink for BackStepper {
    fn record(&mut self, entry: UndoEntry) {
        if let Some(group) = &mut self.open {
            group.push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::reg_consts::{T0, T1};
    use crate::config::MemoryLayout;
    use crate::sim::mem::{Machine, Width};

    use super::BackStepper;

    fn machine() -> Machine {
        Machine::new(MemoryLayout::default(), false, 0x0040_0000)
    }

    #[test]
    fn test_groups() {
        let mut m = machine();
        let mut bs = BackStepper::new(true, 10);

        bs.begin();
        m.regs.set(T0, 1, &mut bs);
        m.regs.set(T1, 2, &mut bs);
        bs.end();
        bs.begin();
        m.regs.set(T0, 3, &mut bs);
        m.mem.write(0x1001_0000, Width::Word, 4, &mut bs).unwrap();
        bs.end();
        assert_eq!(bs.len(), 2);

        assert!(bs.step_back(&mut m));
        assert_eq!((m.regs.get(T0), m.regs.get(T1)), (1, 2));
        assert_eq!(m.mem.get_word(0x1001_0000), None);

        assert!(bs.step_back(&mut m));
        assert_eq!((m.regs.get(T0), m.regs.get(T1)), (0, 0));
        assert!(!bs.step_back(&mut m));
    }

    #[test]
    fn test_limit() {
        let mut m = machine();
        let mut bs = BackStepper::new(true, 3);

        for i in 1..=5 {
            bs.begin();
            m.regs.set(T0, i, &mut bs);
            bs.end();
        }
        assert_eq!(bs.len(), 3);

        while bs.step_back(&mut m) {}
        // the first two writes are no longer undoable
        assert_eq!(m.regs.get(T0), 2);
    }

    #[test]
    fn test_disabled_and_abort() {
        let mut m = machine();
        let mut bs = BackStepper::new(false, 10);
        bs.begin();
        m.regs.set(T0, 1, &mut bs);
        bs.end();
        assert!(bs.is_empty());

        let mut bs = BackStepper::new(true, 10);
        bs.begin();
        m.regs.set(T0, 2, &mut bs);
        let partial = bs.abort();
        bs.end();
        assert_eq!(partial.len(), 1);
        assert!(bs.is_empty());
    }
}
