//! Observation of the simulator from the outside.
//!
//! This module holds two observers:
//! - [`AccessObserver`], which stores which accesses occurred at a given memory word.
//!   You would typically access it via [`Simulator::observer_mut`],
//!   and read or update accesses via its [`get_mem_accesses`] and [`take_mem_accesses`] methods.
//! - [`EventChannel`], a one-way stream of [`SimEvent`]s
//!   (subscribe to it with [`Simulator::subscribe`]).
//!
//! [`Simulator::observer_mut`]: crate::sim::Simulator::observer_mut
//! [`Simulator::subscribe`]: crate::sim::Simulator::subscribe
//! [`get_mem_accesses`]: AccessObserver::get_mem_accesses
//! [`take_mem_accesses`]: AccessObserver::take_mem_accesses

use std::collections::BTreeMap;

use crossbeam_channel as cbc;

use super::exception::FaultReport;
use super::{SimState, Termination};

/// The set of accesses which have occurred at this location.
///
/// ## Example
///
/// ```
/// # use mips_ensemble::sim::observer::AccessSet;
///
/// let accesses = AccessSet::READ;
/// assert!(accesses.accessed());
/// assert!(accesses.read());
/// assert!(!accesses.written());
/// assert!(!accesses.modified());
/// ```
#[derive(Default, Clone, Copy, PartialEq, Eq)]
pub struct AccessSet(u8);
impl AccessSet {
    /// Set with only the read flag enabled.
    pub const READ: Self = Self(1 << 0);
    /// Set with only the write flag enabled.
    pub const WRITTEN: Self = Self(1 << 1);
    /// Set with only the modify flag enabled.
    pub const MODIFIED: Self = Self(1 << 2);

    /// True if any access has occurred.
    pub fn accessed(&self) -> bool {
        self.0 != 0
    }

    /// True if a read has occurred.
    pub fn read(&self) -> bool {
        self.0 & Self::READ.0 != 0
    }
    /// True if a write has occurred (does not necessarily have to change data).
    pub fn written(&self) -> bool {
        self.0 & Self::WRITTEN.0 != 0
    }
    /// True if a write has occurred (data must change).
    pub fn modified(&self) -> bool {
        self.0 & Self::MODIFIED.0 != 0
    }
}
impl std::ops::BitOr for AccessSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}
impl std::ops::BitOrAssign for AccessSet {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}
impl std::fmt::Debug for AccessSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessSet")
            .field("read", &self.read())
            .field("written", &self.written())
            .field("modified", &self.modified())
            .finish()
    }
}

/// Tracks the accesses made by loads and stores, keyed by word-aligned address.
#[derive(Debug, Default)]
pub struct AccessObserver {
    mem: BTreeMap<u32, AccessSet>
}
impl AccessObserver {
    /// Creates a new access observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all accesses.
    pub fn clear(&mut self) {
        self.mem.clear();
    }

    /// Gets the access set for the memory word containing the given address.
    pub fn get_mem_accesses(&self, addr: u32) -> AccessSet {
        self.mem.get(&(addr & !3)).copied().unwrap_or_default()
    }

    /// Adds new flags to the access set for the memory word containing the given address.
    pub fn update_mem_accesses(&mut self, addr: u32, set: AccessSet) {
        *self.mem.entry(addr & !3).or_default() |= set;
    }

    /// Takes all memory accesses which have occurred since last clear,
    /// as well as clearing memory accesses.
    ///
    /// This iterator is sorted in address order.
    pub fn take_mem_accesses(&mut self) -> impl Iterator<Item=(u32, AccessSet)> {
        std::mem::take(&mut self.mem).into_iter()
    }
}

/// Something that happened in the simulator.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum SimEvent {
    /// The simulator moved to a new state.
    StateChanged(SimState),
    /// The instruction at the given address executed.
    Stepped {
        /// The address of the instruction.
        pc: u32
    },
    /// The most recent instruction was undone.
    SteppedBack {
        /// The PC after undoing.
        pc: u32
    },
    /// Execution paused at a breakpoint (before executing the instruction there).
    BreakpointHit(u32),
    /// A fault occurred that no handler could handle.
    Fault(FaultReport),
    /// The program terminated.
    Terminated(Termination),
}

/// A one-way broadcast of [`SimEvent`]s to any number of subscribers.
///
/// Subscribers which have been dropped are pruned on the next emit.
#[derive(Debug, Default)]
pub struct EventChannel {
    senders: Vec<cbc::Sender<SimEvent>>
}
impl EventChannel {
    /// Creates a channel with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new subscriber.
    pub fn subscribe(&mut self) -> cbc::Receiver<SimEvent> {
        let (tx, rx) = cbc::unbounded();
        self.senders.push(tx);
        rx
    }

    /// Whether anyone is listening.
    pub fn has_subscribers(&self) -> bool {
        !self.senders.is_empty()
    }

    /// Sends an event to every subscriber.
    pub fn emit(&mut self, event: SimEvent) {
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
