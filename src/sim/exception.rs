//! Runtime faults and their dispatch to an exception handler.
//!
//! A [`RuntimeFault`] is raised by an instruction which cannot complete.
//! If an exception handler is loaded, [`dispatch`] routes the fault into it
//! (through coprocessor 0), otherwise the fault is surfaced as a [`FaultReport`].
use super::backstep::MutationSink;
use super::mem::{cop0_regs, Cop0, Machine, MemErr};

/// The kind of memory access which caused an address fault.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum AccessKind {
    /// An instruction fetch.
    Fetch,
    /// A load.
    Load,
    /// A store.
    Store,
}
impl std::fmt::Display for AccessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessKind::Fetch => f.write_str("fetch"),
            AccessKind::Load  => f.write_str("load"),
            AccessKind::Store => f.write_str("store"),
        }
    }
}

/// A fault raised while executing an instruction.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum RuntimeFault {
    /// Memory was accessed at an address which is not aligned to the access width.
    Misaligned {
        /// The address accessed.
        addr: u32,
        /// The kind of access.
        access: AccessKind
    },
    /// Memory was accessed outside of the segments this access may touch.
    SegmentAccess {
        /// The address accessed.
        addr: u32,
        /// The kind of access.
        access: AccessKind
    },
    /// Signed arithmetic overflowed.
    Overflow,
    /// The fetched word does not decode to any instruction.
    ReservedInstruction(u32),
    /// A `break` instruction was executed (holding its code).
    Break(u32),
    /// A trap instruction's condition held.
    Trap,
    /// The syscall number in `$v0` is not a known service.
    InvalidSyscall(u32),
    /// A syscall could not complete due to its input.
    SyscallInput(String),
}
impl RuntimeFault {
    /// Converts a memory error into a fault.
    pub fn from_mem(err: MemErr, access: AccessKind) -> Self {
        match err {
            MemErr::Misaligned(addr)    => RuntimeFault::Misaligned { addr, access },
            MemErr::SegmentAccess(addr) => RuntimeFault::SegmentAccess { addr, access },
        }
    }

    /// The exception code this fault writes into the Cause register.
    pub fn cause_code(&self) -> u32 {
        match self {
            RuntimeFault::Misaligned { access: AccessKind::Store, .. } => 5,
            RuntimeFault::SegmentAccess { access: AccessKind::Store, .. } => 5,
            RuntimeFault::Misaligned { .. } => 4,
            RuntimeFault::SegmentAccess { .. } => 4,
            RuntimeFault::InvalidSyscall(_) => 8,
            RuntimeFault::SyscallInput(_) => 8,
            RuntimeFault::Break(_) => 9,
            RuntimeFault::ReservedInstruction(_) => 10,
            RuntimeFault::Overflow => 12,
            RuntimeFault::Trap => 13,
        }
    }

    /// The address which caused an address fault (if this is one).
    pub fn bad_address(&self) -> Option<u32> {
        match self {
            RuntimeFault::Misaligned { addr, .. } | RuntimeFault::SegmentAccess { addr, .. } => Some(*addr),
            _ => None,
        }
    }
}
impl std::fmt::Display for RuntimeFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeFault::Misaligned { addr, access }    => write!(f, "{access} address {addr:#010x} is not aligned on its access width"),
            RuntimeFault::SegmentAccess { addr, access } => write!(f, "{access} address {addr:#010x} is out of range or not accessible"),
            RuntimeFault::Overflow                => f.write_str("arithmetic overflow"),
            RuntimeFault::ReservedInstruction(w)  => write!(f, "reserved instruction {w:#010x}"),
            RuntimeFault::Break(code)             => write!(f, "break instruction executed (code {code})"),
            RuntimeFault::Trap                    => f.write_str("trap condition held"),
            RuntimeFault::InvalidSyscall(n)       => write!(f, "invalid or unimplemented syscall {n}"),
            RuntimeFault::SyscallInput(msg)       => write!(f, "syscall failed: {msg}"),
        }
    }
}
impl std::error::Error for RuntimeFault {}
impl crate::err::Error for RuntimeFault {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            RuntimeFault::Misaligned { .. } => Some("words must be accessed at multiples of 4 and halfwords at multiples of 2".into()),
            RuntimeFault::SegmentAccess { access: AccessKind::Fetch, .. } => Some("instructions can only be fetched from the text segments unless self-modifying code is enabled".into()),
            RuntimeFault::SegmentAccess { .. } => Some("the text segments can only be accessed if self-modifying code is enabled".into()),
            RuntimeFault::Overflow => Some("use the unsigned variant (e.g., addu) to ignore overflow".into()),
            RuntimeFault::InvalidSyscall(_) => Some("the syscall number is read from $v0".into()),
            _ => None,
        }
    }
}

/// A fault which was not handled, along with where it happened.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct FaultReport {
    /// The fault.
    pub fault: RuntimeFault,
    /// The PC of the faulting instruction.
    pub pc: u32,
    /// The exception code of the fault.
    pub cause: u32,
    /// The address which caused the fault (for address faults).
    pub bad_address: Option<u32>,
}
impl FaultReport {
    /// Creates a report for a fault at a given PC.
    pub fn new(fault: RuntimeFault, pc: u32) -> Self {
        let cause = fault.cause_code();
        let bad_address = fault.bad_address();
        Self { fault, pc, cause, bad_address }
    }
}
impl std::fmt::Display for FaultReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime exception at {:#010x}: {}", self.pc, self.fault)
    }
}
impl std::error::Error for FaultReport {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.fault)
    }
}
impl crate::err::Error for FaultReport {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        crate::err::Error::help(&self.fault)
    }
}

/// Whether an exception handler is loaded.
pub fn handler_loaded(machine: &Machine) -> bool {
    let handler = machine.mem.layout().exception_handler;
    machine.mem.get_word(handler).is_some()
}

/// Routes a fault raised by the instruction at `pc`.
///
/// If an exception handler is loaded, coprocessor 0 is updated,
/// the PC is redirected to the handler, and this returns `Ok`.
/// Otherwise, this function mutates nothing and the fault is returned as a report.
/// Any mutations the faulting instruction made before the fault
/// (such as consuming the pending branch of its delay slot) are left in place,
/// and remain in the same undo group.
///
/// `in_delay_slot` indicates the faulting instruction is executing in the delay slot of a branch.
pub fn dispatch(machine: &mut Machine, fault: RuntimeFault, pc: u32, in_delay_slot: bool, sink: &mut dyn MutationSink) -> Result<(), FaultReport> {
    let report = FaultReport::new(fault, pc);
    if !handler_loaded(machine) {
        return Err(report);
    }

    let (epc, bd) = match in_delay_slot {
        true  => (pc.wrapping_sub(4), Cop0::CAUSE_BD),
        false => (pc, 0),
    };
    tracing::debug!("dispatching {} to exception handler (EPC = {epc:#010x})", report.fault);

    machine.cop0.set(cop0_regs::EPC, epc, sink);
    machine.cop0.set(cop0_regs::CAUSE, bd | (report.cause << 2), sink);
    if let Some(addr) = report.bad_address {
        machine.cop0.set(cop0_regs::BAD_VADDR, addr, sink);
    }
    let status = machine.cop0.get(cop0_regs::STATUS);
    machine.cop0.set(cop0_regs::STATUS, status | Cop0::STATUS_EXL, sink);
    if machine.pending_branch().is_some() {
        machine.set_pending_branch(None, sink);
    }
    let handler = machine.mem.layout().exception_handler;
    machine.regs.set_pc(handler, sink);
    Ok(())
}

/// Returns from an exception handler (`eret`).
///
/// This sets the PC to EPC and clears the exception level.
pub fn eret(machine: &mut Machine, sink: &mut dyn MutationSink) {
    let status = machine.cop0.get(cop0_regs::STATUS);
    machine.cop0.set(cop0_regs::STATUS, status & !Cop0::STATUS_EXL, sink);
    let epc = machine.cop0.get(cop0_regs::EPC);
    machine.regs.set_pc(epc, sink);
}
