//! Simulating and execution for MIPS assembly.
//!
//! This module is focused on executing fully assembled code (i.e., [`Program`]).
//!
//! This module consists of:
//! - [`Simulator`]: The struct that simulates assembled code.
//! - [`mem`]: The module handling memory, the register file, and coprocessor 0.
//! - [`backstep`]: The module handling the undo log, which lets execution run backwards.
//! - [`exception`]: The module handling runtime faults and the exception handler.
//! - [`syscall`]: The module holding the system call services.
//! - [`io`]: The module handling the console that syscalls read from and write to.
//! - [`debug`]: The module handling breakpoints.
//! - [`observer`]: The module handling memory access tracking and the event channel.
//! - [`dump`]: The module handling memory dump formats.
//! - [`radix`]: The module handling number bases for displaying values.
//!
//! # Usage
//!
//! To simulate some code, you need to instantiate a Simulator and assemble (or load) a program into it:
//!
//! ```
//! use mips_ensemble::asm::SourceFile;
//! use mips_ensemble::ast::reg_consts::T2;
//! use mips_ensemble::sim::{Simulator, StopReason, Termination};
//!
//! let src = "
//!     main: addi $t0, $zero, 5
//!           addi $t1, $zero, 7
//!           add  $t2, $t0, $t1
//! ";
//! let mut sim = Simulator::new(Default::default()).unwrap();
//! sim.assemble(&[SourceFile::new("main.s", src)]).unwrap();
//!
//! let reason = sim.go().unwrap();
//! assert_eq!(reason, StopReason::Terminated(Termination::DroppedOffBottom));
//! assert_eq!(sim.reg(T2), 12);
//! ```
//!
//! ## Settings
//!
//! Here, we define `sim` to have the default settings.
//! We could also configure the simulator by editing the settings. For example,
//! if we wish to enable delayed branching, we can edit the settings like so:
//!
//! ```
//! # use mips_ensemble::config::Settings;
//! # use mips_ensemble::sim::Simulator;
//! let mut sim = Simulator::new(Settings { delayed_branching: true, ..Default::default() }).unwrap();
//! ```
//!
//! All of the available settings can be found in [`Settings`].
//!
//! ## Execution
//!
//! Beyond the basic [`Simulator::go`] (which runs until termination),
//! there are also:
//! - [`Simulator::step`], [`Simulator::step_back`]: manual step-by-step simulation (in both directions)
//! - [`Simulator::go_with_limit`]: execution with a bounded number of steps
//! - [`Simulator::control`]: a handle which can pause or stop [`Simulator::go`] from another thread
//!
//! ```
//! use mips_ensemble::asm::SourceFile;
//! use mips_ensemble::ast::reg_consts::T0;
//! use mips_ensemble::sim::Simulator;
//!
//! let src = "
//!     addi $t0, $zero, 1
//!     addi $t0, $t0, 1
//!     addi $t0, $t0, 1
//! ";
//! let mut sim = Simulator::new(Default::default()).unwrap();
//! sim.assemble(&[SourceFile::new("main.s", src)]).unwrap();
//!
//! sim.step().unwrap();
//! sim.step().unwrap();
//! assert_eq!(sim.reg(T0), 2);
//! sim.step_back();
//! assert_eq!(sim.reg(T0), 1);
//! ```
//!
//! ## Querying State
//!
//! You can query (or set) a variety of different state values from the simulator.
//!
//! - To access registers, use [`Simulator::reg`] and [`Simulator::set_reg`].
//! - To access memory, use [`Simulator::read_mem`] and [`Simulator::write_mem`].
//!   These bypass the segment protections and are not undoable.
//! - To access the entire machine (HI, LO, coprocessor 0, etc.), use [`Simulator::machine`].
//! - To capture everything that stepping back restores, use [`Simulator::snapshot`].
//!
//! [`Program`]: crate::asm::Program
//! [`Settings`]: crate::config::Settings

pub mod backstep;
pub mod debug;
pub mod dump;
pub mod exception;
pub mod io;
pub mod mem;
pub mod observer;
pub mod radix;
pub mod syscall;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crossbeam_channel as cbc;

use crate::asm::{self, AsmErrors, Program, ProgramStatement, SourceFile};
use crate::ast::reg_consts::RA;
use crate::ast::sim::{Op, SimInstr};
use crate::ast::Reg;
use crate::config::{ConfigErr, Settings};

use self::backstep::{BackStepper, MutationSink};
use self::debug::Breakpoints;
use self::exception::{AccessKind, FaultReport, RuntimeFault};
use self::io::{EmptyIO, SyscallIO};
use self::mem::{Machine, MemErr, Memory, Width};
use self::observer::{AccessObserver, AccessSet, EventChannel, SimEvent};
use self::radix::NumberBase;
use self::syscall::SyscallOutcome;

/// The state of the simulator.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum SimState {
    /// No program is loaded.
    Idle,
    /// A program is loaded and has not started.
    Ready,
    /// The program is executing.
    Running,
    /// The program was executing and can continue.
    Paused,
    /// The program finished (see [`Simulator::termination`]).
    Terminated,
}
impl std::fmt::Display for SimState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimState::Idle       => f.write_str("idle"),
            SimState::Ready      => f.write_str("ready"),
            SimState::Running    => f.write_str("running"),
            SimState::Paused     => f.write_str("paused"),
            SimState::Terminated => f.write_str("terminated"),
        }
    }
}

/// How a program terminated.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Termination {
    /// An exit syscall was executed, with the given exit code.
    Exit(i32),
    /// Execution reached the end of the program.
    DroppedOffBottom,
    /// Execution was stopped from outside.
    Stopped,
    /// A fault occurred that no handler could handle.
    Fault(FaultReport),
}

/// Why [`Simulator::go`] returned.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum StopReason {
    /// The PC reached an enabled breakpoint (the instruction there has not executed).
    Breakpoint(u32),
    /// A pause was requested.
    Paused,
    /// The maximum number of steps was executed.
    StepLimit,
    /// The program terminated.
    Terminated(Termination),
}

/// Errors that can occur when controlling the simulator.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum SimErr {
    /// No program is loaded.
    NoProgram,
    /// The simulator cannot execute in its current state.
    InvalidState(SimState),
    /// The program terminated due to a fault that no handler could handle.
    Fault(FaultReport),
}
impl std::fmt::Display for SimErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimErr::NoProgram       => f.write_str("no program is loaded"),
            SimErr::InvalidState(s) => write!(f, "cannot execute while simulator is {s}"),
            SimErr::Fault(r)        => r.fmt(f),
        }
    }
}
impl std::error::Error for SimErr {}
impl crate::err::Error for SimErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            SimErr::NoProgram => Some("assemble or load a program first".into()),
            SimErr::InvalidState(SimState::Terminated) => Some("reset the simulator or step back to continue".into()),
            SimErr::InvalidState(_) => None,
            SimErr::Fault(r) => crate::err::Error::help(r),
        }
    }
}

/// Errors that can occur when assembling a program into the simulator.
#[derive(Debug)]
pub enum LoadErr {
    /// The exception handler could not be read.
    Config(ConfigErr),
    /// Assembly failed.
    Asm(AsmErrors),
}
impl std::fmt::Display for LoadErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadErr::Config(e) => e.fmt(f),
            LoadErr::Asm(e) => e.fmt(f),
        }
    }
}
impl std::error::Error for LoadErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadErr::Config(e) => Some(e),
            LoadErr::Asm(e) => Some(e),
        }
    }
}
impl crate::err::Error for LoadErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LoadErr::Config(e) => crate::err::Error::help(e),
            LoadErr::Asm(e) => crate::err::Error::help(e),
        }
    }
}
impl From<ConfigErr> for LoadErr {
    fn from(value: ConfigErr) -> Self {
        LoadErr::Config(value)
    }
}
impl From<AsmErrors> for LoadErr {
    fn from(value: AsmErrors) -> Self {
        LoadErr::Asm(value)
    }
}

/// A thread-safe handle which can pause or stop a running simulator.
///
/// Requests are only checked every [`Settings::checkpoint_interval`] instructions,
/// so a request takes effect at an instruction boundary.
/// A request which arrives while the simulator is not running is discarded when
/// the current (or next) call to [`Simulator::go`] returns.
#[derive(Debug, Clone, Default)]
pub struct SimControl(Arc<AtomicU8>);
impl SimControl {
    const NONE: u8 = 0;
    const PAUSE: u8 = 1;
    const STOP: u8 = 2;

    /// Requests the simulator to pause.
    pub fn pause(&self) {
        // a stop takes precedence over a pause
        let _ = self.0.compare_exchange(Self::NONE, Self::PAUSE, Ordering::Relaxed, Ordering::Relaxed);
    }

    /// Requests the simulator to stop, terminating the program.
    pub fn stop(&self) {
        self.0.store(Self::STOP, Ordering::Relaxed);
    }

    fn take(&self) -> u8 {
        self.0.swap(Self::NONE, Ordering::Relaxed)
    }
}

/// A copy of all state that [`Simulator::step_back`] restores.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Snapshot {
    /// The general purpose registers.
    pub gprs: [u32; 32],
    /// The PC.
    pub pc: u32,
    /// The HI register.
    pub hi: u32,
    /// The LO register.
    pub lo: u32,
    /// The coprocessor 0 registers.
    pub cop0: [u32; 32],
    /// Every present memory word.
    pub mem: BTreeMap<u32, u32>,
    /// The pending branch target.
    pub pending_branch: Option<u32>,
    /// The heap break.
    pub heap_break: u32,
}

/// Anything that can cause a step to abruptly fail to finish.
enum StepBreak {
    /// An exit syscall was executed.
    Exit(i32),
    /// There is no instruction at the PC.
    DroppedOffBottom,
    /// A fault occurred that no handler could handle.
    Fault(FaultReport),
}

/// How control flows after an instruction.
enum Flow {
    /// Continue to the next instruction.
    Next,
    /// Transfer control to the given address.
    Branch(u32),
    /// The instruction already set the PC.
    Set,
    /// Terminate with an exit code.
    Exit(i32),
}

/// Executes assembled code.
pub struct Simulator {
    settings: Settings,
    machine: Machine,
    backstepper: BackStepper,
    breakpoints: Breakpoints,
    io: Box<dyn SyscallIO>,
    observer: AccessObserver,
    events: EventChannel,
    control: SimControl,
    program: Option<Program>,
    state: SimState,
    termination: Option<Termination>,
    instructions_run: u64,
}
impl Simulator where Simulator: Send { /* assert Simulator is send */ }

impl Simulator {
    /// Creates a new simulator with the provided settings.
    ///
    /// This fails if the settings are invalid (see [`Settings::validate`]).
    pub fn new(settings: Settings) -> Result<Self, ConfigErr> {
        settings.validate()?;

        let layout = settings.layout;
        Ok(Self {
            machine: Machine::new(layout, settings.self_modifying_code, layout.text_base),
            backstepper: BackStepper::new(settings.backstepping, settings.backstep_limit),
            breakpoints: Breakpoints::new(),
            io: Box::new(EmptyIO),
            observer: AccessObserver::new(),
            events: EventChannel::new(),
            control: SimControl::default(),
            program: None,
            state: SimState::Idle,
            termination: None,
            instructions_run: 0,
            settings,
        })
    }

    /// Sets the console which syscalls read from and write to.
    pub fn set_io(&mut self, io: impl SyscallIO + 'static) {
        self.io = Box::new(io);
    }

    /// The settings of this simulator.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Assembles source files and loads the result.
    ///
    /// If an exception handler file is configured, it is assembled ahead of the sources.
    pub fn assemble(&mut self, sources: &[SourceFile]) -> Result<&Program, LoadErr> {
        let handler = self.settings.read_exception_handler()?;
        let files: Vec<_> = handler.into_iter()
            .chain(sources.iter().cloned())
            .collect();

        let program = asm::assemble(&files, &self.settings)?;
        Ok(self.install(program))
    }

    /// Reads a main source file (and, with [`Settings::assemble_all`], the other
    /// assembly files in its directory), then assembles and loads them.
    ///
    /// See [`Settings::collect_sources`].
    pub fn assemble_file(&mut self, main: impl AsRef<Path>) -> Result<&Program, LoadErr> {
        let sources = self.settings.collect_sources(main.as_ref())?;
        self.assemble(&sources)
    }

    /// Loads an assembled program, resetting all machine state.
    ///
    /// Any program arguments in the settings are copied onto the stack
    /// (see [`Settings::program_arguments`]).
    pub fn load_program(&mut self, program: Program) {
        self.install(program);
    }

    fn install(&mut self, program: Program) -> &Program {
        let layout = self.settings.layout;
        let mut machine = Machine::new(layout, self.settings.self_modifying_code, program.entry);
        for stmt in &program.statements {
            machine.mem.set_word_raw(stmt.address, stmt.word);
        }
        for (&addr, &byte) in &program.data {
            machine.mem.set_byte_raw(addr, byte);
        }
        machine.store_program_arguments(&self.settings.program_arguments);
        tracing::debug!(
            "loaded {} instructions and {} data bytes (entry = {:#010x})",
            program.statements.len(), program.data.len(), program.entry
        );

        self.machine = machine;
        self.backstepper.clear();
        self.observer.clear();
        self.termination = None;
        self.instructions_run = 0;
        self.set_state(SimState::Ready);
        self.program.insert(program)
    }

    /// Resets the machine state to how it was when the program was loaded.
    ///
    /// Breakpoints are kept.
    pub fn reset(&mut self) {
        match self.program.take() {
            Some(program) => { self.install(program); },
            None => {
                let layout = self.settings.layout;
                self.machine = Machine::new(layout, self.settings.self_modifying_code, layout.text_base);
                self.backstepper.clear();
                self.observer.clear();
                self.termination = None;
                self.instructions_run = 0;
                self.set_state(SimState::Idle);
            }
        }
    }

    fn set_state(&mut self, state: SimState) {
        if self.state != state {
            tracing::debug!("simulator state: {} -> {}", self.state, state);
            self.state = state;
            self.events.emit(SimEvent::StateChanged(state));
        }
    }

    fn check_runnable(&self) -> Result<(), SimErr> {
        match self.state {
            SimState::Idle => Err(SimErr::NoProgram),
            SimState::Ready | SimState::Paused => Ok(()),
            s => Err(SimErr::InvalidState(s)),
        }
    }

    fn terminate(&mut self, termination: Termination) {
        match &termination {
            Termination::Fault(report) => {
                tracing::error!("{report}");
                self.events.emit(SimEvent::Fault(report.clone()));
            },
            t => tracing::info!("program terminated after {} instructions: {t:?}", self.instructions_run),
        }
        self.termination = Some(termination.clone());
        self.set_state(SimState::Terminated);
        self.events.emit(SimEvent::Terminated(termination));
    }

    /// Executes one instruction, committing its mutations as one undoable group.
    ///
    /// If this terminates the program, the termination is returned.
    fn step_once(&mut self) -> Option<Termination> {
        let pc = self.machine.regs.pc();

        self.backstepper.begin();
        let result = self.step_inner();
        match result {
            Err(StepBreak::DroppedOffBottom) => { self.backstepper.abort(); },
            _ => {
                self.backstepper.end();
                self.instructions_run += 1;
                if self.events.has_subscribers() {
                    self.events.emit(SimEvent::Stepped { pc });
                }
            }
        }

        let termination = match result {
            Ok(()) => return None,
            Err(StepBreak::Exit(code)) => Termination::Exit(code),
            Err(StepBreak::DroppedOffBottom) => Termination::DroppedOffBottom,
            Err(StepBreak::Fault(report)) => Termination::Fault(report),
        };
        self.terminate(termination.clone());
        Some(termination)
    }

    fn step_inner(&mut self) -> Result<(), StepBreak> {
        let Self { settings, machine, backstepper, io, observer, .. } = self;
        let sink: &mut dyn MutationSink = backstepper;

        let pc = machine.regs.pc();
        let delay_target = machine.pending_branch();
        let in_delay_slot = delay_target.is_some();

        let raise = |machine: &mut Machine, sink: &mut dyn MutationSink, fault| {
            exception::dispatch(machine, fault, pc, in_delay_slot, sink).map_err(StepBreak::Fault)
        };

        // FETCH
        let word = match machine.mem.fetch(pc) {
            Ok(Some(word)) => word,
            Ok(None) => return Err(StepBreak::DroppedOffBottom),
            Err(e) => return raise(machine, sink, RuntimeFault::from_mem(e, AccessKind::Fetch)),
        };
        if in_delay_slot {
            machine.set_pending_branch(None, sink);
        }

        // DECODE
        let Some(instr) = SimInstr::decode(word) else {
            return raise(machine, sink, RuntimeFault::ReservedInstruction(word));
        };
        tracing::trace!("{pc:#010x}: {} ({:?})", instr.display_at(pc), instr.op().class());

        // EXECUTE
        let mut ctx = ExecCtx {
            machine: &mut *machine,
            sink: &mut *sink,
            io: &mut **io,
            observer: &mut *observer,
            delayed_branching: settings.delayed_branching,
        };
        let flow = match ctx.execute(instr, pc) {
            Ok(flow) => flow,
            Err(fault) => return raise(machine, sink, fault),
        };

        let next = delay_target.unwrap_or(pc.wrapping_add(4));
        match flow {
            Flow::Next => machine.regs.set_pc(next, sink),
            Flow::Branch(target) if settings.delayed_branching => {
                machine.set_pending_branch(Some(target), sink);
                machine.regs.set_pc(next, sink);
            },
            Flow::Branch(target) => machine.regs.set_pc(target, sink),
            Flow::Set => {},
            Flow::Exit(code) => {
                machine.regs.set_pc(next, sink);
                return Err(StepBreak::Exit(code));
            },
        }
        Ok(())
    }

    /// Simulates one step, executing one instruction.
    ///
    /// This returns the state of the simulator after the step
    /// ([`SimState::Paused`] or [`SimState::Terminated`]).
    /// If the instruction faulted and no exception handler is loaded,
    /// the fault report is returned as an error.
    pub fn step(&mut self) -> Result<SimState, SimErr> {
        self.check_runnable()?;
        self.observer.clear();

        match self.step_once() {
            None => self.set_state(SimState::Paused),
            Some(Termination::Fault(report)) => return Err(SimErr::Fault(report)),
            Some(_) => {},
        }
        Ok(self.state)
    }

    /// Undoes the most recently executed instruction.
    ///
    /// If the program had terminated, it is paused again.
    /// This returns whether there was an instruction to undo.
    pub fn step_back(&mut self) -> bool {
        if !self.backstepper.step_back(&mut self.machine) {
            return false;
        }

        self.instructions_run = self.instructions_run.saturating_sub(1);
        if self.state == SimState::Terminated {
            self.termination = None;
            self.set_state(SimState::Paused);
        }
        let pc = self.machine.regs.pc();
        self.events.emit(SimEvent::SteppedBack { pc });
        true
    }

    /// Executes the program until it terminates, hits a breakpoint, or is paused.
    ///
    /// If you would like to limit the maximum number of steps to execute, consider [`Simulator::go_with_limit`].
    pub fn go(&mut self) -> Result<StopReason, SimErr> {
        self.run(None)
    }

    /// Executes the program with a limit on how many steps to execute.
    pub fn go_with_limit(&mut self, max_steps: u64) -> Result<StopReason, SimErr> {
        self.run(Some(max_steps))
    }

    fn run(&mut self, limit: Option<u64>) -> Result<StopReason, SimErr> {
        self.check_runnable()?;
        self.observer.clear();
        self.set_state(SimState::Running);

        let interval = self.settings.checkpoint_interval;
        let mut executed = 0u64;

        // event loop
        // run until:
        // 1. the step limit is reached
        // 2. a pause or stop is requested
        // 3. a breakpoint is hit (except on the first instruction)
        // 4. the program terminates
        let reason = loop {
            if limit.is_some_and(|max| executed >= max) {
                break StopReason::StepLimit;
            }
            if executed % interval == 0 {
                match self.control.take() {
                    SimControl::PAUSE => break StopReason::Paused,
                    SimControl::STOP => {
                        self.terminate(Termination::Stopped);
                        break StopReason::Terminated(Termination::Stopped);
                    },
                    _ => {}
                }
            }

            let pc = self.machine.regs.pc();
            if executed > 0 && self.breakpoints.check(pc) {
                tracing::debug!("hit breakpoint at {pc:#010x}");
                self.events.emit(SimEvent::BreakpointHit(pc));
                break StopReason::Breakpoint(pc);
            }

            match self.step_once() {
                None => executed += 1,
                Some(t) => break StopReason::Terminated(t),
            }
        };

        // discard any request which arrived too late
        self.control.take();

        match reason {
            StopReason::Terminated(Termination::Fault(report)) => Err(SimErr::Fault(report)),
            StopReason::Terminated(t) => Ok(StopReason::Terminated(t)),
            reason => {
                self.set_state(SimState::Paused);
                Ok(reason)
            }
        }
    }

    /// Requests a running [`Simulator::go`] to pause.
    ///
    /// See [`SimControl`] for details.
    pub fn pause(&self) {
        self.control.pause();
    }

    /// Requests a running [`Simulator::go`] to stop.
    ///
    /// See [`SimControl`] for details.
    pub fn stop(&self) {
        self.control.stop();
    }

    /// A handle which can pause or stop this simulator from another thread.
    pub fn control(&self) -> SimControl {
        self.control.clone()
    }

    /// The breakpoints of this simulator.
    pub fn breakpoints(&self) -> &Breakpoints {
        &self.breakpoints
    }
    /// The breakpoints of this simulator, mutably.
    pub fn breakpoints_mut(&mut self) -> &mut Breakpoints {
        &mut self.breakpoints
    }

    /// Subscribes to the simulator's events.
    pub fn subscribe(&mut self) -> cbc::Receiver<SimEvent> {
        self.events.subscribe()
    }

    /// The state of the simulator.
    pub fn state(&self) -> SimState {
        self.state
    }
    /// How the program terminated (if it has).
    pub fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }
    /// The number of instructions executed since the program was loaded.
    pub fn instructions_run(&self) -> u64 {
        self.instructions_run
    }
    /// The number of instructions which can be undone.
    pub fn backstep_len(&self) -> usize {
        self.backstepper.len()
    }

    /// The loaded program (if there is one).
    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }
    /// The statement of the loaded program at the given address.
    pub fn statement_at(&self, addr: u32) -> Option<&ProgramStatement> {
        self.program.as_ref()?.statement_at(addr)
    }

    /// The machine state.
    pub fn machine(&self) -> &Machine {
        &self.machine
    }
    /// The memory.
    pub fn memory(&self) -> &Memory {
        &self.machine.mem
    }
    /// The memory access observer.
    ///
    /// This holds the loads and stores of the most recent call to [`Simulator::step`] or [`Simulator::go`].
    pub fn observer(&self) -> &AccessObserver {
        &self.observer
    }
    /// The memory access observer, mutably.
    pub fn observer_mut(&mut self) -> &mut AccessObserver {
        &mut self.observer
    }

    /// The PC.
    pub fn pc(&self) -> u32 {
        self.machine.regs.pc()
    }
    /// Reads a register.
    pub fn reg(&self, reg: Reg) -> u32 {
        self.machine.regs.get(reg)
    }
    /// Writes a register. This cannot be undone.
    pub fn set_reg(&mut self, reg: Reg, value: u32) {
        self.machine.regs.set_raw(reg, value);
    }

    /// Reads memory, bypassing segment protections.
    pub fn read_mem(&self, addr: u32, width: Width) -> Result<u32, MemErr> {
        self.machine.mem.read_raw(addr, width)
    }
    /// Writes memory, bypassing segment protections. This cannot be undone.
    pub fn write_mem(&mut self, addr: u32, width: Width, value: u32) -> Result<(), MemErr> {
        self.machine.mem.write_raw(addr, width, value)
    }

    /// Formats a register's value in the given base.
    pub fn format_reg(&self, reg: Reg, base: NumberBase) -> String {
        base.format(self.reg(reg))
    }
    /// Formats the word at an address in the given base.
    pub fn format_word(&self, addr: u32, base: NumberBase) -> Result<String, MemErr> {
        self.read_mem(addr, Width::Word).map(|w| base.format(w))
    }

    /// Captures all state that [`Simulator::step_back`] restores.
    pub fn snapshot(&self) -> Snapshot {
        let m = &self.machine;
        Snapshot {
            gprs: *m.regs.gprs(),
            pc: m.regs.pc(),
            hi: m.regs.hi(),
            lo: m.regs.lo(),
            cop0: *m.cop0.regs(),
            mem: m.mem.words().collect(),
            pending_branch: m.pending_branch(),
            heap_break: m.heap_break(),
        }
    }
}

/// Everything an instruction can touch while it executes.
struct ExecCtx<'a> {
    machine: &'a mut Machine,
    sink: &'a mut dyn MutationSink,
    io: &'a mut dyn SyscallIO,
    observer: &'a mut AccessObserver,
    delayed_branching: bool,
}
impl ExecCtx<'_> {
    fn get(&self, reg: Reg) -> u32 {
        self.machine.regs.get(reg)
    }
    fn set(&mut self, reg: Reg, value: u32) {
        self.machine.regs.set(reg, value, self.sink);
    }
    fn set_hilo(&mut self, value: u64) {
        self.machine.regs.set_hi((value >> 32) as u32, self.sink);
        self.machine.regs.set_lo(value as u32, self.sink);
    }
    fn hilo(&self) -> u64 {
        (u64::from(self.machine.regs.hi()) << 32) | u64::from(self.machine.regs.lo())
    }

    fn load(&mut self, addr: u32, width: Width) -> Result<u32, RuntimeFault> {
        let value = self.machine.mem.read(addr, width)
            .map_err(|e| RuntimeFault::from_mem(e, AccessKind::Load))?;
        self.observer.update_mem_accesses(addr, AccessSet::READ);
        Ok(value)
    }
    fn store(&mut self, addr: u32, width: Width, value: u32) -> Result<(), RuntimeFault> {
        let prior = self.machine.mem.get_word(addr);
        self.machine.mem.write(addr, width, value, self.sink)
            .map_err(|e| RuntimeFault::from_mem(e, AccessKind::Store))?;

        let mut set = AccessSet::WRITTEN;
        if prior != self.machine.mem.get_word(addr) {
            set |= AccessSet::MODIFIED;
        }
        self.observer.update_mem_accesses(addr, set);
        Ok(())
    }

    /// The return address stored by linking instructions.
    fn link(&self, pc: u32) -> u32 {
        match self.delayed_branching {
            true  => pc.wrapping_add(8),
            false => pc.wrapping_add(4),
        }
    }

    fn execute(&mut self, instr: SimInstr, pc: u32) -> Result<Flow, RuntimeFault> {
        fn cond(taken: bool, target: u32) -> Flow {
            match taken {
                true  => Flow::Branch(target),
                false => Flow::Next,
            }
        }
        fn trap(cond: bool) -> Result<Flow, RuntimeFault> {
            match cond {
                true  => Err(RuntimeFault::Trap),
                false => Ok(Flow::Next),
            }
        }
        fn jump(target: u32) -> Result<Flow, RuntimeFault> {
            match target % 4 {
                0 => Ok(Flow::Branch(target)),
                _ => Err(RuntimeFault::Misaligned { addr: target, access: AccessKind::Fetch }),
            }
        }

        let (rd, rs_reg, rt_reg) = (instr.rd(), instr.rs(), instr.rt());
        let rs = self.get(rs_reg);
        let rt = self.get(rt_reg);
        let simm = instr.simm();
        let imm = u32::from(instr.imm());
        let addr = rs.wrapping_add_signed(simm);
        let branch = instr.branch_target(pc);

        match instr.op() {
            // SHIFTS
            Op::Sll  => self.set(rd, rt << instr.shamt()),
            Op::Srl  => self.set(rd, rt >> instr.shamt()),
            Op::Sra  => self.set(rd, ((rt as i32) >> instr.shamt()) as u32),
            Op::Sllv => self.set(rd, rt << (rs & 0x1F)),
            Op::Srlv => self.set(rd, rt >> (rs & 0x1F)),
            Op::Srav => self.set(rd, ((rt as i32) >> (rs & 0x1F)) as u32),

            // JUMPS
            Op::J   => return Ok(Flow::Branch(instr.jump_target(pc))),
            Op::Jal => {
                self.set(RA, self.link(pc));
                return Ok(Flow::Branch(instr.jump_target(pc)));
            },
            Op::Jr  => return jump(rs),
            Op::Jalr => {
                let flow = jump(rs)?;
                self.set(rd, self.link(pc));
                return Ok(flow);
            },

            // CONDITIONAL MOVES
            Op::Movz => if rt == 0 { self.set(rd, rs) },
            Op::Movn => if rt != 0 { self.set(rd, rs) },

            // SYSTEM
            Op::Syscall => match syscall::execute(self.machine, self.io, self.sink)? {
                SyscallOutcome::Continue => {},
                SyscallOutcome::Exit(code) => return Ok(Flow::Exit(code)),
            },
            Op::Break => return Err(RuntimeFault::Break(instr.code())),
            Op::Mfc0  => self.set(rt_reg, self.machine.cop0.get(rd.reg_no())),
            Op::Mtc0  => self.machine.cop0.set(rd.reg_no(), rt, self.sink),
            Op::Eret  => {
                exception::eret(self.machine, self.sink);
                return Ok(Flow::Set);
            },

            // HI/LO
            Op::Mfhi => self.set(rd, self.machine.regs.hi()),
            Op::Mflo => self.set(rd, self.machine.regs.lo()),
            Op::Mthi => self.machine.regs.set_hi(rs, self.sink),
            Op::Mtlo => self.machine.regs.set_lo(rs, self.sink),
            Op::Mult  => self.set_hilo((i64::from(rs as i32) * i64::from(rt as i32)) as u64),
            Op::Multu => self.set_hilo(u64::from(rs) * u64::from(rt)),
            Op::Madd  => self.set_hilo(self.hilo().wrapping_add((i64::from(rs as i32) * i64::from(rt as i32)) as u64)),
            Op::Maddu => self.set_hilo(self.hilo().wrapping_add(u64::from(rs) * u64::from(rt))),
            Op::Msub  => self.set_hilo(self.hilo().wrapping_sub((i64::from(rs as i32) * i64::from(rt as i32)) as u64)),
            Op::Msubu => self.set_hilo(self.hilo().wrapping_sub(u64::from(rs) * u64::from(rt))),
            Op::Mul => {
                let product = (i64::from(rs as i32) * i64::from(rt as i32)) as u64;
                self.set_hilo(product);
                self.set(rd, product as u32);
            },
            // division by zero leaves HI and LO unchanged
            Op::Div if rt != 0 => {
                let (a, b) = (rs as i32, rt as i32);
                self.machine.regs.set_hi(a.wrapping_rem(b) as u32, self.sink);
                self.machine.regs.set_lo(a.wrapping_div(b) as u32, self.sink);
            },
            Op::Divu if rt != 0 => {
                self.machine.regs.set_hi(rs % rt, self.sink);
                self.machine.regs.set_lo(rs / rt, self.sink);
            },
            Op::Div | Op::Divu => {},

            // ARITHMETIC
            Op::Add  => self.set(rd, (rs as i32).checked_add(rt as i32).ok_or(RuntimeFault::Overflow)? as u32),
            Op::Addu => self.set(rd, rs.wrapping_add(rt)),
            Op::Sub  => self.set(rd, (rs as i32).checked_sub(rt as i32).ok_or(RuntimeFault::Overflow)? as u32),
            Op::Subu => self.set(rd, rs.wrapping_sub(rt)),
            Op::And  => self.set(rd, rs & rt),
            Op::Or   => self.set(rd, rs | rt),
            Op::Xor  => self.set(rd, rs ^ rt),
            Op::Nor  => self.set(rd, !(rs | rt)),
            Op::Slt  => self.set(rd, u32::from((rs as i32) < (rt as i32))),
            Op::Sltu => self.set(rd, u32::from(rs < rt)),
            Op::Clz  => self.set(rd, rs.leading_zeros()),
            Op::Clo  => self.set(rd, rs.leading_ones()),

            Op::Addi  => self.set(rt_reg, (rs as i32).checked_add(simm).ok_or(RuntimeFault::Overflow)? as u32),
            Op::Addiu => self.set(rt_reg, rs.wrapping_add_signed(simm)),
            Op::Slti  => self.set(rt_reg, u32::from((rs as i32) < simm)),
            Op::Sltiu => self.set(rt_reg, u32::from(rs < simm as u32)),
            Op::Andi  => self.set(rt_reg, rs & imm),
            Op::Ori   => self.set(rt_reg, rs | imm),
            Op::Xori  => self.set(rt_reg, rs ^ imm),
            Op::Lui   => self.set(rt_reg, imm << 16),

            // TRAPS
            Op::Tge  => return trap((rs as i32) >= (rt as i32)),
            Op::Tgeu => return trap(rs >= rt),
            Op::Tlt  => return trap((rs as i32) < (rt as i32)),
            Op::Tltu => return trap(rs < rt),
            Op::Teq  => return trap(rs == rt),
            Op::Tne  => return trap(rs != rt),
            Op::Tgei  => return trap((rs as i32) >= simm),
            Op::Tgeiu => return trap(rs >= simm as u32),
            Op::Tlti  => return trap((rs as i32) < simm),
            Op::Tltiu => return trap(rs < simm as u32),
            Op::Teqi  => return trap(rs as i32 == simm),
            Op::Tnei  => return trap(rs as i32 != simm),

            // BRANCHES
            Op::Beq  => return Ok(cond(rs == rt, branch)),
            Op::Bne  => return Ok(cond(rs != rt, branch)),
            Op::Blez => return Ok(cond((rs as i32) <= 0, branch)),
            Op::Bgtz => return Ok(cond((rs as i32) > 0, branch)),
            Op::Bltz => return Ok(cond((rs as i32) < 0, branch)),
            Op::Bgez => return Ok(cond((rs as i32) >= 0, branch)),
            // the link is written whether or not the branch is taken
            Op::Bltzal => {
                self.set(RA, self.link(pc));
                return Ok(cond((rs as i32) < 0, branch));
            },
            Op::Bgezal => {
                self.set(RA, self.link(pc));
                return Ok(cond((rs as i32) >= 0, branch));
            },

            // LOADS & STORES
            Op::Lb  => { let v = self.load(addr, Width::Byte)?; self.set(rt_reg, v as u8 as i8 as u32) },
            Op::Lh  => { let v = self.load(addr, Width::Half)?; self.set(rt_reg, v as u16 as i16 as u32) },
            Op::Lw  => { let v = self.load(addr, Width::Word)?; self.set(rt_reg, v) },
            Op::Lbu => { let v = self.load(addr, Width::Byte)?; self.set(rt_reg, v) },
            Op::Lhu => { let v = self.load(addr, Width::Half)?; self.set(rt_reg, v) },
            Op::Sb => self.store(addr, Width::Byte, rt)?,
            Op::Sh => self.store(addr, Width::Half, rt)?,
            Op::Sw => self.store(addr, Width::Word, rt)?,
        }

        Ok(Flow::Next)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::asm::{AsmErrKind, SourceFile};
    use crate::ast::reg_consts::{A0, RA, T0, T1, T2, ZERO};
    use crate::config::{ConfigErr, Settings};

    use super::exception::{AccessKind, RuntimeFault};
    use super::io::BufferedIO;
    use super::mem::{cop0_regs, Cop0, Width};
    use super::observer::SimEvent;
    use super::radix::NumberBase;
    use super::{LoadErr, SimErr, SimState, Simulator, StopReason, Termination};

    const TEXT: u32 = 0x0040_0000;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .try_init();
    }

    fn sim_with(settings: Settings, src: &str) -> Simulator {
        init_tracing();
        let mut sim = Simulator::new(settings).unwrap();
        sim.assemble(&[SourceFile::new("test.s", src)]).unwrap();
        sim
    }
    fn sim(src: &str) -> Simulator {
        sim_with(Settings::default(), src)
    }

    #[test]
    fn test_add_and_step_back() {
        let mut sim = sim("
            addi $t0, $zero, 5
            addi $t1, $zero, 7
            add  $t2, $t0, $t1
        ");
        let start = sim.snapshot();
        assert_eq!(sim.state(), SimState::Ready);

        for _ in 0..3 {
            assert_eq!(sim.step(), Ok(SimState::Paused));
        }
        assert_eq!(sim.reg(T2), 12);
        assert_eq!(sim.pc(), TEXT + 12);
        assert_eq!(sim.instructions_run(), 3);

        for _ in 0..3 {
            assert!(sim.step_back());
        }
        assert!(!sim.step_back());
        assert_eq!((sim.reg(T0), sim.reg(T1), sim.reg(T2)), (0, 0, 0));
        assert_eq!(sim.pc(), TEXT);
        assert_eq!(sim.snapshot(), start);
        assert_eq!(sim.instructions_run(), 0);
    }

    #[test]
    fn test_dropped_off_bottom() {
        let mut sim = sim("addi $t0, $zero, 1");
        assert_eq!(sim.go(), Ok(StopReason::Terminated(Termination::DroppedOffBottom)));
        assert_eq!(sim.state(), SimState::Terminated);
        assert_eq!(sim.instructions_run(), 1);
        assert_eq!(sim.step(), Err(SimErr::InvalidState(SimState::Terminated)));

        // stepping back resumes the program
        assert!(sim.step_back());
        assert_eq!(sim.state(), SimState::Paused);
        assert_eq!(sim.termination(), None);
        assert_eq!(sim.reg(T0), 0);

        sim.reset();
        assert_eq!(sim.state(), SimState::Ready);
        assert_eq!(sim.backstep_len(), 0);
    }

    #[test]
    fn test_no_program() {
        let mut sim = Simulator::new(Settings::default()).unwrap();
        assert_eq!(sim.state(), SimState::Idle);
        assert_eq!(sim.step(), Err(SimErr::NoProgram));
        assert_eq!(sim.go(), Err(SimErr::NoProgram));
    }

    #[test]
    fn test_register_zero() {
        let mut sim = sim("
            addi $zero, $zero, 5
            addi $t0, $zero, 1
        ");
        sim.step().unwrap();
        assert_eq!(sim.reg(ZERO), 0);
        assert!(sim.step_back());
        assert_eq!(sim.reg(ZERO), 0);
        assert_eq!(sim.pc(), TEXT);
    }

    #[test]
    fn test_delayed_branch() {
        let settings = Settings { delayed_branching: true, ..Default::default() };
        let mut sim = sim_with(settings, "
                    beq  $zero, $zero, target
                    addi $t0, $zero, 1
                    addi $t1, $zero, 2
            target: addi $t2, $zero, 3
                    jal  func
                    nop
                    addi $t1, $t1, 9
            func:   addi $t2, $t2, 1
        ");

        sim.step().unwrap();
        assert_eq!(sim.pc(), TEXT + 4);
        assert_eq!(sim.machine().pending_branch(), Some(TEXT + 12));
        sim.step().unwrap();
        assert_eq!(sim.reg(T0), 1);
        assert_eq!(sim.pc(), TEXT + 12);

        sim.step().unwrap();
        sim.step().unwrap(); // jal
        assert_eq!(sim.reg(RA), TEXT + 24);
        sim.step().unwrap(); // nop
        assert_eq!(sim.pc(), TEXT + 28);
        assert_eq!(sim.reg(T1), 0);

        // undoing the delay slot restores the pending branch
        assert!(sim.step_back());
        assert_eq!(sim.machine().pending_branch(), Some(TEXT + 28));
    }

    #[test]
    fn test_delay_slot_fault() {
        let settings = Settings { delayed_branching: true, ..Default::default() };
        let mut sim = sim_with(settings, "
                  beq $zero, $zero, skip
                  lw  $t0, 1($zero)
            skip: nop
        ");

        sim.step().unwrap();
        let Err(SimErr::Fault(report)) = sim.step() else { panic!("expected fault") };
        assert_eq!(report.pc, TEXT + 4);
        assert_eq!(sim.machine().pending_branch(), None);

        // the consumed branch is part of the faulting step
        assert!(sim.step_back());
        assert_eq!(sim.state(), SimState::Paused);
        assert_eq!(sim.pc(), TEXT + 4);
        assert_eq!(sim.machine().pending_branch(), Some(TEXT + 8));
    }

    #[test]
    fn test_undelayed_link() {
        let mut sim = sim("
                  jal func
                  addi $t0, $zero, 1
            func: jr $ra
        ");
        sim.step().unwrap();
        assert_eq!(sim.reg(RA), TEXT + 4);
        assert_eq!(sim.pc(), TEXT + 8);
        sim.step().unwrap();
        assert_eq!(sim.pc(), TEXT + 4);
    }

    const MISALIGNED_LW: &str = "
        .text
        lui $t0, 0x1001
        ori $t0, $t0, 1
        lw  $t1, 0($t0)
    ";
    const HANDLER: &str = "
        .ktext 0x80000180
        mfc0  $k0, $14
        addiu $k0, $k0, 4
        mtc0  $k0, $14
        eret
    ";

    #[test]
    fn test_fault_without_handler() {
        let mut sim = sim(MISALIGNED_LW);
        let events = sim.subscribe();

        let Err(SimErr::Fault(report)) = sim.go() else { panic!("expected fault") };
        assert_eq!(report.fault, RuntimeFault::Misaligned { addr: 0x1001_0001, access: AccessKind::Load });
        assert_eq!(report.pc, TEXT + 8);
        assert_eq!(report.cause, 4);
        assert_eq!(report.bad_address, Some(0x1001_0001));
        assert_eq!(sim.state(), SimState::Terminated);
        assert_eq!(sim.termination(), Some(&Termination::Fault(report.clone())));

        let events: Vec<_> = events.try_iter().collect();
        assert!(events.contains(&SimEvent::Fault(report.clone())));
        assert_eq!(events.last(), Some(&SimEvent::Terminated(Termination::Fault(report))));
    }

    #[test]
    fn test_fault_with_handler() {
        let mut sim = sim(&format!("{MISALIGNED_LW}\n{HANDLER}"));
        for _ in 0..3 {
            sim.step().unwrap();
        }
        let cop0 = &sim.machine().cop0;
        assert_eq!(sim.pc(), 0x8000_0180);
        assert_eq!(cop0.get(cop0_regs::EPC), TEXT + 8);
        assert_eq!(cop0.get(cop0_regs::CAUSE), 4 << 2);
        assert_eq!(cop0.get(cop0_regs::BAD_VADDR), 0x1001_0001);
        assert_ne!(cop0.get(cop0_regs::STATUS) & Cop0::STATUS_EXL, 0);
        assert_eq!(sim.reg(T1), 0);

        assert_eq!(sim.go(), Ok(StopReason::Terminated(Termination::DroppedOffBottom)));
        assert_eq!(sim.machine().cop0.get(cop0_regs::STATUS), Cop0::INITIAL_STATUS);
        assert_eq!(sim.pc(), TEXT + 12);
    }

    #[test]
    fn test_overflow_and_trap() {
        let mut sim = sim("
            lui  $t0, 0x7FFF
            ori  $t0, $t0, 0xFFFF
            addu $t1, $t0, $t0
            add  $t2, $t0, $t0
        ");
        let Err(SimErr::Fault(report)) = sim.go() else { panic!("expected fault") };
        assert_eq!(report.fault, RuntimeFault::Overflow);
        assert_eq!(sim.reg(T1), 0xFFFF_FFFE);
        assert_eq!(sim.reg(T2), 0);

        let mut trapping = self::sim("teqi $zero, 0");
        let Err(SimErr::Fault(report)) = trapping.go() else { panic!("expected fault") };
        assert_eq!((report.fault, report.cause), (RuntimeFault::Trap, 13));
    }

    #[test]
    fn test_self_modifying_code() {
        let src = "
            lui $t1, 0x0040
            lui $t0, 0x200A
            ori $t0, $t0, 9
            sw  $t0, 16($t1)
        ";

        let mut sim = sim(src);
        let Err(SimErr::Fault(report)) = sim.go() else { panic!("expected fault") };
        assert_eq!(report.fault, RuntimeFault::SegmentAccess { addr: TEXT + 16, access: AccessKind::Store });

        let settings = Settings { self_modifying_code: true, ..Default::default() };
        let mut sim = sim_with(settings, src);
        assert_eq!(sim.go(), Ok(StopReason::Terminated(Termination::DroppedOffBottom)));
        assert_eq!(sim.reg(T2), 9);
        assert!(sim.observer().get_mem_accesses(TEXT + 16).modified());
    }

    #[test]
    fn test_breakpoints_and_limit() {
        let mut sim = sim("
            addi $t0, $zero, 1
            addi $t0, $t0, 1
            addi $t0, $t0, 1
            addi $t0, $t0, 1
        ");
        sim.breakpoints_mut().add(TEXT);
        sim.breakpoints_mut().add(TEXT + 8);

        // the breakpoint at the current PC is skipped
        assert_eq!(sim.go(), Ok(StopReason::Breakpoint(TEXT + 8)));
        assert_eq!(sim.reg(T0), 2);
        assert_eq!(sim.state(), SimState::Paused);

        assert_eq!(sim.go_with_limit(1), Ok(StopReason::StepLimit));
        assert_eq!(sim.reg(T0), 3);

        sim.breakpoints_mut().toggle_all();
        sim.reset();
        assert_eq!(sim.go(), Ok(StopReason::Terminated(Termination::DroppedOffBottom)));
        assert_eq!(sim.reg(T0), 4);
    }

    #[test]
    fn test_control() {
        let mut sim = sim("
            spin: j spin
        ");
        let control = sim.control();
        control.pause();
        assert_eq!(sim.go(), Ok(StopReason::Paused));
        assert_eq!(sim.instructions_run(), 0);

        assert_eq!(sim.go_with_limit(5000), Ok(StopReason::StepLimit));

        let handle = std::thread::spawn(move || {
            let result = sim.go();
            (sim, result)
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        control.stop();
        let (sim, result) = handle.join().unwrap();
        assert_eq!(result, Ok(StopReason::Terminated(Termination::Stopped)));
        assert_eq!(sim.state(), SimState::Terminated);
    }

    #[test]
    fn test_syscalls() {
        let mut sim = sim(r#"
            .data
            msg: .asciiz "sum: "
            .text
            main: li   $v0, 5
                  syscall
                  move $t0, $v0
                  li   $v0, 4
                  la   $a0, msg
                  syscall
                  li   $v0, 1
                  addi $a0, $t0, 10
                  syscall
                  li   $v0, 17
                  li   $a0, 3
                  syscall
                  addi $t1, $zero, 1
        "#);
        let io = BufferedIO::new();
        io.get_input().write().unwrap().extend(b"32\n");
        sim.set_io(io.clone());

        assert_eq!(sim.go(), Ok(StopReason::Terminated(Termination::Exit(3))));
        assert_eq!(&*io.get_output().read().unwrap(), b"sum: 42");
        assert_eq!(sim.reg(T1), 0);
    }

    #[test]
    fn test_memory_access() {
        let mut sim = sim("
            .data
            value: .word 0x11223344
            .text
            lui $t0, 0x1001
            lb  $t1, 3($t0)
            lhu $t2, 0($t0)
        ");
        sim.go().unwrap();
        assert_eq!(sim.reg(T1), 0x11);
        assert_eq!(sim.reg(T2), 0x3344);
        assert!(sim.observer().get_mem_accesses(0x1001_0000).read());

        assert_eq!(sim.read_mem(TEXT, Width::Word), Ok(0x3C08_1001));
        sim.write_mem(0x1001_0000, Width::Byte, 0xFF).unwrap();
        assert_eq!(sim.read_mem(0x1001_0000, Width::Word), Ok(0x1122_33FF));
        assert_eq!(sim.statement_at(TEXT + 4).map(|s| s.basic.as_str()), Some("lb $t1, 3($t0)"));
    }

    #[test]
    fn test_program_arguments() {
        let settings = Settings {
            program_arguments: vec!["hello".to_string(), "world".to_string()],
            ..Default::default()
        };
        let mut sim = sim_with(settings, "
            move $t0, $a0
            lw   $a0, 4($a1)
            li   $v0, 4
            syscall
            li   $v0, 1
            move $a0, $t0
            syscall
        ");
        let io = BufferedIO::new();
        sim.set_io(io.clone());

        assert_eq!(sim.reg(A0), 2);
        sim.go().unwrap();
        assert_eq!(&*io.get_output().read().unwrap(), b"world2");

        // arguments are stored again on reset
        sim.reset();
        assert_eq!(sim.reg(A0), 2);
    }

    #[test]
    fn test_format() {
        let mut sim = sim("
            .data
            .word 0x41424344
            .text
            addi $t0, $zero, -2
        ");
        sim.go().unwrap();
        assert_eq!(sim.format_reg(T0, NumberBase::Decimal), "-2");
        assert_eq!(sim.format_reg(T0, NumberBase::Hexadecimal), "0xfffffffe");
        assert_eq!(sim.format_word(0x1001_0000, NumberBase::Ascii).as_deref(), Ok("ABCD"));
        assert_eq!(sim.format_word(0x1001_0000, NumberBase::Decimal).as_deref(), Ok("1094861636"));
    }

    #[test]
    fn test_assemble_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let main = dir.path().join("main.s");
        std::fs::write(&main, ".globl main\nmain: jal helper\nli $v0, 10\nsyscall\n").unwrap();
        std::fs::write(dir.path().join("helper.asm"), ".globl helper\nhelper: li $t0, 7\njr $ra\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not assembly").unwrap();

        let mut sim = Simulator::new(Settings::default()).unwrap();
        let Err(LoadErr::Asm(errs)) = sim.assemble_file(&main) else { panic!("expected assembly to fail") };
        assert_eq!(errs.0[0].kind, AsmErrKind::UndefinedLabel("helper".to_string()));

        let mut sim = Simulator::new(Settings { assemble_all: true, ..Default::default() }).unwrap();
        let program = sim.assemble_file(&main).unwrap();
        assert_eq!(program.files.len(), 2);
        assert!(program.files[0].ends_with("main.s"));
        assert_eq!(sim.go(), Ok(StopReason::Terminated(Termination::Exit(0))));
        assert_eq!(sim.reg(T0), 7);

        let missing = dir.path().join("missing.s");
        assert!(matches!(sim.assemble_file(missing), Err(LoadErr::Config(ConfigErr::SourceUnreadable { .. }))));
    }

    fn instr() -> impl Strategy<Value = String> {
        let reg = || prop::sample::select(vec!["$t0", "$t1", "$t2", "$t3"]);
        prop_oneof![
            (reg(), reg(), -100i32..100).prop_map(|(d, s, i)| format!("addiu {d}, {s}, {i}")),
            (reg(), reg(), reg()).prop_map(|(d, s, t)| format!("addu {d}, {s}, {t}")),
            (reg(), 0u32..16).prop_map(|(t, o)| format!("sw {t}, {}($s0)", o * 4)),
            (reg(), 0u32..64).prop_map(|(t, o)| format!("sb {t}, {o}($s0)")),
            (reg(), 0u32..64).prop_map(|(t, o)| format!("lb {t}, {o}($s0)")),
            (reg(), reg()).prop_map(|(s, t)| format!("multu {s}, {t}")),
            (reg(), reg()).prop_map(|(s, t)| format!("div {s}, {t}")),
            reg().prop_map(|d| format!("mflo {d}")),
            (0u32..64).prop_map(|n| format!("addiu $v0, $zero, 9\naddiu $a0, $zero, {n}\nsyscall")),
            (0u32..4).prop_map(|n| format!("addiu $v0, $zero, 40\naddiu $a0, $zero, {n}\nsyscall")),
        ]
    }

    proptest! {
        #[test]
        fn step_back_inverts_step(lines in prop::collection::vec(instr(), 1..24), delayed in any::<bool>()) {
            let src = format!("lui $s0, 0x1001\n{}", lines.join("\n"));
            let settings = Settings { delayed_branching: delayed, ..Default::default() };
            let mut sim = sim_with(settings, &src);

            let mut snapshots = vec![];
            loop {
                snapshots.push(sim.snapshot());
                match sim.step() {
                    Ok(SimState::Terminated) => break,
                    Ok(_) => {},
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }

            // dropping off the bottom changes nothing
            let last = sim.snapshot();
            prop_assert_eq!(snapshots.pop(), Some(last));
            while let Some(expected) = snapshots.pop() {
                prop_assert!(sim.step_back());
                prop_assert_eq!(sim.snapshot(), expected);
            }
            prop_assert!(!sim.step_back());
        }
    }
}
