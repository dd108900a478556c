//! A MIPS parser, assembler, and simulator.
//!
//! This is meant to be a general suite to use MIPS assembly for instruction,
//! with a simulator that can run programs forwards *and* backwards.
//!
//! # Usage
//!
//! To convert MIPS source code to a program, it must be assembled:
//! ```
//! use mips_ensemble::asm::{assemble, SourceFile};
//! use mips_ensemble::config::Settings;
//!
//! let code = "
//!     .data
//!     msg: .asciiz \"hello\"
//!     .text
//!     main: la $a0, msg
//!           li $v0, 4
//!           syscall
//! ";
//! let program = assemble(&[SourceFile::new("hello.s", code)], &Settings::default()).unwrap();
//! assert_eq!(program.entry, 0x0040_0000);
//! ```
//!
//! Once a program has been assembled, it can be executed with the simulator:
//! ```
//! # use mips_ensemble::asm::{assemble, SourceFile};
//! # use mips_ensemble::config::Settings;
//! # let code = ".text\nmain: li $v0, 10\nsyscall";
//! # let program = assemble(&[SourceFile::new("hello.s", code)], &Settings::default()).unwrap();
//! use mips_ensemble::sim::Simulator;
//!
//! let mut simulator = Simulator::new(Settings::default()).unwrap();
//! simulator.load_program(program);
//! simulator.go().unwrap(); // <-- Result can be handled accordingly
//! ```
//!
//! The simulator can also assemble source files itself (see [`sim::Simulator::assemble`]),
//! which also assembles the configured exception handler.
//!
//! If more granularity is needed for simulation, there are also step and step-back functions.
//! See the [`sim`] module for more details.
#![warn(missing_docs)]

pub mod parse;
pub mod ast;
pub mod asm;
pub mod config;
pub mod sim;
pub mod err;
