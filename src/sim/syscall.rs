//! The system call services.
//!
//! A `syscall` instruction selects its service with `$v0`,
//! takes arguments from `$a0` and `$a1`, and returns results in `$v0` (or `$a0`/`$a1`).
//!
//! | `$v0` | service                 | arguments                        | result           |
//! |-------|-------------------------|----------------------------------|------------------|
//! | 1     | print integer           | `$a0` = integer                  |                  |
//! | 4     | print string            | `$a0` = address of string        |                  |
//! | 5     | read integer            |                                  | `$v0` = integer  |
//! | 8     | read string             | `$a0` = buffer, `$a1` = length   |                  |
//! | 9     | sbrk (allocate heap)    | `$a0` = number of bytes          | `$v0` = address  |
//! | 10    | exit                    |                                  |                  |
//! | 11    | print character         | `$a0` = character                |                  |
//! | 12    | read character          |                                  | `$v0` = character |
//! | 17    | exit with code          | `$a0` = exit code                |                  |
//! | 30    | system time             |                                  | `$a0` = low, `$a1` = high |
//! | 32    | sleep                   | `$a0` = milliseconds             |                  |
//! | 34    | print hexadecimal       | `$a0` = integer                  |                  |
//! | 35    | print binary            | `$a0` = integer                  |                  |
//! | 36    | print unsigned          | `$a0` = integer                  |                  |
//! | 40    | set random seed         | `$a0` = stream, `$a1` = seed     |                  |
//! | 41    | random integer          | `$a0` = stream                   | `$a0` = integer  |
//! | 42    | random integer in range | `$a0` = stream, `$a1` = bound    | `$a0` = integer in `[0, bound)` |
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ast::reg_consts::{A0, A1, V0};

use super::backstep::MutationSink;
use super::exception::{AccessKind, RuntimeFault};
use super::io::SyscallIO;
use super::mem::{Machine, Width};

/// What the simulator should do after a syscall.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SyscallOutcome {
    /// Continue executing.
    Continue,
    /// Terminate the program with the given exit code.
    Exit(i32),
}

/// Executes the syscall selected by `$v0`.
///
/// Machine state is mutated through the sink, but console IO cannot be undone.
pub fn execute(machine: &mut Machine, io: &mut dyn SyscallIO, sink: &mut dyn MutationSink) -> Result<SyscallOutcome, RuntimeFault> {
    let number = machine.regs.get(V0);
    let a0 = machine.regs.get(A0);
    let a1 = machine.regs.get(A1);
    tracing::trace!("syscall {number} (a0 = {a0:#x}, a1 = {a1:#x})");

    match number {
        1 => io.print(&(a0 as i32).to_string()),
        4 => {
            let text = read_c_string(machine, a0)?;
            io.print(&text);
        },
        5 => {
            let line = io.read_line().ok_or_else(|| input_err("no input available"))?;
            let value = parse_int(line.trim()).ok_or_else(|| input_err(format!("{:?} is not an integer", line.trim())))?;
            machine.regs.set(V0, value as u32, sink);
        },
        8 => read_string(machine, io, a0, a1 as i32, sink)?,
        9 => {
            let request = a0 as i32;
            if request < 0 {
                return Err(input_err(format!("cannot allocate a negative number of bytes ({request})")));
            }
            let old = machine.heap_break();
            let new = u64::from(old) + ((request as u64 + 3) & !3);
            if new > u64::from(machine.mem.layout().stack_limit) {
                return Err(input_err(format!("heap cannot grow by {request} bytes")));
            }
            machine.set_heap_break(new as u32, sink);
            machine.regs.set(V0, old, sink);
        },
        10 => return Ok(SyscallOutcome::Exit(0)),
        11 => io.print(&char::from(a0 as u8).to_string()),
        12 => {
            let c = io.read_char().ok_or_else(|| input_err("no input available"))?;
            machine.regs.set(V0, u32::from(c), sink);
        },
        17 => return Ok(SyscallOutcome::Exit(a0 as i32)),
        30 => {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_millis() as u64);
            machine.regs.set(A0, millis as u32, sink);
            machine.regs.set(A1, (millis >> 32) as u32, sink);
        },
        32 => {
            let millis = (a0 as i32).max(0) as u64;
            std::thread::sleep(Duration::from_millis(millis));
        },
        34 => io.print(&format!("0x{a0:08x}")),
        35 => io.print(&format!("{a0:032b}")),
        36 => io.print(&a0.to_string()),
        40 => machine.set_random_stream(a0, StdRng::seed_from_u64(u64::from(a1)), sink),
        41 => {
            let value: i32 = machine.random_stream(a0, StdRng::from_entropy, sink).gen();
            machine.regs.set(A0, value as u32, sink);
        },
        42 => {
            let bound = a1 as i32;
            if bound <= 0 {
                return Err(input_err(format!("upper bound of random range must be positive (was {bound})")));
            }
            let value = machine.random_stream(a0, StdRng::from_entropy, sink).gen_range(0..bound);
            machine.regs.set(A0, value as u32, sink);
        },
        n => return Err(RuntimeFault::InvalidSyscall(n)),
    }

    Ok(SyscallOutcome::Continue)
}

fn input_err(msg: impl Into<String>) -> RuntimeFault {
    RuntimeFault::SyscallInput(msg.into())
}

fn parse_int(text: &str) -> Option<i32> {
    let (neg, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        // hex literals may spell out negative numbers (e.g., 0xFFFFFFFF)
        Some(hex) => {
            let value = u32::from_str_radix(hex, 16).ok()? as i32;
            Some(if neg { value.wrapping_neg() } else { value })
        },
        None => {
            let magnitude = digits.parse::<i64>().ok()?;
            i32::try_from(if neg { -magnitude } else { magnitude }).ok()
        }
    }
}

fn read_c_string(machine: &Machine, addr: u32) -> Result<String, RuntimeFault> {
    let mut text = String::new();
    let mut cursor = addr;
    loop {
        let byte = machine.mem.read(cursor, Width::Byte)
            .map_err(|e| RuntimeFault::from_mem(e, AccessKind::Load))?;
        if byte == 0 { break; }

        text.push(char::from(byte as u8));
        cursor = cursor.wrapping_add(1);
    }
    Ok(text)
}

/// Reads a line into a buffer of `len` bytes.
///
/// At most `len - 1` characters are stored, followed by the newline (if it fits)
/// and a null terminator.
fn read_string(machine: &mut Machine, io: &mut dyn SyscallIO, buf: u32, len: i32, sink: &mut dyn MutationSink) -> Result<(), RuntimeFault> {
    let (max_chars, terminate) = match len - 1 {
        n if n < 0 => (0, false),
        n => (n as usize, true),
    };

    let line = io.read_line().unwrap_or_default();
    let mut bytes: Vec<u8> = line.bytes().take(max_chars).collect();
    if line.len() < max_chars {
        bytes.push(b'\n');
    }
    if terminate {
        bytes.push(0);
    }

    // the whole buffer is checked first so a fault leaves memory untouched
    let addrs = || (0..bytes.len() as u32).map(|i| buf.wrapping_add(i));
    let store_fault = |e| RuntimeFault::from_mem(e, AccessKind::Store);
    for addr in addrs() {
        machine.mem.check_data_access(addr, Width::Byte).map_err(store_fault)?;
    }
    for (addr, &byte) in addrs().zip(&bytes) {
        machine.mem.write(addr, Width::Byte, u32::from(byte), sink).map_err(store_fault)?;
    }
    Ok(())
}
