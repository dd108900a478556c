//! Configuration of the assembler and simulator.
//!
//! All knobs are held in [`Settings`], a plain value which is
//! checked once with [`Settings::validate`] and then threaded into
//! the assembler ([`crate::asm::assemble`]) and the simulator ([`crate::sim::Simulator`]).
//! The address space is described by [`MemoryLayout`].
//!
//! ```
//! use mips_ensemble::config::{MemoryLayout, Settings};
//!
//! let settings = Settings {
//!     delayed_branching: true,
//!     layout: MemoryLayout::compact(),
//!     ..Default::default()
//! };
//! assert!(settings.validate().is_ok());
//! ```
use std::path::{Path, PathBuf};

use crate::asm::SourceFile;

/// A named region of the address space, each with its own access policy.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum Segment {
    /// User code (`.text`). Read-only unless self-modifying code is enabled.
    Text,
    /// Static user data (`.extern`, `.data`).
    Data,
    /// Dynamically allocated memory (`sbrk`).
    Heap,
    /// The user stack.
    Stack,
    /// Kernel code (`.ktext`), which holds the exception handler.
    KernelText,
    /// Kernel data (`.kdata`).
    KernelData,
}
impl Segment {
    /// Whether instructions are normally fetched from this segment.
    pub fn is_text(self) -> bool {
        matches!(self, Segment::Text | Segment::KernelText)
    }
}
impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Segment::Text       => f.write_str(".text"),
            Segment::Data       => f.write_str(".data"),
            Segment::Heap       => f.write_str("heap"),
            Segment::Stack      => f.write_str("stack"),
            Segment::KernelText => f.write_str(".ktext"),
            Segment::KernelData => f.write_str(".kdata"),
        }
    }
}

/// The base addresses of the memory segments.
///
/// The segments are laid out as follows:
/// - text: `[text_base, extern_base)`
/// - data: `[extern_base, heap_base)`, where `.data` starts at `data_base`
/// - heap: `[heap_base, stack_limit)`
/// - stack: `[stack_limit, user_high]`
/// - kernel text: `[ktext_base, kdata_base)`
/// - kernel data: `[kdata_base, 0xFFFFFFFF]`
///
/// Any address below `text_base` or between `user_high` and `ktext_base` is unmapped.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct MemoryLayout {
    /// The start of the text segment, and the default entry point.
    pub text_base: u32,
    /// The start of the data segment, where `.extern` symbols are allocated.
    pub extern_base: u32,
    /// The initial value of `$gp`.
    pub global_pointer: u32,
    /// Where `.data` starts allocating.
    pub data_base: u32,
    /// The start of the heap.
    pub heap_base: u32,
    /// The lowest address of the stack.
    pub stack_limit: u32,
    /// The initial value of `$sp`.
    pub stack_pointer: u32,
    /// The highest word of the stack.
    pub stack_base: u32,
    /// The highest user address.
    pub user_high: u32,
    /// The start of the kernel text segment.
    pub ktext_base: u32,
    /// Where execution continues when a runtime fault occurs
    /// (if an exception handler is loaded).
    pub exception_handler: u32,
    /// The start of the kernel data segment.
    pub kdata_base: u32,
}
impl MemoryLayout {
    /// A small layout with the text segment at address 0.
    ///
    /// All addresses fit in 16 bits, so every address can be loaded with a single instruction.
    pub fn compact() -> Self {
        Self {
            text_base: 0x0000_0000,
            extern_base: 0x0000_1000,
            global_pointer: 0x0000_1800,
            data_base: 0x0000_2000,
            heap_base: 0x0000_3000,
            stack_limit: 0x0000_3000,
            stack_pointer: 0x0000_3FFC,
            stack_base: 0x0000_3FFC,
            user_high: 0x0000_3FFF,
            ktext_base: 0x0000_4000,
            exception_handler: 0x0000_4180,
            kdata_base: 0x0000_5000,
        }
    }

    /// Computes which segment an address falls in (or `None` if it is unmapped).
    ///
    /// ```
    /// use mips_ensemble::config::{MemoryLayout, Segment};
    ///
    /// let layout = MemoryLayout::default();
    /// assert_eq!(layout.segment_of(0x0040_0000), Some(Segment::Text));
    /// assert_eq!(layout.segment_of(0x1001_0000), Some(Segment::Data));
    /// assert_eq!(layout.segment_of(0x7FFF_EFFC), Some(Segment::Stack));
    /// assert_eq!(layout.segment_of(0x8000_0180), Some(Segment::KernelText));
    /// assert_eq!(layout.segment_of(0x0000_0004), None);
    /// ```
    pub fn segment_of(&self, addr: u32) -> Option<Segment> {
        match addr {
            a if a < self.text_base   => None,
            a if a < self.extern_base => Some(Segment::Text),
            a if a < self.heap_base   => Some(Segment::Data),
            a if a < self.stack_limit => Some(Segment::Heap),
            a if a <= self.user_high  => Some(Segment::Stack),
            a if a < self.ktext_base  => None,
            a if a < self.kdata_base  => Some(Segment::KernelText),
            _ => Some(Segment::KernelData),
        }
    }

    /// The first address of a segment.
    pub fn segment_base(&self, segment: Segment) -> u32 {
        match segment {
            Segment::Text       => self.text_base,
            Segment::Data       => self.data_base,
            Segment::Heap       => self.heap_base,
            Segment::Stack      => self.stack_limit,
            Segment::KernelText => self.ktext_base,
            Segment::KernelData => self.kdata_base,
        }
    }

    /// Checks that the segments are ordered and word-aligned.
    pub fn validate(&self) -> Result<(), ConfigErr> {
        let bases = [
            ("text_base", self.text_base),
            ("extern_base", self.extern_base),
            ("global_pointer", self.global_pointer),
            ("data_base", self.data_base),
            ("heap_base", self.heap_base),
            ("stack_limit", self.stack_limit),
            ("stack_pointer", self.stack_pointer),
            ("stack_base", self.stack_base),
            ("ktext_base", self.ktext_base),
            ("exception_handler", self.exception_handler),
            ("kdata_base", self.kdata_base),
        ];
        if let Some(&(name, addr)) = bases.iter().find(|(_, addr)| addr % 4 != 0) {
            return Err(ConfigErr::MisalignedAddress { name, addr });
        }

        let ordering = [
            ("text_base", self.text_base, "extern_base", self.extern_base, false),
            ("extern_base", self.extern_base, "data_base", self.data_base, true),
            ("extern_base", self.extern_base, "global_pointer", self.global_pointer, true),
            ("data_base", self.data_base, "heap_base", self.heap_base, false),
            ("heap_base", self.heap_base, "stack_limit", self.stack_limit, true),
            ("stack_limit", self.stack_limit, "stack_pointer", self.stack_pointer, true),
            ("stack_pointer", self.stack_pointer, "stack_base", self.stack_base, true),
            ("stack_base", self.stack_base, "user_high", self.user_high, false),
            ("user_high", self.user_high, "ktext_base", self.ktext_base, false),
            ("ktext_base", self.ktext_base, "exception_handler", self.exception_handler, true),
            ("exception_handler", self.exception_handler, "kdata_base", self.kdata_base, false),
        ];
        for (lower, lo, upper, hi, allow_eq) in ordering {
            let ordered = match allow_eq {
                true  => lo <= hi,
                false => lo < hi,
            };
            if !ordered {
                return Err(ConfigErr::UnorderedSegments { lower, upper });
            }
        }

        Ok(())
    }
}
impl Default for MemoryLayout {
    fn default() -> Self {
        Self {
            text_base: 0x0040_0000,
            extern_base: 0x1000_0000,
            global_pointer: 0x1000_8000,
            data_base: 0x1001_0000,
            heap_base: 0x1004_0000,
            stack_limit: 0x7FC0_0000,
            stack_pointer: 0x7FFF_EFFC,
            stack_base: 0x7FFF_FFFC,
            user_high: 0x7FFF_FFFF,
            ktext_base: 0x8000_0000,
            exception_handler: 0x8000_0180,
            kdata_base: 0x9000_0000,
        }
    }
}

/// Configuration for the assembler and simulator.
///
/// These are resolved once (see [`Settings::validate`]) and
/// are not changed while a program is loaded.
///
/// Read the field descriptions for more details.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Settings {
    /// Whether pseudo-instructions and extended addressing modes
    /// (e.g., `li`, `lw $t0, label`) are permitted.
    ///
    /// By default, this flag is `true`.
    pub extended_assembler: bool,

    /// Whether branches and jumps have a delay slot.
    ///
    /// If enabled, the instruction after a branch or jump executes
    /// before control is transferred, and linking instructions store `PC + 8`.
    ///
    /// By default, this flag is `false`.
    pub delayed_branching: bool,

    /// Whether programs may write into the text segments and
    /// execute instructions outside of them.
    ///
    /// By default, this flag is `false`.
    pub self_modifying_code: bool,

    /// Whether execution starts at the global label `main` (if it exists)
    /// rather than at the start of the text segment.
    ///
    /// By default, this flag is `true`.
    pub start_at_main: bool,

    /// Whether executed instructions are logged so they can be undone.
    ///
    /// By default, this flag is `true`.
    pub backstepping: bool,

    /// The maximum number of instructions that can be undone.
    ///
    /// By default, this is 2000.
    pub backstep_limit: usize,

    /// Whether assembler warnings are reported as errors.
    ///
    /// By default, this flag is `false`.
    pub warnings_are_errors: bool,

    /// Whether every assembly file in the directory of the main file is assembled with it.
    ///
    /// See [`Settings::collect_sources`].
    ///
    /// By default, this flag is `false`.
    pub assemble_all: bool,

    /// Arguments passed to the program.
    ///
    /// When a program is loaded, these strings are copied to the top of the stack.
    /// `$a0` holds the number of arguments, `$a1` holds the address of an array of
    /// pointers to each string, and `$sp` points at the argument count.
    ///
    /// By default, there are no arguments (and nothing is copied).
    pub program_arguments: Vec<String>,

    /// A source file holding an exception handler,
    /// which is assembled ahead of the program.
    ///
    /// By default, there is no exception handler.
    pub exception_handler: Option<PathBuf>,

    /// How many instructions run between checks for a pause or stop request.
    ///
    /// By default, this is 1024.
    pub checkpoint_interval: u64,

    /// The memory layout.
    ///
    /// By default, this is [`MemoryLayout::default`].
    pub layout: MemoryLayout,
}

#[allow(clippy::derivable_impls)]
impl Default for Settings {
    fn default() -> Self {
        Self {
            extended_assembler: true,
            delayed_branching: false,
            self_modifying_code: false,
            start_at_main: true,
            backstepping: true,
            backstep_limit: 2000,
            warnings_are_errors: false,
            assemble_all: false,
            program_arguments: vec![],
            exception_handler: None,
            checkpoint_interval: 1024,
            layout: MemoryLayout::default(),
        }
    }
}
impl Settings {
    /// Checks that these settings are usable.
    pub fn validate(&self) -> Result<(), ConfigErr> {
        self.layout.validate()?;
        if self.checkpoint_interval == 0 {
            return Err(ConfigErr::ZeroCheckpointInterval);
        }
        if !self.program_arguments.is_empty() {
            let strings: u64 = self.program_arguments.iter().map(|a| a.len() as u64 + 1).sum();
            // argc, argv, the argv terminator, and alignment padding
            let needed = strings + 4 * (self.program_arguments.len() as u64 + 2) + 4;
            let available = u64::from(self.layout.stack_base - self.layout.stack_limit);
            if needed > available {
                return Err(ConfigErr::ArgumentsTooLarge { needed, available });
            }
        }
        if let Some(path) = &self.exception_handler {
            if !path.is_file() {
                return Err(ConfigErr::HandlerUnreadable { path: path.clone(), reason: "file does not exist".to_string() });
            }
        }
        Ok(())
    }

    /// Reads the source files to assemble for a main file.
    ///
    /// If [`Settings::assemble_all`] is set, this also reads every other assembly file
    /// (ending in `.asm` or `.s`) in the main file's directory.
    /// The main file is always first, and the rest are ordered by name.
    pub fn collect_sources(&self, main: &Path) -> Result<Vec<SourceFile>, ConfigErr> {
        let unreadable = |path: &Path, e: std::io::Error| ConfigErr::SourceUnreadable { path: path.to_path_buf(), reason: e.to_string() };
        let mut sources = vec![SourceFile::read(main).map_err(|e| unreadable(main, e))?];
        if !self.assemble_all {
            return Ok(sources);
        }

        let dir = match main.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut others = vec![];
        for entry in std::fs::read_dir(dir).map_err(|e| unreadable(dir, e))? {
            let path = entry.map_err(|e| unreadable(dir, e))?.path();
            let is_asm = matches!(path.extension().and_then(|e| e.to_str()), Some("asm" | "s"));
            if is_asm && path.is_file() && path.file_name() != main.file_name() {
                others.push(path);
            }
        }
        others.sort();
        tracing::debug!("assembling {} other files in {}", others.len(), dir.display());

        for path in others {
            sources.push(SourceFile::read(&path).map_err(|e| unreadable(&path, e))?);
        }
        Ok(sources)
    }

    /// Reads the exception handler file (if one is configured).
    pub fn read_exception_handler(&self) -> Result<Option<SourceFile>, ConfigErr> {
        let Some(path) = &self.exception_handler else { return Ok(None) };

        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigErr::HandlerUnreadable { path: path.clone(), reason: e.to_string() })?;
        Ok(Some(SourceFile::new(path.display().to_string(), text)))
    }
}

/// Errors from invalid settings.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum ConfigErr {
    /// Two segment boundaries are out of order.
    UnorderedSegments {
        /// The boundary that should be lower.
        lower: &'static str,
        /// The boundary that should be higher.
        upper: &'static str
    },
    /// A segment boundary is not word-aligned.
    MisalignedAddress {
        /// The misaligned boundary.
        name: &'static str,
        /// Its address.
        addr: u32
    },
    /// The checkpoint interval is 0.
    ZeroCheckpointInterval,
    /// The exception handler file could not be read.
    HandlerUnreadable {
        /// The path of the file.
        path: PathBuf,
        /// Why it could not be read.
        reason: String
    },
    /// A source file (or its directory) could not be read.
    SourceUnreadable {
        /// The path of the file or directory.
        path: PathBuf,
        /// Why it could not be read.
        reason: String
    },
    /// The program arguments do not fit on the stack.
    ArgumentsTooLarge {
        /// How many bytes the arguments need.
        needed: u64,
        /// How many bytes the stack has.
        available: u64
    },
}
impl std::fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigErr::UnorderedSegments { lower, upper } => write!(f, "memory layout has {lower} above {upper}"),
            ConfigErr::MisalignedAddress { name, addr } => write!(f, "memory layout has misaligned {name} ({addr:#010x})"),
            ConfigErr::ZeroCheckpointInterval => f.write_str("checkpoint interval cannot be 0"),
            ConfigErr::HandlerUnreadable { path, reason } => write!(f, "cannot read exception handler {}: {reason}", path.display()),
            ConfigErr::SourceUnreadable { path, reason } => write!(f, "cannot read {}: {reason}", path.display()),
            ConfigErr::ArgumentsTooLarge { needed, available } => write!(f, "program arguments need {needed} bytes but the stack has {available}"),
        }
    }
}
impl std::error::Error for ConfigErr {}
impl crate::err::Error for ConfigErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            ConfigErr::UnorderedSegments { .. } => Some("segments must be ordered: text, extern, data, heap, stack, kernel text, kernel data".into()),
            ConfigErr::MisalignedAddress { .. } => Some("segment boundaries must be multiples of 4".into()),
            ConfigErr::ZeroCheckpointInterval => None,
            ConfigErr::HandlerUnreadable { .. } => Some("check the exception handler path in the settings".into()),
            ConfigErr::SourceUnreadable { .. } => None,
            ConfigErr::ArgumentsTooLarge { .. } => Some("pass fewer or shorter arguments, or lower the stack limit".into()),
        }
    }
}
