//! Console IO for syscalls.
//!
//! The interface for syscall IO is defined with the [`SyscallIO`] trait.
//! How the IO is presented (console, dialog, etc.) is entirely up to the implementor.
//!
//! This module also includes:
//! - [`EmptyIO`]: A `SyscallIO` holding the implementation for a lack of IO support.
//! - [`BufferedIO`]: A `SyscallIO` holding a buffered implementation for IO.
//! - [`ChannelIO`]: A `SyscallIO` holding a threaded/channel implementation for IO.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::thread::JoinHandle;

use crossbeam_channel as cbc;

/// The console which syscalls read from and write to.
pub trait SyscallIO: Send {
    /// Writes text to the output.
    fn print(&mut self, text: &str);

    /// Reads a line of input (without its line terminator).
    ///
    /// This returns `None` if no more input is available.
    fn read_line(&mut self) -> Option<String>;

    /// Reads one character of input.
    ///
    /// This returns `None` if no more input is available.
    fn read_char(&mut self) -> Option<char>;
}
impl dyn SyscallIO {} // assert SyscallIO is dyn safe

/// No IO. Output is discarded, and there is never any input.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyIO;
impl SyscallIO for EmptyIO {
    fn print(&mut self, _text: &str) {}

    fn read_line(&mut self) -> Option<String> {
        None
    }

    fn read_char(&mut self) -> Option<char> {
        None
    }
}

/// IO that reads from an input buffer and writes to an output buffer.
///
/// The buffers can be accessed in code via [`BufferedIO::get_input`] and [`BufferedIO::get_output`].
///
/// Note that if an input/output lock guard is held while the simulator runs,
/// the simulator blocks on syscall IO until it is released.
#[derive(Debug, Clone, Default)]
pub struct BufferedIO {
    input: Arc<RwLock<VecDeque<u8>>>,
    output: Arc<RwLock<Vec<u8>>>
}
impl BufferedIO {
    /// Creates a new BufferedIO.
    pub fn new() -> Self {
        Self { input: Default::default(), output: Default::default() }
    }
    /// Creates a new BufferedIO from already defined buffers.
    pub fn with_bufs(input: Arc<RwLock<VecDeque<u8>>>, output: Arc<RwLock<Vec<u8>>>) -> Self {
        Self { input, output }
    }

    fn input(&self) -> RwLockWriteGuard<'_, VecDeque<u8>> {
        self.input.write().unwrap_or_else(PoisonError::into_inner)
    }
    fn output(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.output.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gets a reference to the input buffer.
    pub fn get_input(&self) -> &Arc<RwLock<VecDeque<u8>>> {
        &self.input
    }
    /// Gets a reference to the output buffer.
    pub fn get_output(&self) -> &Arc<RwLock<Vec<u8>>> {
        &self.output
    }
}
impl SyscallIO for BufferedIO {
    fn print(&mut self, text: &str) {
        self.output().extend_from_slice(text.as_bytes());
    }

    fn read_line(&mut self) -> Option<String> {
        let mut input = self.input();
        if input.is_empty() { return None };

        let end = input.iter()
            .position(|&b| b == b'\n')
            .map_or(input.len(), |e| e + 1);
        let mut line: Vec<_> = input.drain(..end).collect();
        if line.last() == Some(&b'\n') { line.pop(); }
        if line.last() == Some(&b'\r') { line.pop(); }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn read_char(&mut self) -> Option<char> {
        let mut input = self.input();
        let mut bytes = vec![];
        while let Some(b) = input.pop_front() {
            bytes.push(b);
            match std::str::from_utf8(&bytes) {
                Ok(s) => return s.chars().next(),
                Err(e) if e.error_len().is_some() => return Some(char::REPLACEMENT_CHARACTER),
                Err(_) => {},
            }
        }
        None
    }
}

/// A helper struct for [`ChannelIO::new`],
/// indicating the channel is closed and no more reads/writes will come from it.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stop;

/// An IO that reads from one channel and writes to another.
///
/// Input is supplied by a reader thread, which sends bytes one at a time.
/// Output is handed to a writer thread.
/// Reading syscalls block until the reader thread supplies enough input.
pub struct ChannelIO {
    read_data:    cbc::Receiver<u8>,
    #[allow(unused)]
    read_handler: JoinHandle<()>,

    write_data:    cbc::Sender<String>,
    write_handler: JoinHandle<()>
}
impl ChannelIO {
    /// Creates a new channel IO with the given reader and writer.
    ///
    /// The reader function is called every time the input needs a byte.
    /// It should block until a byte is ready, or return Stop
    /// if there are no more bytes to read.
    ///
    /// The writer function is called every time text needs to be written to the output.
    ///
    /// This uses threads to read and write from input and output,
    /// so input continues to be polled even when the simulator is not running.
    pub fn new(
        mut reader: impl FnMut() -> Result<u8, Stop> + Send + 'static,
        mut writer: impl FnMut(String) -> Result<(), Stop> + Send + 'static
    ) -> Self {
        let (read_tx, read_rx) = cbc::bounded(1);
        let (write_tx, write_rx) = cbc::unbounded::<String>();

        // Reader thread:
        let read_handler = std::thread::spawn(move || loop {
            let Ok(byte) = reader() else { return };
            let Ok(()) = read_tx.send(byte) else { return };
        });

        // Writer thread:
        let write_handler = std::thread::spawn(move || {
            for text in write_rx {
                let Ok(()) = writer(text) else { return };
            }
        });

        Self {
            read_data: read_rx,
            read_handler,
            write_data: write_tx,
            write_handler
        }
    }

    /// Creates a channel IO with stdin being the read data and stdout being the write data.
    ///
    /// Note that due to how stdin works in terminals, data is only sent once a new line is typed.
    /// Additionally, this flushes stdout every time text is written.
    pub fn stdio() -> Self {
        use std::io::{self, BufRead, Write};

        Self::new(
            || {
                let mut stdin = io::stdin().lock();
                let &[byte, ..] = stdin.fill_buf().map_err(|_| Stop)? else {
                    return Err(Stop);
                };

                stdin.consume(1);
                Ok(byte)
            },
            |text| {
                let mut stdout = io::stdout().lock();
                stdout.write_all(text.as_bytes()).map_err(|_| Stop)?;
                stdout.flush().map_err(|_| Stop)
            }
        )
    }

    /// Closes the channels, waiting for any pending output to be written.
    pub fn close(self) {
        let Self { read_data, read_handler: _, write_data, write_handler } = self;
        drop(read_data);
        drop(write_data);

        // The reader thread may be blocked on input, so only the writer is joined.
        let _ = write_handler.join();
    }
}
impl std::fmt::Debug for ChannelIO {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelIO")
            .finish_non_exhaustive()
    }
}
impl SyscallIO for ChannelIO {
    fn print(&mut self, text: &str) {
        // If the writer thread stopped, output is dropped.
        let _ = self.write_data.send(text.to_string());
    }

    fn read_line(&mut self) -> Option<String> {
        let mut line = vec![];
        loop {
            match self.read_data.recv() {
                Ok(b'\n') => break,
                Ok(b) => line.push(b),
                Err(cbc::RecvError) if line.is_empty() => return None,
                Err(cbc::RecvError) => break,
            }
        }
        if line.last() == Some(&b'\r') { line.pop(); }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn read_char(&mut self) -> Option<char> {
        let mut bytes = vec![];
        loop {
            bytes.push(self.read_data.recv().ok()?);
            match std::str::from_utf8(&bytes) {
                Ok(s) => return s.chars().next(),
                Err(e) if e.error_len().is_some() => return Some(char::REPLACEMENT_CHARACTER),
                Err(_) => {},
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::{BufferedIO, ChannelIO, EmptyIO, Stop, SyscallIO};

    #[test]
    fn test_buffered() {
        let mut io = BufferedIO::new();
        io.get_input().write().unwrap().extend(b"12\r\nhello\n\xC3\xA9z");

        assert_eq!(io.read_line().as_deref(), Some("12"));
        assert_eq!(io.read_line().as_deref(), Some("hello"));
        assert_eq!(io.read_char(), Some('é'));
        assert_eq!(io.read_line().as_deref(), Some("z"));
        assert_eq!(io.read_line(), None);
        assert_eq!(io.read_char(), None);

        io.print("abc");
        io.print("def\n");
        assert_eq!(&*io.get_output().read().unwrap(), b"abcdef\n");
    }

    #[test]
    fn test_empty() {
        let mut io = EmptyIO;
        io.print("ignored");
        assert_eq!(io.read_line(), None);
        assert_eq!(io.read_char(), None);
    }

    #[test]
    fn test_channel() {
        let mut input: VecDeque<u8> = b"42\nxy".iter().copied().collect();
        let output = Arc::new(Mutex::new(String::new()));

        let out = Arc::clone(&output);
        let mut io = ChannelIO::new(
            move || input.pop_front().ok_or(Stop),
            move |text| {
                out.lock().unwrap().push_str(&text);
                Ok(())
            }
        );

        assert_eq!(io.read_line().as_deref(), Some("42"));
        assert_eq!(io.read_char(), Some('x'));
        assert_eq!(io.read_line().as_deref(), Some("y"));
        assert_eq!(io.read_line(), None);

        io.print("hello ");
        io.print("world");
        io.close();
        assert_eq!(&*output.lock().unwrap(), "hello world");
    }
}
