//! Per-run host state, stored as the data of the wasmtime [Store].
//!
//! [Store]: wasmtime::Store

use std::{
    io::Write,
    sync::{Arc, Mutex},
};

use tracing::{debug, trace};
use wasmtime::AsContextMut;

use crate::{
    alloc::BumpAllocator,
    config::HostConfig,
    dl::DlTable,
    memory::{LinearMemory, MemoryArena, MemoryError},
    source::ModuleSource,
    symbol::SymbolEnv,
};

/// Buffers program output until the run terminates.
pub struct OutputBuffer {
    pending: Vec<u8>,
    sink: Box<dyn Write + Send>,
    flushed: bool,
}

impl OutputBuffer {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            pending: vec![],
            sink,
            flushed: false,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Write out everything buffered so far. Only the first call has any effect.
    pub fn flush(&mut self) -> std::io::Result<()> {
        if self.flushed {
            return Ok(());
        }
        self.flushed = true;
        let pending = std::mem::take(&mut self.pending);
        debug!("flushing {} bytes of program output", pending.len());
        self.sink.write_all(&pending)?;
        self.sink.flush()
    }

    /// Write a line straight to the sink, bypassing the buffer.
    pub fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        writeln!(self.sink, "{}", line)?;
        self.sink.flush()
    }
}

/// A cloneable in-memory sink, for capturing output.
#[derive(Clone, Default)]
pub struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| std::io::Error::other("output sink poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A fixed-size table of open descriptors. Descriptors 0 through 2 are the standard streams and
/// start out open.
pub struct FdTable {
    open: [bool; Self::OPEN_MAX],
}

impl FdTable {
    pub const OPEN_MAX: usize = 256;

    pub fn new() -> Self {
        let mut open = [false; Self::OPEN_MAX];
        open[..3].fill(true);
        Self { open }
    }

    /// Claim the lowest free descriptor.
    pub fn open(&mut self) -> Option<i32> {
        let fd = self.open.iter().position(|o| !o)?;
        self.open[fd] = true;
        Some(fd as i32)
    }

    /// Release a descriptor. Returns false if it was not open.
    pub fn close(&mut self, fd: i32) -> bool {
        match usize::try_from(fd).ok().and_then(|fd| self.open.get_mut(fd)) {
            Some(slot) if *slot => {
                *slot = false;
                true
            }
            _ => false,
        }
    }

    pub fn is_open(&self, fd: i32) -> bool {
        usize::try_from(fd)
            .ok()
            .and_then(|fd| self.open.get(fd).copied())
            .unwrap_or(false)
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Host {
    pub(crate) config: HostConfig,
    pub(crate) env: SymbolEnv,
    pub(crate) memory: MemoryArena,
    pub(crate) libs: DlTable,
    pub(crate) stdout: OutputBuffer,
    pub(crate) heap: BumpAllocator,
    pub(crate) fds: FdTable,
    pub(crate) source: Box<dyn ModuleSource + Send>,
}

impl Host {
    pub fn new(
        config: HostConfig,
        source: Box<dyn ModuleSource + Send>,
        sink: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            heap: BumpAllocator::new(config.heap_base),
            config,
            env: SymbolEnv::new(),
            memory: MemoryArena::new(),
            libs: DlTable::new(),
            stdout: OutputBuffer::new(sink),
            fds: FdTable::new(),
            source,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn env(&self) -> &SymbolEnv {
        &self.env
    }

    pub fn memory(&self) -> &MemoryArena {
        &self.memory
    }

    pub fn libs(&self) -> &DlTable {
        &self.libs
    }

    pub fn libs_mut(&mut self) -> &mut DlTable {
        &mut self.libs
    }

    pub fn stdout(&mut self) -> &mut OutputBuffer {
        &mut self.stdout
    }

    pub fn heap(&mut self) -> &mut BumpAllocator {
        &mut self.heap
    }

    pub fn fds(&mut self) -> &mut FdTable {
        &mut self.fds
    }
}

/// Borrow the active linear memory and the host state at the same time.
pub fn split<T: AsContextMut<Data = Host>>(
    ctx: &mut T,
) -> Result<(LinearMemory<'_>, &mut Host), MemoryError> {
    let memory = ctx.as_context_mut().data().memory.active()?;
    let (bytes, host) = memory.data_and_store_mut(ctx.as_context_mut());
    Ok((LinearMemory::new(bytes), host))
}

/// Allocate `size` bytes from the heap. Returns 0 when the heap is exhausted or `size` is 0.
pub fn malloc<T: AsContextMut<Data = Host>>(ctx: &mut T, size: u32) -> Result<u32, MemoryError> {
    let (mem, host) = split(ctx)?;
    Ok(host.heap.alloc(size, mem.len()).unwrap_or(0))
}

/// Copy `s` into a freshly allocated, NUL-terminated buffer. Returns 0 if the heap is exhausted.
pub fn malloc_cstr<T: AsContextMut<Data = Host>>(
    ctx: &mut T,
    s: &[u8],
) -> Result<u32, MemoryError> {
    let (mut mem, host) = split(ctx)?;
    let Some(ptr) = host.heap.alloc(s.len() as u32 + 1, mem.len()) else {
        return Ok(0);
    };
    mem.write_cstr(ptr, s)?;
    trace!("copied {} byte string to {:#x}", s.len(), ptr);
    Ok(ptr)
}

#[cfg(test)]
mod tests {
    use wasmtime::{Engine, Memory, MemoryType, Store};

    use super::*;
    use crate::source::InMemorySource;

    fn store() -> Store<Host> {
        let engine = Engine::default();
        let host = Host::new(
            HostConfig::default(),
            Box::new(InMemorySource::new()),
            Box::new(std::io::sink()),
        );
        let mut store = Store::new(&engine, host);
        let memory = Memory::new(&mut store, MemoryType::new(1, None)).unwrap();
        store.data_mut().memory.install(memory, "host");
        store
    }

    #[test]
    fn output_is_flushed_once() {
        let sink = SharedSink::new();
        let mut out = OutputBuffer::new(Box::new(sink.clone()));
        out.push(b"hello ");
        out.push(b"world\n");
        assert!(sink.contents().is_empty());
        out.flush().unwrap();
        out.flush().unwrap();
        assert_eq!(sink.text(), "hello world\n");
        assert!(out.is_flushed());
    }

    #[test]
    fn fds_reuse_lowest_free_slot() {
        let mut fds = FdTable::new();
        assert_eq!(fds.open(), Some(3));
        assert_eq!(fds.open(), Some(4));
        assert!(fds.close(3));
        assert!(!fds.close(3));
        assert!(!fds.close(-1));
        assert!(!fds.close(FdTable::OPEN_MAX as i32));
        assert_eq!(fds.open(), Some(3));
        assert!(fds.is_open(4));
    }

    #[test]
    fn fd_table_fills_up() {
        let mut fds = FdTable::new();
        for _ in 3..FdTable::OPEN_MAX {
            assert!(fds.open().is_some());
        }
        assert_eq!(fds.open(), None);
    }

    #[test]
    fn strings_are_copied_into_the_heap() {
        let mut store = store();
        let ptr = malloc_cstr(&mut store, b"oops").unwrap();
        assert_eq!(ptr, HostConfig::DEFAULT_HEAP_BASE);
        let (mem, _) = split(&mut store).unwrap();
        assert_eq!(mem.cstr(ptr).unwrap(), b"oops");
    }

    #[test]
    fn exhausted_heap_returns_null() {
        let mut store = store();
        assert_eq!(malloc(&mut store, 1 << 20).unwrap(), 0);
        assert_ne!(malloc(&mut store, 16).unwrap(), 0);
    }
}
