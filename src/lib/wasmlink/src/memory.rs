//! The linear memory shared by every loaded module.
//!
//! Exactly one memory is active at a time. Loading a module that exports its own memory replaces
//! the active memory wholesale; any address computed against the previous memory is meaningless
//! afterwards. The arena hands out generation-tagged [MemoryHandle]s so that a handle taken
//! before a swap is detected as stale rather than silently pointing at the new memory.

use std::{fmt::Display, ops::Range};

use thiserror::Error;
use tracing::info;
use wasmtime::{AsContext, Memory};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("memory access out of bounds: {len} bytes at {addr:#x} (memory size {size:#x})")]
    OutOfBounds { addr: u64, len: u64, size: u64 },
    #[error("no linear memory is active")]
    NoActiveMemory,
    #[error("memory handle {0} is stale")]
    StaleHandle(MemoryHandle),
}

/// A handle to one installation of a linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryHandle(u64);

impl Display for MemoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mem#{}", self.0)
    }
}

struct ActiveMemory {
    memory: Memory,
    owner: String,
    handle: MemoryHandle,
}

/// Holds at most one live memory.
#[derive(Default)]
pub struct MemoryArena {
    active: Option<ActiveMemory>,
    generation: u64,
}

impl MemoryArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `memory` the active memory, replacing any previous one.
    pub fn install(&mut self, memory: Memory, owner: impl ToString) -> MemoryHandle {
        self.generation += 1;
        let handle = MemoryHandle(self.generation);
        let owner = owner.to_string();
        if let Some(prev) = self.active.as_ref() {
            info!(
                "linear memory of {} ({}) replaced by memory of {} ({})",
                prev.owner, prev.handle, owner, handle
            );
        }
        self.active = Some(ActiveMemory {
            memory,
            owner,
            handle,
        });
        handle
    }

    /// Handle for the active memory, if there is one.
    pub fn handle(&self) -> Option<MemoryHandle> {
        self.active.as_ref().map(|a| a.handle)
    }

    /// Name of whoever provided the active memory.
    pub fn owner(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.owner.as_str())
    }

    /// Resolve a handle. Fails if the memory it names has since been replaced.
    pub fn get(&self, handle: MemoryHandle) -> Result<Memory, MemoryError> {
        match &self.active {
            Some(active) if active.handle == handle => Ok(active.memory),
            _ => Err(MemoryError::StaleHandle(handle)),
        }
    }

    pub fn active(&self) -> Result<Memory, MemoryError> {
        self.active
            .as_ref()
            .map(|a| a.memory)
            .ok_or(MemoryError::NoActiveMemory)
    }

    /// Current size of the active memory in bytes, read from the owning instance.
    pub fn len(&self, store: impl AsContext) -> usize {
        self.active
            .as_ref()
            .map(|a| a.memory.data_size(store))
            .unwrap_or(0)
    }
}

/// A bounds-checked view over the bytes of a linear memory. Addresses are byte offsets.
pub struct LinearMemory<'a> {
    bytes: &'a mut [u8],
}

impl<'a> LinearMemory<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn range(&self, addr: u32, len: u32) -> Result<Range<usize>, MemoryError> {
        let start = addr as usize;
        let end = start.checked_add(len as usize);
        match end {
            Some(end) if end <= self.bytes.len() => Ok(start..end),
            _ => Err(MemoryError::OutOfBounds {
                addr: addr as u64,
                len: len as u64,
                size: self.bytes.len() as u64,
            }),
        }
    }

    pub fn read(&self, addr: u32, len: u32) -> Result<&[u8], MemoryError> {
        let range = self.range(addr, len)?;
        Ok(&self.bytes[range])
    }

    pub fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), MemoryError> {
        let len = u32::try_from(data.len()).map_err(|_| MemoryError::OutOfBounds {
            addr: addr as u64,
            len: data.len() as u64,
            size: self.bytes.len() as u64,
        })?;
        let range = self.range(addr, len)?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    pub fn fill(&mut self, addr: u32, value: u8, len: u32) -> Result<(), MemoryError> {
        let range = self.range(addr, len)?;
        self.bytes[range].fill(value);
        Ok(())
    }

    pub fn zero(&mut self, addr: u32, len: u32) -> Result<(), MemoryError> {
        self.fill(addr, 0, len)
    }

    /// Copy `len` bytes from `src` to `dst`. The ranges may overlap.
    pub fn copy_within(&mut self, src: u32, dst: u32, len: u32) -> Result<(), MemoryError> {
        let src = self.range(src, len)?;
        let dst = self.range(dst, len)?;
        self.bytes.copy_within(src, dst.start);
        Ok(())
    }

    pub fn read_u8(&self, addr: u32) -> Result<u8, MemoryError> {
        Ok(self.read(addr, 1)?[0])
    }

    pub fn write_u8(&mut self, addr: u32, value: u8) -> Result<(), MemoryError> {
        self.write(addr, &[value])
    }

    /// The NUL-terminated string at `addr`, without the terminator. A string that runs off the
    /// end of memory is out of bounds.
    pub fn cstr(&self, addr: u32) -> Result<&[u8], MemoryError> {
        let tail = self.bytes.get(addr as usize..).unwrap_or_default();
        match tail.iter().position(|b| *b == 0) {
            Some(len) => Ok(&tail[..len]),
            None => Err(MemoryError::OutOfBounds {
                addr: addr as u64,
                len: tail.len() as u64 + 1,
                size: self.bytes.len() as u64,
            }),
        }
    }

    /// Like [LinearMemory::cstr], decoding each byte as one character.
    pub fn cstr_lossy(&self, addr: u32) -> Result<String, MemoryError> {
        Ok(self.cstr(addr)?.iter().map(|b| *b as char).collect())
    }

    /// Write `s` followed by a NUL terminator.
    pub fn write_cstr(&mut self, addr: u32, s: &[u8]) -> Result<(), MemoryError> {
        self.write(addr, s)?;
        let end = addr
            .checked_add(s.len() as u32)
            .ok_or(MemoryError::OutOfBounds {
                addr: addr as u64,
                len: s.len() as u64 + 1,
                size: self.bytes.len() as u64,
            })?;
        self.write_u8(end, 0)
    }
}
