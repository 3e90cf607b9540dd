//! Runtime dynamic loading: `dlopen`, `dlsym` and `dlclose` over modules.
//!
//! Dynamically loaded modules are kept in their own table, keyed by the name they were opened
//! with. They are bound against the symbol environment like any other module, but their exports
//! are never merged back into it.

use std::{
    collections::{BTreeMap, HashMap},
    fmt::Display,
    num::NonZeroU32,
};

use bitflags::bitflags;
use tracing::{debug, info};
use wasmtime::{AsContextMut, Extern};

use crate::{host::Host, module::LoadedModule, WasmlinkError, WasmlinkErrorKind};

bitflags! {
    /// Flags accepted by `dlopen`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DlFlags: i32 {
        const LAZY = 1;
        const NOW = 2;
        const NOLOAD = 4;
        const GLOBAL = 256;
        const NODELETE = 4096;
    }
}

impl DlFlags {
    pub const LOCAL: DlFlags = DlFlags::empty();

    /// Only immediate, local binding with no other modifiers is supported.
    pub fn is_supported(&self) -> bool {
        *self == DlFlags::NOW
    }
}

/// Opaque identifier for an open library. Handles start at 1 and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LibraryHandle(NonZeroU32);

impl LibraryHandle {
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn raw(&self) -> u32 {
        self.0.get()
    }
}

impl Display for LibraryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct OpenLibrary {
    name: String,
    module: LoadedModule,
    refcount: usize,
}

#[derive(Default)]
pub struct DlTable {
    libs: BTreeMap<LibraryHandle, OpenLibrary>,
    names: HashMap<String, LibraryHandle>,
    last: u32,
    error: Option<String>,
}

impl DlTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// If `name` is already open, take another reference to it.
    pub fn retain(&mut self, name: &str) -> Option<LibraryHandle> {
        let handle = *self.names.get(name)?;
        let lib = self.libs.get_mut(&handle)?;
        lib.refcount += 1;
        debug!("dlopen {}: reusing handle {} (refcount {})", name, handle, lib.refcount);
        Some(handle)
    }

    /// Record a newly loaded library with a single reference.
    pub fn insert(&mut self, name: &str, module: LoadedModule) -> LibraryHandle {
        self.last += 1;
        let handle = LibraryHandle(
            NonZeroU32::new(self.last).unwrap_or(NonZeroU32::MIN),
        );
        self.names.insert(name.to_string(), handle);
        self.libs.insert(
            handle,
            OpenLibrary {
                name: name.to_string(),
                module,
                refcount: 1,
            },
        );
        info!("dlopen {}: new handle {}", name, handle);
        handle
    }

    fn invalid(handle: u32) -> WasmlinkError {
        WasmlinkErrorKind::InvalidHandle { handle }.into()
    }

    /// Find an export of an open library by name.
    pub fn lookup(&self, handle: u32, symbol: &str) -> Result<Extern, WasmlinkError> {
        let lib = LibraryHandle::from_raw(handle)
            .and_then(|h| self.libs.get(&h))
            .ok_or_else(|| Self::invalid(handle))?;
        if symbol.is_empty() {
            return Err(WasmlinkErrorKind::InvalidSymbol.into());
        }
        lib.module.lookup_export(symbol).cloned().ok_or_else(|| {
            WasmlinkErrorKind::SymbolNotFound {
                symbol: symbol.to_string(),
                library: lib.name.clone(),
            }
            .into()
        })
    }

    /// Drop a reference to a library. Returns the number of references left; at zero the library
    /// is unloaded and its handle becomes invalid.
    pub fn close(&mut self, handle: u32) -> Result<usize, WasmlinkError> {
        let key = LibraryHandle::from_raw(handle).ok_or_else(|| Self::invalid(handle))?;
        let lib = self.libs.get_mut(&key).ok_or_else(|| Self::invalid(handle))?;
        lib.refcount -= 1;
        let remaining = lib.refcount;
        if remaining == 0 {
            if let Some(lib) = self.libs.remove(&key) {
                self.names.remove(&lib.name);
                info!("dlclose {}: unloaded {}", key, lib.module);
            }
        } else {
            debug!("dlclose {}: refcount {}", key, remaining);
        }
        Ok(remaining)
    }

    pub fn refcount(&self, handle: LibraryHandle) -> Option<usize> {
        self.libs.get(&handle).map(|l| l.refcount)
    }

    pub fn handle_of(&self, name: &str) -> Option<LibraryHandle> {
        self.names.get(name).copied()
    }

    pub fn module(&self, handle: LibraryHandle) -> Option<&LoadedModule> {
        self.libs.get(&handle).map(|l| &l.module)
    }

    /// Number of open libraries.
    pub fn len(&self) -> usize {
        self.libs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libs.is_empty()
    }

    /// Remember the most recent failure for `dlerror`.
    pub fn set_error(&mut self, err: &WasmlinkError) {
        let mut msg = err.to_string();
        for related in &err.related {
            msg.push_str(": ");
            msg.push_str(&related.to_string());
        }
        debug!("dl error: {}", msg);
        self.error = Some(msg);
    }

    /// Take the most recent failure, clearing it.
    pub fn take_error(&mut self) -> Option<String> {
        self.error.take()
    }
}

/// Open the library `name`, loading it if this is the first reference.
pub fn open(
    mut store: impl AsContextMut<Data = Host>,
    name: &str,
    flags: DlFlags,
) -> Result<LibraryHandle, WasmlinkError> {
    let mut ctx = store.as_context_mut();
    if let Some(handle) = ctx.data_mut().libs.retain(name) {
        return Ok(handle);
    }
    if !flags.is_supported() {
        return Err(WasmlinkErrorKind::UnsupportedFlag { flags: flags.bits() }.into());
    }
    let module = crate::module::load(&mut ctx, name)?;
    Ok(ctx.data_mut().libs.insert(name, module))
}
