//! Definitions for errors for the wasm linker.

use itertools::{Either, Itertools};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("{kind}")]
pub struct WasmlinkError {
    pub kind: WasmlinkErrorKind,
    #[related]
    pub related: Vec<WasmlinkError>,
}

impl WasmlinkError {
    pub fn new_collect(kind: WasmlinkErrorKind, related: Vec<WasmlinkError>) -> Self {
        Self { kind, related }
    }

    pub fn new(kind: WasmlinkErrorKind) -> Self {
        Self {
            kind,
            related: vec![],
        }
    }

    /// Collect the results of a series of fallible operations. If any failed, all the failures
    /// are reported together under `parent_kind`.
    pub fn collect<I, T>(parent_kind: WasmlinkErrorKind, it: I) -> Result<Vec<T>, WasmlinkError>
    where
        I: IntoIterator<Item = Result<T, WasmlinkError>>,
    {
        let (vals, errs): (Vec<T>, Vec<WasmlinkError>) =
            it.into_iter().partition_map(|item| match item {
                Ok(o) => Either::Left(o),
                Err(e) => Either::Right(e),
            });

        if errs.is_empty() {
            Ok(vals)
        } else {
            Err(WasmlinkError {
                kind: parent_kind,
                related: errs,
            })
        }
    }

    /// Is this error (or anything it wraps) a failure to load a module?
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self.kind,
            WasmlinkErrorKind::LoadFailure { .. }
                | WasmlinkErrorKind::ModuleNotFound { .. }
                | WasmlinkErrorKind::ModuleReadFail { .. }
                | WasmlinkErrorKind::ParseError { .. }
        )
    }

    /// Find the first error of a given shape in this error or its related errors.
    pub fn find(&self, pred: impl Fn(&WasmlinkErrorKind) -> bool + Copy) -> Option<&WasmlinkError> {
        if pred(&self.kind) {
            return Some(self);
        }
        self.related.iter().find_map(|r| r.find(pred))
    }
}

impl From<WasmlinkErrorKind> for WasmlinkError {
    fn from(value: WasmlinkErrorKind) -> Self {
        Self {
            kind: value,
            related: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum WasmlinkErrorKind {
    #[error("failed to load module {name}")]
    LoadFailure { name: String },
    #[error("module not found: {name}")]
    ModuleNotFound { name: String },
    #[error("failed to read module {name}: {reason}")]
    ModuleReadFail { name: String, reason: String },
    #[error("failed to parse module {name}: {reason}")]
    ParseError { name: String, reason: String },
    #[error("unresolved import '{module}.{field}'")]
    UnresolvedImport { module: String, field: String },
    #[error("import '{module}.{field}' has unsupported kind {kind}")]
    UnsupportedImport {
        module: String,
        field: String,
        kind: String,
    },
    #[error("stub '{name}' cannot be bound to signature {signature}")]
    StubSignature { name: String, signature: String },
    #[error("failed to instantiate module {name}: {reason}")]
    InstantiateFail { name: String, reason: String },
    #[error("name not found: {name}")]
    NameNotFound { name: String },
    #[error("module {module} does not export entry point '{entry}'")]
    MissingEntry { module: String, entry: String },
    #[error("entry point '{entry}' of module {module} must have type [] -> [i32]")]
    BadEntrySignature { module: String, entry: String },
    #[error("failed to create a linear memory of {pages} pages")]
    MemoryCreateFail { pages: u32 },
    #[error("dlopen flags {flags:#x} are not supported")]
    UnsupportedFlag { flags: i32 },
    #[error("invalid library handle {handle}")]
    InvalidHandle { handle: u32 },
    #[error("invalid symbol name")]
    InvalidSymbol,
    #[error("failed to find symbol '{symbol}' in '{library}'")]
    SymbolNotFound { symbol: String, library: String },
    #[error("no room for '{symbol}' in the function table")]
    FunctionTableFull { symbol: String },
    #[error("cannot {action} while {state}")]
    InvalidState { state: String, action: String },
}
