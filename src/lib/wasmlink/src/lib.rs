//! A minimal host for running WebAssembly modules without an operating system underneath.
//!
//! Stub libraries and startup modules are merged into one flat [symbol::SymbolEnv]; the main
//! module is bound against it and run by the [driver::Driver]. All loaded modules share a single
//! active linear memory, and `dlopen`-style loading at run time is handled by [dl::DlTable].

pub mod abi;
pub mod alloc;
pub mod config;
pub mod dl;
pub mod driver;
mod error;
pub mod fault;
pub mod host;
pub mod memory;
pub mod module;
pub mod source;
pub mod symbol;

pub use config::HostConfig;
pub use driver::{run_program, Driver, DriverState, Outcome};
pub use error::*;
pub use fault::{Fault, TrapKind};
pub use host::{Host, SharedSink};
pub use source::{FsSource, InMemorySource, ModuleSource};
pub use symbol::{Stub, StubFn, StubLibrary};
