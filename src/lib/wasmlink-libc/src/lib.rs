//! The stub C library that programs run by the host link against.
//!
//! Each module provides one [StubLibrary]. [libraries] returns them in link order: the
//! compatibility placeholders first so that every other table overrides them, and the raw
//! syscall entry points last.

use wasmlink::{abi::Ret, StubLibrary};

mod builtins;
mod compat;
mod ctype;
mod dlfcn;
mod math;
mod runtime;
mod stdio;
mod stdlib;
mod string;
mod syscall;
mod unix;

pub(crate) type StubResult = anyhow::Result<Ret>;

/// Every stub library, in the order they are flattened into the symbol environment.
pub fn libraries() -> Vec<StubLibrary> {
    vec![
        compat::library(),
        builtins::library(),
        ctype::library(),
        math::library(),
        runtime::library(),
        stdio::library(),
        stdlib::library(),
        string::library(),
        unix::library(),
        syscall::library(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_order() {
        let names: Vec<_> = libraries().iter().map(|l| l.name()).collect();
        assert_eq!(
            names,
            [
                "compat", "builtins", "ctype", "math", "runtime", "stdio", "stdlib", "string",
                "unix", "syscall"
            ]
        );
    }

    #[test]
    fn compat_placeholders_are_overridden() {
        let mut env = wasmlink::symbol::SymbolEnv::new();
        env.flatten(&libraries());
        for name in ["abort", "_Exit"] {
            let symbol = env.resolve(name).unwrap();
            assert_eq!(symbol.source(), "stdlib");
            assert!(!symbol.is_unimplemented());
        }
        assert_eq!(env.resolve("__syscall3").unwrap().source(), "syscall");
        assert!(env.resolve("fprintf").unwrap().is_unimplemented());
    }
}
