//! The symbol environment: one flat namespace that every module's imports are resolved against.
//!
//! Entries are added in a fixed order (stub libraries, then startup modules) and a later entry
//! silently shadows an earlier one with the same name, like a link-line override. Nothing is ever
//! removed.

use std::collections::HashMap;

use tracing::{debug, trace};
use wasmtime::{Caller, Func};

use crate::{
    abi::{Args, Ret},
    host::Host,
    module::LoadedModule,
    WasmlinkError, WasmlinkErrorKind,
};

/// Signature of a host stub.
pub type StubFn = fn(&mut Caller<'_, Host>, Args<'_>) -> anyhow::Result<Ret>;

#[derive(Clone, Copy)]
pub enum Stub {
    Func(StubFn),
    /// A placeholder that fails with an unimplemented-feature fault when called.
    Unimplemented,
}

impl std::fmt::Debug for Stub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stub::Func(_) => f.write_str("Stub::Func"),
            Stub::Unimplemented => f.write_str("Stub::Unimplemented"),
        }
    }
}

/// A named table of stubs. Names are unique within a table.
#[derive(Debug, Clone)]
pub struct StubLibrary {
    name: &'static str,
    entries: Vec<(&'static str, Stub)>,
}

impl StubLibrary {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: vec![],
        }
    }

    fn push(mut self, name: &'static str, stub: Stub) -> Self {
        debug_assert!(
            !self.contains(name),
            "duplicate stub {} in library {}",
            name,
            self.name
        );
        self.entries.push((name, stub));
        self
    }

    pub fn func(self, name: &'static str, f: StubFn) -> Self {
        self.push(name, Stub::Func(f))
    }

    pub fn nyi(self, name: &'static str) -> Self {
        self.push(name, Stub::Unimplemented)
    }

    pub fn nyi_all(self, names: &[&'static str]) -> Self {
        names.iter().fold(self, |lib, name| lib.nyi(*name))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| *n == name)
    }

    pub fn get(&self, name: &str) -> Option<Stub> {
        self.entries
            .iter()
            .find_map(|(n, s)| (*n == name).then_some(*s))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Stub)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An implementation a name resolves to.
#[derive(Clone)]
pub enum Symbol {
    Stub {
        library: &'static str,
        name: &'static str,
        stub: Stub,
    },
    Export {
        module: String,
        func: Func,
    },
}

impl Symbol {
    /// Where this symbol came from: a stub library or module name.
    pub fn source(&self) -> &str {
        match self {
            Symbol::Stub { library, .. } => library,
            Symbol::Export { module, .. } => module,
        }
    }

    pub fn is_unimplemented(&self) -> bool {
        matches!(
            self,
            Symbol::Stub {
                stub: Stub::Unimplemented,
                ..
            }
        )
    }
}

impl std::fmt::Debug for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Symbol::Stub {
                library,
                name,
                stub,
            } => write!(f, "{}::{} ({:?})", library, name, stub),
            Symbol::Export { module, .. } => write!(f, "export of {}", module),
        }
    }
}

#[derive(Default)]
pub struct SymbolEnv {
    symbols: HashMap<String, Symbol>,
}

impl SymbolEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or override an entry. Returns the entry that was shadowed, if any.
    pub fn register(&mut self, name: impl Into<String>, symbol: Symbol) -> Option<Symbol> {
        let name = name.into();
        let prev = self.symbols.insert(name.clone(), symbol);
        if let Some(prev) = &prev {
            trace!(
                "symbol {} from {} shadowed by {}",
                name,
                prev.source(),
                self.symbols[&name].source()
            );
        }
        prev
    }

    pub fn resolve(&self, name: &str) -> Result<&Symbol, WasmlinkError> {
        self.symbols.get(name).ok_or_else(|| {
            WasmlinkErrorKind::NameNotFound {
                name: name.to_string(),
            }
            .into()
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    /// Flatten stub libraries into the environment, in order.
    pub fn flatten(&mut self, libraries: &[StubLibrary]) {
        for lib in libraries {
            let mut overrides = 0;
            for (name, stub) in lib.iter() {
                let symbol = Symbol::Stub {
                    library: lib.name(),
                    name,
                    stub,
                };
                if self.register(name, symbol).is_some() {
                    overrides += 1;
                }
            }
            debug!(
                "flattened stub library {} ({} symbols, {} overrides)",
                lib.name(),
                lib.len(),
                overrides
            );
        }
    }

    /// Register every exported function of `module`. Returns the number of entries that
    /// shadowed an existing one.
    pub fn merge_exports(&mut self, module: &LoadedModule) -> usize {
        let mut overrides = 0;
        for (name, func) in module.funcs() {
            let prev = self.register(
                name,
                Symbol::Export {
                    module: module.name().to_string(),
                    func,
                },
            );
            if let Some(prev) = prev {
                debug!("{}::{} overrides {}::{}", module, name, prev.source(), name);
                overrides += 1;
            }
        }
        overrides
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(|k| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(_: &mut Caller<'_, Host>, _: Args<'_>) -> anyhow::Result<Ret> {
        Ok(Ret::I32(1))
    }

    fn two(_: &mut Caller<'_, Host>, _: Args<'_>) -> anyhow::Result<Ret> {
        Ok(Ret::I32(2))
    }

    #[test]
    fn later_libraries_win() {
        let libs = [
            StubLibrary::new("compat").nyi("abort").nyi("fprintf"),
            StubLibrary::new("stdlib").func("abort", one).func("malloc", two),
        ];
        let mut env = SymbolEnv::new();
        env.flatten(&libs);
        assert_eq!(env.len(), 3);
        assert_eq!(env.resolve("abort").unwrap().source(), "stdlib");
        assert!(!env.resolve("abort").unwrap().is_unimplemented());
        assert!(env.resolve("fprintf").unwrap().is_unimplemented());
    }

    #[test]
    fn missing_names_do_not_resolve() {
        let env = SymbolEnv::new();
        let err = env.resolve("nope").unwrap_err();
        assert_eq!(
            err.kind,
            WasmlinkErrorKind::NameNotFound {
                name: "nope".into()
            }
        );
    }

    #[test]
    fn register_reports_shadowed_entry() {
        let mut env = SymbolEnv::new();
        let a = Symbol::Stub {
            library: "a",
            name: "f",
            stub: Stub::Func(one),
        };
        let b = Symbol::Stub {
            library: "b",
            name: "f",
            stub: Stub::Unimplemented,
        };
        assert!(env.register("f", a).is_none());
        assert_eq!(env.register("f", b).unwrap().source(), "a");
        assert_eq!(env.resolve("f").unwrap().source(), "b");
    }

    #[test]
    fn library_lookup() {
        let lib = StubLibrary::new("x").func("f", one).nyi_all(&["g", "h"]);
        assert_eq!(lib.len(), 3);
        assert!(matches!(lib.get("g"), Some(Stub::Unimplemented)));
        assert!(lib.get("zz").is_none());
    }
}
