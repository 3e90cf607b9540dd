//! Loading a module: fetch its bytes, bind every import against the symbol environment, and
//! instantiate it.

use std::fmt::Display;

use tracing::{debug, info, trace};
use wasmtime::{AsContextMut, Extern, ExternType, Func, ImportType, Instance, Memory, Module};

use crate::{
    abi::bind_stub,
    host::Host,
    memory::MemoryHandle,
    symbol::Symbol,
    WasmlinkError, WasmlinkErrorKind,
};

/// An instantiated module.
pub struct LoadedModule {
    name: String,
    instance: Instance,
    exports: Vec<(String, Extern)>,
    memory: Option<MemoryHandle>,
}

impl LoadedModule {
    /// The identifier the module was loaded by.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance(&self) -> Instance {
        self.instance
    }

    /// Every export, in the order the module declares them.
    pub fn exports(&self) -> impl Iterator<Item = (&str, &Extern)> {
        self.exports.iter().map(|(n, e)| (n.as_str(), e))
    }

    /// Exported functions only.
    pub fn funcs(&self) -> impl Iterator<Item = (&str, Func)> {
        self.exports
            .iter()
            .filter_map(|(n, e)| e.clone().into_func().map(|f| (n.as_str(), f)))
    }

    pub fn lookup_export(&self, name: &str) -> Option<&Extern> {
        self.exports
            .iter()
            .find_map(|(n, e)| (n == name).then_some(e))
    }

    /// The memory this module exports, if any. With several, the last one wins.
    pub fn exported_memory(&self) -> Option<Memory> {
        self.exports
            .iter()
            .rev()
            .find_map(|(_, e)| e.clone().into_memory())
    }

    /// Handle of the memory this module installed as the active memory, if it exported one.
    pub fn memory_handle(&self) -> Option<MemoryHandle> {
        self.memory
    }
}

impl Display for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.name)
            .field("exports", &self.exports.len())
            .field("memory", &self.memory)
            .finish()
    }
}

fn extern_kind(ty: &ExternType) -> &'static str {
    match ty {
        ExternType::Func(_) => "func",
        ExternType::Global(_) => "global",
        ExternType::Table(_) => "table",
        ExternType::Memory(_) => "memory",
        #[allow(unreachable_patterns)]
        _ => "unknown",
    }
}

fn resolve_import(
    mut store: impl AsContextMut<Data = Host>,
    import: &ImportType<'_>,
) -> Result<Extern, WasmlinkError> {
    let unresolved = || WasmlinkErrorKind::UnresolvedImport {
        module: import.module().to_string(),
        field: import.name().to_string(),
    };
    let ty = import.ty();
    match ty {
        ExternType::Func(ty) => {
            let symbol = store
                .as_context_mut()
                .data()
                .env
                .resolve(import.name())
                .map_err(|_| unresolved())?
                .clone();
            trace!(
                "binding {}.{} to {:?}",
                import.module(),
                import.name(),
                symbol
            );
            match symbol {
                Symbol::Stub { name, stub, .. } => {
                    bind_stub(store, name, stub, ty).map(Into::into)
                }
                Symbol::Export { func, .. } => Ok(func.into()),
            }
        }
        ExternType::Memory(_) => {
            let memory = store
                .as_context_mut()
                .data()
                .memory
                .active()
                .map_err(|_| unresolved())?;
            Ok(memory.into())
        }
        other => Err(WasmlinkErrorKind::UnsupportedImport {
            module: import.module().to_string(),
            field: import.name().to_string(),
            kind: extern_kind(&other).to_string(),
        }
        .into()),
    }
}

fn load_failure(name: &str, kind: WasmlinkErrorKind) -> WasmlinkError {
    WasmlinkError::new_collect(
        WasmlinkErrorKind::LoadFailure {
            name: name.to_string(),
        },
        vec![kind.into()],
    )
}

/// Load the module called `name` and bind it against the current symbol environment. Does not
/// touch the environment. If the module exports a memory, that memory becomes the active memory.
pub fn load(
    mut store: impl AsContextMut<Data = Host>,
    name: &str,
) -> Result<LoadedModule, WasmlinkError> {
    let mut ctx = store.as_context_mut();
    info!("loading module {}", name);

    let bytes = ctx
        .data_mut()
        .source
        .load_object(name)
        .map_err(|e| {
            WasmlinkError::new_collect(
                WasmlinkErrorKind::LoadFailure {
                    name: name.to_string(),
                },
                vec![e],
            )
        })?;

    let engine = ctx.engine().clone();
    let module = Module::new(&engine, &bytes).map_err(|e| {
        load_failure(
            name,
            WasmlinkErrorKind::ParseError {
                name: name.to_string(),
                reason: format!("{:#}", e),
            },
        )
    })?;

    let imports = WasmlinkError::collect(
        WasmlinkErrorKind::LoadFailure {
            name: name.to_string(),
        },
        module
            .imports()
            .map(|import| resolve_import(&mut ctx, &import))
            .collect::<Vec<_>>(),
    )?;
    debug!("{}: bound {} imports", name, imports.len());

    let instance = Instance::new(&mut ctx, &module, &imports).map_err(|e| {
        load_failure(
            name,
            WasmlinkErrorKind::InstantiateFail {
                name: name.to_string(),
                reason: format!("{:#}", e),
            },
        )
    })?;

    let exports: Vec<(String, Extern)> = instance
        .exports(&mut ctx)
        .map(|e| (e.name().to_string(), e.into_extern()))
        .collect();

    let mut loaded = LoadedModule {
        name: name.to_string(),
        instance,
        exports,
        memory: None,
    };
    if let Some(memory) = loaded.exported_memory() {
        let handle = ctx.data_mut().memory.install(memory, name);
        info!(
            "{}: exported memory ({} bytes) is now active as {}",
            name,
            memory.data_size(&ctx),
            handle
        );
        loaded.memory = Some(handle);
    }
    info!("loaded module {} ({} exports)", name, loaded.exports.len());
    Ok(loaded)
}
