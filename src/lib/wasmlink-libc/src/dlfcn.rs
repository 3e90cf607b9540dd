//! `<dlfcn.h>`, bridging wasm callers to the host's dynamic library table.
//!
//! Failures never unwind: they are recorded for `dlerror` and reported through the return value,
//! as C callers expect.

use wasmlink::{
    abi::{Args, Ret},
    dl::{self, DlFlags, LibraryHandle},
    host::{malloc_cstr, split},
    Fault, Host, WasmlinkError, WasmlinkErrorKind,
};
use wasmtime::{Caller, Extern, Ref, Val};

use crate::StubResult;

/// Name of the table a module exports so that function pointers can refer to host-provided
/// functions.
pub(crate) const FUNCTION_TABLE: &str = "__indirect_function_table";

fn fail(caller: &mut Caller<'_, Host>, err: WasmlinkError, ret: i32) -> StubResult {
    caller.data_mut().libs_mut().set_error(&err);
    Ok(Ret::I32(ret))
}

pub(crate) fn dlopen(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let filename = args.ptr(0);
    if filename == 0 {
        return Err(Fault::nyi("dlopen(NULL, ...)").into_error());
    }
    let name = {
        let (mem, _) = split(caller)?;
        mem.cstr_lossy(filename)?
    };
    let flags = DlFlags::from_bits_retain(args.i32(1));
    match dl::open(&mut *caller, &name, flags) {
        Ok(handle) => Ok(handle.raw().into()),
        Err(err) => fail(caller, err, 0),
    }
}

/// Append `func` to the caller's function table so it can be called through a pointer. A table
/// that cannot grow is a `dlsym` failure, not a fault.
fn function_pointer(
    caller: &mut Caller<'_, Host>,
    symbol: &str,
    func: wasmtime::Func,
) -> StubResult {
    let Some(Extern::Table(table)) = caller.get_export(FUNCTION_TABLE) else {
        let what = "dlsym of a function without an exported function table";
        return Err(Fault::nyi(what).into_error());
    };
    let index = table
        .grow(&mut *caller, 1, Ref::Func(Some(func)))
        .ok()
        .and_then(|index| i32::try_from(index).ok());
    match index {
        Some(index) => Ok(Ret::I32(index)),
        None => {
            let err = WasmlinkErrorKind::FunctionTableFull {
                symbol: symbol.to_string(),
            };
            fail(caller, err.into(), 0)
        }
    }
}

pub(crate) fn dlsym(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let (handle, symbol) = (args.u32(0), args.ptr(1));
    let name = if symbol == 0 {
        String::new()
    } else {
        let (mem, _) = split(caller)?;
        mem.cstr_lossy(symbol)?
    };
    let export = match caller.data().libs().lookup(handle, &name) {
        Ok(export) => export,
        Err(err) => return fail(caller, err, 0),
    };
    match export {
        Extern::Func(func) => function_pointer(caller, &name, func),
        Extern::Global(global) => Ok(Ret::I32(match global.get(&mut *caller) {
            Val::I32(v) => v,
            Val::I64(v) => v as i32,
            _ => 0,
        })),
        _ => {
            let libs = caller.data().libs();
            let library = LibraryHandle::from_raw(handle)
                .and_then(|h| libs.module(h))
                .map(|m| m.name().to_string())
                .unwrap_or_default();
            let err = WasmlinkErrorKind::SymbolNotFound {
                symbol: name,
                library,
            };
            fail(caller, err.into(), 0)
        }
    }
}

pub(crate) fn dlclose(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    match caller.data_mut().libs_mut().close(args.u32(0)) {
        Ok(_) => Ok(Ret::I32(0)),
        Err(err) => fail(caller, err, -1),
    }
}

/// The most recent failure as a freshly allocated C string, or NULL. Reading it clears it.
pub(crate) fn dlerror(caller: &mut Caller<'_, Host>, _: Args<'_>) -> StubResult {
    match caller.data_mut().libs_mut().take_error() {
        Some(msg) => Ok(malloc_cstr(caller, msg.as_bytes())?.into()),
        None => Ok(Ret::I32(0)),
    }
}
