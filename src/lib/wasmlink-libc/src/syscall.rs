//! Raw syscall entry points. There is no kernel underneath, so every syscall fails.

use tracing::warn;
use wasmlink::{
    abi::{Args, Ret},
    Host, StubLibrary,
};
use wasmtime::Caller;

use crate::StubResult;

fn syscall(_: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let rendered: Vec<String> = (0..args.len()).map(|i| args.i64(i).to_string()).collect();
    warn!("syscall({}) = -1", rendered.join(", "));
    Ok(Ret::I32(-1))
}

pub fn library() -> StubLibrary {
    StubLibrary::new("syscall")
        .func("__syscall0", syscall)
        .func("__syscall1", syscall)
        .func("__syscall2", syscall)
        .func("__syscall3", syscall)
        .func("__syscall4", syscall)
        .func("__syscall5", syscall)
        .func("__syscall6", syscall)
        .func("__syscall_cp", syscall)
}
