//! `<stdio.h>`. Only character output to the standard output buffer is supported; everything is
//! written out when the program terminates.

use wasmlink::{
    abi::{Args, Ret},
    host::split,
    Host, StubLibrary,
};
use wasmtime::Caller;

use crate::StubResult;

fn putchar(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let c = args.i32(0) as u8;
    caller.data_mut().stdout().push(&[c]);
    Ok(Ret::I32(c as i32))
}

fn puts(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let (mem, host) = split(caller)?;
    let s = mem.cstr(args.ptr(0))?;
    let out = host.stdout();
    out.push(s);
    out.push(b"\n");
    Ok(Ret::I32(0))
}

pub fn library() -> StubLibrary {
    StubLibrary::new("stdio")
        // Operations on files.
        .nyi_all(&["remove", "rename", "tmpfile", "tmpnam"])
        // File access.
        .nyi_all(&["fclose", "fflush", "fopen", "freopen", "setbuf", "setvbuf"])
        // Formatted input/output.
        .nyi_all(&[
            "fprintf",
            "fscanf",
            "printf",
            "scanf",
            "snprintf",
            "sprintf",
            "sscanf",
            "vfprintf",
            "vfscanf",
            "vprintf",
            "vscanf",
            "vsnprintf",
            "vsprintf",
            "vsscanf",
        ])
        // Character input/output.
        .nyi_all(&["fgetc", "fgets", "fputc", "fputs", "getc", "getchar", "gets", "putc"])
        .func("putchar", putchar)
        .func("puts", puts)
        .nyi("ungetc")
        // Direct input/output.
        .nyi_all(&["fread", "fwrite"])
        // File positioning.
        .nyi_all(&["fgetpos", "fseek", "fsetpos", "ftell", "rewind"])
        // Error handling.
        .nyi_all(&["clearerr", "feof", "ferror", "perror"])
}
