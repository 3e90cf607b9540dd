//! `<stdlib.h>`: the bump heap, process termination and a few conversions.

use tracing::warn;
use wasmlink::{
    abi::{Args, Ret},
    host::{self, split},
    Fault, Host, StubLibrary,
};
use wasmtime::Caller;

use crate::StubResult;

pub(crate) fn malloc(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    Ok(host::malloc(caller, args.u32(0))?.into())
}

fn calloc(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let Some(size) = args.u32(0).checked_mul(args.u32(1)) else {
        return Ok(Ret::I32(0));
    };
    let (mut mem, host) = split(caller)?;
    match host.heap().alloc(size, mem.len()) {
        Some(ptr) => {
            mem.zero(ptr, size)?;
            Ok(ptr.into())
        }
        None => Ok(Ret::I32(0)),
    }
}

fn free(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let ptr = args.ptr(0);
    if ptr != 0 && !caller.data_mut().heap().free(ptr) {
        warn!("free of unknown pointer {:#x}", ptr);
    }
    Ok(Ret::Void)
}

fn realloc(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let (ptr, size) = (args.ptr(0), args.u32(1));
    if ptr == 0 {
        return Ok(host::malloc(caller, size)?.into());
    }
    let (mut mem, host) = split(caller)?;
    let heap = host.heap();
    if size == 0 {
        heap.free(ptr);
        return Ok(Ret::I32(0));
    }
    let old = heap.size_of(ptr).unwrap_or_else(|| {
        warn!("realloc of unknown pointer {:#x}", ptr);
        0
    });
    let Some(new) = heap.alloc(size, mem.len()) else {
        return Ok(Ret::I32(0));
    };
    mem.copy_within(ptr, new, old.min(size))?;
    heap.free(ptr);
    Ok(new.into())
}

fn terminate(status: i32, reason: String) -> StubResult {
    Err(Fault::terminate(status, reason).into_error())
}

fn abort(_: &mut Caller<'_, Host>, _: Args<'_>) -> StubResult {
    terminate(1, "abort()".to_string())
}

// TODO: run functions registered with atexit once atexit is supported.
fn exit(_: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let status = args.i32(0);
    terminate(status, format!("exit({})", status))
}

fn exit_now(_: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let status = args.i32(0);
    terminate(status, format!("_Exit({})", status))
}

fn quick_exit(_: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let status = args.i32(0);
    terminate(status, format!("quick_exit({})", status))
}

fn abs(_: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    Ok(Ret::I32(args.i32(0).wrapping_abs()))
}

fn llabs(_: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    Ok(Ret::I64(args.i64(0).wrapping_abs()))
}

/// Parse a decimal integer the way `atoi` does: leading whitespace, an optional sign, then
/// digits up to the first non-digit.
fn parse_int(s: &[u8]) -> i64 {
    let mut rest = s
        .iter()
        .skip_while(|c| matches!(c, b' ' | b'\t'..=b'\r'))
        .peekable();
    let negative = match rest.peek() {
        Some(b'-') => {
            rest.next();
            true
        }
        Some(b'+') => {
            rest.next();
            false
        }
        _ => false,
    };
    let value = rest
        .take_while(|c| c.is_ascii_digit())
        .fold(0i64, |acc, c| acc.wrapping_mul(10).wrapping_add((c - b'0') as i64));
    if negative {
        value.wrapping_neg()
    } else {
        value
    }
}

fn atoi(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let (mem, _) = split(caller)?;
    Ok(Ret::I64(parse_int(mem.cstr(args.ptr(0))?)))
}

pub fn library() -> StubLibrary {
    StubLibrary::new("stdlib")
        // String conversion.
        .func("atoi", atoi)
        .func("atol", atoi)
        .func("atoll", atoi)
        .nyi_all(&[
            "atof", "strtod", "strtof", "strtol", "strtold", "strtoll", "strtoul", "strtoull",
        ])
        // Pseudo-random sequence generation.
        .nyi_all(&["rand", "srand"])
        // Dynamic memory management.
        .func("calloc", calloc)
        .func("free", free)
        .func("malloc", malloc)
        .func("realloc", realloc)
        // Environment.
        .func("abort", abort)
        .nyi_all(&["atexit", "at_quick_exit"])
        .func("exit", exit)
        .nyi("getenv")
        .func("quick_exit", quick_exit)
        .nyi("system")
        .func("_Exit", exit_now)
        // Searching and sorting.
        .nyi_all(&["bsearch", "qsort"])
        // Integer arithmetic.
        .func("abs", abs)
        .func("labs", abs)
        .func("llabs", llabs)
        .nyi_all(&["div", "ldiv", "lldiv"])
        // Multibyte characters and strings.
        .nyi_all(&["mblen", "mbtowc", "wctomb", "mbstowcs", "wcstombs"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atoi_parsing() {
        assert_eq!(parse_int(b"42"), 42);
        assert_eq!(parse_int(b"  \t-17xyz"), -17);
        assert_eq!(parse_int(b"+8"), 8);
        assert_eq!(parse_int(b"abc"), 0);
        assert_eq!(parse_int(b""), 0);
    }
}
