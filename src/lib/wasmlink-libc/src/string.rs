//! `<string.h>`.

use std::cmp::Ordering;

use wasmlink::{
    abi::{Args, Ret},
    host::{self, split},
    Host, StubLibrary,
};
use wasmtime::Caller;

use crate::StubResult;

fn sign(ord: Ordering) -> Ret {
    Ret::I32(ord as i32)
}

/// Compare up to `n` bytes of two strings, stopping after a NUL in either.
fn compare(a: &[u8], b: &[u8], n: usize) -> Ordering {
    let a = a.iter().chain(std::iter::once(&0));
    let b = b.iter().chain(std::iter::once(&0));
    for (x, y) in a.zip(b).take(n) {
        match x.cmp(y) {
            Ordering::Equal if *x == 0 => return Ordering::Equal,
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn memcpy(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let (dst, src, n) = (args.ptr(0), args.ptr(1), args.u32(2));
    let (mut mem, _) = split(caller)?;
    mem.copy_within(src, dst, n)?;
    Ok(dst.into())
}

fn mempcpy(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let (dst, src, n) = (args.ptr(0), args.ptr(1), args.u32(2));
    let (mut mem, _) = split(caller)?;
    mem.copy_within(src, dst, n)?;
    Ok(dst.wrapping_add(n).into())
}

fn memset(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let (ptr, value, n) = (args.ptr(0), args.i32(1) as u8, args.u32(2));
    let (mut mem, _) = split(caller)?;
    mem.fill(ptr, value, n)?;
    Ok(ptr.into())
}

fn memcmp(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let n = args.u32(2);
    let (mem, _) = split(caller)?;
    let a = mem.read(args.ptr(0), n)?;
    let b = mem.read(args.ptr(1), n)?;
    Ok(sign(a.cmp(b)))
}

fn memchr(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let (ptr, c, n) = (args.ptr(0), args.i32(1) as u8, args.u32(2));
    let (mem, _) = split(caller)?;
    let found = mem.read(ptr, n)?.iter().position(|b| *b == c);
    Ok(found.map(|i| ptr + i as u32).unwrap_or(0).into())
}

fn strlen(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let (mem, _) = split(caller)?;
    Ok((mem.cstr(args.ptr(0))?.len() as u32).into())
}

fn strcpy(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let (dst, src) = (args.ptr(0), args.ptr(1));
    let (mut mem, _) = split(caller)?;
    let len = mem.cstr(src)?.len() as u32;
    mem.copy_within(src, dst, len + 1)?;
    Ok(dst.into())
}

/// Copy at most `n` bytes, padding with NULs up to `n`.
fn strncpy(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let (dst, src, n) = (args.ptr(0), args.ptr(1), args.u32(2));
    let (mut mem, _) = split(caller)?;
    let len = (mem.cstr(src)?.len() as u32).min(n);
    mem.copy_within(src, dst, len)?;
    mem.zero(dst + len, n - len)?;
    Ok(dst.into())
}

fn strcat(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let (dst, src) = (args.ptr(0), args.ptr(1));
    let (mut mem, _) = split(caller)?;
    let end = dst + mem.cstr(dst)?.len() as u32;
    let len = mem.cstr(src)?.len() as u32;
    mem.copy_within(src, end, len + 1)?;
    Ok(dst.into())
}

fn strcmp(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let (mem, _) = split(caller)?;
    let a = mem.cstr(args.ptr(0))?;
    let b = mem.cstr(args.ptr(1))?;
    Ok(sign(compare(a, b, usize::MAX)))
}

fn strncmp(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let n = args.u32(2) as usize;
    let (mem, _) = split(caller)?;
    let a = mem.cstr(args.ptr(0))?;
    let b = mem.cstr(args.ptr(1))?;
    Ok(sign(compare(a, b, n)))
}

/// The terminator is part of the string, so searching for 0 finds it.
fn strchr(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let (ptr, c) = (args.ptr(0), args.i32(1) as u8);
    let (mem, _) = split(caller)?;
    let s = mem.cstr(ptr)?;
    let found = s.iter().chain(std::iter::once(&0)).position(|b| *b == c);
    Ok(found.map(|i| ptr + i as u32).unwrap_or(0).into())
}

fn strrchr(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let (ptr, c) = (args.ptr(0), args.i32(1) as u8);
    let (mem, _) = split(caller)?;
    let s = mem.cstr(ptr)?;
    Ok(find_last(s, c).map(|i| ptr + i as u32).unwrap_or(0).into())
}

/// Index of the last `c` in `s`, counting the terminator at `s.len()`.
fn find_last(s: &[u8], c: u8) -> Option<usize> {
    if c == 0 {
        Some(s.len())
    } else {
        s.iter().rposition(|b| *b == c)
    }
}

fn strdup(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let s = {
        let (mem, _) = split(caller)?;
        mem.cstr(args.ptr(0))?.to_vec()
    };
    Ok(host::malloc_cstr(caller, &s)?.into())
}

pub fn library() -> StubLibrary {
    StubLibrary::new("string")
        .func("memcpy", memcpy)
        .func("mempcpy", mempcpy)
        .func("memmove", memcpy)
        .func("memset", memset)
        .func("memcmp", memcmp)
        .func("memchr", memchr)
        .func("strlen", strlen)
        .func("strcpy", strcpy)
        .func("strncpy", strncpy)
        .func("strcat", strcat)
        .func("strcmp", strcmp)
        .func("strncmp", strncmp)
        .func("strchr", strchr)
        .func("strrchr", strrchr)
        .func("strdup", strdup)
        .nyi("strerror")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_comparison() {
        assert_eq!(compare(b"abc", b"abc", usize::MAX), Ordering::Equal);
        assert_eq!(compare(b"abc", b"abd", usize::MAX), Ordering::Less);
        assert_eq!(compare(b"abc", b"ab", usize::MAX), Ordering::Greater);
        assert_eq!(compare(b"abc", b"abd", 2), Ordering::Equal);
        assert_eq!(compare(b"", b"", 0), Ordering::Equal);
        assert_eq!(compare(b"\xff", b"a", 1), Ordering::Greater);
    }

    #[test]
    fn last_occurrence() {
        assert_eq!(find_last(b"hello", b'l'), Some(3));
        assert_eq!(find_last(b"hello", b'h'), Some(0));
        assert_eq!(find_last(b"hello", b'z'), None);
        assert_eq!(find_last(b"hello", 0), Some(5));
        assert_eq!(find_last(b"", 0), Some(0));
    }
}
