//! POSIX headers: `<dlfcn.h>`, `<fcntl.h>`, `<setjmp.h>`, `<signal.h>`, `<sys/mman.h>` and
//! `<unistd.h>`.

use tracing::debug;
use wasmlink::{
    abi::{Args, Ret},
    host::split,
    Fault, Host, StubLibrary,
};
use wasmtime::Caller;

use crate::{dlfcn, StubResult};

const SIG_ERR: i32 = -1;
const MAP_FAILED: i32 = -1;
const PROT_READ: i32 = 1;
const PROT_WRITE: i32 = 2;

/// Hands out the lowest free descriptor. Nothing is actually opened.
fn open(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let fd = caller.data_mut().fds().open().unwrap_or(-1);
    debug!("open({:#x}, {:#o}) = {}", args.ptr(0), args.i32(1), fd);
    Ok(Ret::I32(fd))
}

fn close(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    Ok(Ret::I32(if caller.data_mut().fds().close(args.i32(0)) {
        0
    } else {
        -1
    }))
}

fn exit_now(_: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let status = args.i32(0);
    Err(Fault::terminate(status, format!("_exit({})", status)).into_error())
}

fn signal(_: &mut Caller<'_, Host>, _: Args<'_>) -> StubResult {
    Ok(Ret::I32(SIG_ERR))
}

/// Anonymous read/write mappings only, carved out of the heap.
fn mmap(caller: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let (addr, length, prot, fd) = (args.ptr(0), args.u32(1), args.i32(2), args.i32(4));
    if addr != 0 {
        return Err(Fault::nyi(format!("mmap addr {}", addr)).into_error());
    }
    if prot != PROT_READ | PROT_WRITE {
        return Err(Fault::nyi(format!("mmap prot {}", prot)).into_error());
    }
    if fd != -1 {
        return Err(Fault::nyi(format!("mmap fd {}", fd)).into_error());
    }
    let (mut mem, host) = split(caller)?;
    match host.heap().alloc(length, mem.len()) {
        Some(ptr) => {
            mem.zero(ptr, length)?;
            Ok(ptr.into())
        }
        None => Ok(Ret::I32(MAP_FAILED)),
    }
}

fn zero(_: &mut Caller<'_, Host>, _: Args<'_>) -> StubResult {
    Ok(Ret::I32(0))
}

pub fn library() -> StubLibrary {
    StubLibrary::new("unix")
        // <dlfcn.h>
        .func("dlclose", dlfcn::dlclose)
        .func("dlerror", dlfcn::dlerror)
        .func("dlopen", dlfcn::dlopen)
        .func("dlsym", dlfcn::dlsym)
        .nyi_all(&["dladdr", "dlinfo"])
        // <fcntl.h>
        .func("creat", open)
        .nyi("fcntl")
        .func("open", open)
        .nyi_all(&["posix_fadvise", "posix_fallocate"])
        // <setjmp.h>
        .nyi_all(&["longjmp", "siglongjmp", "_longjmp", "setjmp", "sigsetjmp", "_setjmp"])
        // <signal.h>
        .func("signal", signal)
        // <sys/mman.h>
        .nyi_all(&["mlock", "mlockall"])
        .func("mmap", mmap)
        .nyi_all(&["mprotect", "shm_open"])
        // <unistd.h>
        .nyi_all(&["access", "alarm", "brk", "chdir", "chroot", "chown"])
        .func("close", close)
        .nyi_all(&[
            "confstr", "crypt", "ctermid", "cuserid", "dup", "dup2", "encrypt", "execl", "execle",
            "execlp", "execv", "execve", "execvp",
        ])
        .func("_exit", exit_now)
        .nyi_all(&[
            "fchown",
            "fchdir",
            "fdatasync",
            "fork",
            "fpathconf",
            "fsync",
            "ftruncate",
            "getcwd",
            "getdtablesize",
        ])
        .func("getegid", zero)
        .func("geteuid", zero)
        .func("getgid", zero)
        .nyi("getgroups")
        .func("gethostid", zero)
        .nyi_all(&["getlogin", "getlogin_r", "getopt", "getpagesize", "getpass"])
        .func("getpgid", zero)
        .func("getpgrp", zero)
        .func("getpid", zero)
        .func("getppid", zero)
        .func("getsid", zero)
        .func("getuid", zero)
        .func("getwd", zero)
        .func("isatty", zero)
        .nyi_all(&[
            "lchown",
            "link",
            "lockf",
            "lseek",
            "nice",
            "pathconf",
            "pause",
            "pipe",
            "pread",
            "pthread_atfork",
            "pwrite",
            "read",
            "readlink",
            "rmdir",
            "sbrk",
            "setgid",
            "setpgid",
            "setpgrp",
            "setregid",
            "setreuid",
            "setsid",
            "setuid",
            "sleep",
            "swab",
            "symlink",
            "sync",
            "sysconf",
            "tcgetpgrp",
            "tcsetpgrp",
            "truncate",
            "ttyname",
            "ttyname_r",
            "ualarm",
            "unlink",
            "usleep",
            "vfork",
            "write",
        ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique() {
        let lib = library();
        let mut names: Vec<_> = lib.iter().map(|(n, _)| n).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), lib.len());
    }
}
