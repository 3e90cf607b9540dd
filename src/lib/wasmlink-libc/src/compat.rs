//! Placeholders for names a libc build may import without ever calling. Flattened first, so any
//! real implementation in a later table takes precedence.

use wasmlink::StubLibrary;

pub fn library() -> StubLibrary {
    StubLibrary::new("compat").nyi_all(&[
        "abort",
        "__addtf3",
        "__block_all_sigs",
        "__divtf3",
        "__dl_invalid_handle",
        "__dl_seterr",
        "_Exit",
        "__extenddftf2",
        "__extendsftf2",
        "fcntl",
        "fdopen",
        "__fdopen",
        "feclearexcept",
        "fegetround",
        "feraiseexcept",
        "fesetround",
        "fetestexcept",
        "__fixtfdi",
        "__fixtfsi",
        "__floatscan",
        "__floatsitf",
        "fprintf",
        "iswctype",
        "iswspace",
        "__lctrans",
        "__lctrans_cur",
        "__lock",
        "__lockfile",
        "__lttf2",
        "__madvise",
        "mbtowc",
        "__mmap",
        "__mremap",
        "__multf3",
        "__munmap",
        "nanosleep",
        "__netf2",
        "posix_spawn",
        "posix_spawn_file_actions_adddup2",
        "posix_spawn_file_actions_destroy",
        "posix_spawn_file_actions_init",
        "pthread_self",
        "__randname",
        "__rem_pio2_large",
        "setitimer",
        "__set_thread_area",
        "snprintf",
        "sprintf",
        "__stdio_write",
        "__stdout_write",
        "__synccall",
        "towlower",
        "towupper",
        "__trunctfdf2",
        "__trunctfsf2",
        "uname",
        "__unlock",
        "__unlockfile",
        "vfprintf",
        "vfscanf",
        "vsnprintf",
        "wctype",
    ])
}
