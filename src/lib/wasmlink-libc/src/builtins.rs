use wasmlink::StubLibrary;

pub fn library() -> StubLibrary {
    StubLibrary::new("builtins")
        .nyi_all(&[
            "__builtin_apply_args",
            "__builtin_apply",
            "__builtin_return",
            "__builtin_va_arg_pack",
            "__builtin_va_arg_pack_len",
        ])
        .func("__builtin_malloc", crate::stdlib::malloc)
}
