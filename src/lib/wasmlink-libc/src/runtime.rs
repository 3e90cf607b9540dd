//! Compiler runtime helpers for 128-bit and soft-float arithmetic. None are provided.

use wasmlink::StubLibrary;

pub fn library() -> StubLibrary {
    StubLibrary::new("runtime").nyi_all(&[
        "__addtf3",
        "__divtf3",
        "__eqtf2",
        "__fixsfti",
        "__fixtfdi",
        "__fixtfsi",
        "__fixunstfdi",
        "__fixunstfsi",
        "__floatditf",
        "__floatsitf",
        "__floatunditf",
        "__floatunsitf",
        "__getf2",
        "__gttf2",
        "__lttf2",
        "__multf3",
        "__multi3",
        "__netf2",
        "__subtf3",
        "__divsc3",
    ])
}
