//! Where module bytes come from.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tracing::trace;

use crate::{WasmlinkError, WasmlinkErrorKind};

/// System-specific part of the loader: turns a module identifier into the module's bytes.
pub trait ModuleSource {
    /// Load the bytes of a single module, based on its identifier.
    fn load_object(&mut self, name: &str) -> Result<Vec<u8>, WasmlinkError>;
}

/// Loads modules from the file system. An identifier is tried as a path first, then relative to
/// each search path in order.
#[derive(Debug, Clone, Default)]
pub struct FsSource {
    search_paths: Vec<PathBuf>,
}

impl FsSource {
    pub fn new(search_paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            search_paths: search_paths.into_iter().map(Into::into).collect(),
        }
    }

    fn candidates<'a>(&'a self, name: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
        std::iter::once(PathBuf::from(name)).chain(
            self.search_paths
                .iter()
                .filter(move |_| Path::new(name).is_relative())
                .map(move |dir| dir.join(name)),
        )
    }
}

impl ModuleSource for FsSource {
    fn load_object(&mut self, name: &str) -> Result<Vec<u8>, WasmlinkError> {
        for path in self.candidates(name) {
            trace!("trying {} for module {}", path.display(), name);
            match std::fs::read(&path) {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(WasmlinkErrorKind::ModuleReadFail {
                        name: name.to_string(),
                        reason: format!("{}: {}", path.display(), e),
                    }
                    .into())
                }
            }
        }
        Err(WasmlinkErrorKind::ModuleNotFound {
            name: name.to_string(),
        }
        .into())
    }
}

/// A fixed set of modules held in memory, for embedding.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    objects: HashMap<String, Vec<u8>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl ToString, bytes: impl Into<Vec<u8>>) {
        self.objects.insert(name.to_string(), bytes.into());
    }

    pub fn with(mut self, name: impl ToString, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(name, bytes);
        self
    }
}

impl ModuleSource for InMemorySource {
    fn load_object(&mut self, name: &str) -> Result<Vec<u8>, WasmlinkError> {
        self.objects.get(name).cloned().ok_or_else(|| {
            WasmlinkErrorKind::ModuleNotFound {
                name: name.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_lookup() {
        let mut src = InMemorySource::new().with("a.wasm", b"\0asm".to_vec());
        assert_eq!(src.load_object("a.wasm").unwrap(), b"\0asm");
        let err = src.load_object("b.wasm").unwrap_err();
        assert!(err.is_load_failure());
    }

    #[test]
    fn fs_searches_paths_in_order() {
        let dir = std::env::temp_dir().join(format!("wasmlink-src-{}", std::process::id()));
        let first = dir.join("first");
        let second = dir.join("second");
        std::fs::create_dir_all(&first).unwrap();
        std::fs::create_dir_all(&second).unwrap();
        std::fs::write(second.join("lib.wasm"), b"second").unwrap();
        std::fs::write(first.join("other.wasm"), b"first").unwrap();

        let mut src = FsSource::new([&first, &second]);
        assert_eq!(src.load_object("lib.wasm").unwrap(), b"second");
        assert_eq!(src.load_object("other.wasm").unwrap(), b"first");
        assert!(matches!(
            src.load_object("missing.wasm").unwrap_err().kind,
            WasmlinkErrorKind::ModuleNotFound { .. }
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
