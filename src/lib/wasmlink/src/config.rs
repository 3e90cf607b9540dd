//! Host configuration.

use std::path::PathBuf;

/// Size of a wasm page in bytes.
pub const WASM_PAGE_SIZE: usize = 1 << 16;

/// Tunables for one run of the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Size of the linear memory the host creates before any module exports its own.
    pub initial_pages: u32,
    /// Addresses below this are never handed out by the allocator.
    pub heap_base: u32,
    /// Name of the main module's entry point.
    pub entry: String,
    /// Directories searched for modules given by relative name.
    pub search_paths: Vec<PathBuf>,
}

impl HostConfig {
    pub const DEFAULT_PAGES: u32 = 256;
    pub const DEFAULT_HEAP_BASE: u32 = 1 << 14;
    pub const DEFAULT_ENTRY: &'static str = "main";

    pub fn with_pages(mut self, pages: u32) -> Self {
        self.initial_pages = pages;
        self
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn initial_bytes(&self) -> usize {
        self.initial_pages as usize * WASM_PAGE_SIZE
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            initial_pages: Self::DEFAULT_PAGES,
            heap_base: Self::DEFAULT_HEAP_BASE,
            entry: Self::DEFAULT_ENTRY.to_string(),
            search_paths: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_give_a_16mib_heap() {
        let config = HostConfig::default();
        assert_eq!(config.initial_bytes(), 1 << 24);
        assert_eq!(config.heap_base, 16 * 1024);
        assert_eq!(config.entry, "main");
    }
}
