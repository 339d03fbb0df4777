//! Test doubles shared by unit tests.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tshook_util::fs::{FileSystem, RealFs};

/// Real filesystem that counts `read_to_string` calls per path.
#[derive(Debug, Default)]
pub(crate) struct CountingFs {
    reads: Mutex<HashMap<PathBuf, usize>>,
}

impl CountingFs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reads_of(&self, path: &Path) -> usize {
        self.reads.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub(crate) fn total_reads(&self) -> usize {
        self.reads.lock().unwrap().values().sum()
    }
}

impl FileSystem for CountingFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        *self.reads.lock().unwrap().entry(path.to_path_buf()).or_default() += 1;
        RealFs.read_to_string(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        RealFs.is_file(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        RealFs.is_dir(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        RealFs.read_dir(path)
    }
}
