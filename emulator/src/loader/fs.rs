use std::{
    collections::HashMap,
    io::{Cursor, Read},
};

use camino::{Utf8Path, Utf8PathBuf};

/// Where program files are read from
pub trait Filesystem {
    type File: Read;

    fn open(&self, path: &Utf8Path) -> std::io::Result<Self::File>;

    fn root(&self) -> Utf8PathBuf {
        Utf8PathBuf::new()
    }

    /// Resolve a path relative to the root
    fn resolve(&self, path: &Utf8Path) -> Utf8PathBuf {
        // Joining an absolute path replaces the root
        self.root().join(path)
    }
}

/// Program files held in memory, used by tests and the console
#[derive(Debug, Default, Clone)]
pub struct InMemoryFilesystem {
    files: HashMap<Utf8PathBuf, String>,
}

impl InMemoryFilesystem {
    #[must_use]
    pub const fn new(files: HashMap<Utf8PathBuf, String>) -> Self {
        InMemoryFilesystem { files }
    }

    pub fn insert(&mut self, path: impl Into<Utf8PathBuf>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }
}

impl<P: Into<Utf8PathBuf>, C: Into<String>> FromIterator<(P, C)> for InMemoryFilesystem {
    fn from_iter<T: IntoIterator<Item = (P, C)>>(iter: T) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(path, content)| (path.into(), content.into()))
                .collect(),
        )
    }
}

impl Filesystem for InMemoryFilesystem {
    type File = Cursor<String>;

    fn open(&self, path: &Utf8Path) -> std::io::Result<Self::File> {
        self.files
            .get(path)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"))
            .map(|content| Cursor::new(content.clone()))
    }
}

/// Program files read from the host, relative to the working directory
#[derive(Debug, Clone)]
pub struct NativeFilesystem {
    root: Utf8PathBuf,
}

impl NativeFilesystem {
    /// Use the current working directory as the root
    ///
    /// # Errors
    ///
    /// Fails if the working directory is unavailable or is not valid UTF-8
    pub fn from_env() -> std::io::Result<Self> {
        let root = std::env::current_dir()?;
        let root = Utf8PathBuf::try_from(root)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(NativeFilesystem { root })
    }
}

impl Filesystem for NativeFilesystem {
    type File = std::fs::File;

    fn open(&self, path: &Utf8Path) -> std::io::Result<Self::File> {
        std::fs::File::open(self.resolve(path))
    }

    fn root(&self) -> Utf8PathBuf {
        self.root.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    #[test]
    fn in_memory_test() {
        let fs: InMemoryFilesystem = [("prog.txt", "1\n2\n")].into_iter().collect();

        let mut content = String::new();
        fs.open(Utf8Path::new("prog.txt"))
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "1\n2\n");

        let err = fs.open(Utf8Path::new("missing.txt")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
