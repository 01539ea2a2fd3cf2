//! Recursive file-tree traversal through a processor chain.
//!
//! The walker hands every file to an ordered chain of processors.
//! Processors come in two kinds: generators, which expand a file into
//! more files (directory listings, archive members), and filters, which
//! drop files from indexing (VCS metadata, oversized or binary files).
//! A file no processor claims is emitted for indexing.
//!
//! Paths are plain strings rather than `Path`s because archive members
//! get virtual paths with a NUL byte between the host file and the
//! inner entry, e.g. `/src/vendor.zip\0lib/util.c`.

pub mod archive;
pub mod filters;

use std::fs;
use std::io::{self, Read};

use anyhow::Result;

pub use archive::open_virtual;

/// What kind of object a [`File`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    Regular,
    /// Sockets, devices, fifos, symlinks: anything we refuse to read.
    Special,
}

/// Result of [`File::stat`].
#[derive(Debug, Clone, Copy)]
pub struct FileStat {
    pub kind: FileKind,
    pub len: u64,
}

impl FileStat {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

/// A file reference the walker can traverse: an OS file, a directory,
/// or a virtual member of an archive.
pub trait File: Send {
    /// The (possibly virtual) path of the file.
    fn path(&self) -> &str;

    fn stat(&self) -> io::Result<FileStat>;

    /// Children of a directory-like file.
    fn read_dir(&self) -> io::Result<Vec<Box<dyn File>>>;

    /// A reader over the file's contents.
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;
}

/// A regular file or directory on the local file system.
pub struct OsFile(pub String);

impl File for OsFile {
    fn path(&self) -> &str {
        &self.0
    }

    fn stat(&self) -> io::Result<FileStat> {
        let meta = fs::symlink_metadata(&self.0)?;
        let kind = if meta.is_dir() {
            FileKind::Directory
        } else if meta.is_file() {
            FileKind::Regular
        } else {
            FileKind::Special
        };
        Ok(FileStat {
            kind,
            len: meta.len(),
        })
    }

    fn read_dir(&self) -> io::Result<Vec<Box<dyn File>>> {
        let mut out: Vec<Box<dyn File>> = Vec::new();
        for entry in fs::read_dir(&self.0)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            out.push(Box::new(OsFile(join(&self.0, &name))));
        }
        Ok(out)
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(fs::File::open(&self.0)?))
    }
}

/// What a processor decided about a file.
pub enum Verdict {
    /// Not handled; try the next processor.
    Pass,
    /// Filtered out of indexing.
    Drop,
    /// Recurse into these children instead.
    Expand(Vec<Box<dyn File>>),
}

/// One step of the walker's chain.
pub trait Processor: Sync {
    /// Short name used in skip diagnostics.
    fn name(&self) -> &'static str;

    fn process(&self, file: &dyn File) -> io::Result<Verdict>;
}

/// The processor chain plus traversal.
pub struct Walker {
    processors: Vec<Box<dyn Processor>>,
}

impl Walker {
    pub fn new(processors: Vec<Box<dyn Processor>>) -> Walker {
        Walker { processors }
    }

    /// The standard chain: git and name filtering, directory expansion,
    /// special-file dropping, archive descent, then size and binary
    /// filtering. Archives expand before the content filters run, so
    /// their members are filtered individually instead of the archive
    /// being dropped as one binary blob.
    pub fn with_default_processors(max_filesize: u64) -> Walker {
        Walker::new(vec![
            Box::new(filters::GitDir),
            Box::new(filters::NameDenylist::default()),
            Box::new(filters::Directory),
            Box::new(filters::SpecialFile),
            Box::new(archive::GzipExpand),
            Box::new(archive::ZipExpand),
            Box::new(filters::MaxSize { max: max_filesize }),
            Box::new(filters::BinaryFile),
        ])
    }

    /// Walk `file`, feeding unhandled files to `emit` and counting
    /// filtered files through `skipped`. Per-file processor errors are
    /// logged and skip the file; an error from `emit` aborts the walk.
    pub fn walk(
        &self,
        file: Box<dyn File>,
        emit: &mut dyn FnMut(Box<dyn File>) -> Result<()>,
        skipped: &mut dyn FnMut(&dyn File, &'static str),
    ) -> Result<()> {
        for proc in &self.processors {
            match proc.process(file.as_ref()) {
                Err(err) => {
                    log::warn!("couldn't process {:?}: {}", file.path(), err);
                    return Ok(());
                }
                Ok(Verdict::Pass) => continue,
                Ok(Verdict::Drop) => {
                    skipped(file.as_ref(), proc.name());
                    return Ok(());
                }
                Ok(Verdict::Expand(children)) => {
                    for child in children {
                        self.walk(child, emit, skipped)?;
                    }
                    return Ok(());
                }
            }
        }
        emit(file)
    }
}

/// Join a directory path and a child name with `/`.
pub fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Final `/`-separated segment of a (possibly virtual) path.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Everything before the final `/`-separated segment.
pub fn dir_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => ".",
    }
}
