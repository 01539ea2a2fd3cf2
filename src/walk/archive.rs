//! Archive descent: gzip and zip files expand into virtual children.
//!
//! A virtual path is `host\0inner`, with a literal NUL byte between the
//! archive file and the member path. The store's path analyzer strips
//! NULs before tokenizing, so members still land under their host's
//! directory hierarchy. Nested archives (a path with two NULs) are not
//! descended.

use std::fs;
use std::io::{self, Read};

use flate2::read::GzDecoder;
use zip::ZipArchive;

use crate::walk::{base_name, File, FileKind, FileStat, Processor, Verdict};

/// Expands `foo.gz` into the single virtual member `foo.gz\0foo`.
pub struct GzipExpand;

impl Processor for GzipExpand {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn process(&self, file: &dyn File) -> io::Result<Verdict> {
        let path = file.path();
        if path.contains('\0') || !path.ends_with(".gz") {
            return Ok(Verdict::Pass);
        }
        if file.stat()?.kind != FileKind::Regular {
            return Ok(Verdict::Pass);
        }
        let inner = base_name(path).trim_end_matches(".gz").to_string();
        let len = file.stat()?.len;
        Ok(Verdict::Expand(vec![Box::new(ArchiveMember {
            path: format!("{}\0{}", path, inner),
            len,
        })]))
    }
}

/// Expands `foo.zip` into one virtual member per stored file entry.
pub struct ZipExpand;

impl Processor for ZipExpand {
    fn name(&self) -> &'static str {
        "zip"
    }

    fn process(&self, file: &dyn File) -> io::Result<Verdict> {
        let path = file.path();
        if path.contains('\0') || !path.ends_with(".zip") {
            return Ok(Verdict::Pass);
        }
        if file.stat()?.kind != FileKind::Regular {
            return Ok(Verdict::Pass);
        }

        let reader = fs::File::open(path)?;
        let mut archive = ZipArchive::new(reader).map_err(into_io)?;
        let mut members: Vec<Box<dyn File>> = Vec::new();
        for i in 0..archive.len() {
            let entry = archive.by_index(i).map_err(into_io)?;
            if entry.is_dir() {
                continue;
            }
            members.push(Box::new(ArchiveMember {
                path: format!("{}\0{}", path, entry.name()),
                len: entry.size(),
            }));
        }
        Ok(Verdict::Expand(members))
    }
}

/// A virtual file inside an archive. Re-enters the processor chain like
/// any other file, so the name, size and binary filters apply to
/// archive members too.
struct ArchiveMember {
    path: String,
    len: u64,
}

impl File for ArchiveMember {
    fn path(&self) -> &str {
        &self.path
    }

    fn stat(&self) -> io::Result<FileStat> {
        Ok(FileStat {
            kind: FileKind::Regular,
            len: self.len,
        })
    }

    fn read_dir(&self) -> io::Result<Vec<Box<dyn File>>> {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a directory",
        ))
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        open_virtual(&self.path)
    }
}

/// Open a possibly-virtual path: a plain file, a gzip member
/// (`host.gz\0name`) or a zip member (`host.zip\0entry/path`).
pub fn open_virtual(path: &str) -> io::Result<Box<dyn Read + Send>> {
    let Some((host, inner)) = path.split_once('\0') else {
        return Ok(Box::new(fs::File::open(path)?));
    };
    if inner.contains('\0') {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "nested archives are not supported",
        ));
    }

    if host.ends_with(".gz") {
        let file = fs::File::open(host)?;
        return Ok(Box::new(GzDecoder::new(file)));
    }

    if host.ends_with(".zip") {
        let file = fs::File::open(host)?;
        let mut archive = ZipArchive::new(file).map_err(into_io)?;
        let mut entry = archive.by_name(inner).map_err(into_io)?;
        // ZipFile borrows the archive; buffer the member instead of
        // threading that lifetime through the File trait.
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        return Ok(Box::new(io::Cursor::new(data)));
    }

    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("no archive handler for {:?}", host),
    ))
}

fn into_io(err: zip::result::ZipError) -> io::Error {
    match err {
        zip::result::ZipError::Io(err) => err,
        other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
    }
}
