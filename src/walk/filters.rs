//! Built-in walker processors.

use std::io::{self, Read};

use crate::walk::{base_name, File, FileKind, Processor, Verdict};

/// Drops `.git` directories. Version control internals are churn-heavy
/// and near-useless as search results.
pub struct GitDir;

impl Processor for GitDir {
    fn name(&self) -> &'static str {
        "git"
    }

    fn process(&self, file: &dyn File) -> io::Result<Verdict> {
        if base_name(file.path()) != ".git" {
            return Ok(Verdict::Pass);
        }
        if file.stat()?.is_dir() {
            Ok(Verdict::Drop)
        } else {
            Ok(Verdict::Pass)
        }
    }
}

/// Drops files and directories whose base name is on a denylist.
pub struct NameDenylist {
    pub names: Vec<&'static str>,
}

impl Default for NameDenylist {
    fn default() -> Self {
        NameDenylist {
            names: vec![".svn", ".sass-cache", ".yardoc", "__MACOSX", ".DS_Store"],
        }
    }
}

impl Processor for NameDenylist {
    fn name(&self) -> &'static str {
        "name"
    }

    fn process(&self, file: &dyn File) -> io::Result<Verdict> {
        if self.names.contains(&base_name(file.path())) {
            Ok(Verdict::Drop)
        } else {
            Ok(Verdict::Pass)
        }
    }
}

/// Expands directories into their entries.
pub struct Directory;

impl Processor for Directory {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn process(&self, file: &dyn File) -> io::Result<Verdict> {
        if !file.stat()?.is_dir() {
            return Ok(Verdict::Pass);
        }
        Ok(Verdict::Expand(file.read_dir()?))
    }
}

/// Drops sockets, devices, fifos and symlinks.
pub struct SpecialFile;

impl Processor for SpecialFile {
    fn name(&self) -> &'static str {
        "special"
    }

    fn process(&self, file: &dyn File) -> io::Result<Verdict> {
        if file.stat()?.kind == FileKind::Special {
            Ok(Verdict::Drop)
        } else {
            Ok(Verdict::Pass)
        }
    }
}

/// Drops regular files above a size limit.
pub struct MaxSize {
    pub max: u64,
}

impl Processor for MaxSize {
    fn name(&self) -> &'static str {
        "size"
    }

    fn process(&self, file: &dyn File) -> io::Result<Verdict> {
        if file.stat()?.len > self.max {
            Ok(Verdict::Drop)
        } else {
            Ok(Verdict::Pass)
        }
    }
}

/// Drops files that look binary: a NUL byte within the first 4096
/// bytes. Empty files are kept.
pub struct BinaryFile;

/// How many leading bytes the binary sniff examines.
const SNIFF_LEN: usize = 4096;

impl Processor for BinaryFile {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn process(&self, file: &dyn File) -> io::Result<Verdict> {
        let mut reader = file.open()?;
        let mut buf = [0u8; SNIFF_LEN];
        let mut filled = 0;
        while filled < SNIFF_LEN {
            let n = reader.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if is_binary(&buf[..filled]) {
            Ok(Verdict::Drop)
        } else {
            Ok(Verdict::Pass)
        }
    }
}

/// Whether a chunk of a file's head classifies it as binary.
pub fn is_binary(data: &[u8]) -> bool {
    data.contains(&0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walk::FileStat;

    struct FakeFile {
        path: String,
        stat: FileStat,
        data: Vec<u8>,
    }

    impl FakeFile {
        fn regular(path: &str, data: &[u8]) -> FakeFile {
            FakeFile {
                path: path.to_string(),
                stat: FileStat {
                    kind: FileKind::Regular,
                    len: data.len() as u64,
                },
                data: data.to_vec(),
            }
        }

        fn dir(path: &str) -> FakeFile {
            FakeFile {
                path: path.to_string(),
                stat: FileStat {
                    kind: FileKind::Directory,
                    len: 0,
                },
                data: Vec::new(),
            }
        }
    }

    impl File for FakeFile {
        fn path(&self) -> &str {
            &self.path
        }

        fn stat(&self) -> io::Result<FileStat> {
            Ok(self.stat)
        }

        fn read_dir(&self) -> io::Result<Vec<Box<dyn File>>> {
            Ok(Vec::new())
        }

        fn open(&self) -> io::Result<Box<dyn Read + Send>> {
            Ok(Box::new(io::Cursor::new(self.data.clone())))
        }
    }

    #[test]
    fn is_binary_on_nul() {
        assert!(is_binary(b"ELF\0\0\0"));
        assert!(!is_binary(b"hello world\n"));
        assert!(!is_binary(b""));
    }

    #[test]
    fn git_dir_dropped_but_git_file_kept() {
        let dir = FakeFile::dir("/repo/.git");
        assert!(matches!(GitDir.process(&dir).unwrap(), Verdict::Drop));
        let file = FakeFile::regular("/repo/.git", b"gitdir: elsewhere");
        assert!(matches!(GitDir.process(&file).unwrap(), Verdict::Pass));
        let other = FakeFile::dir("/repo/src");
        assert!(matches!(GitDir.process(&other).unwrap(), Verdict::Pass));
    }

    #[test]
    fn denylist_matches_base_name() {
        let f = FakeFile::regular("/x/.DS_Store", b"");
        assert!(matches!(
            NameDenylist::default().process(&f).unwrap(),
            Verdict::Drop
        ));
        let ok = FakeFile::regular("/x/notes.txt", b"");
        assert!(matches!(
            NameDenylist::default().process(&ok).unwrap(),
            Verdict::Pass
        ));
    }

    #[test]
    fn size_limit() {
        let small = FakeFile::regular("/x/a", &[b'a'; 16]);
        let big = FakeFile::regular("/x/b", &[b'b'; 64]);
        let filter = MaxSize { max: 32 };
        assert!(matches!(filter.process(&small).unwrap(), Verdict::Pass));
        assert!(matches!(filter.process(&big).unwrap(), Verdict::Drop));
    }

    #[test]
    fn binary_filter_drops_nul_keeps_text_and_empty() {
        let text = FakeFile::regular("/x/a.txt", b"plain text\n");
        let bin = FakeFile::regular("/x/a.o", b"\x7fELF\0\0");
        let empty = FakeFile::regular("/x/empty", b"");
        assert!(matches!(BinaryFile.process(&text).unwrap(), Verdict::Pass));
        assert!(matches!(BinaryFile.process(&bin).unwrap(), Verdict::Drop));
        assert!(matches!(BinaryFile.process(&empty).unwrap(), Verdict::Pass));
    }

    #[test]
    fn binary_sniff_only_reads_head() {
        // NUL beyond the sniff window does not classify the file.
        let mut data = vec![b'a'; SNIFF_LEN];
        data.push(0);
        let f = FakeFile::regular("/x/tail-nul", &data);
        assert!(matches!(BinaryFile.process(&f).unwrap(), Verdict::Pass));
    }
}
