//! Line-oriented grep over candidate files.
//!
//! The grep pass runs the full regular expression against each line of
//! a candidate and prints the matches, restoring exact semantics on top
//! of the store's approximate trigram filtering.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::{Arc, Mutex};

use regex::bytes::Regex;

/// Output switches, mirroring the classic grep flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// `-l`: print only the file name, once, and stop at the first match.
    pub list_only: bool,
    /// `-n`: prefix matches with the 1-based line number.
    pub line_numbers: bool,
    /// `-h`: omit the file name prefix.
    pub omit_names: bool,
}

/// A matcher bound to one compiled regex and one set of options.
/// `matched` records whether the most recent reader produced a match.
pub struct Grep {
    pub regex: Regex,
    pub options: Options,
    pub matched: bool,
}

impl Grep {
    pub fn new(regex: Regex, options: Options) -> Grep {
        Grep {
            regex,
            options,
            matched: false,
        }
    }

    /// Scan `reader` line by line, writing matches to `out`. A line is
    /// a run of bytes up to and including `\n`; the last line may be
    /// unterminated. Each match is written with a single `write_all`
    /// so concurrent grep workers sharing a [`SyncWriter`] never
    /// interleave mid-line.
    pub fn reader<R: Read, W: Write>(&mut self, reader: R, name: &str, out: &mut W) -> io::Result<()> {
        self.matched = false;
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        let mut lineno: u64 = 0;

        loop {
            line.clear();
            let n = reader.read_until(b'\n', &mut line)?;
            if n == 0 {
                return Ok(());
            }
            lineno += 1;

            let body = match line.last() {
                Some(b'\n') => &line[..line.len() - 1],
                _ => &line[..],
            };
            if !self.regex.is_match(body) {
                continue;
            }
            self.matched = true;

            if self.options.list_only {
                out.write_all(format!("{}\n", name).as_bytes())?;
                return Ok(());
            }

            let mut buf = Vec::with_capacity(name.len() + body.len() + 16);
            if !self.options.omit_names {
                buf.extend_from_slice(name.as_bytes());
                buf.push(b':');
            }
            if self.options.line_numbers {
                buf.extend_from_slice(lineno.to_string().as_bytes());
                buf.push(b':');
            }
            buf.extend_from_slice(body);
            buf.push(b'\n');
            out.write_all(&buf)?;
        }
    }
}

/// A cloneable writer serializing access to the wrapped writer, so
/// output lines from parallel workers do not interleave.
pub struct SyncWriter<W>(Arc<Mutex<W>>);

impl<W> SyncWriter<W> {
    pub fn new(inner: W) -> SyncWriter<W> {
        SyncWriter(Arc::new(Mutex::new(inner)))
    }

    /// Recover the wrapped writer once every clone is gone.
    pub fn into_inner(self) -> Option<W> {
        Arc::try_unwrap(self.0)
            .ok()
            .map(|m| m.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }
}

impl<W> Clone for SyncWriter<W> {
    fn clone(&self) -> Self {
        SyncWriter(Arc::clone(&self.0))
    }
}

impl<W: Write> Write for SyncWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.0.lock() {
            Ok(mut w) => w.write(buf),
            Err(_) => Err(io::Error::new(io::ErrorKind::Other, "writer poisoned")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.0.lock() {
            Ok(mut w) => w.flush(),
            Err(_) => Err(io::Error::new(io::ErrorKind::Other, "writer poisoned")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn run(pattern: &str, input: &str, options: Options) -> (String, bool) {
        let regex = Regex::new(pattern).unwrap();
        let mut grep = Grep::new(regex, options);
        let mut out = Vec::new();
        grep.reader(Cursor::new(input.as_bytes()), "file.txt", &mut out)
            .unwrap();
        (String::from_utf8(out).unwrap(), grep.matched)
    }

    #[test]
    fn prints_matching_lines_with_name() {
        let (out, matched) = run("hello", "say hello world\ngoodbye\n", Options::default());
        assert_eq!(out, "file.txt:say hello world\n");
        assert!(matched);
    }

    #[test]
    fn no_match_prints_nothing() {
        let (out, matched) = run("absent", "one\ntwo\n", Options::default());
        assert_eq!(out, "");
        assert!(!matched);
    }

    #[test]
    fn line_numbers_are_one_based() {
        let opts = Options {
            line_numbers: true,
            ..Options::default()
        };
        let (out, _) = run("two", "one\ntwo\nthree\ntwo again\n", opts);
        assert_eq!(out, "file.txt:2:two\nfile.txt:4:two again\n");
    }

    #[test]
    fn omit_names() {
        let opts = Options {
            omit_names: true,
            ..Options::default()
        };
        let (out, _) = run("two", "one\ntwo\n", opts);
        assert_eq!(out, "two\n");
    }

    #[test]
    fn list_only_prints_name_once_and_stops() {
        let opts = Options {
            list_only: true,
            ..Options::default()
        };
        let (out, matched) = run("x", "x1\nx2\nx3\n", opts);
        assert_eq!(out, "file.txt\n");
        assert!(matched);
    }

    #[test]
    fn last_line_unterminated() {
        let (out, _) = run("tail", "head\ntail", Options::default());
        assert_eq!(out, "file.txt:tail\n");
    }

    #[test]
    fn multiline_anchors_apply_per_line() {
        let (out, _) = run("(?m)^ba", "foo\nbar\nrebase\n", Options::default());
        assert_eq!(out, "file.txt:bar\n");
    }

    #[test]
    fn case_insensitive_wrap() {
        let (out, _) = run("(?i)(?m)hello", "say HELLO\n", Options::default());
        assert_eq!(out, "file.txt:say HELLO\n");
    }

    #[test]
    fn non_utf8_lines_still_match() {
        let regex = Regex::new("abc").unwrap();
        let mut grep = Grep::new(regex, Options::default());
        let mut out = Vec::new();
        let input: &[u8] = b"\xff\xfe abc \xff\n";
        grep.reader(Cursor::new(input), "bin.dat", &mut out).unwrap();
        assert!(grep.matched);
        assert!(out.starts_with(b"bin.dat:"));
    }

    #[test]
    fn sync_writer_shares_output() {
        let writer = SyncWriter::new(Vec::<u8>::new());
        let mut a = writer.clone();
        let mut b = writer.clone();
        a.write_all(b"one\n").unwrap();
        b.write_all(b"two\n").unwrap();
        drop(a);
        drop(b);
        assert_eq!(writer.into_inner().unwrap(), b"one\ntwo\n");
    }
}
