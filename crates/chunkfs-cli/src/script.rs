// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Line-oriented scripts of filesystem operations

use anyhow::{anyhow, bail, Context, Result};
use chunkfs_core::{Attributes, FsCore, FsError, NodeKind};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, warn};

/// One parsed script line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Create { path: PathBuf, mode: u32 },
    Open { path: PathBuf },
    Mkdir { path: PathBuf, mode: u32 },
    Rmdir { path: PathBuf },
    Unlink { path: PathBuf },
    Rename { old: PathBuf, new: PathBuf },
    Write { path: PathBuf, text: String },
    Read { path: PathBuf },
    Truncate { path: PathBuf, length: u64 },
    Symlink { target: PathBuf, source: String },
    Readlink { path: PathBuf },
    Chmod { path: PathBuf, mode: u32 },
    Chown { path: PathBuf, uid: u32, gid: u32 },
    Utimens { path: PathBuf, times: Option<(i64, i64)> },
    Getattr { path: PathBuf },
    Setxattr { path: PathBuf, name: String, value: String },
    Getxattr { path: PathBuf, name: String },
    Listxattr { path: PathBuf },
    Removexattr { path: PathBuf, name: String },
    Readdir { path: PathBuf },
    Statfs { path: PathBuf },
    Chunks { path: PathBuf },
}

/// Take `n` whitespace-separated words off the front of `s` and return them
/// with the untouched remainder.
fn take_words(s: &str, n: usize) -> (Vec<&str>, &str) {
    let mut words = Vec::with_capacity(n);
    let mut rest = s.trim_start();
    while words.len() < n && !rest.is_empty() {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        words.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    (words, rest)
}

fn parse_mode(s: &str) -> Result<u32> {
    u32::from_str_radix(s, 8).map_err(|_| anyhow!("invalid octal mode '{}'", s))
}

fn parse_num<T: std::str::FromStr>(s: &str, what: &str) -> Result<T> {
    s.parse().map_err(|_| anyhow!("invalid {} '{}'", what, s))
}

fn expect_args<'a>(verb: &str, args: &'a str, n: usize) -> Result<Vec<&'a str>> {
    let (words, rest) = take_words(args, n);
    if words.len() != n || !rest.is_empty() {
        bail!("'{}' expects {} argument(s)", verb, n);
    }
    Ok(words)
}

/// Parse a single line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Op>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (verb, args) = take_words(line, 1);
    let verb = verb[0];

    let op = match verb {
        "create" | "mkdir" | "chmod" => {
            let a = expect_args(verb, args, 2)?;
            let path = PathBuf::from(a[0]);
            let mode = parse_mode(a[1])?;
            match verb {
                "create" => Op::Create { path, mode },
                "mkdir" => Op::Mkdir { path, mode },
                _ => Op::Chmod { path, mode },
            }
        }
        "open" | "rmdir" | "unlink" | "read" | "readlink" | "getattr" | "listxattr"
        | "chunks" => {
            let path = PathBuf::from(expect_args(verb, args, 1)?[0]);
            match verb {
                "open" => Op::Open { path },
                "rmdir" => Op::Rmdir { path },
                "unlink" => Op::Unlink { path },
                "read" => Op::Read { path },
                "readlink" => Op::Readlink { path },
                "getattr" => Op::Getattr { path },
                "listxattr" => Op::Listxattr { path },
                _ => Op::Chunks { path },
            }
        }
        "readdir" | "statfs" => {
            let (words, rest) = take_words(args, 1);
            if !rest.is_empty() {
                bail!("'{}' expects at most 1 argument", verb);
            }
            let path = PathBuf::from(words.first().copied().unwrap_or("/"));
            if verb == "readdir" {
                Op::Readdir { path }
            } else {
                Op::Statfs { path }
            }
        }
        "rename" => {
            let a = expect_args(verb, args, 2)?;
            Op::Rename {
                old: a[0].into(),
                new: a[1].into(),
            }
        }
        "write" => {
            let (words, text) = take_words(args, 1);
            if words.is_empty() {
                bail!("'write' expects a path");
            }
            Op::Write {
                path: words[0].into(),
                text: text.to_string(),
            }
        }
        "truncate" => {
            let a = expect_args(verb, args, 2)?;
            Op::Truncate {
                path: a[0].into(),
                length: parse_num(a[1], "length")?,
            }
        }
        "symlink" => {
            let (words, source) = take_words(args, 1);
            if words.is_empty() || source.is_empty() {
                bail!("'symlink' expects a target and a source");
            }
            Op::Symlink {
                target: words[0].into(),
                source: source.to_string(),
            }
        }
        "chown" => {
            let a = expect_args(verb, args, 3)?;
            Op::Chown {
                path: a[0].into(),
                uid: parse_num(a[1], "uid")?,
                gid: parse_num(a[2], "gid")?,
            }
        }
        "utimens" => {
            let (words, rest) = take_words(args, 3);
            if !rest.is_empty() {
                bail!("'utimens' expects PATH [ATIME MTIME]");
            }
            let times = match words.len() {
                1 => None,
                3 => Some((parse_num(words[1], "atime")?, parse_num(words[2], "mtime")?)),
                _ => bail!("'utimens' expects PATH [ATIME MTIME]"),
            };
            Op::Utimens {
                path: words[0].into(),
                times,
            }
        }
        "setxattr" => {
            let (words, value) = take_words(args, 2);
            if words.len() != 2 {
                bail!("'setxattr' expects PATH NAME VALUE");
            }
            Op::Setxattr {
                path: words[0].into(),
                name: words[1].to_string(),
                value: value.to_string(),
            }
        }
        "getxattr" | "removexattr" => {
            let a = expect_args(verb, args, 2)?;
            let path = PathBuf::from(a[0]);
            let name = a[1].to_string();
            if verb == "getxattr" {
                Op::Getxattr { path, name }
            } else {
                Op::Removexattr { path, name }
            }
        }
        other => bail!("unknown command '{}'", other),
    };
    Ok(Some(op))
}

/// Parse a whole script, keeping 1-based line numbers
pub fn parse_script(source: &str) -> Result<Vec<(usize, Op)>> {
    let mut ops = Vec::new();
    for (idx, line) in source.lines().enumerate() {
        let lineno = idx + 1;
        if let Some(op) = parse_line(line).with_context(|| format!("line {}", lineno))? {
            ops.push((lineno, op));
        }
    }
    Ok(ops)
}

fn kind_name(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Directory => "dir",
        NodeKind::RegularFile => "file",
        NodeKind::Symlink => "symlink",
    }
}

fn format_attrs(attrs: &Attributes) -> String {
    format!(
        "kind={} mode={:o} nlink={} size={} uid={} gid={} atime={} mtime={} ctime={}",
        kind_name(attrs.kind),
        attrs.mode,
        attrs.nlink,
        attrs.size,
        attrs.uid,
        attrs.gid,
        attrs.times.atime,
        attrs.times.mtime,
        attrs.times.ctime
    )
}

fn lossy_chunks(chunks: &[Vec<u8>]) -> Vec<String> {
    chunks.iter().map(|c| String::from_utf8_lossy(c).into_owned()).collect()
}

/// Executes parsed operations against one engine, writing results to `out`
pub struct ScriptRunner<'a, W: Write> {
    fs: &'a FsCore,
    out: W,
    keep_going: bool,
}

impl<'a, W: Write> ScriptRunner<'a, W> {
    pub fn new(fs: &'a FsCore, out: W, keep_going: bool) -> Self {
        Self {
            fs,
            out,
            keep_going,
        }
    }

    /// Run every operation in order. Returns the number of engine errors
    /// reported while `keep_going` is set.
    pub fn run(&mut self, ops: &[(usize, Op)]) -> Result<usize> {
        let mut failures = 0;
        for (lineno, op) in ops {
            debug!(line = lineno, ?op, "executing");
            match self.execute(op) {
                Ok(()) => {}
                Err(ExecError::Fs(e)) if self.keep_going => {
                    warn!(line = lineno, error = %e, "operation failed");
                    writeln!(self.out, "error: {} (errno={})", e, e.errno())?;
                    failures += 1;
                }
                Err(ExecError::Fs(e)) => {
                    return Err(anyhow!("line {}: {} (errno={})", lineno, e, e.errno()));
                }
                Err(ExecError::Io(e)) => return Err(e.into()),
            }
        }
        self.out.flush()?;
        Ok(failures)
    }

    fn execute(&mut self, op: &Op) -> Result<(), ExecError> {
        let fs = self.fs;
        match op {
            Op::Create { path, mode } => {
                let fh = fs.create(path, *mode)?;
                writeln!(self.out, "handle {}", fh)?;
            }
            Op::Open { path } => {
                let fh = fs.open(path, libc::O_RDWR)?;
                writeln!(self.out, "handle {}", fh)?;
            }
            Op::Mkdir { path, mode } => self.ok(fs.mkdir(path, *mode))?,
            Op::Rmdir { path } => self.ok(fs.rmdir(path))?,
            Op::Unlink { path } => self.ok(fs.unlink(path))?,
            Op::Rename { old, new } => self.ok(fs.rename(old, new))?,
            Op::Write { path, text } => {
                let n = fs.write(path, text.as_bytes(), 0)?;
                writeln!(self.out, "wrote {}", n)?;
            }
            Op::Read { path } => {
                let content = fs.read(path, 0, 0)?;
                writeln!(self.out, "{}", String::from_utf8_lossy(&content))?;
            }
            Op::Truncate { path, length } => self.ok(fs.truncate(path, *length))?,
            Op::Symlink { target, source } => self.ok(fs.symlink(target, source))?,
            Op::Readlink { path } => {
                let chunks = fs.readlink(path)?;
                writeln!(self.out, "{}", to_json(&lossy_chunks(&chunks)))?;
            }
            Op::Chmod { path, mode } => self.ok(fs.chmod(path, *mode))?,
            Op::Chown { path, uid, gid } => self.ok(fs.chown(path, *uid, *gid))?,
            Op::Utimens { path, times } => self.ok(fs.utimens(path, *times))?,
            Op::Getattr { path } => {
                let attrs = fs.getattr(path)?;
                writeln!(self.out, "{}", format_attrs(&attrs))?;
            }
            Op::Setxattr { path, name, value } => {
                self.ok(fs.setxattr(path, name, value.as_bytes()))?
            }
            Op::Getxattr { path, name } => {
                let value = fs.getxattr(path, name)?;
                writeln!(self.out, "{}", String::from_utf8_lossy(&value))?;
            }
            Op::Listxattr { path } => {
                for name in fs.listxattr(path)? {
                    writeln!(self.out, "{}", name)?;
                }
            }
            Op::Removexattr { path, name } => self.ok(fs.removexattr(path, name))?,
            Op::Readdir { path } => {
                for entry in fs.readdir(path)? {
                    writeln!(self.out, "{}", entry)?;
                }
            }
            Op::Statfs { path } => {
                let st = fs.statfs(path)?;
                writeln!(
                    self.out,
                    "bsize={} blocks={} bavail={}",
                    st.f_bsize, st.f_blocks, st.f_bavail
                )?;
            }
            Op::Chunks { path } => {
                let chunks = fs.chunks(path)?;
                writeln!(self.out, "{}", to_json(&lossy_chunks(&chunks)))?;
            }
        }
        Ok(())
    }

    fn ok(&mut self, result: Result<(), FsError>) -> Result<(), ExecError> {
        result?;
        writeln!(self.out, "ok")?;
        Ok(())
    }
}

fn to_json(chunks: &[String]) -> String {
    serde_json::Value::from(chunks.to_vec()).to_string()
}

#[derive(Debug, thiserror::Error)]
enum ExecError {
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkfs_core::FsConfig;

    fn run_script(source: &str, keep_going: bool) -> (Result<usize>, String) {
        let fs = FsCore::new(FsConfig::default()).unwrap();
        let mut out = Vec::new();
        let result = parse_script(source)
            .and_then(|ops| ScriptRunner::new(&fs, &mut out, keep_going).run(&ops));
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let ops = parse_script("# setup\n\n  create /f 644\n").unwrap();
        assert_eq!(
            ops,
            vec![(
                3,
                Op::Create {
                    path: "/f".into(),
                    mode: 0o644
                }
            )]
        );
    }

    #[test]
    fn test_parse_write_keeps_inner_spacing() {
        let op = parse_line("write /f hello  world").unwrap().unwrap();
        assert_eq!(
            op,
            Op::Write {
                path: "/f".into(),
                text: "hello  world".into()
            }
        );
    }

    #[test]
    fn test_parse_optional_arguments() {
        assert_eq!(
            parse_line("readdir").unwrap(),
            Some(Op::Readdir { path: "/".into() })
        );
        assert_eq!(
            parse_line("utimens /f").unwrap(),
            Some(Op::Utimens {
                path: "/f".into(),
                times: None
            })
        );
        assert_eq!(
            parse_line("utimens /f 10 20").unwrap(),
            Some(Op::Utimens {
                path: "/f".into(),
                times: Some((10, 20))
            })
        );
        assert!(parse_line("utimens /f 10").is_err());
    }

    #[test]
    fn test_parse_errors_report_line_number() {
        let err = parse_script("create /f 644\nfrobnicate /f\n").unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("line 2"), "{}", msg);
        assert!(msg.contains("frobnicate"), "{}", msg);

        let err = parse_script("mkdir /d 9z9").unwrap_err();
        assert!(format!("{:#}", err).contains("octal"));
    }

    #[test]
    fn test_hello_world_script() {
        let (result, out) = run_script(
            "create /file 644\nwrite /file hello world\nchunks /file\nwrite /file !\nchunks /file\ntruncate /file 5\nchunks /file\nread /file\n",
            false,
        );
        assert_eq!(result.unwrap(), 0);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "handle 1",
                "wrote 11",
                r#"["hello wo","rld"]"#,
                "wrote 1",
                r#"["hello wo","rld!"]"#,
                "ok",
                r#"["hello"]"#,
                "hello",
            ]
        );
    }

    #[test]
    fn test_engine_error_aborts_without_keep_going() {
        let (result, out) = run_script("read /missing\ncreate /f 644\n", false);
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("line 1"));
        assert!(msg.contains(&format!("errno={}", FsError::NotFound.errno())));
        assert!(out.is_empty());
    }

    #[test]
    fn test_keep_going_reports_and_continues() {
        let (result, out) = run_script("mkdir /d 755\nread /d\nreaddir\n", true);
        assert_eq!(result.unwrap(), 1);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "ok");
        assert_eq!(
            lines[1],
            format!("error: is a directory (errno={})", FsError::IsADirectory.errno())
        );
        assert_eq!(&lines[2..], [".", "..", "d"]);
    }

    #[test]
    fn test_symlink_and_xattrs() {
        let (result, out) = run_script(
            "symlink /link target-file-name\nreadlink /link\nsetxattr /link user.tag a b\ngetxattr /link user.tag\nlistxattr /link\nstatfs\n",
            false,
        );
        assert_eq!(result.unwrap(), 0);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "ok");
        assert_eq!(lines[1], r#"["target-f","ile-name"]"#);
        assert_eq!(lines[2], "ok");
        assert_eq!(lines[3], "a b");
        assert_eq!(lines[4], "user.tag");
        assert_eq!(lines[5], "bsize=512 blocks=4096 bavail=2048");
    }

    #[test]
    fn test_getattr_output() {
        let (result, out) = run_script(
            "create /f 640\nchown /f 7 8\nutimens /f 100 200\ngetattr /f\n",
            false,
        );
        assert_eq!(result.unwrap(), 0);
        let last = out.lines().last().unwrap();
        assert!(last.starts_with("kind=file mode=100640 nlink=1 size=0 uid=7 gid=8 atime=100 mtime=200"));
    }
}
