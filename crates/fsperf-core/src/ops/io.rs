//! Block I/O primitives: one timed call per block.
//!
//! Payload generation and the random offset walk happen before the first
//! timed call so neither shows up in the latencies.

use super::{IoParams, Recorder, Transfer};
use crate::error::{BenchError, Result};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, IntoInnerError, Read, Write};
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::Path;

/// Seed for the bytes written by every writer; content is never checked.
const PAYLOAD_SEED: u64 = 0xF5_BE7C;

pub(super) fn sequential(
    rec: &mut Recorder,
    path: &Path,
    transfer: Transfer,
    buffered: bool,
    io: &IoParams,
) -> Result<()> {
    let name = rec.op().name();
    let fail = |e: io::Error| BenchError::syscall(name, path, e);
    let blocks = io.blocks();
    let mut buf = block_buffer(transfer, io.blksize);

    let file = open(rec, path, transfer, io)?;
    match (transfer, buffered) {
        (Transfer::Write, false) => {
            let mut out = &file;
            for _ in 0..blocks {
                rec.time(|| out.write_all(&buf)).map_err(fail)?;
            }
            close(rec, transfer, io, || Ok(file)).map_err(fail)
        }
        (Transfer::Read, false) => {
            let mut input = &file;
            for _ in 0..blocks {
                rec.time(|| input.read_exact(&mut buf)).map_err(fail)?;
            }
            close(rec, transfer, io, || Ok(file)).map_err(fail)
        }
        (Transfer::Write, true) => {
            let mut out = BufWriter::new(file);
            for _ in 0..blocks {
                rec.time(|| out.write_all(&buf)).map_err(fail)?;
            }
            // The final flush belongs to the close.
            close(rec, transfer, io, || out.into_inner().map_err(IntoInnerError::into_error))
                .map_err(fail)
        }
        (Transfer::Read, true) => {
            let mut input = BufReader::new(file);
            for _ in 0..blocks {
                rec.time(|| input.read_exact(&mut buf)).map_err(fail)?;
            }
            close(rec, transfer, io, || Ok(input.into_inner())).map_err(fail)
        }
    }
}

pub(super) fn random(
    rec: &mut Recorder,
    path: &Path,
    transfer: Transfer,
    io: &IoParams,
    seed: u64,
) -> Result<()> {
    let name = rec.op().name();
    let fail = |e: io::Error| BenchError::syscall(name, path, e);
    let offsets = offset_walk(io, seed);
    let mut buf = block_buffer(transfer, io.blksize);

    let file = open(rec, path, transfer, io)?;
    for &offset in &offsets {
        let done = match transfer {
            Transfer::Write => rec.time(|| file.write_all_at(&buf, offset)),
            Transfer::Read => rec.time(|| file.read_exact_at(&mut buf, offset)),
        };
        done.map_err(fail)?;
    }
    close(rec, transfer, io, || Ok(file)).map_err(fail)
}

/// Every block offset of the file exactly once, in seeded random order.
pub fn offset_walk(io: &IoParams, seed: u64) -> Vec<u64> {
    let mut offsets: Vec<u64> = (0..io.blocks()).map(|b| b * io.blksize).collect();
    offsets.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    offsets
}

fn block_buffer(transfer: Transfer, blksize: u64) -> Vec<u8> {
    let mut buf = vec![0u8; blksize as usize];
    if transfer == Transfer::Write {
        ChaCha8Rng::seed_from_u64(PAYLOAD_SEED).fill_bytes(&mut buf);
    }
    buf
}

fn open(rec: &mut Recorder, path: &Path, transfer: Transfer, io: &IoParams) -> Result<File> {
    let mut options = OpenOptions::new();
    match transfer {
        Transfer::Read => options.read(true),
        Transfer::Write => options.write(true).create(true),
    };
    if io.flags.syncio {
        options.custom_flags(libc::O_SYNC);
    }

    let opened = if io.flags.opentime {
        rec.time_overhead(|| options.open(path))
    } else {
        options.open(path)
    };
    opened.map_err(|e| BenchError::syscall(rec.op().name(), path, e))
}

/// Recover the file (flushing any userspace buffer), optionally fsync it,
/// then close it; timed as overhead when `closetime` is set.
fn close(
    rec: &mut Recorder,
    transfer: Transfer,
    io: &IoParams,
    into_file: impl FnOnce() -> io::Result<File>,
) -> io::Result<()> {
    let sync = transfer == Transfer::Write && io.flags.fsync;
    let finish = move || -> io::Result<()> {
        let file = into_file()?;
        if sync {
            file.sync_all()?;
        }
        drop(file);
        Ok(())
    };

    if io.flags.closetime {
        rec.time_overhead(finish)
    } else {
        finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IoFlags;
    use crate::ops::{OpKind, Primitive, Targets};
    use tempfile::TempDir;

    const MIB: u64 = 1024 * 1024;

    fn params(fsize: u64, blksize: u64, flags: IoFlags) -> IoParams {
        IoParams {
            fsize,
            blksize,
            flags,
        }
    }

    fn seq(kind: OpKind, transfer: Transfer, buffered: bool, io: IoParams) -> Primitive {
        Primitive::Sequential {
            kind,
            transfer,
            buffered,
            io,
        }
    }

    #[test]
    fn test_write_then_read_block_counts() {
        let tmp = TempDir::new().unwrap();
        let files = vec![tmp.path().join("0.dat")];
        let io = params(MIB, 4096, IoFlags::default());

        let write = seq(OpKind::Write, Transfer::Write, false, io)
            .execute(Targets::files(&files))
            .unwrap();
        assert_eq!(write.result.op_count, 256);
        assert!((write.unit_work - 4096.0).abs() < f64::EPSILON);
        assert_eq!(std::fs::metadata(&files[0]).unwrap().len(), MIB);

        let read = seq(OpKind::Read, Transfer::Read, false, io)
            .execute(Targets::files(&files))
            .unwrap();
        assert_eq!(read.result.op_count, 256);
        assert_eq!(read.latencies.len(), 256);
    }

    #[test]
    fn test_buffered_variants() {
        let tmp = TempDir::new().unwrap();
        let files = vec![tmp.path().join("a.dat"), tmp.path().join("b.dat")];
        let io = params(64 * 1024, 1024, IoFlags::default());

        let write = seq(OpKind::FWrite, Transfer::Write, true, io)
            .execute(Targets::files(&files))
            .unwrap();
        assert_eq!(write.result.op_count, 128);
        for f in &files {
            assert_eq!(std::fs::metadata(f).unwrap().len(), 64 * 1024);
        }

        let read = seq(OpKind::FReread, Transfer::Read, true, io)
            .execute(Targets::files(&files))
            .unwrap();
        assert_eq!(read.result.op, OpKind::FReread);
        assert_eq!(read.result.op_count, 128);
    }

    #[test]
    fn test_random_walk_covers_every_block_once() {
        let io = params(MIB, 4096, IoFlags::default());
        let mut walk = offset_walk(&io, 42);
        assert_eq!(walk, offset_walk(&io, 42));
        assert_ne!(walk, offset_walk(&io, 43));

        walk.sort_unstable();
        let expected: Vec<u64> = (0..256).map(|b| b * 4096).collect();
        assert_eq!(walk, expected);
    }

    #[test]
    fn test_random_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let files = vec![tmp.path().join("0.dat")];
        let io = params(256 * 1024, 4096, IoFlags::default());

        let write = Primitive::Random {
            kind: OpKind::RandWrite,
            transfer: Transfer::Write,
            io,
            seed: 1,
        }
        .execute(Targets::files(&files))
        .unwrap();
        assert_eq!(write.result.op_count, 64);
        assert_eq!(std::fs::metadata(&files[0]).unwrap().len(), 256 * 1024);

        let read = Primitive::Random {
            kind: OpKind::RandRead,
            transfer: Transfer::Read,
            io,
            seed: 2,
        }
        .execute(Targets::files(&files))
        .unwrap();
        assert_eq!(read.result.op_count, 64);
    }

    #[test]
    fn test_synchronous_writes() {
        let tmp = TempDir::new().unwrap();
        let files = vec![tmp.path().join("0.dat"), tmp.path().join("1.dat")];
        let flags = IoFlags {
            syncio: true,
            ..IoFlags::default()
        };
        let io = params(64 * 1024, 4096, flags);

        let write = seq(OpKind::Write, Transfer::Write, false, io)
            .execute(Targets::files(&files))
            .unwrap();
        assert_eq!(write.result.op_count, 32);

        let rewrite = Primitive::Random {
            kind: OpKind::RandWrite,
            transfer: Transfer::Write,
            io,
            seed: 3,
        }
        .execute(Targets::files(&files))
        .unwrap();
        assert_eq!(rewrite.result.op_count, 32);

        let read = seq(OpKind::FRead, Transfer::Read, true, io)
            .execute(Targets::files(&files))
            .unwrap();
        assert_eq!(read.result.op_count, 32);
        for f in &files {
            assert_eq!(std::fs::metadata(f).unwrap().len(), 64 * 1024);
        }
    }

    #[test]
    fn test_open_and_close_time_only_in_total() {
        let tmp = TempDir::new().unwrap();
        let files = vec![tmp.path().join("0.dat")];
        let flags = IoFlags {
            syncio: false,
            fsync: true,
            opentime: true,
            closetime: true,
        };
        let io = params(16 * 4096, 4096, flags);

        let write = seq(OpKind::Write, Transfer::Write, false, io)
            .execute(Targets::files(&files))
            .unwrap();
        let sum: f64 = write.latencies.iter().sum();

        assert_eq!(write.result.op_count, 16);
        assert!(write.result.total_elapsed > sum);
    }

    #[test]
    fn test_read_before_write_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let files = vec![tmp.path().join("missing.dat")];
        let io = params(8192, 4096, IoFlags::default());

        let err = seq(OpKind::Read, Transfer::Read, false, io)
            .execute(Targets::files(&files))
            .unwrap_err();
        assert!(matches!(err, BenchError::Syscall { op: "read", .. }));
    }

    #[test]
    fn test_short_file_read_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let files = vec![tmp.path().join("short.dat")];
        std::fs::write(&files[0], [0u8; 100]).unwrap();
        let io = params(8192, 4096, IoFlags::default());

        let err = seq(OpKind::Read, Transfer::Read, false, io)
            .execute(Targets::files(&files))
            .unwrap_err();
        match err {
            BenchError::Syscall { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::UnexpectedEof);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
