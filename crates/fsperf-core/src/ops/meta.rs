//! Metadata primitives: one timed call per target path.

use super::{Primitive, Recorder, Targets, wall_clock};
use crate::error::{BenchError, Result};
use nix::sys::stat::utimes;
use nix::sys::time::TimeVal;
use nix::unistd::{AccessFlags, access};
use std::ffi::OsString;
use std::fs::{self, File, Permissions};
use std::io::{self, ErrorKind};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Suffix a renamed entry carries until it is moved back.
pub const RENAME_SUFFIX: &str = ".to";
/// Suffix that turns a workload path into a path that never exists.
pub const MISSING_SUFFIX: &str = ".nonexist";

const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

pub(super) fn run(prim: &Primitive, rec: &mut Recorder, targets: Targets<'_>) -> Result<()> {
    let name = prim.kind().name();
    let fail = |path: &PathBuf, err: io::Error| BenchError::syscall(name, path, err);

    match prim {
        Primitive::Mkdir => {
            for path in targets.paths {
                rec.time(|| fs::create_dir(path)).map_err(|e| fail(path, e))?;
            }
        }
        Primitive::Rmdir => {
            // Children follow their parents in creation order.
            for path in targets.paths.iter().rev() {
                rec.time(|| fs::remove_dir(path)).map_err(|e| fail(path, e))?;
            }
        }
        Primitive::Creat => {
            for path in targets.paths {
                let file = rec.time(|| File::create(path)).map_err(|e| fail(path, e))?;
                drop(file);
            }
        }
        Primitive::Open { timed_close: true } => {
            for path in targets.paths {
                rec.time(|| File::open(path).map(drop))
                    .map_err(|e| fail(path, e))?;
            }
        }
        Primitive::Open { timed_close: false } => {
            for path in targets.paths {
                let file = rec.time(|| File::open(path)).map_err(|e| fail(path, e))?;
                drop(file);
            }
        }
        Primitive::Access => {
            for path in targets.paths {
                rec.time(|| access(path.as_path(), AccessFlags::F_OK).map_err(io::Error::from))
                    .map_err(|e| fail(path, e))?;
            }
        }
        Primitive::Stat => {
            for path in targets.paths {
                let meta = rec.time(|| fs::metadata(path)).map_err(|e| fail(path, e))?;
                std::hint::black_box(meta);
            }
        }
        Primitive::StatMissing => {
            let missing: Vec<PathBuf> = targets
                .paths
                .iter()
                .map(|p| with_suffix(p, MISSING_SUFFIX))
                .collect();
            for path in &missing {
                rec.time(|| stat_expecting_miss(path))
                    .map_err(|e| fail(path, e))?;
            }
        }
        Primitive::Utime => {
            for path in targets.paths {
                let now = now_timeval();
                rec.time(|| utimes(path.as_path(), &now, &now).map_err(io::Error::from))
                    .map_err(|e| fail(path, e))?;
            }
        }
        Primitive::Chmod => {
            let mode = if targets.dirs { DIR_MODE } else { FILE_MODE };
            for path in targets.paths {
                let perms = Permissions::from_mode(mode);
                rec.time(|| fs::set_permissions(path, perms))
                    .map_err(|e| fail(path, e))?;
            }
        }
        Primitive::Rename => {
            for path in targets.paths {
                let renamed = with_suffix(path, RENAME_SUFFIX);
                rec.time(|| fs::rename(path, &renamed))
                    .map_err(|e| fail(path, e))?;
                // Restore outside the timed window.
                fs::rename(&renamed, path).map_err(|e| fail(&renamed, e))?;
            }
        }
        Primitive::Unlink => {
            for path in targets.paths {
                rec.time(|| fs::remove_file(path)).map_err(|e| fail(path, e))?;
            }
        }
        Primitive::Sequential { kind, .. } | Primitive::Random { kind, .. } => {
            return Err(BenchError::invalid(format!("{kind} is not a metadata operation")));
        }
    }

    Ok(())
}

/// Negative lookup: "not found" is the expected outcome, not a failure.
fn stat_expecting_miss(path: &Path) -> io::Result<()> {
    match fs::metadata(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn now_timeval() -> TimeVal {
    let now = wall_clock();
    let secs = now.trunc();
    TimeVal::new(secs as libc::time_t, ((now - secs) * 1e6) as libc::suseconds_t)
}

pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
