//! Resource resolver (SPEC_FULL §4.4).
//!
//! Grounded on `aws.c::connection_get_resource_type` /
//! `connection_open_file`: classification is a substring match (static
//! prefix checked before dynamic), the resolved filename is rooted at the
//! server's working directory via a literal `./` prefix, and open/stat
//! failure is reported as a single opaque "not found" — the spec
//! deliberately does not distinguish ENOENT from EACCES.

use std::fs::File;
use std::os::unix::io::{IntoRawFd, RawFd};
use std::path::Path;

use crate::conn::ResourceKind;

pub struct OpenedResource {
    pub kind: ResourceKind,
    pub filename: String,
    pub file_fd: RawFd,
    pub file_size: u64,
    pub last_modified: std::time::SystemTime,
}

/// Classify `request_path` against the configured prefixes. Static is
/// checked before dynamic, matching the reference implementation's
/// check order.
pub fn classify(request_path: &str, static_prefix: &str, dynamic_prefix: &str) -> ResourceKind {
    if request_path.contains(static_prefix) {
        ResourceKind::Static
    } else if request_path.contains(dynamic_prefix) {
        ResourceKind::Dynamic
    } else {
        ResourceKind::None
    }
}

/// Open and stat the resource named by `request_path`, already known to be
/// `Static` or `Dynamic`. `root` is the directory the `./<path>` resolution
/// is rooted at — `.` (the process's working directory) in production;
/// tests pass a `tempdir` so the check doesn't mutate global process state.
/// Any failure (missing file, permission denied, stat failure) is folded
/// into `None` — the caller transitions to `Sending404` (§4.8) without
/// distinguishing the cause.
pub fn open_resource(
    request_path: &str,
    kind: ResourceKind,
    root: &Path,
) -> Option<OpenedResource> {
    debug_assert!(matches!(kind, ResourceKind::Static | ResourceKind::Dynamic));

    let filename = format!(".{}", request_path);
    let file = File::open(root.join(request_path.trim_start_matches('/'))).ok()?;
    let metadata = file.metadata().ok()?;
    if !metadata.is_file() {
        return None;
    }
    let last_modified = metadata.modified().ok()?;
    let file_size = metadata.len();
    let file_fd = file.into_raw_fd();

    Some(OpenedResource {
        kind,
        filename,
        file_fd,
        file_size,
        last_modified,
    })
}
