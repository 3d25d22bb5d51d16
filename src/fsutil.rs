//! File system related utilities.
//!
//! Configuration files hold private keys, so they are only ever replaced atomically (write a
//! temporary sibling, sync, rename) and on Unix they are created readable by the owner only.

use crate::always::CONFIG_EXTENSION;
use crate::tag::Protocol;
use std::fs::File;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Build the configuration filename in `dir` for protocol version `protocol`.
///
/// # Example
///
/// ```
/// use zf_notary::fsutil::config_filename;
/// use zf_notary::Protocol;
/// use std::path::PathBuf;
/// let dir = PathBuf::from("/tmp");
/// assert_eq!(
///     config_filename(&dir, Protocol::new(1).unwrap()),
///     PathBuf::from("/tmp/v1.config")
/// );
/// ```
pub fn config_filename(dir: &Path, protocol: Protocol) -> PathBuf {
    let mut filename = dir.join(format!("{protocol}"));
    filename.set_extension(CONFIG_EXTENSION);
    filename
}

/// Temporary sibling of `path` used while replacing it.
pub fn temp_filename(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn create_private(path: &Path) -> io::Result<File> {
    let mut options = File::options();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

/// Atomically replace the contents of `path` with `buf`.
///
/// On failure the previous contents of `path` (if any) are left in place and the temporary
/// file is removed.
pub fn replace_file(path: &Path, buf: &[u8]) -> io::Result<()> {
    let tmp = temp_filename(path);
    let result = create_private(&tmp)
        .and_then(|mut file| {
            file.write_all(buf)?;
            file.sync_all()
        })
        .and_then(|()| std::fs::rename(&tmp, path));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// Remove `path`, treating a missing file as success.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
