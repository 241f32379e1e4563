//! Identify an Ubuntu libc build from its embedded banner.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use glix_schema::VersionId;
use regex::bytes::Regex;

static BANNER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"GNU C Library \(Ubuntu GLIBC ([0-9][0-9A-Za-z.~+-]*)\)")
        .expect("static banner regex is valid")
});

/// Version named by the `GNU C Library (Ubuntu GLIBC <ver>)` banner in a
/// libc binary, if present and well-formed.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or mapped.
pub fn libc_version_of(path: &Path) -> std::io::Result<Option<VersionId>> {
    let file = fs::File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }

    // SAFETY: read-only mapping of a file we only scan; a concurrent
    // truncation would fault, which registered libraries are not subject to.
    #[allow(unsafe_code)]
    let mmap = unsafe { memmap2::Mmap::map(&file)? };

    Ok(BANNER
        .captures_iter(&mmap)
        .filter_map(|c| std::str::from_utf8(&c[1]).ok().map(str::to_owned))
        .find_map(|v| VersionId::parse(&v).ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_banner_found_among_binary_noise() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("libc.so.6");
        let mut bytes = vec![0x7f, b'E', b'L', b'F', 0, 0, 0xff];
        bytes.extend_from_slice(b"GNU C Library (Ubuntu GLIBC 2.35-0ubuntu3.8) stable release");
        bytes.extend_from_slice(&[0, 1, 2]);
        std::fs::write(&path, bytes).unwrap();

        let found = libc_version_of(&path).unwrap().unwrap();
        assert_eq!(found.as_str(), "2.35-0ubuntu3.8");
    }

    #[test]
    fn test_no_banner() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("plain");
        std::fs::write(&plain, b"GNU C Library (GNU libc) stable release").unwrap();
        assert!(libc_version_of(&plain).unwrap().is_none());

        let empty = dir.path().join("empty");
        std::fs::write(&empty, b"").unwrap();
        assert!(libc_version_of(&empty).unwrap().is_none());

        assert!(libc_version_of(&dir.path().join("missing")).is_err());
    }
}
