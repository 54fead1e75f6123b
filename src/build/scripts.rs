// ABOUTME: Prepares shell scripts copied into the image.
// ABOUTME: Converts CRLF line endings to LF and marks the file executable.

use std::path::Path;

/// Normalize `path` in place. Returns whether the file changed.
///
/// A script checked out on Windows fails inside a Linux container with
/// `/bin/sh^M: bad interpreter`, and git does not always keep the mode bit.
pub fn normalize_script(path: &Path) -> std::io::Result<bool> {
    let content = std::fs::read(path)?;
    let mut changed = false;

    if content.windows(2).any(|w| w == b"\r\n") {
        let mut fixed = Vec::with_capacity(content.len());
        let mut bytes = content.iter().peekable();
        while let Some(&b) = bytes.next() {
            if b == b'\r' && bytes.peek() == Some(&&b'\n') {
                continue;
            }
            fixed.push(b);
        }
        std::fs::write(path, fixed)?;
        changed = true;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut permissions = std::fs::metadata(path)?.permissions();
        if permissions.mode() & 0o777 != 0o755 {
            permissions.set_mode(0o755);
            std::fs::set_permissions(path, permissions)?;
            changed = true;
        }
    }

    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_line_endings_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("start.sh");
        std::fs::write(&path, b"#!/bin/sh\r\necho hi\r\n").unwrap();

        assert!(normalize_script(&path).unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"#!/bin/sh\necho hi\n");
        assert!(!normalize_script(&path).unwrap());
    }

    #[test]
    fn lone_carriage_returns_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("start.sh");
        std::fs::write(&path, b"printf 'a\rb'\n").unwrap();

        normalize_script(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"printf 'a\rb'\n");
    }

    #[cfg(unix)]
    #[test]
    fn makes_script_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("start.sh");
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        normalize_script(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(normalize_script(&dir.path().join("absent.sh")).is_err());
    }
}
