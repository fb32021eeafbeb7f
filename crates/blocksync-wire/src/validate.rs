//! Wire-level validation of filenames and file metadata.
//!
//! Every inbound index batch and block request passes through these checks
//! before any side effect on the model is allowed. A failure here is grounds
//! for disconnecting the peer.

use thiserror::Error;

use crate::message::{FileInfo, FileType};

/// Invariant violations in peer-supplied names and file records.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("filename is invalid")]
    InvalidFilename,
    #[error("filename not in canonical format")]
    UncleanFilename,
    #[error("deleted file with non-empty block list")]
    DeletedHasBlocks,
    #[error("directory with non-empty block list")]
    DirectoryHasBlocks,
    #[error("file with empty block list")]
    FileHasNoBlocks,
}

/// Lexically canonicalize a slash-separated path.
///
/// Collapses duplicate separators, eliminates `.` segments, resolves `..`
/// against preceding segments (keeping leading `..` in relative paths), and
/// drops any trailing separator. The empty path canonicalizes to `.`.
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                match segments.last() {
                    Some(&"..") | None => {
                        if !rooted {
                            segments.push("..");
                        }
                    }
                    Some(_) => {
                        segments.pop();
                    }
                }
            }
            _ => segments.push(segment),
        }
    }
    let joined = segments.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Verify that a filename is valid according to what is allowed over the
/// wire. Names are folder relative, in canonical form, and may not escape
/// the folder root.
pub fn check_filename(name: &str) -> Result<(), ValidationError> {
    if clean_path(name) != name {
        // The name on the wire must already be canonical. If cleaning
        // changed it, something was wrong with it.
        return Err(ValidationError::UncleanFilename);
    }

    match name {
        "" | "." | ".." => return Err(ValidationError::InvalidFilename),
        _ => {}
    }
    if name.starts_with('/') {
        return Err(ValidationError::InvalidFilename);
    }
    if name.starts_with("../") {
        // Any interior dotdot would have failed the canonical check above.
        return Err(ValidationError::InvalidFilename);
    }
    Ok(())
}

/// Verify the invariants on a single FileInfo received in an index batch.
pub fn check_file_info_consistency(f: &FileInfo) -> Result<(), ValidationError> {
    check_filename(&f.name)?;

    if f.deleted && !f.blocks.is_empty() {
        return Err(ValidationError::DeletedHasBlocks);
    }
    if f.file_type == FileType::Directory && !f.blocks.is_empty() {
        return Err(ValidationError::DirectoryHasBlocks);
    }
    if !f.deleted && !f.is_invalid() && f.file_type == FileType::File && f.blocks.is_empty() {
        return Err(ValidationError::FileHasNoBlocks);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{BlockInfo, Vector};

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path(""), ".");
        assert_eq!(clean_path("a/b"), "a/b");
        assert_eq!(clean_path("a//b"), "a/b");
        assert_eq!(clean_path("a/./b"), "a/b");
        assert_eq!(clean_path("a/b/"), "a/b");
        assert_eq!(clean_path("a/../b"), "b");
        assert_eq!(clean_path("a/../.."), "..");
        assert_eq!(clean_path("../x"), "../x");
        assert_eq!(clean_path("/.."), "/");
        assert_eq!(clean_path("/a/b"), "/a/b");
    }

    #[test]
    fn test_check_filename_rejects() {
        for name in ["", ".", "..", "/a", "../x", "a//b", "a/./b", "a/b/"] {
            assert!(check_filename(name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn test_check_filename_accepts() {
        for name in ["a", "a/b", "a/b/c.txt"] {
            assert!(check_filename(name).is_ok(), "{name:?} should be accepted");
        }
    }

    fn file(name: &str) -> FileInfo {
        FileInfo {
            name: name.to_string(),
            file_type: FileType::File,
            size: 1024,
            permissions: 0o644,
            modified: 0,
            deleted: false,
            invalid: false,
            no_permissions: false,
            version: Vector::default(),
            sequence: 1,
            blocks: vec![BlockInfo {
                offset: 0,
                size: 1024,
                hash: vec![0; 32],
                weak_hash: 0,
            }],
            symlink_target: String::new(),
            local_flags: 0,
        }
    }

    #[test]
    fn test_deleted_file_must_have_no_blocks() {
        let mut f = file("a");
        f.deleted = true;
        assert_eq!(
            check_file_info_consistency(&f),
            Err(ValidationError::DeletedHasBlocks)
        );
        f.blocks.clear();
        assert!(check_file_info_consistency(&f).is_ok());
    }

    #[test]
    fn test_directory_must_have_no_blocks() {
        let mut f = file("d");
        f.file_type = FileType::Directory;
        assert_eq!(
            check_file_info_consistency(&f),
            Err(ValidationError::DirectoryHasBlocks)
        );
        f.blocks.clear();
        assert!(check_file_info_consistency(&f).is_ok());
    }

    #[test]
    fn test_live_file_must_have_blocks() {
        let mut f = file("a");
        f.blocks.clear();
        assert_eq!(
            check_file_info_consistency(&f),
            Err(ValidationError::FileHasNoBlocks)
        );
    }

    #[test]
    fn test_invalid_file_may_have_no_blocks() {
        let mut f = file("a");
        f.blocks.clear();
        f.invalid = true;
        assert!(check_file_info_consistency(&f).is_ok());
    }

    #[test]
    fn test_local_flags_count_as_invalid() {
        let mut f = file("a");
        f.blocks.clear();
        f.local_flags = crate::message::LOCAL_IGNORED;
        assert!(check_file_info_consistency(&f).is_ok());
    }

    #[test]
    fn test_bad_name_rejected_before_block_checks() {
        let mut f = file("../escape");
        f.deleted = true;
        assert_eq!(
            check_file_info_consistency(&f),
            Err(ValidationError::InvalidFilename)
        );
    }
}
