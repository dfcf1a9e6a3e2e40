//! Default names for the far side of a transfer.

use std::path::{Path, PathBuf};

use crate::TransferError;

/// Last component of a remote path, ignoring trailing slashes.
///
/// Returns `None` for paths with no usable name (`""`, `/`, `.`, `..`).
pub fn remote_base_name(remote: &str) -> Option<&str> {
    let name = remote.trim_end_matches('/').rsplit('/').next()?;
    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}

/// Directory holding a remote path: `"."` for a bare name and `"/"` for a
/// top-level absolute path.
pub fn remote_parent(remote: &str) -> &str {
    let trimmed = remote.trim_end_matches('/');
    match trimmed.rfind('/') {
        None => ".",
        Some(0) => "/",
        Some(idx) => &trimmed[..idx],
    }
}

/// Remote destination for an upload: the given path, or the local file's
/// name when the path is omitted or `"."`.
pub fn upload_target(local: &Path, remote: Option<&str>) -> Result<String, TransferError> {
    match remote {
        Some(path) if !path.is_empty() && path != "." => Ok(path.to_string()),
        _ => local
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                TransferError::InvalidPath(format!("no file name in {}", local.display()))
            }),
    }
}

/// Local destination for a download: the given path, or the remote base
/// name in the working directory.
pub fn download_target(remote: &str, local: Option<&Path>) -> Result<PathBuf, TransferError> {
    if let Some(path) = local {
        return Ok(path.to_path_buf());
    }
    remote_base_name(remote)
        .map(PathBuf::from)
        .ok_or_else(|| TransferError::InvalidPath(format!("no file name in {remote}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_of_remote_paths() {
        assert_eq!(remote_base_name("/user/james/reads.fq"), Some("reads.fq"));
        assert_eq!(remote_base_name("reads.fq"), Some("reads.fq"));
        assert_eq!(remote_base_name("runs/42/"), Some("42"));
        assert_eq!(remote_base_name("/"), None);
        assert_eq!(remote_base_name(""), None);
        assert_eq!(remote_base_name("a/.."), None);
    }

    #[test]
    fn parent_of_remote_paths() {
        assert_eq!(remote_parent("reads.fq"), ".");
        assert_eq!(remote_parent("runs/42/"), "runs");
        assert_eq!(remote_parent("/user/james/reads.fq"), "/user/james");
        assert_eq!(remote_parent("/top"), "/");
    }

    #[test]
    fn upload_defaults_to_local_name() {
        let local = Path::new("/tmp/data/sample.bam");
        assert_eq!(upload_target(local, None).unwrap(), "sample.bam");
        assert_eq!(upload_target(local, Some(".")).unwrap(), "sample.bam");
        assert_eq!(upload_target(local, Some("in/x.bam")).unwrap(), "in/x.bam");
    }

    #[test]
    fn upload_without_file_name_is_rejected() {
        let err = upload_target(Path::new("/"), None).unwrap_err();
        assert!(matches!(err, TransferError::InvalidPath(_)));
    }

    #[test]
    fn download_defaults_to_remote_name() {
        assert_eq!(
            download_target("/user/james/out.sam", None).unwrap(),
            PathBuf::from("out.sam")
        );
        assert_eq!(
            download_target("out.sam", Some(Path::new("/tmp/copy.sam"))).unwrap(),
            PathBuf::from("/tmp/copy.sam")
        );
        assert!(download_target("/", None).is_err());
    }
}
