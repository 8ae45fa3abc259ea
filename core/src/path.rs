//! C1: the path resolver. Pure, deterministic mapping from validated
//! identifiers to an absolute destination path. The one impure step —
//! following `realpath` to confirm a resolved path has not walked out of
//! its project root via a symlink — is kept here too, at the edge of an
//! otherwise side-effect-free module, since every caller needs it applied
//! consistently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::ErrorKind;
use crate::ids::{FormId, GroupName, KeyId, Pnum};
use crate::util::sanitize_filename;

/// Joins `uploads_root[pnum]` with the (possibly defaulted) group and a
/// sanitized filename.
pub fn resolve_upload(
    uploads_root: &HashMap<String, PathBuf>,
    pnum: &Pnum,
    group: Option<&GroupName>,
    filename: &str,
) -> Result<PathBuf, ErrorKind> {
    let root = uploads_root
        .get(pnum.as_str())
        .ok_or_else(|| ErrorKind::InvalidPath(format!("project not configured: {pnum}")))?;

    let default_group = pnum.default_group();
    let group = group.unwrap_or(&default_group);
    if !group.belongs_to(pnum) {
        return Err(ErrorKind::NotAMember);
    }

    let name = sanitize_filename(filename).ok_or(ErrorKind::MissingFilename)?;

    let dest = root.join(group.as_str()).join(&name);
    contain_within(root, &dest)
}

/// Joins `uploads_root[pnum]` directly with a sanitized filename, with no
/// group subdirectory. Form-data uploads land flat under the project's
/// upload root rather than under a group, unlike the streaming path.
pub fn resolve_form_upload(
    uploads_root: &HashMap<String, PathBuf>,
    pnum: &Pnum,
    filename: &str,
) -> Result<PathBuf, ErrorKind> {
    let root = uploads_root
        .get(pnum.as_str())
        .ok_or_else(|| ErrorKind::InvalidPath(format!("project not configured: {pnum}")))?;

    let name = sanitize_filename(filename).ok_or(ErrorKind::MissingFilename)?;
    let dest = root.join(&name);
    contain_within(root, &dest)
}

/// Joins `sns_uploads_root` with
/// `pnum/nettskjema-submissions/<key_id>/<form_id>/<filename>`. The
/// `<form_id>` segment names a directory, not the file itself — the
/// client-supplied filename is the final path component underneath it.
pub fn resolve_sns(
    sns_uploads_root: &Path,
    uploads_root: &HashMap<String, PathBuf>,
    pnum: &Pnum,
    key_id: &KeyId,
    form_id: &FormId,
    filename: &str,
) -> Result<PathBuf, ErrorKind> {
    if !uploads_root.contains_key(pnum.as_str()) {
        return Err(ErrorKind::InvalidSnsParam(format!("project not configured: {pnum}")));
    }
    let name = sanitize_filename(filename).ok_or(ErrorKind::MissingFilename)?;
    let dest = sns_uploads_root
        .join(pnum.as_str())
        .join("nettskjema-submissions")
        .join(key_id.as_str())
        .join(form_id.as_str())
        .join(&name);
    contain_within(sns_uploads_root, &dest)
}

/// The `.tsd` shadow path for an SNS destination, used for internal
/// auditing: the `<key_id>` path segment is replaced by `.tsd/<key_id>`,
/// it does not sit alongside the real destination as a sibling.
pub fn resolve_sns_shadow(
    sns_uploads_root: &Path,
    pnum: &Pnum,
    key_id: &KeyId,
    form_id: &FormId,
    filename: &str,
) -> PathBuf {
    sns_uploads_root
        .join(pnum.as_str())
        .join("nettskjema-submissions")
        .join(".tsd")
        .join(key_id.as_str())
        .join(form_id.as_str())
        .join(filename)
}

/// Resolves into the export root. `filename = None` means "list the
/// directory"; the caller is responsible for treating a `None` result as
/// a listing request rather than a download.
pub fn resolve_export(
    export_root: &HashMap<String, PathBuf>,
    pnum: &Pnum,
    filename: Option<&str>,
) -> Result<PathBuf, ErrorKind> {
    let root = export_root
        .get(pnum.as_str())
        .ok_or_else(|| ErrorKind::Forbidden)?;

    let Some(filename) = filename else {
        return Ok(root.clone());
    };

    if filename.contains("..") || Path::new(filename).is_absolute() {
        return Err(ErrorKind::Forbidden);
    }
    let name = sanitize_filename(filename).ok_or(ErrorKind::Forbidden)?;
    let dest = root.join(name);
    contain_within(root, &dest).map_err(|_| ErrorKind::Forbidden)
}

/// Confirms `dest` resolves (after following symlinks on whatever prefix
/// already exists) to a path under `root`. The final path component may
/// not exist yet — sinks create it — so only the existing ancestor chain
/// is canonicalized.
fn contain_within(root: &Path, dest: &Path) -> Result<PathBuf, ErrorKind> {
    let mut existing = dest.to_path_buf();
    let mut tail = Vec::new();
    while !existing.exists() {
        match existing.file_name() {
            Some(name) => {
                tail.push(name.to_os_string());
                existing.pop();
            }
            None => break,
        }
    }

    let canon_root = root
        .canonicalize()
        .map_err(|e| ErrorKind::IOError(e.to_string()))?;
    let canon_existing = existing
        .canonicalize()
        .map_err(|e| ErrorKind::IOError(e.to_string()))?;

    if !canon_existing.starts_with(&canon_root) {
        return Err(ErrorKind::Forbidden);
    }

    let mut result = canon_existing;
    for component in tail.into_iter().rev() {
        result.push(component);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn roots(dir: &Path) -> HashMap<String, PathBuf> {
        let mut m = HashMap::new();
        m.insert("p11".to_string(), dir.to_path_buf());
        m
    }

    #[test]
    fn resolve_upload_defaults_group_and_sanitizes_filename() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("p11-member-group")).unwrap();
        let pnum = Pnum::new("p11").unwrap();

        let dest = resolve_upload(&roots(dir.path()), &pnum, None, "example.csv").unwrap();
        assert_eq!(
            dest,
            dir.path()
                .canonicalize()
                .unwrap()
                .join("p11-member-group")
                .join("example.csv")
        );
    }

    #[test]
    fn resolve_upload_rejects_foreign_group() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("p12-member-group")).unwrap();
        let pnum = Pnum::new("p11").unwrap();
        let foreign = GroupName::new("p12-member-group").unwrap();

        let err = resolve_upload(&roots(dir.path()), &pnum, Some(&foreign), "f.csv").unwrap_err();
        assert!(matches!(err, ErrorKind::NotAMember));
    }

    #[test]
    fn resolve_form_upload_skips_group_directory() {
        let dir = tempfile::tempdir().unwrap();
        let pnum = Pnum::new("p11").unwrap();

        let dest = resolve_form_upload(&roots(dir.path()), &pnum, "form.csv").unwrap();
        assert_eq!(dest, dir.path().canonicalize().unwrap().join("form.csv"));
    }

    #[test]
    fn resolve_upload_rejects_unconfigured_project() {
        let dir = tempfile::tempdir().unwrap();
        let pnum = Pnum::new("p99").unwrap();
        let err = resolve_upload(&roots(dir.path()), &pnum, None, "f.csv").unwrap_err();
        assert!(matches!(err, ErrorKind::InvalidPath(_)));
    }

    #[test]
    fn resolve_sns_builds_expected_layout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(
            dir.path()
                .join("p11")
                .join("nettskjema-submissions")
                .join("255CE5ED50A7558B")
                .join("98765"),
        )
        .unwrap();
        let pnum = Pnum::new("p11").unwrap();
        let key_id = KeyId::new("255CE5ED50A7558B").unwrap();
        let form_id = FormId::new("98765").unwrap();

        let dest = resolve_sns(dir.path(), &roots(dir.path()), &pnum, &key_id, &form_id, "submission.json").unwrap();
        assert!(dest.ends_with("p11/nettskjema-submissions/255CE5ED50A7558B/98765/submission.json"));
    }

    #[test]
    fn resolve_export_rejects_traversal_and_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let pnum = Pnum::new("p11").unwrap();
        let mut roots = HashMap::new();
        roots.insert("p11".to_string(), dir.path().to_path_buf());

        assert!(matches!(
            resolve_export(&roots, &pnum, Some("../../etc/passwd")),
            Err(ErrorKind::Forbidden)
        ));
        assert!(matches!(
            resolve_export(&roots, &pnum, Some("/bin/bash -c")),
            Err(ErrorKind::Forbidden)
        ));
    }

    #[test]
    fn resolve_export_list_returns_root() {
        let dir = tempfile::tempdir().unwrap();
        let pnum = Pnum::new("p11").unwrap();
        let mut roots = HashMap::new();
        roots.insert("p11".to_string(), dir.path().to_path_buf());

        let dest = resolve_export(&roots, &pnum, None).unwrap();
        assert_eq!(dest, dir.path());
    }
}
