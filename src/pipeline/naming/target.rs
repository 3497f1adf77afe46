use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};

use super::NamingError;
use crate::config::Placement;
use crate::models::DocumentType;

/// Suffix used when the new name equals the source path.
pub const PROCESSED_SUFFIX: &str = "_processed";

/// Upper bound on `_N` suffixes tried before giving up.
const MAX_SUFFIX_ATTEMPTS: u32 = 10_000;

/// Directory a processed document goes to under `placement`.
///
/// Creates the archive directories when needed.
pub fn target_directory(
    source: &Path,
    placement: &Placement,
    doc_type: DocumentType,
    date: NaiveDate,
) -> Result<PathBuf, NamingError> {
    match placement {
        Placement::SameDirectory => source
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| NamingError::NoParent(source.to_path_buf())),
        Placement::ArchiveTree { root } => {
            let dir = root
                .join(format!("{:04}", date.year()))
                .join(doc_type.as_str());
            std::fs::create_dir_all(&dir)?;
            Ok(dir)
        }
    }
}

/// Pick a free path for `file_name` under `placement`.
///
/// A name equal to the source gets `_processed`; an occupied name gets
/// `_1`, `_2`, ... The returned path does not exist at the time of the call.
pub fn resolve_target(
    source: &Path,
    file_name: &str,
    placement: &Placement,
    doc_type: DocumentType,
    date: NaiveDate,
) -> Result<PathBuf, NamingError> {
    let dir = target_directory(source, placement, doc_type, date)?;
    let candidate = dir.join(file_name);

    let (stem, extension) = split_name(file_name);
    let stem = if same_file(&candidate, source) {
        format!("{stem}{PROCESSED_SUFFIX}")
    } else {
        stem.to_string()
    };

    let first = dir.join(join_name(&stem, extension));
    if !first.exists() {
        return Ok(first);
    }

    for n in 1..=MAX_SUFFIX_ATTEMPTS {
        let next = dir.join(join_name(&format!("{stem}_{n}"), extension));
        if !next.exists() {
            return Ok(next);
        }
    }
    Err(NamingError::Exhausted(first, MAX_SUFFIX_ATTEMPTS))
}

fn split_name(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    }
}

fn join_name(stem: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

/// Path equality, resolving symlinks and `..` when both exist.
fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    #[test]
    fn free_name_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("scan001.pdf");
        std::fs::write(&source, b"%PDF").unwrap();

        let target = resolve_target(
            &source,
            "2025-03-01_Rechnung.pdf",
            &Placement::SameDirectory,
            DocumentType::Invoice,
            date(),
        )
        .unwrap();
        assert_eq!(target, dir.path().join("2025-03-01_Rechnung.pdf"));
    }

    #[test]
    fn existing_names_get_numbered_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("scan.pdf");
        std::fs::write(&source, b"%PDF").unwrap();
        std::fs::write(dir.path().join("name.pdf"), b"x").unwrap();

        let first = resolve_target(
            &source,
            "name.pdf",
            &Placement::SameDirectory,
            DocumentType::Letter,
            date(),
        )
        .unwrap();
        assert_eq!(first, dir.path().join("name_1.pdf"));

        std::fs::write(&first, b"x").unwrap();
        let second = resolve_target(
            &source,
            "name.pdf",
            &Placement::SameDirectory,
            DocumentType::Letter,
            date(),
        )
        .unwrap();
        assert_eq!(second, dir.path().join("name_2.pdf"));
    }

    #[test]
    fn collision_with_source_gets_processed_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("document.pdf");
        std::fs::write(&source, b"%PDF").unwrap();

        let target = resolve_target(
            &source,
            "document.pdf",
            &Placement::SameDirectory,
            DocumentType::Unknown,
            date(),
        )
        .unwrap();
        assert_eq!(target, dir.path().join("document_processed.pdf"));
    }

    #[test]
    fn archive_tree_creates_year_and_type_dirs() {
        let inbox = tempfile::tempdir().unwrap();
        let archive = tempfile::tempdir().unwrap();
        let source = inbox.path().join("scan.pdf");
        std::fs::write(&source, b"%PDF").unwrap();

        let placement = Placement::ArchiveTree {
            root: archive.path().to_path_buf(),
        };
        let target = resolve_target(
            &source,
            "a.pdf",
            &placement,
            DocumentType::Invoice,
            date(),
        )
        .unwrap();
        assert_eq!(target, archive.path().join("2025").join("invoice").join("a.pdf"));
        assert!(archive.path().join("2025").join("invoice").is_dir());
    }

    #[test]
    fn split_name_handles_missing_extension() {
        assert_eq!(split_name("a.pdf"), ("a", Some("pdf")));
        assert_eq!(split_name("noext"), ("noext", None));
        assert_eq!(split_name(".hidden"), (".hidden", None));
    }

    #[test]
    fn bare_source_without_parent_is_rejected() {
        let err = target_directory(
            Path::new("/"),
            &Placement::SameDirectory,
            DocumentType::Unknown,
            date(),
        );
        assert!(matches!(err, Err(NamingError::NoParent(_))));
    }
}
