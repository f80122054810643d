//! Materializes remote files on local disk.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::slack::{FileQuery, SlackApi, SlackFile};
use crate::utils::AppError;

const PART_SUFFIX: &str = ".part";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedFile {
    pub file_id: String,
    pub path: PathBuf,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub file_id: String,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub file_id: String,
    pub name: String,
    pub reason: String,
}

/// `downloaded + failed + skipped` always equals the listed total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub downloaded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub saved: Vec<SavedFile>,
    pub failures: Vec<FileFailure>,
    pub skipped_files: Vec<SkippedFile>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.downloaded + self.failed + self.skipped
    }

    fn record_saved(&mut self, saved: SavedFile) {
        self.downloaded += 1;
        self.saved.push(saved);
    }

    fn record_failure(&mut self, file: &SlackFile, error: String) {
        self.failed += 1;
        self.failures.push(FileFailure {
            file_id: file.id.clone(),
            name: file.display_name().to_string(),
            error,
        });
    }

    fn record_skip(&mut self, file: &SlackFile, reason: &str) {
        self.skipped += 1;
        self.skipped_files.push(SkippedFile {
            file_id: file.id.clone(),
            name: file.display_name().to_string(),
            reason: reason.to_string(),
        });
    }
}

/// Target paths handed out during one batch.
#[derive(Debug, Default)]
pub struct PathReservations {
    reserved: HashSet<PathBuf>,
}

impl PathReservations {
    pub fn new() -> Self {
        Self::default()
    }

    /// First free path for `file_name` in `dir`. A path is taken when it is
    /// already reserved or already on disk; the k-th clash gets `_k` before
    /// the extension.
    pub fn reserve(&mut self, dir: &Path, file_name: &str) -> PathBuf {
        let (stem, extension) = split_extension(file_name);
        let mut candidate = dir.join(file_name);
        let mut suffix = 0usize;
        while self.reserved.contains(&candidate) || candidate.exists() {
            suffix += 1;
            candidate = dir.join(format!("{stem}_{suffix}{extension}"));
        }
        self.reserved.insert(candidate.clone());
        candidate
    }
}

/// Why a listed file cannot be downloaded, if it cannot.
pub fn skip_reason(file: &SlackFile) -> Option<&'static str> {
    if file.is_tombstone() {
        Some("file was deleted")
    } else if file.download_url().is_none() {
        Some("no download url")
    } else {
        None
    }
}

/// Local name for a file: its sanitized declared name, else `{id}.{filetype}`.
pub fn base_filename(file: &SlackFile) -> String {
    if let Some(name) = file.name.as_deref().and_then(sanitize_filename) {
        return name;
    }
    let filetype = file.filetype.trim();
    if filetype.is_empty() {
        file.id.clone()
    } else {
        format!("{}.{}", file.id, filetype)
    }
}

/// Downloads every usable file in the listing into `dest`.
///
/// Paths are reserved for the whole batch before the first transfer, so
/// the suffixes handed out do not depend on `concurrency`. Results come back
/// in listing order.
pub async fn download_all<A>(
    api: &A,
    query: &FileQuery,
    dest: &Path,
    concurrency: usize,
) -> Result<BatchSummary>
where
    A: SlackApi + ?Sized,
{
    tokio::fs::create_dir_all(dest)
        .await
        .with_context(|| format!("failed to create {}", dest.display()))?;

    let listing = api.list_files(query).await.context("failed to list files")?;
    debug!("listed {} files", listing.files.len());

    let mut summary = BatchSummary::default();
    let mut reservations = PathReservations::new();
    let mut jobs = Vec::new();
    for file in listing.files {
        if let Some(reason) = skip_reason(&file) {
            debug!("skipping file {}: {}", file.id, reason);
            summary.record_skip(&file, reason);
            continue;
        }
        let path = reservations.reserve(dest, &base_filename(&file));
        jobs.push((file, path));
    }

    let results: Vec<_> = stream::iter(jobs)
        .map(|(file, path)| async move {
            let outcome = materialize(api, &file, &path).await;
            (file, path, outcome)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    for (file, path, outcome) in results {
        match outcome {
            Ok(bytes) => {
                info!("saved {} to {}", file.id, path.display());
                summary.record_saved(SavedFile {
                    file_id: file.id,
                    path,
                    bytes,
                });
            }
            Err(err) => {
                warn!("failed to download file {}: {:#}", file.id, err);
                summary.record_failure(&file, format!("{err:#}"));
            }
        }
    }

    Ok(summary)
}

/// Single-file download. `output` may name a file or an existing directory;
/// without it the file lands in the working directory. Any failure is fatal.
pub async fn download_one<A>(api: &A, file_id: &str, output: Option<&Path>) -> Result<SavedFile>
where
    A: SlackApi + ?Sized,
{
    let file = api
        .file_info(file_id)
        .await
        .with_context(|| format!("failed to look up file {file_id}"))?;
    if let Some(reason) = skip_reason(&file) {
        return Err(AppError::validation(format!("cannot download {file_id}: {reason}")).into());
    }

    let path = match output {
        Some(path) if !path.is_dir() => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            path.to_path_buf()
        }
        Some(dir) => PathReservations::new().reserve(dir, &base_filename(&file)),
        None => PathReservations::new().reserve(Path::new("."), &base_filename(&file)),
    };

    let bytes = materialize(api, &file, &path)
        .await
        .with_context(|| format!("failed to download {file_id}"))?;
    Ok(SavedFile {
        file_id: file.id,
        path,
        bytes,
    })
}

async fn materialize<A>(api: &A, file: &SlackFile, path: &Path) -> Result<u64>
where
    A: SlackApi + ?Sized,
{
    let url = file
        .download_url()
        .ok_or_else(|| anyhow!("file {} has no download url", file.id))?;
    let payload = api.fetch_bytes(url).await?;

    if is_unexpected_html(payload.content_type.as_deref(), file) {
        return Err(anyhow!(
            "received an HTML page instead of file content (token may lack the files:read scope)"
        ));
    }

    write_atomically(path, &payload.data).await?;
    Ok(payload.data.len() as u64)
}

/// Writes to a sibling `.part` file and renames it into place.
async fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let mut part = OsString::from(path.as_os_str());
    part.push(PART_SUFFIX);
    let part = PathBuf::from(part);

    if let Err(err) = tokio::fs::write(&part, data).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(err).with_context(|| format!("failed to write {}", part.display()));
    }
    tokio::fs::rename(&part, path)
        .await
        .with_context(|| format!("failed to move {} into place", part.display()))
}

fn is_unexpected_html(content_type: Option<&str>, file: &SlackFile) -> bool {
    let served_html = content_type
        .and_then(|v| v.split(';').next())
        .map(str::trim)
        .is_some_and(|v| v.eq_ignore_ascii_case("text/html"));
    let expected_html = file.filetype.eq_ignore_ascii_case("html")
        || file
            .mimetype
            .as_deref()
            .is_some_and(|m| m.starts_with("text/html"));
    served_html && !expected_html
}

fn sanitize_filename(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control() && *c != '/' && *c != '\\')
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Splits at the last dot, keeping dotfiles whole: `a.tar.gz` gives
/// (`a.tar`, `.gz`), `.env` gives (`.env`, ``).
fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(index) if index > 0 => file_name.split_at(index),
        _ => (file_name, ""),
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::slack::FilePayload;
    use crate::slack::fake::FakeSlack;

    fn remote_file(id: &str, name: Option<&str>, filetype: &str) -> SlackFile {
        SlackFile {
            id: id.to_string(),
            name: name.map(ToOwned::to_owned),
            filetype: filetype.to_string(),
            url_private_download: Some(format!("https://files.example/{id}")),
            ..Default::default()
        }
    }

    fn payload(body: &str) -> FilePayload {
        FilePayload {
            data: body.as_bytes().to_vec(),
            content_type: Some("application/octet-stream".to_string()),
        }
    }

    fn fake_with(files: Vec<SlackFile>) -> FakeSlack {
        let mut fake = FakeSlack::new();
        for file in &files {
            if let Some(url) = file.download_url() {
                fake.payloads.insert(url.to_string(), payload(&file.id));
            }
        }
        fake.files = files;
        fake
    }

    fn file_names(summary: &BatchSummary) -> Vec<String> {
        summary
            .saved
            .iter()
            .map(|saved| saved.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test_case("report.pdf", Some("report.pdf") ; "plain name")]
    #[test_case("../../etc/passwd", Some("....etcpasswd") ; "separators removed")]
    #[test_case("bad\u{7}name\n.txt", Some("badname.txt") ; "control chars removed")]
    #[test_case("  ", None ; "blank")]
    #[test_case("..", None ; "parent dir")]
    fn sanitizes_names(raw: &str, expected: Option<&str>) {
        assert_eq!(sanitize_filename(raw).as_deref(), expected);
    }

    #[test_case("report.pdf", ("report", ".pdf") ; "simple")]
    #[test_case("archive.tar.gz", ("archive.tar", ".gz") ; "double extension")]
    #[test_case(".env", (".env", "") ; "dotfile")]
    #[test_case("README", ("README", "") ; "no extension")]
    fn splits_extension(name: &str, expected: (&str, &str)) {
        assert_eq!(split_extension(name), expected);
    }

    #[test]
    fn synthesizes_names_without_declared_name() {
        assert_eq!(base_filename(&remote_file("F1", None, "png")), "F1.png");
        assert_eq!(base_filename(&remote_file("F2", None, "")), "F2");
        assert_eq!(base_filename(&remote_file("F3", Some("/"), "txt")), "F3.txt");
    }

    #[test]
    fn reservations_respect_disk_and_batch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"existing").unwrap();

        let mut reservations = PathReservations::new();
        let first = reservations.reserve(dir.path(), "notes.txt");
        let second = reservations.reserve(dir.path(), "notes.txt");
        let other = reservations.reserve(dir.path(), "other");

        assert_eq!(first, dir.path().join("notes_1.txt"));
        assert_eq!(second, dir.path().join("notes_2.txt"));
        assert_eq!(other, dir.path().join("other"));
    }

    #[tokio::test]
    async fn same_name_files_get_numbered_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let fake = fake_with(vec![
            remote_file("F1", Some("report.pdf"), "pdf"),
            remote_file("F2", Some("report.pdf"), "pdf"),
            remote_file("F3", Some("report.pdf"), "pdf"),
        ]);

        let summary = download_all(&fake, &FileQuery::default(), dir.path(), 1)
            .await
            .unwrap();

        assert_eq!(
            file_names(&summary),
            vec!["report.pdf", "report_1.pdf", "report_2.pdf"]
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("report_2.pdf")).unwrap(),
            "F3"
        );
    }

    #[tokio::test]
    async fn tombstones_and_urlless_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut deleted = remote_file("F2", Some("gone.png"), "png");
        deleted.mode = Some("tombstone".to_string());
        let mut external = remote_file("F3", Some("link"), "");
        external.url_private_download = None;
        let fake = fake_with(vec![
            remote_file("F1", Some("kept.png"), "png"),
            deleted,
            external,
        ]);

        let summary = download_all(&fake, &FileQuery::default(), dir.path(), 1)
            .await
            .unwrap();

        assert_eq!((summary.downloaded, summary.failed, summary.skipped), (1, 0, 2));
        assert!(!fake.calls().iter().any(|c| c.ends_with("/F2")));
        assert!(!dir.path().join("gone.png").exists());
    }

    #[tokio::test]
    async fn partial_failure_is_counted_and_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let mut fake = fake_with(vec![
            remote_file("F1", Some("a.txt"), "text"),
            remote_file("F2", Some("b.txt"), "text"),
            remote_file("F3", Some("c.txt"), "text"),
        ]);
        fake.payloads.remove("https://files.example/F2");
        fake.payloads.insert(
            "https://files.example/F3".to_string(),
            FilePayload {
                data: b"<html>login</html>".to_vec(),
                content_type: Some("text/html; charset=utf-8".to_string()),
            },
        );

        let summary = download_all(&fake, &FileQuery::default(), dir.path(), 1)
            .await
            .unwrap();

        assert_eq!((summary.downloaded, summary.failed, summary.skipped), (1, 2, 0));
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.failures[0].file_id, "F2");
        assert!(summary.failures[1].error.contains("files:read"));
        assert!(!dir.path().join("c.txt").exists());
        assert!(!dir.path().join("c.txt.part").exists());
    }

    #[tokio::test]
    async fn concurrency_does_not_change_assignment() {
        let files: Vec<SlackFile> = (1..=6)
            .map(|i| remote_file(&format!("F{i}"), Some("clip.mp4"), "mp4"))
            .collect();

        let sequential_dir = tempfile::tempdir().unwrap();
        let parallel_dir = tempfile::tempdir().unwrap();
        let sequential = download_all(
            &fake_with(files.clone()),
            &FileQuery::default(),
            sequential_dir.path(),
            1,
        )
        .await
        .unwrap();
        let parallel = download_all(
            &fake_with(files),
            &FileQuery::default(),
            parallel_dir.path(),
            4,
        )
        .await
        .unwrap();

        assert_eq!(file_names(&sequential), file_names(&parallel));
        let ids: Vec<&str> = parallel.saved.iter().map(|s| s.file_id.as_str()).collect();
        assert_eq!(ids, vec!["F1", "F2", "F3", "F4", "F5", "F6"]);
    }

    #[tokio::test]
    async fn single_download_into_directory_and_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let fake = fake_with(vec![remote_file("F1", Some("photo.jpg"), "jpg")]);

        let first = download_one(&fake, "F1", Some(dir.path())).await.unwrap();
        let second = download_one(&fake, "F1", Some(dir.path())).await.unwrap();
        assert_eq!(first.path, dir.path().join("photo.jpg"));
        assert_eq!(second.path, dir.path().join("photo_1.jpg"));

        let explicit = dir.path().join("nested").join("copy.jpg");
        let saved = download_one(&fake, "F1", Some(&explicit)).await.unwrap();
        assert_eq!(saved.path, explicit);
        assert_eq!(saved.bytes, 2);
    }

    #[tokio::test]
    async fn single_download_of_deleted_file_fails() {
        let mut deleted = remote_file("F1", Some("gone.png"), "png");
        deleted.mode = Some("tombstone".to_string());
        let fake = fake_with(vec![deleted]);

        let err = download_one(&fake, "F1", None).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<AppError>(), Some(AppError::Validation(_))));
        assert!(download_one(&fake, "F404", None).await.is_err());
    }
}
