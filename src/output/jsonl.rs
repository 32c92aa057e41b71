//! Append-only JSONL summary log.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::OutputError;

fn io_error(path: &Path, source: std::io::Error) -> OutputError {
    OutputError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Append `records` to `path`, one JSON object per line.
///
/// The file and its parent directory are created if needed. All lines are
/// serialized up front and written with a single call, so a serialization
/// error leaves the file untouched.
pub async fn append_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<usize, OutputError> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut buf = String::new();
    for record in records {
        buf.push_str(&serde_json::to_string(record)?);
        buf.push('\n');
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(path, e))?;
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| io_error(path, e))?;
    file.write_all(buf.as_bytes())
        .await
        .map_err(|e| io_error(path, e))?;
    file.flush().await.map_err(|e| io_error(path, e))?;

    debug!(path = %path.display(), count = records.len(), "Appended records");
    Ok(records.len())
}

/// Read every record from a JSONL file. Blank lines are skipped.
pub async fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, OutputError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| io_error(path, e))?;
    parse_jsonl(path, &content)
}

fn parse_jsonl<T: DeserializeOwned>(path: &Path, content: &str) -> Result<Vec<T>, OutputError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|e| OutputError::Malformed {
                path: path.display().to_string(),
                line: idx + 1,
                reason: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::SummaryResult;

    fn result(n: usize) -> SummaryResult {
        SummaryResult {
            subject: format!("Issue #{n} – ünïcode"),
            date_iso: format!("2026-01-0{n}T08:00:00Z"),
            summary: format!("Summary {n}."),
            highlights: vec![format!("point {n}")],
        }
    }

    #[tokio::test]
    async fn write_then_read_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let records: Vec<SummaryResult> = (1..=4).map(result).collect();

        assert_eq!(append_jsonl(&path, &records).await.unwrap(), 4);
        let back: Vec<SummaryResult> = read_jsonl(&path).await.unwrap();

        assert_eq!(back, records);
    }

    #[tokio::test]
    async fn appends_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");

        append_jsonl(&path, &[result(1)]).await.unwrap();
        append_jsonl(&path, &[result(2), result(3)]).await.unwrap();

        let back: Vec<SummaryResult> = read_jsonl(&path).await.unwrap();
        let subjects: Vec<&str> = back.iter().map(|r| r.subject.as_str()).collect();
        assert_eq!(
            subjects,
            vec!["Issue #1 – ünïcode", "Issue #2 – ünïcode", "Issue #3 – ünïcode"]
        );
    }

    #[tokio::test]
    async fn keeps_non_ascii_unescaped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        append_jsonl(&path, &[result(1)]).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("ünïcode"));
        assert!(raw.ends_with('\n'));
        assert_eq!(raw.lines().count(), 1);
    }

    #[tokio::test]
    async fn creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.jsonl");
        append_jsonl(&path, &[result(1)]).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn empty_batch_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let none: Vec<SummaryResult> = Vec::new();
        assert_eq!(append_jsonl(&path, &none).await.unwrap(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn malformed_line_reports_position() {
        let content = "{\"subject\":\"a\"}\n\nnot json\n";
        let err = parse_jsonl::<SummaryResult>(Path::new("x.jsonl"), content).unwrap_err();
        assert!(matches!(err, OutputError::Malformed { line: 3, .. }));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_jsonl::<SummaryResult>(&dir.path().join("absent.jsonl"))
            .await
            .unwrap_err();
        assert!(matches!(err, OutputError::Io { .. }));
    }
}
