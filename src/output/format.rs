//! Plain-text rendering of the summary log for reading on a phone.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use super::jsonl::read_jsonl;
use crate::error::OutputError;
use crate::summary::SummaryResult;

pub const DEFAULT_WRAP: usize = 100;

const RULE_WIDTH: usize = 40;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```.*?```").unwrap());

/// Greedy word wrap. Whitespace runs collapse to one space; words longer
/// than `width` are split across lines.
pub fn wrap_text(text: &str, width: usize) -> String {
    let width = width.max(1);
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();

        while word.len() > width {
            if current_len > 0 {
                let room = width.saturating_sub(current_len + 1);
                if room == 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                    continue;
                }
                current.push(' ');
                current.extend(word.drain(..room));
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            } else {
                lines.push(word.drain(..width).collect());
            }
        }

        if word.is_empty() {
            continue;
        }
        let needed = if current_len == 0 {
            word.len()
        } else {
            current_len + 1 + word.len()
        };
        if needed > width {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current_len += word.len();
        current.extend(word);
    }

    if current_len > 0 {
        lines.push(current);
    }
    lines.join("\n")
}

fn clean_highlight(text: &str) -> String {
    let without_code = CODE_FENCE.replace_all(text, "");
    without_code.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Render records as a phone-friendly digest.
pub fn render_for_phone(records: &[SummaryResult], width: usize) -> String {
    let mut out = String::new();
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            out.push('\n');
            out.push_str(&"-".repeat(RULE_WIDTH));
            out.push_str("\n\n");
        }
        let date = record.date_iso.split('T').next().unwrap_or_default();

        let _ = writeln!(out, "{}", record.subject.trim().to_uppercase());
        let _ = writeln!(out, "Date: {date}\n");
        let _ = writeln!(out, "Summary:\n{}\n", wrap_text(record.summary.trim(), width));

        if !record.highlights.is_empty() {
            out.push_str("Highlights:\n");
            for highlight in &record.highlights {
                let _ = writeln!(out, "• {}", clean_highlight(highlight));
            }
        }
    }
    out
}

/// Convert a JSONL summary log into a plain-text file.
pub async fn convert_file(input: &Path, output: &Path, width: usize) -> Result<usize, OutputError> {
    let records: Vec<SummaryResult> = read_jsonl(input).await?;
    let text = render_for_phone(&records, width);
    tokio::fs::write(output, text)
        .await
        .map_err(|e| OutputError::Io {
            path: output.display().to_string(),
            source: e,
        })?;
    info!(
        input = %input.display(),
        output = %output.display(),
        records = records.len(),
        "Wrote phone digest"
    );
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(subject: &str, highlights: &[&str]) -> SummaryResult {
        SummaryResult {
            subject: subject.to_string(),
            date_iso: "2026-01-05T08:00:00.123456Z".to_string(),
            summary: "One two three four five six.".to_string(),
            highlights: highlights.iter().map(|h| h.to_string()).collect(),
        }
    }

    #[test]
    fn wrap_respects_width() {
        let wrapped = wrap_text("one two three four five six", 9);
        assert_eq!(wrapped, "one two\nthree\nfour five\nsix");
        assert!(wrapped.lines().all(|l| l.chars().count() <= 9));
    }

    #[test]
    fn wrap_collapses_whitespace() {
        assert_eq!(wrap_text("  a \n\n b\t c ", 100), "a b c");
        assert_eq!(wrap_text("", 10), "");
    }

    #[test]
    fn wrap_breaks_long_words() {
        assert_eq!(wrap_text("abcdefghij", 4), "abcd\nefgh\nij");
        assert_eq!(wrap_text("xy abcdefgh", 5), "xy ab\ncdefg\nh");
    }

    #[test]
    fn renders_single_record() {
        let text = render_for_phone(&[record("Weekly Roundup", &["First", "Second"])], 100);
        assert_eq!(
            text,
            "WEEKLY ROUNDUP\nDate: 2026-01-05\n\nSummary:\nOne two three four five six.\n\n\
             Highlights:\n• First\n• Second\n"
        );
    }

    #[test]
    fn separates_records_with_rule() {
        let text = render_for_phone(&[record("A", &[]), record("B", &[])], 100);
        let rule = format!("\n{}\n\n", "-".repeat(40));
        assert_eq!(text.matches(&rule).count(), 1);
        assert!(text.starts_with("A\n"));
        assert!(!text.contains("Highlights:"));
    }

    #[test]
    fn highlights_drop_code_and_extra_space() {
        let text = render_for_phone(
            &[record("A", &["Use   ```rust\nfn main() {}\n```  this\n tool"])],
            100,
        );
        assert!(text.contains("• Use this tool\n"));
    }

    #[tokio::test]
    async fn converts_file_skipping_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.jsonl");
        let output = dir.path().join("out.txt");
        std::fs::write(
            &input,
            "{\"subject\":\"a\",\"date_iso\":\"2026-01-01T00:00:00Z\",\"summary\":\"s\",\"highlights\":null}\n\n\
             {\"subject\":\"b\",\"date_iso\":\"2026-01-02T00:00:00Z\",\"summary_4to5_sentences\":\"t\",\"highlights\":[\"h\"]}\n",
        )
        .unwrap();

        let count = convert_file(&input, &output, 80).await.unwrap();

        assert_eq!(count, 2);
        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.starts_with("A\nDate: 2026-01-01\n\nSummary:\ns\n\n"));
        assert!(text.contains("B\nDate: 2026-01-02"));
        assert!(text.ends_with("• h\n"));
    }
}
