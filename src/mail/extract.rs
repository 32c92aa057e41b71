//! Subject and plain-text body extraction from raw messages.

use mail_parser::{MessageParser, PartType};

use crate::error::MailError;

/// Subject and body text pulled out of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// Empty when the message has no subject header.
    pub subject: String,
    pub body: String,
}

/// Parse raw RFC 822 bytes and extract subject and body.
///
/// All `text/plain` parts are joined with newlines. HTML is used only when
/// no plain-text part exists, with tags removed and entities decoded.
pub fn extract_text(message_id: &str, raw: &[u8]) -> Result<ExtractedText, MailError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| MailError::Decode {
            id: message_id.to_string(),
            reason: "not a parseable RFC 822 message".to_string(),
        })?;

    let subject = parsed.subject().unwrap_or_default().trim().to_string();

    let text_chunks: Vec<&str> = parsed
        .text_bodies()
        .filter_map(|part| match &part.body {
            PartType::Text(text) => Some(text.as_ref()),
            _ => None,
        })
        .collect();

    let body = if !text_chunks.is_empty() {
        text_chunks.join("\n")
    } else if let Some(html) = parsed.body_html(0) {
        html_to_text(message_id, html.as_ref())?
    } else {
        String::new()
    };

    Ok(ExtractedText {
        subject,
        body: body.trim().to_string(),
    })
}

/// Rendering width for HTML bodies; wide enough that lines are not wrapped.
const HTML_RENDER_WIDTH: usize = 10_000;

/// Render an HTML body as plain text on a single whitespace-collapsed line.
///
/// Markup is dropped and every HTML5 named or numeric entity is decoded.
pub fn html_to_text(message_id: &str, html: &str) -> Result<String, MailError> {
    let rendered = html2text::from_read(html.as_bytes(), HTML_RENDER_WIDTH).map_err(|e| {
        MailError::Decode {
            id: message_id.to_string(),
            reason: format!("unreadable HTML body: {e}"),
        }
    })?;
    Ok(rendered.split_whitespace().collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_message() {
        let raw = b"From: news@example.com\r\nSubject: AI Weekly #12\r\nContent-Type: text/plain\r\n\r\nHello readers.\r\n";
        let text = extract_text("m1", raw).unwrap();
        assert_eq!(text.subject, "AI Weekly #12");
        assert_eq!(text.body, "Hello readers.");
    }

    #[test]
    fn prefers_plain_text_over_html() {
        let raw = concat!(
            "Subject: Both\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/alternative; boundary=\"b1\"\r\n",
            "\r\n",
            "--b1\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "Plain version\r\n",
            "--b1\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>HTML version</p>\r\n",
            "--b1--\r\n",
        );
        let text = extract_text("m1", raw.as_bytes()).unwrap();
        assert_eq!(text.body, "Plain version");
    }

    #[test]
    fn html_only_is_stripped() {
        let raw = concat!(
            "Subject: Html\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<div><p>Big news &amp; more</p></div>\r\n",
        );
        let text = extract_text("m1", raw.as_bytes()).unwrap();
        assert_eq!(text.body, "Big news & more");
    }

    #[test]
    fn missing_subject_is_empty() {
        let raw = b"From: a@example.com\r\nContent-Type: text/plain\r\n\r\nbody\r\n";
        let text = extract_text("m1", raw).unwrap();
        assert_eq!(text.subject, "");
        assert_eq!(text.body, "body");
    }

    #[test]
    fn html_to_text_basic() {
        assert_eq!(html_to_text("m", "<p>Hello</p>").unwrap(), "Hello");
        assert!(
            html_to_text("m", r#"<a href="https://example.com">Link</a>"#)
                .unwrap()
                .contains("Link")
        );
        assert_eq!(html_to_text("m", "<p>  Hello   World  </p>").unwrap(), "Hello World");
        assert_eq!(html_to_text("m", "").unwrap(), "");
    }

    #[test]
    fn html_to_text_separates_block_text() {
        assert_eq!(html_to_text("m", "<p>One</p><p>Two</p>").unwrap(), "One Two");
    }

    #[test]
    fn named_and_numeric_entities() {
        assert_eq!(
            html_to_text("m", "<p>Caf&eacute; &copy; 2026 &euro;5 &trade;</p>").unwrap(),
            "Café © 2026 €5 ™"
        );
        assert_eq!(html_to_text("m", "<p>a &lt;b&gt; &#65;&#x42;</p>").unwrap(), "a <b> AB");
    }
}
