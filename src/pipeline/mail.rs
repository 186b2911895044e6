//! Raw RFC 5322 message parsing into [`InboundMail`].

use chrono::{TimeZone, Utc};
use mail_parser::{MessageParser, MimeHeaders};

use crate::error::PipelineError;
use crate::pipeline::types::{AttachmentText, InboundMail};

/// Parse a raw message. Only `text/*` attachments no larger than
/// `max_attachment_bytes` are read; every attachment is counted.
pub fn parse_raw_mail(id: &str, raw: &[u8], max_attachment_bytes: usize) -> Result<InboundMail, PipelineError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| PipelineError::Mail(format!("{id}: not an RFC 5322 message")))?;

    let from = parsed.from().and_then(|addr| addr.first());
    let sender = from
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .ok_or_else(|| PipelineError::Mail(format!("{id}: missing From address")))?;
    let sender_name = from.and_then(|a| a.name()).map(|s| s.to_string());

    let received_at = parsed
        .date()
        .and_then(|d| Utc.timestamp_opt(d.to_timestamp(), 0).single())
        .unwrap_or_else(Utc::now);

    let mut attachments = Vec::new();
    let mut attachment_count = 0;
    for part in parsed.attachments() {
        attachment_count += 1;
        let Some(ct) = MimeHeaders::content_type(part) else {
            continue;
        };
        if ct.ctype() != "text" || part.contents().len() > max_attachment_bytes {
            continue;
        }
        let Ok(text) = std::str::from_utf8(part.contents()) else {
            continue;
        };
        let text = if ct.subtype() == Some("html") {
            strip_html(text)
        } else {
            text.to_string()
        };
        attachments.push(AttachmentText {
            filename: MimeHeaders::attachment_name(part).unwrap_or("adjunto").to_string(),
            mime: Some(match ct.subtype() {
                Some(sub) => format!("text/{sub}"),
                None => "text/plain".to_string(),
            }),
            text,
        });
    }

    Ok(InboundMail {
        id: id.to_string(),
        sender,
        sender_name,
        subject: parsed.subject().unwrap_or_default().to_string(),
        body: extract_body(&parsed),
        received_at,
        attachments,
        attachment_count,
    })
}

fn extract_body(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    String::new()
}

/// Drop tags and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
