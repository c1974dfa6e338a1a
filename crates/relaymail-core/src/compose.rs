//! Message transcript composition.

use std::fmt::Write;

use crate::content::ContentType;

/// Builds the header block and body handed to the data phase.
///
/// Headers are written in a fixed order: `From`, `To` (comma-joined),
/// `Subject`, `Content-Type` with a UTF-8 charset, then a blank line and
/// the body as given.
///
/// Addresses and subject are trusted input. CR/LF inside them is not
/// escaped and would end the header early.
#[must_use]
pub fn compose<T: AsRef<str>>(
    from: &str,
    to: &[T],
    subject: &str,
    body: &str,
    content_type: ContentType,
) -> String {
    let to = to.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(",");

    let mut message = String::with_capacity(body.len() + 128);
    let _ = write!(message, "From: {from}\r\n");
    let _ = write!(message, "To: {to}\r\n");
    let _ = write!(message, "Subject: {subject}\r\n");
    let _ = write!(
        message,
        "Content-Type: {}; charset=UTF-8\r\n",
        content_type.mime()
    );
    message.push_str("\r\n");
    message.push_str(body);
    message
}

/// Classifies `body` and composes the transcript.
#[must_use]
pub fn compose_message<T: AsRef<str>>(from: &str, to: &[T], subject: &str, body: &str) -> String {
    compose(from, to, subject, body, ContentType::classify(body))
}
