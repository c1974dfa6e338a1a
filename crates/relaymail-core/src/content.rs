//! Body content classification.

/// Substrings whose presence marks a body as HTML.
const HTML_MARKERS: [&str; 6] = ["<html>", "<body>", "<p>", "<h1>", "<svg>", "<path>"];

/// Content type announced in the `Content-Type` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// `text/html`
    Html,
    /// `text/plain`
    Plain,
}

impl ContentType {
    /// Guesses whether `body` is HTML.
    ///
    /// This is a substring heuristic, not a parser. Markup made only of tags
    /// outside the marker set is classified as plain text, and prose that
    /// happens to contain a marker such as `<p>` is classified as HTML. Both
    /// outcomes only affect the header annotation.
    #[must_use]
    pub fn classify(body: &str) -> Self {
        if HTML_MARKERS.iter().any(|marker| body.contains(marker)) {
            Self::Html
        } else {
            Self::Plain
        }
    }

    /// MIME type without parameters.
    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Html => "text/html",
            Self::Plain => "text/plain",
        }
    }
}
