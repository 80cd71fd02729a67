//! Quality gate applied to every extracted page before it counts as a success.

use crawlq_shared::{CrawlSettings, PageContent};

/// Phrases that identify an error page, matched case-insensitively.
pub const ERROR_MARKERS: &[&str] = &[
    "page not found",
    "404",
    "not found",
    "page does not exist",
    "broken link",
];

/// How many leading characters of content are scanned for error markers.
const MARKER_SCAN_CHARS: usize = 200;

/// Outcome of running the gate on one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityVerdict {
    Pass,
    /// Title or opening content looks like an error page.
    ErrorPage { marker: &'static str },
    /// Cleaned content is shorter than the configured minimum.
    TooShort { chars: usize, min: usize },
}

impl QualityVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Short reason string for the attempt log.
    pub fn describe(&self) -> String {
        match self {
            Self::Pass => "passed".into(),
            Self::ErrorPage { marker } => format!("error page detected ({marker:?})"),
            Self::TooShort { chars, min } => {
                format!("content too short ({chars} < {min} chars)")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityGate {
    pub min_content_length: usize,
}

impl QualityGate {
    pub fn new(min_content_length: usize) -> Self {
        Self { min_content_length }
    }

    /// Error markers first: an error page fails regardless of its length.
    pub fn evaluate(&self, page: &PageContent) -> QualityVerdict {
        if let Some(marker) = find_error_marker(page) {
            return QualityVerdict::ErrorPage { marker };
        }

        let chars = page.content_chars();
        if chars < self.min_content_length {
            return QualityVerdict::TooShort {
                chars,
                min: self.min_content_length,
            };
        }

        QualityVerdict::Pass
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::from(&CrawlSettings::default())
    }
}

impl From<&CrawlSettings> for QualityGate {
    fn from(settings: &CrawlSettings) -> Self {
        Self::new(settings.min_content_length)
    }
}

fn find_error_marker(page: &PageContent) -> Option<&'static str> {
    let title = page.title.to_lowercase();
    let opening: String = page
        .content
        .chars()
        .take(MARKER_SCAN_CHARS)
        .collect::<String>()
        .to_lowercase();

    ERROR_MARKERS
        .iter()
        .copied()
        .find(|marker| title.contains(marker) || opening.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn page(title: &str, content: &str) -> PageContent {
        PageContent {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    fn long_text() -> String {
        "Our team builds reliable crawling infrastructure. ".repeat(6)
    }

    #[test]
    fn long_clean_page_passes() {
        let verdict = QualityGate::default().evaluate(&page("About us", &long_text()));
        assert_eq!(verdict, QualityVerdict::Pass);
        assert!(verdict.is_pass());
    }

    #[rstest]
    #[case("404 - Page Not Found", "page not found")]
    #[case("Error 404", "404")]
    #[case("Not Found", "not found")]
    #[case("This Page Does Not Exist", "page does not exist")]
    #[case("Broken Link", "broken link")]
    fn error_title_is_rejected(#[case] title: &str, #[case] expected: &'static str) {
        let verdict = QualityGate::default().evaluate(&page(title, &long_text()));
        assert_eq!(verdict, QualityVerdict::ErrorPage { marker: expected });
    }

    #[test]
    fn marker_in_opening_content_is_rejected() {
        let content = format!("Sorry, this page does not exist anymore. {}", long_text());
        let verdict = QualityGate::default().evaluate(&page("Acme", &content));
        assert_eq!(
            verdict,
            QualityVerdict::ErrorPage {
                marker: "page does not exist"
            }
        );
    }

    #[test]
    fn marker_past_scan_window_is_ignored() {
        let content = format!("{} Call us at extension 404.", long_text());
        assert!(content.find("404").unwrap() > MARKER_SCAN_CHARS);
        let verdict = QualityGate::default().evaluate(&page("Contact", &content));
        assert_eq!(verdict, QualityVerdict::Pass);
    }

    #[test]
    fn short_content_is_rejected() {
        let verdict = QualityGate::default().evaluate(&page("Example Domain", "Short page."));
        assert_eq!(verdict, QualityVerdict::TooShort { chars: 11, min: 200 });
        assert_eq!(verdict.describe(), "content too short (11 < 200 chars)");
    }

    #[test]
    fn length_is_counted_in_characters() {
        // 200 two-byte characters
        let content = "é".repeat(200);
        let verdict = QualityGate::new(200).evaluate(&page("Accents", &content));
        assert_eq!(verdict, QualityVerdict::Pass);
    }

    #[test]
    fn configured_minimum_is_respected() {
        let gate = QualityGate::new(5);
        assert!(gate.evaluate(&page("Tiny", "hello")).is_pass());
    }
}
