//! Page text extraction used to enrich search results before analysis.

use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::{Client, ClientBuilder};
use scraper::{Html, Selector};

use crate::error::{AppError, Result};

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

// Shared client so connections are reused across fetches
static CLIENT: Lazy<Option<Client>> = Lazy::new(|| {
    ClientBuilder::new()
        .timeout(FETCH_TIMEOUT)
        .connect_timeout(Duration::from_secs(3))
        .pool_max_idle_per_host(10)
        .build()
        .ok()
});

static BODY_SELECTOR: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("body").ok());

static TEXT_SELECTOR: Lazy<Option<Selector>> =
    Lazy::new(|| Selector::parse("h1, h2, h3, h4, p, li, pre, blockquote").ok());

pub async fn fetch_html(url: &str) -> Result<String> {
    let client = CLIENT
        .as_ref()
        .ok_or_else(|| AppError::FetchError("HTTP client unavailable".to_string()))?;

    let response = tokio::time::timeout(FETCH_TIMEOUT, client.get(url).send())
        .await
        .map_err(|_| AppError::FetchError(format!("fetch timed out after {:?}", FETCH_TIMEOUT)))??;

    if !response.status().is_success() {
        return Err(AppError::FetchError(format!(
            "HTTP {} fetching {}",
            response.status().as_u16(),
            url
        )));
    }
    Ok(response.text().await?)
}

/// Readable text of a page: headings, paragraphs and list items, falling
/// back to the whole `<body>` when none of those are present.
pub fn extract_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let blocks: Vec<String> = TEXT_SELECTOR
        .as_ref()
        .map(|selector| {
            document
                .select(selector)
                .map(|element| element.text().collect::<Vec<_>>().join(" "))
                .filter(|text| !text.trim().is_empty())
                .collect()
        })
        .unwrap_or_default();

    if !blocks.is_empty() {
        return Some(normalize_whitespace(&blocks.join("\n")));
    }

    let body = BODY_SELECTOR.as_ref()?;
    document
        .select(body)
        .next()
        .map(|element| normalize_whitespace(&element.text().collect::<Vec<_>>().join(" ")))
        .filter(|text| !text.is_empty())
}

/// Collapses runs of spaces inside lines and drops blank lines.
pub fn normalize_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for line in text.lines() {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }
        if !result.is_empty() {
            result.push('\n');
        }
        result.push_str(&words.join(" "));
    }

    result
}

/// Fetches `url` and returns at most `max_chars` characters of its text.
pub async fn fetch_page_text(url: &str, max_chars: usize) -> Result<String> {
    let html = fetch_html(url).await?;
    let text = extract_text(&html)
        .ok_or_else(|| AppError::ParseError(format!("no readable text at {}", url)))?;
    Ok(text.chars().take(max_chars).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_block_text() {
        let html = r#"<html><head><script>var x = 1;</script></head>
            <body><h1>Title</h1><p>First   paragraph.</p><ul><li>item</li></ul></body></html>"#;
        assert_eq!(
            extract_text(html).as_deref(),
            Some("Title\nFirst paragraph.\nitem")
        );
    }

    #[test]
    fn falls_back_to_body() {
        let html = "<html><body><div>just a div</div></body></html>";
        assert_eq!(extract_text(html).as_deref(), Some("just a div"));
    }

    #[test]
    fn empty_page_has_no_text() {
        assert_eq!(extract_text("<html><body></body></html>"), None);
    }

    #[test]
    fn whitespace_is_normalized() {
        assert_eq!(normalize_whitespace("  a   b \n\n   \n c  "), "a b\nc");
    }
}
