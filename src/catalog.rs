use crate::config::{CatalogConfig, CatalogKind};
use crate::episode::CatalogEntry;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use std::time::Duration;

/// Source of the ordered episode catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Episodes in catalog order, numbered from 1. Failure is fatal for the run.
    async fn fetch(&self) -> Result<Vec<CatalogEntry>>;
}

pub fn from_config(config: &CatalogConfig) -> Result<Box<dyn CatalogSource>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(|e| PipelineError::Config(format!("Failed to create HTTP client: {}", e)))?;
    Ok(match config.kind {
        CatalogKind::Page => Box::new(DirectoryPageCatalog::new(client, config.url.clone())),
        CatalogKind::Feed => Box::new(FeedCatalog::new(client, config.url.clone())),
    })
}

async fn fetch_body(client: &reqwest::Client, url: &str) -> Result<String> {
    log::debug!("Retrieving episode catalog from {}", url);
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| PipelineError::CatalogRetrieval(format!("Failed to fetch {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(PipelineError::CatalogRetrieval(format!(
            "{} answered with status {}",
            url,
            response.status()
        )));
    }

    response
        .text()
        .await
        .map_err(|e| PipelineError::CatalogRetrieval(format!("Failed to read catalog body: {}", e)))
}

fn number_in_order(locators: Vec<String>) -> Vec<CatalogEntry> {
    locators
        .into_iter()
        .enumerate()
        .map(|(i, locator)| CatalogEntry {
            number: i as u32 + 1,
            locator,
        })
        .collect()
}

/// The podcast's HTML directory page: one `<li>` per episode, whose second
/// link is the audio download.
pub struct DirectoryPageCatalog {
    client: reqwest::Client,
    url: String,
}

impl DirectoryPageCatalog {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl CatalogSource for DirectoryPageCatalog {
    async fn fetch(&self) -> Result<Vec<CatalogEntry>> {
        let html = fetch_body(&self.client, &self.url).await?;
        let base = Url::parse(&self.url)
            .map_err(|e| PipelineError::Config(format!("invalid catalog url {}: {}", self.url, e)))?;
        let links = parse_directory_page(&html, &base)?;
        log::debug!("Retrieved {} Episode download links", links.len());
        Ok(number_in_order(links))
    }
}

/// Download links in page order, resolved against `base`.
pub fn parse_directory_page(html: &str, base: &Url) -> Result<Vec<String>> {
    let item = Regex::new(r"(?is)<li\b[^>]*>(.*?)</li>")
        .map_err(|e| PipelineError::CatalogRetrieval(e.to_string()))?;
    let anchor = Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']+)["']"#)
        .map_err(|e| PipelineError::CatalogRetrieval(e.to_string()))?;

    let mut links = Vec::new();
    for caps in item.captures_iter(html) {
        let Some(body) = caps.get(1) else { continue };
        let Some(href) = anchor.captures_iter(body.as_str()).nth(1).and_then(|c| c.get(1)) else {
            continue;
        };
        let href = href.as_str().trim().replace("&amp;", "&");
        match base.join(&href) {
            Ok(url) => links.push(url.to_string()),
            Err(e) => log::warn!("Skipping unparseable catalog link {:?}: {}", href, e),
        }
    }
    Ok(links)
}

/// RSS/Atom feed of the podcast, numbered oldest first.
pub struct FeedCatalog {
    client: reqwest::Client,
    url: String,
}

impl FeedCatalog {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl CatalogSource for FeedCatalog {
    async fn fetch(&self) -> Result<Vec<CatalogEntry>> {
        let body = fetch_body(&self.client, &self.url).await?;
        let links = parse_feed(body.as_bytes())?;
        log::info!("Parsed {} audio entries from feed", links.len());
        Ok(number_in_order(links))
    }
}

/// Audio URLs of a feed, oldest entry first. Entries without audio are skipped.
pub fn parse_feed(body: &[u8]) -> Result<Vec<String>> {
    let feed = feed_rs::parser::parse(body)
        .map_err(|e| PipelineError::CatalogRetrieval(format!("Failed to parse feed: {}", e)))?;

    let mut entries: Vec<_> = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let audio_url = entry
                .media
                .first()
                .and_then(|m| m.content.first())
                .and_then(|c| c.url.as_ref())
                .map(|u| u.to_string())
                .or_else(|| {
                    entry
                        .links
                        .iter()
                        .find(|l| l.media_type.as_deref().is_some_and(|t| t.starts_with("audio/")))
                        .map(|l| l.href.clone())
                })?;
            Some((entry.published, audio_url))
        })
        .collect();

    // Feeds list newest first; without dates the document order is all we have
    if entries.iter().all(|(published, _)| published.is_some()) {
        entries.sort_by_key(|(published, _)| *published);
    } else {
        entries.reverse();
    }
    Ok(entries.into_iter().map(|(_, url)| url).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body><ul>
          <li><a href="/folge-1">Folge 1: Der Anfang</a> <a href="https://cdn.example.org/sg001.mp3">MP3</a></li>
          <li class="ep"><a href="/folge-2">Folge 2</a><a href='/audio/sg002.mp3?a=1&amp;b=2'>MP3</a></li>
          <li><a href="/nur-text">Ohne Audio</a></li>
          <li><A HREF="/folge-3">Folge 3</A>
              <A HREF="https://cdn.example.org/sg003.mp3">MP3</A></li>
        </ul></body></html>
    "#;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0"><channel>
          <title>Sternengeschichten</title>
          <item>
            <title>Folge 2</title>
            <pubDate>Fri, 10 Jan 2020 06:00:00 +0000</pubDate>
            <enclosure url="https://cdn.example.org/sg002.mp3" type="audio/mpeg" length="1"/>
          </item>
          <item>
            <title>Ankündigung</title>
            <pubDate>Wed, 08 Jan 2020 06:00:00 +0000</pubDate>
          </item>
          <item>
            <title>Folge 1</title>
            <pubDate>Fri, 03 Jan 2020 06:00:00 +0000</pubDate>
            <enclosure url="https://cdn.example.org/sg001.mp3" type="audio/mpeg" length="1"/>
          </item>
        </channel></rss>"#;

    #[test]
    fn test_directory_page_second_link_in_page_order() {
        let base = Url::parse("https://example.org/sternengeschichten/").unwrap();
        let links = parse_directory_page(PAGE, &base).unwrap();
        assert_eq!(
            links,
            vec![
                "https://cdn.example.org/sg001.mp3",
                "https://example.org/audio/sg002.mp3?a=1&b=2",
                "https://cdn.example.org/sg003.mp3",
            ]
        );
    }

    #[test]
    fn test_entries_numbered_from_one() {
        let entries = number_in_order(vec!["a".into(), "b".into()]);
        assert_eq!(entries[0], CatalogEntry { number: 1, locator: "a".into() });
        assert_eq!(entries[1].number, 2);
    }

    #[test]
    fn test_feed_oldest_first_skipping_entries_without_audio() {
        let links = parse_feed(FEED.as_bytes()).unwrap();
        assert_eq!(
            links,
            vec!["https://cdn.example.org/sg001.mp3", "https://cdn.example.org/sg002.mp3"]
        );
    }

    #[test]
    fn test_garbage_feed_is_catalog_error() {
        let err = parse_feed(b"not a feed").unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_unreachable_catalog_is_fatal() {
        let catalog = DirectoryPageCatalog::new(reqwest::Client::new(), "http://127.0.0.1:9/catalog");
        let err = catalog.fetch().await.unwrap_err();
        assert!(err.is_fatal());
    }
}
