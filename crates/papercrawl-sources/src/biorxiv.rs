//! bioRxiv details API parser

use chrono::{NaiveDate, NaiveDateTime};
use papercrawl_core::{ParseError, Parser};
use serde::Deserialize;

use crate::de::{first_version, lenient_version, null_to_empty};
use crate::paper::{Author, Paper, Source, non_empty, normalize_whitespace};

pub const DEFAULT_BASE_URL: &str = "https://api.biorxiv.org/details/biorxiv";
pub const DEFAULT_INTERVAL: usize = 100;

#[derive(Debug, Clone)]
pub struct BiorxivParser {
    base_url: String,
    interval: usize,
}

impl BiorxivParser {
    pub fn new(base_url: impl Into<String>, interval: usize) -> Self {
        Self {
            base_url: base_url.into(),
            interval,
        }
    }
}

impl Default for BiorxivParser {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_INTERVAL)
    }
}

impl Parser for BiorxivParser {
    type Record = Paper;

    /// The API pages by cursor with a fixed window, so `count` is not sent.
    fn build_query_url(&self, start: usize, _count: usize) -> String {
        format!(
            "{}/{start}/{}",
            self.base_url.trim_end_matches('/'),
            self.interval
        )
    }

    fn parse_many(&self, body: &[u8]) -> Result<Vec<Paper>, ParseError> {
        parse_details(body)
    }

    fn source_name(&self) -> &str {
        Source::Biorxiv.as_str()
    }
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    #[serde(default)]
    collection: Option<Vec<DetailsItem>>,
}

#[derive(Debug, Deserialize)]
struct DetailsItem {
    #[serde(default, deserialize_with = "null_to_empty")]
    doi: String,
    #[serde(default, deserialize_with = "null_to_empty")]
    title: String,
    #[serde(default, deserialize_with = "null_to_empty")]
    authors: String,
    #[serde(default, deserialize_with = "null_to_empty")]
    category: String,
    #[serde(default, deserialize_with = "null_to_empty")]
    date: String,
    #[serde(default = "first_version", deserialize_with = "lenient_version")]
    version: u32,
    #[serde(default, deserialize_with = "null_to_empty")]
    jatsxml: String,
    #[serde(default, rename = "abstract", deserialize_with = "null_to_empty")]
    abstract_text: String,
}

impl DetailsItem {
    fn into_paper(self) -> Option<Paper> {
        let doi = non_empty(&self.doi)?;
        let mut paper = Paper::new(Source::Biorxiv, doi.clone());
        paper.doi = Some(doi);
        paper.title = normalize_whitespace(&self.title);
        paper.summary = normalize_whitespace(&self.abstract_text);
        paper.authors = split_authors(&self.authors);
        paper.categories = non_empty(&self.category).into_iter().collect();
        paper.published = parse_day(&self.date);
        paper.updated = paper.published;
        paper.pdf_url = non_empty(&self.jatsxml).map(|url| url.replace(".xml", ".pdf"));
        paper.version = self.version;
        Some(paper)
    }
}

/// `"Doe, J.; Roe, R."` style lists arrive comma separated.
fn split_authors(s: &str) -> Vec<Author> {
    s.split(',').filter_map(non_empty).map(Author::named).collect()
}

fn parse_day(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Parse a details response. Items without a DOI are skipped.
pub fn parse_details(body: &[u8]) -> Result<Vec<Paper>, ParseError> {
    let response: DetailsResponse = serde_json::from_slice(body)
        .map_err(|e| ParseError::new(format!("bioRxiv response: {e}")))?;

    let items = response.collection.unwrap_or_default();
    let total = items.len();
    let papers: Vec<Paper> = items.into_iter().filter_map(DetailsItem::into_paper).collect();
    if papers.len() < total {
        log::debug!("Skipped {} bioRxiv items without DOI", total - papers.len());
    }
    Ok(papers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use papercrawl_core::Record;

    const BODY: &str = r#"{
      "messages": [{"status": "ok", "cursor": 0, "count": 3}],
      "collection": [
        {
          "doi": "10.1101/2024.01.01.573000",
          "title": "Protein  folding\n at scale",
          "authors": "Doe, J.;, Roe, R.,  ",
          "category": "bioinformatics",
          "date": "2024-01-15",
          "version": "2",
          "jatsxml": "https://www.biorxiv.org/content/early/2024/01/15/573000.source.xml",
          "abstract": "  Folding\tproteins. "
        },
        {
          "doi": "10.1101/2024.01.02.573001",
          "title": null,
          "authors": null,
          "date": "sometime",
          "version": 3
        },
        { "doi": "", "title": "orphan" }
      ]
    }"#;

    #[test]
    fn query_url_uses_interval() {
        let parser = BiorxivParser::new("https://api.biorxiv.org/details/biorxiv/", 50);
        assert_eq!(
            parser.build_query_url(300, 100),
            "https://api.biorxiv.org/details/biorxiv/300/50"
        );
        assert_eq!(
            BiorxivParser::default().build_query_url(0, 1),
            "https://api.biorxiv.org/details/biorxiv/0/100"
        );
    }

    #[test]
    fn parses_collection() {
        let papers = BiorxivParser::default().parse_many(BODY.as_bytes()).unwrap();
        assert_eq!(papers.len(), 2);

        let p = &papers[0];
        assert_eq!(p.identifier(), "biorxiv:10.1101/2024.01.01.573000");
        assert_eq!(p.doi.as_deref(), Some("10.1101/2024.01.01.573000"));
        assert_eq!(p.title, "Protein folding at scale");
        assert_eq!(p.summary, "Folding proteins.");
        let names: Vec<_> = p.authors.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Doe", "J.;", "Roe", "R."]);
        assert_eq!(p.categories, vec!["bioinformatics"]);
        assert_eq!(p.version, 2);
        assert_eq!(
            p.pdf_url.as_deref(),
            Some("https://www.biorxiv.org/content/early/2024/01/15/573000.source.pdf")
        );
        let published = p.published.unwrap();
        assert_eq!(published.to_string(), "2024-01-15 00:00:00");
        assert_eq!(p.updated, p.published);
    }

    #[test]
    fn tolerates_nulls_and_bad_dates() {
        let papers = parse_details(BODY.as_bytes()).unwrap();
        let p = &papers[1];
        assert_eq!(p.title, "");
        assert!(p.authors.is_empty());
        assert!(p.published.is_none());
        assert!(p.categories.is_empty());
        assert_eq!(p.version, 3);
    }

    #[test]
    fn missing_collection_is_empty() {
        assert!(parse_details(br#"{"messages":[{"status":"no posts found"}]}"#)
            .unwrap()
            .is_empty());
        assert!(parse_details(br#"{"collection":null}"#).unwrap().is_empty());
    }

    #[test]
    fn rejects_non_json() {
        let err = parse_details(b"<html>502 Bad Gateway</html>").unwrap_err();
        assert!(err.message().starts_with("bioRxiv response"));
    }

    #[test]
    fn version_defaults() {
        let papers = parse_details(br#"{"collection":[{"doi":"d","version":"v?"}]}"#).unwrap();
        assert_eq!(papers[0].version, 1);
        let papers = parse_details(br#"{"collection":[{"doi":"d"}]}"#).unwrap();
        assert_eq!(papers[0].version, 1);
    }
}
