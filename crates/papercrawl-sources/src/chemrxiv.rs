//! ChemRxiv public API parser

use chrono::NaiveDateTime;
use papercrawl_core::{ParseError, Parser};
use serde::Deserialize;

use crate::de::{first_version, lenient_version, null_to_empty, null_to_empty_vec};
use crate::paper::{Author, Paper, Source, non_empty, normalize_whitespace};

pub const DEFAULT_BASE_URL: &str = "https://chemrxiv.org/engage/chemrxiv/public-api/v1/items";
pub const DEFAULT_PAGE_SIZE: usize = 100;

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

#[derive(Debug, Clone)]
pub struct ChemRxivParser {
    base_url: String,
    page_size: usize,
    order_by: String,
}

impl ChemRxivParser {
    pub fn new(base_url: impl Into<String>, page_size: usize) -> Self {
        Self {
            base_url: base_url.into(),
            page_size,
            order_by: "publishedDate".into(),
        }
    }

    pub fn with_order(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = order_by.into();
        self
    }
}

impl Default for ChemRxivParser {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE)
    }
}

impl Parser for ChemRxivParser {
    type Record = Paper;

    /// Page length is fixed by configuration; `count` is not sent.
    fn build_query_url(&self, start: usize, _count: usize) -> String {
        format!(
            "{}?limit={}&skip={start}&orderBy={}",
            self.base_url, self.page_size, self.order_by
        )
    }

    fn parse_many(&self, body: &[u8]) -> Result<Vec<Paper>, ParseError> {
        parse_items(body)
    }

    fn source_name(&self) -> &str {
        Source::Chemrxiv.as_str()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemsResponse {
    #[serde(default, deserialize_with = "null_to_empty_vec")]
    item_hits: Vec<ItemHit>,
}

#[derive(Debug, Deserialize)]
struct ItemHit {
    item: Option<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    #[serde(default, deserialize_with = "null_to_empty")]
    id: String,
    #[serde(default, deserialize_with = "null_to_empty")]
    title: String,
    #[serde(default, deserialize_with = "null_to_empty")]
    doi: String,
    #[serde(default, deserialize_with = "null_to_empty")]
    description: String,
    #[serde(default, deserialize_with = "null_to_empty_vec")]
    authors: Vec<ItemAuthor>,
    #[serde(default, deserialize_with = "null_to_empty_vec")]
    categories: Vec<Category>,
    #[serde(default, deserialize_with = "null_to_empty")]
    published_date: String,
    #[serde(default, deserialize_with = "null_to_empty")]
    updated_date: String,
    #[serde(default, deserialize_with = "null_to_empty")]
    pdf_url: String,
    #[serde(default = "first_version", deserialize_with = "lenient_version")]
    version: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemAuthor {
    #[serde(default, deserialize_with = "null_to_empty")]
    first_name: String,
    #[serde(default, deserialize_with = "null_to_empty")]
    last_name: String,
    #[serde(default, deserialize_with = "null_to_empty")]
    affiliation: String,
    #[serde(default, deserialize_with = "null_to_empty")]
    orcid: String,
}

/// Categories arrive either as plain names or as `{"name": ...}` objects
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Category {
    Name(String),
    Object {
        #[serde(default, deserialize_with = "null_to_empty")]
        name: String,
    },
}

impl Category {
    fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Object { name } => name,
        }
    }
}

impl Item {
    fn into_paper(self) -> Option<Paper> {
        let id = non_empty(&self.id)?;
        let mut paper = Paper::new(Source::Chemrxiv, id);
        paper.title = normalize_whitespace(&self.title);
        paper.summary = normalize_whitespace(&self.description);
        paper.doi = non_empty(&self.doi);
        paper.authors = self
            .authors
            .into_iter()
            .map(|a| Author {
                name: normalize_whitespace(&format!("{} {}", a.first_name, a.last_name)),
                affiliation: non_empty(&a.affiliation),
                orcid: non_empty(&a.orcid),
            })
            .filter(|a| !a.name.is_empty())
            .collect();
        paper.categories = self
            .categories
            .iter()
            .filter_map(|c| non_empty(c.name()))
            .collect();
        paper.published = parse_timestamp(&self.published_date);
        paper.updated = parse_timestamp(&self.updated_date);
        paper.pdf_url = non_empty(&self.pdf_url);
        paper.version = self.version;
        Some(paper)
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    match NaiveDateTime::parse_from_str(s, DATE_FORMAT) {
        Ok(dt) => Some(dt),
        Err(e) => {
            log::debug!("Unparseable ChemRxiv date '{s}': {e}");
            None
        }
    }
}

/// Parse an items response. Hits without an item or id are skipped.
pub fn parse_items(body: &[u8]) -> Result<Vec<Paper>, ParseError> {
    let response: ItemsResponse = serde_json::from_slice(body)
        .map_err(|e| ParseError::new(format!("ChemRxiv response: {e}")))?;

    Ok(response
        .item_hits
        .into_iter()
        .filter_map(|hit| hit.item)
        .filter_map(Item::into_paper)
        .collect())
}
