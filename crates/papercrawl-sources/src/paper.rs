//! Normalized paper record shared by all sources

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use papercrawl_core::Record;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Arxiv,
    Biorxiv,
    Chemrxiv,
}

impl Source {
    pub const ALL: [Source; 3] = [Self::Arxiv, Self::Biorxiv, Self::Chemrxiv];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Arxiv => "arxiv",
            Self::Biorxiv => "biorxiv",
            Self::Chemrxiv => "chemrxiv",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "arxiv" => Ok(Self::Arxiv),
            "biorxiv" => Ok(Self::Biorxiv),
            "chemrxiv" => Ok(Self::Chemrxiv),
            other => Err(format!("unknown source '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Author {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orcid: Option<String>,
}

impl Author {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// One paper. Identity is `(source, id)`, exposed as `"{source}:{id}"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paper {
    #[serde(skip)]
    key: String,
    id: String,
    source: Source,
    pub title: String,
    pub summary: String,
    pub authors: Vec<Author>,
    pub doi: Option<String>,
    pub pdf_url: Option<String>,
    pub categories: Vec<String>,
    pub published: Option<NaiveDateTime>,
    pub updated: Option<NaiveDateTime>,
    pub version: u32,
}

impl Paper {
    pub fn new(source: Source, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            key: format!("{source}:{id}"),
            id,
            source,
            title: String::new(),
            summary: String::new(),
            authors: Vec::new(),
            doi: None,
            pdf_url: None,
            categories: Vec::new(),
            published: None,
            updated: None,
            version: 1,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> Source {
        self.source
    }
}

impl Record for Paper {
    fn identifier(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for Paper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\" ({} authors)", self.key, self.title, self.authors.len())
    }
}

/// Collapse whitespace runs to single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `Some(s)` unless blank.
pub(crate) fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}
