//! arXiv Atom feed parser using quick-xml

use chrono::NaiveDateTime;
use papercrawl_core::{ParseError, Parser};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::paper::{Author, Paper, Source, non_empty, normalize_whitespace};

pub const DEFAULT_BASE_URL: &str = "http://export.arxiv.org/api/query";

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

type XmlResult<T> = Result<T, quick_xml::Error>;

#[derive(Debug, Clone)]
pub struct ArxivParser {
    base_url: String,
    search_query: String,
    sort_by: String,
    sort_order: String,
}

impl ArxivParser {
    pub fn new(base_url: impl Into<String>, search_query: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            search_query: search_query.into(),
            sort_by: "submittedDate".into(),
            sort_order: "descending".into(),
        }
    }

    pub fn with_sort(mut self, sort_by: impl Into<String>, sort_order: impl Into<String>) -> Self {
        self.sort_by = sort_by.into();
        self.sort_order = sort_order.into();
        self
    }
}

impl Parser for ArxivParser {
    type Record = Paper;

    fn build_query_url(&self, start: usize, count: usize) -> String {
        format!(
            "{}?search_query={}&start={start}&max_results={count}&sortBy={}&sortOrder={}",
            self.base_url, self.search_query, self.sort_by, self.sort_order
        )
    }

    fn parse_many(&self, body: &[u8]) -> Result<Vec<Paper>, ParseError> {
        parse_feed(body)
    }

    fn source_name(&self) -> &str {
        Source::Arxiv.as_str()
    }
}

/// Fields of one `<entry>` as they appear in the feed
#[derive(Debug, Default)]
struct RawEntry {
    id: String,
    title: String,
    summary: String,
    authors: Vec<String>,
    primary_category: Option<String>,
    published: String,
    updated: String,
    pdf_url: Option<String>,
}

impl RawEntry {
    fn into_paper(self) -> Option<Paper> {
        let id = extract_id(self.id.trim())?;
        let mut paper = Paper::new(Source::Arxiv, id);
        paper.title = normalize_whitespace(&self.title);
        paper.summary = normalize_whitespace(&self.summary);
        paper.authors = self
            .authors
            .iter()
            .filter_map(|name| non_empty(name))
            .map(Author::named)
            .collect();
        paper.categories = self.primary_category.into_iter().collect();
        paper.published = parse_date(&self.published);
        paper.updated = parse_date(&self.updated);
        paper.pdf_url = self.pdf_url;
        Some(paper)
    }
}

/// `http://arxiv.org/abs/hep-th/9901001v1` → `hep-th/9901001v1`
fn extract_id(raw: &str) -> Option<String> {
    let id = match raw.split_once("/abs/") {
        Some((_, rest)) => rest,
        None => raw.rsplit('/').next().unwrap_or(raw),
    };
    non_empty(id)
}

fn parse_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    match NaiveDateTime::parse_from_str(s, DATE_FORMAT) {
        Ok(dt) => Some(dt),
        Err(e) => {
            log::debug!("Unparseable arXiv date '{s}': {e}");
            None
        }
    }
}

/// Parse an Atom feed into papers. Entries without an id are skipped.
pub fn parse_feed(xml: &[u8]) -> Result<Vec<Paper>, ParseError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut papers = Vec::new();
    let mut saw_feed = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"feed" => saw_feed = true,
            Ok(Event::Start(e)) if e.name().as_ref() == b"entry" => {
                let entry = parse_entry(&mut reader)
                    .map_err(|e| ParseError::new(format!("arXiv entry: {e}")))?;
                match entry.into_paper() {
                    Some(paper) => papers.push(paper),
                    None => log::debug!("Skipping arXiv entry without id"),
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::new(format!("arXiv feed: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    if !saw_feed {
        return Err(ParseError::new("arXiv response is not an Atom feed"));
    }
    Ok(papers)
}

fn parse_entry(reader: &mut Reader<&[u8]>) -> XmlResult<RawEntry> {
    let mut entry = RawEntry::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"id" => entry.id = read_text(reader)?,
                b"title" => entry.title = read_text(reader)?,
                b"summary" => entry.summary = read_text(reader)?,
                b"published" => entry.published = read_text(reader)?,
                b"updated" => entry.updated = read_text(reader)?,
                b"author" => {
                    if let Some(name) = parse_author(reader)? {
                        entry.authors.push(name);
                    }
                }
                other => {
                    apply_empty(&e, &mut entry)?;
                    skip_element(reader, other)?;
                }
            },
            Event::Empty(e) => apply_empty(&e, &mut entry)?,
            Event::End(e) if e.name().as_ref() == b"entry" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(entry)
}

/// Attribute-only elements: `<link title="pdf">` and `<arxiv:primary_category>`
fn apply_empty(e: &BytesStart<'_>, entry: &mut RawEntry) -> XmlResult<()> {
    match e.name().as_ref() {
        b"link" => {
            if attr(e, b"title")?.as_deref() == Some("pdf") {
                entry.pdf_url = attr(e, b"href")?.and_then(|h| non_empty(&h));
            }
        }
        b"arxiv:primary_category" => {
            entry.primary_category = attr(e, b"term")?.and_then(|t| non_empty(&t));
        }
        _ => {}
    }
    Ok(())
}

fn parse_author(reader: &mut Reader<&[u8]>) -> XmlResult<Option<String>> {
    let mut buf = Vec::new();
    let mut name = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"name" => name = Some(read_text(reader)?),
                other => skip_element(reader, other)?,
            },
            Event::End(e) if e.name().as_ref() == b"author" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(name)
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> XmlResult<Option<String>> {
    match e.try_get_attribute(name)? {
        Some(a) => Ok(Some(a.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn skip_element(reader: &mut Reader<&[u8]>, end_tag: &[u8]) -> XmlResult<()> {
    let mut buf = Vec::new();
    let mut depth = 1;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(_) => depth += 1,
            Event::End(e) => {
                depth -= 1;
                if depth == 0 && e.name().as_ref() == end_tag {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

/// Read text content until the matching end tag, flattening nested markup
fn read_text(reader: &mut Reader<&[u8]>) -> XmlResult<String> {
    let mut buf = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(&e.unescape()?);
            }
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e)),
            Event::Start(_) => text.push_str(&read_text(reader)?),
            Event::End(_) => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}
