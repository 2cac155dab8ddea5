//! Seams between the pipeline and per-source code

use crate::error::{ParseError, SinkError};

/// A parsed item with a stable identity used for deduplication.
pub trait Record: Send + Sync + 'static {
    fn identifier(&self) -> &str;
}

/// Turns a listing page into records for one source.
pub trait Parser: Send + Sync + 'static {
    type Record: Record;

    /// URL for `count` items starting at `start`.
    fn build_query_url(&self, start: usize, count: usize) -> String;

    fn parse_many(&self, body: &[u8]) -> Result<Vec<Self::Record>, ParseError>;

    fn source_name(&self) -> &str;
}

/// Receives every novel record exactly once per run.
///
/// Called concurrently from workers in no particular order.
pub trait Sink<R>: Send + Sync {
    fn deliver(&self, record: &R) -> Result<(), SinkError>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<R, F> Sink<R> for F
where
    F: Fn(&R) -> Result<(), SinkError> + Send + Sync,
{
    fn deliver(&self, record: &R) -> Result<(), SinkError> {
        self(record)
    }

    fn name(&self) -> &str {
        "observer"
    }
}
