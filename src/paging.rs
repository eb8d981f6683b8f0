use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::transport::{TransportRequest, TransportResponse};

/// Resume markers keyed by name, e.g. `NextPartitionKey`.
pub type Markers = BTreeMap<String, String>;

/// Bridge to the serialization layer for paginated listings.
///
/// The pipeline never interprets markers; it only asks the scheme to find them in a successful
/// response and to replay them on the request that resumes the listing.
pub trait PagingScheme: Send + Sync + fmt::Debug {
    /// Resume markers carried by `response`; empty when the listing is complete.
    fn extract(&self, response: &TransportResponse) -> Markers;

    /// Adds `markers` to the request that fetches the next page.
    fn apply(&self, markers: &Markers, request: &mut TransportRequest);
}

pub const CONTINUATION_HEADER_PREFIX: &str = "x-ms-continuation-";

/// Markers travel as `x-ms-continuation-<Name>` response headers and are replayed as `<Name>`
/// query parameters.
#[derive(Debug, Clone)]
pub struct HeaderPaging {
    names: Vec<String>,
}

impl HeaderPaging {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Entity queries.
    pub fn entities() -> Self {
        Self::new(["NextPartitionKey", "NextRowKey"])
    }

    /// Table listings.
    pub fn tables() -> Self {
        Self::new(["NextTableName"])
    }
}

impl PagingScheme for HeaderPaging {
    fn extract(&self, response: &TransportResponse) -> Markers {
        self.names
            .iter()
            .filter_map(|name| {
                let header = format!("{CONTINUATION_HEADER_PREFIX}{}", name.to_ascii_lowercase());
                let value = response.headers.get(header.as_str())?.to_str().ok()?;
                (!value.is_empty()).then(|| (name.clone(), value.to_string()))
            })
            .collect()
    }

    fn apply(&self, markers: &Markers, request: &mut TransportRequest) {
        let pairs: Vec<(&str, &str)> = self
            .names
            .iter()
            .filter_map(|name| Some((name.as_str(), markers.get(name)?.as_str())))
            .collect();
        if !pairs.is_empty() {
            request.url.query_pairs_mut().extend_pairs(pairs);
        }
    }
}

type MarkerParser = dyn Fn(&[u8]) -> Option<String> + Send + Sync;

/// A single marker parsed out of the response body and replayed as a query parameter.
#[derive(Clone)]
pub struct BodyMarkerPaging {
    marker_name: String,
    query_param: String,
    parse: Arc<MarkerParser>,
}

pub const NEXT_MARKER: &str = "NextMarker";

impl BodyMarkerPaging {
    pub fn new<F>(marker_name: impl Into<String>, query_param: impl Into<String>, parse: F) -> Self
    where
        F: Fn(&[u8]) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            marker_name: marker_name.into(),
            query_param: query_param.into(),
            parse: Arc::new(parse),
        }
    }

    /// Container and blob listings: `<NextMarker>` element, replayed as `marker=`.
    pub fn next_marker() -> Self {
        Self::new(NEXT_MARKER, "marker", |body| {
            xml_element_text(body, NEXT_MARKER)
        })
    }
}

impl fmt::Debug for BodyMarkerPaging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyMarkerPaging")
            .field("marker_name", &self.marker_name)
            .field("query_param", &self.query_param)
            .finish_non_exhaustive()
    }
}

impl PagingScheme for BodyMarkerPaging {
    fn extract(&self, response: &TransportResponse) -> Markers {
        (self.parse)(&response.body)
            .filter(|marker| !marker.is_empty())
            .map(|marker| Markers::from([(self.marker_name.clone(), marker)]))
            .unwrap_or_default()
    }

    fn apply(&self, markers: &Markers, request: &mut TransportRequest) {
        if let Some(value) = markers.get(&self.marker_name) {
            request
                .url
                .query_pairs_mut()
                .append_pair(&self.query_param, value);
        }
    }
}

/// Text of the first `<tag>...</tag>` element. Self-closing `<tag />` yields `None`.
fn xml_element_text(body: &[u8], tag: &str) -> Option<String> {
    let text = std::str::from_utf8(body).ok()?;
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let end = start + text[start..].find(&close)?;
    let value = text[start..end].trim();
    (!value.is_empty()).then(|| value.to_string())
}
