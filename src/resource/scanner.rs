//! Backend service scanner
//!
//! Walks every page of a backend service listing in order, decodes each
//! description into tags, and keeps the services the filter accepts. A single
//! undecodable description aborts the whole scan.

use super::filter::ResourceFilter;
use super::tags::{decode, TagMap};
use crate::error::ScanError;
use crate::gcp::client::Endpoints;
use crate::gcp::http::SignedClient;
use async_trait::async_trait;
use futures::stream::{self, Stream, TryStreamExt};
use serde::{Deserialize, Deserializer, Serialize};

/// A backend service as listed by Compute Engine
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendService {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl BackendService {
    /// Tags decoded from the description
    pub fn tags(&self) -> Result<TagMap, ScanError> {
        decode(&self.description).map_err(|source| ScanError::Format {
            id: self.id,
            name: self.name.clone(),
            source,
        })
    }
}

/// Compute encodes uint64 ids as JSON strings; accept plain numbers too.
fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(u64),
        Text(String),
    }

    match Id::deserialize(deserializer)? {
        Id::Number(id) => Ok(id),
        Id::Text(text) => text.parse().map_err(serde::de::Error::custom),
    }
}

/// One page of a listing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendServicePage {
    #[serde(default)]
    pub items: Vec<BackendService>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Source of backend service pages, fetched one at a time.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, page_token: Option<&str>) -> Result<BackendServicePage, ScanError>;
}

/// A matched service. `tags` is `None` when the description is empty, which
/// is distinct from a description decoding to an empty set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanMatch {
    pub id: u64,
    pub name: String,
    pub tags: Option<TagMap>,
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

async fn next_page<S: PageSource + ?Sized>(
    source: &S,
    cursor: Cursor,
) -> Result<Option<(BackendServicePage, Cursor)>, ScanError> {
    let token = match cursor {
        Cursor::Done => return Ok(None),
        Cursor::Start => None,
        Cursor::Next(token) => Some(token),
    };

    let mut page = source.fetch_page(token.as_deref()).await?;
    let cursor = match page.next_page_token.take() {
        Some(token) if !token.is_empty() => Cursor::Next(token),
        _ => Cursor::Done,
    };

    Ok(Some((page, cursor)))
}

/// Lazily fetched pages, in listing order
pub fn pages<S: PageSource + ?Sized>(
    source: &S,
) -> impl Stream<Item = Result<BackendServicePage, ScanError>> + '_ {
    stream::try_unfold(Cursor::Start, move |cursor| next_page(source, cursor))
}

/// Scan every page and return the matches in encounter order.
pub async fn scan<S: PageSource + ?Sized>(
    source: &S,
    filter: &ResourceFilter,
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<Vec<ScanMatch>, ScanError> {
    let pages = pages(source);
    futures::pin_mut!(pages);

    let mut matches = Vec::new();
    let mut page_count = 0usize;
    let mut seen = 0usize;

    loop {
        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScanError::Cancelled),
            page = pages.try_next() => page?,
        };
        let Some(page) = page else { break };
        page_count += 1;

        for service in page.items {
            seen += 1;
            let tags = service.tags()?;
            if !filter.matches(&service.name, &tags) {
                continue;
            }

            let tags = if service.description.is_empty() {
                None
            } else {
                Some(tags)
            };
            matches.push(ScanMatch {
                id: service.id,
                name: service.name,
                tags,
            });
        }
    }

    tracing::info!(
        pages = page_count,
        scanned = seen,
        matched = matches.len(),
        "Backend service scan complete"
    );

    Ok(matches)
}

/// Pages from the Compute Engine `backendServices.list` call
pub struct ComputeBackendServices<C> {
    client: C,
    url: String,
}

impl<C: SignedClient> ComputeBackendServices<C> {
    pub fn new(client: C, endpoints: &Endpoints, project: &str) -> Self {
        Self {
            client,
            url: endpoints.backend_services_url(project),
        }
    }
}

#[async_trait]
impl<C: SignedClient> PageSource for ComputeBackendServices<C> {
    async fn fetch_page(&self, page_token: Option<&str>) -> Result<BackendServicePage, ScanError> {
        let mut query = Vec::new();
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let reply = self
            .client
            .get(&self.url, &query)
            .await
            .map_err(|source| ScanError::Transport {
                url: self.url.clone(),
                source,
            })?;

        if !reply.is_ok() {
            return Err(ScanError::Response {
                url: self.url.clone(),
                status: reply.status,
                body: reply.body,
            });
        }

        serde_json::from_str(&reply.body).map_err(|source| ScanError::Decode {
            url: self.url.clone(),
            source,
        })
    }
}
