//! Tagged resource lookup
//!
//! Load balancer backend services have no labels, so tags are kept in their
//! description field. This module decodes those tags and selects services
//! against a caller's filter.
//!
//! # Architecture
//!
//! - [`tags`] - encode/decode between a tag map and a description string
//! - [`filter`] - name and tag matching
//! - [`scanner`] - walks paged listings and collects matches
//!
//! # Example
//!
//! ```ignore
//! use stgcp::resource::{scan, ComputeBackendServices, ResourceFilter, tags};
//!
//! async fn core_services(http: GcpHttpClient, endpoints: &Endpoints) -> Result<Vec<ScanMatch>, ScanError> {
//!     let source = ComputeBackendServices::new(http, endpoints, "my-project");
//!     let filter = ResourceFilter::new().with_tags(tags::decode("Team:Core")?);
//!     scan(&source, &filter, &CancellationToken::new()).await
//! }
//! ```

pub mod filter;
pub mod scanner;
pub mod tags;

pub use filter::ResourceFilter;
pub use scanner::{
    pages, scan, BackendService, BackendServicePage, ComputeBackendServices, PageSource, ScanMatch,
};
pub use tags::TagMap;
