//! # services
//!
//! The campsite core: geohash indexing, proximity refinement, search
//! planning, and review aggregation. Services receive their store handles by
//! injection and hold no process-wide state.

pub mod consistency;
pub mod geohash;
pub mod proximity;
pub mod reviews;
pub mod search;
pub mod sites;
pub mod utils;

pub use reviews::{ReviewPolicy, ReviewService};
pub use search::{SearchLimits, SearchService};
pub use sites::SiteService;
pub use utils::{OriginHasher, Pagination};
