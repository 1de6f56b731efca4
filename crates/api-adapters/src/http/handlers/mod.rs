pub mod ops;
pub mod reviews;
pub mod search;
pub mod sites;
