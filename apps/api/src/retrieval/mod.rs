pub mod cache;
pub mod combiner;
pub mod context;
pub mod encoder;
pub mod handlers;
pub mod index;
pub mod query;
pub mod ranker;
pub mod sections;
pub mod similarity;
