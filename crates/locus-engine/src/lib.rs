pub mod backend;
pub mod config;
pub mod fingerprint;
pub mod hidden_parent;
pub mod matcher;
pub mod normalizer;
pub mod resolution;
pub mod scoring;
pub mod selection;
pub mod xpath;

pub use locus_common::error_mapping;
pub use locus_common::protocol;
