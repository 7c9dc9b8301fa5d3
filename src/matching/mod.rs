pub mod candidates;
pub mod classifier;
pub mod scoring;
