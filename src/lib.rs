// src/lib.rs

pub mod config;
pub mod error;
pub mod events;
pub mod livebook;
pub mod matching;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod storage;
pub mod utils;
