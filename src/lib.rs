//! Evaluation tooling for human-object interaction detection: detection
//! preprocessing, box-pair scoring and V-COCO result caches.

pub mod association;
pub mod boxes;
pub mod cache;
pub mod config;
pub mod detection;
pub mod meter;
pub mod models;
pub mod output;
pub mod runner;
pub mod vcoco;
