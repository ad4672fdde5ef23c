//! Harvest periodic report documents from a reporting portal.
//!
//! The pipeline walks every (branch, year, month) in the requested range,
//! discovers the report pages of each period, resolves the document whose name
//! contains the requested keyword and downloads it into
//! `DOCUMENT-<KEYWORD>-<timestamp>/<BRANCH>/TAHUN<year>/PERIODE<month>`.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod downloader;
pub mod errors;
pub mod harvest;
pub mod layout;
pub mod models;
pub mod planner;
pub mod resolver;
pub mod session;

#[cfg(test)]
mod test_server;

pub use errors::HarvestError;
