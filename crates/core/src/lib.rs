//! Domain types and pure logic for the CapStudio caption engine.
//!
//! Everything in this crate is IO-free except [`preprocess`], which reads
//! image bytes handed to it by the caller. Network and database access live
//! in `capstudio-vision` and `capstudio-db` respectively.

pub mod config;
pub mod error;
pub mod job;
pub mod parser;
pub mod preprocess;
pub mod prompt;
pub mod status;
pub mod store;
pub mod types;
