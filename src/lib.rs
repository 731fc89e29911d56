//! Price Harvester - per-model phone price and launch-date scraping
//!
//! Reads a list of phone model names, finds each model's product pages on a
//! retail site, and reports the lowest and highest selling price with the
//! highest reference (MRP) price seen. A second pipeline looks up launch
//! dates on a specification reference site. Runs checkpoint their progress
//! so they can be resumed after an interruption.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod test_utils;
