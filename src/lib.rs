// src/lib.rs

//! kita-watch library
//!
//! Polls the Berlin daycare directory's free places page, rebuilds the
//! listings from the table markup, compares them with the previous poll and
//! reports newly available places that match the configured schedule.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
