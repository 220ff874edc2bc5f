// src/lib.rs

//! Student Portal Scraper Library

pub mod cache;
pub mod context;
pub mod error;
pub mod http;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod utils;

#[cfg(test)]
mod testing;
