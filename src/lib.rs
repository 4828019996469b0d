// src/lib.rs

//! E-invoicing Watch Library
//!
//! Crawls a government website for e-invoicing publications, keeping a
//! page cache so repeated runs only refetch new or stale pages.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;
