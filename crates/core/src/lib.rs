//! Shared primitives for the nzbflow import pipeline.
//!
//! This crate has no internal dependencies so it can be used by the
//! repository layer and by any worker or prober tooling alike.

pub mod retry;
pub mod search;
pub mod types;
