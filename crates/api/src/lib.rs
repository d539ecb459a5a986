//! HTTP API: routing and request/response mapping for the job layer.
//!
//! This crate is the boundary the presentation layer talks to. It carries no
//! authentication; submitter identity belongs to whatever fronts this
//! service.

pub mod app;
