//! facegate-client — HTTP client for the face recognition backend.
//!
//! Implements [`facegate_core::FaceBackend`] over multipart uploads. Every
//! call is a single request; retry policy lives in the poller.

pub mod client;

pub use client::{ClientError, HttpBackend};
