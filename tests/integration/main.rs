//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and tempfile
//! destinations to exercise full crawls end-to-end.

mod archive_tests;
mod common;
mod crawl_tests;
mod resume_tests;
