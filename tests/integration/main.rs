//! Integration tests for Sumi-Harvest
//!
//! These tests use wiremock to create mock HTTP servers and drive whole runs
//! through the coordinator against a temporary download folder and database.

mod common;
mod download_tests;
mod hashing_tests;
mod run_tests;
