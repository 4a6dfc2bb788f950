//! Test helpers module
//!
//! This module provides utilities and helpers for testing the StudyGroupFinder
//! services: an in-memory test context, generated test data and a PostgreSQL
//! database helper backed by testcontainers.

#![allow(dead_code)]

pub mod database_helper;
pub mod test_context;
pub mod test_data;

pub use database_helper::*;
pub use test_context::*;
pub use test_data::*;
