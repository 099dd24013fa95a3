//! Test Helper Utilities
//!
//! Shared utilities for testing walk-tracker

#![allow(dead_code)]

pub mod db_utils;
pub mod fakes;
pub mod log_capture;
pub mod waiting;

pub use db_utils::{create_test_store, TestPipeline};
pub use fakes::{FailingStorage, FakeFetcher, ScriptedSearchClient};
pub use log_capture::LogCapture;
pub use waiting::{wait_for_event, wait_until, WAIT_TIMEOUT};
