//! Test module for focusdeck-core
//!
//! This module contains tests for:
//! - Configuration parsing, defaults, unknown-field detection and game checks
//! - Process start/stop semantics against an in-memory process table
//! - Integration adapters against loopback protocol endpoints
//! - Session building, action resolution and startup/shutdown sequences

mod adapter_tests;
mod fixtures;
