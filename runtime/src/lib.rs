// Copyright 2026 Cortex Contributors
// SPDX-License-Identifier: Apache-2.0

//! pitchscrape runtime library: browser sessions, retries, bounded
//! concurrency, and run orchestration for the match scraper.
//!
//! This library crate exposes the engine for the binary and for
//! integration testing.

pub mod cli;
pub mod config;
pub mod live;
pub mod orchestrator;
pub mod pool;
pub mod progress;
pub mod renderer;
pub mod retry;
pub mod site;
