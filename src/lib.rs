//! Sonae - Disaster-supply stock recommendations for household teams.
//!
//! # Overview
//!
//! A team records the supplies it keeps (water, food, medicine, batteries...).
//! Sonae compares every item against a per-category consumption catalog scaled
//! to the team's household, and judges whether the stock lasts the team's
//! chosen number of days. Once a week it pushes a digest of what is out, what
//! is running low and what expires soon to every linked team member.
//!
//! # Modules
//!
//! - [`catalog`]: Consumption rates, stock-level presets and expiry classes
//! - [`calculator`]: Per-item stock status
//! - [`aggregation`]: Team-wide reports and level progress
//! - [`model`]: Records, settings and response types
//! - [`storage`]: SQLite storage layer
//! - [`push`]: Push-notification provider client
//! - [`notifier`]: Weekly digest batch job
//! - [`config`]: Environment configuration
//! - [`api`]: HTTP API handlers

pub mod aggregation;
pub mod api;
pub mod calculator;
pub mod catalog;
pub mod config;
pub mod model;
pub mod notifier;
pub mod push;
pub mod storage;
