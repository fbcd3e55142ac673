//! # Burn Sequence Labeling
//!
//! Word-level sequence labeling (such as named entity recognition) on top of pretrained BERT
//! encoders, decoded with a CRF, a partial CRF, or a per-word argmax, and optionally trained
//! with a multi-view consistency loss.
#![forbid(unsafe_code)]

/// Models
pub mod models;

/// Pipelines
pub mod pipelines;

/// Datasets
pub mod datasets;

/// Reusable neural network modules
pub mod modules;

/// Utilities
pub mod utils;

/// CLI indexes and utilities
pub mod cli;

/// Error macros
#[macro_use]
extern crate anyhow;
