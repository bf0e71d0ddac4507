//! Diagnostic pipeline engine for Markdown-to-PDF compile failures.
//!
//! A single [`DiagnosticJob`] flows through four isolated stage workers
//! under a fail-fast orchestrator: conversion and compilation, compile-log
//! investigation, remedy mapping, and report assembly. Each stage runs as
//! its own process via the worker invocation protocol, so a crash in one
//! stage cannot corrupt another's state.
//!
//! # Main entry points
//!
//! - [`orchestrator::Orchestrator`] — drives a job through the stage
//!   workers, deciding after each stage which stage runs next.
//! - [`stages::run_stage`] — runs one stage body in-process; the worker
//!   binary calls this after deserializing the job from stdin.
//! - [`classify::classify_log`] — the log classification engine, usable
//!   standalone over raw compiler output.
//!
//! # Example
//!
//! ```
//! use md_triage_core::ErrorSignature;
//! use md_triage_pipeline::classify::classify_log;
//!
//! let log = "! Undefined control sequence.\nl.42 \\badmacro\n";
//! let result = classify_log(log);
//! assert_eq!(result.signature, ErrorSignature::UndefinedControlSequence);
//! assert_eq!(result.source_line, Some(42));
//! ```
//!
//! [`DiagnosticJob`]: md_triage_core::DiagnosticJob

pub mod classify;
pub mod error;
pub mod orchestrator;
pub mod remedy;
pub mod scratch;
pub mod specialist;
pub mod specialists;
pub mod stages;
pub mod tools;
pub mod worker;

pub use error::{PipelineError, Result};
