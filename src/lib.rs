//! # mod-indexer
//!
//! Indexes the compiled bytecode of game mods: which game classes, fields,
//! methods and annotations each mod uses, its class hierarchy and the data
//! tags and enum extensions it ships.
//!
//! ## Architecture
//!
//! - **bytecode** / **descriptor**: class-file primitives
//! - **index**: single-pass class walker producing a `ClassRecord`
//! - **annotation**: annotation values and their canonical form
//! - **sanitize**: composable rules pruning noisy class data
//! - **artifact** / **tags** / **enums** / **version**: reading mod jars and their metadata
//! - **identity** / **expand** / **resolve**: deduplicating mods and bundled jars
//! - **limiter**: live-resizable concurrency shares across batches
//! - **aggregate**: per-mod reference multiset and transactional commit
//! - **store** / **lmdb**: storage contract and its LMDB implementation
//! - **platform** / **download**: marketplace backends and the download cache
//! - **pipeline**: batch orchestration
//! - **progress** / **schema**: reporting and analytics table descriptions

pub mod aggregate;
pub mod annotation;
pub mod artifact;
pub mod bytecode;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod download;
pub mod enums;
pub mod error;
pub mod expand;
pub mod identity;
pub mod index;
pub mod limiter;
pub mod lmdb;
pub mod pipeline;
pub mod platform;
pub mod progress;
pub mod record;
pub mod resolve;
pub mod sanitize;
pub mod schema;
pub mod store;
pub mod tags;
pub mod version;

#[cfg(test)]
mod classgen;
