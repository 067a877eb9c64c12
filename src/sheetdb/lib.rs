//! # SheetDb Architecture
//!
//! SheetDb gives a spreadsheet worksheet the interface of a document
//! collection: rows are documents, columns are fields, and rows are found,
//! inserted, updated and removed with MongoDB-style query and update
//! documents.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CLI (main.rs + args.rs)                                    │
//! │  - Parses arguments and JSON documents, prints JSON lines   │
//! │  - The ONLY place that knows about stdout/stderr/exit codes │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Facades (spreadsheet.rs, worksheet.rs)                     │
//! │  - Spreadsheet: worksheet lookup, create, drop, token       │
//! │  - Worksheet: find / insert / update / remove               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Commands (commands/*.rs)          Query (query/)           │
//! │  - One module per operation        - Filter parse/compile   │
//! │  - Sequence columns, queries,      - In-memory matching     │
//! │    windowing and writes            - Update descriptors     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Data access (client.rs, cache.rs)                          │
//! │  - Types raw cells, batches writes, caches reads            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Storage (store/)                                           │
//! │  - SheetBackend trait: one method per service request       │
//! │  - InMemorySheets (testing), FileSheets (CLI)               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## How a find runs
//!
//! The filter document is parsed into a [`query::Filter`]. The part of it the
//! backend understands is compiled to a structured query string and sent with
//! the request; the backend may return more rows than asked for, never fewer.
//! Skip and limit are applied in backend order, then the full filter is
//! evaluated against each remaining row.
//!
//! Mutations reuse `find`: `update` applies the update to the matched rows and
//! writes them back by identity, `remove` deletes the matched rows from the
//! bottom of the sheet up, because deleting a row renumbers every row below it.
//!
//! ## Testing Strategy
//!
//! Commands, the client and the facades are tested against
//! [`store::memory::InMemorySheets`], which records every request and can be
//! told to fail specific ones. The CLI is tested end to end over a temporary
//! data file.
//!
//! ## Module Overview
//!
//! - [`spreadsheet`], [`worksheet`]: the entry points
//! - [`commands`]: find, insert, update, remove and column management
//! - [`query`]: filter and update documents
//! - [`client`]: data access with batching and caching
//! - [`cache`]: the response cache
//! - [`store`]: backend abstraction and local backends
//! - [`model`]: rows, values and sheet metadata
//! - [`coerce`]: typing of raw cell text
//! - [`config`]: configuration management
//! - [`error`]: error types

pub mod cache;
pub mod client;
pub mod coerce;
pub mod commands;
pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod spreadsheet;
pub mod store;
pub mod worksheet;
