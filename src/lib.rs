//! # Story2Test
//!
//! Turns a Software Requirements Specification (SRS) and a user story into
//! structured test cases with Selenium scripts.
//!
//! Uploaded documents are checked for an SRS marker, chunked, and embedded
//! into an in-memory vector index. Each user story is answered by a
//! retrieval-augmented chat session, and the free-text answer is parsed into
//! test case records that are packaged as scripts, a zip archive, and a
//! combined text download.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌───────────┐   ┌─────────┐
//! │  Loader   │──▶│ Chunker  │──▶│  Index    │──▶│ Session │
//! │ PDF / TXT │   │ overlap  │   │ embedding │   │ + oracle│
//! └───────────┘   └──────────┘   └───────────┘   └────┬────┘
//!                                                     │ answer
//!                                  ┌──────────┐   ┌───▼─────┐
//!                                  │ Packager │◀──│  Cases  │
//!                                  │ zip/txt  │   │ parser  │
//!                                  └──────────┘   └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=...
//! s2t generate --doc srs.pdf --story "As a shopper I want to..." --count 3
//! s2t chat --doc srs.pdf          # follow-up questions keep history
//! s2t serve                       # HTTP API on [server].bind
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF and plain-text extraction |
//! | [`loader`] | SRS marker check and text assembly |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory vector index |
//! | [`oracle`] | Chat-completion provider abstraction |
//! | [`prompt`] | System and condense prompt templates |
//! | [`session`] | Retrieval-augmented conversation |
//! | [`cases`] | Test case extraction from answers |
//! | [`package`] | Scripts, archive, and text download |
//! | [`runner`] | Opt-in sandboxed script execution |
//! | [`pipeline`] | End-to-end orchestration |
//! | [`server`] | HTTP API |
//! | [`error`] | Pipeline error taxonomy |
//! | [`logging`] | Tracing subscriber setup |

pub mod cases;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod loader;
pub mod logging;
pub mod models;
pub mod oracle;
pub mod package;
pub mod pipeline;
pub mod prompt;
pub mod runner;
pub mod server;
pub mod session;
