//! # corpus-match
//!
//! Finds the passages of a pre-indexed bibliography that relate to a piece
//! of writing. Works on a whole draft (segmented into units, each searched
//! separately, results cached per scope) or on a single conversational
//! question.
//!
//! ## Pipeline
//!
//! ```text
//!   draft text ──► segment ──► units ──► + title/section context
//!                                              │
//!   question ──────────────────────────────────┤
//!                                              ▼
//!                                  bilingual query expansion
//!                                              │ variants
//!                                              ▼
//!                            embed + vector search per variant
//!                                              │
//!                                              ▼
//!                        max fusion by chunk ─► one per item ─► top k
//!                                              │
//!                                              ▼
//!                          threshold, fallback to best 3 if empty
//!                                              │
//!                                              ▼
//!                              listwise LLM rerank (optional)
//!                                              │
//!                     ┌────────────────────────┴───────────────────┐
//!                     ▼                                            ▼
//!            per-scope analysis cache              citation graph + summaries
//!             (whole-document mode)                 (conversational mode)
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration and resolved per-request options
//! - [`models`] - Shared data types: units, recommendations, requests and responses
//! - [`segment`] - Section, paragraph and sentence segmentation; document outline
//! - [`search::expand`] - English/French dictionary query expansion
//! - [`search::retrieval`] - Multi-variant embedding search with threshold and fallback
//! - [`search::fusion`] - Max-similarity fusion across query variants
//! - [`search::vector`] - In-memory vector store with cosine similarity and disk persistence
//! - [`llm`] - Embedding, completion and streaming chat clients; listwise reranking
//! - [`cache`] - Per-scope analysis cache with fingerprint and TTL validity
//! - [`analysis`] - Whole-document analysis with progress and cancellation
//! - [`query`] - Conversational search with citation-graph expansion
//! - [`graph`] - Citation graph and document catalog
//! - [`api`] - Axum HTTP handlers, SSE for analysis progress and chat
//! - [`state`] - Composition root wiring services to their collaborators

pub mod analysis;
pub mod api;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod llm;
pub mod models;
pub mod query;
pub mod search;
pub mod segment;
pub mod state;
