//! # staffdex
//!
//! An employee directory backend: document ingestion with OCR fallback,
//! full-text indexing, and federated search across employees and their
//! documents.
//!
//! ## Pipeline
//!
//! Uploaded documents land as raw blobs plus a record row with null pipeline
//! fields. A processing pass then classifies each document, extracts its
//! text (PDF, Word, plain text), runs OCR when the text layer looks like a
//! scan, detects the dominant language, stamps the record, and publishes a
//! denormalized projection to the full-text index.
//!
//! ## Search
//!
//! One query fans out to the employee and document index partitions in
//! parallel; document hits are folded under their owning employee and the
//! merged list is ranked, filtered, and paginated.

pub mod classify;
pub mod config;
pub mod db;
pub mod employees;
pub mod extract;
pub mod get;
pub mod index;
pub mod language;
pub mod migrate;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod search;
pub mod storage;
