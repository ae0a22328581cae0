//! deckcrawl - resumable decklist crawler.
//!
//! Crawl runs ingest deck references and decklists from an external source
//! one bounded unit of work at a time, checkpointing after each so an
//! interrupted process resumes where it left off.

pub mod cli;
pub mod config;
pub mod crawler;
pub mod models;
pub mod repository;
