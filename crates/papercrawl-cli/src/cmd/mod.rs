//! Subcommands

pub mod crawl;
