//! # Repositories
//!
//! Row-level persistence operations, kept separate from the domain-level
//! stores that sit on top of them.

pub mod token_record;

pub use token_record::TokenRecordRepository;
