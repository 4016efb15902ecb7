//! resume-chunk - Candidate records to searchable chunks
//!
//! This crate turns raw candidate records into typed, independently
//! searchable chunks.
//!
//! # Chunks
//!
//! Each candidate yields one `candidate_summary` chunk, one `position` chunk
//! per work history entry and one `education` chunk per school, in source
//! order.
//!
//! # Example
//!
//! ```rust
//! use resume_chunk::ChunkBuilder;
//! use resume_core::Candidate;
//!
//! let candidate = Candidate {
//!     candidate_id: "c1".to_string(),
//!     location: "Berlin".to_string(),
//!     ..Default::default()
//! };
//! let chunks = ChunkBuilder::new().build(&[candidate]);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].content, "Location: Berlin");
//! ```

mod builder;
mod dataset;
mod dates;

pub use builder::{describe_chunk, ChunkBuilder};
pub use dataset::{load_candidates, parse_candidates};
pub use dates::{format_date, format_end_date};

// Re-export types for convenience
pub use resume_core::{Candidate, Chunk, ChunkKind, ChunkType};
