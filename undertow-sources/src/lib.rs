//! Undertow Sources - Embed stream resolution
//!
//! Discovers the hosting servers offered for a movie or TV episode, follows each
//! server's redirect to its embed page and runs an external decoder to turn the
//! embed page into playable stream URLs and subtitle tracks.

#![deny(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![warn(clippy::too_many_lines)]

pub mod decoder;
pub mod directory;
pub mod errors;
pub mod extractor;
pub mod pipeline;
pub mod resolver;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export main types
pub use decoder::{Decoder, DecoderRequest, ProcessDecoder, parse_decoder_output};
pub use directory::{HttpServerDirectory, ListingParser, ServerDirectory};
pub use errors::{DecodeFailure, ErrorKind, SourceError};
pub use extractor::SourceExtractor;
pub use pipeline::SourcePipeline;
pub use resolver::{ServerSelector, SourceResolver};
pub use types::{
    AggregateResult, CatalogId, EmbedSource, EmbedSources, MediaKind, ResolutionOutcome,
    ResolutionReport, ResolvedSource, ServerDescriptor, ServerKind, SubtitleTrack,
};

/// Convenience type alias for Results with SourceError.
pub type Result<T> = std::result::Result<T, SourceError>;
