pub mod extractor;
pub mod platform;
pub mod resolver;
pub mod spotify;

pub use extractor::{ExtractMode, ExtractedEntry, ExtractionResult, Extractor, YtDlpExtractor};
pub use platform::Platform;
pub use resolver::{MetadataExpander, SourceResolver};
pub use spotify::SpotifyResolver;
