mod enrichment;
pub mod normalize;
mod registry;
mod tempo_client;
pub mod tuning;

pub use enrichment::{EnrichmentDispatcher, TempoEnricher};
pub use registry::{ResolvedSong, SongDetails, SongRegistry};
pub use tempo_client::SongBpmClient;
