mod bus;
mod events;

pub use bus::{MetadataBroadcast, MetadataSubscription, Poll};
pub use events::SongEvent;
