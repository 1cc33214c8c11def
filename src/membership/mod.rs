mod service;

pub(crate) use service::Placement;
pub use service::{AddSongOutcome, CascadeReport, ListMembershipService};
