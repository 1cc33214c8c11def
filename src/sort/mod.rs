mod policy;

pub use policy::{sort_by_tuning, sort_catalog, SortMode, TuningRotation};
