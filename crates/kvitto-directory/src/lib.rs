//! Location/device directory: TTL-cached provider snapshots, fuzzy
//! location mapping, and device activity views.

pub mod activity;
pub mod cache;
pub mod mapping;
pub mod similarity;

pub use activity::{activity_report, ActivityReport, DeviceActivity};
pub use cache::{Directory, DirectoryStats};
pub use mapping::{map_locations, InternalLocation, MappingOutcome};
pub use similarity::{address_similarity, name_similarity};
