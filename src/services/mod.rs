//! Storage backends: the `Bucket` trait and its disk implementation.

pub mod bucket;
pub mod disk_bucket;
