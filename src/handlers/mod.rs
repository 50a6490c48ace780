pub mod asset_handlers;
pub mod health_handlers;

use crate::services::bucket::Bucket;
use std::sync::Arc;

/// Shared router state: just the bucket binding. The proxy keeps no other
/// state between requests.
#[derive(Clone)]
pub struct AppState {
    pub bucket: Arc<dyn Bucket>,
}
