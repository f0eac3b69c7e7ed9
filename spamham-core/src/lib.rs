pub mod config;
pub mod context;
pub mod counter;
pub mod error;
pub mod listing;
pub mod queue;
pub mod reconcile;
pub mod retry;
pub mod store;

use std::sync::Arc;

pub use config::SpamhamConfig;
pub use context::RequestContext;
pub use counter::{CounterService, PENDING_COUNTER};
pub use error::{Error, PartialCategorizeFailure, Result};
pub use listing::{render_json_array, Listing, Peek};
pub use queue::{CategorizeOutcome, IngestReceipt, ModerationQueue};
pub use reconcile::{ReconcileReport, Reconciler};
pub use retry::RetryConfig;
pub use store::{Collection, Item, ItemKey, Label, MemoryStore, PgStore, Store};

/// The queue, listing and reconciler wired over one store and counter
#[derive(Clone)]
pub struct Services {
    pub queue: ModerationQueue,
    pub listing: Listing,
    pub reconciler: Reconciler,
}

impl Services {
    pub fn new(store: Arc<dyn Store>, retry: RetryConfig) -> Self {
        let counter = CounterService::new(store.clone(), retry);
        Self {
            queue: ModerationQueue::new(store.clone(), counter.clone()),
            listing: Listing::new(store.clone(), counter.clone()),
            reconciler: Reconciler::new(store, counter),
        }
    }

    pub fn counter(&self) -> &CounterService {
        self.queue.counter()
    }
}
