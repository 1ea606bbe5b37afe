use std::collections::HashMap;
use std::sync::Arc;

use super::data::Data;
use crate::stats::{DataStatistics, StoreCatalog, StoreId};

/// Fixed set of stores, looked up by id.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    stores: HashMap<StoreId, Arc<Data>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, data: Arc<Data>) -> Self {
        self.stores.insert(data.id(), data);
        self
    }

    pub fn data(&self, id: StoreId) -> Option<Arc<Data>> {
        self.stores.get(&id).cloned()
    }
}

impl StoreCatalog for Catalog {
    fn statistics(&self, id: StoreId) -> Option<Arc<dyn DataStatistics>> {
        self.data(id).map(|d| d as Arc<dyn DataStatistics>)
    }
}
