use async_trait::async_trait;
use mt5bot_core::{OrderJournal, OrderRecord, ReturnCode, StoreError};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-process order journal, used when no database is configured.
pub struct MemoryJournal {
    orders: Mutex<Vec<OrderRecord>>,
    codes: HashMap<u32, ReturnCode>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::with_codes(ReturnCode::builtin_table())
    }

    pub fn with_codes(codes: Vec<ReturnCode>) -> Self {
        Self {
            orders: Mutex::new(Vec::new()),
            codes: codes.into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    /// Snapshot of saved orders, oldest first.
    pub fn records(&self) -> Vec<OrderRecord> {
        self.orders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Default for MemoryJournal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderJournal for MemoryJournal {
    async fn save_order(&self, record: &OrderRecord) -> Result<(), StoreError> {
        self.orders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(())
    }

    async fn return_code(&self, id: u32) -> Result<Option<ReturnCode>, StoreError> {
        Ok(self.codes.get(&id).cloned())
    }
}
