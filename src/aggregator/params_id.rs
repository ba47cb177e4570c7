//! Display ids for distinct parameter sets.
//!
//! A registry is owned by one processing run and shared by every group that
//! run creates, so "parameter set #3" means the same values in every group.
//! Independent runs get independent registries unless the caller hands the
//! same one to both.

use crate::utils::config::FIRST_PARAMS_ID;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug)]
struct RegistryState {
    next_id: u64,
    ids: HashMap<u32, u64>,
}

/// Maps each distinct `params_hash` to a small, stable id
#[derive(Debug)]
pub struct ParamsIdRegistry {
    state: Mutex<RegistryState>,
}

impl ParamsIdRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                next_id: FIRST_PARAMS_ID,
                ids: HashMap::new(),
            }),
        }
    }

    /// Id for `params_hash`, allocating the next one on first sight
    pub fn id_for(&self, params_hash: u32) -> u64 {
        let mut state = self.state.lock();
        if let Some(&id) = state.ids.get(&params_hash) {
            return id;
        }

        let id = state.next_id;
        state.next_id += 1;
        state.ids.insert(params_hash, id);
        id
    }

    /// Id already assigned to `params_hash`, without allocating
    pub fn get(&self, params_hash: u32) -> Option<u64> {
        self.state.lock().ids.get(&params_hash).copied()
    }

    /// Number of distinct parameter sets seen
    pub fn len(&self) -> usize {
        self.state.lock().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Id the next unseen hash will receive
    pub fn next_id(&self) -> u64 {
        self.state.lock().next_id
    }
}

impl Default for ParamsIdRegistry {
    fn default() -> Self {
        Self::new()
    }
}
