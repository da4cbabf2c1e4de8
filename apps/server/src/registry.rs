use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::bail;

use crate::config::InstanceId;
use crate::coordinator::Coordinator;

/// Scheduler instances by id, used to route service calls.
#[derive(Default)]
pub struct Registry {
    instances: BTreeMap<InstanceId, Arc<Coordinator>>,
}

impl Registry {
    pub fn insert(&mut self, coordinator: Arc<Coordinator>) -> anyhow::Result<()> {
        let id = coordinator.id().to_string();
        if self.instances.contains_key(&id) {
            bail!("Scheduler {:?} registered twice", id);
        }
        self.instances.insert(id, coordinator);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Coordinator>> {
        self.instances.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Coordinator>> {
        self.instances.values()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
