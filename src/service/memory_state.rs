//! In-memory state store.
//!
//! Records live in a map behind one async mutex. Every operation takes the
//! lock for its whole duration, which is what makes
//! `child_work_finished` atomic per parent.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{FanIn, StateStore};
use crate::error::{Error, Result};
use crate::model::work::{Work, WorkId};

#[derive(Debug, Default)]
pub struct MemoryStateManager {
    works: Mutex<HashMap<WorkId, Work>>,
}

impl MemoryStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.works.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.works.lock().await.is_empty()
    }
}

fn stamp(work: &mut Work) -> WorkId {
    let now = Utc::now();
    let id = *work.id.get_or_insert_with(WorkId::new);
    work.created.get_or_insert(now);
    work.updated = Some(now);
    id
}

#[async_trait]
impl StateStore for MemoryStateManager {
    async fn save(&self, work: &mut Work) -> Result<()> {
        let id = stamp(work);
        self.works.lock().await.insert(id, work.clone());
        Ok(())
    }

    async fn save_all(&self, works: &mut [Work]) -> Result<()> {
        let mut map = self.works.lock().await;
        for work in works.iter_mut() {
            let id = stamp(work);
            map.insert(id, work.clone());
        }
        Ok(())
    }

    async fn load(&self, id: WorkId) -> Result<Option<Work>> {
        Ok(self.works.lock().await.get(&id).cloned())
    }

    async fn load_all(&self, ids: &[WorkId]) -> Result<Vec<Work>> {
        let map = self.works.lock().await;
        Ok(ids.iter().filter_map(|id| map.get(id).cloned()).collect())
    }

    async fn child_work_finished(&self, parent_id: WorkId, child: WorkId) -> Result<FanIn> {
        let mut map = self.works.lock().await;
        let parent = map.get_mut(&parent_id).ok_or(Error::NotFound(parent_id))?;

        if !parent.children_ids.contains(&child) {
            return Err(Error::UnknownChild {
                parent: parent_id,
                child,
            });
        }
        if parent.finished_children_ids.contains(&child) {
            debug!(parent = %parent_id, child = %child, "child already reported");
            return Ok(FanIn {
                parent: parent.clone(),
                closed: false,
            });
        }

        parent.finished_children_ids.push(child);
        parent.updated = Some(Utc::now());
        let closed = parent.children_done();
        debug!(
            parent = %parent_id,
            child = %child,
            finished = parent.finished_children_ids.len(),
            total = parent.children_ids.len(),
            "child finished"
        );

        Ok(FanIn {
            parent: parent.clone(),
            closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn first_save_assigns_id_and_created_once() {
        let store = MemoryStateManager::new();
        let mut work = Work::new("calculator", json!({}));

        store.save(&mut work).await.unwrap();
        let id = work.id.expect("id assigned");
        let created = work.created.expect("created assigned");

        store.save(&mut work).await.unwrap();
        assert_eq!(work.id, Some(id));
        assert_eq!(work.created, Some(created));
        assert!(work.updated >= Some(created));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn duplicate_report_does_not_reclose() {
        let store = MemoryStateManager::new();
        let mut parent = Work::new("calculator", json!({}));
        store.save(&mut parent).await.unwrap();

        let child = WorkId::new();
        parent.children_ids = vec![child];
        store.save(&mut parent).await.unwrap();
        let parent_id = parent.id.unwrap();

        let first = store.child_work_finished(parent_id, child).await.unwrap();
        assert!(first.closed);
        let second = store.child_work_finished(parent_id, child).await.unwrap();
        assert!(!second.closed);
        assert_eq!(second.parent.finished_children_ids, vec![child]);
    }
}
