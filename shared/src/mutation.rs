//! Create, update and delete against one collection, with at most one
//! in-flight mutation per target.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, instrument, warn};

use crate::client::ResourceClient;
use crate::list_state::ListHandle;
use crate::model::{Draft, Resource, ResourceId, SessionId};
use crate::{AppResult, ErrorInfo, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationState {
    Pending,
    Success,
    Failed,
}

/// What a mutation is serialized against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MutationTarget {
    /// Creates with no dialog session; the whole collection is one slot.
    Collection,
    /// Creates from one form session.
    Session(SessionId),
    /// Updates and deletes of an existing resource.
    Entity(ResourceId),
}

impl fmt::Display for MutationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collection => f.write_str("collection"),
            Self::Session(id) => write!(f, "session {id}"),
            Self::Entity(id) => write!(f, "resource {id}"),
        }
    }
}

impl From<ResourceId> for MutationTarget {
    fn from(id: ResourceId) -> Self {
        Self::Entity(id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    pub kind: MutationKind,
    pub target: MutationTarget,
    pub draft: Option<Draft>,
    pub state: MutationState,
    pub error: Option<ErrorInfo>,
}

impl PendingMutation {
    pub fn target_id(&self) -> Option<&ResourceId> {
        match &self.target {
            MutationTarget::Entity(id) => Some(id),
            _ => None,
        }
    }
}

type Table = Mutex<HashMap<MutationTarget, PendingMutation>>;

/// Holds a target's pending slot; dropping it unsettled frees the slot.
struct Slot<'a> {
    table: &'a Table,
    target: MutationTarget,
    settled: bool,
}

impl<'a> Slot<'a> {
    fn acquire(
        table: &'a Table,
        kind: MutationKind,
        target: MutationTarget,
        draft: Option<Draft>,
    ) -> AppResult<Self> {
        let mut entries = table.lock().unwrap_or_else(PoisonError::into_inner);
        if entries
            .get(&target)
            .is_some_and(|m| m.state == MutationState::Pending)
        {
            warn!(mutation = %target, ?kind, "mutation rejected, target busy");
            return Err(ErrorInfo::conflict(&target));
        }
        entries.insert(
            target.clone(),
            PendingMutation {
                kind,
                target: target.clone(),
                draft,
                state: MutationState::Pending,
                error: None,
            },
        );
        Ok(Self {
            table,
            target,
            settled: false,
        })
    }

    /// A successful create from a form session leaves no record; the
    /// session ends with it.
    fn settle<R>(mut self, result: &AppResult<R>) {
        self.settled = true;
        let mut entries = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if result.is_ok() && matches!(self.target, MutationTarget::Session(_)) {
            entries.remove(&self.target);
            return;
        }
        if let Some(entry) = entries.get_mut(&self.target) {
            match result {
                Ok(_) => {
                    entry.state = MutationState::Success;
                    entry.error = None;
                }
                Err(e) => {
                    entry.state = MutationState::Failed;
                    entry.error = Some(e.clone());
                }
            }
        }
    }
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(mutation = %self.target, "mutation abandoned before settling");
            self.table
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.target);
        }
    }
}

pub struct MutationCoordinator<T> {
    client: ResourceClient,
    list: ListHandle<T>,
    table: Arc<Table>,
}

impl<T> Clone for MutationCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            list: self.list.clone(),
            table: Arc::clone(&self.table),
        }
    }
}

impl<T> MutationCoordinator<T> {
    pub fn new(client: ResourceClient, list: ListHandle<T>) -> Self {
        Self {
            client,
            list,
            table: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn list(&self) -> &ListHandle<T> {
        &self.list
    }

    /// Latest record for `target`, in flight or settled.
    pub fn mutation(&self, target: &MutationTarget) -> Option<PendingMutation> {
        self.entries().get(target).cloned()
    }

    pub fn pending(&self) -> Vec<PendingMutation> {
        self.entries()
            .values()
            .filter(|m| m.state == MutationState::Pending)
            .cloned()
            .collect()
    }

    pub fn is_pending(&self, target: &MutationTarget) -> bool {
        self.entries()
            .get(target)
            .is_some_and(|m| m.state == MutationState::Pending)
    }

    /// Drops the settled record for `target`. An in-flight mutation keeps
    /// its slot.
    pub fn forget(&self, target: &MutationTarget) {
        let mut entries = self.entries();
        if entries
            .get(target)
            .is_some_and(|m| m.state != MutationState::Pending)
        {
            entries.remove(target);
        }
    }

    pub fn has_pending(&self) -> bool {
        self.entries()
            .values()
            .any(|m| m.state == MutationState::Pending)
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<MutationTarget, PendingMutation>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> MutationCoordinator<T>
where
    T: DeserializeOwned + Serialize + Clone + Send + Sync,
{
    pub async fn create(&self, draft: Draft) -> AppResult<Resource<T>> {
        self.create_for(MutationTarget::Collection, draft).await
    }

    /// Creates are serialized per form session rather than per collection.
    pub async fn create_in(&self, session: &SessionId, draft: Draft) -> AppResult<Resource<T>> {
        self.create_for(MutationTarget::Session(session.clone()), draft)
            .await
    }

    #[instrument(skip(self, target, draft), fields(mutation = %target))]
    async fn create_for(&self, target: MutationTarget, draft: Draft) -> AppResult<Resource<T>> {
        let slot = Slot::acquire(&self.table, MutationKind::Create, target, Some(draft.clone()))?;

        let result = self.client.create::<T>(draft).await;
        if let Ok(created) = &result {
            info!(id = %created.id, "resource created");
            let mut list = self.list.write().await;
            list.insert(created.clone());
            list.supersede_loads();
        }
        slot.settle(&result);
        result
    }

    #[instrument(skip(self, id, draft), fields(id = %id))]
    pub async fn update(&self, id: &ResourceId, draft: Draft) -> AppResult<Resource<T>> {
        let slot = Slot::acquire(
            &self.table,
            MutationKind::Update,
            MutationTarget::Entity(id.clone()),
            Some(draft.clone()),
        )?;

        let current = {
            let list = self.list.read().await;
            list.get(id).map(|r| r.data_json()).transpose()?
        };
        let result = self.client.update_over::<T>(id, draft, current).await;
        if let Ok(updated) = &result {
            info!("resource updated");
            let mut list = self.list.write().await;
            let replacement = updated.data.clone();
            if list.patch(id, |data| *data = replacement).is_err() {
                warn!("updated resource was not listed, adding it");
                list.insert(updated.clone());
            }
            list.supersede_loads();
        }
        slot.settle(&result);
        result
    }

    #[instrument(skip(self, id), fields(id = %id))]
    pub async fn remove(&self, id: &ResourceId) -> AppResult<()> {
        let slot = Slot::acquire(
            &self.table,
            MutationKind::Delete,
            MutationTarget::Entity(id.clone()),
            None,
        )?;

        let result = self.client.delete(id).await;
        if result.is_ok() {
            info!("resource deleted");
            let mut list = self.list.write().await;
            match list.remove(id) {
                Ok(_) => {}
                Err(e) if e.kind == ErrorKind::NotFound => {
                    debug!("deleted resource was not listed");
                }
                Err(e) => warn!(code = e.code(), "failed to drop deleted resource"),
            }
            list.supersede_loads();
        }
        slot.settle(&result);
        result
    }
}
