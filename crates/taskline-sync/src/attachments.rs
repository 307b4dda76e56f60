//! The attachment-linker port and its in-memory implementation.
//!
//! Attachments live in the object-storage subsystem; the engine only needs
//! to associate file IDs with task IDs so that payload `attachment_ids`
//! lists can be reconciled and change-entry snapshots can report the
//! current set. Linker calls are best effort from the engine's point of
//! view: a failed link never fails the enclosing operation.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use taskline_core::{FileId, TaskId, UserId};

use crate::error::{Error, Result};

/// Associates object-store file IDs with task IDs.
#[async_trait]
pub trait AttachmentLinker: Send + Sync {
    /// Links a file to a task for the given user.
    async fn link_to_task(&self, file: &FileId, task: &TaskId, user: &UserId) -> Result<()>;

    /// Removes a file's task association.
    async fn unlink_from_task(&self, file: &FileId, user: &UserId) -> Result<()>;

    /// Returns the file IDs currently linked to a task.
    async fn ids_by_task(&self, task: &TaskId) -> Result<Vec<FileId>>;
}

/// In-memory attachment linker.
#[derive(Debug, Default)]
pub struct InMemoryAttachmentLinker {
    links: RwLock<HashMap<FileId, TaskId>>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

impl InMemoryAttachmentLinker {
    /// Creates an empty in-memory linker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttachmentLinker for InMemoryAttachmentLinker {
    async fn link_to_task(&self, file: &FileId, task: &TaskId, _user: &UserId) -> Result<()> {
        let mut links = self.links.write().map_err(poison_err)?;
        links.insert(file.clone(), task.clone());
        Ok(())
    }

    async fn unlink_from_task(&self, file: &FileId, _user: &UserId) -> Result<()> {
        let mut links = self.links.write().map_err(poison_err)?;
        links.remove(file);
        Ok(())
    }

    async fn ids_by_task(&self, task: &TaskId) -> Result<Vec<FileId>> {
        let links = self.links.read().map_err(poison_err)?;
        let mut ids: Vec<FileId> = links
            .iter()
            .filter(|(_, linked)| *linked == task)
            .map(|(file, _)| file.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn link_unlink_round_trip() -> Result<()> {
        let linker = InMemoryAttachmentLinker::new();
        let user = UserId::new("u1");
        let task = TaskId::new("t1");
        linker.link_to_task(&FileId::new("f1"), &task, &user).await?;
        linker.link_to_task(&FileId::new("f2"), &task, &user).await?;
        assert_eq!(
            linker.ids_by_task(&task).await?,
            vec![FileId::new("f1"), FileId::new("f2")]
        );

        linker.unlink_from_task(&FileId::new("f1"), &user).await?;
        assert_eq!(linker.ids_by_task(&task).await?, vec![FileId::new("f2")]);
        Ok(())
    }

    #[tokio::test]
    async fn relinking_moves_the_file() -> Result<()> {
        let linker = InMemoryAttachmentLinker::new();
        let user = UserId::new("u1");
        let file = FileId::new("f1");
        linker.link_to_task(&file, &TaskId::new("t1"), &user).await?;
        linker.link_to_task(&file, &TaskId::new("t2"), &user).await?;
        assert!(linker.ids_by_task(&TaskId::new("t1")).await?.is_empty());
        assert_eq!(linker.ids_by_task(&TaskId::new("t2")).await?, vec![file]);
        Ok(())
    }
}
