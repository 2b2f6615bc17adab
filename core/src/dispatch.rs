//! Notification dispatcher: folder-level fan-out of raw change events

use std::sync::Arc;
use tracing::{debug, warn};

use crate::collab::{FolderSynchronizer, MailCredentials};
use crate::types::{AccountId, ChangeEvent};

/// Consumes raw change notifications and turns them into folder syncs.
///
/// A failure anywhere in here is logged and swallowed; nothing in the
/// dispatch path may tear down the connection that delivered the events.
pub struct NotificationDispatcher {
    synchronizer: Arc<dyn FolderSynchronizer>,
    default_folder: String,
    sync_limit: u32,
}

impl NotificationDispatcher {
    pub fn new(
        synchronizer: Arc<dyn FolderSynchronizer>,
        default_folder: impl Into<String>,
        sync_limit: u32,
    ) -> Self {
        Self {
            synchronizer,
            default_folder: default_folder.into(),
            sync_limit,
        }
    }

    /// Handle one batch of change events for an account.
    ///
    /// Events are grouped by folder first, so a burst of notifications for
    /// one folder costs a single sync call. After a successful sync the
    /// folder's unread/total counts are refreshed.
    pub async fn dispatch(
        &self,
        account_id: AccountId,
        credentials: &MailCredentials,
        events: &[ChangeEvent],
    ) {
        let folders = self.affected_folders(events);
        debug!(
            "Dispatching {} events for account {} across {} folders",
            events.len(),
            account_id,
            folders.len()
        );
        for folder in folders {
            match self
                .synchronizer
                .sync_folder(account_id, credentials, &folder, self.sync_limit)
                .await
            {
                Ok(outcome) => {
                    debug!(
                        "Synced {} messages in folder {} for account {}",
                        outcome.message_count, folder, account_id
                    );
                    self.refresh_folder_counts(account_id, &folder).await;
                }
                Err(e) => warn!(
                    "Folder sync failed for account {} folder {}: {}",
                    account_id, folder, e
                ),
            }
        }
    }

    /// Folders touched by a batch, deduplicated, in first-seen order.
    ///
    /// Events that do not resolve a folder fall back to the default
    /// folder; a move touches both its source and target.
    pub(crate) fn affected_folders(&self, events: &[ChangeEvent]) -> Vec<String> {
        let mut folders: Vec<String> = Vec::new();
        for event in events {
            match event {
                ChangeEvent::NewMessage { folder }
                | ChangeEvent::MessageDeleted { folder }
                | ChangeEvent::FlagsChanged { folder } => push_unique(&mut folders, folder),
                ChangeEvent::ItemCreated { folder } | ChangeEvent::ItemModified { folder } => {
                    push_unique(&mut folders, folder.as_deref().unwrap_or(&self.default_folder));
                }
                ChangeEvent::ItemMoved { from, to } => {
                    push_unique(&mut folders, from.as_deref().unwrap_or(&self.default_folder));
                    push_unique(&mut folders, to.as_deref().unwrap_or(&self.default_folder));
                }
            }
        }
        folders
    }

    /// Re-read a folder's counts after a sync and persist them
    async fn refresh_folder_counts(&self, account_id: AccountId, folder: &str) {
        let descriptors = match self.synchronizer.list_folders(account_id).await {
            Ok(descriptors) => descriptors,
            Err(e) => {
                warn!("Failed to list folders for account {}: {}", account_id, e);
                return;
            }
        };
        let Some(descriptor) = descriptors.into_iter().find(|d| d.name == folder) else {
            debug!(
                "Folder {} not listed for account {}, skipping count refresh",
                folder, account_id
            );
            return;
        };
        if let Err(e) = self
            .synchronizer
            .update_folder_counts(account_id, &descriptor.id, descriptor.unread, descriptor.total)
            .await
        {
            warn!(
                "Failed to update counts for folder {} of account {}: {}",
                folder, account_id, e
            );
        }
    }
}

fn push_unique(folders: &mut Vec<String>, name: &str) {
    if !folders.iter().any(|f| f == name) {
        folders.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{credentials, RecordingSynchronizer};
    use crate::types::FolderDescriptor;

    fn dispatcher(synchronizer: Arc<RecordingSynchronizer>) -> NotificationDispatcher {
        NotificationDispatcher::new(synchronizer, "INBOX", 50)
    }

    #[test]
    fn test_events_coalesce_per_folder() {
        let dispatcher = dispatcher(Arc::new(RecordingSynchronizer::new()));
        let events = vec![
            ChangeEvent::NewMessage {
                folder: "A".to_string(),
            },
            ChangeEvent::ItemModified {
                folder: Some("A".to_string()),
            },
            ChangeEvent::ItemCreated {
                folder: Some("B".to_string()),
            },
        ];
        assert_eq!(dispatcher.affected_folders(&events), vec!["A", "B"]);
    }

    #[test]
    fn test_unresolved_folders_use_default() {
        let dispatcher = dispatcher(Arc::new(RecordingSynchronizer::new()));
        let events = vec![
            ChangeEvent::ItemCreated { folder: None },
            ChangeEvent::ItemMoved {
                from: None,
                to: Some("Archive".to_string()),
            },
        ];
        assert_eq!(dispatcher.affected_folders(&events), vec!["INBOX", "Archive"]);
    }

    #[tokio::test]
    async fn test_dispatch_syncs_each_folder_once() {
        let synchronizer = Arc::new(RecordingSynchronizer::new());
        let dispatcher = dispatcher(synchronizer.clone());
        let account_id = AccountId::new_v4();

        let events = vec![
            ChangeEvent::NewMessage {
                folder: "A".to_string(),
            },
            ChangeEvent::ItemModified {
                folder: Some("A".to_string()),
            },
            ChangeEvent::ItemCreated {
                folder: Some("B".to_string()),
            },
        ];
        dispatcher.dispatch(account_id, &credentials(), &events).await;

        let calls = synchronizer.sync_calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_sync_failure_does_not_abort_other_folders() {
        let synchronizer = Arc::new(RecordingSynchronizer::new());
        synchronizer.fail_folder("A");
        let dispatcher = dispatcher(synchronizer.clone());
        let account_id = AccountId::new_v4();

        let events = vec![
            ChangeEvent::NewMessage {
                folder: "A".to_string(),
            },
            ChangeEvent::NewMessage {
                folder: "B".to_string(),
            },
        ];
        dispatcher.dispatch(account_id, &credentials(), &events).await;

        let calls = synchronizer.sync_calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["A", "B"]);
        // Only the successful folder got a count refresh.
        let updates = synchronizer.count_updates.lock().unwrap().clone();
        assert_eq!(updates.len(), 1);
    }

    #[tokio::test]
    async fn test_counts_refreshed_after_sync() {
        let synchronizer = Arc::new(RecordingSynchronizer::with_folders(vec![FolderDescriptor {
            id: "f1".to_string(),
            name: "INBOX".to_string(),
            unread: 4,
            total: 10,
        }]));
        let dispatcher = dispatcher(synchronizer.clone());
        let account_id = AccountId::new_v4();

        let events = vec![ChangeEvent::NewMessage {
            folder: "INBOX".to_string(),
        }];
        dispatcher.dispatch(account_id, &credentials(), &events).await;

        let updates = synchronizer.count_updates.lock().unwrap().clone();
        assert_eq!(updates, vec![("f1".to_string(), 4, 10)]);
    }
}
