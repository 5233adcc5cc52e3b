//! Calculated-field reprocessing task boundary.
//!
//! The pattern every asynchronous boundary in the core follows: callback
//! based async work gets a hard wait bound and is converted to a
//! synchronous success/failure outcome, never left to hang.

use crate::{error::Error, ids::TenantId};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{sync::oneshot, time};
use tracing::warn;
use uuid::Uuid;

use std::{sync::Arc, time::Duration};

/// A request to reprocess one calculated field over a time range.
#[derive(Clone, Debug)]
pub struct ReprocessingTask {
    pub tenant_id: TenantId,
    pub entity_id: Uuid,
    pub field_id: Uuid,
    pub start_ts: u64,
    pub end_ts: u64,
}

/// Completion hook handed to the reprocessing collaborator. Invoked at most
/// once.
pub trait ReprocessingCallback: Send + Sync {
    fn on_success(&self);
    fn on_failure(&self, reason: String);
}

/// The calculated-field reprocessing collaborator. Expression evaluation is
/// out of scope; this core only bounds the wait for its callback.
#[async_trait]
pub trait FieldReprocessor: Send + Sync {
    async fn reprocess(
        &self,
        task: ReprocessingTask,
        callback: Arc<dyn ReprocessingCallback>,
    ) -> Result<(), Error>;
}

/// Oneshot-backed callback. Later invocations after the first are dropped.
struct ChannelCallback {
    sender: Mutex<Option<oneshot::Sender<Result<(), String>>>>,
}

impl ReprocessingCallback for ChannelCallback {
    fn on_success(&self) {
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(Ok(()));
        }
    }

    fn on_failure(&self, reason: String) {
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(Err(reason));
        }
    }
}

/// Converts the collaborator's callback into a bounded synchronous outcome.
/// This is the only blocking wait in the core.
pub struct ReprocessingTaskProcessor {
    reprocessor: Arc<dyn FieldReprocessor>,
    timeout: Duration,
}

impl ReprocessingTaskProcessor {
    pub fn new(
        reprocessor: Arc<dyn FieldReprocessor>,
        timeout: Duration,
    ) -> Self {
        ReprocessingTaskProcessor {
            reprocessor,
            timeout,
        }
    }

    /// Runs one task to a terminal outcome within the bound. Timeout and
    /// callback-reported failure both surface as task failure.
    pub async fn process(&self, task: ReprocessingTask) -> Result<(), Error> {
        let (sender, receiver) = oneshot::channel();
        let callback = Arc::new(ChannelCallback {
            sender: Mutex::new(Some(sender)),
        });
        let tenant_id = task.tenant_id;

        self.reprocessor.reprocess(task, callback).await?;

        match time::timeout(self.timeout, receiver).await {
            Err(_) => {
                warn!(
                    "Reprocessing for tenant {} exceeded {:?}.",
                    tenant_id, self.timeout
                );
                Err(Error::ReprocessingTimeout(self.timeout))
            }
            Ok(Err(_)) => Err(Error::Reprocessing(
                "collaborator dropped the callback".to_owned(),
            )),
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(Error::Reprocessing(reason)),
        }
    }
}
