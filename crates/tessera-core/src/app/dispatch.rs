//! Chain dispatch: routes a running task to its adapter or to object
//! storage, and keeps retrying transient failures.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::app::adapters::AdapterRegistry;
use crate::app::classify::{ErrorClassifier, Severity};
use crate::app::media::MediaStager;
use crate::app::retry::RetryPolicy;
use crate::custody::{KeyCustodian, ShareBundle};
use crate::domain::{
    ChainError, ChainFamily, DispatchReceipt, Finality, Task, TaskKind, TaskPayload, Wallet,
};
use crate::ports::{
    AlertSink, ChainAdapter, Clock, ReserveStatus, ShareEscrow, TaskStore, WalletDeployment,
    WalletStore,
};

/// Terminal outcome of a dispatch that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("major error: {0}")]
    Major(ChainError),

    #[error("gave up after {tries} attempts: {last}")]
    Exhausted { tries: u32, last: ChainError },

    #[error("no adapter registered for the {0} chain family")]
    NoAdapter(ChainFamily),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub receipt: DispatchReceipt,
    pub finality: Finality,
}

/// A deployed wallet whose shares are not all stored yet. Kept across
/// attempts so a failed store is retried without deploying a second key.
struct PendingWallet {
    deployment: WalletDeployment,
    bundle: Option<ShareBundle>,
}

pub struct ChainDispatcher {
    pub(crate) adapters: AdapterRegistry,
    pub(crate) store: Arc<dyn TaskStore>,
    pub(crate) wallets: Arc<dyn WalletStore>,
    pub(crate) escrow: Arc<dyn ShareEscrow>,
    pub(crate) custodian: KeyCustodian,
    pub(crate) media: MediaStager,
    pub(crate) classifier: ErrorClassifier,
    pub(crate) retry: RetryPolicy,
    pub(crate) alerts: Arc<dyn AlertSink>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) alert_after_failures: u32,
    pub(crate) max_attempts: Option<u32>,
}

impl ChainDispatcher {
    /// Runs attempts until one succeeds, a major error occurs, or the
    /// optional attempt ceiling is hit. `task` is persisted after every
    /// failed attempt; a store that refuses the save does not stop the
    /// retries, the next save carries the count forward.
    pub async fn dispatch(&self, task: &mut Task) -> Result<Dispatched, DispatchError> {
        let kind = task.kind();
        let adapter = if kind.is_upload() {
            None
        } else {
            let family = task.chain.family();
            match self.adapters.get(family) {
                Some(adapter) => Some(adapter),
                None => {
                    self.alert_major(task, &format!("no adapter for {family}")).await;
                    return Err(DispatchError::NoAdapter(family));
                }
            }
        };
        let finality = match &adapter {
            Some(adapter) if !adapter.confirms_synchronously() => Finality::Deferred,
            _ => Finality::Confirmed,
        };

        let mut pending = None;
        loop {
            let error = match self.attempt(adapter.as_deref(), task, &mut pending).await {
                Ok(receipt) => return Ok(Dispatched { receipt, finality }),
                Err(error) => error,
            };

            let mut severity = self.classifier.classify(&error);
            if severity == Severity::Transient
                && let Some(adapter) = adapter.as_deref()
            {
                severity = self.heal(adapter, task, severity).await;
            }

            if severity == Severity::Major {
                warn!(task_id = %task.id, kind = %kind, error = %error, "major error, giving up");
                self.alert_major(task, error.message()).await;
                return Err(DispatchError::Major(error));
            }

            let delay = self.retry.next_delay(task.tries + 1);
            task.record_retry(self.clock.now(), delay, error.to_string());
            if let Err(err) = self.store.save(task).await {
                warn!(task_id = %task.id, tries = task.tries, error = %err, "could not record retry");
            }
            warn!(
                task_id = %task.id,
                kind = %kind,
                tries = task.tries,
                retry_in_ms = delay.as_millis() as u64,
                error = %error,
                "transient error, retrying"
            );

            if task.tries == self.alert_after_failures {
                self.alerts
                    .notify(
                        "Task is failing repeatedly",
                        &format!(
                            "task {} ({}) on {} has failed {} times; last error: {}",
                            task.id, kind, task.chain, task.tries, error
                        ),
                    )
                    .await;
            }
            if let Some(max) = self.max_attempts
                && task.tries >= max
            {
                self.alerts
                    .notify(
                        "Task retry limit reached",
                        &format!("task {} ({}) gave up after {} attempts: {}", task.id, kind, task.tries, error),
                    )
                    .await;
                return Err(DispatchError::Exhausted {
                    tries: task.tries,
                    last: error,
                });
            }

            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(
        &self,
        adapter: Option<&dyn ChainAdapter>,
        task: &mut Task,
        pending: &mut Option<PendingWallet>,
    ) -> Result<DispatchReceipt, ChainError> {
        let Some(adapter) = adapter else {
            return self.upload(task).await;
        };
        match task.kind() {
            TaskKind::WalletDeploy => {
                let deployed = match pending.take() {
                    Some(deployed) => deployed,
                    None => self.deploy_wallet(adapter, task).await?,
                };
                let result = self.provision_wallet(task, &deployed).await;
                if result.is_err() {
                    *pending = Some(deployed);
                }
                result
            }
            TaskKind::ContractDeploy => adapter.deploy_contract(task).await,
            TaskKind::Mint | TaskKind::MintTo => {
                self.stage_media(task).await?;
                adapter.multicall(task).await
            }
            TaskKind::Transfer | TaskKind::TransferFrom | TaskKind::SetDefaultRoyalty => {
                adapter.multicall(task).await
            }
            TaskKind::UploadMedia | TaskKind::UploadMetadata => self.upload(task).await,
        }
    }

    /// Asks the adapter to fix funding between retries. A reserve that was
    /// already sufficient for a NEAR transfer means the failure was not
    /// about funds, so it is escalated.
    async fn heal(&self, adapter: &dyn ChainAdapter, task: &Task, severity: Severity) -> Severity {
        match adapter.replenish(task).await {
            Ok(ReserveStatus::Sufficient)
                if task.kind() == TaskKind::TransferFrom && adapter.family() == ChainFamily::Near =>
            {
                debug!(task_id = %task.id, "reserve sufficient, escalating");
                Severity::Major
            }
            Ok(ReserveStatus::ToppedUp) => {
                info!(task_id = %task.id, "reserve topped up before retry");
                severity
            }
            Ok(_) => severity,
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "replenish failed");
                severity
            }
        }
    }

    /// Publishes mint media that has no URL yet and persists the rewritten payload.
    async fn stage_media(&self, task: &mut Task) -> Result<(), ChainError> {
        let project = task.project_id;
        let Some(params) = task.payload.mint_params_mut() else {
            return Ok(());
        };
        let Some(media) = params.media.as_ref().filter(|m| m.url.is_none()) else {
            return Ok(());
        };
        let url = self.media.publish(project, media).await?;
        params.set_media_url(&url);
        self.store
            .save(task)
            .await
            .map_err(|e| ChainError::infrastructure(e.to_string()))?;
        info!(task_id = %task.id, %url, "media staged");
        Ok(())
    }

    async fn upload(&self, task: &Task) -> Result<DispatchReceipt, ChainError> {
        let output = match &task.payload {
            TaskPayload::UploadMedia(params) => {
                let mut urls = Vec::with_capacity(params.media.len());
                for media in &params.media {
                    urls.push(Value::String(self.media.publish(task.project_id, media).await?));
                }
                json!({ "urls": urls })
            }
            TaskPayload::UploadMetadata(params) => {
                let url = self.media.objects().put_json(&params.key, &params.metadata).await?;
                json!({ "url": url })
            }
            _ => {
                return Err(ChainError::permanent(format!(
                    "{} is not a storage task",
                    task.kind()
                )));
            }
        };
        Ok(DispatchReceipt::new().with_output(output))
    }

    /// Deploys the wallet and splits its key. A wallet that already has an
    /// address is never deployed again.
    async fn deploy_wallet(&self, adapter: &dyn ChainAdapter, task: &Task) -> Result<PendingWallet, ChainError> {
        let wallet = self.load_wallet(task).await?;
        if let Some(address) = &wallet.address {
            return Err(ChainError::permanent(format!(
                "{} is already deployed at {address}",
                wallet.id
            )));
        }

        let mut deployment = adapter.deploy_wallet(task).await?;
        let bundle = match deployment.secret.take() {
            Some(secret) => Some(
                self.custodian
                    .provision(&secret)
                    .map_err(|e| ChainError::permanent(e.to_string()))?,
            ),
            None => None,
        };
        info!(task_id = %task.id, wallet_id = %wallet.id, address = %deployment.address, "wallet deployed");
        Ok(PendingWallet { deployment, bundle })
    }

    /// Stores the split key: one share on the wallet record, the middle
    /// shares to the tenant via the task output, the last to escrow. Safe
    /// to repeat with the same shares.
    async fn provision_wallet(&self, task: &Task, deployed: &PendingWallet) -> Result<DispatchReceipt, ChainError> {
        let mut wallet = self.load_wallet(task).await?;
        let deployment = &deployed.deployment;

        wallet.address = Some(deployment.address.clone());
        wallet.account_id = deployment.account_id.clone();
        let mut output = json!({
            "address": deployment.address,
            "account_id": deployment.account_id,
        });

        if let Some(bundle) = &deployed.bundle {
            self.escrow
                .store(wallet.id, &bundle.platform)
                .await
                .map_err(|e| ChainError::infrastructure(e.to_string()))?;
            output["tenant_shares"] = bundle.tenant.iter().map(|s| Value::String(s.to_string())).collect();
            wallet.key_share = Some(bundle.wallet.clone());
        }

        self.wallets
            .save(&wallet)
            .await
            .map_err(|e| ChainError::infrastructure(e.to_string()))?;

        let mut receipt = DispatchReceipt::new().with_output(output);
        receipt.tx_hash = deployment.tx_hash.clone();
        receipt.cost = deployment.cost;
        Ok(receipt)
    }

    async fn load_wallet(&self, task: &Task) -> Result<Wallet, ChainError> {
        let wallet_id = task
            .wallet1
            .ok_or_else(|| ChainError::permanent("wallet deployment has no wallet"))?;
        self.wallets
            .get(wallet_id)
            .await
            .map_err(|e| ChainError::infrastructure(e.to_string()))?
            .ok_or_else(|| ChainError::missing(format!("{wallet_id} does not exist")))
    }

    async fn alert_major(&self, task: &Task, message: &str) {
        self.alerts
            .notify(
                "Major error executing task",
                &format!("task {} ({}) on {}: {}", task.id, task.kind(), task.chain, message),
            )
            .await;
    }
}
