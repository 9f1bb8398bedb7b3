//! Domain model: ids, lanes, tasks, payloads, wallets, results and errors.

pub mod errors;
pub mod ids;
pub mod lane;
pub mod outcome;
pub mod payload;
pub mod task;
pub mod wallet;

pub use self::errors::{ChainError, ErrorKind};
pub use self::ids::{ContractId, NftId, ProjectId, TaskId, WalletId};
pub use self::lane::{Chain, ChainFamily, Lane, SignerSlot};
pub use self::outcome::{DispatchReceipt, Finality, SignedTransaction};
pub use self::payload::{
    ContractDeployParams, MediaRef, MintParams, RoyaltyParams, TaskKind, TaskPayload,
    TransferFromParams, TransferParams, UploadMediaParams, UploadMetadataParams,
};
pub use self::task::{NewTask, Task, TaskState, WebhookState};
pub use self::wallet::Wallet;
