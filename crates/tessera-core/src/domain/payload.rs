//! Task payloads.
//!
//! The payload is a tagged union: the task kind is derived from the variant,
//! so kind and parameters cannot disagree.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    WalletDeploy,
    ContractDeploy,
    Mint,
    MintTo,
    Transfer,
    TransferFrom,
    SetDefaultRoyalty,
    UploadMedia,
    UploadMetadata,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::WalletDeploy => "wallet_deploy",
            TaskKind::ContractDeploy => "contract_deploy",
            TaskKind::Mint => "mint",
            TaskKind::MintTo => "mint_to",
            TaskKind::Transfer => "transfer",
            TaskKind::TransferFrom => "transfer_from",
            TaskKind::SetDefaultRoyalty => "set_default_royalty",
            TaskKind::UploadMedia => "upload_media",
            TaskKind::UploadMetadata => "upload_metadata",
        }
    }

    /// Storage-only kinds: no chain call, always final on return.
    pub fn is_upload(self) -> bool {
        matches!(self, TaskKind::UploadMedia | TaskKind::UploadMetadata)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A media file living in the tenant's object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    /// Key of the source object.
    pub remote_key: String,
    pub file_name: String,
    /// Public URL once published. `None` means the file still has to be staged.
    #[serde(default)]
    pub url: Option<String>,
}

impl MediaRef {
    pub fn new(remote_key: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            remote_key: remote_key.into(),
            file_name: file_name.into(),
            url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDeployParams {
    pub name: String,
    pub symbol: String,
    pub contract_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MintParams {
    pub token_id: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub media: Option<MediaRef>,
}

impl MintParams {
    /// Points `metadata.media` at the published URL.
    pub fn set_media_url(&mut self, url: &str) {
        if let Some(media) = self.media.as_mut() {
            media.url = Some(url.to_string());
        }
        match self.metadata.as_object_mut() {
            Some(object) => {
                object.insert("media".to_string(), Value::String(url.to_string()));
            }
            None => self.metadata = serde_json::json!({ "media": url }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferParams {
    pub amount: String,
}

impl TransferParams {
    /// Integer amount in base units. A decimal comma is read as a decimal
    /// point and any fractional part is dropped, so `"12,9"` becomes `"12"`.
    /// Returns `None` when no leading integer can be read.
    pub fn normalized_amount(&self) -> Option<String> {
        let normalized = self.amount.trim().replace(',', ".");
        let integer = normalized.split('.').next().unwrap_or_default();
        integer.parse::<u128>().ok().map(|value| value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFromParams {
    pub token_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoyaltyParams {
    /// Defaults to the contract owner when absent.
    #[serde(default)]
    pub receiver: Option<String>,
    pub fee_basis_points: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMediaParams {
    pub media: Vec<MediaRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadMetadataParams {
    pub key: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum TaskPayload {
    WalletDeploy,
    ContractDeploy(ContractDeployParams),
    Mint(MintParams),
    MintTo(MintParams),
    Transfer(TransferParams),
    TransferFrom(TransferFromParams),
    SetDefaultRoyalty(RoyaltyParams),
    UploadMedia(UploadMediaParams),
    UploadMetadata(UploadMetadataParams),
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::WalletDeploy => TaskKind::WalletDeploy,
            TaskPayload::ContractDeploy(_) => TaskKind::ContractDeploy,
            TaskPayload::Mint(_) => TaskKind::Mint,
            TaskPayload::MintTo(_) => TaskKind::MintTo,
            TaskPayload::Transfer(_) => TaskKind::Transfer,
            TaskPayload::TransferFrom(_) => TaskKind::TransferFrom,
            TaskPayload::SetDefaultRoyalty(_) => TaskKind::SetDefaultRoyalty,
            TaskPayload::UploadMedia(_) => TaskKind::UploadMedia,
            TaskPayload::UploadMetadata(_) => TaskKind::UploadMetadata,
        }
    }

    pub fn mint_params(&self) -> Option<&MintParams> {
        match self {
            TaskPayload::Mint(params) | TaskPayload::MintTo(params) => Some(params),
            _ => None,
        }
    }

    pub fn mint_params_mut(&mut self) -> Option<&mut MintParams> {
        match self {
            TaskPayload::Mint(params) | TaskPayload::MintTo(params) => Some(params),
            _ => None,
        }
    }
}
