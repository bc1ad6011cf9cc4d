use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::config::RpcConfig;
use crate::core::constants::SPL_TOKEN_PROGRAM;
use crate::core::{Instruction, RawTransaction};
use crate::error::CollectorError;
use crate::util::retry::{RateLimiter, RetryPolicy};

/// Size of an SPL token account; the mint occupies its first 32 bytes
const TOKEN_ACCOUNT_LEN: usize = 165;

/// JSON-RPC request envelope
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

/// JSON-RPC response envelope. `result` stays untyped until the error field
/// has been checked.
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Value,
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// Entry of `getSignaturesForAddress`, newest first
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    #[serde(default)]
    pub err: Option<Value>,
    pub block_time: Option<i64>,
}

impl SignatureInfo {
    pub fn succeeded(&self) -> bool {
        self.err.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSupply {
    pub amount: String,
    pub decimals: u8,
    pub ui_amount: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedTransactionWithMeta {
    slot: u64,
    block_time: Option<i64>,
    transaction: EncodedTransaction,
    meta: Option<TransactionMeta>,
}

#[derive(Debug, Deserialize)]
struct EncodedTransaction {
    signatures: Vec<String>,
    message: EncodedMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedMessage {
    account_keys: Vec<String>,
    instructions: Vec<EncodedInstruction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedInstruction {
    program_id_index: usize,
    accounts: Vec<usize>,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionMeta {
    #[serde(default)]
    loaded_addresses: Option<LoadedAddresses>,
}

#[derive(Debug, Default, Deserialize)]
struct LoadedAddresses {
    #[serde(default)]
    writable: Vec<String>,
    #[serde(default)]
    readonly: Vec<String>,
}

impl EncodedTransactionWithMeta {
    /// Flattens the wire format into a `RawTransaction`. Account keys are the
    /// static keys followed by lookup-table writable then readonly addresses,
    /// matching how v0 instructions index them.
    fn into_raw(self, signature: &str) -> Result<RawTransaction, CollectorError> {
        let EncodedTransaction { signatures, message } = self.transaction;

        let mut account_keys = message.account_keys;
        if let Some(loaded) = self.meta.and_then(|m| m.loaded_addresses) {
            account_keys.extend(loaded.writable);
            account_keys.extend(loaded.readonly);
        }

        let instructions = message
            .instructions
            .into_iter()
            .map(|ix| {
                let data = bs58::decode(&ix.data)
                    .into_vec()
                    .map_err(|e| CollectorError::Parse(format!("instruction data of {}: {}", signature, e)))?;
                Ok(Instruction {
                    program_index: ix.program_id_index,
                    account_indices: ix.accounts,
                    data,
                })
            })
            .collect::<Result<Vec<_>, CollectorError>>()?;

        Ok(RawTransaction {
            signature: signatures.into_iter().next().unwrap_or_else(|| signature.to_string()),
            slot: self.slot,
            block_time: self.block_time,
            account_keys,
            instructions,
        })
    }
}

/// Solana JSON-RPC client over HTTP with pacing and retries
pub struct SolanaRpcClient {
    client: Client,
    url: String,
    commitment: String,
    next_id: AtomicU64,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl SolanaRpcClient {
    pub fn new(config: &RpcConfig, retry: RetryPolicy) -> Result<Self, CollectorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            commitment: config.commitment.clone(),
            next_id: AtomicU64::new(1),
            limiter: RateLimiter::new(Duration::from_millis(config.min_request_interval_ms)),
            retry,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn get_signatures_for_address(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, CollectorError> {
        let params = json!([address, { "limit": limit, "commitment": self.commitment }]);
        self.call("getSignaturesForAddress", params).await
    }

    /// Fetches a transaction by signature. `Ok(None)` when the node does not
    /// (yet) know the signature.
    #[instrument(skip(self), level = "debug")]
    pub async fn get_transaction(&self, signature: &str) -> Result<Option<RawTransaction>, CollectorError> {
        let params = json!([
            signature,
            {
                "encoding": "json",
                "commitment": self.commitment,
                "maxSupportedTransactionVersion": 0
            }
        ]);
        let encoded: Option<EncodedTransactionWithMeta> = self.call("getTransaction", params).await?;
        encoded.map(|tx| tx.into_raw(signature)).transpose()
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn get_token_supply(&self, mint: &str) -> Result<TokenSupply, CollectorError> {
        #[derive(Deserialize)]
        struct WithContext {
            value: TokenSupply,
        }

        let params = json!([mint, { "commitment": self.commitment }]);
        let response: WithContext = self.call("getTokenSupply", params).await?;
        Ok(response.value)
    }

    /// Number of SPL token accounts holding `mint`. Account data is sliced to
    /// zero bytes so only the keys travel over the wire.
    #[instrument(skip(self), level = "debug")]
    pub async fn get_token_account_count(&self, mint: &str) -> Result<u64, CollectorError> {
        let params = json!([
            SPL_TOKEN_PROGRAM,
            {
                "commitment": self.commitment,
                "encoding": "base64",
                "dataSlice": { "offset": 0, "length": 0 },
                "filters": [
                    { "dataSize": TOKEN_ACCOUNT_LEN },
                    { "memcmp": { "offset": 0, "bytes": mint } }
                ]
            }
        ]);
        let accounts: Vec<Value> = self.call("getProgramAccounts", params).await?;
        Ok(accounts.len() as u64)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, CollectorError> {
        self.retry
            .run(method, || {
                let params = params.clone();
                async move {
                    self.limiter.acquire().await;
                    self.send(method, params).await
                }
            })
            .await
    }

    async fn send<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, CollectorError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self.client.post(&self.url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CollectorError::Status {
                status: status.as_u16(),
                endpoint: format!("{} {}", self.url, method),
            });
        }

        let body: JsonRpcResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(CollectorError::Rpc { code: error.code, message: error.message });
        }

        debug!(method = method, id = ?body.id, "RPC call completed");
        Ok(serde_json::from_value(body.result)?)
    }
}
