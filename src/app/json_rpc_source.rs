//! [`ChainSource`] and [`TransactionSubmitter`] over Ethereum JSON-RPC.
//!
//! Live events are emulated with log filters (`eth_newFilter` and
//! `eth_getFilterChanges`), which every HTTP endpoint supports.

use crate::{
    abi::{
        self,
        B256,
    },
    actions::{
        ContractCall,
        TransactionSubmitter,
        TxHash,
    },
    app::chain_source::{
        ChainSource,
        StateField,
        StateValue,
        Subscription,
    },
    config::AppConfig,
    error::{
        SourceError,
        SubmissionError,
    },
    events::{
        Address,
        EventKind,
        RawLog,
    },
};
use alloy_primitives::U256;
use serde::{
    Deserialize,
    Serialize,
    de::DeserializeOwned,
};
use serde_json::{
    Value,
    json,
};
use std::{
    sync::{
        Arc,
        atomic::{
            AtomicU64,
            Ordering,
        },
    },
    time::Duration,
};
use tokio::{
    sync::{
        mpsc,
        oneshot,
    },
    time::{
        self,
        Instant,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    warn,
};
use url::Url;


#[derive(Clone)]
pub struct JsonRpcClient {
    url: Url,
    http: reqwest::Client,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcClient {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                SourceError::Unavailable(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self::with_http(url, http))
    }

    pub fn with_http(url: Url, http: reqwest::Client) -> Self {
        Self {
            url,
            http,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, SourceError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let res = self
            .http
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|err| SourceError::Unavailable(format!("{method}: {err}")))?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|err| SourceError::Unavailable(format!("{method}: {err}")))?;
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes);
            return Err(SourceError::Unavailable(format!(
                "node responded with {status} to {method}: {body}"
            )));
        }
        let response: RpcResponse = serde_json::from_slice(&bytes).map_err(|err| {
            SourceError::InvalidResponse(format!("{method}: invalid payload: {err}"))
        })?;
        if let Some(error) = response.error {
            return Err(SourceError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        serde_json::from_value(response.result).map_err(|err| {
            SourceError::InvalidResponse(format!("{method}: unexpected result: {err}"))
        })
    }
}

#[derive(Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogDto {
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
    log_index: Option<String>,
    #[serde(default)]
    removed: bool,
}

impl TryFrom<LogDto> for RawLog {
    type Error = SourceError;

    fn try_from(dto: LogDto) -> Result<Self, Self::Error> {
        let topics = dto
            .topics
            .iter()
            .map(|topic| parse_word(topic))
            .collect::<Result<Vec<_>, _>>()?;
        let data = abi::from_hex(&dto.data)
            .map_err(|err| SourceError::InvalidResponse(err.to_string()))?;
        let block_number = dto.block_number.as_deref().map(parse_u64).transpose()?;
        let log_index = dto.log_index.as_deref().map(parse_u64).transpose()?;
        Ok(RawLog {
            topics,
            data,
            block_number: block_number.unwrap_or_default(),
            log_index: log_index.unwrap_or_default(),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptDto {
    status: Option<String>,
    block_number: Option<String>,
}

/// `0x`-prefixed hex quantity without leading zeros.
pub fn quantity(value: u64) -> String {
    format!("{value:#x}")
}

pub fn parse_quantity(raw: &str) -> Result<u128, SourceError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|err| SourceError::InvalidResponse(format!("bad quantity '{raw}': {err}")))
}

fn parse_u64(raw: &str) -> Result<u64, SourceError> {
    u64::try_from(parse_quantity(raw)?)
        .map_err(|_| SourceError::InvalidResponse(format!("quantity '{raw}' exceeds u64")))
}

fn parse_word(raw: &str) -> Result<B256, SourceError> {
    let bytes =
        abi::from_hex(raw).map_err(|err| SourceError::InvalidResponse(err.to_string()))?;
    B256::try_from(bytes.as_slice()).map_err(|_| {
        SourceError::InvalidResponse(format!("expected 32-byte word, got {}", bytes.len()))
    })
}

fn decode_logs(logs: Vec<LogDto>) -> Vec<RawLog> {
    logs.into_iter()
        .filter(|log| !log.removed)
        .filter_map(|log| match RawLog::try_from(log) {
            Ok(raw) => Some(raw),
            Err(err) => {
                warn!(?err, "skipping malformed log");
                None
            }
        })
        .collect()
}

#[derive(Clone)]
pub struct JsonRpcSource {
    client: JsonRpcClient,
    contract: Address,
    filter_interval: Duration,
}

impl JsonRpcSource {
    pub fn new(client: JsonRpcClient, contract: Address, filter_interval: Duration) -> Self {
        Self {
            client,
            contract,
            filter_interval,
        }
    }

    pub fn connect(config: &AppConfig) -> Result<Self, SourceError> {
        let client = JsonRpcClient::new(config.rpc_url.clone(), config.poll.fetch_timeout)?;
        Ok(Self::new(
            client,
            config.contract,
            config.poll.filter_interval,
        ))
    }

    pub fn client(&self) -> &JsonRpcClient {
        &self.client
    }

    pub async fn chain_id(&self) -> Result<u64, SourceError> {
        let raw: String = self.client.call("eth_chainId", json!([])).await?;
        parse_u64(&raw)
    }

    fn log_filter(&self, kind: EventKind) -> Value {
        json!({
            "address": self.contract.to_string(),
            "topics": [abi::to_hex(kind.topic())],
        })
    }
}

impl ChainSource for JsonRpcSource {
    async fn latest_block(&self) -> Result<u64, SourceError> {
        let raw: String = self.client.call("eth_blockNumber", json!([])).await?;
        parse_u64(&raw)
    }

    async fn read_state(&self, field: StateField) -> Result<StateValue, SourceError> {
        let mut call = json!({
            "to": self.contract.to_string(),
            "data": abi::to_hex(field.calldata()),
        });
        if let Some(caller) = field.caller() {
            call["from"] = json!(caller.to_string());
        }
        let raw: String = self.client.call("eth_call", json!([call, "latest"])).await?;
        let returned = abi::from_hex(&raw)
            .map_err(|err| SourceError::InvalidResponse(err.to_string()))?;
        field.decode_output(&returned).map_err(|err| {
            SourceError::InvalidResponse(format!("{}: {err}", field.signature()))
        })
    }

    async fn balance(&self, account: Address) -> Result<U256, SourceError> {
        self.client
            .call("eth_getBalance", json!([account.to_string(), "latest"]))
            .await
    }

    async fn query_events(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, SourceError> {
        let mut filter = self.log_filter(kind);
        filter["fromBlock"] = json!(quantity(from_block));
        filter["toBlock"] = json!(quantity(to_block));
        let logs: Vec<LogDto> = self.client.call("eth_getLogs", json!([filter])).await?;
        Ok(decode_logs(logs))
    }

    async fn subscribe(&self, kind: EventKind) -> Result<Subscription, SourceError> {
        let mut filter = self.log_filter(kind);
        filter["fromBlock"] = json!("latest");
        let filter_id: String = self
            .client
            .call("eth_newFilter", json!([filter.clone()]))
            .await?;
        debug!(%kind, %filter_id, "installed log filter");
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let producer = tokio::spawn(filter_loop(
            self.client.clone(),
            filter,
            filter_id,
            self.filter_interval,
            events_tx,
            cancel_rx,
        ));
        Ok(Subscription::with_producer(
            kind, events_rx, cancel_tx, producer,
        ))
    }
}

async fn filter_loop(
    client: JsonRpcClient,
    filter: Value,
    mut filter_id: String,
    interval: Duration,
    events: mpsc::UnboundedSender<RawLog>,
    mut cancel: oneshot::Receiver<()>,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    'poll: loop {
        tokio::select! {
            _ = &mut cancel => break,
            _ = ticker.tick() => {}
        }
        match client
            .call::<Vec<LogDto>>("eth_getFilterChanges", json!([filter_id]))
            .await
        {
            Ok(logs) => {
                for log in decode_logs(logs) {
                    if events.send(log).is_err() {
                        break 'poll;
                    }
                }
            }
            Err(SourceError::Rpc { message, .. }) if message.contains("filter not found") => {
                match client
                    .call::<String>("eth_newFilter", json!([filter.clone()]))
                    .await
                {
                    Ok(id) => {
                        debug!(old = %filter_id, new = %id, "reinstalled expired log filter");
                        filter_id = id;
                    }
                    Err(err) => warn!(?err, "failed to reinstall log filter"),
                }
            }
            Err(err) => warn!(?err, "log filter poll failed"),
        }
        if events.is_closed() {
            break;
        }
    }
    if let Err(err) = client
        .call::<bool>("eth_uninstallFilter", json!([filter_id]))
        .await
    {
        debug!(?err, "failed to uninstall log filter");
    }
}

/// Sends transactions from an account the node manages.
#[derive(Clone)]
pub struct JsonRpcSubmitter {
    client: JsonRpcClient,
    contract: Address,
    from: Address,
}

impl JsonRpcSubmitter {
    pub fn new(client: JsonRpcClient, contract: Address, from: Address) -> Self {
        Self {
            client,
            contract,
            from,
        }
    }

    /// Polls for the receipt of `hash`. A reverted transaction is a
    /// [`SubmissionError::Rejected`].
    pub async fn wait_for_receipt(
        &self,
        hash: TxHash,
        timeout: Duration,
        poll: Duration,
    ) -> Result<u64, SubmissionError> {
        let deadline = Instant::now() + timeout;
        loop {
            let receipt: Option<ReceiptDto> = self
                .client
                .call("eth_getTransactionReceipt", json!([hash.to_string()]))
                .await
                .map_err(|err| SubmissionError::Rejected(err.to_string()))?;
            if let Some(receipt) = receipt {
                let status = receipt.status.as_deref().map(parse_quantity).transpose();
                let block = receipt.block_number.as_deref().map(parse_u64).transpose();
                return match (status, block) {
                    (Ok(Some(0)), _) => Err(SubmissionError::Rejected(format!(
                        "transaction {hash} reverted"
                    ))),
                    (Ok(_), Ok(block)) => Ok(block.unwrap_or_default()),
                    (Err(err), _) | (_, Err(err)) => {
                        Err(SubmissionError::Rejected(err.to_string()))
                    }
                };
            }
            if Instant::now() + poll > deadline {
                return Err(SubmissionError::Rejected(format!(
                    "no receipt for {hash} within {timeout:?}"
                )));
            }
            time::sleep(poll).await;
        }
    }
}

impl TransactionSubmitter for JsonRpcSubmitter {
    async fn submit(&self, call: &ContractCall) -> Result<TxHash, SubmissionError> {
        let tx = json!({
            "from": self.from.to_string(),
            "to": self.contract.to_string(),
            "data": abi::to_hex(call.calldata()),
            "value": call.value,
        });
        let raw: String = self
            .client
            .call("eth_sendTransaction", json!([tx]))
            .await
            .map_err(|err| match err {
                SourceError::Rpc { message, .. } => SubmissionError::classify(&message),
                other => SubmissionError::Rejected(other.to_string()),
            })?;
        let hash: TxHash = raw
            .parse()
            .map_err(|err| SubmissionError::Rejected(format!("bad transaction hash: {err}")))?;
        debug!(action = call.action.name(), %hash, "transaction submitted");
        Ok(hash)
    }
}
