use alloy_primitives::hex;
use dv_chain_client::ProviderError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

const EXECUTION_ERROR_CODE: i64 = -32000;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TxReceipt {
    pub(crate) transaction_hash: String,
    #[serde(default)]
    pub(crate) status: Option<String>,
    #[serde(default)]
    pub(crate) gas_used: Option<String>,
    #[serde(default)]
    pub(crate) contract_address: Option<String>,
    #[serde(default)]
    pub(crate) block_number: Option<String>,
}

/// How long to wait for a sent transaction to be mined.
#[derive(Debug, Clone, Copy)]
pub struct ReceiptPolling {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReceiptPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_attempts: 240,
        }
    }
}

pub(crate) struct RpcClient {
    endpoint: String,
    http: reqwest::Client,
    next_id: AtomicU64,
    pub(crate) receipts: ReceiptPolling,
}

impl RpcClient {
    pub(crate) fn new(endpoint: String, receipts: ReceiptPolling) -> Self {
        Self {
            endpoint,
            http: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
            receipts,
        }
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "rpc request");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&RpcRequest {
                jsonrpc: "2.0",
                id,
                method,
                params,
            })
            .send()
            .await
            .map_err(|err| ProviderError::Transport(format!("{method}: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Transport(format!("{method}: HTTP {status}: {text}")));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::InvalidResponse(format!("{method}: {err}")))?;

        if let Some(error) = body.error {
            return Err(ProviderError::Rpc {
                code: error.code,
                message: with_revert_reason(error.message, error.data.as_ref()),
            });
        }

        serde_json::from_value(body.result.unwrap_or(Value::Null))
            .map_err(|err| ProviderError::InvalidResponse(format!("{method}: {err}")))
    }

    /// Polls for the receipt of `tx_hash`. A mined receipt with failed status
    /// becomes an execution error; exhausting the gas limit is called out.
    /// `sent` is the transaction object, replayed to recover a revert reason.
    pub(crate) async fn wait_for_receipt(
        &self,
        tx_hash: &str,
        gas_limit: Option<u64>,
        sent: Option<&Value>,
    ) -> Result<TxReceipt, ProviderError> {
        for _ in 0..self.receipts.max_attempts {
            let receipt: Option<TxReceipt> = self
                .call("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;

            let Some(receipt) = receipt else {
                tokio::time::sleep(self.receipts.interval).await;
                continue;
            };

            if receipt.status.as_deref() == Some("0x0") {
                let gas_used = receipt.gas_used.as_deref().map(parse_quantity).transpose()?;
                if gas_limit.is_some() && gas_used == gas_limit {
                    return Err(ProviderError::rpc(
                        EXECUTION_ERROR_CODE,
                        format!("transaction {tx_hash} ran out of gas"),
                    ));
                }
                return Err(self.revert_error(tx_hash, &receipt, sent).await);
            }

            return Ok(receipt);
        }

        Err(ProviderError::Transport(format!(
            "transaction {tx_hash} not mined after {} polls",
            self.receipts.max_attempts
        )))
    }

    /// A mined revert carries no reason. Re-running the call against the
    /// block it was mined in makes the node report one.
    async fn revert_error(&self, tx_hash: &str, receipt: &TxReceipt, sent: Option<&Value>) -> ProviderError {
        let reverted = format!("transaction {tx_hash} reverted");
        let (Some(tx), Some(block)) = (sent, receipt.block_number.as_deref()) else {
            return ProviderError::rpc(EXECUTION_ERROR_CODE, reverted);
        };

        match self.call::<Value>("eth_call", json!([tx, block])).await {
            Err(ProviderError::Rpc { message, .. }) => {
                ProviderError::rpc(EXECUTION_ERROR_CODE, format!("{reverted}: {message}"))
            }
            Err(err) => {
                debug!(tx_hash, "revert replay failed: {err}");
                ProviderError::rpc(EXECUTION_ERROR_CODE, reverted)
            }
            Ok(_) => ProviderError::rpc(EXECUTION_ERROR_CODE, reverted),
        }
    }
}

/// Parses a hex quantity such as `0x539`.
pub(crate) fn parse_quantity(value: &str) -> Result<u64, ProviderError> {
    let digits = value.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|err| ProviderError::InvalidResponse(format!("bad quantity '{value}': {err}")))
}

pub(crate) fn to_quantity(value: u64) -> String {
    format!("0x{value:x}")
}

/// Some nodes keep the revert reason only in `error.data` as ABI-encoded
/// `Error(string)`. Fold it into the message so callers can match on it.
fn with_revert_reason(message: String, data: Option<&Value>) -> String {
    let Some(raw) = data.and_then(|value| match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("data").and_then(Value::as_str).map(ToOwned::to_owned),
        _ => None,
    }) else {
        return message;
    };

    let Ok(bytes) = hex::decode(&raw) else {
        return message;
    };

    match alloy_sol_types::decode_revert_reason(&bytes) {
        Some(reason) if !message.contains(&reason) => format!("{message}: {reason}"),
        _ => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubNode;
    use std::sync::Arc;

    const TX: &str = "0x00000000000000000000000000000000000000000000000000000000000000ab";

    fn fast_polling() -> ReceiptPolling {
        ReceiptPolling {
            interval: Duration::from_millis(5),
            max_attempts: 5,
        }
    }

    async fn client(node: &StubNode) -> anyhow::Result<RpcClient> {
        Ok(RpcClient::new(node.serve().await?, fast_polling()))
    }

    fn failed_receipt(gas_used: &str) -> Value {
        json!({
            "transactionHash": TX,
            "status": "0x0",
            "gasUsed": gas_used,
            "blockNumber": "0x10",
        })
    }

    #[tokio::test]
    async fn receipt_is_polled_until_mined() -> anyhow::Result<()> {
        let node = StubNode::default();
        let polls = Arc::new(AtomicU64::new(0));
        {
            let polls = polls.clone();
            node.on("eth_getTransactionReceipt", move |_| {
                if polls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Ok(Value::Null)
                } else {
                    Ok(json!({ "transactionHash": TX, "status": "0x1", "gasUsed": "0x5208" }))
                }
            });
        }

        let receipt = client(&node).await?.wait_for_receipt(TX, Some(100_000), None).await?;
        assert_eq!(receipt.transaction_hash, TX);
        assert_eq!(polls.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn unmined_transaction_gives_up() -> anyhow::Result<()> {
        let node = StubNode::default();
        node.respond("eth_getTransactionReceipt", Value::Null);

        let err = client(&node).await?.wait_for_receipt(TX, None, None).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport(ref message) if message.contains("not mined")));
        assert_eq!(node.calls("eth_getTransactionReceipt").len(), 5);
        Ok(())
    }

    #[tokio::test]
    async fn exhausted_gas_limit_is_out_of_gas() -> anyhow::Result<()> {
        let node = StubNode::default();
        node.respond("eth_getTransactionReceipt", failed_receipt("0x186a0"));

        let err = client(&node)
            .await?
            .wait_for_receipt(TX, Some(100_000), Some(&json!({ "to": "0x01" })))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ran out of gas"), "{err}");
        assert!(node.calls("eth_call").is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn mined_revert_is_replayed_for_its_reason() -> anyhow::Result<()> {
        use alloy_sol_types::{Revert, SolError};

        let node = StubNode::default();
        node.respond("eth_getTransactionReceipt", failed_receipt("0x7530"));
        let reason = hex::encode_prefixed(
            Revert {
                reason: "You have already voted".to_owned(),
            }
            .abi_encode(),
        );
        node.on("eth_call", move |_| {
            Err(json!({ "code": -32000, "message": "execution reverted", "data": reason }))
        });

        let sent = json!({ "from": "0x1111111111111111111111111111111111111111", "to": "0x01", "data": "0x" });
        let err = client(&node)
            .await?
            .wait_for_receipt(TX, Some(100_000), Some(&sent))
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some(EXECUTION_ERROR_CODE));
        assert!(err.to_string().contains("reverted"), "{err}");
        assert!(err.to_string().contains("already voted"), "{err}");
        assert_eq!(node.calls("eth_call"), vec![json!([sent, "0x10"])]);
        Ok(())
    }

    #[tokio::test]
    async fn revert_without_replay_stays_generic() -> anyhow::Result<()> {
        let node = StubNode::default();
        node.respond("eth_getTransactionReceipt", failed_receipt("0x7530"));

        let err = client(&node).await?.wait_for_receipt(TX, Some(100_000), None).await.unwrap_err();
        assert!(err.to_string().ends_with("reverted"), "{err}");
        assert!(node.calls("eth_call").is_empty());
        Ok(())
    }

    #[test]
    fn quantities_parse_from_hex() {
        assert_eq!(parse_quantity("0x539").unwrap(), 1337);
        assert_eq!(parse_quantity("0xaa36a7").unwrap(), 11155111);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert!(parse_quantity("0xnothex").is_err());
        assert_eq!(to_quantity(100_000), "0x186a0");
    }

    #[test]
    fn revert_reason_is_appended_from_data() {
        use alloy_sol_types::{Revert, SolError};

        let encoded = Revert {
            reason: "You have already voted".to_owned(),
        }
        .abi_encode();
        let data = Value::String(hex::encode_prefixed(encoded));
        let message = with_revert_reason("execution reverted".to_owned(), Some(&data));
        assert!(message.contains("already voted"), "{message}");
    }

    #[test]
    fn message_without_data_is_untouched() {
        assert_eq!(with_revert_reason("boom".to_owned(), None), "boom");
        let garbage = Value::String("0xzz".to_owned());
        assert_eq!(with_revert_reason("boom".to_owned(), Some(&garbage)), "boom");
    }
}
