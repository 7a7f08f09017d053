//! The RPC method handlers and their dispatch table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use lazy_static::lazy_static;
use serde_json::{json, Value};
use tracing::info;

use meridian_chain::amount::{Amount, COIN};
use meridian_chain::block::{Block, Height};
use meridian_chain::transaction::{self, Transaction};
use meridian_chain::transparent::Address;
use meridian_chain::{MeridianDeserialize, MeridianSerialize};

use crate::{codes, RpcError, SharedState};

type Handler = fn(&SharedState, &[Value]) -> Result<Value, RpcError>;

lazy_static! {
    /// The method dictionary. Every supported call is listed here; the
    /// HTTP layer routes by lookup, never by hand-written branches.
    static ref DISPATCH_TABLE: HashMap<&'static str, Handler> = {
        let mut table: HashMap<&'static str, Handler> = HashMap::new();
        table.insert("getblockcount", get_block_count);
        table.insert("getbestblockhash", get_best_block_hash);
        table.insert("getblockhash", get_block_hash);
        table.insert("getblock", get_block);
        table.insert("getblockchaininfo", get_blockchain_info);
        table.insert("getdifficulty", get_difficulty);
        table.insert("getmempoolinfo", get_mempool_info);
        table.insert("getrawmempool", get_raw_mempool);
        table.insert("getrawtransaction", get_raw_transaction);
        table.insert("gettxout", get_tx_out);
        table.insert("sendrawtransaction", send_raw_transaction);
        table.insert("getnewaddress", get_new_address);
        table.insert("getbalance", get_balance);
        table.insert("sendtoaddress", send_to_address);
        table.insert("listunspent", list_unspent);
        table.insert("getpeerinfo", get_peer_info);
        table.insert("stop", stop);
        table
    };
}

/// Run one method against the shared node state.
pub fn dispatch(state: &SharedState, method: &str, params: &[Value]) -> Result<Value, RpcError> {
    match DISPATCH_TABLE.get(method) {
        Some(handler) => handler(state, params),
        None => Err(RpcError::method_not_found(method)),
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("the clock is past 1970")
        .as_secs()
}

fn param_str<'p>(params: &'p [Value], index: usize, name: &str) -> Result<&'p str, RpcError> {
    params
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params(format!("expected string parameter '{}'", name)))
}

fn param_u64(params: &[Value], index: usize, name: &str) -> Result<u64, RpcError> {
    params
        .get(index)
        .and_then(Value::as_u64)
        .ok_or_else(|| RpcError::invalid_params(format!("expected numeric parameter '{}'", name)))
}

fn param_bool_or(params: &[Value], index: usize, default: bool) -> bool {
    params
        .get(index)
        .and_then(Value::as_bool)
        .unwrap_or(default)
}

/// Parse a decimal MRD amount into base units.
fn param_amount(params: &[Value], index: usize) -> Result<Amount, RpcError> {
    let value = params
        .get(index)
        .and_then(Value::as_f64)
        .ok_or_else(|| RpcError::invalid_params("expected an amount"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(RpcError::invalid_params("amount out of range"));
    }
    let units = (value * COIN as f64).round() as u64;
    Amount::from_units(units).map_err(|_| RpcError::invalid_params("amount exceeds supply"))
}

fn get_block_count(state: &SharedState, _params: &[Value]) -> Result<Value, RpcError> {
    let chain = state.chain.read().expect("chain lock poisoned");
    Ok(json!(chain.height().0))
}

fn get_best_block_hash(state: &SharedState, _params: &[Value]) -> Result<Value, RpcError> {
    let chain = state.chain.read().expect("chain lock poisoned");
    Ok(json!(chain.best_hash().to_string()))
}

fn get_block_hash(state: &SharedState, params: &[Value]) -> Result<Value, RpcError> {
    let height = Height(param_u64(params, 0, "height")? as u32);
    let chain = state.chain.read().expect("chain lock poisoned");
    match chain.hash_at_height(height) {
        Some(hash) => Ok(json!(hash.to_string())),
        None => Err(RpcError::not_found("block height out of range")),
    }
}

fn block_to_json(state: &SharedState, block: &Block) -> Value {
    let chain = state.chain.read().expect("chain lock poisoned");
    let hash = block.hash();
    let height = chain.main_chain_height(&hash);
    let confirmations = height
        .map(|height| chain.height().0 - height.0 + 1)
        .unwrap_or(0);

    json!({
        "hash": hash.to_string(),
        "confirmations": confirmations,
        "size": block.serialized_size(),
        "height": height.map(|height| height.0),
        "version": block.header.version,
        "merkleroot": format!("{:?}", block.header.merkle_root),
        "time": block.header.time,
        "bits": format!("{:08x}", block.header.bits.0),
        "nonce": block.header.nonce,
        "previousblockhash": block.header.previous_block_hash.to_string(),
        "tx": block
            .transactions
            .iter()
            .map(|tx| tx.hash().to_string())
            .collect::<Vec<_>>(),
    })
}

fn get_block(state: &SharedState, params: &[Value]) -> Result<Value, RpcError> {
    let hash: meridian_chain::block::Hash = param_str(params, 0, "hash")?
        .parse()
        .map_err(|_| RpcError::invalid_params("malformed block hash"))?;
    let verbose = param_bool_or(params, 1, true);

    let block = {
        let chain = state.chain.read().expect("chain lock poisoned");
        chain
            .block(&hash)
            .ok_or_else(|| RpcError::not_found("block not found"))?
    };

    if verbose {
        Ok(block_to_json(state, &block))
    } else {
        let bytes = block
            .mrd_serialize_to_vec()
            .expect("serializing to a vec is infallible");
        Ok(json!(hex::encode(bytes)))
    }
}

fn get_blockchain_info(state: &SharedState, _params: &[Value]) -> Result<Value, RpcError> {
    let chain = state.chain.read().expect("chain lock poisoned");
    Ok(json!({
        "chain": chain.network().to_string(),
        "height": chain.height().0,
        "bestblockhash": chain.best_hash().to_string(),
        "chainwork": chain.best_chain_work().to_string(),
    }))
}

fn get_difficulty(state: &SharedState, _params: &[Value]) -> Result<Value, RpcError> {
    let chain = state.chain.read().expect("chain lock poisoned");
    let network = chain.network();
    let difficulty = chain
        .best_header()
        .bits
        .to_expanded()
        .map(|target| target.relative_difficulty(network.max_target()))
        .unwrap_or(0.0);
    Ok(json!(difficulty))
}

fn get_mempool_info(state: &SharedState, _params: &[Value]) -> Result<Value, RpcError> {
    let chain = state.chain.read().expect("chain lock poisoned");
    Ok(json!({
        "size": chain.mempool.len(),
        "bytes": chain.mempool.total_bytes(),
    }))
}

fn get_raw_mempool(state: &SharedState, params: &[Value]) -> Result<Value, RpcError> {
    let verbose = param_bool_or(params, 0, false);
    let chain = state.chain.read().expect("chain lock poisoned");

    if verbose {
        let entries: serde_json::Map<String, Value> = chain
            .mempool
            .entries()
            .map(|entry| {
                (
                    entry.transaction.hash().to_string(),
                    json!({
                        "size": entry.size,
                        "fee": entry.fee.to_string(),
                        "feerate": entry.fee_rate,
                        "time": entry.time_added,
                    }),
                )
            })
            .collect();
        Ok(Value::Object(entries))
    } else {
        Ok(json!(chain
            .mempool
            .txids()
            .iter()
            .map(|txid| txid.to_string())
            .collect::<Vec<_>>()))
    }
}

fn tx_to_json(
    tx: &Transaction,
    block_hash: Option<meridian_chain::block::Hash>,
    confirmations: u32,
) -> Value {
    json!({
        "txid": tx.hash().to_string(),
        "version": tx.version,
        "size": tx.serialized_size(),
        "locktime": tx.lock_time.0,
        "vin": tx.inputs.iter().map(|input| {
            if input.previous_output.is_null() {
                json!({
                    "coinbase": hex::encode(&input.script_sig.0),
                    "sequence": input.sequence,
                })
            } else {
                json!({
                    "txid": input.previous_output.hash.to_string(),
                    "vout": input.previous_output.index,
                    "scriptSig": hex::encode(&input.script_sig.0),
                    "sequence": input.sequence,
                })
            }
        }).collect::<Vec<_>>(),
        "vout": tx.outputs.iter().enumerate().map(|(n, output)| json!({
            "value": output.value.to_string(),
            "n": n,
            "scriptPubKey": hex::encode(&output.script_pubkey.0),
        })).collect::<Vec<_>>(),
        "blockhash": block_hash.map(|hash| hash.to_string()),
        "confirmations": confirmations,
    })
}

fn get_raw_transaction(state: &SharedState, params: &[Value]) -> Result<Value, RpcError> {
    let txid: transaction::Hash = param_str(params, 0, "txid")?
        .parse()
        .map_err(|_| RpcError::invalid_params("malformed txid"))?;
    let verbose = param_bool_or(params, 1, false);

    let chain = state.chain.read().expect("chain lock poisoned");
    let (tx, block_hash) = chain
        .transaction(&txid)
        .ok_or_else(|| RpcError::not_found("transaction not found"))?;

    if verbose {
        let confirmations = block_hash
            .and_then(|hash| chain.main_chain_height(&hash))
            .map(|height| chain.height().0 - height.0 + 1)
            .unwrap_or(0);
        Ok(tx_to_json(&tx, block_hash, confirmations))
    } else {
        let bytes = tx
            .mrd_serialize_to_vec()
            .expect("serializing to a vec is infallible");
        Ok(json!(hex::encode(bytes)))
    }
}

fn get_tx_out(state: &SharedState, params: &[Value]) -> Result<Value, RpcError> {
    let txid: transaction::Hash = param_str(params, 0, "txid")?
        .parse()
        .map_err(|_| RpcError::invalid_params("malformed txid"))?;
    let vout = param_u64(params, 1, "vout")? as u32;

    let chain = state.chain.read().expect("chain lock poisoned");
    let outpoint = meridian_chain::transparent::OutPoint { hash: txid, index: vout };
    match chain.utxos().get(&outpoint) {
        Some(entry) => Ok(json!({
            "bestblock": chain.best_hash().to_string(),
            "confirmations": chain.height().0 - entry.height.0 + 1,
            "value": entry.output.value.to_string(),
            "scriptPubKey": hex::encode(&entry.output.script_pubkey.0),
            "coinbase": entry.is_coinbase,
        })),
        None => Ok(Value::Null),
    }
}

fn send_raw_transaction(state: &SharedState, params: &[Value]) -> Result<Value, RpcError> {
    let raw = hex::decode(param_str(params, 0, "hexstring")?)
        .map_err(|_| RpcError::invalid_params("transaction is not valid hex"))?;
    let tx = Transaction::mrd_deserialize(&raw[..])
        .map_err(|error| RpcError::invalid_params(format!("undecodable transaction: {}", error)))?;

    let txid = {
        let mut chain = state.chain.write().expect("chain lock poisoned");
        chain
            .submit_transaction(Arc::new(tx), now())
            .map_err(|error| RpcError::new(codes::MISC_ERROR, error.to_string()))?
    };

    state.node.relay_transaction(txid);
    Ok(json!(txid.to_string()))
}

fn get_new_address(state: &SharedState, params: &[Value]) -> Result<Value, RpcError> {
    let label = params
        .get(0)
        .and_then(Value::as_str)
        .map(|label| label.to_owned());
    let mut wallet = state.wallet.lock().expect("wallet lock poisoned");
    Ok(json!(wallet.new_address(label).to_string()))
}

fn get_balance(state: &SharedState, _params: &[Value]) -> Result<Value, RpcError> {
    let chain = state.chain.read().expect("chain lock poisoned");
    let wallet = state.wallet.lock().expect("wallet lock poisoned");
    let balance = wallet.balance(chain.utxos(), chain.height());
    Ok(json!(balance.to_string()))
}

fn send_to_address(state: &SharedState, params: &[Value]) -> Result<Value, RpcError> {
    let address: Address = param_str(params, 0, "address")?
        .parse()
        .map_err(|_| RpcError::not_found("malformed address"))?;
    let amount = param_amount(params, 1)?;
    // An optional comment is accepted for interface compatibility, but the
    // wallet keeps no transaction metadata.
    let _comment = params.get(2).and_then(Value::as_str);

    let tx = {
        let chain = state.chain.read().expect("chain lock poisoned");
        let mut wallet = state.wallet.lock().expect("wallet lock poisoned");
        wallet
            .create_transaction(chain.utxos(), chain.height(), &address, amount)
            .map_err(|error| match error {
                meridian_wallet::WalletError::InsufficientFunds { .. } => {
                    RpcError::new(codes::WALLET_INSUFFICIENT_FUNDS, error.to_string())
                }
                other => RpcError::new(codes::MISC_ERROR, other.to_string()),
            })?
    };

    let txid = {
        let mut chain = state.chain.write().expect("chain lock poisoned");
        chain
            .submit_transaction(Arc::new(tx), now())
            .map_err(|error| RpcError::new(codes::MISC_ERROR, error.to_string()))?
    };

    state.node.relay_transaction(txid);
    info!(%txid, "wallet payment submitted");
    Ok(json!(txid.to_string()))
}

fn list_unspent(state: &SharedState, params: &[Value]) -> Result<Value, RpcError> {
    let min_confirmations = params.get(0).and_then(Value::as_u64).unwrap_or(1) as u32;

    let chain = state.chain.read().expect("chain lock poisoned");
    let wallet = state.wallet.lock().expect("wallet lock poisoned");
    let unspent = wallet.unspent(chain.utxos(), chain.height(), min_confirmations);

    Ok(json!(unspent
        .iter()
        .map(|unspent| json!({
            "txid": unspent.outpoint.hash.to_string(),
            "vout": unspent.outpoint.index,
            "address": unspent.address.to_string(),
            "amount": unspent.value.to_string(),
            "confirmations": unspent.confirmations,
            "coinbase": unspent.is_coinbase,
        }))
        .collect::<Vec<_>>()))
}

fn get_peer_info(state: &SharedState, _params: &[Value]) -> Result<Value, RpcError> {
    Ok(json!(state
        .node
        .peer_statuses()
        .iter()
        .map(|peer| json!({
            "addr": peer.addr.to_string(),
            "inbound": peer.inbound,
            "version": peer.version,
            "subver": peer.user_agent,
            "startingheight": peer.start_height,
            "pingtime": peer.latency_ms,
            "banscore": peer.misbehavior,
        }))
        .collect::<Vec<_>>()))
}

fn stop(state: &SharedState, _params: &[Value]) -> Result<Value, RpcError> {
    info!("shutdown requested over RPC");
    state.node.request_shutdown();
    Ok(json!("Meridian server stopping"))
}
