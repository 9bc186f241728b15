//! Shared fixtures for lifecycle integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use alloy::primitives::U256;
use async_trait::async_trait;

use coldtx::chain::{AccountAdapter, ChainAdapter, UtxoAdapter};
use coldtx::keys::{KeyAddrFile, RawKeylist};
use coldtx::rpc::{NetworkRpc, Receipt, RpcError, RpcResult};
use coldtx::tx::{TxEngine, TxOptions};

// Anvil development accounts
pub const KEY_0: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const ADDR_0: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
pub const KEY_1: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const ADDR_1: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
pub const KEY_2: &str = "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";
pub const ADDR_2: &str = "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC";

// private key 1 and its compressed P2PKH address
pub const BTC_KEY: &str = "0000000000000000000000000000000000000000000000000000000000000001";
pub const BTC_ADDR: &str = "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH";
pub const BTC_DEST: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";

pub const SEED_ID: &str = "98831F3A";
pub const CHAIN_ID: u64 = 11155111;
pub const GWEI: u64 = 1_000_000_000;

pub fn eth(whole: u64) -> U256 {
    U256::from(whole) * U256::from(10u64).pow(U256::from(18u64))
}

pub fn gwei(n: u64) -> U256 {
    U256::from(n) * U256::from(GWEI)
}

#[derive(Default)]
struct MockState {
    nonces: HashMap<String, u64>,
    chain_id: u64,
    fee_rate: U256,
    block_height: u64,
    submitted: Vec<Vec<u8>>,
    receipts: HashMap<String, Receipt>,
    pool: HashSet<String>,
    submit_reply: Option<String>,
    failing: HashSet<&'static str>,
    calls: Vec<&'static str>,
}

/// In-memory node. Submissions land in the pending pool, like a real node.
pub struct MockRpc {
    adapter: Arc<dyn ChainAdapter>,
    state: Mutex<MockState>,
    pool_supported: bool,
}

impl MockRpc {
    pub fn new(adapter: Arc<dyn ChainAdapter>) -> Self {
        Self {
            adapter,
            state: Mutex::new(MockState {
                chain_id: CHAIN_ID,
                fee_rate: gwei(30),
                block_height: 1_000,
                ..MockState::default()
            }),
            pool_supported: true,
        }
    }

    pub fn without_pool_support(mut self) -> Self {
        self.pool_supported = false;
        self
    }

    pub fn set_nonce(&self, address: &str, nonce: u64) {
        self.state.lock().unwrap().nonces.insert(address.to_lowercase(), nonce);
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.state.lock().unwrap().chain_id = chain_id;
    }

    pub fn set_fee_rate(&self, rate: U256) {
        self.state.lock().unwrap().fee_rate = rate;
    }

    pub fn set_block_height(&self, height: u64) {
        self.state.lock().unwrap().block_height = height;
    }

    /// Make `submit` report this ID instead of the real one.
    pub fn set_submit_reply(&self, txid: &str) {
        self.state.lock().unwrap().submit_reply = Some(txid.to_string());
    }

    pub fn fail(&self, query: &'static str) {
        self.state.lock().unwrap().failing.insert(query);
    }

    /// Move a transaction from the pool into a block.
    pub fn confirm(&self, txid: &str, block_height: u64, succeeded: bool) {
        let mut state = self.state.lock().unwrap();
        state.pool.remove(txid);
        state
            .receipts
            .insert(txid.to_string(), Receipt::included_at(block_height).with_execution(succeeded));
    }

    /// Drop a transaction from the pool without mining it.
    pub fn evict(&self, txid: &str) {
        self.state.lock().unwrap().pool.remove(txid);
    }

    pub fn submitted(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn calls(&self, query: &str) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| **c == query).count()
    }

    fn enter(&self, query: &'static str) -> RpcResult<std::sync::MutexGuard<'_, MockState>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(query);
        if state.failing.contains(query) {
            return Err(RpcError::Timeout { query, secs: 10 });
        }
        Ok(state)
    }
}

#[async_trait]
impl NetworkRpc for MockRpc {
    async fn get_next_nonce(&self, address: &str) -> RpcResult<u64> {
        let state = self.enter("getNextNonce")?;
        Ok(state.nonces.get(&address.to_lowercase()).copied().unwrap_or(0))
    }

    async fn get_chain_id(&self) -> RpcResult<u64> {
        Ok(self.enter("getChainId")?.chain_id)
    }

    async fn get_fee_rate_estimate(&self) -> RpcResult<U256> {
        Ok(self.enter("getFeeRateEstimate")?.fee_rate)
    }

    async fn submit(&self, signed: &[u8]) -> RpcResult<String> {
        let txid = self.adapter.compute_txid(signed).map_err(|e| RpcError::Response {
            query: "submit",
            message: e.to_string(),
        })?;
        let mut state = self.enter("submit")?;
        state.submitted.push(signed.to_vec());
        state.pool.insert(txid.clone());
        Ok(state.submit_reply.clone().unwrap_or(txid))
    }

    async fn get_receipt(&self, txid: &str) -> RpcResult<Receipt> {
        let state = self.enter("getReceipt")?;
        Ok(state.receipts.get(txid).cloned().unwrap_or_else(Receipt::not_found))
    }

    async fn get_pending_pool(&self) -> RpcResult<HashSet<String>> {
        Ok(self.enter("getPendingPool")?.pool.clone())
    }

    fn supports_pending_pool(&self) -> bool {
        self.pool_supported
    }

    async fn get_current_block_height(&self) -> RpcResult<u64> {
        Ok(self.enter("getCurrentBlockHeight")?.block_height)
    }
}

pub fn account_adapter() -> Arc<dyn ChainAdapter> {
    Arc::new(AccountAdapter::default())
}

pub fn utxo_adapter() -> Arc<dyn ChainAdapter> {
    Arc::new(UtxoAdapter::default())
}

/// 1 ETH ceiling, no adjustment.
pub fn options() -> TxOptions {
    TxOptions::new(eth(1))
}

pub fn account_engine() -> TxEngine<Arc<MockRpc>> {
    let adapter = account_adapter();
    let rpc = Arc::new(MockRpc::new(adapter.clone()));
    TxEngine::new(adapter, rpc, options()).with_expected_chain_id(Some(CHAIN_ID))
}

pub fn utxo_engine() -> TxEngine<Arc<MockRpc>> {
    let adapter = utxo_adapter();
    let rpc = Arc::new(MockRpc::new(adapter.clone()));
    TxEngine::new(adapter, rpc, TxOptions::new(U256::from(300_000u64)))
}

/// Key-address file for seed `SEED_ID`, type `E`, with the given (index, claimed address, key).
pub fn kafile(entries: &[(u32, &str, &str)]) -> KeyAddrFile {
    let entries: Vec<String> = entries
        .iter()
        .map(|(index, address, key)| format!(r#"{{"index":{},"address":"{}","key":"{}"}}"#, index, address, key))
        .collect();
    let json = format!(
        r#"{{"seed_id":"{}","addr_type":"E","entries":[{}]}}"#,
        SEED_ID,
        entries.join(",")
    );
    KeyAddrFile::from_json("test.akeys", &json).unwrap()
}

pub fn keylist(adapter: Arc<dyn ChainAdapter>, keys: &[&str]) -> RawKeylist {
    RawKeylist::parse("test.keys", &keys.join("\n"), adapter).unwrap()
}
