//! Shared utilities for integration tests: an in-process chain and a wired
//! pipeline around it.
#![allow(dead_code)]

use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::utils::parse_ether;
use alloy::primitives::{Address, Bytes, TxHash, TxKind, U256};
use alloy::sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

use stake_settlement::blockchain::abi::{IDexRouter, IProjectStaking, IERC20};
use stake_settlement::blockchain::{ChainError, ChainRegistry, ChainResult, ChainRpc, Receipt};
use stake_settlement::config::{ChainConfig, ChainKind, SettlementConfig};
use stake_settlement::settlement::worker::queue;
use stake_settlement::error::{SettlementError, SettlementResult};
use stake_settlement::settlement::{
    CampaignLedger, FileSettlementStore, InMemoryLedger, NewSettlement, SettlementPipeline,
    SettlementStore,
};
use stake_settlement::wallet::{WalletHandle, WalletStore};

/// Project token every test settles into.
pub const TOKEN: Address = Address::repeat_byte(0x70);
/// Staking contract every test stakes into.
pub const STAKING: Address = Address::repeat_byte(0x5a);
/// Token base units per wei of native currency.
pub const RATE: u64 = 50_000;
pub const GAS_PRICE_WEI: u128 = 5_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Swap,
    Approve,
    Stake,
}

#[derive(Debug, Clone)]
pub struct SentTx {
    pub hash: TxHash,
    pub from: Address,
    pub nonce: u64,
    pub op: Option<Op>,
}

#[derive(Default)]
struct ChainState {
    block: u64,
    native: HashMap<Address, U256>,
    tokens: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    staked: HashMap<Address, U256>,
    next_nonce: HashMap<Address, u64>,
    receipts: HashMap<TxHash, Receipt>,
    held: HashMap<TxHash, Receipt>,
    sent: Vec<SentTx>,
}

/// Chain double executing the router, token and staking calls the pipeline
/// makes. Signed transactions are decoded and their signer recovered, so
/// nonce reuse and wrong chain ids are rejected like a node would.
pub struct FakeChain {
    config: ChainConfig,
    state: Mutex<ChainState>,
    revert_on: Mutex<Option<Op>>,
    hold_receipts: Mutex<bool>,
    stale_nonces: Mutex<bool>,
    /// Share of the quoted output the router actually delivers, in bps.
    deliver_bps: Mutex<u64>,
    gas_price: Mutex<u128>,
    reject_sends: Mutex<bool>,
    on_send: Mutex<Option<Box<dyn Fn(TxHash) + Send + Sync>>>,
}

impl FakeChain {
    pub fn new(kind: ChainKind) -> Self {
        let mut config = ChainConfig::preset(kind);
        config.receipt_poll_interval_ms = 5;
        Self {
            config,
            state: Mutex::new(ChainState::default()),
            revert_on: Mutex::new(None),
            hold_receipts: Mutex::new(false),
            stale_nonces: Mutex::new(false),
            deliver_bps: Mutex::new(10_000),
            gas_price: Mutex::new(GAS_PRICE_WEI),
            reject_sends: Mutex::new(false),
            on_send: Mutex::new(None),
        }
    }

    pub fn fund(&self, address: Address, wei: U256) {
        *self.state.lock().unwrap().native.entry(address).or_default() += wei;
    }

    /// Revert the next transactions of `op` until cleared.
    pub fn revert_on(&self, op: Option<Op>) {
        *self.revert_on.lock().unwrap() = op;
    }

    /// Accept transactions but withhold their receipts.
    pub fn hold_receipts(&self, hold: bool) {
        *self.hold_receipts.lock().unwrap() = hold;
    }

    /// Publish withheld receipts.
    pub fn release_receipts(&self) {
        let mut state = self.state.lock().unwrap();
        let held: Vec<_> = state.held.drain().collect();
        state.receipts.extend(held);
    }

    /// Report a nonce of 0 from `get_nonce`, as a lagging node would.
    pub fn stale_nonces(&self, stale: bool) {
        *self.stale_nonces.lock().unwrap() = stale;
    }

    pub fn deliver_bps(&self, bps: u64) {
        *self.deliver_bps.lock().unwrap() = bps;
    }

    pub fn set_gas_price(&self, wei: u128) {
        *self.gas_price.lock().unwrap() = wei;
    }

    /// Refuse every broadcast, as a node rejecting the transaction would.
    pub fn reject_sends(&self, reject: bool) {
        *self.reject_sends.lock().unwrap() = reject;
    }

    /// Call `observer` with each transaction hash as it arrives, before it
    /// is accepted.
    pub fn on_send(&self, observer: impl Fn(TxHash) + Send + Sync + 'static) {
        *self.on_send.lock().unwrap() = Some(Box::new(observer));
    }

    pub fn sent(&self) -> Vec<SentTx> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_ops(&self, op: Op) -> usize {
        self.sent().iter().filter(|t| t.op == Some(op)).count()
    }

    pub fn token_balance(&self, owner: Address) -> U256 {
        self.state.lock().unwrap().tokens.get(&owner).copied().unwrap_or_default()
    }

    pub fn native_balance(&self, owner: Address) -> U256 {
        self.state.lock().unwrap().native.get(&owner).copied().unwrap_or_default()
    }

    pub fn staked(&self, owner: Address) -> U256 {
        self.state.lock().unwrap().staked.get(&owner).copied().unwrap_or_default()
    }

    pub fn allowance(&self, owner: Address) -> U256 {
        self.state
            .lock()
            .unwrap()
            .allowances
            .get(&(owner, STAKING))
            .copied()
            .unwrap_or_default()
    }

    fn classify(&self, to: Address, input: &[u8]) -> Option<Op> {
        let selector: [u8; 4] = input.get(..4)?.try_into().ok()?;
        if to == self.config.dex_router && selector == IDexRouter::swapExactETHForTokensCall::SELECTOR {
            Some(Op::Swap)
        } else if to == TOKEN && selector == IERC20::approveCall::SELECTOR {
            Some(Op::Approve)
        } else if to == STAKING && selector == IProjectStaking::contributeCall::SELECTOR {
            Some(Op::Stake)
        } else {
            None
        }
    }

    /// Apply the transaction's effects. `false` means it reverts.
    fn execute(&self, state: &mut ChainState, from: Address, value: U256, op: Option<Op>, input: &[u8]) -> bool {
        if op.is_some() && *self.revert_on.lock().unwrap() == op {
            return false;
        }
        let native = state.native.entry(from).or_default();
        if *native < value {
            return false;
        }
        *native -= value;

        match op {
            Some(Op::Swap) => {
                let Ok(call) = IDexRouter::swapExactETHForTokensCall::abi_decode(input) else {
                    return false;
                };
                let out = value * U256::from(RATE) * U256::from(*self.deliver_bps.lock().unwrap())
                    / U256::from(10_000u64);
                if out < call.amountOutMin {
                    *state.native.entry(from).or_default() += value;
                    return false;
                }
                *state.tokens.entry(call.to).or_default() += out;
                true
            }
            Some(Op::Approve) => {
                let Ok(call) = IERC20::approveCall::abi_decode(input) else {
                    return false;
                };
                state.allowances.insert((from, call.spender), call.value);
                true
            }
            Some(Op::Stake) => {
                let Ok(call) = IProjectStaking::contributeCall::abi_decode(input) else {
                    return false;
                };
                let allowance = state.allowances.get(&(from, STAKING)).copied().unwrap_or_default();
                let balance = state.tokens.get(&from).copied().unwrap_or_default();
                if allowance < call.amount || balance < call.amount {
                    return false;
                }
                state.allowances.insert((from, STAKING), allowance - call.amount);
                state.tokens.insert(from, balance - call.amount);
                *state.staked.entry(from).or_default() += call.amount;
                true
            }
            None => true,
        }
    }
}

#[async_trait]
impl ChainRpc for FakeChain {
    fn config(&self) -> &ChainConfig {
        &self.config
    }

    async fn block_number(&self) -> ChainResult<u64> {
        Ok(self.state.lock().unwrap().block)
    }

    async fn get_gas_price(&self) -> ChainResult<u128> {
        Ok(*self.gas_price.lock().unwrap())
    }

    async fn get_nonce(&self, address: Address) -> ChainResult<u64> {
        if *self.stale_nonces.lock().unwrap() {
            return Ok(0);
        }
        Ok(self.state.lock().unwrap().next_nonce.get(&address).copied().unwrap_or(0))
    }

    async fn get_balance(&self, address: Address) -> ChainResult<U256> {
        Ok(self.native_balance(address))
    }

    async fn call(&self, to: Address, data: Bytes) -> ChainResult<Bytes> {
        let selector: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| ChainError::Decode("short calldata".into()))?;
        let state = self.state.lock().unwrap();

        let out = if to == self.config.dex_router && selector == IDexRouter::getAmountsOutCall::SELECTOR {
            let call = IDexRouter::getAmountsOutCall::abi_decode(&data)
                .map_err(|e| ChainError::Decode(e.to_string()))?;
            vec![call.amountIn, call.amountIn * U256::from(RATE)].abi_encode()
        } else if to == TOKEN && selector == IERC20::balanceOfCall::SELECTOR {
            let call = IERC20::balanceOfCall::abi_decode(&data).map_err(|e| ChainError::Decode(e.to_string()))?;
            state.tokens.get(&call.owner).copied().unwrap_or_default().abi_encode()
        } else if to == TOKEN && selector == IERC20::allowanceCall::SELECTOR {
            let call = IERC20::allowanceCall::abi_decode(&data).map_err(|e| ChainError::Decode(e.to_string()))?;
            state
                .allowances
                .get(&(call.owner, call.spender))
                .copied()
                .unwrap_or_default()
                .abi_encode()
        } else if to == TOKEN && selector == IERC20::decimalsCall::SELECTOR {
            U256::from(18u8).abi_encode()
        } else {
            return Err(ChainError::Unavailable(format!("execution reverted: no code at {}", to)));
        };
        Ok(out.into())
    }

    async fn send_signed(&self, raw: Bytes) -> ChainResult<TxHash> {
        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref())
            .map_err(|e| ChainError::Unavailable(format!("rlp: {}", e)))?;
        let TxEnvelope::Legacy(signed) = &envelope else {
            return Err(ChainError::Unavailable("unexpected tx type".into()));
        };
        let from = signed
            .signature()
            .recover_address_from_prehash(&signed.signature_hash())
            .map_err(|e| ChainError::Unavailable(format!("invalid sender: {}", e)))?;
        if envelope.chain_id() != Some(self.config.chain_id) {
            return Err(ChainError::Unavailable("invalid chain id".into()));
        }
        let TxKind::Call(to) = envelope.kind() else {
            return Err(ChainError::Unavailable("contract creation not supported".into()));
        };

        let hash = *envelope.tx_hash();
        if let Some(observer) = self.on_send.lock().unwrap().as_ref() {
            observer(hash);
        }
        if *self.reject_sends.lock().unwrap() {
            return Err(ChainError::Unavailable("transaction underpriced".into()));
        }
        let mut state = self.state.lock().unwrap();
        let expected = state.next_nonce.get(&from).copied().unwrap_or(0);
        if envelope.nonce() < expected {
            return Err(ChainError::Unavailable(format!("nonce too low: next nonce {}", expected)));
        }
        if envelope.nonce() > expected {
            return Err(ChainError::Unavailable(format!("nonce gap: next nonce {}", expected)));
        }
        state.next_nonce.insert(from, expected + 1);

        let op = self.classify(to, envelope.input());
        let success = self.execute(&mut state, from, envelope.value(), op, envelope.input());
        state.block += 1;
        let receipt = Receipt {
            tx_hash: hash,
            block_number: Some(state.block),
            success,
            gas_used: envelope.gas_limit() / 2,
        };
        if *self.hold_receipts.lock().unwrap() {
            state.held.insert(hash, receipt);
        } else {
            state.receipts.insert(hash, receipt);
        }
        state.sent.push(SentTx {
            hash,
            from,
            nonce: envelope.nonce(),
            op,
        });
        Ok(hash)
    }

    async fn get_receipt(&self, tx_hash: TxHash) -> ChainResult<Option<Receipt>> {
        Ok(self.state.lock().unwrap().receipts.get(&tx_hash).cloned())
    }
}

/// Ledger that can be taken offline, forwarding to an `InMemoryLedger`
/// while up.
pub struct SwitchableLedger {
    inner: Arc<InMemoryLedger>,
    down: AtomicBool,
}

impl SwitchableLedger {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl CampaignLedger for SwitchableLedger {
    async fn record_contribution(&self, project_id: u64, usd_amount: Decimal) -> SettlementResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(SettlementError::Ledger("ledger webhook returned 503 Service Unavailable".into()));
        }
        self.inner.record_contribution(project_id, usd_amount).await
    }
}

/// Pipeline wired to a `FakeChain`, with the queue receiver kept open.
pub struct Harness {
    pub chain: Arc<FakeChain>,
    pub wallets: Arc<WalletStore>,
    pub store: Arc<FileSettlementStore>,
    pub ledger: Arc<InMemoryLedger>,
    pub ledger_switch: Arc<SwitchableLedger>,
    pub pipeline: Arc<SettlementPipeline>,
    pub queued: mpsc::Receiver<Uuid>,
}

pub fn test_settlement_config() -> SettlementConfig {
    SettlementConfig {
        receipt_timeout_secs: 1,
        ..SettlementConfig::default()
    }
}

pub fn harness() -> Harness {
    harness_with(test_settlement_config(), Arc::new(FileSettlementStore::in_memory()))
}

pub fn harness_with(config: SettlementConfig, store: Arc<FileSettlementStore>) -> Harness {
    let chain = Arc::new(FakeChain::new(ChainKind::Bsc));
    let wallets = Arc::new(WalletStore::new("Sign in to stake"));
    let ledger = Arc::new(InMemoryLedger::new());
    let ledger_switch = Arc::new(SwitchableLedger {
        inner: ledger.clone(),
        down: AtomicBool::new(false),
    });
    let (sender, queued) = queue(64);
    let registry = ChainRegistry::from_clients([chain.clone() as Arc<dyn ChainRpc>]);
    let pipeline = Arc::new(SettlementPipeline::new(
        registry,
        wallets.clone(),
        store.clone() as Arc<dyn SettlementStore>,
        ledger_switch.clone(),
        config,
        sender,
    ));
    Harness {
        chain,
        wallets,
        store,
        ledger,
        ledger_switch,
        pipeline,
        queued,
    }
}

impl Harness {
    /// A custodial wallet holding `native` (whole units) of native currency.
    pub fn funded_wallet(&self, email: &str, native: &str) -> WalletHandle {
        let wallet = self.wallets.get_or_create(email).unwrap();
        self.chain.fund(wallet.address, parse_ether(native).unwrap());
        wallet
    }

    pub fn new_settlement(&self, wallet: &WalletHandle, native: &str) -> NewSettlement {
        NewSettlement {
            correlation_token: format!("25-7-0-{}", Uuid::new_v4().simple()),
            usd_amount: Decimal::from(25),
            native_amount: parse_ether(native).unwrap(),
            chain: ChainKind::Bsc,
            project_id: 7,
            incentive_id: None,
            token_address: TOKEN,
            staking_contract: STAKING,
            wallet: wallet.clone(),
            contributor_email: Some(wallet.identifier.clone()),
        }
    }
}

pub fn expected_tokens(native: &str) -> U256 {
    parse_ether(native).unwrap() * U256::from(RATE)
}
