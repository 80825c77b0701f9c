//! The node facade: one writer, many readers.
//!
//! All chain mutations funnel through a single command loop so the
//! consensus engine never sees concurrent writes. Reads go straight to
//! the shared state behind async locks. Tip changes fan out on a watch
//! channel, which is how miners learn their template went stale.

use crate::config::{ChainParams, Config};
use crate::consensus::engine::MiningContext;
use crate::consensus::monetary::EconomicsInfo;
use crate::consensus::ConsensusEngine;
use crate::core::chain::{BlockStatus, TipEvent};
use crate::core::utxo::UtxoEntry;
use crate::core::{Block, Transaction};
use crate::crypto::dilithium;
use crate::crypto::hash::Hash256;
use crate::mempool::{Mempool, MempoolStats};
use crate::core::transaction::OutPoint;
use crate::storage::Database;
use crate::{QtcError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, RwLock};

const COMMAND_QUEUE_DEPTH: usize = 64;
const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

enum Command {
    SubmitBlock(Box<Block>, oneshot::Sender<Result<BlockStatus>>),
    SubmitTransaction(Box<Transaction>, oneshot::Sender<Result<Hash256>>),
    Shutdown,
}

/// Snapshot of the canonical chain for status displays.
#[derive(Debug, Clone)]
pub struct ChainInfo {
    pub network: &'static str,
    pub height: u64,
    pub tip: Hash256,
    pub total_work: u128,
    pub next_bits: u32,
    pub total_supply: u64,
}

struct NodeShared {
    engine: RwLock<ConsensusEngine>,
    mempool: RwLock<Mempool>,
    params: ChainParams,
    db: Arc<Database>,
    tip_tx: watch::Sender<Hash256>,
}

/// Cloneable handle to a running node.
#[derive(Clone)]
pub struct Node {
    shared: Arc<NodeShared>,
    commands: mpsc::Sender<Command>,
}

impl Node {
    /// Open the chain store under the configured data directory and start
    /// the writer loop.
    pub async fn start(config: &Config) -> Result<Self> {
        let db = Arc::new(Database::open(config.storage.data_dir.join("chain"))?);
        Self::with_database(db, config.params()).await
    }

    pub async fn with_database(db: Arc<Database>, params: ChainParams) -> Result<Self> {
        let engine = ConsensusEngine::new(db.clone(), params.clone())?;
        let tip = engine.state().tip;
        let (tip_tx, _) = watch::channel(tip);
        let mempool = Mempool::from_params(&params);

        let shared = Arc::new(NodeShared {
            engine: RwLock::new(engine),
            mempool: RwLock::new(mempool),
            params,
            db,
            tip_tx,
        });

        let (commands, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        tokio::spawn(writer_loop(shared.clone(), rx));

        log::info!(
            "🚀 Node started on {} at tip {}",
            shared.params.network.name(),
            tip
        );
        Ok(Self { shared, commands })
    }

    // Writes

    /// Submit a block for consensus processing. Serialized with all other
    /// writes; the reply carries the fork-choice outcome.
    pub async fn submit_block(&self, block: Block) -> Result<BlockStatus> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::SubmitBlock(Box::new(block), reply_tx))
            .await
            .map_err(|_| QtcError::Consensus("node writer is not running".into()))?;
        await_reply(reply_rx).await
    }

    /// Submit a transaction for mempool admission.
    pub async fn submit_transaction(&self, tx: Transaction) -> Result<Hash256> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::SubmitTransaction(Box::new(tx), reply_tx))
            .await
            .map_err(|_| QtcError::Consensus("node writer is not running".into()))?;
        await_reply(reply_rx).await
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    // Reads

    pub async fn chain_info(&self) -> ChainInfo {
        let engine = self.shared.engine.read().await;
        let state = engine.state();
        ChainInfo {
            network: self.shared.params.network.name(),
            height: state.height,
            tip: state.tip,
            total_work: state.total_work,
            next_bits: state.next_bits,
            total_supply: state.total_supply,
        }
    }

    pub async fn balance(&self, address: &str) -> Result<u64> {
        let pubkey_hash = dilithium::address_to_pubkey_hash(address)?;
        let engine = self.shared.engine.read().await;
        engine.utxo().balance(&pubkey_hash)
    }

    pub async fn utxos_for_address(&self, address: &str) -> Result<Vec<(OutPoint, UtxoEntry)>> {
        let pubkey_hash = dilithium::address_to_pubkey_hash(address)?;
        let engine = self.shared.engine.read().await;
        engine.utxo().utxos_for(&pubkey_hash)
    }

    pub async fn block_by_height(&self, height: u64) -> Result<Option<Block>> {
        self.shared.db.get_block_by_height(height)
    }

    pub async fn block_by_hash(&self, hash: &Hash256) -> Result<Option<Block>> {
        self.shared.db.get_block(hash)
    }

    pub async fn mempool_stats(&self) -> MempoolStats {
        self.shared.mempool.read().await.stats()
    }

    pub async fn economics(&self) -> EconomicsInfo {
        self.shared.engine.read().await.economics()
    }

    pub async fn mining_context(&self) -> Result<MiningContext> {
        self.shared.engine.read().await.mining_context()
    }

    /// Mempool transactions for a block template, best fee rate first.
    pub async fn select_transactions(&self, max_bytes: usize) -> Vec<(Transaction, u64)> {
        self.shared.mempool.read().await.select_for_block(max_bytes)
    }

    /// Receiver that observes every canonical tip change.
    pub fn subscribe_tips(&self) -> watch::Receiver<Hash256> {
        self.shared.tip_tx.subscribe()
    }

    pub fn params(&self) -> &ChainParams {
        &self.shared.params
    }
}

async fn await_reply<T>(reply_rx: oneshot::Receiver<Result<T>>) -> Result<T> {
    match tokio::time::timeout(REPLY_TIMEOUT, reply_rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(QtcError::Consensus("node writer dropped the request".into())),
        Err(_) => Err(QtcError::Consensus("node writer timed out".into())),
    }
}

async fn writer_loop(shared: Arc<NodeShared>, mut rx: mpsc::Receiver<Command>) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::SubmitBlock(block, reply) => {
                let result = handle_block(&shared, *block).await;
                let fatal = matches!(&result, Err(err) if err.is_fatal());
                let _ = reply.send(result);
                if fatal {
                    log::error!("💥 Storage failure while committing a block; stopping writer");
                    break;
                }
            }
            Command::SubmitTransaction(tx, reply) => {
                let result = handle_transaction(&shared, *tx).await;
                let fatal = matches!(&result, Err(err) if err.is_fatal());
                let _ = reply.send(result);
                if fatal {
                    log::error!("💥 Storage failure while validating a transaction; stopping writer");
                    break;
                }
            }
            Command::Shutdown => {
                log::info!("🛑 Node writer shutting down");
                break;
            }
        }
    }
}

async fn handle_block(shared: &NodeShared, block: Block) -> Result<BlockStatus> {
    let (status, events) = {
        let mut engine = shared.engine.write().await;
        let status = engine.process_block(block)?;
        (status, engine.take_tip_events())
    };

    // The event log covers every block the engine connected or
    // disconnected, including adopted orphans the outcome does not name.
    if !events.is_empty() {
        sync_mempool(shared, &events).await?;
    }
    if matches!(status, BlockStatus::Accepted(_)) {
        let tip = shared.engine.read().await.state().tip;
        let _ = shared.tip_tx.send(tip);
    }
    Ok(status)
}

/// Replay the engine's tip transitions against the pool, in order:
/// disconnected blocks hand their transactions back for readmission,
/// connected blocks evict what they confirmed (and anything conflicting
/// with what they spent). A reorg finishes with a full revalidation.
async fn sync_mempool(shared: &NodeShared, events: &[TipEvent]) -> Result<()> {
    let engine = shared.engine.read().await;
    let mut mempool = shared.mempool.write().await;
    let next_height = engine.state().height + 1;
    let now = chrono::Utc::now().timestamp() as u64;
    let mut disconnected_any = false;

    for event in events {
        match event {
            TipEvent::Disconnected(hash) => {
                disconnected_any = true;
                let Some(old_block) = engine.store().get_block(hash)? else {
                    continue;
                };
                for tx in old_block.transactions.into_iter().skip(1) {
                    let txid = tx.txid();
                    match mempool.admit(tx, engine.utxo(), next_height, now) {
                        Ok(_) => log::debug!("♻️  Returned {} to the pool after reorg", txid),
                        Err(err) => {
                            log::debug!("🗑️  Displaced tx {} not readmitted: {}", txid, err)
                        }
                    }
                }
            }
            TipEvent::Connected(hash) => {
                if let Some(new_block) = engine.store().get_block(hash)? {
                    mempool.remove_confirmed(&new_block);
                }
            }
        }
    }

    if disconnected_any {
        mempool.revalidate(engine.utxo(), next_height);
    }
    Ok(())
}

async fn handle_transaction(shared: &NodeShared, tx: Transaction) -> Result<Hash256> {
    let engine = shared.engine.read().await;
    let mut mempool = shared.mempool.write().await;
    let next_height = engine.state().height + 1;
    let now = chrono::Utc::now().timestamp() as u64;
    let txid = mempool.admit(tx, engine.utxo(), next_height, now)?;
    log::info!("📨 Transaction {} accepted into the pool", txid);
    Ok(txid)
}
