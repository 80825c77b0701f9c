//! Multi-threaded proof-of-work miner driving a running node.
//!
//! Each round builds a block template from the node's mining context plus
//! the best-paying mempool transactions, then fans the nonce space out to
//! worker threads. A round ends when a worker finds a solution, the tip
//! moves under the template, or the refresh interval lapses.

use crate::core::{Block, Transaction, TxOutput};
use crate::crypto::dilithium;
use crate::crypto::hash::{Hash160, Hash256, Hashable};
use crate::mining::difficulty;
use crate::node::Node;
use crate::{QtcError, Result};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

/// Template refresh cadence when no block and no tip change arrives.
const ROUND_TIMEOUT: Duration = Duration::from_secs(15);
/// Worker stop-flag polling granularity, in nonces.
const CHECK_INTERVAL: u64 = 1_024;
/// Room reserved for the coinbase and header when filling from the pool.
const TEMPLATE_HEADROOM: usize = 8 * 1_024;

#[derive(Debug, Clone)]
pub struct MiningStats {
    pub is_mining: bool,
    pub hashrate: f64,
    pub total_hashes: u64,
    pub blocks_mined: u64,
    pub threads: usize,
    pub address: String,
    pub uptime_seconds: u64,
}

enum RoundOutcome {
    Found(Block),
    TipChanged,
    Exhausted,
}

pub struct Miner {
    node: Node,
    reward_to: Hash160,
    address: String,
    coinbase_tag: Vec<u8>,
    threads: usize,
    is_mining: Arc<AtomicBool>,
    hash_counter: Arc<AtomicU64>,
    blocks_mined: Arc<AtomicU64>,
    started: Instant,
}

impl Miner {
    pub fn new(node: Node, address: String, threads: usize, coinbase_tag: Vec<u8>) -> Result<Self> {
        let reward_to = dilithium::address_to_pubkey_hash(&address)?;
        let threads = threads.max(1);
        Ok(Self {
            node,
            reward_to,
            address,
            coinbase_tag,
            threads,
            is_mining: Arc::new(AtomicBool::new(false)),
            hash_counter: Arc::new(AtomicU64::new(0)),
            blocks_mined: Arc::new(AtomicU64::new(0)),
            started: Instant::now(),
        })
    }

    /// Mine until [`stop`](Self::stop) is called. Solved blocks go through
    /// the node's normal submission path like any external block.
    pub async fn run(&self) -> Result<()> {
        self.is_mining.store(true, Ordering::SeqCst);
        let mut tips = self.node.subscribe_tips();
        log::info!(
            "⛏️  Mining to {} with {} thread(s)",
            self.address,
            self.threads
        );

        while self.is_mining.load(Ordering::SeqCst) {
            tips.borrow_and_update();
            let template = self.build_template().await?;
            match self.mine_round(template, &mut tips).await? {
                RoundOutcome::Found(block) => {
                    let hash = block.hash();
                    let height = block.header.height;
                    match self.node.submit_block(block).await {
                        Ok(_) => {
                            self.blocks_mined.fetch_add(1, Ordering::Relaxed);
                            log::info!("🎉 Mined block {} at height {}", hash, height);
                        }
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => log::warn!("🚫 Mined block {} rejected: {}", hash, err),
                    }
                }
                RoundOutcome::TipChanged => {
                    log::debug!("🔄 Tip moved, rebuilding template")
                }
                RoundOutcome::Exhausted => {}
            }
        }

        log::info!("🛑 Miner stopped");
        Ok(())
    }

    async fn build_template(&self) -> Result<Block> {
        let ctx = self.node.mining_context().await?;
        let max_block_size = self.node.params().max_block_size;
        let pooled = self
            .node
            .select_transactions(max_block_size.saturating_sub(TEMPLATE_HEADROOM))
            .await;

        let fees: u64 = pooled.iter().map(|(_, fee)| fee).sum();
        let reward = ctx.subsidy.saturating_add(fees);
        let outputs = if reward > 0 {
            vec![TxOutput::new(reward, self.reward_to)]
        } else {
            Vec::new()
        };
        let coinbase = Transaction::new_coinbase(ctx.next_height, &self.coinbase_tag, outputs);

        let mut txs = vec![coinbase];
        txs.extend(pooled.into_iter().map(|(tx, _)| tx));

        let now = chrono::Utc::now().timestamp() as u64;
        let timestamp = now.max(ctx.median_time_past + 1);
        Ok(Block::new(
            ctx.tip,
            txs,
            timestamp,
            ctx.bits,
            ctx.next_height,
        ))
    }

    /// Search the template's nonce space until solved, stale, or timed out.
    async fn mine_round(
        &self,
        template: Block,
        tips: &mut watch::Receiver<Hash256>,
    ) -> Result<RoundOutcome> {
        let stop = Arc::new(AtomicBool::new(false));
        let (found_tx, mut found_rx) = mpsc::channel::<Block>(1);
        let stride = u64::MAX / self.threads as u64;

        let mut workers = Vec::with_capacity(self.threads);
        for index in 0..self.threads {
            let mut block = template.clone();
            let stop = stop.clone();
            let is_mining = self.is_mining.clone();
            let hash_counter = self.hash_counter.clone();
            let found_tx = found_tx.clone();
            let start = index as u64 * stride + rand::thread_rng().gen_range(0..CHECK_INTERVAL);
            let end = start.saturating_add(stride);

            workers.push(tokio::task::spawn_blocking(move || {
                let bits = block.header.bits;
                let mut nonce = start;
                while nonce < end {
                    block.header.nonce = nonce;
                    if difficulty::meets_target(&block.hash(), bits) {
                        let _ = found_tx.blocking_send(block);
                        return;
                    }
                    nonce += 1;
                    if nonce % CHECK_INTERVAL == 0 {
                        hash_counter.fetch_add(CHECK_INTERVAL, Ordering::Relaxed);
                        if stop.load(Ordering::Relaxed) || !is_mining.load(Ordering::Relaxed) {
                            return;
                        }
                    }
                }
            }));
        }
        drop(found_tx);

        let outcome = tokio::select! {
            found = found_rx.recv() => match found {
                Some(block) => RoundOutcome::Found(block),
                None => RoundOutcome::Exhausted,
            },
            changed = tips.changed() => {
                if changed.is_err() {
                    self.is_mining.store(false, Ordering::SeqCst);
                }
                RoundOutcome::TipChanged
            }
            _ = tokio::time::sleep(ROUND_TIMEOUT) => RoundOutcome::Exhausted,
        };

        stop.store(true, Ordering::SeqCst);
        for worker in workers {
            worker
                .await
                .map_err(|err| QtcError::Mining(format!("worker panicked: {}", err)))?;
        }
        Ok(outcome)
    }

    pub fn stop(&self) {
        self.is_mining.store(false, Ordering::SeqCst);
    }

    pub fn is_mining(&self) -> bool {
        self.is_mining.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> MiningStats {
        let total_hashes = self.hash_counter.load(Ordering::Relaxed);
        let uptime = self.started.elapsed().as_secs();
        MiningStats {
            is_mining: self.is_mining(),
            hashrate: if uptime > 0 {
                total_hashes as f64 / uptime as f64
            } else {
                0.0
            },
            total_hashes,
            blocks_mined: self.blocks_mined.load(Ordering::Relaxed),
            threads: self.threads,
            address: self.address.clone(),
            uptime_seconds: uptime,
        }
    }
}
