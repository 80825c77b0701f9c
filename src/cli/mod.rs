//! Command line interface for the QuantumCoin node.

use crate::config::{Config, Network};
use crate::consensus::monetary::format_qtc;
use crate::consensus::ConsensusEngine;
use crate::crypto::hash::Hash256;
use crate::crypto::KeyPair;
use crate::mining::Miner;
use crate::node::Node;
use crate::storage::Database;
use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum NetworkArg {
    Mainnet,
    Testnet,
    Regtest,
}

impl From<NetworkArg> for Network {
    fn from(arg: NetworkArg) -> Self {
        match arg {
            NetworkArg::Mainnet => Network::Mainnet,
            NetworkArg::Testnet => Network::Testnet,
            NetworkArg::Regtest => Network::Regtest,
        }
    }
}

#[derive(Parser)]
#[command(name = "qtcd", version, about = "QuantumCoin node")]
struct Cli {
    /// Network to run on
    #[arg(long, global = true, value_enum, default_value = "mainnet")]
    network: NetworkArg,

    /// Override the data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node
    Start {
        /// Mine blocks while running
        #[arg(long)]
        mine: bool,
        /// Address coinbase rewards are paid to
        #[arg(long)]
        mining_address: Option<String>,
        /// Mining threads (defaults to all cores)
        #[arg(long)]
        threads: Option<usize>,
    },
    /// Show chain status
    Info,
    /// Show issuance and supply figures
    Economics,
    /// Show the confirmed balance of an address
    Balance { address: String },
    /// Show a block by height or hash
    Block {
        #[arg(long, conflicts_with = "hash")]
        height: Option<u64>,
        #[arg(long)]
        hash: Option<String>,
    },
    /// Generate a new keypair and address
    Keygen,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let network: Network = cli.network.into();
    let mut config = Config::load(network)?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    match cli.command {
        Commands::Start {
            mine,
            mining_address,
            threads,
        } => {
            if mine {
                config.mining.enabled = true;
            }
            if let Some(address) = mining_address {
                config.mining.miner_address = Some(address);
            }
            if let Some(threads) = threads {
                config.mining.threads = threads;
            }
            start_node(config).await
        }
        Commands::Info => show_info(&config).await,
        Commands::Economics => show_economics(&config),
        Commands::Balance { address } => show_balance(&config, &address),
        Commands::Block { height, hash } => show_block(&config, height, hash),
        Commands::Keygen => keygen(network),
    }
}

async fn start_node(config: Config) -> anyhow::Result<()> {
    let node = Node::start(&config).await?;

    let miner = if config.mining.enabled {
        let address = config
            .mining
            .miner_address
            .clone()
            .ok_or_else(|| anyhow!("mining requires --mining-address"))?;
        let miner = Arc::new(Miner::new(
            node.clone(),
            address,
            config.mining.threads,
            config.mining.coinbase_tag.clone().into_bytes(),
        )?);
        let handle = miner.clone();
        tokio::spawn(async move {
            if let Err(err) = handle.run().await {
                log::error!("💥 Miner stopped with an error: {}", err);
            }
        });
        Some(miner)
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    log::info!("🛑 Shutting down");

    if let Some(miner) = miner {
        miner.stop();
    }
    node.shutdown().await;
    Ok(())
}

async fn show_info(config: &Config) -> anyhow::Result<()> {
    let node = Node::start(config).await?;
    let info = node.chain_info().await;
    let pool = node.mempool_stats().await;

    println!("network:      {}", info.network);
    println!("height:       {}", info.height);
    println!("tip:          {}", info.tip);
    println!("total work:   {}", info.total_work);
    println!("next bits:    {:#010x}", info.next_bits);
    println!("supply:       {}", format_qtc(info.total_supply));
    println!("mempool:      {} tx, {} bytes", pool.count, pool.bytes);

    node.shutdown().await;
    Ok(())
}

fn open_engine(config: &Config) -> anyhow::Result<ConsensusEngine> {
    let db = Arc::new(Database::open(config.storage.data_dir.join("chain"))?);
    Ok(ConsensusEngine::new(db, config.params())?)
}

fn show_economics(config: &Config) -> anyhow::Result<()> {
    let engine = open_engine(config)?;
    let info = engine.economics();

    println!("height:            {}", info.height);
    println!("current subsidy:   {}", format_qtc(info.current_subsidy));
    println!("total supply:      {}", format_qtc(info.total_supply));
    println!("max supply:        {}", format_qtc(info.max_supply));
    println!("remaining:         {}", format_qtc(info.remaining_supply));
    println!("halving era:       {}", info.era);
    println!("next halving:      height {}", info.next_halving_height);
    println!("block interval:    {} s", info.target_block_interval);
    Ok(())
}

fn show_balance(config: &Config, address: &str) -> anyhow::Result<()> {
    let pubkey_hash = crate::crypto::dilithium::address_to_pubkey_hash(address)?;
    let engine = open_engine(config)?;
    let balance = engine.utxo().balance(&pubkey_hash)?;

    println!("{}: {}", address, format_qtc(balance));
    Ok(())
}

fn show_block(config: &Config, height: Option<u64>, hash: Option<String>) -> anyhow::Result<()> {
    let engine = open_engine(config)?;
    let block = match (height, hash) {
        (Some(height), None) => engine.store().get_block_by_height(height)?,
        (None, Some(hash)) => {
            let hash = Hash256::from_hex(&hash)?;
            engine.store().get_block(&hash)?
        }
        _ => bail!("specify exactly one of --height or --hash"),
    };

    let Some(block) = block else {
        bail!("block not found");
    };

    use crate::crypto::hash::Hashable;
    println!("hash:         {}", block.hash());
    println!("height:       {}", block.header.height);
    println!("previous:     {}", block.header.previous_hash);
    println!("merkle root:  {}", block.header.merkle_root);
    println!("timestamp:    {}", block.header.timestamp);
    println!("bits:         {:#010x}", block.header.bits);
    println!("nonce:        {}", block.header.nonce);
    println!("transactions: {}", block.transaction_count());
    for tx in &block.transactions {
        println!("  {}", tx.txid());
    }
    Ok(())
}

fn keygen(network: Network) -> anyhow::Result<()> {
    let keypair = KeyPair::generate();

    println!("network:    {}", network.name());
    println!("address:    {}", keypair.address());
    println!("public key: {}", hex::encode(keypair.public_key_bytes()));
    println!("secret key: {}", hex::encode(keypair.secret_key_bytes()));
    println!();
    println!("Store the secret key somewhere safe; it cannot be recovered.");
    Ok(())
}
