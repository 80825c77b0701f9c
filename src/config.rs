use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        }
    }
}

/// Consensus and policy constants for one network.
///
/// Every module reads these from here; no constant is duplicated at a use
/// site. Changing a value changes the chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainParams {
    pub network: Network,

    // Issuance
    pub max_supply: u64,
    pub initial_subsidy: u64,
    pub halving_interval: u64,

    // Proof of work
    pub target_spacing: u64,
    pub retarget_interval: u64,
    pub pow_limit_bits: u32,

    // Timestamps
    pub max_future_skew: u64,
    pub mtp_window: usize,

    // Transaction policy
    pub coinbase_maturity: u64,
    pub dust_threshold: u64,
    pub min_relay_fee_per_kb: u64,
    pub max_tx_size: usize,
    pub max_tx_inputs: usize,
    pub max_tx_outputs: usize,

    // Block policy
    pub max_block_size: usize,
    pub max_coinbase_payload: usize,

    // Mempool and orphan buffer
    pub mempool_max_bytes: usize,
    pub mempool_max_count: usize,
    pub mempool_expiry: u64,
    pub orphan_limit: usize,
    pub orphan_ttl: u64,

    // Genesis
    pub genesis_timestamp: u64,
    pub genesis_message: String,
}

impl ChainParams {
    pub fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            max_supply: 2_200_000_000_000_000, // 22,000,000 QTC
            initial_subsidy: 5_000_000_000,    // 50 QTC
            halving_interval: 105_120,
            target_spacing: 600,
            retarget_interval: 144,
            pow_limit_bits: 0x1e00ffff,
            max_future_skew: 7_200,
            mtp_window: 11,
            coinbase_maturity: 100,
            dust_threshold: 546,
            min_relay_fee_per_kb: 1_000,
            max_tx_size: 100_000,
            max_tx_inputs: 1_000,
            max_tx_outputs: 1_000,
            max_block_size: 1_000_000,
            max_coinbase_payload: 100,
            mempool_max_bytes: 300_000_000,
            mempool_max_count: 50_000,
            mempool_expiry: 86_400,
            orphan_limit: 100,
            orphan_ttl: 600,
            genesis_timestamp: 1_751_328_000, // 2025-07-01 00:00:00 UTC
            genesis_message: "QuantumCoin genesis - 22,000,000 QTC, zero premine".to_string(),
        }
    }

    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            pow_limit_bits: 0x1f00ffff,
            genesis_message: "QuantumCoin testnet genesis".to_string(),
            ..Self::mainnet()
        }
    }

    /// Shrunk intervals so integration tests cross halvings, retargets and
    /// maturity windows in a handful of blocks.
    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            halving_interval: 150,
            retarget_interval: 8,
            pow_limit_bits: 0x207fffff,
            coinbase_maturity: 10,
            mtp_window: 11,
            genesis_message: "QuantumCoin regtest genesis".to_string(),
            ..Self::mainnet()
        }
    }

    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
            Network::Regtest => Self::regtest(),
        }
    }

    /// Seconds the retarget window is expected to span.
    pub fn expected_retarget_timespan(&self) -> u64 {
        self.target_spacing * self.retarget_interval
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: Network,
    pub storage: StorageConfig,
    pub mining: MiningConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    pub enabled: bool,
    pub threads: usize,
    /// Address coinbase rewards are paid to. Mining refuses to start
    /// without one.
    pub miner_address: Option<String>,
    /// Free-form tag embedded in the coinbase payload.
    pub coinbase_tag: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::for_network(Network::Mainnet)
    }
}

impl Config {
    pub fn for_network(network: Network) -> Self {
        Self {
            network,
            storage: StorageConfig {
                data_dir: Self::default_data_dir(network),
            },
            mining: MiningConfig {
                enabled: false,
                threads: num_cpus::get(),
                miner_address: None,
                coinbase_tag: "QuantumCoin/2.0".to_string(),
            },
        }
    }

    pub fn params(&self) -> ChainParams {
        ChainParams::for_network(self.network)
    }

    /// Read the per-network config file, creating it with defaults on
    /// first run.
    pub fn load(network: Network) -> anyhow::Result<Self> {
        let config_path = Self::config_path(network);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            let config = Self::for_network(network);
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path(self.network);

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    fn config_path(network: Network) -> PathBuf {
        Self::default_data_dir(network).join("config.json")
    }

    fn default_data_dir(network: Network) -> PathBuf {
        let home_dir = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let dir_name = match network {
            Network::Mainnet => ".qtc".to_string(),
            other => format!(".qtc-{}", other.name()),
        };
        PathBuf::from(home_dir).join(dir_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_issuance_constants() {
        let params = ChainParams::mainnet();

        assert_eq!(params.max_supply, 22_000_000 * 100_000_000);
        assert_eq!(params.initial_subsidy, 50 * 100_000_000);
        assert_eq!(params.halving_interval, 105_120);
        assert_eq!(params.target_spacing, 600);
        assert_eq!(params.expected_retarget_timespan(), 600 * 144);
    }

    #[test]
    fn test_regtest_shrinks_intervals() {
        let mainnet = ChainParams::mainnet();
        let regtest = ChainParams::regtest();

        assert!(regtest.retarget_interval < mainnet.retarget_interval);
        assert!(regtest.coinbase_maturity < mainnet.coinbase_maturity);
        assert!(regtest.halving_interval < mainnet.halving_interval);
        // Same money supply on every network.
        assert_eq!(regtest.max_supply, mainnet.max_supply);
        assert_eq!(regtest.pow_limit_bits, 0x207fffff);
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = Config::for_network(Network::Regtest);
        let json = serde_json::to_string(&config).unwrap();
        let restored: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.network, Network::Regtest);
        assert_eq!(restored.mining.coinbase_tag, config.mining.coinbase_tag);
    }
}
