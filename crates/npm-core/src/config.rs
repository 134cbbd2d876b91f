//! Recognized NPM configuration keys (§6.4): a plain struct with a
//! `Default` and an env-overridden constructor.

use serde::{Deserialize, Serialize};

/// NPM configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpmConfig {
    /// Path to the NLP hardware-description file.
    pub nlp_file_name: String,

    /// MMIO ranges the model should claim, `(low, high)` inclusive.
    pub nlp_mmio: Vec<(u32, u32)>,

    /// PC of the configured fork point (§4.6).
    pub fork_point: u64,

    /// Whether RX bytes are sourced from the fuzzer harness (`true`) or a
    /// fixed replay vector (`false`).
    pub use_fuzzer: bool,

    /// Path to the compliance sequence-rule file, if compliance checking is
    /// enabled.
    pub cc_file_name: Option<String>,

    /// Logical-clock interval between compliance budget checks (§3).
    pub compliance_check_interval: u64,

    /// Logical-clock budget after which the process exits non-zero if any
    /// violation has been recorded (§3, §7).
    pub compliance_budget: u64,

    /// Length of the first-touch RX seed pattern, in bytes (§3 "Initial RX
    /// priming"). Defaults to the original's 258 bytes (129 repetitions of
    /// `0x2D 0x00`).
    pub initial_rx_seed_len: usize,

    /// Directory persisted outputs (`NLPStatistics.dat`, `ComplianceCheck.dat`)
    /// are written to.
    pub output_dir: String,

    /// Seed for the shared deterministic PRNG (§5, §9).
    pub rng_seed: u64,
}

impl Default for NpmConfig {
    fn default() -> Self {
        Self {
            nlp_file_name: String::new(),
            nlp_mmio: vec![(0x4000_0000, 0x5FFF_FFFF)],
            fork_point: 0,
            use_fuzzer: true,
            cc_file_name: None,
            compliance_check_interval: 5,
            compliance_budget: 150,
            initial_rx_seed_len: 258,
            output_dir: ".".to_string(),
            rng_seed: 0,
        }
    }
}

impl NpmConfig {
    /// Builds a config from defaults, overridden by `NPM_*` environment
    /// variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("NPM_NLP_FILE_NAME") {
            config.nlp_file_name = v;
        }
        if let Ok(v) = std::env::var("NPM_FORK_POINT") {
            if let Ok(pc) = u64::from_str_radix(v.trim_start_matches("0x"), 16) {
                config.fork_point = pc;
            }
        }
        if let Ok(v) = std::env::var("NPM_USE_FUZZER") {
            if let Ok(b) = v.parse() {
                config.use_fuzzer = b;
            }
        }
        if let Ok(v) = std::env::var("NPM_CC_FILE_NAME") {
            config.cc_file_name = Some(v);
        }
        if let Ok(v) = std::env::var("NPM_COMPLIANCE_CHECK_INTERVAL") {
            if let Ok(n) = v.parse() {
                config.compliance_check_interval = n;
            }
        }
        if let Ok(v) = std::env::var("NPM_COMPLIANCE_BUDGET") {
            if let Ok(n) = v.parse() {
                config.compliance_budget = n;
            }
        }
        if let Ok(v) = std::env::var("NPM_OUTPUT_DIR") {
            config.output_dir = v;
        }
        if let Ok(v) = std::env::var("NPM_RNG_SEED") {
            if let Ok(n) = v.parse() {
                config.rng_seed = n;
            }
        }

        config
    }
}
