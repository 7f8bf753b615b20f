//! Constants used by the deployer

use std::time::Duration;

use alloy_primitives::{address, Address};

/// The name of the `SignatureChecker` library artifact
pub const SIGNATURE_CHECKER_ARTIFACT: &str = "SignatureChecker";

/// The name of the token implementation artifact
pub const IMPLEMENTATION_ARTIFACT: &str = "FiatTokenV2_2";

/// The name of the token proxy artifact
pub const PROXY_ARTIFACT: &str = "FiatTokenProxy";

/// The name of the master minter artifact
pub const MASTER_MINTER_ARTIFACT: &str = "MasterMinter";

/// Every artifact a deployment needs, in the order they are first used
pub const REQUIRED_ARTIFACTS: [&str; 4] = [
    SIGNATURE_CHECKER_ARTIFACT,
    IMPLEMENTATION_ARTIFACT,
    PROXY_ARTIFACT,
    MASTER_MINTER_ARTIFACT,
];

/// The placeholder the compiler leaves in the `FiatTokenV2_2` bytecode for the
/// `SignatureChecker` library.
///
/// Used when the implementation artifact carries no `linkReferences`
pub const SIGNATURE_CHECKER_PLACEHOLDER: &str = "__$715109b5d747ea58b675c6ea3f0dba8c60$__";

/// The prefix of a library placeholder
pub const PLACEHOLDER_PREFIX: &str = "__$";

/// The suffix of a library placeholder
pub const PLACEHOLDER_SUFFIX: &str = "$__";

/// The number of hex digits between the placeholder delimiters
pub const PLACEHOLDER_HASH_LEN: usize = 34;

/// The total length of a placeholder, equal to the hex length of an address
pub const PLACEHOLDER_LEN: usize = 40;

/// The proxy admin used when none is given on the command line
pub const DEFAULT_PROXY_ADMIN: Address = address!("1269FB8D3C8712c3A70f4d3aF5Dc1DDa314d1532");

/// The JSON-RPC error code for a request the user rejected (EIP-1193)
pub const USER_REJECTED_CODE: i64 = 4001;

/// JSON-RPC error codes that signal rate limiting rather than a bad request
pub const RATE_LIMIT_CODES: [i64; 2] = [429, -32005];

/// The default number of confirmations to wait for on each step
pub const DEFAULT_CONFIRMATIONS: u64 = 1;

/// The default interval between receipt polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);

/// The default window within which a receipt must be finalized
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);

/// The default number of extra attempts for a submission that hit a network error
pub const DEFAULT_SUBMIT_RETRIES: u32 = 3;

/// The default delay between submission attempts
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// The library address key in the deployments file
pub const LIBRARY_CONTRACT_KEY: &str = "signature_checker_library";

/// The implementation address key in the deployments file
pub const IMPLEMENTATION_CONTRACT_KEY: &str = "fiat_token_implementation";

/// The proxy address key in the deployments file
pub const PROXY_CONTRACT_KEY: &str = "fiat_token_proxy";

/// The master minter address key in the deployments file
pub const MASTER_MINTER_CONTRACT_KEY: &str = "master_minter";

/// The deployments key in the deployments file
pub const DEPLOYMENTS_KEY: &str = "deployments";
