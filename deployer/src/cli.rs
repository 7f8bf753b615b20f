//! Definitions of CLI arguments and commands for the deployer

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_primitives::Address;
use clap::{Args, Parser, Subcommand};

use crate::{
    commands::{check, deploy, link_artifact, status},
    constants::{
        DEFAULT_CONFIRMATIONS, DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_POLL_INTERVAL,
        DEFAULT_PROXY_ADMIN, DEFAULT_RETRY_BACKOFF, DEFAULT_SUBMIT_RETRIES,
    },
    errors::DeployError,
    params::{DeploymentParameters, RoleAssignment, Roles, TokenMetadata},
    rpc::ConfirmationConfig,
    sequencer::{SequencerConfig, Topology},
};

/// Provision an upgradeable fiat-backed token
#[derive(Parser)]
pub struct Cli {
    /// Private key of the deployer
    #[arg(short, long, env = "PKEY")]
    pub priv_key: Option<String>,

    /// Network RPC URL
    #[arg(short, long, env = "RPC_URL", default_value = "http://localhost:8545")]
    pub rpc_url: String,

    /// Directory containing the compiled contract artifacts
    #[arg(short, long, default_value = "artifacts")]
    pub artifacts_dir: PathBuf,

    /// Path to the file deployed addresses are written to
    #[arg(short, long, default_value = "deployments.json")]
    pub deployments_path: PathBuf,

    /// The command to run
    #[command(subcommand)]
    pub command: Command,
}

/// The deployer's commands
#[derive(Subcommand)]
pub enum Command {
    /// Deploy, link, hand off, and initialize the token
    Deploy(DeployArgs),
    /// Link libraries into an artifact's bytecode and print the result
    Link(LinkArgs),
    /// Check a deployment without submitting anything
    Check(CheckArgs),
    /// Print the contract addresses recorded in the deployments file
    Status,
}

impl Command {
    /// Run the command
    pub async fn run(
        self,
        priv_key: Option<String>,
        rpc_url: &str,
        artifacts_dir: &Path,
        deployments_path: &Path,
    ) -> Result<(), DeployError> {
        match self {
            Command::Deploy(args) => {
                let priv_key = priv_key.ok_or_else(|| {
                    DeployError::ClientInitialization(
                        "a private key is required to deploy".to_string(),
                    )
                })?;
                deploy(args, &priv_key, rpc_url, artifacts_dir, deployments_path).await
            }
            Command::Link(args) => link_artifact(args, artifacts_dir),
            Command::Check(args) => check(args, artifacts_dir),
            Command::Status => status(deployments_path),
        }
    }
}

/// The token to deploy
#[derive(Args, Clone)]
pub struct TokenArgs {
    /// The token name, e.g. "USD Coin"
    #[arg(long)]
    pub token_name: String,

    /// The token symbol, e.g. "USDC"
    #[arg(long)]
    pub token_symbol: String,

    /// The fiat currency the token tracks
    #[arg(long, default_value = "USD")]
    pub currency: String,

    /// The number of decimal places
    #[arg(long, default_value_t = 6)]
    pub decimals: u8,

    /// The token owner; defaults to the deployer
    #[arg(long)]
    pub owner: Option<Address>,

    /// The pauser; defaults to the deployer
    #[arg(long)]
    pub pauser: Option<Address>,

    /// The blacklister; defaults to the deployer
    #[arg(long)]
    pub blacklister: Option<Address>,

    /// The master minter owner; defaults to the deployer
    #[arg(long)]
    pub master_minter_owner: Option<Address>,

    /// The proxy admin. Must not be the deployer, or the batched helper
    #[arg(long, default_value_t = DEFAULT_PROXY_ADMIN)]
    pub proxy_admin: Address,

    /// Deploy the proxy and master minter, and initialize the token, in one
    /// transaction through the helper contract at this address
    #[arg(long)]
    pub batched_helper: Option<Address>,
}

impl TokenArgs {
    /// Whether every role falls back to the deployer
    pub fn roles_default_to_caller(&self) -> bool {
        self.owner.is_none()
            && self.pauser.is_none()
            && self.blacklister.is_none()
            && self.master_minter_owner.is_none()
    }

    /// The deployment topology
    pub fn topology(&self) -> Topology {
        match self.batched_helper {
            Some(helper) => Topology::Batched { helper },
            None => Topology::Stepwise,
        }
    }

    /// Assemble the deployment parameters for the given deployer
    pub fn parameters(&self, caller: Address) -> DeploymentParameters {
        let roles = if self.roles_default_to_caller() {
            RoleAssignment::Caller
        } else {
            RoleAssignment::Explicit(Roles {
                owner: self.owner.unwrap_or(caller),
                pauser: self.pauser.unwrap_or(caller),
                blacklister: self.blacklister.unwrap_or(caller),
                master_minter_owner: self.master_minter_owner.unwrap_or(caller),
            })
        };

        DeploymentParameters::new(
            TokenMetadata {
                name: self.token_name.clone(),
                symbol: self.token_symbol.clone(),
                currency: self.currency.clone(),
                decimals: self.decimals,
            },
            roles,
            self.proxy_admin,
            caller,
        )
    }
}

/// Arguments to the `deploy` command
#[derive(Args)]
pub struct DeployArgs {
    /// The token to deploy
    #[command(flatten)]
    pub token: TokenArgs,

    /// The number of blocks a step's receipt must be buried under
    #[arg(long, default_value_t = DEFAULT_CONFIRMATIONS)]
    pub confirmations: u64,

    /// Milliseconds between receipt polls
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    pub poll_interval_ms: u64,

    /// Seconds to wait for a step to confirm before giving up
    #[arg(long, default_value_t = DEFAULT_CONFIRMATION_TIMEOUT.as_secs())]
    pub timeout_secs: u64,

    /// Extra attempts for a submission that failed to reach the node
    #[arg(long, default_value_t = DEFAULT_SUBMIT_RETRIES)]
    pub submit_retries: u32,
}

impl DeployArgs {
    /// The confirmation tunables
    pub fn confirmation_config(&self) -> ConfirmationConfig {
        ConfirmationConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Duration::from_secs(self.timeout_secs),
            confirmations: self.confirmations,
        }
    }

    /// The sequencer tunables
    pub fn sequencer_config(&self) -> SequencerConfig {
        SequencerConfig {
            topology: self.token.topology(),
            submit_retries: self.submit_retries,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Arguments to the `link` command
#[derive(Args)]
pub struct LinkArgs {
    /// The artifact to link, by name
    #[arg(long)]
    pub artifact: String,

    /// A library to link, as `<library>=<address>`. The library may be given
    /// by name, by `<source>:<name>`, or as a raw placeholder
    #[arg(long = "library", value_parser = parse_library)]
    pub libraries: Vec<(String, Address)>,
}

/// Arguments to the `check` command
#[derive(Args)]
pub struct CheckArgs {
    /// The token to check
    #[command(flatten)]
    pub token: TokenArgs,

    /// The account that would submit the deployment
    #[arg(long)]
    pub caller: Address,
}

/// Parse a `<library>=<address>` pair
fn parse_library(s: &str) -> Result<(String, Address), String> {
    let (library, address) = s
        .split_once('=')
        .ok_or_else(|| format!("expected `<library>=<address>`, got `{s}`"))?;
    let address = address
        .trim()
        .parse::<Address>()
        .map_err(|e| format!("invalid address `{address}`: {e}"))?;

    Ok((library.trim().to_string(), address))
}

#[cfg(test)]
mod tests {
    use alloy_primitives::Address;
    use clap::Parser;

    use crate::{
        constants::DEFAULT_PROXY_ADMIN,
        params::Roles,
        sequencer::Topology,
        test_helpers::{ALICE, BOB, HELPER},
    };

    use super::{parse_library, Cli, Command};

    #[test]
    fn test_parse_deploy_defaults() {
        let cli = Cli::try_parse_from([
            "deployer",
            "--priv-key",
            "0x01",
            "deploy",
            "--token-name",
            "USD Coin",
            "--token-symbol",
            "USDC",
        ])
        .unwrap();

        let Command::Deploy(args) = cli.command else {
            panic!("expected the deploy command")
        };
        assert_eq!(args.token.proxy_admin, DEFAULT_PROXY_ADMIN);
        assert_eq!(args.token.decimals, 6);
        assert_eq!(args.token.topology(), Topology::Stepwise);
        assert!(args.token.roles_default_to_caller());
        assert_eq!(args.confirmation_config().confirmations, 1);

        let params = args.token.parameters(ALICE);
        assert_eq!(params.owner, ALICE);
        assert_eq!(params.master_minter_owner, ALICE);
    }

    #[test]
    fn test_partial_role_overrides_fall_back_to_caller() {
        let bob = format!("{BOB:#x}");
        let helper = format!("{HELPER:#x}");
        let cli = Cli::try_parse_from([
            "deployer",
            "check",
            "--token-name",
            "Euro Coin",
            "--token-symbol",
            "EURC",
            "--currency",
            "EUR",
            "--pauser",
            &bob,
            "--batched-helper",
            &helper,
            "--caller",
            &format!("{ALICE:#x}"),
        ])
        .unwrap();

        let Command::Check(args) = cli.command else {
            panic!("expected the check command")
        };
        assert!(!args.token.roles_default_to_caller());
        assert_eq!(args.token.topology(), Topology::Batched { helper: HELPER });
        assert_eq!(
            args.token.parameters(args.caller).roles(),
            Roles {
                owner: ALICE,
                pauser: BOB,
                blacklister: ALICE,
                master_minter_owner: ALICE,
            }
        );
    }

    #[test]
    fn test_parse_status() {
        let cli =
            Cli::try_parse_from(["deployer", "--deployments-path", "out.json", "status"]).unwrap();
        assert!(matches!(cli.command, Command::Status));
        assert_eq!(cli.deployments_path, std::path::PathBuf::from("out.json"));
    }

    #[test]
    fn test_parse_library_pairs() {
        let (library, address) =
            parse_library("SignatureChecker=0x0000000000000000000000000000000000000042").unwrap();
        assert_eq!(library, "SignatureChecker");
        assert_eq!(address, Address::with_last_byte(0x42));

        assert!(parse_library("SignatureChecker").is_err());
        assert!(parse_library("SignatureChecker=0x12").is_err());
    }
}
