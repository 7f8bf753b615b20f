//! Implementations of the deployer commands

use std::{collections::HashMap, path::Path};

use itertools::Itertools;
use tracing::{info, warn};

use crate::{
    artifacts::{ArtifactDescriptor, ArtifactRegistry},
    cli::{CheckArgs, DeployArgs, LinkArgs},
    constants::{
        IMPLEMENTATION_ARTIFACT, IMPLEMENTATION_CONTRACT_KEY, LIBRARY_CONTRACT_KEY,
        MASTER_MINTER_CONTRACT_KEY, PLACEHOLDER_PREFIX, PROXY_CONTRACT_KEY, REQUIRED_ARTIFACTS,
        SIGNATURE_CHECKER_ARTIFACT, SIGNATURE_CHECKER_PLACEHOLDER,
    },
    deployments::{read_deployment, write_run_report},
    errors::DeployError,
    ledger::SubmissionGateway,
    linker::{link, placeholder_for},
    reporter::TracingReporter,
    rpc::RpcLedger,
    sequencer::{self, CancelToken, Sequencer, Topology},
};

/// The artifacts a topology deploys from
fn artifact_names(topology: Topology) -> &'static [&'static str] {
    match topology {
        Topology::Stepwise => &REQUIRED_ARTIFACTS,
        // The helper deploys the proxy and master minter from its own bytecode
        Topology::Batched { .. } => &[SIGNATURE_CHECKER_ARTIFACT, IMPLEMENTATION_ARTIFACT],
    }
}

/// Provision the token end to end, recording the outcome in the deployments
/// file whether or not the run completes
pub async fn deploy(
    args: DeployArgs,
    priv_key: &str,
    rpc_url: &str,
    artifacts_dir: &Path,
    deployments_path: &Path,
) -> Result<(), DeployError> {
    let topology = args.token.topology();
    let artifacts = ArtifactRegistry::from_dir(artifacts_dir, artifact_names(topology))?;
    let ledger = RpcLedger::connect(priv_key, rpc_url, args.confirmation_config())?;

    let caller = ledger.caller();
    if args.token.roles_default_to_caller() {
        warn!(
            deployer = %format!("{caller:#x}"),
            "every token role will be held by the deployer; \
             pass --owner, --pauser, --blacklister, or --master-minter-owner to assign them"
        );
    }
    let params = args.token.parameters(caller);

    let sequencer = Sequencer::new(
        artifacts,
        ledger.clone(),
        ledger,
        TracingReporter,
        args.sequencer_config(),
    );

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping once the step in flight settles");
            on_interrupt.cancel();
        }
    });

    let report = sequencer.run(params, &cancel).await;
    write_run_report(deployments_path, &report)?;
    info!(path = %deployments_path.display(), "recorded deployment");

    let bundle = report.into_result()?;
    println!("Token proxy deployed at {:#x}", bundle.proxy);
    println!("Token implementation deployed at {:#x}", bundle.implementation);
    println!("Master minter deployed at {:#x}", bundle.master_minter);

    Ok(())
}

/// Link libraries into an artifact and print the linked bytecode
pub fn link_artifact(args: LinkArgs, artifacts_dir: &Path) -> Result<(), DeployError> {
    let registry = ArtifactRegistry::from_dir(artifacts_dir, &[args.artifact.as_str()])?;
    let artifact = registry.resolve(&args.artifact)?;

    let dependencies = args
        .libraries
        .iter()
        .map(|(library, address)| Ok((library_placeholder(artifact, library)?, *address)))
        .collect::<Result<HashMap<_, _>, DeployError>>()?;

    let linked = link(artifact.payload_template(), &dependencies)?;
    println!("0x{linked}");

    Ok(())
}

/// Run the pre-flight checks of a deployment offline
pub fn check(args: CheckArgs, artifacts_dir: &Path) -> Result<(), DeployError> {
    let topology = args.token.topology();
    let names = artifact_names(topology);
    let artifacts = ArtifactRegistry::from_dir(artifacts_dir, names)?;
    let params = args.token.parameters(args.caller);

    sequencer::check(&artifacts, topology, args.caller, &params)?;
    info!(
        artifacts = %names.iter().join(", "),
        token = %params.token_symbol,
        "pre-flight checks passed"
    );

    Ok(())
}

/// Print the contract addresses earlier runs recorded
pub fn status(deployments_path: &Path) -> Result<(), DeployError> {
    for key in [
        LIBRARY_CONTRACT_KEY,
        IMPLEMENTATION_CONTRACT_KEY,
        PROXY_CONTRACT_KEY,
        MASTER_MINTER_CONTRACT_KEY,
    ] {
        match read_deployment(deployments_path, key)? {
            Some(address) => println!("{key}: {address:#x}"),
            None => println!("{key}: not deployed"),
        }
    }

    Ok(())
}

/// The placeholder a library appears as in an artifact.
///
/// Accepts a raw placeholder, a `<source>:<name>` reference, or a bare name
/// the artifact records a link reference for
fn library_placeholder(
    artifact: &ArtifactDescriptor,
    library: &str,
) -> Result<String, DeployError> {
    if library.starts_with(PLACEHOLDER_PREFIX) {
        return Ok(library.to_string());
    }
    if library.contains(':') {
        return Ok(placeholder_for(library));
    }

    match artifact.placeholder_for_library(library) {
        Some(placeholder) => Ok(placeholder),
        None if library == SIGNATURE_CHECKER_ARTIFACT => {
            Ok(SIGNATURE_CHECKER_PLACEHOLDER.to_string())
        }
        None => Err(DeployError::InvalidOperation(format!(
            "artifact `{}` records no library `{library}`; pass it as <source>:<name>",
            artifact.name()
        ))),
    }
}
