//! Provisioning of an upgradeable fiat-backed token: library deployment and
//! linking, implementation, proxy and master minter deployment, role handoff,
//! and the initializer chain, run as a fail-stop sequence of ledger steps.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod artifacts;
pub mod cli;
mod commands;
pub mod constants;
pub mod deployments;
pub mod errors;
pub mod ledger;
pub mod linker;
pub mod params;
pub mod reporter;
pub mod rpc;
pub mod sequencer;
pub mod solidity;
#[cfg(test)]
mod test_helpers;
