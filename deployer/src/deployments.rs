//! Reading and writing the deployments file
//!
//! The file is a JSON object. Deployed addresses live under the `deployments`
//! key; the most recent run's step ledger and outcome live alongside them so an
//! aborted run leaves enough behind to finish the deployment by hand.

use std::{fs, path::Path, str::FromStr};

use alloy_primitives::Address;
use serde_json::{json, Map, Value};

use crate::{
    constants::{
        DEPLOYMENTS_KEY, IMPLEMENTATION_CONTRACT_KEY, LIBRARY_CONTRACT_KEY,
        MASTER_MINTER_CONTRACT_KEY, PROXY_CONTRACT_KEY,
    },
    errors::DeployError,
    sequencer::{RunReport, StepId, TerminalStatus},
};

/// The key of the last run's step ledger
const STEPS_KEY: &str = "steps";
/// The key of the last run's outcome
const STATUS_KEY: &str = "status";
/// The key of the last run's parameters
const PARAMETERS_KEY: &str = "parameters";

/// The deployments file key of each step that produces a contract
const CONTRACT_KEYS: [(StepId, &str); 4] = [
    (StepId::DeployLibrary, LIBRARY_CONTRACT_KEY),
    (StepId::DeployImplementation, IMPLEMENTATION_CONTRACT_KEY),
    (StepId::DeployProxy, PROXY_CONTRACT_KEY),
    (StepId::DeployMasterMinter, MASTER_MINTER_CONTRACT_KEY),
];

/// Read the deployments file, or an empty object if it does not exist
fn read_json(path: &Path) -> Result<Map<String, Value>, DeployError> {
    if !path.exists() {
        return Ok(Map::new());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| DeployError::ReadFile(format!("{}: {e}", path.display())))?;
    match serde_json::from_str(&contents) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(DeployError::ReadFile(format!(
            "{}: expected a JSON object",
            path.display()
        ))),
        Err(e) => Err(DeployError::ReadFile(format!("{}: {e}", path.display()))),
    }
}

/// Write the deployments file
fn write_json(path: &Path, contents: Map<String, Value>) -> Result<(), DeployError> {
    let pretty = serde_json::to_string_pretty(&Value::Object(contents))
        .map_err(|e| DeployError::WriteFile(e.to_string()))?;
    fs::write(path, pretty).map_err(|e| DeployError::WriteFile(format!("{}: {e}", path.display())))
}

/// Read a deployed address from the deployments file, `None` if no run has
/// recorded one
pub fn read_deployment(path: &Path, contract_key: &str) -> Result<Option<Address>, DeployError> {
    let contents = read_json(path)?;
    let Some(address) = contents
        .get(DEPLOYMENTS_KEY)
        .and_then(|d| d.get(contract_key))
    else {
        return Ok(None);
    };

    address
        .as_str()
        .and_then(|s| Address::from_str(s).ok())
        .map(Some)
        .ok_or_else(|| {
            DeployError::ReadFile(format!(
                "invalid `{contract_key}` address in {}",
                path.display()
            ))
        })
}

/// Record the outcome of a run: every address it produced, its step ledger,
/// and how it ended
pub fn write_run_report(path: &Path, report: &RunReport) -> Result<(), DeployError> {
    let mut contents = read_json(path)?;
    for (step, key) in CONTRACT_KEYS {
        if let Some(address) = report.state.produced_address(step) {
            set_address(&mut contents, key, address);
        }
    }

    let to_value = |v: Result<Value, serde_json::Error>| {
        v.map_err(|e| DeployError::WriteFile(e.to_string()))
    };
    contents.insert(
        PARAMETERS_KEY.to_string(),
        to_value(serde_json::to_value(report.state.parameters()))?,
    );
    contents.insert(
        STEPS_KEY.to_string(),
        to_value(serde_json::to_value(report.state.results()))?,
    );

    let status = match &report.status {
        TerminalStatus::AllConfirmed(_) => json!({ "complete": true }),
        TerminalStatus::Aborted { at_step, error } => json!({
            "complete": false,
            "aborted_at": at_step.map(|s| s.to_string()),
            "error": error.to_string(),
        }),
    };
    contents.insert(STATUS_KEY.to_string(), status);

    write_json(path, contents)
}

/// Set `deployments.<key>` to the address as lowercase hex
fn set_address(contents: &mut Map<String, Value>, key: &str, address: Address) {
    let deployments = contents
        .entry(DEPLOYMENTS_KEY)
        .or_insert_with(|| Value::Object(Map::new()));
    if !deployments.is_object() {
        *deployments = Value::Object(Map::new());
    }
    if let Value::Object(map) = deployments {
        map.insert(key.to_string(), Value::String(format!("{address:#x}")));
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use alloy_primitives::Address;
    use serde_json::Value;

    use crate::{
        constants::{LIBRARY_CONTRACT_KEY, PROXY_CONTRACT_KEY},
        errors::DeployError,
        sequencer::{OrchestrationState, RunReport, StepId, StepResult, TerminalStatus},
        test_helpers::{usdc_params, ALICE, BOB},
    };

    use super::{read_deployment, write_run_report};

    /// A fresh path in the system temp dir
    fn temp_path(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "token-deployer-{name}-{}.json",
            Address::random()
        ));
        let _ = fs::remove_file(&path);
        path
    }

    #[test]
    fn test_read_missing_and_invalid_addresses() {
        let path = temp_path("address");
        assert_eq!(read_deployment(&path, PROXY_CONTRACT_KEY).unwrap(), None);

        fs::write(&path, r#"{"deployments":{"fiat_token_proxy":"0x42"}}"#).unwrap();
        assert!(matches!(
            read_deployment(&path, PROXY_CONTRACT_KEY),
            Err(DeployError::ReadFile(_))
        ));
        assert_eq!(read_deployment(&path, LIBRARY_CONTRACT_KEY).unwrap(), None);

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_aborted_run_keeps_partial_addresses() {
        let path = temp_path("aborted");
        let library = Address::repeat_byte(0x10);

        let mut state = OrchestrationState::new(usdc_params(ALICE, BOB));
        state.record(StepResult::confirmed(StepId::DeployLibrary, Some(library), None));
        let error = DeployError::Reverted {
            reason: "out of gas".to_string(),
        };
        state.record(StepResult::failed(StepId::LinkImplementation, None, &error));
        let report = RunReport {
            state,
            status: TerminalStatus::Aborted {
                at_step: Some(StepId::LinkImplementation),
                error,
            },
        };

        write_run_report(&path, &report).unwrap();
        assert_eq!(read_deployment(&path, LIBRARY_CONTRACT_KEY).unwrap(), Some(library));
        assert_eq!(read_deployment(&path, PROXY_CONTRACT_KEY).unwrap(), None);

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["status"]["complete"], Value::Bool(false));
        assert_eq!(written["status"]["aborted_at"], "link-implementation");
        assert_eq!(written["steps"].as_array().unwrap().len(), 2);
        assert_eq!(written["parameters"]["token_symbol"], "USDC");

        fs::remove_file(path).unwrap();
    }
}
