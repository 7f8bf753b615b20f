//! Resolution of compiled contract artifacts
//!
//! An artifact is the JSON emitted by Hardhat or Foundry for a single contract.
//! Hardhat stores the creation bytecode as a hex string under `bytecode`, while
//! Foundry nests it under `bytecode.object`. Both shapes are accepted.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
};

use alloy::json_abi::JsonAbi;
use serde::Deserialize;
use serde_json::Value;

use crate::{constants::PLACEHOLDER_PREFIX, errors::DeployError, linker::placeholder_for};

/// Link references keyed by source file, then by library name
type RawLinkReferences = BTreeMap<String, BTreeMap<String, Value>>;

/// The on-disk shape of an artifact
#[derive(Deserialize)]
struct RawArtifact {
    /// The contract ABI
    abi: JsonAbi,
    /// The creation bytecode
    bytecode: RawBytecode,
    /// Hardhat-style top-level link references
    #[serde(default, rename = "linkReferences")]
    link_references: RawLinkReferences,
}

/// The two bytecode encodings seen in artifacts
#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    /// A bare hex string
    Hex(String),
    /// An object with the hex under `object`, possibly alongside link references
    Object {
        /// The bytecode hex
        object: String,
        /// Foundry-style link references
        #[serde(default, rename = "linkReferences")]
        link_references: RawLinkReferences,
    },
}

/// A library the compiler recorded as a link-time dependency of an artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReference {
    /// The source file declaring the library
    pub source: String,
    /// The library name
    pub library: String,
}

impl LinkReference {
    /// The `<source>:<library>` name the compiler hashes into the placeholder
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source, self.library)
    }

    /// The placeholder token this reference appears as in the bytecode
    pub fn placeholder(&self) -> String {
        placeholder_for(&self.fully_qualified_name())
    }
}

/// A resolved contract artifact: its interface and its creation payload
#[derive(Debug, Clone)]
pub struct ArtifactDescriptor {
    /// The name the artifact is resolved by
    name: String,
    /// The contract ABI, used to check the methods we invoke
    interface: JsonAbi,
    /// The creation bytecode in hex, without a `0x` prefix, possibly templated
    payload_template: String,
    /// Whether the payload contains library placeholders
    is_templated: bool,
    /// The libraries this artifact must be linked against
    link_references: Vec<LinkReference>,
}

impl ArtifactDescriptor {
    /// Build a descriptor directly from its parts
    pub fn new(name: &str, interface: JsonAbi, payload: &str) -> Self {
        let payload_template = payload.trim().trim_start_matches("0x").to_string();
        let is_templated = payload_template.contains(PLACEHOLDER_PREFIX);

        Self {
            name: name.to_string(),
            interface,
            payload_template,
            is_templated,
            link_references: Vec::new(),
        }
    }

    /// Parse a descriptor from artifact JSON
    pub fn from_json(name: &str, json: &str) -> Result<Self, DeployError> {
        let raw: RawArtifact = serde_json::from_str(json)
            .map_err(|e| DeployError::ArtifactParsing(format!("{name}: {e}")))?;

        let (payload, mut raw_refs) = match raw.bytecode {
            RawBytecode::Hex(hex) => (hex, RawLinkReferences::new()),
            RawBytecode::Object {
                object,
                link_references,
            } => (object, link_references),
        };
        raw_refs.extend(raw.link_references);

        let mut descriptor = Self::new(name, raw.abi, &payload);
        descriptor.link_references = raw_refs
            .into_iter()
            .flat_map(|(source, libraries)| {
                libraries.into_keys().map(move |library| LinkReference {
                    source: source.clone(),
                    library,
                })
            })
            .collect();

        Ok(descriptor)
    }

    /// The name of the artifact
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The contract ABI
    pub fn interface(&self) -> &JsonAbi {
        &self.interface
    }

    /// The creation payload in hex, placeholders included
    pub fn payload_template(&self) -> &str {
        &self.payload_template
    }

    /// Whether the payload must be linked before it can be submitted
    pub fn is_templated(&self) -> bool {
        self.is_templated
    }

    /// The libraries recorded as link-time dependencies
    pub fn link_references(&self) -> &[LinkReference] {
        &self.link_references
    }

    /// The placeholder for the named library, if the artifact records it
    pub fn placeholder_for_library(&self, library: &str) -> Option<String> {
        self.link_references
            .iter()
            .find(|r| r.library == library)
            .map(LinkReference::placeholder)
    }

    /// Ensure the ABI exposes a function with the given name
    pub fn require_function(&self, function: &str) -> Result<(), DeployError> {
        if self.interface.function(function).is_some() {
            Ok(())
        } else {
            Err(DeployError::InvalidOperation(format!(
                "artifact `{}` has no function `{}`",
                self.name, function
            )))
        }
    }
}

/// A set of artifacts, resolvable by name
#[derive(Debug, Clone, Default)]
pub struct ArtifactRegistry {
    /// The artifacts keyed by name
    artifacts: HashMap<String, ArtifactDescriptor>,
}

impl ArtifactRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `<name>.json` from `dir` for each of the given names
    pub fn from_dir(dir: &Path, names: &[&str]) -> Result<Self, DeployError> {
        let mut registry = Self::new();
        for name in names {
            let path = dir.join(format!("{name}.json"));
            if !path.exists() {
                return Err(DeployError::ArtifactNotFound(format!(
                    "{name} (looked for {})",
                    path.display()
                )));
            }

            let json = fs::read_to_string(&path)
                .map_err(|e| DeployError::ReadFile(format!("{}: {e}", path.display())))?;
            registry.insert(ArtifactDescriptor::from_json(name, &json)?);
        }

        Ok(registry)
    }

    /// Add an artifact, replacing any artifact of the same name
    pub fn insert(&mut self, descriptor: ArtifactDescriptor) {
        self.artifacts
            .insert(descriptor.name().to_string(), descriptor);
    }

    /// Resolve an artifact by name
    pub fn resolve(&self, name: &str) -> Result<&ArtifactDescriptor, DeployError> {
        self.artifacts
            .get(name)
            .ok_or_else(|| DeployError::ArtifactNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use crate::{constants::SIGNATURE_CHECKER_PLACEHOLDER, errors::DeployError};

    use super::{ArtifactDescriptor, ArtifactRegistry};

    const ABI: &str = r#"[{"type":"function","name":"changeAdmin","inputs":[{"name":"newAdmin","type":"address"}],"outputs":[],"stateMutability":"nonpayable"}]"#;

    #[test]
    fn test_parse_hardhat_artifact() {
        let json = format!(
            r#"{{
                "contractName": "FiatTokenV2_2",
                "abi": {ABI},
                "bytecode": "0x6080{SIGNATURE_CHECKER_PLACEHOLDER}00",
                "linkReferences": {{
                    "contracts/util/SignatureChecker.sol": {{
                        "SignatureChecker": [{{ "start": 2, "length": 20 }}]
                    }}
                }}
            }}"#
        );
        let artifact = ArtifactDescriptor::from_json("FiatTokenV2_2", &json).unwrap();

        assert!(artifact.is_templated());
        assert_eq!(
            artifact.payload_template(),
            format!("6080{SIGNATURE_CHECKER_PLACEHOLDER}00")
        );
        assert_eq!(artifact.link_references().len(), 1);
        assert_eq!(
            artifact.link_references()[0].fully_qualified_name(),
            "contracts/util/SignatureChecker.sol:SignatureChecker"
        );
        assert!(artifact.placeholder_for_library("SignatureChecker").is_some());
        assert!(artifact.placeholder_for_library("Other").is_none());
    }

    #[test]
    fn test_parse_foundry_artifact() {
        let json = format!(r#"{{ "abi": {ABI}, "bytecode": {{ "object": "0x60806040" }} }}"#);
        let artifact = ArtifactDescriptor::from_json("FiatTokenProxy", &json).unwrap();

        assert!(!artifact.is_templated());
        assert_eq!(artifact.payload_template(), "60806040");
        assert!(artifact.require_function("changeAdmin").is_ok());
        assert!(matches!(
            artifact.require_function("upgradeTo"),
            Err(DeployError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_parse_garbage_artifact() {
        let res = ArtifactDescriptor::from_json("Broken", r#"{ "abi": 7 }"#);
        assert!(matches!(res, Err(DeployError::ArtifactParsing(_))));
    }

    #[test]
    fn test_resolve_unknown_artifact() {
        let mut registry = ArtifactRegistry::new();
        registry.insert(ArtifactDescriptor::new("A", Default::default(), "0x00"));

        assert_eq!(registry.resolve("A").unwrap().payload_template(), "00");
        assert_eq!(
            registry.resolve("B").unwrap_err(),
            DeployError::ArtifactNotFound("B".to_string())
        );
    }
}
