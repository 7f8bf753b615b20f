//! The parameters a deployment is provisioned with

use alloy_primitives::Address;
use serde::Serialize;

use crate::errors::DeployError;

/// The user-facing metadata of the token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    /// The token name, e.g. "USD Coin"
    pub name: String,
    /// The token symbol, e.g. "USDC"
    pub symbol: String,
    /// The fiat currency the token tracks, e.g. "USD"
    pub currency: String,
    /// The number of decimal places
    pub decimals: u8,
}

/// The addresses holding each administrative role of the token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Roles {
    /// The token owner, also the lost-and-found account
    pub owner: Address,
    /// The account allowed to pause the token
    pub pauser: Address,
    /// The account allowed to blacklist holders
    pub blacklister: Address,
    /// The account that receives ownership of the master minter
    pub master_minter_owner: Address,
}

/// How the administrative roles are assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleAssignment {
    /// Every role is held by the account submitting the deployment
    Caller,
    /// Each role is held by the given address
    Explicit(Roles),
}

impl RoleAssignment {
    /// Resolve the roles against the submitting account
    pub fn resolve(&self, caller: Address) -> Roles {
        match self {
            RoleAssignment::Caller => Roles {
                owner: caller,
                pauser: caller,
                blacklister: caller,
                master_minter_owner: caller,
            },
            RoleAssignment::Explicit(roles) => *roles,
        }
    }
}

/// Everything a run needs to know up front
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentParameters {
    /// The token name
    pub token_name: String,
    /// The token symbol
    pub token_symbol: String,
    /// The fiat currency the token tracks
    pub currency: String,
    /// The number of decimal places
    pub decimal_places: u8,
    /// The token owner
    pub owner: Address,
    /// The pauser
    pub pauser: Address,
    /// The blacklister
    pub blacklister: Address,
    /// The owner the master minter is handed to
    pub master_minter_owner: Address,
    /// The admin the proxy is handed to.
    ///
    /// Must not be an account that calls through the proxy, since the proxy
    /// routes its admin's calls to the admin functions instead of forwarding
    /// them to the implementation
    pub proxy_admin: Address,
}

impl DeploymentParameters {
    /// Assemble the parameters from the token metadata and role assignment
    pub fn new(
        token: TokenMetadata,
        roles: RoleAssignment,
        proxy_admin: Address,
        caller: Address,
    ) -> Self {
        let Roles {
            owner,
            pauser,
            blacklister,
            master_minter_owner,
        } = roles.resolve(caller);

        Self {
            token_name: token.name,
            token_symbol: token.symbol,
            currency: token.currency,
            decimal_places: token.decimals,
            owner,
            pauser,
            blacklister,
            master_minter_owner,
            proxy_admin,
        }
    }

    /// The roles held under these parameters
    pub fn roles(&self) -> Roles {
        Roles {
            owner: self.owner,
            pauser: self.pauser,
            blacklister: self.blacklister,
            master_minter_owner: self.master_minter_owner,
        }
    }

    /// Check the parameters against the accounts that will call the
    /// implementation through the proxy
    pub fn validate(&self, proxy_callers: &[Address]) -> Result<(), DeployError> {
        for (field, value) in [
            ("token name", &self.token_name),
            ("token symbol", &self.token_symbol),
            ("currency", &self.currency),
        ] {
            if value.trim().is_empty() {
                return Err(DeployError::InvariantViolation(format!("{field} is empty")));
            }
        }

        for (role, address) in [
            ("owner", self.owner),
            ("pauser", self.pauser),
            ("blacklister", self.blacklister),
            ("master minter owner", self.master_minter_owner),
            ("proxy admin", self.proxy_admin),
        ] {
            if address.is_zero() {
                return Err(DeployError::InvariantViolation(format!(
                    "{role} is the zero address"
                )));
            }
        }

        if let Some(caller) = proxy_callers.iter().find(|c| **c == self.proxy_admin) {
            return Err(DeployError::InvariantViolation(format!(
                "proxy admin {caller:#x} also calls through the proxy; \
                 its calls would never reach the implementation"
            )));
        }

        Ok(())
    }
}
