//! Definitions of Solidity functions called during deployment

#![allow(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]

use alloy_primitives::{Address, Bytes};
use alloy_sol_types::{sol, SolCall, SolValue};

use crate::params::DeploymentParameters;

// Methods of `FiatTokenV2_2`, `FiatTokenProxy`, and `MasterMinter` invoked
// during a stepwise deployment
sol! {
    function initialize(
        string tokenName,
        string tokenSymbol,
        string tokenCurrency,
        uint8 tokenDecimals,
        address newMasterMinter,
        address newPauser,
        address newBlacklister,
        address newOwner
    ) external;
    function initializeV2(string newName) external;
    function initializeV2_1(address lostAndFound) external;
    function initializeV2_2(address[] accountsToBlacklist, string newSymbol) external;
    function changeAdmin(address newAdmin) external;
    function transferOwnership(address newOwner) external;
}

// The helper contract used by the batched topology. It deploys the proxy and
// master minter, hands off ownership and admin, and runs every initializer in
// one transaction
sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct TokenInitialization {
        string tokenName;
        string tokenSymbol;
        string currency;
        uint8 decimals;
        address owner;
        address pauser;
        address blacklister;
        address masterMinterOwner;
        address proxyAdmin;
    }

    interface ITokenDeploymentHelper {
        event TokenDeployed(
            address indexed proxy,
            address indexed masterMinter,
            address implementation
        );

        function deployAndInitialize(address implementation, TokenInitialization params)
            external
            returns (address proxy, address masterMinter);
    }
}

/// ABI-encoded constructor arguments for a contract taking a single address
pub fn address_constructor_args(address: Address) -> Bytes {
    address.abi_encode().into()
}

/// Calldata for `initialize`, the V1 initializer
pub fn initialize_v1_calldata(params: &DeploymentParameters, master_minter: Address) -> Bytes {
    initializeCall {
        tokenName: params.token_name.clone(),
        tokenSymbol: params.token_symbol.clone(),
        tokenCurrency: params.currency.clone(),
        tokenDecimals: params.decimal_places,
        newMasterMinter: master_minter,
        newPauser: params.pauser,
        newBlacklister: params.blacklister,
        newOwner: params.owner,
    }
    .abi_encode()
    .into()
}

/// Calldata for `initializeV2`
pub fn initialize_v2_calldata(params: &DeploymentParameters) -> Bytes {
    initializeV2Call {
        newName: params.token_name.clone(),
    }
    .abi_encode()
    .into()
}

/// Calldata for `initializeV2_1`, using the owner as the lost-and-found account
pub fn initialize_v2_1_calldata(params: &DeploymentParameters) -> Bytes {
    initializeV2_1Call {
        lostAndFound: params.owner,
    }
    .abi_encode()
    .into()
}

/// Calldata for `initializeV2_2`, blacklisting no accounts
pub fn initialize_v2_2_calldata(params: &DeploymentParameters) -> Bytes {
    initializeV2_2Call {
        accountsToBlacklist: Vec::new(),
        newSymbol: params.token_symbol.clone(),
    }
    .abi_encode()
    .into()
}

/// Calldata for the proxy's `changeAdmin`
pub fn change_admin_calldata(new_admin: Address) -> Bytes {
    changeAdminCall { newAdmin: new_admin }.abi_encode().into()
}

/// Calldata for the master minter's `transferOwnership`
pub fn transfer_ownership_calldata(new_owner: Address) -> Bytes {
    transferOwnershipCall {
        newOwner: new_owner,
    }
    .abi_encode()
    .into()
}

/// Calldata for the batched helper's `deployAndInitialize`
pub fn deploy_and_initialize_calldata(
    implementation: Address,
    params: &DeploymentParameters,
) -> Bytes {
    ITokenDeploymentHelper::deployAndInitializeCall {
        implementation,
        params: TokenInitialization {
            tokenName: params.token_name.clone(),
            tokenSymbol: params.token_symbol.clone(),
            currency: params.currency.clone(),
            decimals: params.decimal_places,
            owner: params.owner,
            pauser: params.pauser,
            blacklister: params.blacklister,
            masterMinterOwner: params.master_minter_owner,
            proxyAdmin: params.proxy_admin,
        },
    }
    .abi_encode()
    .into()
}
