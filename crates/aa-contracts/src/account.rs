//! Account and account-factory ABI.
#![allow(missing_docs)]

use alloy_sol_types::sol;

sol! {
    interface ISimpleAccount {
        error NotFromEntryPointOrOwner(address caller);
        error WrongArrayLengths();

        function execute(address dest, uint256 value, bytes calldata func) external;
        function executeBatch(
            address[] calldata dest,
            uint256[] calldata value,
            bytes[] calldata func
        ) external;
    }

    interface ISimpleAccountFactory {
        function createAccount(address owner, uint256 salt) external returns (address ret);
    }
}
