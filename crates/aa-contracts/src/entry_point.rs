//! ERC-4337 v0.7 entry-point ABI.
#![allow(missing_docs)]

use alloy_sol_types::sol;

sol! {
    /// A user operation in the packed ERC-4337 v0.7 form.
    #[derive(Default, Debug, PartialEq, Eq)]
    struct PackedUserOperation {
        address sender;
        uint256 nonce;
        bytes initCode;
        bytes callData;
        bytes32 accountGasLimits;
        uint256 preVerificationGas;
        bytes32 gasFees;
        bytes paymasterAndData;
        bytes signature;
    }

    /// The operation fields covered by the operation hash, with dynamic fields replaced by their
    /// hashes.
    #[derive(Default, Debug, PartialEq, Eq)]
    struct UserOperationHashFields {
        address sender;
        uint256 nonce;
        bytes32 hashInitCode;
        bytes32 hashCallData;
        bytes32 accountGasLimits;
        uint256 preVerificationGas;
        bytes32 gasFees;
        bytes32 hashPaymasterAndData;
    }

    /// Binds the inner operation hash to an entry point and a chain.
    #[derive(Default, Debug, PartialEq, Eq)]
    struct UserOperationHashEnvelope {
        bytes32 encodedHash;
        address entryPoint;
        uint256 chainId;
    }

    interface IEntryPoint {
        event UserOperationEvent(
            bytes32 indexed userOpHash,
            address indexed sender,
            address indexed paymaster,
            uint256 nonce,
            bool success,
            uint256 actualGasCost,
            uint256 actualGasUsed
        );
        event AccountDeployed(
            bytes32 indexed userOpHash,
            address indexed sender,
            address factory,
            address paymaster
        );
        event UserOperationRevertReason(
            bytes32 indexed userOpHash,
            address indexed sender,
            uint256 nonce,
            bytes revertReason
        );
        event PostOpRevertReason(
            bytes32 indexed userOpHash,
            address indexed sender,
            uint256 nonce,
            bytes revertReason
        );
        event BeforeExecution();
        event Deposited(address indexed account, uint256 totalDeposit);
        event Withdrawn(address indexed account, address withdrawAddress, uint256 amount);

        error FailedOp(uint256 opIndex, string reason);

        function depositTo(address account) external payable;
    }
}
