use alloy::sol;

// Inline ABI binding — there is no Solidity source tree in this workspace to
// load an `IExecutor.sol` off disk, so the interface is declared directly
// inline.
sol! {
    #[sol(rpc)]
    interface IInvoiceAnchor {
        struct BatchView {
            bytes32 merkleRoot;
            uint256 batchSize;
            address issuer;
            string metadataURI;
            uint256 timestamp;
        }

        event BatchAnchored(bytes32 indexed merkleRoot, uint256 batchSize, string metadataURI);

        function anchorBatch(bytes32 merkleRoot, uint256 batchSize, string metadataURI) external;
        function verifyInvoiceByCID(bytes32 merkleRoot, string cid, bytes32[] proof) external view returns (bool);
        function registerIndividualInvoice(bytes32 merkleRoot, string invoiceId, string cid, bytes32 invoiceHash) external;
        function getBatch(bytes32 merkleRoot) external view returns (BatchView);
    }
}
