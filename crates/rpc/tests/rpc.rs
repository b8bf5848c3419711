mod common;

use common::{draft, error_code, issuer, outsider, start_misconfigured_node, start_node};
use credence_primitives::{
    constants::rpc_error_codes::{CONFIG, CONFLICT, NOT_FOUND, UNAUTHORIZED, UNKNOWN_ACCOUNT},
    OperationKind, TransactionId, TransactionStatus, VerificationStatus, WalletStatus,
};
use credence_relayer::QueueRequest;
use credence_rpc::{CredentialApiClient, RelayerApiClient};
use ethers::types::{Address, Bytes, U256};

fn call(owner: Address) -> QueueRequest {
    QueueRequest {
        owner_address: owner,
        target: Address::repeat_byte(0x77),
        value: U256::zero(),
        call_data: Bytes::from(vec![0xde, 0xad]),
        operation_kind: OperationKind::Call,
        description: "poke".into(),
    }
}

#[tokio::test]
async fn relayer_namespace() {
    let node = start_node().await;
    let owner = Address::repeat_byte(0x42);

    assert_eq!(
        error_code(RelayerApiClient::queue_transaction(&node.client, call(owner)).await),
        UNKNOWN_ACCOUNT
    );

    let wallet = RelayerApiClient::provision_wallet(&node.client, owner).await.unwrap();
    assert_eq!(wallet.status, WalletStatus::Created);
    node.tick().await;

    let deployment = RelayerApiClient::get_wallet_status(&node.client, owner).await.unwrap();
    assert!(deployment.deployed);

    let queued = RelayerApiClient::queue_transaction(&node.client, call(owner)).await.unwrap();
    assert_eq!(queued.status, TransactionStatus::Pending);
    node.tick().await;

    let status = RelayerApiClient::get_transaction_status(&node.client, queued.transaction_id)
        .await
        .unwrap();
    assert_eq!(status.status, TransactionStatus::Confirmed);
    assert!(status.tx_hash.is_some());
    assert!(status.user_operation_hash.is_some());

    assert_eq!(
        error_code(
            RelayerApiClient::get_transaction_status(&node.client, TransactionId::default()).await
        ),
        NOT_FOUND
    );

    node.handle.stop().unwrap();
}

#[tokio::test]
async fn credential_namespace() {
    let node = start_node().await;
    node.add_wallet(issuer());

    let issued = CredentialApiClient::issue(&node.client, draft()).await.unwrap();
    assert_eq!(issued.status, VerificationStatus::PendingBlockchain);

    assert_eq!(
        error_code(
            CredentialApiClient::verify(&node.client, issuer(), issued.credential_id, None).await
        ),
        CONFLICT
    );

    node.tick().await;
    let credential =
        CredentialApiClient::await_issuance(&node.client, issued.credential_id).await.unwrap();
    assert_eq!(credential.verification_status, VerificationStatus::Issued);
    assert!(credential.on_chain_id.is_some());

    assert_eq!(
        error_code(
            CredentialApiClient::verify(&node.client, outsider(), issued.credential_id, None).await
        ),
        UNAUTHORIZED
    );

    let revoking = CredentialApiClient::revoke(
        &node.client,
        issuer(),
        issued.credential_id,
        "superseded".into(),
    )
    .await
    .unwrap();
    assert_eq!(revoking.status, VerificationStatus::Issued);
    node.tick().await;

    let credential = CredentialApiClient::get(&node.client, issued.credential_id).await.unwrap();
    assert_eq!(credential.verification_status, VerificationStatus::Revoked);
    assert_eq!(credential.reason.as_deref(), Some("superseded"));

    assert_eq!(error_code(CredentialApiClient::get(&node.client, 404).await), NOT_FOUND);

    node.handle.stop().unwrap();
}

#[tokio::test]
async fn misconfigured_node_rejects_writes() {
    let (client, handle) = start_misconfigured_node().await;

    assert_eq!(
        error_code(RelayerApiClient::queue_transaction(&client, call(issuer())).await),
        CONFIG
    );
    assert_eq!(error_code(CredentialApiClient::issue(&client, draft()).await), CONFIG);
    // reads are still served
    assert_eq!(error_code(CredentialApiClient::get(&client, 1).await), NOT_FOUND);
    assert_eq!(
        error_code(
            RelayerApiClient::get_transaction_status(&client, TransactionId::default()).await
        ),
        NOT_FOUND
    );

    handle.stop().unwrap();
}
