//! The relayer key

use crate::{config::KeySource, error::SigningError};
use credence_primitives::UserOperationHash;
use ethers::{
    middleware::SignerMiddleware,
    prelude::{k256::ecdsa::SigningKey, rand},
    providers::Middleware,
    signers::{coins_bip39::English, LocalWallet, MnemonicBuilder, Signer},
    types::{Address, Bytes},
};
use expanded_pathbuf::ExpandedPathBuf;
use std::{fmt, fs};

const DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

/// Holder of the single relayer key
///
/// The key is used both to sign user operation hashes (the relayer is the owner of every smart
/// account it provisions) and to sign the outer `handleOps` transactions.
#[derive(Clone)]
pub struct RelayerSigner {
    wallet: ethers::signers::Wallet<SigningKey>,
}

impl fmt::Debug for RelayerSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayerSigner").field("address", &self.wallet.address()).finish()
    }
}

impl RelayerSigner {
    /// Builds the signer from a hex encoded private key
    pub fn from_private_key(key: &str, chain_id: u64) -> Result<Self, SigningError> {
        let wallet = key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|err| SigningError::InvalidKey(err.to_string()))?;
        Ok(Self { wallet: wallet.with_chain_id(chain_id) })
    }

    pub fn from_source(source: &KeySource, chain_id: u64) -> Result<Self, SigningError> {
        match source {
            KeySource::PrivateKey(key) => Self::from_private_key(key, chain_id),
            KeySource::MnemonicFile(path) => {
                Self::from_file(ExpandedPathBuf(path.clone()), chain_id)
            }
        }
    }

    /// Builds the signer from the file containing the mnemonic phrase
    pub fn from_file(path: ExpandedPathBuf, chain_id: u64) -> Result<Self, SigningError> {
        let wallet = MnemonicBuilder::<English>::default()
            .phrase(path.to_path_buf())
            .derivation_path(DERIVATION_PATH)?
            .build()?;
        Ok(Self { wallet: wallet.with_chain_id(chain_id) })
    }

    /// Generates a new mnemonic, writing it into the `path` directory
    pub fn build_random(path: ExpandedPathBuf, chain_id: u64) -> Result<Self, SigningError> {
        let mut rng = rand::thread_rng();

        fs::create_dir_all(&path)?;

        let wallet = MnemonicBuilder::<English>::default()
            .write_to(path.to_path_buf())
            .derivation_path(DERIVATION_PATH)?
            .build_random(&mut rng)?;
        Ok(Self { wallet: wallet.with_chain_id(chain_id) })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.wallet.chain_id()
    }

    /// Signs the user operation hash (EIP-191 personal message over the 32 hash bytes)
    pub async fn sign(&self, hash: &UserOperationHash) -> Result<Bytes, SigningError> {
        let sig = self.wallet.sign_message(hash.as_fixed_bytes()).await?;
        Ok(sig.to_vec().into())
    }

    /// Middleware signing outgoing transactions with the relayer key
    pub fn middleware<M: Middleware>(
        &self,
        inner: M,
    ) -> SignerMiddleware<M, ethers::signers::Wallet<SigningKey>> {
        SignerMiddleware::new(inner, self.wallet.clone())
    }
}
