use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Malformed data: {reason}")]
    Malformed { reason: String },
    #[error("Invalid signature: signature verification failed")]
    InvalidSignature,
    #[error("Invalid signer: wallet address does not match the transaction sender")]
    InvalidSigner,
    #[error("Insufficient balance: need {needed}, available {available}")]
    InsufficientBalance { needed: u64, available: u64 },
    #[error("Duplicate transaction: {txid}")]
    DuplicateTx { txid: String },
    #[error("Mempool is full")]
    MempoolFull,
    #[error("Previous hash does not match the chain tip")]
    BadPrevHash,
    #[error("Invalid proof of work: {reason}")]
    BadProofOfWork { reason: String },
    #[error("Block exceeds the maximum block size")]
    BlockTooLarge,
    #[error("Invalid transaction bundle: {reason}")]
    InvalidTxBundle { reason: String },
    #[error("Unknown block index: {index}")]
    UnknownBlockIndex { index: u64 },
    #[error("Local chain is behind the network")]
    ChainBehind,
    #[error("Peer unreachable: {peer}")]
    PeerUnreachable { peer: String },
}

// Convenience methods for creating errors
impl ChainError {
    pub fn malformed<S: Into<String>>(reason: S) -> Self {
        ChainError::Malformed {
            reason: reason.into(),
        }
    }

    pub fn bad_proof_of_work<S: Into<String>>(reason: S) -> Self {
        ChainError::BadProofOfWork {
            reason: reason.into(),
        }
    }

    pub fn invalid_bundle<S: Into<String>>(reason: S) -> Self {
        ChainError::InvalidTxBundle {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
