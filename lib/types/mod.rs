mod block;
mod blockchain;
mod mempool;
mod transaction;
mod utxo;

pub use block::{has_leading_zeros, Block, GENESIS_PREV_HASH};
pub use blockchain::{proof_of_work, Chain};
pub use mempool::Mempool;
pub use transaction::Transaction;
pub use utxo::{UtxoEntry, UtxoRef, UtxoSet, UtxoStats};
