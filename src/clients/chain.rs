//! Chain Access
//!
//! Minimal blockchain surface the workflow core needs: address validation
//! before accepting a destination, and broadcast of an outbound withdrawal.
//! Deposit detection and confirmation counting live in an external watcher
//! that feeds the engine through `resume`.

use async_trait::async_trait;

use super::ClientError;

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Validate an address format for this chain
    fn validate_address(&self, address: &str) -> bool;

    /// Broadcast a withdrawal transaction, returning the tx hash.
    ///
    /// Must be idempotent per `token`: a re-broadcast after a partial
    /// failure returns the original tx hash instead of double-spending.
    async fn broadcast_withdrawal(
        &self,
        token: &str,
        to: &str,
        amount: &str,
    ) -> Result<String, ClientError>;
}
