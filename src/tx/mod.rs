//! Transaction management.
//!
//! Every store operation runs as one unit of work: reads in `ReadOnly`
//! mode, writes in `ReadWrite`. Backends reject writes issued on a
//! read-only transaction.

use serde::{Deserialize, Serialize};

/// Transaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxMode {
    ReadOnly,
    ReadWrite,
}

impl TxMode {
    pub fn allows_writes(self) -> bool {
        matches!(self, TxMode::ReadWrite)
    }
}

/// Opaque transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Transaction trait that all backends must implement.
pub trait Transaction: Send + Sync {
    fn mode(&self) -> TxMode;
    fn id(&self) -> TxId;

    /// Fail unless this transaction may write.
    fn ensure_writable(&self) -> crate::Result<()> {
        if self.mode().allows_writes() {
            Ok(())
        } else {
            Err(crate::Error::Transaction(format!("{} is read-only", self.id())))
        }
    }
}

/// Run `$body` inside a transaction on `$backend`: commit on `Ok`, roll
/// back on `Err`. `$body` sees the open transaction as `$tx`.
macro_rules! in_tx {
    ($backend:expr, $mode:expr, |$tx:ident| $body:expr) => {{
        let backend = $backend;
        #[allow(unused_mut)]
        let mut $tx = backend.begin_tx($mode).await?;
        match $body {
            Ok(value) => {
                backend.commit_tx($tx).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = backend.rollback_tx($tx).await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }};
}

pub(crate) use in_tx;
