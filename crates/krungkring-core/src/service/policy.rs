//! How a two-remote write is judged once both calls have settled.

use std::fmt;

use tracing::warn;

use crate::api::StoreError;

/// Write operations the data service fans out to both remotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    AddProduct,
    UpdateProduct,
    DeleteProduct,
    SaveProducts,
    AddCategory,
    DeleteCategory,
    RenameCategory,
}

impl WriteOp {
    pub const fn policy(self) -> WritePolicy {
        match self {
            WriteOp::AddProduct
            | WriteOp::AddCategory
            | WriteOp::DeleteCategory
            | WriteOp::RenameCategory => WritePolicy::AnyRemote,
            WriteOp::UpdateProduct => WritePolicy::AuthoritativeSecondary,
            WriteOp::DeleteProduct | WriteOp::SaveProducts => WritePolicy::BestEffort,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            WriteOp::AddProduct => "add_product",
            WriteOp::UpdateProduct => "update_product",
            WriteOp::DeleteProduct => "delete_product",
            WriteOp::SaveProducts => "save_products",
            WriteOp::AddCategory => "add_category",
            WriteOp::DeleteCategory => "delete_category",
            WriteOp::RenameCategory => "rename_category",
        }
    }
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// One remote success is enough; the secondary's result wins when both
    /// succeed. With both down the write is done locally instead.
    AnyRemote,
    /// The secondary must succeed. The primary and the local store are
    /// best-effort.
    AuthoritativeSecondary,
    /// Remote failures are logged and the local store is always written.
    BestEffort,
}

/// What the service does after a fan-out.
#[derive(Debug)]
pub enum Settled<T> {
    /// A remote accepted the write. Mirror it locally and return this value.
    Remote(T),
    /// Write through to the local store and answer from it.
    Local,
    /// The authoritative remote rejected the write.
    Failed(StoreError),
}

/// Outcome of one write sent to both remotes.
#[derive(Debug)]
pub struct FanOut<T> {
    pub secondary: Result<T, StoreError>,
    pub primary: Result<T, StoreError>,
}

impl<T> FanOut<T> {
    pub fn new(secondary: Result<T, StoreError>, primary: Result<T, StoreError>) -> Self {
        Self { secondary, primary }
    }

    pub fn any_succeeded(&self) -> bool {
        self.secondary.is_ok() || self.primary.is_ok()
    }

    pub fn log_failures(&self, op: WriteOp) {
        if let Err(ref e) = self.secondary {
            warn!(%op, store = "secondary", error = %e, "Remote write failed");
        }
        if let Err(ref e) = self.primary {
            warn!(%op, store = "primary", error = %e, "Remote write failed");
        }
    }

    pub fn settle(self, policy: WritePolicy) -> Settled<T> {
        match policy {
            WritePolicy::AnyRemote => match (self.secondary, self.primary) {
                (Ok(value), _) | (Err(_), Ok(value)) => Settled::Remote(value),
                (Err(_), Err(_)) => Settled::Local,
            },
            WritePolicy::AuthoritativeSecondary => match self.secondary {
                Ok(value) => Settled::Remote(value),
                Err(e) => Settled::Failed(e),
            },
            WritePolicy::BestEffort => Settled::Local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn down() -> StoreError {
        StoreError::ServerError("down".to_string())
    }

    #[test]
    fn test_policy_table() {
        assert_eq!(WriteOp::AddProduct.policy(), WritePolicy::AnyRemote);
        assert_eq!(WriteOp::RenameCategory.policy(), WritePolicy::AnyRemote);
        assert_eq!(WriteOp::UpdateProduct.policy(), WritePolicy::AuthoritativeSecondary);
        assert_eq!(WriteOp::SaveProducts.policy(), WritePolicy::BestEffort);
        assert_eq!(WriteOp::DeleteProduct.to_string(), "delete_product");
    }

    #[test]
    fn test_any_remote_prefers_secondary() {
        let settled = FanOut::new(Ok("secondary"), Ok("primary")).settle(WritePolicy::AnyRemote);
        assert!(matches!(settled, Settled::Remote("secondary")));

        let settled = FanOut::new(Err(down()), Ok("primary")).settle(WritePolicy::AnyRemote);
        assert!(matches!(settled, Settled::Remote("primary")));

        let outcome: FanOut<()> = FanOut::new(Err(down()), Err(down()));
        assert!(!outcome.any_succeeded());
        assert!(matches!(outcome.settle(WritePolicy::AnyRemote), Settled::Local));
    }

    #[test]
    fn test_authoritative_ignores_primary() {
        let settled = FanOut::new(Err(down()), Ok(())).settle(WritePolicy::AuthoritativeSecondary);
        assert!(matches!(settled, Settled::Failed(StoreError::ServerError(_))));

        let settled = FanOut::new(Ok(()), Err(down())).settle(WritePolicy::AuthoritativeSecondary);
        assert!(matches!(settled, Settled::Remote(())));
    }

    #[test]
    fn test_best_effort_always_local() {
        let settled = FanOut::new(Ok(()), Ok(())).settle(WritePolicy::BestEffort);
        assert!(matches!(settled, Settled::Local));
    }
}
