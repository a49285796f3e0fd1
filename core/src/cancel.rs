//! The shared cancellation signal observed by every transport call and by
//! the transfer coordinator's target loops.

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct AbortHandle {
    token: CancellationToken,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn trip(&self) {
        self.token.cancel();
    }

    pub fn is_tripped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn tripped(&self) {
        self.token.cancelled().await;
    }

    /// Races `fut` against cancellation; `Err(())` means the token tripped
    /// first and should be treated as equivalent to a timeout.
    pub async fn guard<F, T>(&self, fut: F) -> Result<T, ()>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::select! {
            result = fut => Ok(result),
            _ = self.token.cancelled() => Err(()),
        }
    }
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guard_returns_err_when_tripped_first() {
        let handle = AbortHandle::new();
        handle.trip();
        let result = handle
            .guard(tokio::time::sleep(std::time::Duration::from_secs(10)))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn guard_returns_ok_when_not_tripped() {
        let handle = AbortHandle::new();
        let result = handle.guard(async { 42 }).await;
        assert_eq!(result, Ok(42));
    }
}
