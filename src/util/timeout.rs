//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::ColloquyError;

/// Bound a fallible future. `None` waits indefinitely.
pub async fn with_timeout<T>(
    limit: Option<Duration>,
    future: impl Future<Output = Result<T, ColloquyError>>,
) -> Result<T, ColloquyError> {
    let Some(limit) = limit else {
        return future.await;
    };
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(ColloquyError::Timeout(
            u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expiry_maps_to_timeout_error() {
        let result: Result<(), _> = with_timeout(Some(Duration::from_millis(50)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(ColloquyError::Timeout(50))));
    }

    #[tokio::test]
    async fn no_limit_passes_result_through() {
        let result = with_timeout(None, async { Ok::<_, ColloquyError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
