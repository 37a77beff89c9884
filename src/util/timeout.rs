//! Cancellation helper.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::ChatError;

/// Run `future` until it finishes or `token` is cancelled.
pub async fn with_cancellation<T>(
    token: &CancellationToken,
    future: impl Future<Output = Result<T, ChatError>>,
) -> Result<T, ChatError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ChatError::Cancelled),
        result = future => result,
    }
}
