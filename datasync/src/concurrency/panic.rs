use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::sync_error;

/// Polls `future` to completion, turning a panic raised while polling it into a
/// [`ErrorKind::SliceTaskPanic`] error.
pub async fn catch_panic<F: Future>(future: F) -> SyncResult<F::Output> {
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|payload| panic_error(payload.as_ref()))
}

/// Like [`catch_panic`] for a fallible step, folding the panic into the step's own error.
pub async fn catch_panic_result<T, F>(step: F) -> SyncResult<T>
where
    F: Future<Output = SyncResult<T>>,
{
    catch_panic(step).await.and_then(|result| result)
}

/// Runs the synchronous `f`, turning a panic into a [`ErrorKind::SliceTaskPanic`] error.
pub fn catch_panic_sync<T>(f: impl FnOnce() -> T) -> SyncResult<T> {
    std::panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_error(payload.as_ref()))
}

fn panic_error(payload: &(dyn Any + Send)) -> SyncError {
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic payload is not a string".to_string()
    };

    sync_error!(ErrorKind::SliceTaskPanic, "A slice task panicked", message)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn explode() -> u64 {
        panic!("reader exploded")
    }

    #[tokio::test]
    async fn a_panicking_future_becomes_an_error() {
        let err = catch_panic(explode()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SliceTaskPanic);
        assert_eq!(err.detail(), Some("reader exploded"));
    }

    #[tokio::test]
    async fn step_errors_pass_through_unchanged() {
        let ok = catch_panic_result(async { Ok::<_, SyncError>(7) }).await.unwrap();
        assert_eq!(ok, 7);

        let err = catch_panic_result(async {
            Err::<(), _>(sync_error!(ErrorKind::IoError, "Connection reset"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoError);
    }

    #[test]
    fn formatted_panic_messages_are_kept() {
        let slice = 3;
        let err = catch_panic_sync(|| -> u32 { panic!("factory failed for slice {slice}") })
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SliceTaskPanic);
        assert_eq!(err.detail(), Some("factory failed for slice 3"));
    }
}
