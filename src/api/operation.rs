//! Waiting on long-running operations.

use serde_json::Value;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::PollPolicy;
use crate::error::{OperationError, Result};

use super::transport::{Operation, Transport};

/// Polls an operation until it finishes, fails, times out or is cancelled.
pub struct OperationWaiter<'a> {
    transport: &'a dyn Transport,
    policy: &'a PollPolicy,
    cancel: CancellationToken,
}

impl<'a> OperationWaiter<'a> {
    /// Creates a waiter that is never cancelled.
    #[must_use]
    pub fn new(transport: &'a dyn Transport, policy: &'a PollPolicy) -> Self {
        Self {
            transport,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Interrupts polls and sleeps when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Waits for `operation` to finish.
    ///
    /// Returns the operation's response payload, if any.
    ///
    /// # Errors
    ///
    /// - [`OperationError::Failed`] if the operation finished with an error
    /// - [`OperationError::Timeout`] if the poll timeout elapsed
    /// - [`OperationError::Cancelled`] if the token was cancelled
    /// - any transport error raised while polling
    pub async fn wait(&self, operation: Operation) -> Result<Option<Value>> {
        let name = operation.name.clone();
        let started = Instant::now();

        match tokio::time::timeout(self.policy.timeout(), self.poll_until_done(operation)).await {
            Ok(result) => result,
            Err(_) => Err(OperationError::Timeout {
                operation: name,
                elapsed_secs: started.elapsed().as_secs(),
            }
            .into()),
        }
    }

    async fn poll_until_done(&self, mut operation: Operation) -> Result<Option<Value>> {
        let mut poll = 0u32;

        loop {
            if operation.done {
                debug!("Operation {} finished after {poll} poll(s)", operation.name);
                return finish(operation);
            }

            let delay = self.policy.interval(poll);
            trace!("Operation {} pending, next poll in {delay:?}", operation.name);

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(cancelled(&operation)),
                () = tokio::time::sleep(delay) => {}
            }

            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(cancelled(&operation)),
                result = self.transport.poll_operation(&operation) => result?,
            };
            operation = next;
            poll += 1;
        }
    }
}

fn finish(operation: Operation) -> Result<Option<Value>> {
    match operation.error {
        Some(status) => Err(OperationError::Failed {
            operation: operation.name,
            code: status.code,
            message: status.message,
        }
        .into()),
        None => Ok(operation.response),
    }
}

fn cancelled(operation: &Operation) -> crate::error::MultiCloudError {
    OperationError::Cancelled {
        operation: operation.name.clone(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::{MockTransport, OperationStatus};
    use crate::error::MultiCloudError;
    use serde_json::json;

    #[tokio::test]
    async fn test_done_operation_returns_response() {
        let mut mock = MockTransport::new();
        mock.expect_poll_operation().never();
        let policy = PollPolicy::fast();

        let waiter = OperationWaiter::new(&mock, &policy);
        let response = waiter
            .wait(Operation::completed("op-1", Some(json!({"name": "c"}))))
            .await
            .expect("wait");
        assert_eq!(response, Some(json!({"name": "c"})));
    }

    #[tokio::test]
    async fn test_polls_until_done() {
        let mut mock = MockTransport::new();
        let mut polls = 0;
        mock.expect_poll_operation().times(3).returning(move |op| {
            polls += 1;
            Ok(if polls == 3 {
                Operation::completed(op.name.clone(), None)
            } else {
                Operation::pending(op.name.clone())
            })
        });
        let policy = PollPolicy::fast();

        let response = OperationWaiter::new(&mock, &policy)
            .wait(Operation::pending("op-2"))
            .await
            .expect("wait");
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_remote_failure_is_verbatim() {
        let mock = MockTransport::new();
        let policy = PollPolicy::fast();
        let failed = Operation {
            error: Some(OperationStatus {
                code: 9,
                message: "subnet in use".to_string(),
            }),
            ..Operation::completed("op-3", None)
        };

        let err = OperationWaiter::new(&mock, &policy)
            .wait(failed)
            .await
            .expect_err("failed");
        match err {
            MultiCloudError::Operation(OperationError::Failed { code, message, .. }) => {
                assert_eq!(code, 9);
                assert_eq!(message, "subnet in use");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_distinct() {
        let mut mock = MockTransport::new();
        mock.expect_poll_operation()
            .returning(|op| Ok(Operation::pending(op.name.clone())));
        let policy = PollPolicy {
            timeout_secs: 1,
            ..PollPolicy::fast()
        };

        let err = OperationWaiter::new(&mock, &policy)
            .wait(Operation::pending("op-4"))
            .await
            .expect_err("timeout");
        assert!(matches!(
            err,
            MultiCloudError::Operation(OperationError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let mut mock = MockTransport::new();
        mock.expect_poll_operation().never();
        let policy = PollPolicy::fast();
        let token = CancellationToken::new();
        token.cancel();

        let err = OperationWaiter::new(&mock, &policy)
            .with_cancellation(token)
            .wait(Operation::pending("op-5"))
            .await
            .expect_err("cancelled");
        assert!(matches!(
            err,
            MultiCloudError::Operation(OperationError::Cancelled { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancellation_while_polling() {
        let mut mock = MockTransport::new();
        mock.expect_poll_operation()
            .returning(|op| Ok(Operation::pending(op.name.clone())));
        let policy = PollPolicy {
            timeout_secs: 30,
            ..PollPolicy::fast()
        };
        let token = CancellationToken::new();
        let waiter = OperationWaiter::new(&mock, &policy).with_cancellation(token.clone());

        let cancel_later = async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            token.cancel();
        };
        let (result, ()) = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            async { tokio::join!(waiter.wait(Operation::pending("op-6")), cancel_later) },
        )
        .await
        .expect("wait stops promptly after cancellation");

        let err = result.expect_err("cancelled");
        assert!(matches!(
            err,
            MultiCloudError::Operation(OperationError::Cancelled { .. })
        ));
    }
}
