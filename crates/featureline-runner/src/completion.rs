//! Completion handle for in-process runners.

use async_trait::async_trait;
use std::future::Future;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use featureline_core::spawner::Completion;
use featureline_core::{Error, Result};

/// A completion backed by a spawned tokio task. Waiting joins the task;
/// cancelling aborts it, which waiters observe as a failure.
pub struct TaskCompletion {
    handle: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl TaskCompletion {
    pub fn spawn<F>(work: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            handle: Mutex::new(Some(tokio::spawn(work))),
        }
    }
}

#[async_trait]
impl Completion for TaskCompletion {
    async fn wait(&self) -> Result<()> {
        let handle = self.handle.lock().await.take();
        match handle {
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(err) if err.is_cancelled() => {
                    Err(Error::RunnerFailure("runner cancelled".to_string()))
                }
                Err(err) => Err(Error::RunnerFailure(format!("runner panicked: {err}"))),
            },
            // already waited; terminal state does not change
            None => Ok(()),
        }
    }

    async fn cancel(&self) -> Result<()> {
        if let Some(handle) = self.handle.lock().await.as_ref() {
            handle.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_task_result() {
        let ok = TaskCompletion::spawn(async { Ok(()) });
        assert!(ok.wait().await.is_ok());

        let failed =
            TaskCompletion::spawn(async { Err(Error::RunnerFailure("boom".to_string())) });
        let err = failed.wait().await.unwrap_err();
        assert!(matches!(err, Error::RunnerFailure(_)));
    }

    #[tokio::test]
    async fn test_cancel_fails_waiters() {
        let completion = TaskCompletion::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        completion.cancel().await.unwrap();
        let err = completion.wait().await.unwrap_err();
        assert!(matches!(err, Error::RunnerFailure(_)));
    }
}
