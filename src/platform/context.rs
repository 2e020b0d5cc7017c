//! Main execution context.
//!
//! Game state may only be touched from one designated context owned by the
//! host. Network tasks hand work over through a [`MainContext`] and the
//! host drains it with the single [`MainContextRunner`].

use std::time::Duration;

use snafu::prelude::*;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use super::GamePlatform;

type Job = Box<dyn FnOnce(&mut dyn GamePlatform) + Send>;

/// Error when hand work over to the main context
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum ContextError {
    /// the runner was dropped, no more jobs will execute
    #[snafu(display("main execution context is gone"))]
    Closed,

    /// the job was dropped before it produced a result
    #[snafu(display("main execution context dropped the job"))]
    Dropped,
}

/// Submit side of the main execution context.
#[derive(Debug, Clone)]
pub struct MainContext {
    tx: mpsc::UnboundedSender<Job>,
}

/// Consume side of the main execution context, exactly one per context.
#[derive(Debug)]
pub struct MainContextRunner {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl MainContext {
    /// Create a context and its runner.
    pub fn channel() -> (Self, MainContextRunner) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, MainContextRunner { rx })
    }

    /// Queue a job, it runs the next time the runner drains.
    pub fn submit<F>(&self, job: F) -> Result<(), ContextError>
    where
        F: FnOnce(&mut dyn GamePlatform) + Send + 'static,
    {
        self.tx
            .send(Box::new(job))
            .map_err(|_| error::Closed.build())
    }

    /// Queue a job and wait for its result.
    pub async fn run<F, T>(&self, job: F) -> Result<T, ContextError>
    where
        F: FnOnce(&mut dyn GamePlatform) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();

        self.submit(move |platform| {
            // receiver gone means the requester stopped caring
            let _ = result_tx.send(job(platform));
        })?;

        result_rx.await.map_err(|_| error::Dropped.build())
    }

    /// Queue a job after `delay`.
    ///
    /// The timer runs on the async runtime, the job itself still runs on
    /// the main context. Aborting the returned handle cancels it.
    pub fn submit_after<F>(&self, delay: Duration, job: F) -> JoinHandle<()>
    where
        F: FnOnce(&mut dyn GamePlatform) + Send + 'static,
    {
        let context = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = context.submit(job) {
                log::warn!("Delayed job lost: {}", err);
            }
        })
    }
}

impl MainContextRunner {
    /// Run every queued job, returns how many ran.
    ///
    /// For hosts that own a tick loop: call once per tick.
    pub fn run_pending(&mut self, platform: &mut dyn GamePlatform) -> usize {
        let mut count = 0;
        while let Ok(job) = self.rx.try_recv() {
            job(&mut *platform);
            count += 1;
        }
        count
    }

    /// Run jobs as they arrive until every [`MainContext`] is dropped.
    pub async fn run<P: GamePlatform>(mut self, mut platform: P) {
        log::debug!("Main context runner start");

        while let Some(job) = self.rx.recv().await {
            job(&mut platform);
        }

        log::debug!("Main context runner stop, all submitters dropped");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::platform::{MemoryPlatform, PlatformAction};

    #[tokio::test]
    async fn test_run_returns_job_result() {
        let (context, runner) = MainContext::channel();
        tokio::spawn(runner.run(MemoryPlatform::new()));

        let players = context.run(|p| p.online_players().len()).await.unwrap();
        assert_eq!(players, 0);
    }

    #[test]
    fn test_run_pending_is_fifo() {
        let (context, mut runner) = MainContext::channel();
        let mut platform = MemoryPlatform::new();
        let journal = platform.journal();

        context.submit(|p| p.broadcast("one")).unwrap();
        context.submit(|p| p.broadcast("two")).unwrap();

        assert!(journal.actions().is_empty());
        assert_eq!(runner.run_pending(&mut platform), 2);
        assert_eq!(
            journal.actions(),
            vec![
                PlatformAction::Broadcast("one".to_string()),
                PlatformAction::Broadcast("two".to_string()),
            ]
        );
        assert_eq!(runner.run_pending(&mut platform), 0);
    }

    #[tokio::test]
    async fn test_submit_after_runner_dropped() {
        let (context, runner) = MainContext::channel();
        drop(runner);

        assert!(matches!(
            context.submit(|p| p.terminate()),
            Err(ContextError::Closed)
        ));
        assert!(matches!(
            context.run(|p| p.online_players()).await,
            Err(ContextError::Closed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_after_waits() {
        let (context, mut runner) = MainContext::channel();
        let mut platform = MemoryPlatform::new();

        context.submit_after(Duration::from_secs(30), |p| p.terminate());

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(runner.run_pending(&mut platform), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runner.run_pending(&mut platform), 1);
        assert!(platform.journal().actions().contains(&PlatformAction::Terminate));
    }
}
