use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::events;
use crate::Result;

/// Keeps an event stream open until `token` is cancelled.
///
/// A failed session is logged and retried after `cooldown`; a session that
/// simply ended is reopened right away. Fatal errors end the loop.
pub async fn listen(ctx: Arc<Context>, cooldown: Duration, token: CancellationToken) -> Result<()> {
    tracing::info!("Starting event listener");
    while !token.is_cancelled() {
        match events::consume(&ctx, &token).await {
            Ok(()) => {}
            Err(err) if err.is_fatal() => {
                tracing::error!("Event listener failed: {err}");
                return Err(err);
            }
            Err(err) => {
                tracing::error!("Event stream failed: {err}. Reconnecting in {cooldown:?}");
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(cooldown) => {}
                }
            }
        }
    }
    tracing::info!("Event listener stopped");
    Ok(())
}

/// Runs [`listen`] as a background task and restarts it whenever it exits
/// before shutdown, panics included.
pub struct Supervisor {
    ctx: Arc<Context>,
    poll: Duration,
    cooldown: Duration,
}

impl Supervisor {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self {
            poll: ctx.config.supervisor_poll(),
            cooldown: ctx.config.event_listener_cooldown(),
            ctx,
        }
    }

    pub fn poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    fn spawn(&self, token: &CancellationToken) -> JoinHandle<Result<()>> {
        tokio::spawn(listen(self.ctx.clone(), self.cooldown, token.clone()))
    }

    pub async fn run(self, token: CancellationToken) -> Result<()> {
        let mut listener = self.spawn(&token);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.poll) => {}
            }
            if !listener.is_finished() {
                continue;
            }
            match (&mut listener).await {
                Ok(Ok(())) => tracing::warn!("Event listener exited. Restarting"),
                Ok(Err(err)) if err.is_fatal() => return Err(err),
                Ok(Err(err)) => tracing::error!("Event listener failed: {err}. Restarting"),
                Err(err) => tracing::error!("Event listener panicked: {err}. Restarting"),
            }
            if token.is_cancelled() {
                return Ok(());
            }
            listener = self.spawn(&token);
        }
        tracing::debug!("Waiting for the event listener to stop");
        listener.await?
    }
}
