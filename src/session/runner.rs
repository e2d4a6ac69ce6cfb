//! Real-time event loop around a [`SessionController`].
//!
//! The runner owns the controller and is the only code that touches it.
//! Commands arrive on an mpsc channel, snapshots leave on a watch channel,
//! and the controller's virtual clock is kept in step with tokio's clock.
//! Device acquisition runs in its own task and reports back with the start
//! ticket it was issued, so a grant that arrives after a stop is released
//! by the controller rather than applied.

use crate::audio::source::{AudioSource, CaptureBackend};
use crate::audio::tone::TonePlayer;
use crate::error::{DbucksError, Result};
use crate::session::controller::{SessionController, SessionSnapshot, StartTicket};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Commands accepted by a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerCommand {
    Start,
    Stop,
    PlayTone {
        frequency: Option<f64>,
        duration: Option<f64>,
    },
    /// Stop any session and end the loop.
    Shutdown,
}

/// Client side of a [`SessionRunner`].
#[derive(Clone)]
pub struct RunnerHandle {
    commands: mpsc::Sender<RunnerCommand>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl RunnerHandle {
    pub async fn send(&self, command: RunnerCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| DbucksError::Other("Session runner has shut down".to_string()))
    }

    pub async fn start(&self) -> Result<()> {
        self.send(RunnerCommand::Start).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(RunnerCommand::Stop).await
    }

    pub async fn play_tone(&self, frequency: Option<f64>, duration: Option<f64>) -> Result<()> {
        self.send(RunnerCommand::PlayTone {
            frequency,
            duration,
        })
        .await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(RunnerCommand::Shutdown).await
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }
}

type Grant = (StartTicket, Result<Box<dyn AudioSource>>);

const COMMAND_BUFFER: usize = 16;

pub struct SessionRunner {
    controller: SessionController,
    backend: Arc<dyn CaptureBackend>,
    player: Arc<dyn TonePlayer>,
    commands: mpsc::Receiver<RunnerCommand>,
    snapshots: watch::Sender<SessionSnapshot>,
    grants_tx: mpsc::UnboundedSender<Grant>,
    grants_rx: mpsc::UnboundedReceiver<Grant>,
}

impl SessionRunner {
    pub fn new(
        controller: SessionController,
        backend: Arc<dyn CaptureBackend>,
        player: Arc<dyn TonePlayer>,
    ) -> (Self, RunnerHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(controller.snapshot());
        let (grants_tx, grants_rx) = mpsc::unbounded_channel();

        let runner = Self {
            controller,
            backend,
            player,
            commands: command_rx,
            snapshots: snapshot_tx,
            grants_tx,
            grants_rx,
        };
        let handle = RunnerHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        };
        (runner, handle)
    }

    /// Run until `Shutdown` or until every handle is dropped.
    ///
    /// Any active session is stopped before returning, and the controller
    /// is handed back.
    pub async fn run(mut self) -> SessionController {
        let epoch = Instant::now() - self.controller.now();

        loop {
            let deadline = self.controller.next_deadline().map(|d| epoch + d);

            tokio::select! {
                command = self.commands.recv() => {
                    self.catch_up(epoch);
                    match command {
                        None | Some(RunnerCommand::Shutdown) => break,
                        Some(command) => self.handle(command),
                    }
                    self.publish();
                }
                Some((ticket, result)) = self.grants_rx.recv() => {
                    self.catch_up(epoch);
                    self.controller.complete_start(ticket, result);
                    self.publish();
                }
                _ = sleep_until_deadline(deadline) => {
                    self.catch_up(epoch);
                }
            }
        }

        self.controller.stop();
        self.publish();
        self.controller
    }

    fn handle(&mut self, command: RunnerCommand) {
        match command {
            RunnerCommand::Start => {
                let ticket = self.controller.begin_start();
                let backend = Arc::clone(&self.backend);
                let grants = self.grants_tx.clone();
                tokio::spawn(async move {
                    let result = backend.acquire().await;
                    if let Err(mpsc::error::SendError((_, Ok(mut source)))) =
                        grants.send((ticket, result))
                        && let Err(e) = source.stop()
                    {
                        eprintln!("Failed to release capture device: {}", e);
                    }
                });
            }
            RunnerCommand::Stop | RunnerCommand::Shutdown => self.controller.stop(),
            RunnerCommand::PlayTone {
                frequency,
                duration,
            } => {
                self.controller
                    .play_tone(self.player.as_ref(), frequency, duration);
            }
        }
    }

    /// Fire every timer due by now, publishing after each one.
    fn catch_up(&mut self, epoch: Instant) {
        let now = epoch.elapsed();
        while self.controller.fire_next(now).is_some() {
            self.publish();
        }
        self.controller.advance_to(now);
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.controller.snapshot());
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Wait until a snapshot satisfies `predicate` or `timeout` passes.
pub async fn wait_for_snapshot(
    snapshots: &mut watch::Receiver<SessionSnapshot>,
    timeout: Duration,
    predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> Option<SessionSnapshot> {
    match tokio::time::timeout(timeout, snapshots.wait_for(predicate)).await {
        Ok(Ok(snapshot)) => Some(snapshot.clone()),
        _ => None,
    }
}
