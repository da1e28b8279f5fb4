//! Single-task owner of the ride state.
//!
//! Sensor events, the one-second duration tick and user commands are all
//! serialized through one select loop, so the filter and the session are
//! never touched concurrently.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Interval, MissedTickBehavior};

use crate::error::{RideError, RideResult};
use crate::geocode::ReverseGeocoder;
use crate::live_status::LiveReadout;
use crate::sensors::{SensorEvent, SubscriptionSet};
use crate::session::{RideSessionController, RouteRecord};

const COMMAND_QUEUE: usize = 8;

pub enum TrackerCommand {
    Start(oneshot::Sender<RideResult<()>>),
    Stop(oneshot::Sender<RideResult<RouteRecord>>),
    Calibrate(oneshot::Sender<()>),
}

/// Cloneable front end to a running tracker task
#[derive(Clone)]
pub struct TrackerHandle {
    commands: mpsc::Sender<TrackerCommand>,
    readout: watch::Receiver<LiveReadout>,
}

impl TrackerHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> TrackerCommand,
    ) -> RideResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| RideError::TrackerClosed)?;
        rx.await.map_err(|_| RideError::TrackerClosed)
    }

    pub async fn start(&self) -> RideResult<()> {
        self.request(TrackerCommand::Start).await?
    }

    pub async fn stop(&self) -> RideResult<RouteRecord> {
        self.request(TrackerCommand::Stop).await?
    }

    pub async fn calibrate(&self) -> RideResult<()> {
        self.request(TrackerCommand::Calibrate).await
    }

    /// Latest published readout
    pub fn readout(&self) -> LiveReadout {
        self.readout.borrow().clone()
    }
}

pub struct RideTracker<G> {
    controller: RideSessionController,
    geocoder: G,
    readout_tx: watch::Sender<LiveReadout>,
}

/// Spawn the tracker task.
///
/// The task owns `subscriptions` and releases them when it ends, which
/// happens once every [`TrackerHandle`] is dropped.
pub fn spawn_tracker<G>(
    controller: RideSessionController,
    geocoder: G,
    events: mpsc::Receiver<SensorEvent>,
    subscriptions: SubscriptionSet,
) -> (TrackerHandle, JoinHandle<()>)
where
    G: ReverseGeocoder + Send + Sync + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
    let (readout_tx, readout_rx) = watch::channel(controller.readout());

    let tracker = RideTracker {
        controller,
        geocoder,
        readout_tx,
    };
    let task = tokio::spawn(tracker.run(events, command_rx, subscriptions));

    let handle = TrackerHandle {
        commands: command_tx,
        readout: readout_rx,
    };
    (handle, task)
}

impl<G> RideTracker<G>
where
    G: ReverseGeocoder + Send + Sync + 'static,
{
    async fn run(
        mut self,
        mut events: mpsc::Receiver<SensorEvent>,
        mut commands: mpsc::Receiver<TrackerCommand>,
        mut subscriptions: SubscriptionSet,
    ) {
        let mut ticker = interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        let mut events_open = true;

        loop {
            tokio::select! {
                biased;

                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        self.controller.on_sensor_event(&event);
                        self.publish();
                    }
                    None => {
                        events_open = false;
                        log::warn!("All sensor feeds closed");
                    }
                },
                _ = ticker.tick() => {
                    if self.controller.is_recording() {
                        self.controller.tick();
                        self.publish();
                    }
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command, &mut ticker).await,
                    None => break,
                },
            }
        }

        subscriptions.release_all();
        log::info!("Ride tracker stopped");
    }

    async fn handle_command(&mut self, command: TrackerCommand, ticker: &mut Interval) {
        match command {
            TrackerCommand::Start(reply) => {
                let result = self.controller.start();
                if result.is_ok() {
                    // First duration tick lands one second after start
                    ticker.reset();
                }
                self.publish();
                let _ = reply.send(result);
            }
            TrackerCommand::Stop(reply) => {
                let result = self.controller.stop(&self.geocoder).await;
                self.publish();
                let _ = reply.send(result);
            }
            TrackerCommand::Calibrate(reply) => {
                self.controller.calibrate();
                self.publish();
                let _ = reply.send(());
            }
        }
    }

    fn publish(&self) {
        self.readout_tx.send_replace(self.controller.readout());
    }
}
