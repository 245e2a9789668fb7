//! Consumer-facing channel
//!
//! A channel runs in its own task and is reached only through a
//! [`ChannelHandle`]: requests go in through a bounded mailbox, events come
//! out through an unbounded queue. Both carry owned values, so nothing is
//! shared between the consumer and the station link.
//!
//! # Examples
//!
//! ```no_run
//! use meteo_link::{Channel, ChannelConfig, Event, Request};
//!
//! #[tokio::main]
//! async fn main() -> meteo_link::Result<()> {
//!     let mut channel = Channel::spawn_websocket(ChannelConfig::default())?;
//!     channel.send(Request::Connect).await?;
//!
//!     while let Some(event) = channel.next_event().await {
//!         if let Event::Data(state) = event {
//!             println!("wind {:.1} kts from {}", state.windspeed, state.wind_direction);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::core::{ChannelConfig, Error, Result};
use crate::network::{Activity, Connection, Connector, LinkQuality, NetworkSampler, SysfsLinkSpeed, WsConnector};
use crate::protocol::{ConnectionState, Event, Request};

/// Event loop tying the connection, the sampler and the consumer together
pub struct Channel<C: Connector> {
    connection: Connection<C>,
    sampler: NetworkSampler,
    requests: mpsc::Receiver<Request>,
    events: mpsc::UnboundedSender<Event>,
}

enum Step<L> {
    Request(Request),
    Activity(Activity<L>),
    Sample,
}

impl Channel<WsConnector> {
    /// Spawns a channel talking websocket to the configured station, sampling
    /// link quality from sysfs
    pub fn spawn_websocket(config: ChannelConfig) -> Result<ChannelHandle> {
        config.validate()?;
        let connector = WsConnector::new(config.url.clone(), config.subprotocol.clone());
        Ok(Channel::spawn(&config, connector, SysfsLinkSpeed::new(None)))
    }
}

impl<C: Connector> Channel<C> {
    /// Spawns a channel on the current tokio runtime
    ///
    /// The channel starts Disconnected; post [`Request::Connect`] to open the link.
    pub fn spawn(config: &ChannelConfig, connector: C, quality: impl LinkQuality) -> ChannelHandle {
        let (request_tx, request_rx) = mpsc::channel(config.mailbox_capacity.max(1));
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let channel = Channel {
            connection: Connection::new(
                connector,
                config.layout,
                config.reconnect_delay,
                config.handshake_timeout,
            ),
            sampler: NetworkSampler::new(quality, config.sample_period),
            requests: request_rx,
            events: event_tx,
        };
        let task = tokio::spawn(channel.run());

        ChannelHandle {
            requests: request_tx,
            events: event_rx,
            task,
        }
    }

    async fn run(mut self) {
        let period = self.sampler.period();
        let mut sample_timer = interval_at(Instant::now() + period, period);
        sample_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let step = tokio::select! {
                request = self.requests.recv() => match request {
                    Some(request) => Step::Request(request),
                    None => break,
                },
                activity = self.connection.next_activity() => Step::Activity(activity),
                _ = sample_timer.tick() => Step::Sample,
            };

            match step {
                Step::Request(request) => self.on_request(request).await,
                Step::Activity(activity) => {
                    if let Some(event) = self.connection.handle(activity) {
                        self.emit(event);
                    }
                }
                Step::Sample => {
                    if let Some(event) = self.sampler.sample() {
                        self.emit(event);
                    }
                }
            }
        }

        info!(state = %self.connection.state(), "channel stopped");
    }

    async fn on_request(&mut self, request: Request) {
        let command = match request.command() {
            Some(command) => command,
            None => {
                self.connection.connect();
                return;
            }
        };

        match self.connection.send(command).await {
            Ok(Some(event)) => self.emit(event),
            Ok(None) => {}
            Err(e) => error!(error = %e, ?request, "request rejected"),
        }
    }

    fn emit(&self, event: Event) {
        debug_assert!(
            !matches!(event, Event::Data(_)) || self.connection.state() == ConnectionState::Connected
        );
        if self.events.send(event).is_err() {
            debug!("event dropped, consumer gone");
        }
    }
}

/// Consumer side of a running channel
pub struct ChannelHandle {
    requests: mpsc::Sender<Request>,
    events: mpsc::UnboundedReceiver<Event>,
    task: JoinHandle<()>,
}

impl ChannelHandle {
    /// Posts a request to the channel
    pub async fn send(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    /// Posts a JSON request envelope such as `{"cmd":"stop"}`
    ///
    /// Unknown request names are logged and ignored. A known name with a
    /// malformed payload is returned as [`Error::InvalidRequest`].
    pub async fn post_json(&self, json: &str) -> Result<()> {
        match Request::from_json(json) {
            Ok(request) => self.send(request).await,
            Err(Error::UnknownRequest(name)) => {
                error!(cmd = %name, "unknown request ignored");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Waits for the next event; `None` once the channel has stopped
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Returns an event if one is ready
    pub fn try_next_event(&mut self) -> Option<Event> {
        self.events.try_recv().ok()
    }

    /// Stops the channel, closing the link and cancelling its timers
    pub async fn shutdown(self) -> Result<()> {
        let ChannelHandle { requests, task, .. } = self;
        drop(requests);
        task.await
            .map_err(|e| Error::socket(format!("Channel task failed: {}", e)))
    }
}
