use std::future::pending;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::core::{Error, Result};
use crate::protocol::{Command, CommandEncoder, ConnectionState, Event, FrameDecoder, Inbound, LayoutVersion};
use super::transport::{Connector, Link};

/// Something the connection is waiting for finished
pub enum Activity<L> {
    /// The pending handshake resolved
    Handshake(Result<L>),
    /// The open link produced a message, failed, or closed (`None`)
    Inbound(Option<Result<Inbound>>),
    /// The reconnect timer expired
    ReconnectDue,
}

/// Connection state machine owning the station socket
///
/// All state changes go through [`Connection::connect`], [`Connection::handle`]
/// and [`Connection::send`]; each returns at most one event for the consumer.
pub struct Connection<C: Connector> {
    /// Opens new links
    connector: C,
    /// Current lifecycle state
    state: ConnectionState,
    /// Live link, present only while Connected
    link: Option<C::Link>,
    /// Handshake in flight, present only while Connecting
    handshake: Option<BoxFuture<'static, Result<C::Link>>>,
    /// Next automatic connection attempt, armed only while Disconnected
    reconnect_at: Option<Instant>,
    /// Fixed pause before reconnecting
    reconnect_delay: Duration,
    /// Limit on each handshake
    handshake_timeout: Duration,
    decoder: FrameDecoder,
    encoder: CommandEncoder,
}

impl<C: Connector> Connection<C> {
    /// Creates an idle connection speaking layout `version`
    pub fn new(
        connector: C,
        version: LayoutVersion,
        reconnect_delay: Duration,
        handshake_timeout: Duration,
    ) -> Self {
        Connection {
            connector,
            state: ConnectionState::Disconnected,
            link: None,
            handshake: None,
            reconnect_at: None,
            reconnect_delay,
            handshake_timeout,
            decoder: FrameDecoder::new(version),
            encoder: CommandEncoder::new(version),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// When the next automatic attempt is due, if one is armed
    pub fn reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Starts a handshake if the link is down
    ///
    /// An armed reconnect timer is superseded. Requests while a handshake is in
    /// flight or the link is up are ignored. A handshake that has not finished
    /// within the handshake timeout fails like any other attempt.
    pub fn connect(&mut self) {
        if self.state != ConnectionState::Disconnected {
            debug!(state = %self.state, "connect ignored");
            return;
        }

        self.reconnect_at = None;
        self.transition(ConnectionState::Connecting);
        let limit = self.handshake_timeout;
        let deadline = Instant::now() + limit;
        let attempt = self.connector.connect();
        self.handshake = Some(
            async move {
                match timeout_at(deadline, attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::socket(format!(
                        "Handshake timed out after {}ms",
                        limit.as_millis()
                    ))),
                }
            }
            .boxed(),
        );
        info!("connecting to station");
    }

    /// Waits for the next handshake result, inbound message or timer expiry
    ///
    /// Cancel-safe: dropping the returned future leaves the connection unchanged.
    pub async fn next_activity(&mut self) -> Activity<C::Link> {
        let Connection {
            link,
            handshake,
            reconnect_at,
            ..
        } = self;

        tokio::select! {
            result = wait_handshake(handshake) => Activity::Handshake(result),
            message = wait_message(link) => Activity::Inbound(message),
            _ = wait_deadline(*reconnect_at) => Activity::ReconnectDue,
        }
    }

    /// Applies a finished activity
    pub fn handle(&mut self, activity: Activity<C::Link>) -> Option<Event> {
        match activity {
            Activity::Handshake(Ok(link)) => {
                self.link = Some(link);
                self.transition(ConnectionState::Connected);
                info!("connected to station");
                Some(Event::Connected)
            }
            Activity::Handshake(Err(e)) => {
                warn!(error = %e, delay_ms = self.reconnect_delay.as_millis() as u64, "connection attempt failed");
                self.transition(ConnectionState::Disconnected);
                self.arm_reconnect();
                None
            }
            Activity::Inbound(Some(Ok(message))) => self.on_message(message),
            Activity::Inbound(Some(Err(e))) => Some(self.drop_link(&e)),
            Activity::Inbound(None) => Some(self.drop_link(&Error::socket("connection closed by station"))),
            Activity::ReconnectDue => {
                self.reconnect_at = None;
                self.connect();
                None
            }
        }
    }

    /// Encodes and writes `command` if the link is up
    ///
    /// Commands while not Connected are dropped without encoding. Encode errors
    /// are returned and nothing is written; a failed write ends the epoch.
    pub async fn send(&mut self, command: Command) -> Result<Option<Event>> {
        let link = match (&mut self.link, self.state.accepts_commands()) {
            (Some(link), true) => link,
            _ => {
                debug!(?command, state = %self.state, "dropping command, station not connected");
                return Ok(None);
            }
        };

        let frame = self.encoder.encode(&command)?;
        match link.send(frame).await {
            Ok(()) => {
                debug!(?command, "command sent");
                Ok(None)
            }
            Err(e) => Ok(Some(self.drop_link(&e))),
        }
    }

    fn on_message(&mut self, message: Inbound) -> Option<Event> {
        match self.decoder.decode_message(&message) {
            Ok(frame) => {
                if frame.precision_loss {
                    warn!(gps_time = frame.state.gps_time, "time counter exceeds float precision");
                }
                Some(Event::Data(frame.state))
            }
            Err(e) if e.is_fatal_to_connection() => Some(self.drop_link(&e)),
            Err(e) => {
                error!(error = %e, "station reported a bad frame");
                None
            }
        }
    }

    fn drop_link(&mut self, reason: &Error) -> Event {
        warn!(reason = %reason, delay_ms = self.reconnect_delay.as_millis() as u64, "station disconnected");
        self.link = None;
        self.transition(ConnectionState::Disconnected);
        self.arm_reconnect();
        Event::Disconnected
    }

    fn arm_reconnect(&mut self) {
        self.reconnect_at = Some(Instant::now() + self.reconnect_delay);
    }

    fn transition(&mut self, next: ConnectionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
    }
}

async fn wait_handshake<L>(handshake: &mut Option<BoxFuture<'static, Result<L>>>) -> Result<L> {
    match handshake {
        Some(future) => {
            let result = future.await;
            *handshake = None;
            result
        }
        None => pending().await,
    }
}

async fn wait_message<L: Link>(link: &mut Option<L>) -> Option<Result<Inbound>> {
    match link {
        Some(link) => link.next_message().await,
        None => pending().await,
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use tokio::sync::mpsc;

    use crate::core::HANDSHAKE_TIMEOUT;
    use crate::protocol::frame::tests::{blank_frame, put};
    use crate::protocol::Field;

    /// In-memory link fed by a test
    pub(crate) struct MockLink {
        inbound: mpsc::UnboundedReceiver<Inbound>,
        outbound: mpsc::UnboundedSender<Bytes>,
    }

    impl Link for MockLink {
        fn send(&mut self, frame: Bytes) -> BoxFuture<'_, Result<()>> {
            let result = self
                .outbound
                .send(frame)
                .map_err(|_| Error::socket("peer gone"));
            async move { result }.boxed()
        }

        fn next_message(&mut self) -> BoxFuture<'_, Option<Result<Inbound>>> {
            async move { self.inbound.recv().await.map(Ok) }.boxed()
        }
    }

    /// Test side of one mock link
    pub(crate) struct Peer {
        pub(crate) inbound: mpsc::UnboundedSender<Inbound>,
        pub(crate) outbound: mpsc::UnboundedReceiver<Bytes>,
    }

    /// Connector handing out prepared links; refuses when none are left
    ///
    /// A `None` entry is a station that accepts but never finishes the handshake.
    #[derive(Clone, Default)]
    pub(crate) struct MockConnector {
        links: Arc<Mutex<VecDeque<Option<MockLink>>>>,
        attempts: Arc<Mutex<u32>>,
    }

    impl MockConnector {
        pub(crate) fn prepare(&self) -> Peer {
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            self.links.lock().unwrap().push_back(Some(MockLink {
                inbound: in_rx,
                outbound: out_tx,
            }));
            Peer {
                inbound: in_tx,
                outbound: out_rx,
            }
        }

        pub(crate) fn prepare_stalled(&self) {
            self.links.lock().unwrap().push_back(None);
        }

        pub(crate) fn attempts(&self) -> u32 {
            *self.attempts.lock().unwrap()
        }
    }

    impl Connector for MockConnector {
        type Link = MockLink;

        fn connect(&self) -> BoxFuture<'static, Result<MockLink>> {
            *self.attempts.lock().unwrap() += 1;
            let next = self.links.lock().unwrap().pop_front();
            match next {
                Some(Some(link)) => async move { Ok(link) }.boxed(),
                Some(None) => pending::<Result<MockLink>>().boxed(),
                None => async { Err(Error::socket("connection refused")) }.boxed(),
            }
        }
    }

    fn connection(connector: &MockConnector) -> Connection<MockConnector> {
        Connection::new(
            connector.clone(),
            LayoutVersion::V1,
            Duration::from_millis(1000),
            HANDSHAKE_TIMEOUT,
        )
    }

    async fn step(conn: &mut Connection<MockConnector>) -> Option<Event> {
        let activity = conn.next_activity().await;
        conn.handle(activity)
    }

    #[tokio::test]
    async fn test_connect_emits_connected() {
        let connector = MockConnector::default();
        let _peer = connector.prepare();
        let mut conn = connection(&connector);

        assert_eq!(conn.state(), ConnectionState::Disconnected);
        conn.connect();
        assert_eq!(conn.state(), ConnectionState::Connecting);

        assert_eq!(step(&mut conn).await, Some(Event::Connected));
        assert_eq!(conn.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_frames_become_data_events() {
        let connector = MockConnector::default();
        let peer = connector.prepare();
        let mut conn = connection(&connector);
        conn.connect();
        step(&mut conn).await;

        peer.inbound
            .send(Inbound::Binary(Bytes::from(blank_frame(LayoutVersion::V1))))
            .unwrap();
        match step(&mut conn).await {
            Some(Event::Data(state)) => assert_eq!(state.flight_number, 0),
            other => panic!("expected data, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_checksum_text_keeps_connection() {
        let connector = MockConnector::default();
        let peer = connector.prepare();
        let mut conn = connection(&connector);
        conn.connect();
        step(&mut conn).await;

        peer.inbound.send(Inbound::Text("CRC NOK".into())).unwrap();
        assert_eq!(step(&mut conn).await, None);
        assert_eq!(conn.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_short_frame_forces_disconnect() {
        let connector = MockConnector::default();
        let peer = connector.prepare();
        let mut conn = connection(&connector);
        conn.connect();
        step(&mut conn).await;

        peer.inbound
            .send(Inbound::Binary(Bytes::from_static(&[0x01, 0x00])))
            .unwrap();
        assert_eq!(step(&mut conn).await, Some(Event::Disconnected));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.reconnect_at().is_some());
    }

    #[tokio::test]
    async fn test_foreign_layout_forces_disconnect() {
        let connector = MockConnector::default();
        let peer = connector.prepare();
        let mut conn = connection(&connector);
        conn.connect();
        step(&mut conn).await;

        let mut frame = blank_frame(LayoutVersion::V1);
        frame[0] = 0x00;
        peer.inbound.send(Inbound::Binary(Bytes::from(frame))).unwrap();
        assert_eq!(step(&mut conn).await, Some(Event::Disconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_fixed_delay() {
        let connector = MockConnector::default();
        let peer = connector.prepare();
        let _second = connector.prepare();
        let mut conn = connection(&connector);
        conn.connect();
        step(&mut conn).await;

        drop(peer);
        assert_eq!(step(&mut conn).await, Some(Event::Disconnected));
        let dropped_at = Instant::now();

        // Timer expiry starts the next handshake
        assert_eq!(step(&mut conn).await, None);
        assert_eq!(Instant::now() - dropped_at, Duration::from_millis(1000));
        assert_eq!(conn.state(), ConnectionState::Connecting);

        assert_eq!(step(&mut conn).await, Some(Event::Connected));
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_handshakes_retry_without_bound() {
        let connector = MockConnector::default();
        let mut conn = connection(&connector);
        conn.connect();

        let start = Instant::now();
        for attempt in 1..=5u32 {
            // Handshake fails silently, then the timer fires
            assert_eq!(step(&mut conn).await, None);
            assert_eq!(conn.state(), ConnectionState::Disconnected);
            assert_eq!(step(&mut conn).await, None);
            assert_eq!(conn.state(), ConnectionState::Connecting);
            assert_eq!(Instant::now() - start, Duration::from_millis(1000) * attempt);
        }
        assert_eq!(connector.attempts(), 6);
    }

    #[tokio::test]
    async fn test_commands_dropped_while_disconnected() {
        let connector = MockConnector::default();
        let mut peer = connector.prepare();
        let mut conn = connection(&connector);

        let event = conn.send(Command::Stop).await.unwrap();
        assert_eq!(event, None);

        // Dropped even when the arguments would not encode
        let event = conn
            .send(Command::SetHeading { heading: 1 << 40 })
            .await
            .unwrap();
        assert_eq!(event, None);

        conn.connect();
        conn.send(Command::Stop).await.unwrap();
        step(&mut conn).await;
        assert!(peer.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_commands_written_while_connected() {
        let connector = MockConnector::default();
        let mut peer = connector.prepare();
        let mut conn = connection(&connector);
        conn.connect();
        step(&mut conn).await;

        conn.send(Command::Start {
            flight_number: 150,
            top_number: 3,
        })
        .await
        .unwrap();
        assert_eq!(&peer.outbound.recv().await.unwrap()[..], &[0x01, 150, 0, 3]);

        let err = conn
            .send(Command::SetElevation { elevation: 40_000 })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ArgumentOutOfRange { .. }));
        assert!(peer.outbound.try_recv().is_err());
        assert_eq!(conn.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_failed_write_ends_epoch() {
        let connector = MockConnector::default();
        let peer = connector.prepare();
        let mut conn = connection(&connector);
        conn.connect();
        step(&mut conn).await;

        let Peer { inbound, outbound } = peer;
        drop(outbound);
        let event = conn.send(Command::Stop).await.unwrap();
        assert_eq!(event, Some(Event::Disconnected));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        drop(inbound);
    }

    #[tokio::test]
    async fn test_connect_ignored_while_connected() {
        let connector = MockConnector::default();
        let _peer = connector.prepare();
        let mut conn = connection(&connector);
        conn.connect();
        conn.connect();
        step(&mut conn).await;
        conn.connect();

        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_connect_supersedes_timer() {
        let connector = MockConnector::default();
        let peer = connector.prepare();
        let _second = connector.prepare();
        let mut conn = connection(&connector);
        conn.connect();
        step(&mut conn).await;
        drop(peer);
        step(&mut conn).await;
        assert!(conn.reconnect_at().is_some());

        conn.connect();
        assert!(conn.reconnect_at().is_none());
        let before = Instant::now();
        assert_eq!(step(&mut conn).await, Some(Event::Connected));
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_handshake_times_out_and_retries() {
        let connector = MockConnector::default();
        connector.prepare_stalled();
        let _peer = connector.prepare();
        let mut conn = connection(&connector);

        let start = Instant::now();
        conn.connect();

        // The stalled attempt fails silently once the timeout passes
        assert_eq!(step(&mut conn).await, None);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(Instant::now() - start, HANDSHAKE_TIMEOUT);

        assert_eq!(step(&mut conn).await, None);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(
            Instant::now() - start,
            HANDSHAKE_TIMEOUT + Duration::from_millis(1000)
        );

        assert_eq!(step(&mut conn).await, Some(Event::Connected));
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_after_stalled_handshake() {
        let connector = MockConnector::default();
        connector.prepare_stalled();
        let _peer = connector.prepare();
        let mut conn = connection(&connector);
        conn.connect();
        step(&mut conn).await;

        // An explicit request is honoured once the stalled attempt has failed
        conn.connect();
        assert_eq!(step(&mut conn).await, Some(Event::Connected));
    }

    #[tokio::test]
    async fn test_precision_loss_keeps_connection() {
        let connector = MockConnector::default();
        let peer = connector.prepare();
        let mut conn = connection(&connector);
        conn.connect();
        step(&mut conn).await;

        let v = LayoutVersion::V1;
        let mut frame = blank_frame(v);
        let beyond_safe: u64 = (1 << 53) + 1;
        put(&mut frame, v, Field::GpsTime, &beyond_safe.to_le_bytes());
        peer.inbound.send(Inbound::Binary(Bytes::from(frame))).unwrap();

        match step(&mut conn).await {
            Some(Event::Data(state)) => assert_eq!(state.gps_time, (1u64 << 53) as f64),
            other => panic!("expected data, got {:?}", other),
        }
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert!(conn.reconnect_at().is_none());
    }
}
