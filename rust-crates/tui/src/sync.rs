use crate::game::{
    GameSnapshot,
    IndexedGame,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use ethers::types::Address;
use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{
            AtomicU64,
            Ordering,
        },
    },
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::{
        JoinHandle,
        JoinSet,
    },
    time::{
        self,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    warn,
};

/// A tick that has not finished by then is abandoned, so a hung endpoint
/// holds at most `TICK_TIMEOUT / interval` ticks in flight.
pub const TICK_TIMEOUT: Duration = Duration::from_secs(10);

/// Read-only view of the deployed contract.
pub trait GameReader: Send + Sync {
    fn game_started(&self) -> impl Future<Output = Result<bool>> + Send;
    fn owner(&self) -> impl Future<Output = Result<Address>> + Send;
}

/// Source of the most recently created game.
pub trait GameIndexer: Send + Sync {
    fn latest_game(&self) -> impl Future<Output = Result<IndexedGame>> + Send;
}

/// One completed poll, tagged with the order in which it was issued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollReading {
    pub seq: u64,
    pub started: bool,
    pub game: IndexedGame,
}

pub struct GameSynchronizer<R, I> {
    reader: R,
    indexer: I,
    next_seq: AtomicU64,
}

impl<R: GameReader, I: GameIndexer> GameSynchronizer<R, I> {
    pub fn new(reader: R, indexer: I) -> Self {
        Self {
            reader,
            indexer,
            next_seq: AtomicU64::new(1),
        }
    }

    /// Takes a sequence number, then reads the chain flag and the latest
    /// indexed game. Either failure abandons the whole reading, as does a
    /// running game whose record lacks its fee or player limit.
    pub async fn read(&self) -> Result<PollReading> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let started = self
            .reader
            .game_started()
            .await
            .wrap_err("reading gameStarted failed")?;
        let game = self
            .indexer
            .latest_game()
            .await
            .wrap_err("fetching latest game failed")?;
        if started && game.terms().is_none() {
            return Err(eyre!(
                "game {} is running but its entryFee or maxPlayers is not indexed",
                game.id
            ));
        }
        debug!(seq, started, game_id = %game.id, "poll reading");
        Ok(PollReading { seq, started, game })
    }

    pub async fn poll(&self, previous: &GameSnapshot) -> Result<GameSnapshot> {
        let reading = self.read().await?;
        Ok(previous.reconcile(reading.started, &reading.game))
    }
}

enum PollCommand {
    FetchNow,
    Shutdown,
}

/// Owns the background poller. Dropping the handle stops it.
pub struct PollHandle {
    cmd_tx: mpsc::UnboundedSender<PollCommand>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Starts polling immediately, then once per `interval`. Each tick runs
    /// as its own task, bounded by [`TICK_TIMEOUT`], so a slow read never
    /// delays the next one; readings may therefore arrive out of order and
    /// carry `seq` for the consumer.
    pub fn spawn<R, I>(
        synchronizer: Arc<GameSynchronizer<R, I>>,
        interval: Duration,
        readings: mpsc::UnboundedSender<PollReading>,
    ) -> Self
    where
        R: GameReader + 'static,
        I: GameIndexer + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(poll_worker(synchronizer, interval, cmd_rx, readings));
        Self { cmd_tx, task }
    }

    pub fn refresh(&self) {
        let _ = self.cmd_tx.send(PollCommand::FetchNow);
    }

    pub fn cancel(&self) {
        let _ = self.cmd_tx.send(PollCommand::Shutdown);
        self.task.abort();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn poll_worker<R, I>(
    synchronizer: Arc<GameSynchronizer<R, I>>,
    interval: Duration,
    mut cmd_rx: mpsc::UnboundedReceiver<PollCommand>,
    readings: mpsc::UnboundedSender<PollReading>,
) where
    R: GameReader + 'static,
    I: GameIndexer + 'static,
{
    fn spawn_tick<R, I>(
        in_flight: &mut JoinSet<()>,
        synchronizer: &Arc<GameSynchronizer<R, I>>,
        readings: &mpsc::UnboundedSender<PollReading>,
    ) where
        R: GameReader + 'static,
        I: GameIndexer + 'static,
    {
        let synchronizer = Arc::clone(synchronizer);
        let readings = readings.clone();
        in_flight.spawn(async move {
            match time::timeout(TICK_TIMEOUT, synchronizer.read()).await {
                Ok(Ok(reading)) => {
                    let _ = readings.send(reading);
                }
                Ok(Err(err)) => warn!(?err, "poll tick abandoned"),
                Err(_) => warn!(timeout = ?TICK_TIMEOUT, "poll tick timed out"),
            }
        });
    }

    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                spawn_tick(&mut in_flight, &synchronizer, &readings);
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(PollCommand::FetchNow) => {
                        spawn_tick(&mut in_flight, &synchronizer, &readings);
                    }
                    Some(PollCommand::Shutdown) | None => break,
                }
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(err) = joined
                    && err.is_panic()
                {
                    warn!(?err, "poll tick panicked");
                }
            }
        }
    }
    in_flight.abort_all();
    debug!("poll worker stopped");
}

#[cfg(test)]
pub(crate) mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::game::tests::{
        addr,
        arb_game,
    };
    use color_eyre::eyre::eyre;
    use std::sync::{
        Mutex,
        atomic::AtomicUsize,
    };

    /// Reader whose answers are scripted per call; once the script runs out
    /// it repeats the last entry.
    pub(crate) struct FakeReader {
        started: Mutex<Vec<Result<bool, String>>>,
        owner: Address,
    }

    impl FakeReader {
        pub(crate) fn new(started: Vec<Result<bool, String>>, owner: Address) -> Self {
            Self {
                started: Mutex::new(started),
                owner,
            }
        }

        pub(crate) fn always(started: bool) -> Self {
            Self::new(vec![Ok(started)], addr(0x01))
        }
    }

    impl GameReader for FakeReader {
        async fn game_started(&self) -> Result<bool> {
            let mut script = self.started.lock().unwrap();
            let next = if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            };
            next.map_err(|e| eyre!(e))
        }

        async fn owner(&self) -> Result<Address> {
            Ok(self.owner)
        }
    }

    pub(crate) struct FakeIndexer {
        game: Mutex<Result<IndexedGame, String>>,
    }

    impl FakeIndexer {
        pub(crate) fn new(game: Result<IndexedGame, String>) -> Self {
            Self {
                game: Mutex::new(game),
            }
        }

        pub(crate) fn set(&self, game: Result<IndexedGame, String>) {
            *self.game.lock().unwrap() = game;
        }
    }

    impl GameIndexer for FakeIndexer {
        async fn latest_game(&self) -> Result<IndexedGame> {
            self.game.lock().unwrap().clone().map_err(|e| eyre!(e))
        }
    }

    /// Reader whose `gameStarted` never answers. Tracks how many calls are
    /// still pending; a cancelled call stops counting when dropped.
    struct HangingReader {
        pending: Arc<AtomicUsize>,
    }

    struct PendingCall(Arc<AtomicUsize>);

    impl Drop for PendingCall {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl GameReader for HangingReader {
        async fn game_started(&self) -> Result<bool> {
            self.pending.fetch_add(1, Ordering::SeqCst);
            let _call = PendingCall(Arc::clone(&self.pending));
            std::future::pending::<()>().await;
            Ok(true)
        }

        async fn owner(&self) -> Result<Address> {
            Ok(addr(1))
        }
    }

    #[tokio::test]
    async fn read__consecutive_calls__issue_increasing_sequence_numbers() {
        // given
        let sync = GameSynchronizer::new(
            FakeReader::always(true),
            FakeIndexer::new(Ok(arb_game("1", 2, vec![]))),
        );

        // when
        let first = sync.read().await.unwrap();
        let second = sync.read().await.unwrap();

        // then
        assert!(second.seq > first.seq);
    }

    #[tokio::test]
    async fn poll__chain_read_fails__returns_error_and_keeps_previous() {
        // given
        let sync = GameSynchronizer::new(
            FakeReader::new(vec![Err("rpc down".into())], addr(1)),
            FakeIndexer::new(Ok(arb_game("1", 2, vec![]))),
        );
        let previous = GameSnapshot {
            logs: vec!["kept".into()],
            ..GameSnapshot::default()
        };

        // when
        let result = sync.poll(&previous).await;

        // then
        assert!(result.is_err());
        assert_eq!(previous.logs, vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn poll__running_game_without_terms__abandons_tick() {
        // given
        let sync = GameSynchronizer::new(
            FakeReader::always(true),
            FakeIndexer::new(Ok(IndexedGame {
                entry_fee: None,
                ..arb_game("5", 2, vec![])
            })),
        );

        // when
        let result = sync.poll(&GameSnapshot::default()).await;

        // then
        assert!(result.unwrap_err().to_string().contains("game 5 is running"));
    }

    #[tokio::test]
    async fn poll__game_ends_between_ticks__announces_winner() {
        // given
        let winner = addr(0xcc);
        let sync = GameSynchronizer::new(
            FakeReader::new(vec![Ok(true), Ok(false)], addr(1)),
            FakeIndexer::new(Ok(arb_game("2", 2, vec![addr(0xaa), addr(0xbb)]))),
        );
        let running = sync.poll(&GameSnapshot::default()).await.unwrap();

        // when
        sync.indexer.set(Ok(IndexedGame {
            id: "2".to_string(),
            entry_fee: None,
            max_players: None,
            players: vec![],
            winner: Some(winner),
        }));
        let ended = sync.poll(&running).await.unwrap();

        // then
        assert_eq!(
            ended.logs,
            vec![
                "Last game has ended with ID: 2".to_string(),
                format!("Winner is: {}", crate::game::display_address(&winner)),
                "Waiting for host to start new game....".to_string(),
            ]
        );
        assert_eq!(ended.max_players, 2);
        assert!(ended.players.is_empty());
    }

    #[tokio::test]
    async fn poll__indexer_fails__whole_tick_abandoned() {
        // given
        let sync = GameSynchronizer::new(
            FakeReader::always(true),
            FakeIndexer::new(Err("subgraph unavailable".into())),
        );

        // when
        let result = sync.poll(&GameSnapshot::default()).await;

        // then
        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("subgraph unavailable"));
    }

    #[tokio::test]
    async fn poll__started_game_with_two_players__matches_first_scenario() {
        // given
        let players = vec![addr(0xaa), addr(0xbb)];
        let sync = GameSynchronizer::new(
            FakeReader::always(true),
            FakeIndexer::new(Ok(arb_game("1", 4, players.clone()))),
        );

        // when
        let snapshot = sync.poll(&GameSnapshot::default()).await.unwrap();

        // then
        assert_eq!(snapshot.logs.len(), 4);
        assert_eq!(snapshot.players, players);
        assert!(!snapshot.is_resolving());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_handle__spawn__polls_immediately_then_each_interval() {
        // given
        let sync = Arc::new(GameSynchronizer::new(
            FakeReader::always(false),
            FakeIndexer::new(Ok(arb_game("1", 2, vec![]))),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();

        // when
        let handle = PollHandle::spawn(sync, Duration::from_millis(2000), tx);
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();

        // then
        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn poll_handle__failing_tick__sends_nothing_and_keeps_polling() {
        // given
        let sync = Arc::new(GameSynchronizer::new(
            FakeReader::new(vec![Err("timeout".into()), Ok(true)], addr(1)),
            FakeIndexer::new(Ok(arb_game("9", 2, vec![]))),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();

        // when
        let _handle = PollHandle::spawn(sync, Duration::from_millis(50), tx);
        let reading = rx.recv().await.unwrap();

        // then
        assert_eq!(reading.seq, 2);
        assert!(reading.started);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_handle__dropped__stops_sending_readings() {
        // given
        let sync = Arc::new(GameSynchronizer::new(
            FakeReader::always(true),
            FakeIndexer::new(Ok(arb_game("1", 2, vec![]))),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = PollHandle::spawn(sync, Duration::from_millis(10), tx);
        let _ = rx.recv().await.unwrap();

        // when
        drop(handle);
        let closed = time::timeout(Duration::from_secs(1), async {
            while rx.recv().await.is_some() {}
        })
        .await;

        // then
        assert!(closed.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_handle__hung_endpoint__in_flight_ticks_stay_bounded() {
        // given
        let pending = Arc::new(AtomicUsize::new(0));
        let sync = Arc::new(GameSynchronizer::new(
            HangingReader {
                pending: Arc::clone(&pending),
            },
            FakeIndexer::new(Ok(arb_game("1", 2, vec![]))),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let interval = Duration::from_millis(2000);
        let _handle = PollHandle::spawn(sync, interval, tx);

        // when
        time::sleep(Duration::from_secs(60)).await;

        // then
        let bound = (TICK_TIMEOUT.as_millis() / interval.as_millis()) as usize + 1;
        let stuck = pending.load(Ordering::SeqCst);
        assert!(stuck >= 1);
        assert!(stuck <= bound, "{stuck} ticks still pending");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_handle__refresh__triggers_an_extra_reading() {
        // given
        let sync = Arc::new(GameSynchronizer::new(
            FakeReader::always(true),
            FakeIndexer::new(Ok(arb_game("1", 2, vec![]))),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = PollHandle::spawn(sync, Duration::from_secs(3600), tx);
        let _ = rx.recv().await.unwrap();

        // when
        handle.refresh();
        let refreshed = rx.recv().await.unwrap();

        // then
        assert_eq!(refreshed.seq, 2);
    }
}
