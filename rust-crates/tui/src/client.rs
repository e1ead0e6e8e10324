use crate::ui;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use random_winner_game::{
    actions::{
        self,
        ActionEvent,
        ActionRequest,
    },
    chain::{
        ContractReader,
        ContractWriter,
    },
    config::AppConfig,
    game::display_address,
    indexer_client::IndexerClient,
    session::{
        self,
        ConnectError,
        ConnectTarget,
        Connection,
    },
    sync::{
        GameSynchronizer,
        PollHandle,
        PollReading,
    },
    view::{
        ActionPanel,
        ViewState,
    },
};
use std::{
    path::Path,
    sync::Arc,
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::{
    error,
    info,
    warn,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "random-winner.log";

/// Results of background work, delivered to the app loop.
enum AppEvent {
    Connected(Box<Connection>),
    ConnectFailed(ConnectError),
    Ownership(bool),
    OwnershipFailed(String),
}

pub struct AppController {
    view: ViewState,
    header: ui::Header,
    target: ConnectTarget,
    indexer: IndexerClient,
    poll_interval: Duration,
    poll: Option<PollHandle>,
    writer: Option<Arc<ContractWriter>>,
    connecting: bool,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    actions_tx: mpsc::UnboundedSender<ActionEvent>,
    readings_tx: mpsc::UnboundedSender<PollReading>,
}

/// Receiving ends of the controller's channels, drained by the app loop.
struct Inbox {
    events: mpsc::UnboundedReceiver<AppEvent>,
    actions: mpsc::UnboundedReceiver<ActionEvent>,
    readings: mpsc::UnboundedReceiver<PollReading>,
}

impl AppController {
    fn new(config: &AppConfig) -> Result<(Self, Inbox)> {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (actions_tx, actions) = mpsc::unbounded_channel();
        let (readings_tx, readings) = mpsc::unbounded_channel();
        let indexer = IndexerClient::new(config.subgraph_url.clone())?;
        let header = ui::Header {
            network: config.network.display_name().to_string(),
            contract: display_address(&config.contract),
            wallet: config.wallet.name.clone(),
        };
        let controller = Self {
            view: ViewState::default(),
            header,
            target: config.connect_target(),
            indexer,
            poll_interval: config.poll_interval,
            poll: None,
            writer: None,
            connecting: false,
            events_tx,
            actions_tx,
            readings_tx,
        };
        Ok((
            controller,
            Inbox {
                events,
                actions,
                readings,
            },
        ))
    }

    fn begin_connect(&mut self, password: String) {
        if self.connecting || self.view.session.connected {
            return;
        }
        self.connecting = true;
        self.view.on_connecting();
        let target = self.target.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let event = match session::connect(target, password).await {
                Ok(connection) => AppEvent::Connected(Box::new(connection)),
                Err(err) => AppEvent::ConnectFailed(err),
            };
            let _ = events.send(event);
        });
    }

    /// Starts the poller on the first successful connect and checks ownership.
    fn finish_connect(&mut self, connection: Connection) {
        self.connecting = false;
        let Connection {
            session,
            reader,
            writer,
        } = connection;
        let signer = writer.signer_address();
        self.view.on_connected(session);
        self.writer = Some(Arc::new(writer));
        self.spawn_owner_check(reader.clone(), signer);
        if self.poll.is_none() {
            let synchronizer = Arc::new(GameSynchronizer::new(reader, self.indexer.clone()));
            self.poll = Some(PollHandle::spawn(
                synchronizer,
                self.poll_interval,
                self.readings_tx.clone(),
            ));
            info!(
                interval = ?self.poll_interval,
                subgraph = self.indexer.url(),
                "polling started"
            );
        }
    }

    fn fail_connect(&mut self, err: ConnectError) {
        self.connecting = false;
        match &err {
            ConnectError::Declined => info!("wallet unlock declined"),
            other => warn!(error = %other, "wallet connect failed"),
        }
        self.view.on_connect_failed(&err);
    }

    fn spawn_owner_check(&self, reader: ContractReader, signer: ethers::types::Address) {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let event = match session::check_owner(&reader, signer).await {
                Ok(is_owner) => AppEvent::Ownership(is_owner),
                Err(err) => AppEvent::OwnershipFailed(format!("{err:#}")),
            };
            let _ = events.send(event);
        });
    }

    fn submit(&mut self, request: ActionRequest) {
        let Some(writer) = self.writer.clone() else {
            self.view.push_error("Connect your wallet first");
            return;
        };
        self.view.set_status(format!("Confirm {request} ..."));
        let actions_tx = self.actions_tx.clone();
        tokio::spawn(async move {
            actions::run_action(&*writer, request, &actions_tx).await;
        });
    }

    fn start_game(&mut self, entry_fee: &str, max_players: &str) {
        let parsed = actions::parse_entry_fee(entry_fee).and_then(|fee| {
            actions::parse_max_players(max_players).map(|max_players| (fee, max_players))
        });
        match parsed {
            Ok((entry_fee, max_players)) => self.submit(ActionRequest::StartGame {
                max_players,
                entry_fee,
            }),
            Err(err) => self.view.push_error(format!("{err}")),
        }
    }

    fn join_game(&mut self) {
        if let ActionPanel::Join { entry_fee } = self.view.action_panel() {
            self.submit(ActionRequest::JoinGame { entry_fee });
        }
    }

    fn apply_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Connected(connection) => self.finish_connect(*connection),
            AppEvent::ConnectFailed(err) => self.fail_connect(err),
            AppEvent::Ownership(is_owner) => {
                info!(is_owner, "ownership checked");
                self.view.on_ownership(is_owner);
            }
            AppEvent::OwnershipFailed(msg) => {
                warn!(error = %msg, "ownership check failed");
                self.view.push_error(format!("Owner check failed: {msg}"));
            }
        }
    }

    /// A mined or failed transaction triggers an immediate re-poll.
    fn apply_action(&mut self, action: ActionEvent) {
        self.view.on_action(&action);
        if matches!(action, ActionEvent::Finished { .. })
            && let Some(poll) = &self.poll
        {
            poll.refresh();
        }
    }

    fn shutdown(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.cancel();
        }
    }
}

pub fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .wrap_err_with(|| format!("failed to create log directory {}", log_dir.display()))?;
    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!("failed to install tracing subscriber: {e}"))?;
    Ok(guard)
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let (controller, inbox) = AppController::new(&config)?;
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    info!(contract = ?config.contract, network = ?config.network, "starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(controller, inbox, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop(
    mut controller: AppController,
    mut inbox: Inbox,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    ui::draw(ui_state, &controller.header, &controller.view)
        .wrap_err("initial draw failed")?;

    loop {
        tokio::select! {
            Some(reading) = inbox.readings.recv() => {
                if !controller.view.commit_reading(&reading) {
                    continue;
                }
            }
            Some(event) = inbox.events.recv() => {
                controller.apply_event(event);
            }
            Some(action) = inbox.actions.recv() => {
                controller.apply_action(action);
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, &controller.view, event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::Refresh => match &controller.poll {
                        Some(poll) => poll.refresh(),
                        None => controller.view.set_status("Connect your wallet to load the game"),
                    },
                    ui::UserEvent::Connect { password } => controller.begin_connect(password),
                    ui::UserEvent::ConnectDeclined => {
                        controller.fail_connect(ConnectError::Declined);
                    }
                    ui::UserEvent::JoinGame => controller.join_game(),
                    ui::UserEvent::StartGame {
                        entry_fee,
                        max_players,
                    } => controller.start_game(&entry_fee, &max_players),
                    ui::UserEvent::DismissAlert => controller.view.dismiss_alert(),
                }
            }
        }
        ui::draw(ui_state, &controller.header, &controller.view)
            .wrap_err("draw failed")?;
    }

    controller.shutdown();
    if controller.view.busy {
        error!("exiting with a transaction still pending");
    }
    Ok(())
}
