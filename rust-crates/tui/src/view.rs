use crate::{
    actions::ActionEvent,
    game::{
        GameSnapshot,
        display_ether,
    },
    session::{
        ConnectError,
        WalletSession,
    },
    sync::PollReading,
};
use chrono::{
    DateTime,
    Local,
};
use ethers::types::{
    Address,
    U256,
};

const MAX_ERRORS: usize = 50;

/// The game snapshot plus the sequence number of the reading it came from.
#[derive(Debug, Default)]
pub struct GameView {
    snapshot: GameSnapshot,
    applied_seq: u64,
}

impl GameView {
    pub fn snapshot(&self) -> &GameSnapshot {
        &self.snapshot
    }

    pub fn applied_seq(&self) -> u64 {
        self.applied_seq
    }

    /// Applies a reading only if it was issued after the one currently shown.
    /// Reconciliation runs against the snapshot as it is now, not as it was
    /// when the reading was requested.
    pub fn commit(&mut self, reading: &PollReading) -> bool {
        if reading.seq <= self.applied_seq {
            return false;
        }
        self.snapshot = self.snapshot.reconcile(reading.started, &reading.game);
        self.applied_seq = reading.seq;
        true
    }
}

/// What the action area offers, checked in priority order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionPanel {
    Connect,
    Loading,
    Resolving,
    Join { entry_fee: U256 },
    StartForm,
    Idle,
}

impl ActionPanel {
    pub fn label(&self) -> String {
        match self {
            ActionPanel::Connect => "Connect your wallet".to_string(),
            ActionPanel::Loading => "Loading...".to_string(),
            ActionPanel::Resolving => "Choosing winner...".to_string(),
            ActionPanel::Join { entry_fee } => {
                format!("Join Game ({} ETH)", display_ether(*entry_fee))
            }
            ActionPanel::StartForm => "Start Game".to_string(),
            ActionPanel::Idle => String::new(),
        }
    }
}

pub fn action_panel(session: &WalletSession, busy: bool, snapshot: &GameSnapshot) -> ActionPanel {
    if !session.connected {
        ActionPanel::Connect
    } else if busy {
        ActionPanel::Loading
    } else if snapshot.is_resolving() {
        ActionPanel::Resolving
    } else if snapshot.started {
        ActionPanel::Join {
            entry_fee: snapshot.entry_fee,
        }
    } else if session.is_owner {
        ActionPanel::StartForm
    } else {
        ActionPanel::Idle
    }
}

/// Everything the UI renders. Owned and mutated only by the app loop.
#[derive(Debug)]
pub struct ViewState {
    pub session: WalletSession,
    pub busy: bool,
    pub status: String,
    pub errors: Vec<String>,
    pub alert: Option<String>,
    pub last_updated: Option<DateTime<Local>>,
    game: GameView,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            session: WalletSession::default(),
            busy: false,
            status: "Press c to connect your wallet".to_string(),
            errors: Vec::new(),
            alert: None,
            last_updated: None,
            game: GameView::default(),
        }
    }
}

impl ViewState {
    pub fn snapshot(&self) -> &GameSnapshot {
        self.game.snapshot()
    }

    pub fn action_panel(&self) -> ActionPanel {
        action_panel(&self.session, self.busy, self.game.snapshot())
    }

    pub fn signer(&self) -> Option<Address> {
        self.session.signer_address
    }

    pub fn commit_reading(&mut self, reading: &PollReading) -> bool {
        let applied = self.game.commit(reading);
        if applied {
            self.last_updated = Some(Local::now());
        }
        applied
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        if self.errors.len() > MAX_ERRORS {
            let excess = self.errors.len() - MAX_ERRORS;
            self.errors.drain(..excess);
        }
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }

    pub fn on_connecting(&mut self) {
        self.set_status("Unlocking wallet...");
    }

    pub fn on_connected(&mut self, session: WalletSession) {
        let address = session
            .signer_address
            .map(|a| crate::game::display_address(&a))
            .unwrap_or_default();
        self.session = session;
        self.clear_errors();
        self.set_status(format!("Connected as {address}"));
    }

    /// The session stays disconnected whatever went wrong.
    pub fn on_connect_failed(&mut self, err: &ConnectError) {
        self.session = WalletSession::default();
        match err {
            ConnectError::Declined => self.set_status("Wallet connection cancelled"),
            _ => {
                self.set_status("Wallet not connected");
                self.push_error(err.to_string());
            }
        }
        if let Some(alert) = err.alert() {
            self.alert = Some(alert);
        }
    }

    pub fn on_ownership(&mut self, is_owner: bool) {
        if self.session.connected {
            self.session.is_owner = is_owner;
        }
    }

    pub fn on_action(&mut self, event: &ActionEvent) {
        match event {
            ActionEvent::Submitted { request, tx_hash } => {
                self.busy = true;
                self.set_status(format!("Submitted {request}: {tx_hash:?}"));
            }
            ActionEvent::Finished { request, outcome } => {
                self.busy = false;
                match outcome {
                    Ok(receipt) => {
                        let block = receipt
                            .block_number
                            .map(|b| format!(" in block {b}"))
                            .unwrap_or_default();
                        let gas = receipt
                            .gas_used
                            .map(|g| format!(" (gas used {g})"))
                            .unwrap_or_default();
                        self.set_status(format!("Confirmed {request}{block}{gas}"));
                    }
                    Err(msg) => {
                        self.set_status(format!("{request} failed"));
                        self.push_error(msg.clone());
                    }
                }
            }
        }
    }
}
