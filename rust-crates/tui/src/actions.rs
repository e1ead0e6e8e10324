use crate::{
    chain::{
        GameWriter,
        TxReceipt,
    },
    game::display_ether,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use ethers::{
    types::{
        TxHash,
        U256,
    },
    utils::parse_ether,
};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{
    error,
    info,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionRequest {
    StartGame { max_players: u8, entry_fee: U256 },
    JoinGame { entry_fee: U256 },
}

impl fmt::Display for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionRequest::StartGame {
                max_players,
                entry_fee,
            } => write!(
                f,
                "start game ({max_players} players, {} ETH)",
                display_ether(*entry_fee)
            ),
            ActionRequest::JoinGame { entry_fee } => {
                write!(f, "join game ({} ETH)", display_ether(*entry_fee))
            }
        }
    }
}

#[derive(Debug)]
pub enum ActionEvent {
    /// The wallet accepted the transaction; the UI should show loading.
    Submitted {
        request: ActionRequest,
        tx_hash: TxHash,
    },
    /// Terminal event for every request, whether or not it was submitted.
    Finished {
        request: ActionRequest,
        outcome: Result<TxReceipt, String>,
    },
}

/// Submits the request, then waits for it to be mined, reporting each phase.
/// Failures are logged and reported, never propagated.
pub async fn run_action<W: GameWriter>(
    writer: &W,
    request: ActionRequest,
    events: &mpsc::UnboundedSender<ActionEvent>,
) {
    let submitted = match &request {
        ActionRequest::StartGame {
            max_players,
            entry_fee,
        } => writer.start_game(*max_players, *entry_fee).await,
        ActionRequest::JoinGame { entry_fee } => writer.join_game(*entry_fee).await,
    };
    let tx_hash = match submitted {
        Ok(tx_hash) => tx_hash,
        Err(err) => {
            error!(?err, %request, "transaction submission failed");
            let _ = events.send(ActionEvent::Finished {
                request,
                outcome: Err(format!("{err:#}")),
            });
            return;
        }
    };
    info!(?tx_hash, %request, "transaction submitted");
    let _ = events.send(ActionEvent::Submitted {
        request: request.clone(),
        tx_hash,
    });

    let outcome = writer.wait_mined(tx_hash).await;
    match &outcome {
        Ok(receipt) => info!(?tx_hash, block = ?receipt.block_number, %request, "transaction mined"),
        Err(err) => error!(?err, ?tx_hash, %request, "transaction failed"),
    }
    let _ = events.send(ActionEvent::Finished {
        request,
        outcome: outcome.map_err(|err| format!("{err:#}")),
    });
}

/// Entry fee typed in ether. Negative or blank input means zero.
pub fn parse_entry_fee(input: &str) -> Result<U256> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') {
        return Ok(U256::zero());
    }
    parse_ether(trimmed).map_err(|e| eyre!("invalid entry fee {trimmed:?}: {e}"))
}

pub fn parse_max_players(input: &str) -> Result<u8> {
    let trimmed = input.trim();
    let value: u8 = trimmed
        .parse()
        .map_err(|_| eyre!("max players must be a whole number between 1 and 255"))?;
    if value == 0 {
        return Err(eyre!("max players must be at least 1"));
    }
    Ok(value)
}
