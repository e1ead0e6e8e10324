use ethers::{
    types::{
        Address,
        U256,
    },
    utils::{
        format_ether,
        to_checksum,
    },
};

pub const WAITING_FOR_HOST: &str = "Waiting for host to start new game....";

/// The most recently created game, as reported by the subgraph.
///
/// A finished game record may omit its fee and player limit; only a running
/// game needs them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedGame {
    pub id: String,
    pub entry_fee: Option<U256>,
    pub max_players: Option<u8>,
    pub players: Vec<Address>,
    pub winner: Option<Address>,
}

impl IndexedGame {
    /// Fee and player limit of a running game.
    pub fn terms(&self) -> Option<(U256, u8)> {
        self.entry_fee.zip(self.max_players)
    }
}

/// View model rendered by the UI. Replaced wholesale on every committed poll.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GameSnapshot {
    pub started: bool,
    pub entry_fee: U256,
    pub max_players: u8,
    pub players: Vec<Address>,
    pub winner: Option<Address>,
    pub logs: Vec<String>,
}

impl GameSnapshot {
    /// Combines the on-chain `gameStarted` flag with the indexer record.
    ///
    /// The chain read only gates which branch applies; fee and player limit
    /// come from the indexer whenever it reports them. `players` and `started` are overwritten
    /// whichever branch fires. When the game is not running and no winner is
    /// recorded the log is cleared and the remaining fields are carried over.
    pub fn reconcile(&self, started: bool, game: &IndexedGame) -> GameSnapshot {
        let mut next = self.clone();
        if started {
            if let Some((entry_fee, max_players)) = game.terms() {
                next.entry_fee = entry_fee;
                next.max_players = max_players;
            }
            next.logs = started_logs(game, next.max_players);
        } else if let Some(winner) = game.winner {
            next.logs = ended_logs(&game.id, &winner);
            next.winner = Some(winner);
        } else {
            next.logs = Vec::new();
        }
        next.players = game.players.clone();
        next.started = started;
        next
    }

    /// Every seat is taken and the contract is waiting on randomness.
    pub fn is_resolving(&self) -> bool {
        self.started && self.players.len() == usize::from(self.max_players)
    }
}

pub fn display_address(address: &Address) -> String {
    to_checksum(address, None)
}

/// Ether amount without trailing zeros, e.g. `0.01`.
pub fn display_ether(amount: U256) -> String {
    let text = format_ether(amount);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn started_logs(game: &IndexedGame, max_players: u8) -> Vec<String> {
    let mut logs = vec![format!("Game has started with ID: {}", game.id)];
    if !game.players.is_empty() {
        logs.push(format!(
            "{} / {max_players} already joined",
            game.players.len()
        ));
        logs.extend(
            game.players
                .iter()
                .map(|player| format!("{} joined", display_address(player))),
        );
    }
    logs
}

fn ended_logs(game_id: &str, winner: &Address) -> Vec<String> {
    vec![
        format!("Last game has ended with ID: {game_id}"),
        format!("Winner is: {}", display_address(winner)),
        WAITING_FOR_HOST.to_string(),
    ]
}

#[cfg(test)]
pub(crate) mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use proptest::prelude::*;

    pub(crate) fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    pub(crate) fn arb_game(id: &str, max_players: u8, players: Vec<Address>) -> IndexedGame {
        IndexedGame {
            id: id.to_string(),
            entry_fee: Some(U256::from(1000u64)),
            max_players: Some(max_players),
            players,
            winner: None,
        }
    }

    #[test]
    fn reconcile__started_with_players__lists_count_then_each_player() {
        // given
        let (a, b) = (addr(0xaa), addr(0xbb));
        let game = arb_game("1", 4, vec![a, b]);

        // when
        let snapshot = GameSnapshot::default().reconcile(true, &game);

        // then
        assert_eq!(
            snapshot.logs,
            vec![
                "Game has started with ID: 1".to_string(),
                "2 / 4 already joined".to_string(),
                format!("{} joined", display_address(&a)),
                format!("{} joined", display_address(&b)),
            ]
        );
        assert_eq!(snapshot.players, vec![a, b]);
        assert_eq!(snapshot.max_players, 4);
        assert_eq!(snapshot.entry_fee, U256::from(1000u64));
        assert!(snapshot.started);
    }

    #[test]
    fn reconcile__started_without_players__only_announces_game() {
        // given
        let game = arb_game("7", 3, vec![]);

        // when
        let snapshot = GameSnapshot::default().reconcile(true, &game);

        // then
        assert_eq!(snapshot.logs, vec!["Game has started with ID: 7".to_string()]);
    }

    #[test]
    fn reconcile__ended_with_winner__produces_three_fixed_lines() {
        // given
        let winner = addr(0xcc);
        let previous = GameSnapshot {
            started: true,
            ..GameSnapshot::default()
        };
        let game = IndexedGame {
            winner: Some(winner),
            ..arb_game("2", 2, vec![])
        };

        // when
        let snapshot = previous.reconcile(false, &game);

        // then
        assert_eq!(
            snapshot.logs,
            vec![
                "Last game has ended with ID: 2".to_string(),
                format!("Winner is: {}", display_address(&winner)),
                "Waiting for host to start new game....".to_string(),
            ]
        );
        assert_eq!(snapshot.winner, Some(winner));
        assert!(!snapshot.started);
        assert!(snapshot.players.is_empty());
    }

    #[test]
    fn reconcile__not_started_and_no_winner__clears_logs_and_keeps_fee() {
        // given
        let previous = GameSnapshot {
            started: true,
            entry_fee: U256::from(5u64),
            max_players: 9,
            players: vec![addr(1)],
            winner: Some(addr(2)),
            logs: vec!["old".to_string()],
        };
        let game = IndexedGame {
            entry_fee: Some(U256::from(77u64)),
            ..arb_game("3", 3, vec![])
        };

        // when
        let snapshot = previous.reconcile(false, &game);

        // then
        assert!(snapshot.logs.is_empty());
        assert_eq!(snapshot.entry_fee, U256::from(5u64));
        assert_eq!(snapshot.max_players, 9);
        assert_eq!(snapshot.winner, Some(addr(2)));
        assert!(snapshot.players.is_empty());
        assert!(!snapshot.started);
    }

    #[test]
    fn reconcile__started_game__keeps_previous_winner() {
        // given
        let previous = GameSnapshot {
            winner: Some(addr(9)),
            ..GameSnapshot::default()
        };

        // when
        let snapshot = previous.reconcile(true, &arb_game("4", 2, vec![addr(1)]));

        // then
        assert_eq!(snapshot.winner, Some(addr(9)));
    }

    #[test]
    fn reconcile__ended_record_without_terms__keeps_previous_terms() {
        // given
        let winner = addr(0xcc);
        let previous = GameSnapshot {
            started: true,
            entry_fee: U256::from(1000u64),
            max_players: 4,
            ..GameSnapshot::default()
        };
        let game = IndexedGame {
            id: "2".to_string(),
            entry_fee: None,
            max_players: None,
            players: vec![],
            winner: Some(winner),
        };

        // when
        let snapshot = previous.reconcile(false, &game);

        // then
        assert_eq!(snapshot.logs.len(), 3);
        assert_eq!(snapshot.logs[0], "Last game has ended with ID: 2");
        assert_eq!(snapshot.entry_fee, U256::from(1000u64));
        assert_eq!(snapshot.max_players, 4);
    }

    #[test]
    fn display_ether__whole_and_fractional__trims_zeros() {
        // then
        assert_eq!(display_ether(U256::exp10(16)), "0.01");
        assert_eq!(display_ether(U256::exp10(18) * 10), "10");
        assert_eq!(display_ether(U256::zero()), "0");
    }

    #[test]
    fn is_resolving__full_started_game__true() {
        // given
        let snapshot =
            GameSnapshot::default().reconcile(true, &arb_game("5", 2, vec![addr(1), addr(2)]));

        // then
        assert!(snapshot.is_resolving());
    }

    #[test]
    fn is_resolving__full_but_not_started__false() {
        // given
        let snapshot = GameSnapshot {
            started: false,
            max_players: 1,
            players: vec![addr(1)],
            ..GameSnapshot::default()
        };

        // then
        assert!(!snapshot.is_resolving());
    }

    prop_compose! {
        pub(crate) fn arb_indexed_game()(
            id in 0u32..1000,
            fee in any::<u64>(),
            max_players in 1u8..8,
            player_bytes in proptest::collection::vec(any::<u8>(), 0..8),
            winner in proptest::option::of(any::<u8>()),
        ) -> IndexedGame {
            IndexedGame {
                id: id.to_string(),
                entry_fee: Some(U256::from(fee)),
                max_players: Some(max_players),
                players: player_bytes.into_iter().map(Address::repeat_byte).collect(),
                winner: winner.map(Address::repeat_byte),
            }
        }
    }

    prop_compose! {
        pub(crate) fn arb_snapshot()(
            started in any::<bool>(),
            fee in any::<u64>(),
            max_players in any::<u8>(),
            winner in proptest::option::of(any::<u8>()),
        ) -> GameSnapshot {
            GameSnapshot {
                started,
                entry_fee: U256::from(fee),
                max_players,
                players: Vec::new(),
                winner: winner.map(Address::repeat_byte),
                logs: vec!["stale".to_string()],
            }
        }
    }

    proptest! {
        #[test]
        fn reconcile__same_reading_twice__is_idempotent(
            previous in arb_snapshot(),
            started in any::<bool>(),
            game in arb_indexed_game(),
        ) {
            let once = previous.reconcile(started, &game);
            let twice = once.reconcile(started, &game);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn reconcile__not_started_with_winner__always_three_lines(
            previous in arb_snapshot(),
            game in arb_indexed_game(),
            winner in any::<u8>(),
        ) {
            let game = IndexedGame { winner: Some(Address::repeat_byte(winner)), ..game };
            let snapshot = previous.reconcile(false, &game);
            prop_assert_eq!(snapshot.logs.len(), 3);
            prop_assert_eq!(&snapshot.logs[0], &format!("Last game has ended with ID: {}", game.id));
            prop_assert!(snapshot.logs[1].starts_with("Winner is: "));
            prop_assert_eq!(snapshot.logs[2].as_str(), WAITING_FOR_HOST);
        }
    }
}
