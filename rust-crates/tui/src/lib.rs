pub mod actions;
pub mod chain;
pub mod config;
pub mod game;
pub mod indexer_client;
pub mod session;
pub mod sync;
pub mod view;
pub mod wallets;

pub use generated_abi::RandomWinnerGame;
