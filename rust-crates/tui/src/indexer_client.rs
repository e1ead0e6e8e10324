use crate::{
    game::IndexedGame,
    sync::GameIndexer,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use ethers::types::{
    Address,
    U256,
};
use reqwest::StatusCode;
use serde::{
    Deserialize,
    Serialize,
};
use std::time::Duration;

/// Latest game by id, newest first.
pub const FETCH_CREATED_GAME: &str = "query {
  games(orderBy: id, orderDirection: desc, first: 1) {
    id
    maxPlayers
    entryFee
    winner
    players
  }
}";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// GraphQL client for the RandomWinnerGame subgraph.
#[derive(Clone)]
pub struct IndexerClient {
    base_url: String,
    http: reqwest::Client,
}

impl IndexerClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .wrap_err("failed to build HTTP client for subgraph")?;
        Ok(Self { base_url, http })
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    pub async fn query(&self, query: &str) -> Result<Vec<u8>> {
        let res = self
            .http
            .post(self.url())
            .json(&GraphQlRequest { query })
            .send()
            .await
            .wrap_err_with(|| format!("subgraph request to {} failed", self.url()))?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .wrap_err("failed to read subgraph response body")?;
        if status != StatusCode::OK {
            let body = String::from_utf8_lossy(&bytes);
            return Err(eyre!("subgraph responded with {status}: {body}"));
        }
        Ok(bytes.to_vec())
    }
}

impl GameIndexer for IndexerClient {
    async fn latest_game(&self) -> Result<IndexedGame> {
        let body = self.query(FETCH_CREATED_GAME).await?;
        parse_latest_game(&body)
    }
}

/// Decodes a `games` query response into the newest game.
///
/// An empty result set is an error: the page has nothing to reconcile
/// against until the first game is created.
pub fn parse_latest_game(body: &[u8]) -> Result<IndexedGame> {
    let response: GraphQlResponse<GamesDto> =
        serde_json::from_slice(body).wrap_err("invalid subgraph payload")?;
    if let Some(first) = response.errors.first() {
        return Err(eyre!("subgraph query failed: {}", first.message));
    }
    let data = response
        .data
        .ok_or_else(|| eyre!("subgraph response carried no data"))?;
    let game = data
        .games
        .into_iter()
        .next()
        .ok_or_else(|| eyre!("subgraph has not indexed any games yet"))?;
    game.try_into()
}

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlErrorDto>,
}

#[derive(Deserialize)]
struct GraphQlErrorDto {
    message: String,
}

#[derive(Deserialize)]
struct GamesDto {
    games: Vec<GameDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameDto {
    id: String,
    #[serde(default)]
    max_players: Option<NumberDto>,
    #[serde(default)]
    entry_fee: Option<NumberDto>,
    winner: Option<String>,
    #[serde(default)]
    players: Option<Vec<String>>,
}

/// BigInt and Int fields arrive as strings or numbers depending on the node.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberDto {
    Int(u64),
    Text(String),
}

impl NumberDto {
    fn to_u256(&self) -> Result<U256> {
        match self {
            NumberDto::Int(n) => Ok(U256::from(*n)),
            NumberDto::Text(s) => {
                U256::from_dec_str(s).map_err(|e| eyre!("invalid number {s:?}: {e}"))
            }
        }
    }
}

impl TryFrom<GameDto> for IndexedGame {
    type Error = color_eyre::eyre::Report;

    fn try_from(dto: GameDto) -> Result<Self> {
        let max_players = dto
            .max_players
            .map(|raw| {
                let value = raw.to_u256()?;
                u8::try_from(value)
                    .map_err(|_| eyre!("maxPlayers {value} does not fit in uint8"))
            })
            .transpose()?;
        let entry_fee = dto
            .entry_fee
            .map(|raw| raw.to_u256())
            .transpose()
            .wrap_err("invalid entryFee")?;
        let winner = dto
            .winner
            .map(|w| parse_address(&w))
            .transpose()
            .wrap_err("invalid winner")?;
        let players = dto
            .players
            .unwrap_or_default()
            .iter()
            .map(|p| parse_address(p))
            .collect::<Result<Vec<_>>>()
            .wrap_err("invalid player list")?;
        Ok(IndexedGame {
            id: dto.id,
            entry_fee,
            max_players,
            players,
            winner,
        })
    }
}

fn parse_address(raw: &str) -> Result<Address> {
    raw.parse::<Address>()
        .map_err(|e| eyre!("invalid address {raw:?}: {e}"))
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    const PLAYER_A: &str = "0x00000000000000000000000000000000000000aa";
    const PLAYER_B: &str = "0x00000000000000000000000000000000000000bb";

    #[test]
    fn parse_latest_game__started_game__reads_every_field() {
        // given
        let body = format!(
            r#"{{"data":{{"games":[{{"id":"1","maxPlayers":4,"entryFee":"1000","winner":null,"players":["{PLAYER_A}","{PLAYER_B}"]}}]}}}}"#
        );

        // when
        let game = parse_latest_game(body.as_bytes()).unwrap();

        // then
        assert_eq!(game.id, "1");
        assert_eq!(game.max_players, Some(4));
        assert_eq!(game.entry_fee, Some(U256::from(1000u64)));
        assert_eq!(game.winner, None);
        assert_eq!(
            game.players,
            vec![PLAYER_A.parse::<Address>().unwrap(), PLAYER_B.parse().unwrap()]
        );
    }

    #[test]
    fn parse_latest_game__null_players_and_string_max__accepted() {
        // given
        let body = format!(
            r#"{{"data":{{"games":[{{"id":"2","maxPlayers":"2","entryFee":"10000000000000000","winner":"{PLAYER_A}","players":null}}]}}}}"#
        );

        // when
        let game = parse_latest_game(body.as_bytes()).unwrap();

        // then
        assert_eq!(game.max_players, Some(2));
        assert_eq!(game.entry_fee, Some(U256::exp10(16)));
        assert!(game.players.is_empty());
        assert_eq!(game.winner, Some(PLAYER_A.parse().unwrap()));
    }

    #[test]
    fn parse_latest_game__ended_game_without_terms__accepted() {
        // given
        let body = br#"{"data":{"games":[{"id":"2","players":[],"winner":"0x00000000000000000000000000000000000000cc"}]}}"#;

        // when
        let game = parse_latest_game(body).unwrap();

        // then
        assert_eq!(game.id, "2");
        assert_eq!(game.max_players, None);
        assert_eq!(game.entry_fee, None);
        assert!(game.players.is_empty());
        assert_eq!(
            game.winner,
            Some("0x00000000000000000000000000000000000000cc".parse().unwrap())
        );
    }

    #[test]
    fn parse_latest_game__no_games__is_an_error() {
        // when
        let result = parse_latest_game(br#"{"data":{"games":[]}}"#);

        // then
        let err = result.unwrap_err();
        assert!(err.to_string().contains("not indexed any games"));
    }

    #[test]
    fn parse_latest_game__graphql_errors__surface_first_message() {
        // when
        let result = parse_latest_game(
            br#"{"data":null,"errors":[{"message":"indexing_error"}]}"#,
        );

        // then
        assert!(result.unwrap_err().to_string().contains("indexing_error"));
    }

    #[test]
    fn parse_latest_game__oversized_max_players__rejected() {
        // when
        let result = parse_latest_game(
            br#"{"data":{"games":[{"id":"3","maxPlayers":300,"entryFee":"1","winner":null,"players":[]}]}}"#,
        );

        // then
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn query__unreachable_endpoint__error_names_the_url() {
        // given
        let client = IndexerClient::new("http://127.0.0.1:9/subgraphs/name/rwg").unwrap();

        // when
        let err = client.query(FETCH_CREATED_GAME).await.unwrap_err();

        // then
        assert!(err.to_string().contains("http://127.0.0.1:9/subgraphs/name/rwg"));
    }

    #[test]
    fn new__trailing_slash__is_trimmed() {
        // when
        let client = IndexerClient::new("http://localhost:8000/subgraphs/name/rwg/").unwrap();

        // then
        assert_eq!(client.url(), "http://localhost:8000/subgraphs/name/rwg");
    }
}
