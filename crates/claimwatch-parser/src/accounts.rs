//! Account sightings from the live player payload.

use claimwatch_types::{AccountSighting, Position};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::PayloadAnomaly;

const REQUIRED_TEXT: [&str; 3] = ["account", "name", "world"];

/// Parse the `players` array of the world payload.
///
/// Entries missing an identity field or a numeric coordinate are skipped
/// with a warning. Optional stats default to zero and the marker type to
/// `"player"`.
pub fn parse_accounts(payload: &Value) -> Result<Vec<AccountSighting>, PayloadAnomaly> {
    let players = payload
        .get("players")
        .ok_or_else(|| PayloadAnomaly::MissingKey("players".to_owned()))?
        .as_array()
        .ok_or_else(|| PayloadAnomaly::WrongShape {
            key: "players".to_owned(),
            expected: "an array",
        })?;

    let mut out = Vec::with_capacity(players.len());
    for (index, entry) in players.iter().enumerate() {
        match sighting(entry) {
            Some(s) => out.push(s),
            None => warn!(index, "skipping incomplete player entry"),
        }
    }
    debug!(
        accounts = out.len(),
        skipped = players.len().saturating_sub(out.len()),
        "player payload parsed"
    );
    Ok(out)
}

fn sighting(entry: &Value) -> Option<AccountSighting> {
    let mut text = REQUIRED_TEXT
        .iter()
        .map(|key| entry.get(*key).and_then(Value::as_str).map(str::to_owned));
    let (account, display_name, world) = (text.next()??, text.next()??, text.next()??);
    if account.trim().is_empty() {
        return None;
    }

    let position = Position::new(
        number(entry.get("x")?)?,
        number(entry.get("y")?)?,
        number(entry.get("z")?)?,
    );

    Some(AccountSighting {
        account,
        display_name,
        world,
        position,
        health: entry.get("health").and_then(number).unwrap_or(0.0),
        armor: entry.get("armor").and_then(integer).unwrap_or(0),
        sort: entry.get("sort").and_then(integer).unwrap_or(0),
        kind: entry
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("player")
            .to_owned(),
    })
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Whole number, truncating fractional input toward zero.
#[allow(clippy::cast_possible_truncation)]
fn integer(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| number(value).filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
}
