//! Average goals scored per team per season.
//!
//! Input lines look like
//! `match_id,home_team_id,away_team_id,home_score,away_score,date,...`;
//! each result yields one observation for the home side and one for the
//! away side, keyed by `(team, season)`. Seasons roll over in August.

use crate::*;
use anyhow::Result;
use bytes::Bytes;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const HOME_ID: usize = 1;
const AWAY_ID: usize = 2;
const HOME_GOALS: usize = 3;
const AWAY_GOALS: usize = 4;
const DATE: usize = 5;
const MIN_FIELDS: usize = 6;

/// First month that counts towards the following season.
const SEASON_ROLLOVER_MONTH: u32 = 8;

#[derive(Parser, Debug, Default, Clone, Serialize, Deserialize)]
#[clap(no_binary_name = true)]
pub struct Args {
    /// Record the away side's goals under the home team id, reproducing
    /// the output of the first version of this job.
    #[clap(long)]
    pub legacy_away_key: bool,
}

impl Args {
    /// Parses the JSON-encoded argument list handed to every task.
    pub fn from_aux(aux: &[u8]) -> Result<Self> {
        if aux.is_empty() {
            return Ok(Self::default());
        }
        let argv = serde_json::from_slice::<Vec<String>>(aux)?;
        Ok(Self::try_parse_from(argv)?)
    }
}

/// One parsed match result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub home_id: String,
    pub away_id: String,
    pub home_goals: u64,
    pub away_goals: u64,
    pub season: i32,
}

impl MatchRecord {
    pub fn parse(line: &str) -> crate::Result<Self> {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < MIN_FIELDS {
            return Err(Error::record_parse(format!(
                "expected at least {MIN_FIELDS} fields, found {}",
                fields.len()
            )));
        }
        Ok(Self {
            home_id: entity(fields[HOME_ID], "home team")?,
            away_id: entity(fields[AWAY_ID], "away team")?,
            home_goals: goals(fields[HOME_GOALS], "home score")?,
            away_goals: goals(fields[AWAY_GOALS], "away score")?,
            season: season_of(fields[DATE])?,
        })
    }

    /// The home and away observations, in that order.
    pub fn observations(&self, legacy_away_key: bool) -> [(CompositeKey, PartialObservation); 2] {
        let away_id = if legacy_away_key {
            &self.home_id
        } else {
            &self.away_id
        };
        [
            (
                CompositeKey::new(self.home_id.as_str(), self.season),
                PartialObservation::single(self.home_goals),
            ),
            (
                CompositeKey::new(away_id.as_str(), self.season),
                PartialObservation::single(self.away_goals),
            ),
        ]
    }
}

/// Team ids are opaque: taken byte for byte, so `"A "` and `"A"` are
/// different teams. Only an empty field is rejected.
fn entity(field: &str, what: &str) -> crate::Result<String> {
    if field.is_empty() {
        return Err(Error::record_parse(format!("empty {what} id")));
    }
    Ok(field.to_string())
}

/// Scores must be bare non-negative integers; surrounding whitespace is an
/// error.
fn goals(field: &str, what: &str) -> crate::Result<u64> {
    field
        .parse()
        .map_err(|e| Error::record_parse(format!("bad {what} `{field}`: {e}")))
}

/// Season a match date belongs to: the year, plus one from August onwards.
///
/// Only the `YYYY-MM` prefix is read, so full timestamps such as
/// `2018-03-19T16:15` are accepted.
pub fn season_of(date: &str) -> crate::Result<i32> {
    let date = date.trim();
    let mut parts = date.split('-');
    let year = parts.next().unwrap_or_default();
    let month = parts
        .next()
        .ok_or_else(|| Error::record_parse(format!("date `{date}` has no month")))?;

    let year: i32 = year
        .parse()
        .map_err(|e| Error::record_parse(format!("bad year in `{date}`: {e}")))?;
    let month: u32 = month
        .parse()
        .map_err(|e| Error::record_parse(format!("bad month in `{date}`: {e}")))?;
    if !(1..=12).contains(&month) {
        return Err(Error::record_parse(format!("month {month} out of range in `{date}`")));
    }

    if month >= SEASON_ROLLOVER_MONTH {
        year.checked_add(1)
            .ok_or_else(|| Error::record_parse(format!("year overflow in `{date}`")))
    } else {
        Ok(year)
    }
}

/// Map input: key is the split's byte offset within its file, value is the
/// split's text. The line at file offset 0 is the header and is dropped.
/// Lines that fail to parse are logged and skipped.
pub fn map(kv: KeyValue, aux: Bytes) -> MapOutput {
    let args = Args::from_aux(&aux)?;
    let start = utils::offset_from_bytes(&kv.key)?;

    let mut map_output = Vec::new();
    let mut offset = start;
    for raw in kv.value.split_inclusive(|b| *b == b'\n') {
        let line_offset = offset;
        offset += raw.len() as u64;
        if line_offset == 0 {
            continue;
        }

        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim_end_matches(['\n', '\r']),
            Err(e) => {
                warn!(offset = line_offset, "skipping record: invalid UTF-8: {}", e);
                continue;
            }
        };
        if line.trim().is_empty() {
            debug!(offset = line_offset, "skipping blank line");
            continue;
        }

        let record = match MatchRecord::parse(line) {
            Ok(record) => record,
            Err(e) => {
                warn!(offset = line_offset, "skipping record: {}", e);
                continue;
            }
        };
        for (key, partial) in record.observations(args.legacy_away_key) {
            map_output.push(KeyValue {
                key: key.encode(),
                value: partial.encode()?,
            });
        }
    }

    Ok(Box::new(map_output.into_iter().map(Ok)))
}

fn fold(values: Box<dyn Iterator<Item = Bytes> + '_>) -> crate::Result<PartialObservation> {
    values.map(|value| PartialObservation::decode(&value)).sum()
}

/// Merges every partial for one key into a single partial.
pub fn combine(
    _key: Bytes,
    values: Box<dyn Iterator<Item = Bytes> + '_>,
    _aux: Bytes,
) -> Result<Bytes> {
    Ok(fold(values)?.encode()?)
}

/// Formats the output row for a fully merged key:
/// `entity<TAB>season<TAB>count<TAB>average`.
pub fn finalize(key: &CompositeKey, merged: PartialObservation) -> crate::Result<String> {
    let average = merged.average().ok_or_else(|| Error::DivisionByZero {
        key: key.to_string(),
    })?;
    Ok(format!(
        "{}\t{}\t{}\t{}\n",
        key.entity_id,
        key.bucket,
        merged.count,
        utils::format_decimal(average)
    ))
}

pub fn reduce(
    key: Bytes,
    values: Box<dyn Iterator<Item = Bytes> + '_>,
    _aux: Bytes,
) -> Result<Bytes> {
    let key = CompositeKey::decode(&key)?;
    let merged = fold(values)?;
    Ok(utils::string_to_bytes(finalize(&key, merged)?))
}
