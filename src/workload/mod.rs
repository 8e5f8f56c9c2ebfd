//! Converts MapReduce application names to actual application code.
//!
//! # Example
//!
//! ```
//! # use anyhow::Result;
//! use mrseason::workload;
//! # fn main() -> Result<()> {
//! let app = workload::named("season-goals")?;
//! assert!(app.combine_fn.is_some());
//! # Ok(())
//! # }
//! ```

use crate::{key, Workload};
use anyhow::{bail, Result};

pub mod season_goals;

/// Gets the [`Workload`] named `name`.
///
/// Returns [`None`] if no application with the given name was found.
pub fn try_named(name: &str) -> Option<Workload> {
    match name {
        "season-goals" => Some(Workload {
            map_fn: season_goals::map,
            combine_fn: Some(season_goals::combine),
            reduce_fn: season_goals::reduce,
            compare_fn: key::compare_encoded,
        }),
        _ => None,
    }
}

/// Gets the [`Workload`] named `name`.
///
/// Returns an [`anyhow::Error`] if no application with the given name was found.
pub fn named(name: &str) -> Result<Workload> {
    match try_named(name) {
        Some(app) => Ok(app),
        None => bail!("No app named `{}` found.", name),
    }
}
