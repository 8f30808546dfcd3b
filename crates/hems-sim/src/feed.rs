//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Running state behind a live consumption/production feed."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use chrono::{DateTime, TimeDelta, Utc};
use hems_common::ReadingBounds;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::rng::SharedRng;

/// Self-sufficiency is a percentage drawn from `0..SELF_SUFFICIENCY_RANGE`.
pub const SELF_SUFFICIENCY_RANGE: u8 = 100;

/// One sample pushed to live clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveReading {
    #[serde(rename = "date")]
    pub timestamp: DateTime<Utc>,
    pub user_consumption: u64,
    pub group_consumption: u64,
    pub group_production: u64,
    pub self_sufficiency: u8,
}

/// Per-session running state.
///
/// Counters only ever grow and timestamps strictly increase, so a session
/// must own its feed and advance it sequentially.
#[derive(Debug)]
pub struct LiveFeed {
    rng: SharedRng,
    increment: ReadingBounds,
    current: LiveReading,
}

impl LiveFeed {
    /// Seed the running state with counters drawn below `initial`.
    pub fn seed(
        rng: SharedRng,
        initial: ReadingBounds,
        increment: ReadingBounds,
        now: DateTime<Utc>,
    ) -> Self {
        let current = rng.with(|rng| LiveReading {
            timestamp: now,
            user_consumption: draw_below(rng, initial.user_consumption),
            group_consumption: draw_below(rng, initial.group_consumption),
            group_production: draw_below(rng, initial.group_production),
            self_sufficiency: draw_self_sufficiency(rng),
        });
        Self {
            rng,
            increment,
            current,
        }
    }

    /// Latest state; the seed until [`LiveFeed::advance`] is first called.
    pub fn current(&self) -> &LiveReading {
        &self.current
    }

    /// Add a fresh increment to every counter, resample self-sufficiency and
    /// stamp the reading with `now`, nudged forward if the clock did not move.
    pub fn advance(&mut self, now: DateTime<Utc>) -> LiveReading {
        let previous = &self.current;
        let timestamp = if now > previous.timestamp {
            now
        } else {
            previous.timestamp + TimeDelta::microseconds(1)
        };
        let increment = self.increment;
        let next = self.rng.with(|rng| LiveReading {
            timestamp,
            user_consumption: previous
                .user_consumption
                .saturating_add(draw_below(rng, increment.user_consumption)),
            group_consumption: previous
                .group_consumption
                .saturating_add(draw_below(rng, increment.group_consumption)),
            group_production: previous
                .group_production
                .saturating_add(draw_below(rng, increment.group_production)),
            self_sufficiency: draw_self_sufficiency(rng),
        });
        self.current = next.clone();
        next
    }
}

fn draw_below<R: Rng + ?Sized>(rng: &mut R, bound: u64) -> u64 {
    rng.gen_range(0..bound.max(1))
}

fn draw_self_sufficiency<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    rng.gen_range(0..SELF_SUFFICIENCY_RANGE)
}
