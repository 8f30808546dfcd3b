//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Static lookup data served to the client."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

/// Energy-saving tip shown on the client dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub icon: String,
    pub headline: String,
    pub description: String,
}

/// Energy-saving goal with a progress counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub total: u32,
    pub succeeded: u32,
}

/// One row of the consumption leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitlistEntry {
    pub nick: String,
    pub position: u32,
    pub value: String,
}

/// Fixed data served verbatim by the lookup endpoints.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub hints: Vec<Hint>,
    pub challenges: Vec<Challenge>,
    pub hitlist: Vec<HitlistEntry>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            hints: default_hints(),
            challenges: default_challenges(),
            hitlist: default_hitlist(),
        }
    }
}

fn hint(icon: &str, headline: &str, description: &str) -> Hint {
    Hint {
        icon: icon.to_owned(),
        headline: headline.to_owned(),
        description: description.to_owned(),
    }
}

fn default_hints() -> Vec<Hint> {
    vec![
        hint(
            "HAIR_DRYER",
            "Don't dry your hair hot!",
            "Heating air takes a lot of energy, and drying your hair cold is kinder to it anyway.",
        ),
        hint(
            "PLUG",
            "Turn off your plugs.",
            "Devices in stand-by still draw power. Switching the plug off saves a lot of energy.",
        ),
        hint(
            "CLOTHES_DRYER",
            "Don't use a clothes dryer.",
            "Dryers are among the hungriest devices in a household, and clothes last longer when they dry in fresh air.",
        ),
    ]
}

fn default_challenges() -> Vec<Challenge> {
    [
        (
            "Quiet through the nights",
            "Can you consume less than 1 kWh five nights in a row?",
        ),
        (
            "Take it easy",
            "Can you consume less than 20 kWh for one week?",
        ),
        ("Beat yourself", "Consume less than in the last week."),
    ]
    .into_iter()
    .zip(0u32..)
    .map(|((name, description), id)| Challenge {
        id,
        name: name.to_owned(),
        description: description.to_owned(),
        total: 0,
        succeeded: 0,
    })
    .collect()
}

fn default_hitlist() -> Vec<HitlistEntry> {
    [
        ("Lisl", "1000kW"),
        ("Dieter", "1300kW"),
        ("Heinz", "1400kW"),
        ("Gunigunde", "1700kW"),
        ("Sylvia Maria Eva", "2000kW"),
        ("Y", "2400kW"),
    ]
    .into_iter()
    .zip(1u32..)
    .map(|((nick, value), position)| HitlistEntry {
        nick: nick.to_owned(),
        position,
        value: value.to_owned(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_ids_match_their_index() {
        let catalog = Catalog::default();
        assert_eq!(catalog.challenges.len(), 3);
        for (index, challenge) in catalog.challenges.iter().enumerate() {
            assert_eq!(challenge.id as usize, index);
        }
    }

    #[test]
    fn hitlist_is_ranked_from_one() {
        let positions: Vec<u32> = Catalog::default()
            .hitlist
            .iter()
            .map(|entry| entry.position)
            .collect();
        assert_eq!(positions, vec![1, 2, 3, 4, 5, 6]);
    }
}
