//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Cumulative random-walk history series."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use rand::Rng;
use tracing::trace;

use crate::range::GenerationPlan;
use crate::rng::SharedRng;

/// Which consumption history is being synthesised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesKind {
    Individual,
    Group,
}

impl SeriesKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesKind::Individual => "individual",
            SeriesKind::Group => "group",
        }
    }
}

/// Fills a [`GenerationPlan`] with a monotonically increasing random walk.
#[derive(Debug, Clone, Default)]
pub struct SeriesGenerator {
    rng: SharedRng,
}

impl SeriesGenerator {
    pub fn new(rng: SharedRng) -> Self {
        Self { rng }
    }

    /// One point per tic; each point adds a draw from `[0, step_scale)` to the
    /// previous one, starting from zero.
    pub fn generate(&self, plan: &GenerationPlan, step_scale: f64) -> Vec<f64> {
        let count = plan.point_count() as usize;
        trace!(count, step_scale, "generating history series");
        self.rng.with(|rng| cumulative_walk(rng, count, step_scale))
    }
}

/// Cumulative walk over `count` steps of `[0, step_scale)` increments.
pub fn cumulative_walk<R: Rng + ?Sized>(rng: &mut R, count: usize, step_scale: f64) -> Vec<f64> {
    let mut total = 0.0_f64;
    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        let delta = (rng.gen::<f64>() * step_scale).max(0.0);
        total += delta;
        points.push(total);
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::RangeValidator;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn plan(tics: &str) -> GenerationPlan {
        RangeValidator::default()
            .validate("2024-01-01T00:00:00Z", "2024-01-01T00:00:10Z", tics)
            .unwrap()
    }

    #[test]
    fn length_matches_plan() {
        let generator = SeriesGenerator::new(SharedRng::from_seed(1));
        let values = generator.generate(&plan("2"), 10.0);
        assert_eq!(values.len(), 5);
    }

    #[test]
    fn empty_plan_yields_empty_series() {
        let generator = SeriesGenerator::default();
        let plan = RangeValidator::default()
            .validate("2024-01-01T00:00:00Z", "2024-01-01T00:00:00Z", "5")
            .unwrap();
        assert!(generator.generate(&plan, 10.0).is_empty());
    }

    #[test]
    fn steps_stay_inside_the_scale_envelope() {
        let generator = SeriesGenerator::new(SharedRng::from_seed(99));
        let values = generator.generate(&plan("1"), 10.0);
        let mut previous = 0.0;
        for value in values {
            let step = value - previous;
            assert!((0.0..=10.0).contains(&step), "step {step} outside [0, 10]");
            previous = value;
        }
    }

    #[test]
    fn group_scale_grows_faster_on_average() {
        let rng = SharedRng::from_seed(2024);
        let generator = SeriesGenerator::new(rng);
        let plan = RangeValidator::default()
            .validate("2024-01-01T00:00:00Z", "2024-01-01T02:46:40Z", "1")
            .unwrap();
        let individual = generator.generate(&plan, 10.0);
        let group = generator.generate(&plan, 100.0);
        let n = plan.point_count() as f64;
        // Mean step is scale / 2; 10k samples keep the mean well within 10%.
        let individual_mean = individual.last().copied().unwrap() / n;
        let group_mean = group.last().copied().unwrap() / n;
        assert!((individual_mean - 5.0).abs() < 0.5, "{individual_mean}");
        assert!((group_mean - 50.0).abs() < 5.0, "{group_mean}");
    }

    proptest! {
        #[test]
        fn walk_is_non_decreasing_and_non_negative(
            seed in any::<u64>(),
            count in 0usize..2_000,
            scale in 0.0f64..1_000.0,
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let values = cumulative_walk(&mut rng, count, scale);
            prop_assert_eq!(values.len(), count);
            let mut previous = 0.0;
            for value in values {
                prop_assert!(value >= previous);
                previous = value;
            }
        }
    }
}
