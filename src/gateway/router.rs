//! Request classification for the strangler fig gateway.
//!
//! Every request is assigned to exactly one upstream origin based on its path
//! prefix. Movies traffic can be split between the monolith and the movies
//! service by a per-request random roll, so the split converges in aggregate
//! rather than sticking to a caller.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::MigrationConfig;

pub const MOVIES_PREFIX: &str = "/api/movies";
pub const EVENTS_PREFIX: &str = "/api/events";

/// Upstream origins the gateway can forward to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Monolith,
    MoviesService,
    EventsService,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Monolith => "monolith",
            Origin::MoviesService => "movies-service",
            Origin::EventsService => "events-service",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of migration rolls, uniform integers in [0, 100).
pub trait MigrationRoll: Send + Sync {
    fn roll(&self) -> u32;
}

/// Production roll source: a `StdRng` seeded once at startup.
pub struct SeededRoll {
    rng: Mutex<StdRng>,
}

impl SeededRoll {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl MigrationRoll for SeededRoll {
    fn roll(&self) -> u32 {
        // A poisoned lock still holds a usable generator.
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.gen_range(0..100)
    }
}

/// Cycles through a fixed list of rolls. Makes split ratios exact in tests.
pub struct SequenceRoll {
    rolls: Vec<u32>,
    next: AtomicUsize,
}

impl SequenceRoll {
    /// Values are reduced modulo 100. An empty list always rolls 0.
    pub fn new(rolls: Vec<u32>) -> Self {
        Self {
            rolls: rolls.into_iter().map(|r| r % 100).collect(),
            next: AtomicUsize::new(0),
        }
    }

    /// Every value in [0, 100) once, in order.
    pub fn full_cycle() -> Self {
        Self::new((0..100).collect())
    }
}

impl MigrationRoll for SequenceRoll {
    fn roll(&self) -> u32 {
        if self.rolls.is_empty() {
            return 0;
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.rolls.len();
        self.rolls[idx]
    }
}

/// Outcome of classifying one request. Lives for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub path: String,
    pub origin: Origin,
    /// Present only when a migration roll was drawn.
    pub roll: Option<u32>,
}

impl RoutingDecision {
    /// Human readable reason, used in request logs.
    pub fn reason(&self) -> String {
        match (self.origin, self.roll) {
            (Origin::MoviesService, Some(roll)) => format!("migration(roll={})", roll),
            (Origin::Monolith, Some(roll)) => format!("monolith(roll={})", roll),
            (Origin::Monolith, None) if !self.path.starts_with(MOVIES_PREFIX) => {
                "default".to_string()
            }
            _ => "prefix".to_string(),
        }
    }
}

/// Path prefix router with an injected roll source.
pub struct PathRouter {
    migration: MigrationConfig,
    roll: Box<dyn MigrationRoll>,
}

impl PathRouter {
    pub fn new(migration: MigrationConfig, roll: Box<dyn MigrationRoll>) -> Self {
        Self { migration, roll }
    }

    pub fn migration(&self) -> MigrationConfig {
        self.migration
    }

    /// Classify a request path. Movies first, then events, then the monolith.
    pub fn route(&self, path: &str) -> RoutingDecision {
        let (origin, roll) = if path.starts_with(MOVIES_PREFIX) {
            if self.migration.enabled {
                let roll = self.roll.roll();
                if roll < self.migration.percent {
                    (Origin::MoviesService, Some(roll))
                } else {
                    (Origin::Monolith, Some(roll))
                }
            } else {
                (Origin::Monolith, None)
            }
        } else if path.starts_with(EVENTS_PREFIX) {
            (Origin::EventsService, None)
        } else {
            (Origin::Monolith, None)
        };

        RoutingDecision {
            path: path.to_string(),
            origin,
            roll,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router(enabled: bool, percent: i64) -> PathRouter {
        PathRouter::new(
            MigrationConfig::new(enabled, percent),
            Box::new(SequenceRoll::full_cycle()),
        )
    }

    fn count_to(router: &PathRouter, path: &str, n: usize, origin: Origin) -> usize {
        (0..n).filter(|_| router.route(path).origin == origin).count()
    }

    #[test]
    fn test_movies_stay_on_monolith_when_migration_disabled() {
        for percent in [0, 50, 100] {
            let r = router(false, percent);
            assert_eq!(count_to(&r, "/api/movies", 300, Origin::Monolith), 300);
            assert_eq!(r.route("/api/movies/42").roll, None);
        }
    }

    #[test]
    fn test_full_migration_sends_everything_to_movies_service() {
        let r = router(true, 100);
        assert_eq!(count_to(&r, "/api/movies", 300, Origin::MoviesService), 300);
    }

    #[test]
    fn test_zero_percent_keeps_monolith() {
        let r = router(true, 0);
        assert_eq!(count_to(&r, "/api/movies", 300, Origin::Monolith), 300);
    }

    #[test]
    fn test_split_is_exact_over_a_full_cycle() {
        let r = router(true, 30);
        assert_eq!(count_to(&r, "/api/movies", 1000, Origin::MoviesService), 300);
    }

    #[test]
    fn test_strict_less_than_boundary() {
        let r = PathRouter::new(
            MigrationConfig::new(true, 40),
            Box::new(SequenceRoll::new(vec![39, 40])),
        );
        assert_eq!(r.route("/api/movies").origin, Origin::MoviesService);
        assert_eq!(r.route("/api/movies").origin, Origin::Monolith);
    }

    #[test]
    fn test_seeded_split_converges() {
        let r = PathRouter::new(
            MigrationConfig::new(true, 25),
            Box::new(SeededRoll::from_seed(7)),
        );
        let n = 10_000;
        let hits = count_to(&r, "/api/movies", n, Origin::MoviesService) as f64;
        let ratio = hits / n as f64;
        // ~5 standard deviations at p = 0.25
        assert!((ratio - 0.25).abs() < 0.025, "ratio was {}", ratio);
    }

    #[test]
    fn test_events_prefix_ignores_migration() {
        for (enabled, percent) in [(false, 0), (true, 0), (true, 100)] {
            let r = router(enabled, percent);
            assert_eq!(count_to(&r, "/api/events/movie", 100, Origin::EventsService), 100);
        }
    }

    #[test]
    fn test_other_paths_default_to_monolith() {
        let r = router(true, 100);
        for path in ["/", "/api/users", "/api/payments/1", "/movies", "/api/movie"] {
            let decision = r.route(path);
            assert_eq!(decision.origin, Origin::Monolith, "{}", path);
            assert_eq!(decision.reason(), "default");
        }
    }

    #[test]
    fn test_prefix_match_is_not_segment_aware() {
        let r = router(true, 100);
        assert_eq!(r.route("/api/moviesXYZ").origin, Origin::MoviesService);
        assert_eq!(r.route("/api/eventstream").origin, Origin::EventsService);
    }

    #[test]
    fn test_sequence_roll_wraps() {
        let roll = SequenceRoll::new(vec![5, 105]);
        assert_eq!(roll.roll(), 5);
        assert_eq!(roll.roll(), 5);
        assert_eq!(roll.roll(), 5);
        assert_eq!(SequenceRoll::new(vec![]).roll(), 0);
    }
}
