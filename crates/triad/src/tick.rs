//! # Tick Loop
//!
//! Fixed-timestep pacing shared by the game thread (simulation ticks) and
//! the render thread (frames).
//!
//! ```text
//!   while running:
//!       while should_tick():          catch up after a slow tick
//!           start = begin_tick()
//!           ... work ...
//!           end_tick(start)
//!       wait_for_next_tick()
//! ```

use std::time::{Duration, Instant};

/// Most ticks run back to back after a stall before the backlog is dropped.
const MAX_CATCH_UP_TICKS: u32 = 5;

/// Fixed-timestep tick controller.
pub struct TickLoop {
    tick_duration: Duration,
    last_tick: Instant,
    accumulator: Duration,
    tick_count: u64,
    stats: TickStats,
}

/// Tick timing statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickStats {
    /// Shortest tick observed.
    pub min_tick_us: u64,
    /// Longest tick observed.
    pub max_tick_us: u64,
    /// Rolling average.
    pub avg_tick_us: u64,
    /// Ticks that overran their budget.
    pub late_ticks: u64,
    /// Ticks measured.
    pub total_ticks: u64,
}

impl TickStats {
    fn fresh(tick_duration: Duration) -> Self {
        Self {
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            avg_tick_us: duration_us(tick_duration),
            late_ticks: 0,
            total_ticks: 0,
        }
    }
}

impl TickLoop {
    /// Creates a loop ticking `rate` times per second. A rate of zero is
    /// treated as one.
    #[must_use]
    pub fn new(rate: u32) -> Self {
        let tick_duration = Duration::from_micros(1_000_000 / u64::from(rate.max(1)));
        Self {
            tick_duration,
            last_tick: Instant::now(),
            accumulator: Duration::ZERO,
            tick_count: 0,
            stats: TickStats::fresh(tick_duration),
        }
    }

    /// Whether a tick is due. Call until it returns false.
    #[must_use]
    pub fn should_tick(&mut self) -> bool {
        let now = Instant::now();
        self.accumulator += now.duration_since(self.last_tick);
        self.last_tick = now;

        let backlog = self.tick_duration * MAX_CATCH_UP_TICKS;
        if self.accumulator > backlog {
            tracing::debug!(dropped_us = duration_us(self.accumulator - backlog), "tick backlog dropped");
            self.accumulator = backlog;
        }
        self.accumulator >= self.tick_duration
    }

    /// Marks the start of a tick.
    #[must_use]
    pub fn begin_tick(&mut self) -> Instant {
        self.accumulator = self.accumulator.saturating_sub(self.tick_duration);
        self.tick_count += 1;
        Instant::now()
    }

    /// Marks the end of a tick and records its duration.
    pub fn end_tick(&mut self, start: Instant) {
        let duration = start.elapsed();
        let us = duration_us(duration);

        let stats = &mut self.stats;
        stats.total_ticks += 1;
        stats.min_tick_us = stats.min_tick_us.min(us);
        stats.max_tick_us = stats.max_tick_us.max(us);
        stats.avg_tick_us = (stats.avg_tick_us * 15 + us) / 16;

        if duration > self.tick_duration {
            stats.late_ticks += 1;
        }
    }

    /// Sleeps until the next tick is due. Never sleeps past `max_wait`, so
    /// the caller can keep polling its inbox.
    pub fn wait_for_next_tick(&self, max_wait: Duration) {
        let remaining = self
            .tick_duration
            .saturating_sub(self.accumulator + self.last_tick.elapsed());
        if !remaining.is_zero() {
            std::thread::sleep(remaining.min(max_wait));
        }
    }

    /// Ticks executed so far.
    #[inline]
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Timing statistics.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Target tick duration.
    #[inline]
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    /// Target tick duration in seconds.
    #[inline]
    #[must_use]
    pub fn delta_seconds(&self) -> f32 {
        self.tick_duration.as_secs_f32()
    }

    /// Clears the statistics.
    pub fn reset_stats(&mut self) {
        self.stats = TickStats::fresh(self.tick_duration);
    }
}

impl Default for TickLoop {
    fn default() -> Self {
        Self::new(60)
    }
}

/// Millisecond clock for ownership stamps, counted from an origin taken
/// when the engine starts.
///
/// Stamps are `u32`; starting from the session origin instead of the Unix
/// epoch keeps them from wrapping mid-session. The reading saturates at
/// `u32::MAX` after about 49 days of uptime, so it never goes backwards.
#[derive(Clone, Copy, Debug)]
pub struct NetworkClock {
    origin: Instant,
}

impl NetworkClock {
    /// A clock whose zero is now.
    #[must_use]
    pub fn start() -> Self {
        Self::since(Instant::now())
    }

    /// A clock whose zero is `origin`.
    #[must_use]
    pub const fn since(origin: Instant) -> Self {
        Self { origin }
    }

    /// Milliseconds since the origin.
    #[must_use]
    pub fn now_ms(&self) -> u32 {
        u32::try_from(self.origin.elapsed().as_millis()).unwrap_or(u32::MAX)
    }
}

impl Default for NetworkClock {
    fn default() -> Self {
        Self::start()
    }
}

fn duration_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}
