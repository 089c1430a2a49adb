//! Fixed-step tick loop with accumulator semantics.
//!
//! RULE: Wall-clock time only decides *how many* ticks run, never *what*
//! a tick computes. Each tick receives its own tick-scoped RandomSource
//! (`tick:<n>` namespace), so replaying through `advance_by` yields the
//! same states as a paced `run`.
//!
//! `run` is the only place the kernel may suspend, and it does so on the
//! calling thread through the injected sleep function.

use std::time::{Duration, Instant};

use crate::{
    clock::{TickClock, TimeProvider},
    error::{SimError, SimResult},
    rng::RandomSource,
    types::Tick,
};

/// Absorbs floating error when comparing the accumulator to one tick.
pub const ACCUMULATOR_EPSILON: f64 = 1e-12;

/// Monotonic seconds source.
pub type TimeSource = Box<dyn FnMut() -> f64 + Send>;

/// Suspends the calling thread for the given number of seconds.
pub type SleepFn = Box<dyn FnMut(f64) + Send>;

pub struct TickLoop {
    clock:         TickClock,
    rng:           RandomSource,
    tick_duration: f64,
    accumulator:   f64,
    last_time:     f64,
    time_source:   TimeSource,
    sleep:         SleepFn,
}

impl TickLoop {
    pub fn new(rng: RandomSource, tick_duration: f64) -> SimResult<Self> {
        if !tick_duration.is_finite() || tick_duration <= 0.0 {
            return Err(SimError::config(format!(
                "TickLoop requires a positive tick_duration, got {tick_duration}"
            )));
        }
        let start = Instant::now();
        let mut time_source: TimeSource = Box::new(move || start.elapsed().as_secs_f64());
        let last_time = time_source();
        Ok(Self {
            clock: TickClock::new(),
            rng,
            tick_duration,
            accumulator: 0.0,
            last_time,
            time_source,
            sleep: Box::new(|secs| std::thread::sleep(Duration::from_secs_f64(secs.max(0.0)))),
        })
    }

    pub fn with_time_source(mut self, mut source: TimeSource) -> Self {
        self.last_time = source();
        self.time_source = source;
        self
    }

    pub fn with_sleep(mut self, sleep: SleepFn) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    pub fn current_tick(&self) -> Tick {
        self.clock.current_tick()
    }

    pub fn tick_duration(&self) -> f64 {
        self.tick_duration
    }

    /// Seconds accumulated but not yet turned into a tick.
    pub fn pending(&self) -> f64 {
        self.accumulator
    }

    /// Rewind or fast-forward the counter, e.g. after a save is loaded.
    /// Discards any pending time.
    pub fn reset_to(&mut self, tick: Tick) {
        self.clock = TickClock::starting_at(tick);
        self.accumulator = 0.0;
    }

    /// Feed `elapsed` seconds into the accumulator and process every
    /// whole tick that fits. Returns the number of ticks processed.
    pub fn advance_by<F>(&mut self, elapsed: f64, handler: F) -> SimResult<u64>
    where
        F: FnMut(Tick, &RandomSource) -> SimResult<()>,
    {
        self.feed(elapsed)?;
        self.drain(None, handler)
    }

    /// Process exactly one tick without touching the accumulator.
    /// Deterministic fast-forward and replay go through here.
    pub fn tick_once<F>(&mut self, mut handler: F) -> SimResult<Tick>
    where
        F: FnMut(Tick, &RandomSource) -> SimResult<()>,
    {
        self.fire(&mut handler)
    }

    /// Sample the time source once and forward the elapsed delta.
    pub fn step<F>(&mut self, handler: F) -> SimResult<u64>
    where
        F: FnMut(Tick, &RandomSource) -> SimResult<()>,
    {
        let delta = self.sample_elapsed();
        self.advance_by(delta, handler)
    }

    /// Block until exactly `ticks` ticks have been processed, sleeping
    /// for the remainder of the current tick whenever nothing is pending.
    pub fn run<F>(&mut self, ticks: u64, mut handler: F) -> SimResult<()>
    where
        F: FnMut(Tick, &RandomSource) -> SimResult<()>,
    {
        let mut processed = 0u64;
        while processed < ticks {
            let delta = self.sample_elapsed();
            self.feed(delta)?;
            processed += self.drain(Some(ticks - processed), &mut handler)?;
            if processed < ticks && self.accumulator + ACCUMULATOR_EPSILON < self.tick_duration {
                let remaining = self.tick_duration - self.accumulator;
                (self.sleep)(remaining);
            }
        }
        Ok(())
    }

    fn sample_elapsed(&mut self) -> f64 {
        let now = (self.time_source)();
        let delta = (now - self.last_time).max(0.0);
        self.last_time = now;
        delta
    }

    fn feed(&mut self, elapsed: f64) -> SimResult<()> {
        if !elapsed.is_finite() || elapsed < 0.0 {
            return Err(SimError::InvalidAdvance { elapsed });
        }
        self.accumulator += elapsed;
        Ok(())
    }

    fn drain<F>(&mut self, limit: Option<u64>, mut handler: F) -> SimResult<u64>
    where
        F: FnMut(Tick, &RandomSource) -> SimResult<()>,
    {
        let mut processed = 0u64;
        while self.accumulator + ACCUMULATOR_EPSILON >= self.tick_duration {
            if limit.is_some_and(|max| processed >= max) {
                break;
            }
            self.fire(&mut handler)?;
            self.accumulator -= self.tick_duration;
            processed += 1;
        }
        Ok(processed)
    }

    /// Advance the clock by one tick and run the handler. On handler error
    /// the clock is put back so the failed tick can be retried.
    fn fire<F>(&mut self, handler: &mut F) -> SimResult<Tick>
    where
        F: FnMut(Tick, &RandomSource) -> SimResult<()>,
    {
        let previous = self.clock.clone();
        let tick = self.clock.advance(1);
        let tick_rng = self.rng.namespaced(&format!("tick:{tick}"));
        if let Err(e) = handler(tick, &tick_rng) {
            self.clock = previous;
            return Err(e);
        }
        Ok(tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};

    fn noop(_: Tick, _: &RandomSource) -> SimResult<()> {
        Ok(())
    }

    fn new_loop(duration: f64) -> TickLoop {
        TickLoop::new(RandomSource::new(42), duration).unwrap()
    }

    #[test]
    fn rejects_non_positive_duration() {
        assert!(TickLoop::new(RandomSource::new(1), 0.0).is_err());
        assert!(TickLoop::new(RandomSource::new(1), -1.0).is_err());
    }

    #[test]
    fn negative_and_non_finite_advances_are_rejected() {
        let mut tick_loop = new_loop(0.5);
        for elapsed in [-0.1, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut calls = 0u32;
            let err = tick_loop
                .advance_by(elapsed, |_, _| {
                    calls += 1;
                    Ok(())
                })
                .unwrap_err();
            assert!(matches!(err, SimError::InvalidAdvance { .. }), "{elapsed} gave {err:?}");
            assert_eq!(calls, 0);
        }
        assert_eq!(tick_loop.current_tick(), 0);
        assert_eq!(tick_loop.pending(), 0.0);
    }

    #[test]
    fn accumulates_partial_ticks() {
        let mut tick_loop = new_loop(0.5);
        assert_eq!(tick_loop.advance_by(0.25, noop).unwrap(), 0);
        assert_eq!(tick_loop.advance_by(0.25, noop).unwrap(), 1);
        assert_eq!(tick_loop.advance_by(1.75, noop).unwrap(), 3);
        assert_eq!(tick_loop.current_tick(), 4);
        assert!((tick_loop.pending() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn handler_sees_consecutive_ticks_and_scoped_rng() {
        let mut tick_loop = new_loop(1.0);
        let mut seen = Vec::new();
        tick_loop
            .advance_by(3.0, |tick, rng| {
                seen.push((tick, rng.seed()));
                Ok(())
            })
            .unwrap();
        let root = RandomSource::new(42);
        let expected: Vec<_> = (1..=3)
            .map(|t| (t, root.namespaced(&format!("tick:{t}")).seed()))
            .collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn step_forwards_sampled_delta() {
        let now = Arc::new(Mutex::new(0.0f64));
        let source_now = Arc::clone(&now);
        let mut tick_loop = new_loop(0.5)
            .with_time_source(Box::new(move || *source_now.lock().unwrap()));
        *now.lock().unwrap() = 1.2;
        assert_eq!(tick_loop.step(noop).unwrap(), 2);
        *now.lock().unwrap() = 1.6;
        assert_eq!(tick_loop.step(noop).unwrap(), 1);
    }

    #[test]
    fn run_sleeps_between_ticks_and_stops_at_target() {
        let now = Arc::new(Mutex::new(0.0f64));
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let (source_now, sleep_now, sleep_log) =
            (Arc::clone(&now), Arc::clone(&now), Arc::clone(&sleeps));
        let mut tick_loop = new_loop(0.5)
            .with_time_source(Box::new(move || *source_now.lock().unwrap()))
            .with_sleep(Box::new(move |secs| {
                *sleep_now.lock().unwrap() += secs;
                sleep_log.lock().unwrap().push(secs);
            }));

        let mut ticks = Vec::new();
        tick_loop
            .run(4, |tick, _| {
                ticks.push(tick);
                Ok(())
            })
            .unwrap();

        assert_eq!(ticks, vec![1, 2, 3, 4]);
        assert_eq!(sleeps.lock().unwrap().len(), 4);
    }

    #[test]
    fn run_never_overshoots() {
        let now = Arc::new(Mutex::new(0.0f64));
        let source_now = Arc::clone(&now);
        let mut tick_loop = new_loop(0.5)
            .with_time_source(Box::new(move || *source_now.lock().unwrap()));
        *now.lock().unwrap() = 10.0;
        let mut count = 0;
        tick_loop
            .run(3, |_, _| {
                count += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(tick_loop.current_tick(), 3);
    }

    #[test]
    fn handler_error_propagates() {
        let mut tick_loop = new_loop(1.0);
        let err = tick_loop
            .advance_by(2.0, |_, _| Err(SimError::config("boom")))
            .unwrap_err();
        assert!(matches!(err, SimError::Configuration { .. }));
        assert_eq!(tick_loop.current_tick(), 0);
    }

    #[test]
    fn tick_once_ignores_pending_time() {
        let mut tick_loop = new_loop(0.5);
        tick_loop.advance_by(0.3, noop).unwrap();
        let tick = tick_loop.tick_once(noop).unwrap();
        assert_eq!(tick, 1);
        assert!((tick_loop.pending() - 0.3).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn accumulation_is_split_insensitive(
            n in 0u64..60,
            weights in proptest::collection::vec(1u32..10, 1..12),
        ) {
            let duration = 0.25;
            let total = n as f64 * duration;

            let mut whole = new_loop(duration);
            let whole_count = whole.advance_by(total, noop).unwrap();

            let mut split = new_loop(duration);
            let weight_sum: u32 = weights.iter().sum();
            let mut delivered = 0.0;
            let mut split_count = 0;
            for (i, w) in weights.iter().enumerate() {
                let piece = if i + 1 == weights.len() {
                    total - delivered
                } else {
                    total * (*w as f64) / (weight_sum as f64)
                };
                delivered += piece;
                split_count += split.advance_by(piece.max(0.0), noop).unwrap();
            }

            prop_assert_eq!(whole_count, n);
            prop_assert_eq!(split_count, n);
        }
    }
}
