//! Debounce and hysteresis primitives.
//!
//! Each primitive turns a noisy per-frame sample into a stable answer. None
//! of them records anything when the caller has no sample for a frame: a
//! missing landmark is a gap, so callers simply skip the `push`/`observe`.

use anyhow::{anyhow, bail, Result};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

// ----------------------------------------------------------------------------
// Fixed-window confirmation
// ----------------------------------------------------------------------------

/// Bounded FIFO of the last N discrete samples. A value is confirmed only
/// while it fills the whole window.
#[derive(Clone, Debug)]
pub struct LevelWindow<T> {
    samples: VecDeque<T>,
    capacity: usize,
}

impl<T: PartialEq + Clone> LevelWindow<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            bail!("window size must be at least 1");
        }
        Ok(Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Record a sample and report whether it is now confirmed.
    pub fn push(&mut self, sample: T) -> bool {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.is_confirmed()
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed().is_some()
    }

    /// The value occupying every slot, if the window is full and uniform.
    pub fn confirmed(&self) -> Option<&T> {
        if self.samples.len() < self.capacity {
            return None;
        }
        let first = self.samples.front()?;
        self.samples.iter().all(|s| s == first).then_some(first)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

// ----------------------------------------------------------------------------
// Frame-count confirmation
// ----------------------------------------------------------------------------

/// Counts consecutive qualifying frames; confirms once the count exceeds
/// `threshold` and drops back to zero on the first failing frame.
#[derive(Clone, Debug)]
pub struct FrameCounter {
    count: u32,
    threshold: u32,
}

impl FrameCounter {
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold,
        }
    }

    pub fn observe(&mut self, condition: bool) -> bool {
        if condition {
            self.count = self.count.saturating_add(1);
            self.count > self.threshold
        } else {
            self.count = 0;
            false
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

// ----------------------------------------------------------------------------
// Time-window (majority vote) confirmation
// ----------------------------------------------------------------------------

pub const DEFAULT_QUEUE_SIZE: usize = 5;
pub const DEFAULT_CONFIDENCE: f64 = 0.7;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Vote {
    Below,
    Above,
    Undecided,
}

/// Votes over the last `capacity` continuous samples against an asymmetric
/// pair of thresholds.
///
/// `confidence` must lie in `(0.5, 1]`, so `Below` and `Above` can never both
/// reach it: the two fractions sum to at most one.
#[derive(Clone, Debug)]
pub struct MajorityVote {
    samples: VecDeque<f64>,
    capacity: usize,
    low: f64,
    high: f64,
    confidence: f64,
}

impl MajorityVote {
    pub fn new(capacity: usize, low: f64, high: f64, confidence: f64) -> Result<Self> {
        if capacity == 0 {
            bail!("queue_size must be at least 1");
        }
        if !(confidence > 0.5 && confidence <= 1.0) {
            return Err(anyhow!(
                "confidence must be in (0.5, 1.0], got {}",
                confidence
            ));
        }
        if low > high {
            return Err(anyhow!(
                "low threshold {} is above high threshold {}",
                low,
                high
            ));
        }
        Ok(Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            low,
            high,
            confidence,
        })
    }

    pub fn push(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Fractions of the current samples strictly below `low` and strictly
    /// above `high`.
    pub fn fractions(&self) -> (f64, f64) {
        if self.samples.is_empty() {
            return (0.0, 0.0);
        }
        let below = self.samples.iter().filter(|s| **s < self.low).count();
        let above = self.samples.iter().filter(|s| **s > self.high).count();
        let n = self.samples.len() as f64;
        (below as f64 / n, above as f64 / n)
    }

    pub fn vote(&self) -> Vote {
        let (below, above) = self.fractions();
        if below >= self.confidence {
            Vote::Below
        } else if above >= self.confidence {
            Vote::Above
        } else {
            Vote::Undecided
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

// ----------------------------------------------------------------------------
// Dwell timers and cooldowns
// ----------------------------------------------------------------------------

/// Fires once after a condition has held for `dwell`; re-arms only after the
/// condition drops.
#[derive(Clone, Debug)]
pub struct DwellTimer {
    dwell: Duration,
    since: Option<Instant>,
    fired: bool,
}

impl DwellTimer {
    pub fn new(dwell: Duration) -> Self {
        Self {
            dwell,
            since: None,
            fired: false,
        }
    }

    pub fn from_secs(secs: f64) -> Result<Self> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(anyhow!("dwell must be a non-negative number of seconds, got {}", secs));
        }
        Ok(Self::new(Duration::from_secs_f64(secs)))
    }

    pub fn observe(&mut self, condition: bool, now: Instant) -> bool {
        if !condition {
            self.reset();
            return false;
        }
        let since = *self.since.get_or_insert(now);
        if !self.fired && now.saturating_duration_since(since) >= self.dwell {
            self.fired = true;
            return true;
        }
        false
    }

    /// Fraction of the dwell completed, `0.0` when idle.
    pub fn progress(&self, now: Instant) -> f32 {
        match self.since {
            None => 0.0,
            Some(_) if self.fired || self.dwell.is_zero() => 1.0,
            Some(since) => {
                let elapsed = now.saturating_duration_since(since).as_secs_f32();
                (elapsed / self.dwell.as_secs_f32()).min(1.0)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.since.is_some()
    }

    pub fn reset(&mut self) {
        self.since = None;
        self.fired = false;
    }
}

/// Minimum spacing between state flips.
#[derive(Clone, Debug)]
pub struct Cooldown {
    period: Duration,
    last: Option<Instant>,
}

impl Cooldown {
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    pub fn ready(&self, now: Instant) -> bool {
        match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.period,
        }
    }

    /// Consume the cooldown if it has elapsed.
    pub fn try_trigger(&mut self, now: Instant) -> bool {
        if self.ready(now) {
            self.last = Some(now);
            true
        } else {
            false
        }
    }
}

// ----------------------------------------------------------------------------
// Edge latch and repetitions
// ----------------------------------------------------------------------------

/// One-shot latch: true on the first frame of each true-run.
#[derive(Clone, Debug, Default)]
pub struct EdgeLatch {
    triggered: bool,
}

impl EdgeLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rising(&mut self, condition: bool) -> bool {
        if condition {
            let fire = !self.triggered;
            self.triggered = true;
            fire
        } else {
            self.triggered = false;
            false
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    pub fn reset(&mut self) {
        self.triggered = false;
    }
}

/// Counts events inside a sliding window of `num_frames` frames; fires when
/// `num_repetitions` events fall inside it, then starts over.
#[derive(Clone, Debug)]
pub struct RepetitionCounter {
    events: VecDeque<bool>,
    num_frames: usize,
    num_repetitions: usize,
}

impl RepetitionCounter {
    pub fn new(num_frames: usize, num_repetitions: usize) -> Result<Self> {
        if num_frames == 0 {
            bail!("num_frames must be at least 1");
        }
        if num_repetitions == 0 || num_repetitions > num_frames {
            return Err(anyhow!(
                "num_repetitions must be between 1 and num_frames ({}), got {}",
                num_frames,
                num_repetitions
            ));
        }
        Ok(Self {
            events: VecDeque::with_capacity(num_frames),
            num_frames,
            num_repetitions,
        })
    }

    /// Advance one frame; `event` says whether a repetition happened on it.
    pub fn tick(&mut self, event: bool) -> bool {
        if self.events.len() == self.num_frames {
            self.events.pop_front();
        }
        self.events.push_back(event);
        if self.count() >= self.num_repetitions {
            self.events.clear();
            return true;
        }
        false
    }

    pub fn count(&self) -> usize {
        self.events.iter().filter(|e| **e).count()
    }

    pub fn reset(&mut self) {
        self.events.clear();
    }
}

// ----------------------------------------------------------------------------
// Level quantization
// ----------------------------------------------------------------------------

/// Level of `signal` against ascending `boundaries`: the number of boundaries
/// at or below it. A signal exactly on `boundaries[i]` lands on level `i + 1`.
pub fn quantize_level(boundaries: &[f64], signal: f64) -> usize {
    boundaries.iter().take_while(|b| **b <= signal).count()
}

/// `n` boundaries splitting `[start, end]` into `n + 1` equal bands.
pub fn even_boundaries(start: f64, end: f64, n: usize) -> Vec<f64> {
    let step = (end - start) / (n as f64 + 1.0);
    (1..=n).map(|i| start + i as f64 * step).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_confirms_only_when_full_and_uniform() {
        let mut window = LevelWindow::new(3).unwrap();
        assert!(!window.push(2));
        assert!(!window.push(2));
        assert!(window.push(2));
        assert!(!window.push(1));
        assert!(!window.push(1));
        assert!(window.push(1));
        assert_eq!(window.confirmed(), Some(&1));
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(LevelWindow::<u8>::new(0).is_err());
    }

    #[test]
    fn frame_counter_resets_on_first_miss() {
        let mut counter = FrameCounter::new(2);
        assert!(!counter.observe(true));
        assert!(!counter.observe(true));
        assert!(counter.observe(true));
        assert!(!counter.observe(false));
        assert_eq!(counter.count(), 0);
        assert!(!counter.observe(true));
    }

    #[test]
    fn majority_vote_needs_confidence() {
        let mut vote = MajorityVote::new(5, -0.2, 0.2, 0.7).unwrap();
        for s in [0.0, 0.0, -0.5, -0.5, -0.5] {
            vote.push(s);
        }
        assert_eq!(vote.vote(), Vote::Undecided);
        vote.push(-0.5);
        assert_eq!(vote.vote(), Vote::Below);
        for _ in 0..4 {
            vote.push(0.6);
        }
        assert_eq!(vote.vote(), Vote::Above);
    }

    #[test]
    fn majority_vote_rejects_ambiguous_confidence() {
        assert!(MajorityVote::new(5, -0.2, 0.2, 0.5).is_err());
        assert!(MajorityVote::new(5, -0.2, 0.2, 1.1).is_err());
        assert!(MajorityVote::new(0, -0.2, 0.2, 0.7).is_err());
        assert!(MajorityVote::new(5, 0.2, -0.2, 0.7).is_err());
    }

    #[test]
    fn dwell_fires_once_per_stay() {
        let start = Instant::now();
        let mut dwell = DwellTimer::new(Duration::from_millis(500));
        assert!(!dwell.observe(true, start));
        assert!(!dwell.observe(true, start + Duration::from_millis(499)));
        assert!(dwell.observe(true, start + Duration::from_millis(500)));
        assert!(!dwell.observe(true, start + Duration::from_secs(3)));
        assert!(!dwell.observe(false, start + Duration::from_secs(4)));
        assert!(!dwell.observe(true, start + Duration::from_secs(5)));
        assert!(dwell.observe(true, start + Duration::from_millis(5600)));
    }

    #[test]
    fn cooldown_spaces_triggers() {
        let start = Instant::now();
        let mut cooldown = Cooldown::new(Duration::from_secs(1));
        assert!(cooldown.try_trigger(start));
        assert!(!cooldown.try_trigger(start + Duration::from_millis(900)));
        assert!(cooldown.try_trigger(start + Duration::from_secs(1)));
    }

    #[test]
    fn edge_latch_rearms_after_false() {
        let mut latch = EdgeLatch::new();
        let fired: Vec<bool> = [true, true, false, true]
            .into_iter()
            .map(|c| latch.rising(c))
            .collect();
        assert_eq!(fired, vec![true, false, false, true]);
    }

    #[test]
    fn repetitions_inside_window_fire() {
        let mut reps = RepetitionCounter::new(4, 2).unwrap();
        assert!(!reps.tick(true));
        assert!(!reps.tick(false));
        assert!(reps.tick(true));
        assert_eq!(reps.count(), 0);
        assert!(!reps.tick(true));
        for _ in 0..4 {
            assert!(!reps.tick(false));
        }
        assert!(!reps.tick(true));
    }

    #[test]
    fn boundary_exact_values_take_the_upper_level() {
        let boundaries = [0.1, 0.2, 0.3];
        assert_eq!(quantize_level(&boundaries, 0.05), 0);
        assert_eq!(quantize_level(&boundaries, 0.1), 1);
        assert_eq!(quantize_level(&boundaries, 0.25), 2);
        assert_eq!(quantize_level(&boundaries, 0.3), 3);
        assert_eq!(quantize_level(&boundaries, 9.0), 3);
        assert_eq!(quantize_level(&[], 0.5), 0);
    }

    #[test]
    fn even_boundaries_split_the_range() {
        let b = even_boundaries(0.0, 0.4, 3);
        assert_eq!(b.len(), 3);
        assert!((b[0] - 0.1).abs() < 1e-9);
        assert!((b[2] - 0.3).abs() < 1e-9);
    }
}
