use std::time::Duration;

use gesture_kernel::clock::{Clock, ManualClock};
use gesture_kernel::debounce::{
    even_boundaries, quantize_level, Cooldown, DwellTimer, EdgeLatch, FrameCounter, LevelWindow,
    MajorityVote, Vote,
};

#[test]
fn flickering_level_never_confirms() {
    let boundaries = even_boundaries(0.05, 0.25, 2);
    let mut window = LevelWindow::new(4).unwrap();
    let mut confirmed = Vec::new();
    for depth in [0.2, 0.2, 0.2, 0.1, 0.2, 0.2, 0.2, 0.2] {
        if window.push(quantize_level(&boundaries, depth)) {
            confirmed.push(*window.confirmed().unwrap());
        }
    }
    // One stray sample restarts the count: confirmation on the last frame only.
    assert_eq!(confirmed, vec![2]);
}

#[test]
fn boundary_value_lands_on_the_upper_level() {
    let boundaries = vec![0.1, 0.2];
    assert_eq!(quantize_level(&boundaries, 0.0999), 0);
    assert_eq!(quantize_level(&boundaries, 0.1), 1);
    assert_eq!(quantize_level(&boundaries, 0.2), 2);
}

#[test]
fn majority_vote_needs_the_confidence_share() {
    let mut vote = MajorityVote::new(5, -0.2, 0.2, 0.7).unwrap();
    for sample in [0.3, 0.3, 0.0] {
        vote.push(sample);
    }
    // 2 of 3 above is below 0.7.
    assert_eq!(vote.vote(), Vote::Undecided);
    vote.push(0.3);
    vote.push(0.3);
    // 4 of 5.
    assert_eq!(vote.vote(), Vote::Above);
    for _ in 0..4 {
        vote.push(-0.5);
    }
    assert_eq!(vote.vote(), Vote::Below);
}

#[test]
fn majority_vote_rejects_ambiguous_confidence() {
    assert!(MajorityVote::new(5, -0.2, 0.2, 0.5).is_err());
    assert!(MajorityVote::new(5, -0.2, 0.2, 1.01).is_err());
    assert!(MajorityVote::new(0, -0.2, 0.2, 0.7).is_err());
    assert!(MajorityVote::new(5, 0.2, -0.2, 0.7).is_err());
}

#[test]
fn frame_counter_resets_on_the_first_miss() {
    let mut counter = FrameCounter::new(2);
    let seen: Vec<bool> = [true, true, true, false, true, true, true]
        .into_iter()
        .map(|c| counter.observe(c))
        .collect();
    assert_eq!(seen, vec![false, false, true, false, false, false, true]);
}

#[test]
fn dwell_and_cooldown_follow_the_injected_clock() {
    let clock = ManualClock::new();
    let mut dwell = DwellTimer::new(Duration::from_millis(500));
    let mut cooldown = Cooldown::new(Duration::from_secs(1));

    assert!(!dwell.observe(true, clock.now()));
    clock.advance(Duration::from_millis(499));
    assert!(!dwell.observe(true, clock.now()));
    clock.advance(Duration::from_millis(1));
    assert!(dwell.observe(true, clock.now()));
    assert!(!dwell.observe(true, clock.now()));

    assert!(cooldown.try_trigger(clock.now()));
    clock.advance(Duration::from_millis(900));
    assert!(!cooldown.try_trigger(clock.now()));
    clock.advance(Duration::from_millis(100));
    assert!(cooldown.try_trigger(clock.now()));
}

#[test]
fn edge_latch_fires_once_per_run() {
    let mut latch = EdgeLatch::new();
    let fired: Vec<bool> = [false, true, true, false, true]
        .into_iter()
        .map(|c| latch.rising(c))
        .collect();
    assert_eq!(fired, vec![false, true, false, false, true]);
}
