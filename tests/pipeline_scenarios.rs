//! End-to-end pipeline scenarios

use grooves::config::BassModeSelect;
use grooves::prelude::*;

fn layer(fills: usize, note: u8) -> LayerConfig {
    LayerConfig {
        fills,
        note,
        ..LayerConfig::default()
    }
}

/// Kick, hats, snare, clap: the warehouse four-on-floor kit
fn warehouse_config(bars: usize) -> Config {
    let mut config = Config::new(EngineMode::Full, 132.0, 1920, bars, 0x5EED);
    config.layers.insert("kick".into(), layer(4, 36));
    config.layers.insert(
        "hat_c".into(),
        LayerConfig {
            fills: 12,
            note: 42,
            swing_percent: 0.55,
            ..LayerConfig::default()
        },
    );
    config.layers.insert(
        "snare".into(),
        LayerConfig {
            fills: 2,
            rot: 4,
            note: 38,
            ..LayerConfig::default()
        },
    );
    config.layers.insert(
        "clap".into(),
        LayerConfig {
            fills: 2,
            rot: 12,
            note: 39,
            ..LayerConfig::default()
        },
    );
    config.guard.kick_immutable = true;
    config.targets.hat_density_target = 0.7;
    config.targets.hat_density_tol = 0.03;
    config.targets.s_high = 0.75;
    config.thin_bias = 0.0;
    config
}

#[test]
fn metronome_baseline() {
    let mut config = Config::new(EngineMode::DrumsOnly, 120.0, 960, 2, 1);
    config.layers.insert(
        "kick".into(),
        LayerConfig {
            fills: 4,
            note: 36,
            velocity: 110,
            ..LayerConfig::default()
        },
    );

    let result = generate(&config).unwrap();
    let drums = result.stream("drums").unwrap();

    let onsets: Vec<(u32, u8)> = drums
        .events
        .iter()
        .filter(|e| e.kind == EventKind::NoteOn)
        .map(|e| (e.tick, e.velocity))
        .collect();
    let expected: Vec<u32> = vec![0, 960, 1920, 2880, 3840, 4800, 5760, 6720];
    assert_eq!(onsets.len(), 8);
    for (i, &(tick, velocity)) in onsets.iter().enumerate() {
        assert_eq!(tick, expected[i]);
        assert_eq!(velocity, 110);
    }
}

#[test]
fn warehouse_groove_holds_targets() {
    let config = warehouse_config(8);
    let result = generate(&config).unwrap();

    // Kick positions unchanged in every bar.
    for bar in 0..8 {
        let steps: Vec<usize> = result.drums.bar_masks[bar]["kick"].onset_steps().collect();
        assert_eq!(steps, vec![0, 4, 8, 12], "bar {}", bar);
    }

    // Hat density inside the target window in at least 7 of 8 bars.
    let in_range = result
        .drums
        .metrics
        .iter()
        .filter(|m| (0.65..=0.75).contains(&m.h))
        .count();
    assert!(in_range >= 7, "hat density in range in {}/8 bars", in_range);

    // Entrainment median at least 0.75.
    let mut es: Vec<f64> = result.drums.metrics.iter().map(|m| m.e).collect();
    es.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median = es[es.len() / 2];
    assert!(median >= 0.75, "E median {}", median);
}

#[test]
fn bass_minimal_sub_anchor() {
    let mut config = warehouse_config(8);
    config.mode = EngineMode::DrumsBass;
    config.bass.mode = Some(BassModeSelect::Fixed(BassMode::SubAnchor));
    config.bass.root_note = 45;

    let result = generate(&config).unwrap();
    let bass = result.bass.as_ref().unwrap();
    assert_eq!(result.diagnostics.bass_relaxations, 0);

    let mut per_bar = vec![0usize; 8];
    for n in &bass.notes {
        per_bar[n.bar] += 1;
        assert!(
            (33..=52).contains(&n.pitch),
            "bass pitch {} outside register",
            n.pitch
        );
        if result.slot_grid.label(n.bar, n.step).is_kick {
            assert_eq!(n.step, 0, "bass coincides with kick off the downbeat");
        }
    }
    for (bar, &count) in per_bar.iter().enumerate() {
        assert!((1..=4).contains(&count), "bar {} has {} notes", bar, count);
    }
}

#[test]
fn lead_lyrical_four_bars() {
    let mut config = warehouse_config(4);
    config.lead.mode = LeadMode::LyricalCr;
    config.tags.push("key_9_aeolian".into());

    let result = generate(&config).unwrap();
    let lead = result.lead.as_ref().unwrap();
    assert!(!lead.notes.is_empty());

    // First note of each phrase lands within the first 3 steps of its bar.
    for segment in &lead.plan.segments {
        if let Some(first) = lead.notes.iter().find(|n| n.segment_id == segment.id) {
            assert_eq!(first.bar, segment.start_bar);
            assert!(first.step <= 3, "first note at step {}", first.step);
        }
    }

    // Phrase-final notes resolve to degree 1 or 5.
    for segment in &lead.plan.segments {
        if !segment.resolution_required {
            continue;
        }
        if let Some(last) = lead.notes.iter().filter(|n| n.segment_id == segment.id).last() {
            assert!(
                [1usize, 5].contains(&last.degree),
                "segment {} resolves to degree {}",
                segment.id,
                last.degree
            );
        }
    }

    // Every pitch diatonic; average jump stays melodic.
    for n in &lead.notes {
        assert!(lead.key.is_diatonic(n.pitch as i32));
    }
    let pitches: Vec<i32> = lead.notes.iter().map(|n| n.pitch as i32).collect();
    if pitches.len() > 1 {
        let total: i32 = pitches.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
        let avg = total as f64 / (pitches.len() - 1) as f64;
        assert!(avg <= 5.0, "average jump {}", avg);
    }
}

#[test]
fn rescue_restores_entrainment() {
    // A period-5 pattern with no kick starts badly entrained; the guard
    // must take at least one rescue bar and the pattern must recover.
    let mut config = Config::new(EngineMode::DrumsOnly, 130.0, 480, 32, 42);
    config.layers.insert("perc".into(), layer(5, 37));
    config.guard.min_e = 0.7;
    config.guard.kick_immutable = false;

    let result = generate(&config).unwrap();
    assert_eq!(result.drums.metrics.len(), 32);
    assert!(
        result.drums.metrics[0].e < 0.7,
        "bar 0 E {} should start low",
        result.drums.metrics[0].e
    );
    assert!(result.diagnostics.rescue_bars >= 1);
    assert!(
        result.drums.metrics.iter().skip(1).any(|m| m.e >= 0.7),
        "entrainment never recovered"
    );
}

#[test]
fn drum_event_invariants_hold() {
    let config = warehouse_config(8);
    let result = generate(&config).unwrap();
    let cap = result
        .timebase
        .ticks_from_ms(config.targets.t_ms_cap);
    for e in &result.drums.events {
        assert!(e.step < STEPS_PER_BAR);
        assert!(e.micro_offset_ticks.abs() <= cap);
        assert!(e.velocity >= 1);
    }
}
