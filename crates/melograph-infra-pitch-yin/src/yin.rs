//! YIN fundamental-frequency estimation on a single analysis frame.

use crate::TrackerConfig;

/// Estimates the fundamental of `frame`, searching only periods that map to
/// the configured frequency range. Returns `None` for quiet or aperiodic
/// frames.
pub fn detect_pitch(
    frame: &[f32],
    sample_rate: u32,
    config: &TrackerConfig,
    scratch: &mut Vec<f32>,
) -> Option<f32> {
    let TrackerConfig {
        min_frequency,
        max_frequency,
        threshold,
        min_rms,
        ..
    } = *config;
    let half = frame.len() / 2;
    if half < 3 || sample_rate == 0 {
        return None;
    }

    let rms = (frame.iter().map(|&s| s * s).sum::<f32>() / frame.len() as f32).sqrt();
    if rms < min_rms {
        return None;
    }

    let tau_min = ((sample_rate as f32 / max_frequency).floor() as usize).max(2);
    let tau_max = ((sample_rate as f32 / min_frequency).ceil() as usize).min(half - 2);
    if tau_min >= tau_max {
        return None;
    }

    scratch.clear();
    scratch.resize(tau_max + 2, 0.0);

    for tau in 1..scratch.len() {
        let mut diff = 0.0;
        for i in 0..half {
            let delta = frame[i] - frame[i + tau];
            diff += delta * delta;
        }
        scratch[tau] = diff;
    }

    let mut running_sum = 0.0;
    scratch[0] = 1.0;
    for tau in 1..scratch.len() {
        running_sum += scratch[tau];
        scratch[tau] = if running_sum > 0.0 {
            scratch[tau] * tau as f32 / running_sum
        } else {
            1.0
        };
    }

    let mut period = None;
    let mut tau = tau_min;
    while tau <= tau_max {
        if scratch[tau] < threshold {
            // Walk down to the bottom of this dip.
            while tau < tau_max && scratch[tau + 1] < scratch[tau] {
                tau += 1;
            }
            period = Some(tau);
            break;
        }
        tau += 1;
    }
    let period = period?;

    let y1 = scratch[period - 1];
    let y2 = scratch[period];
    let y3 = scratch[period + 1];
    let curvature = y1 - 2.0 * y2 + y3;
    let refined = if curvature.abs() > f32::EPSILON {
        period as f32 + (y1 - y3) / (2.0 * curvature)
    } else {
        period as f32
    };

    let frequency = sample_rate as f32 / refined;
    if frequency.is_finite() && (min_frequency..=max_frequency).contains(&frequency) {
        Some(frequency)
    } else {
        None
    }
}
