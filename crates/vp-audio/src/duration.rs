//! Duration repair: silence trimming, edge fades, padding and repetition
//!
//! Every function returns a new buffer; inputs are never edited in place.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::buffer::AudioBuffer;
use crate::config::TrimPolicy;
use crate::format::FormatNormalizer;

// ═══════════════════════════════════════════════════════════════════════════════
// TRIM
// ═══════════════════════════════════════════════════════════════════════════════

/// Strip leading and trailing regions quieter than `top_db` below the loudest frame.
///
/// Frame RMS is measured on centred, zero-padded windows. Audio without any
/// frame above the threshold (digital silence) is returned unchanged.
pub fn trim_silence(
    buffer: &AudioBuffer,
    top_db: f32,
    frame_length: usize,
    hop_length: usize,
) -> AudioBuffer {
    if buffer.is_empty() || frame_length == 0 || hop_length == 0 {
        return buffer.clone();
    }

    let mono = FormatNormalizer::to_mono(buffer);
    let rms = frame_rms(&mono.samples, frame_length, hop_length);
    let max_rms = rms.iter().copied().fold(0.0f64, f64::max);
    if max_rms <= 0.0 {
        return buffer.clone();
    }

    let threshold = -(top_db as f64);
    let loud = |r: &f64| *r > 0.0 && 20.0 * (r / max_rms).log10() > threshold;

    let (Some(first), Some(last)) = (rms.iter().position(loud), rms.iter().rposition(loud)) else {
        return buffer.clone();
    };

    let frames = buffer.frames();
    let start = (first * hop_length).min(frames);
    let end = ((last + 1) * hop_length).min(frames);
    if end <= start {
        return buffer.clone();
    }
    buffer.slice_frames(start, end)
}

fn frame_rms(samples: &[f32], frame_length: usize, hop_length: usize) -> Vec<f64> {
    let half = frame_length / 2;
    let count = 1 + samples.len() / hop_length;
    (0..count)
        .map(|i| {
            let center = i * hop_length;
            let lo = center.saturating_sub(half);
            let hi = (center + half).min(samples.len());
            let energy: f64 = samples[lo.min(hi)..hi].iter().map(|&s| (s as f64).powi(2)).sum();
            (energy / frame_length as f64).sqrt()
        })
        .collect()
}

/// What the escalating trim policy decided
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TrimDecision {
    /// Input at or below the skip duration
    Skipped,
    /// Trimmed at this threshold
    Trimmed { top_db: f32 },
    /// Every threshold cut too deep, original kept
    KeptOriginal,
}

/// Trim with escalating leniency.
///
/// Each threshold is tried in turn; a result at or above the safety floor is
/// accepted. After the last threshold a result at or above the absolute floor
/// is still accepted, anything shorter falls back to the original buffer.
pub fn trim_with_policy(buffer: &AudioBuffer, policy: &TrimPolicy) -> (AudioBuffer, TrimDecision) {
    let original = buffer.duration();
    if original <= policy.skip_at_or_below_secs {
        debug!("[Trim] {:.2}s input, trim skipped", original);
        return (buffer.clone(), TrimDecision::Skipped);
    }

    let thresholds: Vec<f32> = std::iter::once(policy.initial_top_db)
        .chain(policy.escalation_top_db.iter().copied())
        .collect();

    let mut last: Option<(AudioBuffer, f32)> = None;
    for &top_db in &thresholds {
        let trimmed = trim_silence(buffer, top_db, policy.frame_length, policy.hop_length);
        let kept = trimmed.duration();
        if kept >= policy.safety_floor_secs {
            debug!("[Trim] {:.2}s -> {:.2}s at {} dB", original, kept, top_db);
            return (trimmed, TrimDecision::Trimmed { top_db });
        }
        info!(
            "[Trim] {} dB left {:.2}s (< {:.1}s safety floor), escalating",
            top_db, kept, policy.safety_floor_secs
        );
        last = Some((trimmed, top_db));
    }

    match last {
        Some((trimmed, top_db)) if trimmed.duration() >= policy.absolute_floor_secs => {
            (trimmed, TrimDecision::Trimmed { top_db })
        }
        _ => {
            warn!(
                "[Trim] every threshold cut below {:.1}s, keeping original {:.2}s",
                policy.absolute_floor_secs, original
            );
            (buffer.clone(), TrimDecision::KeptOriginal)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FADE / PAD / LOOP
// ═══════════════════════════════════════════════════════════════════════════════

/// Linear fade-in and fade-out of `seconds` at each edge, capped at half the length
pub fn fade_edges(buffer: &AudioBuffer, seconds: f64) -> AudioBuffer {
    let frames = buffer.frames();
    let fade = buffer.frames_for(seconds).min(frames / 2);
    if fade == 0 {
        return buffer.clone();
    }

    let channels = buffer.channel_count;
    let mut samples = buffer.samples.clone();
    for i in 0..fade {
        let gain = i as f32 / fade as f32;
        let head = i * channels;
        let tail = (frames - 1 - i) * channels;
        for ch in 0..channels {
            samples[head + ch] *= gain;
            samples[tail + ch] *= gain;
        }
    }

    AudioBuffer {
        samples,
        sample_rate: buffer.sample_rate,
        channel_count: channels,
    }
}

/// Append trailing silence up to `min_duration`; never shortens
pub fn pad_to_minimum(buffer: &AudioBuffer, min_duration: f64) -> AudioBuffer {
    if buffer.duration() >= min_duration {
        return buffer.clone();
    }
    let target = (min_duration * buffer.sample_rate as f64).ceil() as usize;
    let mut samples = buffer.samples.clone();
    samples.resize(target * buffer.channel_count, 0.0);
    debug!(
        "[Pad] {:.2}s -> {:.2}s",
        buffer.duration(),
        target as f64 / buffer.sample_rate as f64
    );
    AudioBuffer {
        samples,
        sample_rate: buffer.sample_rate,
        channel_count: buffer.channel_count,
    }
}

/// Repeat the whole buffer until its voiced content reaches `min_voice`.
///
/// `measure_voice` is re-run on every tiled candidate: copies joined end to
/// end can measure less voice than one copy alone, so the count grows until
/// the tiled buffer itself meets the floor. Never exceeds `max_duration`
/// unless a single copy already does. Returns the new buffer and the
/// repetition count (1 when nothing changed). Without detected voice the
/// total duration stands in for voiced content.
pub fn loop_to_voice_minimum<F>(
    buffer: &AudioBuffer,
    min_voice: f64,
    max_duration: f64,
    measure_voice: F,
) -> (AudioBuffer, usize)
where
    F: Fn(&AudioBuffer) -> f64,
{
    let single = buffer.duration();
    if buffer.is_empty() || single <= 0.0 {
        return (buffer.clone(), 1);
    }
    let voice = measure_voice(buffer);
    if voice >= min_voice {
        return (buffer.clone(), 1);
    }

    let max_repeats = ((max_duration / single).floor() as usize).max(1);
    let mut per_copy = if voice > 0.0 { voice } else { single };
    let mut repeats = ((min_voice / per_copy).ceil() as usize).clamp(1, max_repeats);

    loop {
        let tiled = tile(buffer, repeats);
        let measured = if voice > 0.0 {
            measure_voice(&tiled)
        } else {
            tiled.duration()
        };
        if measured >= min_voice || repeats >= max_repeats {
            if measured < min_voice {
                warn!(
                    "[Loop] {:.2}s voiced after {}x ({:.2}s), capped at {:.1}s",
                    measured,
                    repeats,
                    tiled.duration(),
                    max_duration
                );
            } else {
                info!(
                    "[Loop] {:.2}s voiced < {:.1}s floor, repeated {}x ({:.2}s voiced in {:.2}s)",
                    voice,
                    min_voice,
                    repeats,
                    measured,
                    tiled.duration()
                );
            }
            return (tiled, repeats);
        }

        // Junctions cost voice; re-estimate from what the tiling actually measured
        if measured > 0.0 {
            per_copy = measured / repeats as f64;
        }
        let missing = ((min_voice - measured) / per_copy).ceil().max(1.0) as usize;
        debug!("[Loop] {}x measured {:.2}s, adding {} copies", repeats, measured, missing);
        repeats = (repeats + missing).min(max_repeats);
    }
}

fn tile(buffer: &AudioBuffer, repeats: usize) -> AudioBuffer {
    AudioBuffer {
        samples: buffer.samples.repeat(repeats),
        sample_rate: buffer.sample_rate,
        channel_count: buffer.channel_count,
    }
}
