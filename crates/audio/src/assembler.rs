use voxdub_interface::{Segment, SyncMode, SynthesizedSegment};

use crate::{resample_linear, tempo, AudioError};

/// Sample rate of the assembled track handed to the mux stage.
pub const TRACK_SAMPLE_RATE: u32 = 24_000;

/// Minimum silence between consecutive utterances, in every sync mode, so
/// adjacent words never collide.
pub const GAP_FLOOR_MS: u64 = 250;

const RMS_TARGET_DBFS: f32 = -20.0;
const PEAK_CEILING: f32 = 0.99;

/// Builds the dubbed track from per-segment synthesis output and the
/// original transcript timestamps.
#[derive(Debug, Clone)]
pub struct Assembler {
    sample_rate: u32,
    mode: SyncMode,
}

impl Assembler {
    pub fn new(mode: SyncMode) -> Self {
        Self {
            sample_rate: TRACK_SAMPLE_RATE,
            mode,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Assemble the full track. `windows` are the original transcript
    /// segments the synthesized audio corresponds to, index-aligned via
    /// `SynthesizedSegment::segment_index`. `timeline_secs` is the source
    /// video duration.
    pub fn assemble(
        &self,
        synthesized: &[SynthesizedSegment],
        windows: &[Segment],
        timeline_secs: f64,
    ) -> Result<Vec<f32>, AudioError> {
        let mut track = match self.mode {
            SyncMode::Natural => self.assemble_natural(synthesized, windows)?,
            SyncMode::Speed => self.assemble_speed(synthesized, windows, timeline_secs)?,
            SyncMode::Stretch => self.assemble_stretch(synthesized)?,
        };
        rms_normalize(&mut track);
        Ok(track)
    }

    fn gap_floor_samples(&self) -> usize {
        (self.sample_rate as u64 * GAP_FLOOR_MS / 1000) as usize
    }

    fn to_samples(&self, secs: f64) -> usize {
        (secs.max(0.0) * self.sample_rate as f64).round() as usize
    }

    fn prepared(&self, seg: &SynthesizedSegment) -> Result<Vec<f32>, AudioError> {
        if seg.samples.is_empty() {
            if seg.is_silence {
                return Ok(Vec::new());
            }
            return Err(AudioError::EmptySegment { index: seg.segment_index });
        }
        Ok(resample_linear(&seg.samples, seg.sample_rate, self.sample_rate))
    }

    /// Each utterance starts at its original timestamp; an utterance that
    /// outruns its window pushes everything after it, so the tail may
    /// drift past the video end. Documented behavior of this mode.
    fn assemble_natural(
        &self,
        synthesized: &[SynthesizedSegment],
        windows: &[Segment],
    ) -> Result<Vec<f32>, AudioError> {
        let gap = self.gap_floor_samples();
        let mut track: Vec<f32> = Vec::new();
        let mut cursor = 0usize;

        for seg in synthesized {
            let window = windows.get(seg.segment_index).ok_or(AudioError::WindowMismatch)?;
            let samples = self.prepared(seg)?;
            let natural_start = self.to_samples(window.start_secs);
            let floor = if cursor == 0 { cursor } else { cursor + gap };
            let start = natural_start.max(floor);
            write_at(&mut track, start, &samples);
            cursor = start + samples.len();
        }
        Ok(track)
    }

    /// Utterances keep their original start; anything longer than its
    /// window is tempo-compressed to fit, shorter leaves trailing silence.
    /// The track length equals the source timeline exactly.
    fn assemble_speed(
        &self,
        synthesized: &[SynthesizedSegment],
        windows: &[Segment],
        timeline_secs: f64,
    ) -> Result<Vec<f32>, AudioError> {
        let gap = self.gap_floor_samples();
        let total = self.to_samples(timeline_secs);
        let mut track = vec![0.0f32; total];

        for (pos, seg) in synthesized.iter().enumerate() {
            let window = windows.get(seg.segment_index).ok_or(AudioError::WindowMismatch)?;
            let samples = self.prepared(seg)?;
            if samples.is_empty() {
                continue;
            }

            let start = self.to_samples(window.start_secs);
            // The window may extend into the following pause, but must
            // leave the silence floor before the next utterance begins.
            let hard_end = match synthesized.get(pos + 1) {
                Some(next) => {
                    let next_window =
                        windows.get(next.segment_index).ok_or(AudioError::WindowMismatch)?;
                    self.to_samples(next_window.start_secs).saturating_sub(gap)
                }
                None => total,
            };
            let window_end = self.to_samples(window.end_secs).min(hard_end.max(start + 1));
            let available = window_end.saturating_sub(start).max(1);

            let fitted = if samples.len() > available {
                let ratio = available as f64 / samples.len() as f64;
                tracing::debug!(
                    segment = seg.segment_index,
                    ratio,
                    "segment_tempo_compressed"
                );
                let mut stretched = tempo::time_stretch(&samples, ratio);
                stretched.truncate(available);
                stretched
            } else {
                samples
            };

            let end = (start + fitted.len()).min(total);
            if start < total {
                track[start..end].copy_from_slice(&fitted[..end - start]);
            }
        }
        Ok(track)
    }

    /// Utterances laid end-to-end with the silence floor between them; the
    /// mux stage stretches the video to the resulting length.
    fn assemble_stretch(
        &self,
        synthesized: &[SynthesizedSegment],
    ) -> Result<Vec<f32>, AudioError> {
        let gap = self.gap_floor_samples();
        let mut track: Vec<f32> = Vec::new();

        for seg in synthesized {
            let samples = self.prepared(seg)?;
            if samples.is_empty() {
                continue;
            }
            if !track.is_empty() {
                track.extend(std::iter::repeat(0.0).take(gap));
            }
            track.extend_from_slice(&samples);
        }
        Ok(track)
    }
}

fn write_at(track: &mut Vec<f32>, start: usize, samples: &[f32]) {
    let end = start + samples.len();
    if track.len() < end {
        track.resize(end, 0.0);
    }
    track[start..end].copy_from_slice(samples);
}

/// Normalize the assembled track to a fixed RMS level, clamped so peaks
/// stay inside full scale.
fn rms_normalize(track: &mut [f32]) {
    if track.is_empty() {
        return;
    }
    let sum_sq: f64 = track.iter().map(|s| (*s as f64) * (*s as f64)).sum();
    let rms = (sum_sq / track.len() as f64).sqrt() as f32;
    if rms < 1e-6 {
        return;
    }

    let target = 10f32.powf(RMS_TARGET_DBFS / 20.0);
    let mut gain = target / rms;

    let peak = track.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak * gain > PEAK_CEILING {
        gain = PEAK_CEILING / peak;
    }

    for sample in track.iter_mut() {
        *sample *= gain;
    }
}
