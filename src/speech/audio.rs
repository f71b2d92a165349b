use std::{
    io::Write as _,
    path::Path,
    process::{Command, Output, Stdio},
    sync::Arc,
    time::Duration,
};

use crate::foundation::{
    core::samples_to_duration,
    error::{ReelError, ReelResult},
};

/// Synthesized narration as mono `f32` PCM.
///
/// Immutable once built; `total_duration` is derived from the sample count and is the single
/// authoritative length every timeline is anchored to.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioTrack {
    samples: Arc<[f32]>,
    sample_rate: u32,
    total_duration: Duration,
}

impl AudioTrack {
    pub fn from_pcm(samples: Vec<f32>, sample_rate: u32) -> ReelResult<Self> {
        if sample_rate == 0 {
            return Err(ReelError::validation("audio sample_rate must be > 0"));
        }
        if samples.is_empty() {
            return Err(ReelError::validation("audio track has no samples"));
        }
        let total_duration = samples_to_duration(samples.len() as u64, sample_rate);
        Ok(Self {
            samples: samples.into(),
            sample_rate,
            total_duration,
        })
    }

    /// Decode signed 16-bit little-endian mono PCM.
    pub fn from_s16le(bytes: &[u8], sample_rate: u32) -> ReelResult<Self> {
        if !bytes.len().is_multiple_of(2) {
            return Err(ReelError::validation(
                "s16le audio byte length is not a multiple of 2",
            ));
        }
        let samples = bytes
            .chunks_exact(2)
            .map(|c| f32::from(i16::from_le_bytes([c[0], c[1]])) / 32768.0)
            .collect();
        Self::from_pcm(samples, sample_rate)
    }

    /// Concatenate tracks in order. All parts must share one sample rate.
    pub fn concat(parts: &[AudioTrack]) -> ReelResult<Self> {
        let first = parts
            .first()
            .ok_or_else(|| ReelError::validation("cannot concatenate zero audio tracks"))?;
        if let Some(odd) = parts.iter().find(|p| p.sample_rate != first.sample_rate) {
            return Err(ReelError::validation(format!(
                "audio parts disagree on sample rate ({} vs {})",
                first.sample_rate, odd.sample_rate
            )));
        }
        let mut samples = Vec::with_capacity(parts.iter().map(|p| p.samples.len()).sum());
        for p in parts {
            samples.extend_from_slice(&p.samples);
        }
        Self::from_pcm(samples, first.sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn total_duration(&self) -> Duration {
        self.total_duration
    }

    pub fn len_samples(&self) -> u64 {
        self.samples.len() as u64
    }

    /// Write the samples as raw little-endian `.f32le` for the media service.
    pub fn write_f32le(&self, out_path: &Path) -> ReelResult<()> {
        let mut bytes = Vec::<u8>::with_capacity(self.samples.len() * 4);
        for &sample in self.samples.iter() {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        std::fs::write(out_path, bytes).map_err(|e| {
            ReelError::render(format!(
                "failed to write audio file '{}': {e}",
                out_path.display()
            ))
        })
    }
}

/// Decode compressed audio bytes (e.g. MP3) to mono PCM through the system `ffmpeg`.
pub fn decode_with_ffmpeg(bytes: &[u8], sample_rate: u32) -> ReelResult<AudioTrack> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-v", "error", "-i", "pipe:0", "-vn", "-f", "f32le", "-acodec", "pcm_f32le"])
        .args(["-ac", "1", "-ar", &sample_rate.to_string(), "pipe:1"]);
    let output = run_piped(cmd, bytes.to_vec())
        .map_err(|e| ReelError::validation(format!("failed to run ffmpeg for audio decode: {e}")))?;
    let stdout = &output.stdout;

    if !output.status.success() {
        return Err(ReelError::validation(format!(
            "ffmpeg audio decode failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    if !stdout.len().is_multiple_of(4) {
        return Err(ReelError::validation(
            "decoded audio byte length is not aligned to f32 samples",
        ));
    }
    let samples = stdout
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    AudioTrack::from_pcm(samples, sample_rate)
}

/// Run `cmd` with `input` on stdin, collecting stdout and stderr concurrently.
fn run_piped(mut cmd: Command, input: Vec<u8>) -> std::io::Result<Output> {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| std::io::Error::other("child stdin was not captured"))?;
    let feeder = std::thread::spawn(move || stdin.write_all(&input));
    let output = child.wait_with_output()?;
    // A broken pipe only means the child stopped reading early; its exit status tells the story.
    let _ = feeder.join();
    Ok(output)
}
