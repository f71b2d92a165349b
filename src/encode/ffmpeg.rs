use std::{
    ffi::OsString,
    io::{Read as _, Write as _},
    path::Path,
    process::{Child, ChildStdin, Command, Stdio},
};

use crate::{
    encode::sink::{MediaSink, SinkConfig},
    foundation::{
        core::{Fps, FrameIndex},
        error::{ReelError, ReelResult},
    },
    render::FrameRGBA,
    scene::BackgroundSource,
};

/// Sink that spawns the system `ffmpeg` and streams the character layer to stdin.
///
/// Three inputs are combined by one filter graph: the background (colour source, looped still,
/// or looped video, scaled and centre-cropped to the canvas), the piped RGBA layer overlaid on it,
/// and the raw narration audio. Captions are burned in last with the `ass` filter.
#[derive(Default)]
pub struct FfmpegSink {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    cfg: Option<SinkConfig>,
    last_idx: Option<FrameIndex>,
}

impl FfmpegSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn kill(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(handle) = self.stderr_drain.take() {
            let _ = handle.join();
        }
        self.cfg = None;
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        self.kill();
    }
}

impl MediaSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()> {
        cfg.canvas.validate()?;
        Fps::new(cfg.fps.num, cfg.fps.den)?;
        if cfg.audio.sample_rate == 0 || cfg.audio.channels == 0 {
            return Err(ReelError::validation(
                "audio sample_rate and channels must be non-zero",
            ));
        }
        ensure_parent_dir(&cfg.out_path)?;

        if !is_ffmpeg_on_path() {
            return Err(ReelError::render(
                "ffmpeg is required for video encoding, but was not found on PATH",
            ));
        }

        let mut child = Command::new("ffmpeg")
            .args(command_args(&cfg))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ReelError::render(format!(
                    "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelError::render("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelError::render("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        tracing::debug!(out = %cfg.out_path.display(), frames = cfg.frame_count, "ffmpeg started");
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        self.last_idx = None;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> ReelResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| ReelError::render("ffmpeg sink not started"))?;
        if let Some(last) = self.last_idx
            && idx.0 <= last.0
        {
            return Err(ReelError::render(
                "ffmpeg sink received out-of-order frame index",
            ));
        }
        self.last_idx = Some(idx);

        if frame.width != cfg.canvas.width || frame.height != cfg.canvas.height {
            return Err(ReelError::render(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.canvas.width, cfg.canvas.height
            )));
        }
        if frame.data.len() != cfg.canvas.rgba_len() {
            return Err(ReelError::render(
                "frame.data size mismatch with width*height*4",
            ));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ReelError::render("ffmpeg sink is already finalized"));
        };
        stdin.write_all(&frame.data).map_err(|e| {
            ReelError::render(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        Ok(())
    }

    fn end(&mut self) -> ReelResult<()> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| ReelError::render("ffmpeg sink not started"))?;

        let status = child
            .wait()
            .map_err(|e| ReelError::render(format!("failed to wait for ffmpeg to finish: {e}")))?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ReelError::render("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| ReelError::render(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(ReelError::render(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }

        self.cfg = None;
        Ok(())
    }

    fn abort(&mut self) {
        if self.child.is_some() {
            tracing::debug!("killing ffmpeg after failed render");
        }
        self.kill();
    }
}

/// Full `ffmpeg` argument list for `cfg` (everything after the program name).
pub(crate) fn command_args(cfg: &SinkConfig) -> Vec<OsString> {
    let (w, h) = (cfg.canvas.width, cfg.canvas.height);
    let rate = format!("{}/{}", cfg.fps.num, cfg.fps.den);
    let mut args: Vec<OsString> = Vec::new();

    push_args(&mut args, &["-y", "-loglevel", "error"]);

    // Input 0: background.
    match &cfg.background {
        BackgroundSource::Color { rgb } => {
            let src = format!(
                "color=c=0x{:02x}{:02x}{:02x}:s={w}x{h}:r={rate}",
                rgb[0], rgb[1], rgb[2]
            );
            push_args(&mut args, &["-f", "lavfi", "-i", &src]);
        }
        BackgroundSource::Image { path } => {
            push_args(&mut args, &["-loop", "1", "-framerate", &rate, "-i"]);
            args.push(path.as_os_str().to_owned());
        }
        BackgroundSource::Video { path } => {
            push_args(&mut args, &["-stream_loop", "-1", "-i"]);
            args.push(path.as_os_str().to_owned());
        }
    }

    // Input 1: straight-alpha RGBA character layer on stdin.
    let size = format!("{w}x{h}");
    push_args(
        &mut args,
        &["-f", "rawvideo", "-pix_fmt", "rgba", "-s", &size, "-r", &rate],
    );
    push_args(&mut args, &["-i", "pipe:0"]);

    // Input 2: narration.
    let sr = cfg.audio.sample_rate.to_string();
    let ch = cfg.audio.channels.to_string();
    push_args(&mut args, &["-f", "f32le", "-ar", &sr, "-ac", &ch, "-i"]);
    args.push(cfg.audio.path.as_os_str().to_owned());

    let frames = cfg.frame_count.to_string();
    push_args(&mut args, &["-filter_complex", &filter_graph(cfg)]);
    push_args(&mut args, &["-map", "[v]", "-map", "2:a"]);
    push_args(&mut args, &["-c:v", &cfg.video_codec, "-pix_fmt", "yuv420p"]);
    push_args(&mut args, &["-c:a", &cfg.audio_codec]);
    push_args(&mut args, &["-frames:v", &frames, "-movflags", "+faststart"]);
    args.push(cfg.out_path.as_os_str().to_owned());
    args
}

fn push_args(args: &mut Vec<OsString>, items: &[&str]) {
    args.extend(items.iter().map(OsString::from));
}

fn filter_graph(cfg: &SinkConfig) -> String {
    let (w, h) = (cfg.canvas.width, cfg.canvas.height);
    let mut graph = format!(
        "[0:v]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1,\
         fps={}/{}[bg];[bg][1:v]overlay=0:0:format=auto:shortest=1",
        cfg.fps.num, cfg.fps.den
    );
    if let Some(captions) = &cfg.captions {
        graph.push_str(",ass=filename=");
        graph.push_str(&escape_filter_value(&captions.script.to_string_lossy()));
        if let Some(dir) = &captions.fonts_dir {
            graph.push_str(":fontsdir=");
            graph.push_str(&escape_filter_value(&dir.to_string_lossy()));
        }
    }
    graph.push_str(",format=yuv420p[v]");
    graph
}

/// Escape a filter option value for embedding in a filter graph string.
///
/// ffmpeg unescapes twice: once when splitting the graph, once when parsing the option list.
pub(crate) fn escape_filter_value(value: &str) -> String {
    let option_level = escape_chars(value, &['\\', '\'', ':']);
    escape_chars(&option_level, &['\\', '\'', '[', ']', ',', ';'])
}

fn escape_chars(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ReelResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
