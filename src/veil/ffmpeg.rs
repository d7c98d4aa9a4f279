// SYNOID Video Veil FFmpeg Bridge
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Raw RGB frame I/O through ffprobe/ffmpeg child processes. Frames travel
// over pipes as packed rgb24, so no temporary frame directories are needed.

use anyhow::{Context, Result};
use image::RgbImage;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::error::VeilError;

/// Stream geometry and timing reported by ffprobe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: Option<f64>,
}

/// Check whether an executable exists on PATH without spawning it.
pub fn which_exists(name: &str) -> bool {
    if let Some(path_env) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_env) {
            let candidate = dir.join(name);
            if candidate.exists() || candidate.with_extension("exe").exists() {
                return true;
            }
        }
    }
    false
}

/// External tools the video paths rely on that are missing from PATH.
pub fn check_dependencies() -> Vec<&'static str> {
    ["ffmpeg", "ffprobe"]
        .into_iter()
        .filter(|tool| !which_exists(tool))
        .collect()
}

/// Parse ffprobe's `r_frame_rate` ("30000/1001" or "25").
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    let s = s.trim();
    let fps = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => s.parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

/// Parse `width,height,r_frame_rate` csv output of ffprobe.
pub fn parse_stream_info(csv: &str) -> Option<StreamInfo> {
    let line = csv.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut parts = line.split(',');
    let width: u32 = parts.next()?.trim().parse().ok()?;
    let height: u32 = parts.next()?.trim().parse().ok()?;
    let fps = parts.next().and_then(parse_frame_rate);
    (width > 0 && height > 0).then_some(StreamInfo { width, height, fps })
}

/// Probe the first video stream. `None` when ffprobe cannot read it.
pub async fn probe_stream(path: &Path) -> Result<Option<StreamInfo>> {
    let out = Command::new("ffprobe")
        .args([
            "-v", "error",
            "-select_streams", "v:0",
            "-show_entries", "stream=width,height,r_frame_rate",
            "-of", "csv=p=0",
        ])
        .arg(path)
        .output()
        .await
        .context("Running ffprobe")?;

    if !out.status.success() {
        debug!(
            "[FFMPEG] ffprobe rejected {:?}: {}",
            path,
            String::from_utf8_lossy(&out.stderr).trim()
        );
        return Ok(None);
    }
    Ok(parse_stream_info(&String::from_utf8_lossy(&out.stdout)))
}

/// Sequential rgb24 frame reader over an ffmpeg decode pipe.
pub struct FrameDecoder {
    child: Child,
    stdout: ChildStdout,
    path: PathBuf,
    width: u32,
    height: u32,
}

/// Decoder arguments. Rotation metadata is ignored so frames keep the coded
/// size ffprobe reports.
pub fn decode_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "error", "-nostdin", "-noautorotate", "-i"]
        .iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_owned());
    args.extend(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"].iter().map(OsString::from));
    args
}

/// A decoder that ran to the end must have exited cleanly, otherwise the
/// frames read so far are a truncated stream.
pub fn check_decoder_exit(status: ExitStatus, path: &Path) -> Result<(), VeilError> {
    if status.success() {
        Ok(())
    } else {
        Err(VeilError::Ffmpeg(format!("decoding {:?} failed: {}", path, status)))
    }
}

impl FrameDecoder {
    pub fn spawn(path: &Path, info: &StreamInfo) -> Result<Self> {
        let mut child = Command::new("ffmpeg")
            .args(decode_args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("Spawning ffmpeg decoder")?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VeilError::Ffmpeg("decoder stdout unavailable".into()))?;
        Ok(Self {
            child,
            stdout,
            path: path.to_path_buf(),
            width: info.width,
            height: info.height,
        })
    }

    /// Next decoded frame, or `None` once the stream is exhausted.
    pub async fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let mut buf = vec![0u8; self.width as usize * self.height as usize * 3];
        match self.stdout.read_exact(&mut buf).await {
            Ok(_) => Ok(RgbImage::from_raw(self.width, self.height, buf)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e).context("Reading decoded frame"),
        }
    }

    /// Stop decoding early (frame cap reached) or reap the finished child.
    /// A non-zero exit after a full read is an error.
    pub async fn finish(mut self, early: bool) -> Result<()> {
        if early {
            if let Err(e) = self.child.kill().await {
                debug!("[FFMPEG] decoder already gone: {}", e);
            }
            return Ok(());
        }
        let status = self.child.wait().await.context("Waiting for ffmpeg decoder")?;
        check_decoder_exit(status, &self.path)?;
        Ok(())
    }
}

/// Settings for an rgb24 -> mp4 encode.
#[derive(Debug, Clone)]
pub struct EncodeSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub encoder: String,
}

impl EncodeSettings {
    pub fn args(&self, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = [
            "-y", "-v", "error",
            "-f", "rawvideo",
            "-pix_fmt", "rgb24",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.extend([
            "-s".to_string(),
            format!("{}x{}", self.width, self.height),
            "-r".to_string(),
            format!("{}", self.fps),
            "-i".to_string(),
            "-".to_string(),
            // yuv420p needs even dimensions
            "-vf".to_string(),
            "pad=ceil(iw/2)*2:ceil(ih/2)*2".to_string(),
            "-c:v".to_string(),
            self.encoder.clone(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-f".to_string(),
            "mp4".to_string(),
        ]);
        args.push(output.to_string_lossy().into_owned());
        args
    }
}

/// rgb24 frame writer over an ffmpeg encode pipe.
pub struct FrameEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    output: PathBuf,
}

impl FrameEncoder {
    pub fn spawn(output: &Path, settings: &EncodeSettings) -> Result<Self> {
        let mut child = Command::new("ffmpeg")
            .args(settings.args(output))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("Spawning ffmpeg encoder")?;
        let stdin = child.stdin.take();
        Ok(Self {
            child,
            stdin,
            output: output.to_path_buf(),
        })
    }

    pub async fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| VeilError::Ffmpeg("encoder stdin closed".into()))?;
        stdin
            .write_all(frame.as_raw())
            .await
            .context("Writing frame to ffmpeg")?;
        Ok(())
    }

    /// Close the pipe and wait for the container to be finalised.
    pub async fn finish(mut self) -> Result<PathBuf> {
        drop(self.stdin.take());
        let out = self
            .child
            .wait_with_output()
            .await
            .context("Waiting for ffmpeg encoder")?;
        if !out.status.success() {
            return Err(VeilError::Ffmpeg(format!(
                "encode to {:?} failed: {}",
                self.output,
                String::from_utf8_lossy(&out.stderr).trim()
            ))
            .into());
        }
        Ok(self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        let ntsc = parse_frame_rate("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("garbage"), None);
    }

    #[test]
    fn test_parse_stream_info() {
        let info = parse_stream_info("1920,1080,24000/1001\n").unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
        assert!((info.fps.unwrap() - 23.976).abs() < 0.01);

        let no_rate = parse_stream_info("64,48,0/0").unwrap();
        assert_eq!(no_rate.fps, None);

        assert!(parse_stream_info("").is_none());
        assert!(parse_stream_info("0,0,25").is_none());
    }

    #[test]
    fn test_decode_args_disable_autorotate() {
        let args = decode_args(Path::new("/tmp/in.mp4"));
        let at = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert!(at("-noautorotate") < at("-i"));
        assert_eq!(args[at("-i") + 1], "/tmp/in.mp4");
        assert!(at("rgb24") > at("-i"));
        assert_eq!(args.last().unwrap(), "-");
    }

    #[cfg(unix)]
    #[test]
    fn test_check_decoder_exit() {
        use std::os::unix::process::ExitStatusExt;

        let path = Path::new("clip.mp4");
        assert!(check_decoder_exit(ExitStatus::from_raw(0), path).is_ok());
        // wait status for exit code 1
        let err = check_decoder_exit(ExitStatus::from_raw(1 << 8), path).unwrap_err();
        assert!(matches!(err, VeilError::Ffmpeg(_)));
    }

    #[test]
    fn test_encode_args() {
        let settings = EncodeSettings {
            width: 64,
            height: 48,
            fps: 30.0,
            encoder: "libx264".to_string(),
        };
        let args = settings.args(Path::new("/tmp/out.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-s 64x48"));
        assert!(joined.contains("-r 30"));
        assert!(joined.contains("-c:v libx264"));
        assert_eq!(args.last().unwrap(), "/tmp/out.mp4");
    }
}
