//! Audio extraction for uploaded videos.

use job_client::Error;
use log::*;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Extracts the audio track of `video` into an mp3 next to it and returns its path.
///
/// The output lands in the same staging directory as the input, so reaping the job's
/// input directory deletes it too.
pub async fn extract_audio(ffmpeg: &Path, video: &Path) -> Result<PathBuf, Error> {
    let audio = audio_path_for(video);

    debug!(
        "Extracting audio from {} into {}",
        video.display(),
        audio.display()
    );

    let output = Command::new(ffmpeg)
        .arg("-y")
        .arg("-i")
        .arg(video)
        .args(["-vn", "-acodec", "libmp3lame", "-ab", "128k", "-ac", "1"])
        .arg(&audio)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => Error::Configuration(format!(
                "ffmpeg binary not found at {}",
                ffmpeg.display()
            )),
            _ => Error::Other(Box::new(err)),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!("ffmpeg exited with {}: {}", output.status, stderr.trim());
        return Err(Error::Provider(format!(
            "audio extraction failed with {}",
            output.status
        )));
    }

    Ok(audio)
}

fn audio_path_for(video: &Path) -> PathBuf {
    let is_mp3 = video
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mp3"));

    if is_mp3 {
        video.with_extension("audio.mp3")
    } else {
        video.with_extension("mp3")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_lands_next_to_the_video() {
        assert_eq!(
            audio_path_for(Path::new("downloads/abc/input.mp4")),
            PathBuf::from("downloads/abc/input.mp3")
        );
        assert_eq!(
            audio_path_for(Path::new("downloads/abc/input.MP3")),
            PathBuf::from("downloads/abc/input.audio.mp3")
        );
    }

    #[tokio::test]
    async fn missing_ffmpeg_is_a_configuration_error() {
        let result = extract_audio(
            Path::new("/nonexistent/bin/ffmpeg"),
            Path::new("input.mp4"),
        )
        .await;

        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_ffmpeg_is_a_provider_error() {
        let result = extract_audio(Path::new("false"), Path::new("input.mp4")).await;

        assert!(matches!(result, Err(Error::Provider(_))));
    }
}
