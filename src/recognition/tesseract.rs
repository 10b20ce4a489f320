//! Tesseract command-line backend
//!
//! Each attempt writes the prepared image to a temporary PNG, runs the
//! `tesseract` binary on it with a deadline, and deletes the PNG when the
//! attempt ends, whatever the outcome.

use crossbeam_channel::{bounded, Sender};
use image::{DynamicImage, ImageFormat};
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempPath;
use tracing::{debug, warn};

use super::{EngineMode, RecognitionAttempt, RecognitionEngine, RecognitionFailure, TITLE_CHAR_WHITELIST};
use crate::config::RecognitionSettings;

/// How often a running engine process is polled for exit
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to wait for output pipes to drain after the process exits
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Recognition engine backed by the `tesseract` CLI
#[derive(Debug, Clone, Default)]
pub struct TesseractEngine {
    settings: RecognitionSettings,
}

impl TesseractEngine {
    pub fn new(settings: RecognitionSettings) -> Self {
        Self { settings }
    }

    /// Command-line arguments for one invocation
    pub fn build_args(&self, image_path: &Path, mode: EngineMode, languages: &[String]) -> Vec<OsString> {
        let languages = if languages.is_empty() {
            &self.settings.languages[..]
        } else {
            languages
        };

        let mut args: Vec<OsString> = vec![image_path.into(), "stdout".into()];
        if !languages.is_empty() {
            args.push("-l".into());
            args.push(languages.join("+").into());
        }
        args.push("--dpi".into());
        args.push(self.settings.dpi.to_string().into());

        if let Some(dir) = &self.settings.tessdata_dir {
            args.push("--tessdata-dir".into());
            args.push(dir.into());
        }

        args.push("--psm".into());
        args.push(mode.page_segmentation().to_string().into());

        if mode.is_title_focused() {
            args.push("-c".into());
            args.push(format!("tessedit_char_whitelist={}", TITLE_CHAR_WHITELIST).into());
            args.push("-c".into());
            args.push("preserve_interword_spaces=1".into());
        }

        args
    }

    /// Write `image` to a PNG that is deleted when the returned path drops
    fn write_temp_image(&self, image: &DynamicImage) -> Result<TempPath, RecognitionFailure> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("card_ocr_").suffix(".png");

        let file = match &self.settings.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| RecognitionFailure::TempFile(e.to_string()))?;

        // Close the handle before the engine opens the file; the path still
        // removes the file on drop
        let path = file.into_temp_path();
        let mut writer = std::fs::File::create(&path)
            .map(std::io::BufWriter::new)
            .map_err(|e| RecognitionFailure::TempFile(e.to_string()))?;
        image
            .write_to(&mut writer, ImageFormat::Png)
            .map_err(|e| RecognitionFailure::TempFile(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| RecognitionFailure::TempFile(e.to_string()))?;

        Ok(path)
    }

    /// Run the engine on an image file, bounded by the configured timeout
    fn run(&self, image_path: &Path, mode: EngineMode, languages: &[String]) -> Result<String, RecognitionFailure> {
        let mut command = Command::new(&self.settings.binary);
        command
            .args(self.build_args(image_path, mode, languages))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.settings.tessdata_dir {
            command.env("TESSDATA_PREFIX", dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| RecognitionFailure::Spawn(format!("{:?}: {}", self.settings.binary, e)))?;

        let (tx, rx) = bounded(2);
        spawn_reader(child.stdout.take(), Stream::Stdout, tx.clone());
        spawn_reader(child.stderr.take(), Stream::Stderr, tx);

        let timeout = self.settings.timeout();
        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RecognitionFailure::Timeout(timeout));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RecognitionFailure::Spawn(e.to_string()));
                }
            }
        };

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        for _ in 0..2 {
            match rx.recv_timeout(DRAIN_TIMEOUT) {
                Ok((Stream::Stdout, bytes)) => stdout = bytes,
                Ok((Stream::Stderr, bytes)) => stderr = bytes,
                Err(_) => break,
            }
        }
        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();

        if !stderr.trim().is_empty() {
            debug!("tesseract stderr ({:?}): {}", mode, stderr.trim());
        }

        if !status.success() {
            return Err(RecognitionFailure::ExitStatus {
                code: status.code(),
                output: format!("{}{}", stdout, stderr).trim().to_string(),
            });
        }

        Ok(stdout)
    }
}

/// Read a child pipe to the end on a background thread
fn spawn_reader<R>(source: Option<R>, stream: Stream, tx: Sender<(Stream, Vec<u8>)>)
where
    R: Read + Send + 'static,
{
    let Some(mut source) = source else {
        let _ = tx.send((stream, Vec::new()));
        return;
    };

    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = source.read_to_end(&mut buffer);
        let _ = tx.send((stream, buffer));
    });
}

impl RecognitionEngine for TesseractEngine {
    fn recognize(&self, image: &DynamicImage, mode: EngineMode, languages: &[String]) -> RecognitionAttempt {
        let start = Instant::now();

        let temp_image = match self.write_temp_image(image) {
            Ok(path) => path,
            Err(failure) => {
                warn!("Recognition ({:?}) skipped: {}", mode, failure);
                return RecognitionAttempt::failed(mode, failure);
            }
        };

        let result = self.run(&temp_image, mode, languages);
        drop(temp_image);

        match result {
            Ok(text) => {
                debug!(
                    "Recognition ({:?}) on {}x{} finished in {:?}: {:?}",
                    mode,
                    image.width(),
                    image.height(),
                    start.elapsed(),
                    text.trim()
                );
                RecognitionAttempt::success(mode, text)
            }
            Err(failure) => {
                warn!("Recognition ({:?}) failed after {:?}: {}", mode, start.elapsed(), failure);
                RecognitionAttempt::failed(mode, failure)
            }
        }
    }
}

/// Write an executable shell script standing in for the engine
///
/// The script is run once before returning so that a concurrent fork
/// holding the write handle cannot make later spawns fail with ETXTBSY.
#[cfg(all(test, unix))]
pub(crate) fn write_fake_engine(dir: &Path, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("fake-tesseract");
    std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    for _ in 0..50 {
        if Command::new(&script).output().is_ok() {
            return script;
        }
        thread::sleep(POLL_INTERVAL);
    }
    panic!("fake engine {:?} never became executable", script);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn dir_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    fn sample_image() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(40, 12, |x, _| {
            image::Luma([if x % 5 == 0 { 0 } else { 255 }])
        }))
    }

    #[test]
    fn test_build_args_title_mode() {
        let engine = TesseractEngine::new(RecognitionSettings {
            tessdata_dir: Some(PathBuf::from("/opt/tessdata")),
            ..Default::default()
        });
        let args = engine.build_args(Path::new("/tmp/x.png"), EngineMode::FocusedLine, &[]);
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        assert_eq!(args[0], "/tmp/x.png");
        assert_eq!(args[1], "stdout");
        assert!(args.windows(2).any(|w| w == ["-l", "eng+por"]));
        assert!(args.windows(2).any(|w| w == ["--dpi", "300"]));
        assert!(args.windows(2).any(|w| w == ["--tessdata-dir", "/opt/tessdata"]));
        assert!(args.windows(2).any(|w| w == ["--psm", "7"]));
        assert!(args
            .iter()
            .any(|a| a == &format!("tessedit_char_whitelist={}", TITLE_CHAR_WHITELIST)));
    }

    #[test]
    fn test_build_args_full_page() {
        let engine = TesseractEngine::default();
        let languages = vec!["por".to_string()];
        let args = engine.build_args(Path::new("card.png"), EngineMode::FullPage, &languages);
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        assert!(args.windows(2).any(|w| w == ["-l", "por"]));
        assert!(args.windows(2).any(|w| w == ["--psm", "3"]));
        assert!(!args.iter().any(|a| a.starts_with("tessedit_char_whitelist")));
        assert!(!args.iter().any(|a| a == "--tessdata-dir"));
    }

    #[test]
    fn test_missing_binary_is_soft_failure() {
        let temp_dir = TempDir::new().unwrap();
        let engine = TesseractEngine::new(RecognitionSettings {
            binary: PathBuf::from("/nonexistent/bin/tesseract"),
            temp_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        });

        let attempt = engine.recognize(&sample_image(), EngineMode::FocusedLine, &[]);

        assert!(!attempt.succeeded);
        assert!(attempt.raw_text.is_empty());
        assert!(matches!(attempt.failure, Some(RecognitionFailure::Spawn(_))));
        assert_eq!(dir_entries(temp_dir.path()), 0);
    }

    #[test]
    fn test_unwritable_temp_dir_is_soft_failure() {
        let engine = TesseractEngine::new(RecognitionSettings {
            temp_dir: Some(PathBuf::from("/nonexistent/card-lens-temp")),
            ..Default::default()
        });

        let attempt = engine.recognize(&sample_image(), EngineMode::FullPage, &[]);
        assert!(matches!(attempt.failure, Some(RecognitionFailure::TempFile(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_run_returns_stdout() {
        let script_dir = TempDir::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let engine = TesseractEngine::new(RecognitionSettings {
            binary: write_fake_engine(script_dir.path(), "echo SQUIRILE\necho 'warning: low dpi' >&2"),
            temp_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        });

        let attempt = engine.recognize(&sample_image(), EngineMode::FocusedLine, &[]);

        assert!(attempt.succeeded, "{:?}", attempt.failure);
        assert_eq!(attempt.raw_text, "SQUIRILE\n");
        assert_eq!(attempt.text(), Some("SQUIRILE\n"));
        assert_eq!(dir_entries(temp_dir.path()), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_soft_failure() {
        let script_dir = TempDir::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let engine = TesseractEngine::new(RecognitionSettings {
            binary: write_fake_engine(script_dir.path(), "echo 'Error opening data file' >&2\nexit 1"),
            temp_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        });

        let attempt = engine.recognize(&sample_image(), EngineMode::FullPage, &[]);

        assert!(!attempt.succeeded);
        assert!(attempt.raw_text.is_empty());
        match attempt.failure {
            Some(RecognitionFailure::ExitStatus { code, output }) => {
                assert_eq!(code, Some(1));
                assert!(output.contains("Error opening data file"), "{}", output);
            }
            other => panic!("unexpected failure {:?}", other),
        }
        assert_eq!(dir_entries(temp_dir.path()), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_engine_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let script_dir = TempDir::new().unwrap();
        let script = script_dir.path().join("slow-engine");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let temp_dir = TempDir::new().unwrap();
        let engine = TesseractEngine::new(RecognitionSettings {
            binary: script,
            timeout_ms: 200,
            temp_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        });

        let start = Instant::now();
        let attempt = engine.recognize(&sample_image(), EngineMode::FocusedBlock, &[]);

        assert!(!attempt.succeeded);
        assert!(attempt.raw_text.is_empty());
        assert!(start.elapsed() < Duration::from_secs(4));
        assert_eq!(dir_entries(temp_dir.path()), 0);
    }
}
