//! Speech sink backed by local CLI TTS engines
//!
//! Engines, with graceful degradation:
//! - Piper (higher quality, needs voice models and an audio player)
//! - espeak-ng (widely available, plays directly when no player is found)
//! - neither: the sink reports itself unavailable
//!
//! Env overrides:
//! - PIPER_BIN, PIPER_VOICE (default model), PIPER_VOICE_DIR
//! - ESPEAK_BIN
//! - TTS_TIMEOUT_MS, TTS_TEMP_DIR, TTS_PLAYER, TTS_ENGINE

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use busvoice_core::{BusVoiceError, Result, SpeechSink, Utterance, VoiceProfile};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::watch;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::voices;
use crate::wav::scale_wav_pcm16_inplace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Piper,
    #[serde(alias = "espeak-ng")]
    Espeak,
}

impl Engine {
    pub fn as_str(self) -> &'static str {
        match self {
            Engine::Piper => "piper",
            Engine::Espeak => "espeak-ng",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CommandSinkConfig {
    pub temp_dir: PathBuf,
    pub timeout_ms: u64,
    pub sample_rate: u32,
    pub piper_bin: Option<PathBuf>,
    pub piper_voice: Option<PathBuf>,
    pub piper_voice_dir: Option<PathBuf>,
    pub espeak_bin: Option<PathBuf>,
    /// Player binary name or path (aplay, paplay, ffplay)
    pub player: Option<String>,
    /// Use this engine when it is installed
    pub prefer: Option<Engine>,
}

impl Default for CommandSinkConfig {
    fn default() -> Self {
        let temp_dir = std::env::var("TTS_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());
        let timeout_ms = std::env::var("TTS_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(20_000);

        let piper_bin = get_from_env_or_path("PIPER_BIN", "piper");
        let piper_voice = std::env::var("PIPER_VOICE").ok().map(PathBuf::from);
        let piper_voice_dir = std::env::var("PIPER_VOICE_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                piper_voice
                    .as_ref()
                    .and_then(|v| v.parent().map(Path::to_path_buf))
            });
        let espeak_bin =
            get_from_env_or_path("ESPEAK_BIN", "espeak-ng").or_else(|| get_from_path("espeak"));
        let player = std::env::var("TTS_PLAYER").ok();
        let prefer = std::env::var("TTS_ENGINE")
            .ok()
            .and_then(|s| match s.trim().to_ascii_lowercase().as_str() {
                "piper" => Some(Engine::Piper),
                "espeak" | "espeak-ng" => Some(Engine::Espeak),
                _ => None,
            });

        Self {
            temp_dir,
            timeout_ms,
            sample_rate: 22_050,
            piper_bin,
            piper_voice,
            piper_voice_dir,
            espeak_bin,
            player,
            prefer,
        }
    }
}

impl CommandSinkConfig {
    /// Nothing detected; the resulting sink is unavailable
    pub fn none() -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
            timeout_ms: 20_000,
            sample_rate: 22_050,
            piper_bin: None,
            piper_voice: None,
            piper_voice_dir: None,
            espeak_bin: None,
            player: None,
            prefer: None,
        }
    }
}

fn get_from_env_or_path(env_key: &str, default_bin: &str) -> Option<PathBuf> {
    if let Ok(p) = std::env::var(env_key) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Some(pb);
        }
    }
    get_from_path(default_bin)
}

fn get_from_path(bin: &str) -> Option<PathBuf> {
    if bin.contains(std::path::MAIN_SEPARATOR) {
        let p = PathBuf::from(bin);
        return if p.exists() { Some(p) } else { None };
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(bin))
        .find(|candidate| candidate.exists())
}

fn select_player(pref: Option<&str>) -> Option<PathBuf> {
    pref.and_then(get_from_path)
        .or_else(|| get_from_path("aplay"))
        .or_else(|| get_from_path("paplay"))
        .or_else(|| get_from_path("ffplay"))
}

/// Piper writes a WAV and needs a player; espeak-ng can play by itself.
fn select_engine(cfg: &CommandSinkConfig, player: Option<&Path>) -> Option<Engine> {
    let piper_ok = cfg.piper_bin.is_some()
        && player.is_some()
        && (cfg.piper_voice.is_some() || cfg.piper_voice_dir.is_some());
    let espeak_ok = cfg.espeak_bin.is_some();
    match cfg.prefer {
        Some(Engine::Espeak) if espeak_ok => Some(Engine::Espeak),
        _ if piper_ok => Some(Engine::Piper),
        _ if espeak_ok => Some(Engine::Espeak),
        _ => None,
    }
}

pub struct CommandSink {
    cfg: CommandSinkConfig,
    engine: Option<Engine>,
    player: Option<PathBuf>,
    /// Bumped by `stop`
    interrupt: watch::Sender<u64>,
    seq: AtomicU64,
}

impl CommandSink {
    pub fn new(cfg: Option<CommandSinkConfig>) -> Self {
        let cfg = cfg.unwrap_or_default();
        let player = select_player(cfg.player.as_deref());
        let engine = select_engine(&cfg, player.as_deref());
        match engine {
            Some(engine) => {
                info!(target: "tts", engine = engine.as_str(), player = ?player, "Detected TTS engine")
            }
            None => warn!(target: "tts", "No TTS engine detected"),
        }
        Self {
            cfg,
            engine,
            player,
            interrupt: watch::channel(0).0,
            seq: AtomicU64::new(0),
        }
    }

    pub fn engine(&self) -> Option<Engine> {
        self.engine
    }

    fn wav_path(&self) -> PathBuf {
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        self.cfg
            .temp_dir
            .join(format!("busvoice_{}_{}.wav", std::process::id(), n))
    }

    fn piper_model(&self, voice: Option<&VoiceProfile>) -> Option<PathBuf> {
        if let (Some(v), Some(dir)) = (voice, &self.cfg.piper_voice_dir) {
            let candidate = dir.join(format!("{}.onnx", v.display_name));
            if candidate.exists() {
                return Some(candidate);
            }
        }
        self.cfg.piper_voice.clone()
    }

    async fn render(&self, engine: Engine, utterance: &Utterance, wav: &Path) -> Result<()> {
        match engine {
            Engine::Piper => {
                self.synth_with_piper(utterance, wav).await?;
                if (utterance.volume - 1.0).abs() > f32::EPSILON {
                    let path = wav.to_path_buf();
                    let gain = utterance.volume;
                    let scaled =
                        tokio::task::spawn_blocking(move || scale_wav_pcm16_inplace(&path, gain))
                            .await
                            .map_err(|e| BusVoiceError::Synthesis(e.to_string()))?;
                    if let Err(e) = scaled {
                        warn!(target: "tts", error = %e, "Failed to scale volume for WAV");
                    }
                }
                self.play(wav).await
            }
            Engine::Espeak => match &self.player {
                Some(_) => {
                    self.synth_with_espeak(utterance, Some(wav)).await?;
                    self.play(wav).await
                }
                None => self.synth_with_espeak(utterance, None).await,
            },
        }
    }

    async fn synth_with_piper(&self, utterance: &Utterance, out_wav: &Path) -> Result<()> {
        let piper = self
            .cfg
            .piper_bin
            .as_ref()
            .ok_or_else(|| BusVoiceError::SynthesisUnavailable("piper binary not found".into()))?;
        let model = self.piper_model(utterance.voice.as_ref()).ok_or_else(|| {
            BusVoiceError::Synthesis(format!(
                "no Piper voice for {}; set PIPER_VOICE or PIPER_VOICE_DIR",
                utterance.language
            ))
        })?;

        let mut cmd = Command::new(piper);
        cmd.arg("-m").arg(&model);
        cmd.arg("-f").arg(out_wav);
        let length_scale = (1.0f32 / utterance.rate.max(0.1)).clamp(0.5, 2.0);
        cmd.arg("--length_scale").arg(format!("{:.2}", length_scale));
        cmd.arg("--sample_rate").arg(self.cfg.sample_rate.to_string());
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(target: "tts", model = ?model, "Running piper");
        let mut child = cmd.spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(utterance.text.as_bytes()).await?;
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(BusVoiceError::Synthesis(format!(
                "piper failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn synth_with_espeak(&self, utterance: &Utterance, out_wav: Option<&Path>) -> Result<()> {
        let espeak = self
            .cfg
            .espeak_bin
            .as_ref()
            .ok_or_else(|| BusVoiceError::SynthesisUnavailable("espeak-ng not found".into()))?;
        let wpm = (160.0 * utterance.rate).round().clamp(80.0, 450.0) as i32;
        let amp = (100.0 * utterance.volume).round().clamp(0.0, 200.0) as i32;

        let mut cmd = Command::new(espeak);
        if let Some(voice) = &utterance.voice {
            cmd.arg("-v").arg(&voice.language_tag);
        }
        cmd.arg("-s").arg(wpm.to_string());
        cmd.arg("-a").arg(amp.to_string());
        if let Some(out) = out_wav {
            cmd.arg("-w").arg(out);
        }
        cmd.arg("--").arg(&utterance.text);
        cmd.stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(target: "tts", wpm, amp, "Running espeak-ng");
        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(BusVoiceError::Synthesis(format!(
                "espeak-ng failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn play(&self, wav: &Path) -> Result<()> {
        let player = self
            .player
            .as_ref()
            .ok_or_else(|| BusVoiceError::SynthesisUnavailable("no audio player found".into()))?;
        let mut cmd = Command::new(player);
        if player.file_name().and_then(|s| s.to_str()) == Some("ffplay") {
            cmd.arg("-autoexit").arg("-nodisp").arg("-loglevel").arg("quiet");
        }
        cmd.arg(wav)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        let status = cmd.status().await?;
        if !status.success() {
            return Err(BusVoiceError::Synthesis(format!(
                "{} exited with {}",
                player.display(),
                status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SpeechSink for CommandSink {
    fn name(&self) -> String {
        self.engine.map(Engine::as_str).unwrap_or("none").to_string()
    }

    fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    async fn list_voices(&self) -> Vec<VoiceProfile> {
        match self.engine {
            Some(Engine::Piper) => {
                let default_stem = self
                    .cfg
                    .piper_voice
                    .as_ref()
                    .and_then(|p| p.file_stem())
                    .and_then(|s| s.to_str());
                match &self.cfg.piper_voice_dir {
                    Some(dir) => voices::piper_voices(dir, default_stem).await,
                    None => Vec::new(),
                }
            }
            Some(Engine::Espeak) => {
                let Some(bin) = &self.cfg.espeak_bin else {
                    return Vec::new();
                };
                let mut cmd = Command::new(bin);
                cmd.arg("--voices")
                    .stderr(Stdio::null())
                    .kill_on_drop(true);
                match timeout(Duration::from_secs(5), cmd.output()).await {
                    Ok(Ok(out)) => voices::parse_espeak_voices(&String::from_utf8_lossy(&out.stdout)),
                    Ok(Err(e)) => {
                        warn!(target: "tts", error = %e, "Failed to list espeak-ng voices");
                        Vec::new()
                    }
                    Err(_) => {
                        warn!(target: "tts", "Listing espeak-ng voices timed out");
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        }
    }

    // Not `async fn`: the interrupt subscription is taken when `speak` is
    // called, so a `stop` issued before the first poll still applies.
    fn speak<'life0, 'async_trait>(
        &'life0 self,
        utterance: Utterance,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        Self: 'async_trait,
    {
        let mut interrupted = self.interrupt.subscribe();
        Box::pin(async move {
            let Some(engine) = self.engine else {
                return Err(BusVoiceError::SynthesisUnavailable(
                    "no TTS engine detected".into(),
                ));
            };
            let wav = self.wav_path();
            let limit = Duration::from_millis(self.cfg.timeout_ms);

            // Dropping the render future kills any running child process
            let outcome = tokio::select! {
                rendered = timeout(limit, self.render(engine, &utterance, &wav)) => match rendered {
                    Ok(result) => result,
                    Err(_) => Err(BusVoiceError::Synthesis(format!(
                        "{} timed out after {} ms",
                        engine.as_str(),
                        self.cfg.timeout_ms
                    ))),
                },
                _ = interrupted.changed() => {
                    debug!(target: "tts", "Utterance interrupted");
                    Ok(())
                }
            };

            // Not every path writes a file
            let _ = tokio::fs::remove_file(&wav).await;
            outcome
        })
    }

    async fn stop(&self) {
        self.interrupt.send_modify(|n| *n = n.wrapping_add(1));
    }
}
