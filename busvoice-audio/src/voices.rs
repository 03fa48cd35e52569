//! Voice discovery for the CLI engines

use std::path::Path;

use busvoice_core::VoiceProfile;
use tracing::debug;

/// Piper voice models in `dir`, named `<lang>_<REGION>-<name>-<quality>.onnx`,
/// sorted by file name. The model whose stem equals `default_stem` is marked as
/// the default voice.
pub async fn piper_voices(dir: &Path, default_stem: Option<&str>) -> Vec<VoiceProfile> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(target: "tts", dir = ?dir, error = %e, "Cannot read Piper voice dir");
            return Vec::new();
        }
    };
    let mut stems = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("onnx") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            stems.push(stem.to_string());
        }
    }
    stems.sort();
    stems
        .into_iter()
        .map(|stem| piper_profile(&stem, default_stem == Some(stem.as_str())))
        .collect()
}

fn piper_profile(stem: &str, is_default: bool) -> VoiceProfile {
    let tag = stem.split('-').next().unwrap_or(stem);
    let mut voice = VoiceProfile::new(tag, stem);
    voice.is_fallback_default = is_default;
    voice
}

/// Parse `espeak-ng --voices` output:
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  hi              --/M      Hindi              inc/hi
/// ```
///
/// The plain `en` voice is espeak's own default.
pub fn parse_espeak_voices(listing: &str) -> Vec<VoiceProfile> {
    listing
        .lines()
        .skip_while(|l| !l.trim_start().starts_with("Pty"))
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let _priority = cols.next()?;
            let language = cols.next()?;
            let _age_gender = cols.next()?;
            let name = cols.next()?;
            let mut voice = VoiceProfile::new(language, name.replace('_', " "));
            voice.is_fallback_default = language == "en";
            Some(voice)
        })
        .collect()
}
