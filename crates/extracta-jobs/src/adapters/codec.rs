//! Encoder argument table.
//!
//! Maps a declared `(format, quality)` pair to the codec arguments passed to
//! ffmpeg. Pure and deterministic; unknown formats fall back to stream copy.

use extracta_core::defaults::OUTPUT_FORMAT;

/// Codec arguments for `format` at `quality`.
///
/// Inputs are trimmed and lowercased. An empty format means `mp3`, an unknown
/// quality means `medium`, and an unrecognized format yields
/// `-codec:a copy` without a container flag.
pub fn encoder_args(format: &str, quality: &str) -> Vec<String> {
    let format = format.trim().to_lowercase();
    let quality = quality.trim().to_lowercase();
    let format = if format.is_empty() {
        OUTPUT_FORMAT
    } else {
        format.as_str()
    };

    let codec: &[&str] = match format {
        "mp3" => match quality.as_str() {
            "low" => &["-codec:a", "libmp3lame", "-b:a", "96k"],
            "high" => &["-codec:a", "libmp3lame", "-b:a", "320k"],
            "original" => &["-codec:a", "libmp3lame", "-q:a", "0"],
            _ => &["-codec:a", "libmp3lame", "-b:a", "192k"],
        },
        "wav" => &["-codec:a", "pcm_s16le"],
        "aac" => match quality.as_str() {
            "low" => &["-codec:a", "aac", "-b:a", "96k"],
            "high" => &["-codec:a", "aac", "-b:a", "320k"],
            "original" => &["-codec:a", "aac", "-b:a", "384k"],
            _ => &["-codec:a", "aac", "-b:a", "192k"],
        },
        "flac" => match quality.as_str() {
            "high" | "original" => &["-codec:a", "flac", "-compression_level", "12"],
            _ => &["-codec:a", "flac", "-compression_level", "8"],
        },
        "ogg" => match quality.as_str() {
            "low" => &["-codec:a", "libvorbis", "-qscale:a", "2"],
            "high" | "original" => &["-codec:a", "libvorbis", "-qscale:a", "8"],
            _ => &["-codec:a", "libvorbis", "-qscale:a", "5"],
        },
        _ => return vec!["-codec:a".to_string(), "copy".to_string()],
    };

    ["-f", format]
        .iter()
        .chain(codec.iter())
        .map(|s| s.to_string())
        .collect()
}
