use url::Url;

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Media position as `mm:ss`, or `h:mm:ss` past the first hour
pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// Inverse of [`format_timestamp`]
pub fn parse_timestamp(text: &str) -> Option<f64> {
    let parts: Vec<u64> = text
        .trim()
        .split(':')
        .map(|part| part.parse::<u64>().ok())
        .collect::<Option<_>>()?;

    let seconds = match parts.as_slice() {
        [minutes, secs] if *secs < 60 => minutes * 60 + secs,
        [hours, minutes, secs] if *minutes < 60 && *secs < 60 => hours * 3600 + minutes * 60 + secs,
        _ => return None,
    };

    Some(seconds as f64)
}

/// Sanitize filename for safe filesystem usage
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            match c {
                // Keep alphanumeric characters (CJK included), spaces, hyphens, underscores, and dots
                c if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' || c == '.' => c,
                // Replace everything else with underscore
                _ => '_',
            }
        })
        .take(100)
        .collect::<String>()
        .trim()
        .trim_start_matches('.')
        .to_string()
}

/// Map a short language code onto the locale AWS Transcribe expects
pub fn normalize_language_code(lang: &str) -> String {
    let normalized = match lang.to_lowercase().as_str() {
        "en" | "english" => "en-US",
        "es" | "spanish" => "es-ES",
        "fr" | "french" => "fr-FR",
        "de" | "german" => "de-DE",
        "it" | "italian" => "it-IT",
        "pt" | "portuguese" => "pt-BR",
        "ja" | "japanese" => "ja-JP",
        "ko" | "korean" => "ko-KR",
        "zh" | "chinese" => "zh-CN",
        "ar" | "arabic" => "ar-SA",
        "hi" | "hindi" => "hi-IN",
        "ru" | "russian" => "ru-RU",
        _ => lang, // Return as-is if no mapping found
    };

    normalized.to_string()
}

/// Extract domain from URL for display purposes
pub fn extract_domain(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .host_str()
        .map(|host| host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// Check if the current environment has required tools
pub async fn check_dependencies() -> Vec<String> {
    let tools = [
        ("yt-dlp", "--version", "yt-dlp - required for YouTube downloads"),
        ("you-get", "--version", "you-get - required for Bilibili downloads"),
        ("ffmpeg", "-version", "ffmpeg - required for audio extraction"),
        ("whisper", "--help", "whisper - required for the local transcription backend"),
    ];

    let mut missing = Vec::new();
    for (command, probe, description) in tools {
        if !check_command_available(command, probe).await {
            missing.push(description.to_string());
        }
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str, probe: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(probe)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
