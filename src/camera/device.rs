//! Capture device enumeration.

use super::types::{CameraError, CameraInfo};

/// List video capture devices available to ffmpeg.
///
/// Returns an empty vector when no cameras are present.
pub fn list_devices() -> Result<Vec<CameraInfo>, CameraError> {
    #[cfg(target_os = "linux")]
    {
        list_v4l2_devices()
    }
    #[cfg(target_os = "macos")]
    {
        let stderr = run_ffmpeg_listing(&["-f", "avfoundation", "-list_devices", "true", "-i", ""])?;
        Ok(parse_avfoundation_list(&stderr))
    }
    #[cfg(target_os = "windows")]
    {
        let stderr = run_ffmpeg_listing(&["-list_devices", "true", "-f", "dshow", "-i", "dummy"])?;
        Ok(parse_dshow_list(&stderr))
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        Ok(Vec::new())
    }
}

#[cfg(target_os = "linux")]
fn list_v4l2_devices() -> Result<Vec<CameraInfo>, CameraError> {
    let entries = match std::fs::read_dir("/dev") {
        Ok(entries) => entries,
        Err(e) => {
            return Err(CameraError::DeviceUnavailable(format!(
                "cannot read /dev: {}",
                e
            )))
        }
    };

    let mut devices: Vec<CameraInfo> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            let index = name.strip_prefix("video")?.parse::<u32>().ok()?;
            let label = std::fs::read_to_string(format!(
                "/sys/class/video4linux/{}/name",
                name
            ))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| format!("/dev/{}", name));
            Some((index, label))
        })
        .map(|(index, label)| CameraInfo {
            id: index.to_string(),
            name: label,
        })
        .collect();

    devices.sort_by_key(|d| d.id.parse::<u32>().unwrap_or(u32::MAX));
    Ok(devices)
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
fn run_ffmpeg_listing(args: &[&str]) -> Result<String, CameraError> {
    use std::process::{Command, Stdio};

    let output = Command::new("ffmpeg")
        .args(["-hide_banner"])
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CameraError::DeviceUnavailable("ffmpeg not found".to_string())
            } else {
                CameraError::DeviceUnavailable(format!("failed to run ffmpeg: {}", e))
            }
        })?;

    // ffmpeg prints the device list to stderr
    Ok(String::from_utf8_lossy(&output.stderr).to_string())
}

/// Parse the video section of ffmpeg's AVFoundation device listing.
///
/// Lines look like `[AVFoundation indev @ 0x...] [0] FaceTime HD Camera`.
pub fn parse_avfoundation_list(stderr: &str) -> Vec<CameraInfo> {
    let mut devices = Vec::new();
    let mut in_video_section = false;

    for line in stderr.lines() {
        if line.contains("AVFoundation video devices:") {
            in_video_section = true;
            continue;
        }
        if line.contains("AVFoundation audio devices:") {
            in_video_section = false;
            continue;
        }
        if !in_video_section {
            continue;
        }

        let Some(bracket_idx) = line.find("] [") else {
            continue;
        };
        let after = &line[bracket_idx + 3..];
        let Some(close) = after.find(']') else {
            continue;
        };
        let Ok(index) = after[..close].parse::<u32>() else {
            continue;
        };
        let name = after[close + 1..].trim();
        // Screens show up as video devices too; they are not cameras.
        if name.is_empty() || name.starts_with("Capture screen") {
            continue;
        }
        devices.push(CameraInfo {
            id: index.to_string(),
            name: name.to_string(),
        });
    }

    devices
}

/// Parse ffmpeg's DirectShow device listing.
///
/// Lines look like `[dshow @ 0x...] "Integrated Camera" (video)`.
pub fn parse_dshow_list(stderr: &str) -> Vec<CameraInfo> {
    stderr
        .lines()
        .filter(|line| line.trim_end().ends_with("(video)"))
        .filter_map(|line| {
            let start = line.find('"')?;
            let end = line[start + 1..].find('"')? + start + 1;
            let name = &line[start + 1..end];
            Some(CameraInfo {
                id: name.to_string(),
                name: name.to_string(),
            })
        })
        .collect()
}
