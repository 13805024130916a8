//! # Analysis Data Model
//!
//! Tipi prodotti dalla pipeline di analisi e serializzati in `analysis.json`.
//!
//! ## Strutture dati:
//! - `VideoMetadata`: durata, fps, risoluzione, codec, bitrate
//! - `SceneSegment`: intervallo tra due cambi di scena
//! - `Keyframe`: frame estratto a un timestamp preciso
//! - `ColorPalette`: colori dominanti (hex) con popolazione parallela
//! - `VideoAnalysisResult`: aggregato persistito e passato ai consumer
//!
//! I nomi dei campi JSON sono in camelCase per restare compatibili con i
//! consumer esistenti di `analysis.json`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Sentinel for frame numbers the pipeline does not compute
pub const UNKNOWN_FRAME: i64 = -1;

/// Container and video stream properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub duration: f64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    /// `None` when the container does not report a usable bitrate
    pub bitrate: Option<u64>,
}

impl VideoMetadata {
    /// Total frame count as round(duration * fps)
    pub fn total_frames(&self) -> u64 {
        (self.duration * self.fps).round().max(0.0) as u64
    }

    pub fn aspect(&self) -> AspectRatio {
        AspectRatio::classify(self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectRatio {
    Square,
    Landscape,
    Portrait,
}

impl AspectRatio {
    pub fn classify(width: u32, height: u32) -> Self {
        match width.cmp(&height) {
            std::cmp::Ordering::Equal => AspectRatio::Square,
            std::cmp::Ordering::Greater => AspectRatio::Landscape,
            std::cmp::Ordering::Less => AspectRatio::Portrait,
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AspectRatio::Square => "Square",
            AspectRatio::Landscape => "Landscape",
            AspectRatio::Portrait => "Portrait",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSegment {
    pub start_time: f64,
    pub end_time: f64,
    pub frame_number: i64,
    /// Equal to the detection threshold; the showinfo stream carries no per-cut score
    pub scene_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyframe {
    pub timestamp: f64,
    pub frame_number: i64,
    pub file_path: PathBuf,
}

/// Dominant colors of one frame, most to least dominant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorPalette {
    pub dominant_colors: Vec<String>,
    pub population: Vec<u32>,
}

impl ColorPalette {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.dominant_colors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoAnalysisResult {
    pub metadata: VideoMetadata,
    pub scenes: Vec<SceneSegment>,
    pub keyframes: Vec<Keyframe>,
    /// One palette per keyframe, same order
    pub color_palettes: Vec<ColorPalette>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_prompt: Option<String>,
    /// Opaque payload from the content orchestrator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestration: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(width: u32, height: u32) -> VideoMetadata {
        VideoMetadata {
            duration: 10.0,
            fps: 29.97,
            width,
            height,
            codec: "h264".into(),
            bitrate: None,
        }
    }

    #[test]
    fn test_aspect_classification() {
        assert_eq!(metadata(1080, 1080).aspect(), AspectRatio::Square);
        assert_eq!(metadata(1920, 1080).aspect(), AspectRatio::Landscape);
        assert_eq!(metadata(1080, 1920).aspect(), AspectRatio::Portrait);
    }

    #[test]
    fn test_total_frames_rounds() {
        assert_eq!(metadata(1920, 1080).total_frames(), 300);
    }

    #[test]
    fn test_result_json_shape() {
        let result = VideoAnalysisResult {
            metadata: metadata(1920, 1080),
            scenes: vec![],
            keyframes: vec![Keyframe {
                timestamp: 0.0,
                frame_number: UNKNOWN_FRAME,
                file_path: PathBuf::from("temp_frames/frame_0000.png"),
            }],
            color_palettes: vec![ColorPalette::empty()],
            generated_prompt: Some("prompt".into()),
            orchestration: None,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("colorPalettes").is_some());
        assert_eq!(json["keyframes"][0]["frameNumber"], -1);
        assert_eq!(json["metadata"]["bitrate"], serde_json::Value::Null);
        assert!(json.get("orchestration").is_none());
    }
}
