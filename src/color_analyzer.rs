//! # Color Analysis Module
//!
//! Estrae una palette di colori dominanti da ogni keyframe.
//!
//! ## Algoritmo:
//! 1. Decodifica con `image` e riduzione di scala (1/5 per lato)
//! 2. Scarta pixel trasparenti e quasi bianchi
//! 3. Quantizzazione NeuQuant (`color_quant`, 64 colori) e conteggio dei pixel per colore
//! 4. Selezione delle sei swatch nominate (Vibrant, DarkVibrant,
//!    LightVibrant, Muted, DarkMuted, LightMuted) per distanza da target HSL
//! 5. Ordinamento per popolazione decrescente, prime 5
//!
//! ## Isolamento degli errori:
//! `analyze_frames` non fallisce mai: un frame illeggibile produce una palette
//! vuota e un warning, il batch prosegue.

use crate::error::{PipelineError, Result};
use crate::models::ColorPalette;
use color_quant::NeuQuant;
use image::GenericImageView;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const MAX_PALETTE_COLORS: usize = 5;

const QUALITY: u32 = 5;
const COLOR_COUNT: usize = 64;
/// Frames are already downscaled, so NeuQuant learns from every pixel
const SAMPLE_FACTOR: i32 = 1;

const TARGET_DARK_LUMA: f64 = 0.26;
const MAX_DARK_LUMA: f64 = 0.45;
const MIN_LIGHT_LUMA: f64 = 0.55;
const TARGET_LIGHT_LUMA: f64 = 0.74;
const MIN_NORMAL_LUMA: f64 = 0.3;
const TARGET_NORMAL_LUMA: f64 = 0.5;
const MAX_NORMAL_LUMA: f64 = 0.7;
const TARGET_MUTED_SATURATION: f64 = 0.3;
const MAX_MUTED_SATURATION: f64 = 0.4;
const TARGET_VIBRANT_SATURATION: f64 = 1.0;
const MIN_VIBRANT_SATURATION: f64 = 0.35;
const WEIGHT_SATURATION: f64 = 3.0;
const WEIGHT_LUMA: f64 = 6.5;
const WEIGHT_POPULATION: f64 = 0.5;

/// A quantized color and how many sampled pixels it stands for
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Swatch {
    pub rgb: [u8; 3],
    pub population: u32,
}

impl Swatch {
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.rgb[0], self.rgb[1], self.rgb[2])
    }

    pub fn hsl(&self) -> [f64; 3] {
        rgb_to_hsl(self.rgb)
    }
}

/// Extracts dominant-color palettes from still frames
#[derive(Debug, Default, Clone)]
pub struct ColorAnalyzer;

impl ColorAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// One palette per path, same order; failures become empty palettes
    pub async fn analyze_frames(&self, frame_paths: &[PathBuf]) -> Vec<ColorPalette> {
        let mut palettes = Vec::with_capacity(frame_paths.len());

        for path in frame_paths {
            match self.extract_color_palette(path).await {
                Ok(palette) => palettes.push(palette),
                Err(e) => {
                    warn!("{}", e);
                    palettes.push(ColorPalette::empty());
                }
            }
        }

        palettes
    }

    /// Palette of a single image; decoding runs on the blocking pool
    pub async fn extract_color_palette(&self, image_path: &Path) -> Result<ColorPalette> {
        let path = image_path.to_path_buf();
        let task_path = path.clone();

        tokio::task::spawn_blocking(move || palette_from_file(&task_path))
            .await
            .map_err(|e| PipelineError::ColorExtraction {
                path,
                message: format!("palette task failed: {}", e),
            })?
    }
}

fn palette_from_file(path: &Path) -> Result<ColorPalette> {
    let image = image::open(path).map_err(|e| PipelineError::ColorExtraction {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let (width, height) = image.dimensions();
    let scaled = if width > QUALITY && height > QUALITY {
        image.thumbnail(width / QUALITY, height / QUALITY)
    } else {
        image
    };

    let pixels: Vec<[u8; 3]> = scaled
        .to_rgba8()
        .pixels()
        .filter(|p| p[3] >= 125)
        .filter(|p| !(p[0] > 250 && p[1] > 250 && p[2] > 250))
        .map(|p| [p[0], p[1], p[2]])
        .collect();

    let palette = palette_from_pixels(&pixels);
    debug!("{} -> {:?}", path.display(), palette.dominant_colors);
    Ok(palette)
}

/// Named swatches of the pixels, sorted by population, top five
pub fn palette_from_pixels(pixels: &[[u8; 3]]) -> ColorPalette {
    let swatches = quantize(pixels, COLOR_COUNT);
    let mut named: Vec<Swatch> = NamedSwatches::generate(&swatches).swatches().collect();
    named.sort_by(|a, b| b.population.cmp(&a.population));
    named.truncate(MAX_PALETTE_COLORS);

    ColorPalette {
        dominant_colors: named.iter().map(Swatch::hex).collect(),
        population: named.iter().map(|s| s.population).collect(),
    }
}

/// NeuQuant over the sampled pixels, then every pixel is counted against
/// the learned color map. Unused entries are dropped.
pub fn quantize(pixels: &[[u8; 3]], max_colors: usize) -> Vec<Swatch> {
    if pixels.is_empty() || max_colors == 0 {
        return Vec::new();
    }

    let rgba: Vec<u8> = pixels.iter().flat_map(|p| [p[0], p[1], p[2], u8::MAX]).collect();
    let quant = NeuQuant::new(SAMPLE_FACTOR, max_colors, &rgba);

    let mut populations = vec![0u32; max_colors];
    for pixel in rgba.chunks_exact(4) {
        if let Some(count) = populations.get_mut(quant.index_of(pixel)) {
            *count += 1;
        }
    }

    populations
        .iter()
        .enumerate()
        .filter(|(_, &count)| count > 0)
        .filter_map(|(index, &population)| {
            quant
                .lookup(index)
                .map(|[r, g, b, _]| Swatch { rgb: [r, g, b], population })
        })
        .collect()
}

/// HSL in [0, 1] for every component
pub fn rgb_to_hsl(rgb: [u8; 3]) -> [f64; 3] {
    let [r, g, b] = rgb.map(|c| f64::from(c) / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if max == min {
        return [0.0, 0.0, l];
    }

    let d = max - min;
    let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };
    let h = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };

    [h / 6.0, s, l]
}

fn hsl_to_rgb(hsl: [f64; 3]) -> [u8; 3] {
    let [h, s, l] = hsl;
    if s == 0.0 {
        let v = (l * 255.0).round() as u8;
        return [v, v, v];
    }

    fn hue_to_rgb(p: f64, q: f64, mut t: f64) -> f64 {
        if t < 0.0 {
            t += 1.0;
        }
        if t > 1.0 {
            t -= 1.0;
        }
        if t < 1.0 / 6.0 {
            return p + (q - p) * 6.0 * t;
        }
        if t < 0.5 {
            return q;
        }
        if t < 2.0 / 3.0 {
            return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
        }
        p
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    [h + 1.0 / 3.0, h, h - 1.0 / 3.0].map(|t| (hue_to_rgb(p, q, t) * 255.0).round() as u8)
}

struct Target {
    min_luma: f64,
    target_luma: f64,
    max_luma: f64,
    min_saturation: f64,
    target_saturation: f64,
    max_saturation: f64,
}

impl Target {
    const fn new(luma: (f64, f64, f64), saturation: (f64, f64, f64)) -> Self {
        Self {
            min_luma: luma.0,
            target_luma: luma.1,
            max_luma: luma.2,
            min_saturation: saturation.0,
            target_saturation: saturation.1,
            max_saturation: saturation.2,
        }
    }
}

const VIBRANT: Target = Target::new(
    (MIN_NORMAL_LUMA, TARGET_NORMAL_LUMA, MAX_NORMAL_LUMA),
    (MIN_VIBRANT_SATURATION, TARGET_VIBRANT_SATURATION, 1.0),
);
const LIGHT_VIBRANT: Target = Target::new(
    (MIN_LIGHT_LUMA, TARGET_LIGHT_LUMA, 1.0),
    (MIN_VIBRANT_SATURATION, TARGET_VIBRANT_SATURATION, 1.0),
);
const DARK_VIBRANT: Target = Target::new(
    (0.0, TARGET_DARK_LUMA, MAX_DARK_LUMA),
    (MIN_VIBRANT_SATURATION, TARGET_VIBRANT_SATURATION, 1.0),
);
const MUTED: Target = Target::new(
    (MIN_NORMAL_LUMA, TARGET_NORMAL_LUMA, MAX_NORMAL_LUMA),
    (0.0, TARGET_MUTED_SATURATION, MAX_MUTED_SATURATION),
);
const LIGHT_MUTED: Target = Target::new(
    (MIN_LIGHT_LUMA, TARGET_LIGHT_LUMA, 1.0),
    (0.0, TARGET_MUTED_SATURATION, MAX_MUTED_SATURATION),
);
const DARK_MUTED: Target = Target::new(
    (0.0, TARGET_DARK_LUMA, MAX_DARK_LUMA),
    (0.0, TARGET_MUTED_SATURATION, MAX_MUTED_SATURATION),
);

/// The six named swatches; any of them may be missing
#[derive(Debug, Default, Clone)]
pub struct NamedSwatches {
    pub vibrant: Option<Swatch>,
    pub dark_vibrant: Option<Swatch>,
    pub light_vibrant: Option<Swatch>,
    pub muted: Option<Swatch>,
    pub dark_muted: Option<Swatch>,
    pub light_muted: Option<Swatch>,
}

impl NamedSwatches {
    pub fn generate(swatches: &[Swatch]) -> Self {
        let max_population = swatches.iter().map(|s| s.population).max().unwrap_or(0);
        let mut used: Vec<[u8; 3]> = Vec::new();
        let mut pick = |target: &Target| {
            let found = find_variation(swatches, target, max_population, &used);
            if let Some(swatch) = found {
                used.push(swatch.rgb);
            }
            found
        };

        let mut named = Self {
            vibrant: pick(&VIBRANT),
            light_vibrant: pick(&LIGHT_VIBRANT),
            dark_vibrant: pick(&DARK_VIBRANT),
            muted: pick(&MUTED),
            light_muted: pick(&LIGHT_MUTED),
            dark_muted: pick(&DARK_MUTED),
        };
        named.fill_missing_vibrants();
        named
    }

    /// Derive a missing Vibrant/DarkVibrant from the other one, population 0
    fn fill_missing_vibrants(&mut self) {
        match (self.vibrant, self.dark_vibrant) {
            (None, Some(dark)) => {
                let [h, s, _] = dark.hsl();
                self.vibrant = Some(Swatch {
                    rgb: hsl_to_rgb([h, s, TARGET_NORMAL_LUMA]),
                    population: 0,
                });
            }
            (Some(vibrant), None) => {
                let [h, s, _] = vibrant.hsl();
                self.dark_vibrant = Some(Swatch {
                    rgb: hsl_to_rgb([h, s, TARGET_DARK_LUMA]),
                    population: 0,
                });
            }
            _ => {}
        }
    }

    pub fn swatches(self) -> impl Iterator<Item = Swatch> {
        [
            self.vibrant,
            self.dark_vibrant,
            self.light_vibrant,
            self.muted,
            self.dark_muted,
            self.light_muted,
        ]
        .into_iter()
        .flatten()
    }
}

fn find_variation(swatches: &[Swatch], target: &Target, max_population: u32, used: &[[u8; 3]]) -> Option<Swatch> {
    let mut best: Option<(f64, Swatch)> = None;

    for swatch in swatches {
        let [_, saturation, luma] = swatch.hsl();
        let in_range = saturation >= target.min_saturation
            && saturation <= target.max_saturation
            && luma >= target.min_luma
            && luma <= target.max_luma;

        if !in_range || used.contains(&swatch.rgb) {
            continue;
        }

        let value = weighted_mean(&[
            (invert_diff(saturation, target.target_saturation), WEIGHT_SATURATION),
            (invert_diff(luma, target.target_luma), WEIGHT_LUMA),
            (f64::from(swatch.population) / f64::from(max_population.max(1)), WEIGHT_POPULATION),
        ]);

        if best.map_or(true, |(best_value, _)| value > best_value) {
            best = Some((value, *swatch));
        }
    }

    best.map(|(_, swatch)| swatch)
}

fn invert_diff(value: f64, target: f64) -> f64 {
    1.0 - (value - target).abs()
}

fn weighted_mean(values: &[(f64, f64)]) -> f64 {
    let (sum, weights) = values
        .iter()
        .fold((0.0, 0.0), |(sum, weights), (value, weight)| (sum + value * weight, weights + weight));
    if weights == 0.0 {
        0.0
    } else {
        sum / weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn two_tone_image(path: &Path) {
        let mut img = RgbImage::new(100, 100);
        for (x, _, pixel) in img.enumerate_pixels_mut() {
            *pixel = if x < 70 { Rgb([224, 32, 32]) } else { Rgb([20, 30, 120]) };
        }
        img.save(path).unwrap();
    }

    #[test]
    fn test_rgb_to_hsl() {
        let [h, s, l] = rgb_to_hsl([255, 0, 0]);
        assert_eq!(h, 0.0);
        assert_eq!(s, 1.0);
        assert_eq!(l, 0.5);

        let [_, s, l] = rgb_to_hsl([128, 128, 128]);
        assert_eq!(s, 0.0);
        assert!((l - 0.502).abs() < 0.001);
    }

    #[test]
    fn test_hsl_round_trip_is_close() {
        let rgb = [40, 120, 200];
        let back = hsl_to_rgb(rgb_to_hsl(rgb));
        for axis in 0..3 {
            assert!((i16::from(rgb[axis]) - i16::from(back[axis])).abs() <= 1);
        }
    }

    #[test]
    fn test_quantize_respects_color_count() {
        let pixels: Vec<[u8; 3]> = (0..=255u8)
            .flat_map(|r| (0..=255u8).step_by(17).map(move |g| [r, g, 255 - r]))
            .collect();
        let swatches = quantize(&pixels, 16);
        assert!(swatches.len() > 1 && swatches.len() <= 16);
        assert!(swatches.iter().all(|s| s.population > 0));
        let total: u32 = swatches.iter().map(|s| s.population).sum();
        assert_eq!(total as usize, pixels.len());
    }

    #[test]
    fn test_palette_from_pixels_orders_by_population() {
        let mut pixels = vec![[224, 32, 32]; 700];
        pixels.extend(vec![[20, 30, 120]; 300]);

        let palette = palette_from_pixels(&pixels);
        assert_eq!(palette.dominant_colors.len(), palette.population.len());
        assert!(palette.dominant_colors.len() <= MAX_PALETTE_COLORS);
        assert_eq!(palette.population[0], 700);
        assert_eq!(palette.population[1], 300);
        assert!(palette.dominant_colors.iter().all(|c| c.len() == 7 && c.starts_with('#')));
    }

    #[test]
    fn test_empty_pixels_give_empty_palette() {
        assert!(palette_from_pixels(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_extract_from_png() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("frame_0000.png");
        two_tone_image(&path);

        let palette = ColorAnalyzer::new().extract_color_palette(&path).await.unwrap();
        assert!(!palette.is_empty());
        assert!(palette.population.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn test_batch_isolates_bad_frames() {
        let temp_dir = TempDir::new().unwrap();
        let good = temp_dir.path().join("frame_0000.png");
        let corrupt = temp_dir.path().join("frame_0001.png");
        two_tone_image(&good);
        std::fs::write(&corrupt, b"definitely not a png").unwrap();
        let missing = temp_dir.path().join("frame_0002.png");

        let frames = vec![good, corrupt, missing];
        let palettes = ColorAnalyzer::new().analyze_frames(&frames).await;

        assert_eq!(palettes.len(), 3);
        assert!(!palettes[0].is_empty());
        assert!(palettes[1].dominant_colors.is_empty() && palettes[1].population.is_empty());
        assert!(palettes[2].dominant_colors.is_empty() && palettes[2].population.is_empty());
    }

    #[tokio::test]
    async fn test_single_missing_frame_is_color_error() {
        let err = ColorAnalyzer::new()
            .extract_color_palette(Path::new("/no/such/frame.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ColorExtraction { .. }));
    }
}
