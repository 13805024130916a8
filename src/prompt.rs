//! # Prompt Synthesis Module
//!
//! Trasforma metadata e palette in un documento testuale che descrive come
//! ricreare il video come template animato.
//!
//! ## Responsabilità:
//! - Unisce i colori di tutte le palette (ordine di prima apparizione)
//! - Calcola aspect ratio, fps e durata arrotondati, frame totali
//! - Divide la timeline in tre fasi proporzionali al numero di frame
//!
//! Funzione pura: nessun I/O, nessun errore.

use crate::models::{ColorPalette, VideoMetadata};
use std::fmt::Write;

pub const MAX_GLOBAL_COLORS: usize = 7;

/// Phase boundaries as fractions of the total frame count
const PHASES: [(&str, f64, f64); 3] = [
    ("Initial state", 0.0, 0.10),
    ("Entry animation (Trigger)", 0.10, 0.30),
    ("Secondary effects", 0.30, 1.0),
];

/// Distinct colors across all palettes, first appearance wins, capped
pub fn global_palette(palettes: &[ColorPalette]) -> Vec<String> {
    let mut colors: Vec<String> = Vec::new();
    for color in palettes.iter().flat_map(|p| p.dominant_colors.iter()) {
        if colors.len() == MAX_GLOBAL_COLORS {
            break;
        }
        if !colors.iter().any(|c| c.eq_ignore_ascii_case(color)) {
            colors.push(color.clone());
        }
    }
    colors
}

/// `(label, first_frame, last_frame)` for each choreography phase
pub fn phase_ranges(total_frames: u64) -> Vec<(&'static str, u64, u64)> {
    let last = total_frames.saturating_sub(1);
    PHASES
        .iter()
        .map(|(label, start, end)| {
            let from = ((total_frames as f64) * start).round() as u64;
            let to = if *end >= 1.0 {
                last
            } else {
                ((total_frames as f64) * end).round() as u64
            };
            (*label, from.min(last), to.min(last))
        })
        .collect()
}

/// Render the replication document for one analyzed video
pub fn generate_replication_prompt(metadata: &VideoMetadata, palettes: &[ColorPalette]) -> String {
    let colors = global_palette(palettes);
    let color_list = if colors.is_empty() {
        "none detected".to_string()
    } else {
        colors.join(", ")
    };

    let total_frames = metadata.total_frames();
    let fps = metadata.fps.round() as u64;
    let seconds = metadata.duration.round() as u64;

    let mut doc = String::new();

    // write! into a String cannot fail
    let _ = writeln!(
        doc,
        "Please analyze the attached UI animation for replication as a programmatic video template. \
         I need a deep technical breakdown that covers the following 5 layers so the generated code is production-ready."
    );
    let _ = writeln!(doc);

    let _ = writeln!(doc, "1. VISUAL SPECS (The Design System)");
    let _ = writeln!(
        doc,
        "- Colors: The video contains these dominant hex codes: [{}]. Use them for backgrounds, accents and text.",
        color_list
    );
    let _ = writeln!(doc, "- Typography: Font style (Serif/Sans), approximate weights, tabular figures if numbers change.");
    let _ = writeln!(doc, "- Layout: Is it a centered card, full-screen, or split view?");
    let _ = writeln!(doc, "- Assets: Identify any SVGs, icons, or images needed.");
    let _ = writeln!(doc);

    let _ = writeln!(doc, "2. VIDEO CONFIGURATION (The Canvas)");
    let _ = writeln!(
        doc,
        "- Dimensions: {}x{} ({}).",
        metadata.width,
        metadata.height,
        metadata.aspect()
    );
    let _ = writeln!(doc, "- FPS: {}fps.", fps);
    let _ = writeln!(doc, "- Duration: {} seconds ({} frames).", seconds, total_frames);
    let _ = writeln!(doc);

    let _ = writeln!(doc, "3. DATA & PROPS (The Schema)");
    let _ = writeln!(doc, "- What data is displayed? (Text headers, numbers, image URLs).");
    let _ = writeln!(
        doc,
        "- Define a zod schema: which of these elements should be customizable props? \
         (e.g. make the 'Price' and 'User Avatar' dynamic props)."
    );
    let _ = writeln!(doc);

    let _ = writeln!(doc, "4. ANIMATION LOGIC (The Choreography)");
    let _ = writeln!(doc, "- Breakdown by frame (approximate):");
    for (label, from, to) in phase_ranges(total_frames) {
        let _ = writeln!(doc, "- [Frame {}-{}]: {}.", from, to, label);
    }
    let _ = writeln!(doc, "- Type of motion:");
    let _ = writeln!(doc, "- Spring (bouncy/natural): suggest stiffness and damping settings.");
    let _ = writeln!(doc, "- Interpolate (linear/eased): suggest input and output ranges.");
    let _ = writeln!(doc);

    let _ = writeln!(doc, "5. THE REPLICATION PROMPT");
    let _ = writeln!(doc, "- Write a single, high-density prompt that can be pasted into a coding assistant.");
    let _ = write!(
        doc,
        "- It must explicitly ask for a React functional component using remotion, zod, useCurrentFrame \
         and spring/interpolate, running at {}x{} and {}fps for {} frames, based on the specs above.",
        metadata.width, metadata.height, fps, total_frames
    );

    doc
}
