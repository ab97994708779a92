//! Power to colour lookup table.
//!
//! The table has [`COLOR_MAP_SIZE`] RGBA8 entries and is indexed by
//! `round(normalized_power * 255)`.

use serde::{Deserialize, Serialize};

pub const COLOR_MAP_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorMapKind {
    /// Black through purple, blue and cyan to white.
    #[default]
    PlasmaDark,
    /// HSV rainbow with hue 240° to 0° and value rising with power.
    Inspectrum,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorMap {
    kind: ColorMapKind,
    entries: [[u8; 4]; COLOR_MAP_SIZE],
}

impl ColorMap {
    pub fn new(kind: ColorMapKind) -> Self {
        let mut entries = [[0u8; 4]; COLOR_MAP_SIZE];
        for (index, entry) in entries.iter_mut().enumerate() {
            let t = index as f32 / (COLOR_MAP_SIZE - 1) as f32;
            let [r, g, b] = match kind {
                ColorMapKind::PlasmaDark => plasma_dark(t),
                ColorMapKind::Inspectrum => hsv_to_rgb((1.0 - t) * 240.0 / 360.0, 1.0, t),
            };
            *entry = [to_byte(r), to_byte(g), to_byte(b), u8::MAX];
        }
        Self { kind, entries }
    }

    pub fn kind(&self) -> ColorMapKind {
        self.kind
    }

    pub fn entries(&self) -> &[[u8; 4]; COLOR_MAP_SIZE] {
        &self.entries
    }

    /// Colour for a power already normalized to `[0, 1]`; out-of-range input is clamped.
    pub fn lookup(&self, normalized: f32) -> [u8; 4] {
        self.entries[index_for(normalized)]
    }

    /// Row-major RGBA8 bytes for a `COLOR_MAP_SIZE x 1` texture.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.entries)
    }
}

impl Default for ColorMap {
    fn default() -> Self {
        Self::new(ColorMapKind::default())
    }
}

fn index_for(normalized: f32) -> usize {
    if normalized.is_nan() {
        return 0;
    }
    (normalized.clamp(0.0, 1.0) * (COLOR_MAP_SIZE - 1) as f32).round() as usize
}

fn to_byte(channel: f32) -> u8 {
    (channel.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn plasma_dark(t: f32) -> [f32; 3] {
    if t < 0.25 {
        let s = t / 0.25;
        [s * 0.4, 0.0, s * 0.6]
    } else if t < 0.5 {
        let s = (t - 0.25) / 0.25;
        [0.4 * (1.0 - s) + s * 0.1, 0.0, 0.6 + s * 0.4]
    } else if t < 0.75 {
        let s = (t - 0.5) / 0.25;
        [0.1 * (1.0 - s), s * 0.8, 1.0]
    } else {
        let s = (t - 0.75) / 0.25;
        [s, 0.8 + s * 0.2, 1.0]
    }
}

fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> [f32; 3] {
    let sector = (hue * 6.0).floor();
    let fraction = hue * 6.0 - sector;
    let p = value * (1.0 - saturation);
    let q = value * (1.0 - fraction * saturation);
    let t = value * (1.0 - (1.0 - fraction) * saturation);
    match (sector as i32).rem_euclid(6) {
        0 => [value, t, p],
        1 => [q, value, p],
        2 => [p, value, t],
        3 => [p, q, value],
        4 => [t, p, value],
        _ => [value, p, q],
    }
}
