//! Color inputs for DXF (AutoCAD Color Index) and KML (`aabbggrr` hex).

use tracing::warn;

/// ACI index to RGB for the indices that settings commonly use.
/// 256 is the DXF "by layer" placeholder.
pub const ACI_COLORS: [(u16, [u8; 3]); 25] = [
    (0, [0, 0, 0]),
    (1, [255, 0, 0]),
    (2, [255, 255, 0]),
    (3, [0, 255, 0]),
    (4, [0, 255, 255]),
    (5, [0, 0, 255]),
    (6, [255, 0, 255]),
    (7, [255, 255, 255]),
    (8, [128, 128, 128]),
    (9, [192, 192, 192]),
    (10, [0, 0, 128]),
    (30, [255, 128, 0]),
    (40, [128, 0, 0]),
    (50, [128, 128, 0]),
    (60, [0, 128, 0]),
    (70, [0, 128, 128]),
    (80, [0, 0, 128]),
    (90, [128, 0, 128]),
    (250, [80, 80, 80]),
    (251, [100, 100, 100]),
    (252, [150, 150, 150]),
    (253, [180, 180, 180]),
    (254, [220, 220, 220]),
    (255, [240, 240, 240]),
    (256, [128, 128, 128]),
];

const NAME_TO_ACI: [(&str, u16); 22] = [
    ("red", 1),
    ("yellow", 2),
    ("green", 3),
    ("cyan", 4),
    ("blue", 5),
    ("magenta", 6),
    ("white", 7),
    ("black", 0),
    ("gray", 8),
    ("grey", 8),
    ("lightgray", 9),
    ("lightgrey", 9),
    ("darkgray", 8),
    ("darkgrey", 8),
    ("orange", 30),
    ("brown", 40),
    ("purple", 90),
    ("pink", 251),
    ("byblock", 0),
    ("bylayer", 256),
    ("none", 256),
    ("default", 7),
];

const NAME_TO_KML: [(&str, &str); 20] = [
    ("red", "ff0000ff"),
    ("yellow", "ff00ffff"),
    ("green", "ff00ff00"),
    ("cyan", "ffffff00"),
    ("blue", "ffff0000"),
    ("magenta", "ffff00ff"),
    ("white", "ffffffff"),
    ("black", "ff000000"),
    ("gray", "ff808080"),
    ("grey", "ff808080"),
    ("lightgray", "ffd3d3d3"),
    ("lightgrey", "ffd3d3d3"),
    ("darkgray", "ffa9a9a9"),
    ("darkgrey", "ffa9a9a9"),
    ("orange", "ff00a5ff"),
    ("brown", "ff2a2aa5"),
    ("purple", "ff800080"),
    ("pink", "ffcbc0ff"),
    ("none", "00000000"),
    ("default", "ffffffff"),
];

pub const DEFAULT_ACI: u16 = 7;
pub const DEFAULT_KML_COLOR: &str = "ffffffff";

pub fn aci_rgb(aci: u16) -> Option<[u8; 3]> {
    ACI_COLORS.iter().find(|(i, _)| *i == aci).map(|(_, rgb)| *rgb)
}

/// Nearest table ACI to an RGB triple by squared distance. The special
/// indices 0 and 256 are never returned; ties keep the lower index.
pub fn rgb_to_aci(rgb: [u8; 3]) -> u16 {
    let mut best = (DEFAULT_ACI, u32::MAX);
    for (aci, candidate) in ACI_COLORS {
        if aci == 0 || aci == 256 {
            continue;
        }
        let dist: u32 = rgb
            .iter()
            .zip(candidate)
            .map(|(a, b)| {
                let d = i32::from(*a) - i32::from(b);
                (d * d) as u32
            })
            .sum();
        if dist < best.1 {
            best = (aci, dist);
        }
    }
    best.0
}

fn parse_hex_rgb(s: &str) -> Option<[u8; 3]> {
    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([byte(0)?, byte(2)?, byte(4)?])
}

/// ACI index from a number (0..=256), a color name, or `#rrggbb` hex
/// (mapped to the nearest table color). Anything else yields 7.
pub fn parse_aci_color(input: &str) -> u16 {
    let s = input.trim().to_lowercase();
    if s.is_empty() {
        return DEFAULT_ACI;
    }
    if let Ok(aci) = s.parse::<u16>() {
        if aci <= 256 {
            return aci;
        }
    }
    if let Some((_, aci)) = NAME_TO_ACI.iter().find(|(n, _)| *n == s) {
        return *aci;
    }
    if let Some(rgb) = parse_hex_rgb(&s) {
        return rgb_to_aci(rgb);
    }
    warn!(color = input, "invalid ACI color, using default");
    DEFAULT_ACI
}

/// KML `aabbggrr` color from `aabbggrr`, `#rrggbb`, `#aarrggbb`, a color
/// name or an ACI index. Anything else yields opaque white.
pub fn kml_color(input: &str) -> String {
    let s = input.trim().to_lowercase();
    if s.is_empty() {
        return DEFAULT_KML_COLOR.to_string();
    }
    let is_hex = |t: &str| t.chars().all(|c| c.is_ascii_hexdigit());

    if s.len() == 8 && is_hex(&s) {
        return s;
    }
    if let Some(hex) = s.strip_prefix('#') {
        if is_hex(hex) {
            match hex.len() {
                6 => return format!("ff{}{}{}", &hex[4..6], &hex[2..4], &hex[0..2]),
                8 => {
                    return format!("{}{}{}{}", &hex[0..2], &hex[6..8], &hex[4..6], &hex[2..4])
                }
                _ => {}
            }
        }
    }
    if let Some((_, kml)) = NAME_TO_KML.iter().find(|(n, _)| *n == s) {
        return kml.to_string();
    }
    if let Some([r, g, b]) = s.parse::<u16>().ok().and_then(aci_rgb) {
        return format!("ff{b:02x}{g:02x}{r:02x}");
    }
    warn!(color = input, "invalid KML color, using default");
    DEFAULT_KML_COLOR.to_string()
}
