//! Collaborator colours.
//!
//! Colours are packed as `0xRRGGBBAA`. Every client gets a stable colour
//! derived from its id, so all collaborators see the same colour for the same
//! person without coordinating.

/// Saturation used for collaborator colours.
const SATURATION: f32 = 0.7;
/// Lightness used for collaborator colours.
const LIGHTNESS: f32 = 0.5;

/// Deterministic, fully opaque colour for a client id.
pub fn color_for_client(client_id: &str) -> u32 {
    let hash = blake3::hash(client_id.as_bytes());
    let bytes = hash.as_bytes();
    let hue = u16::from_be_bytes([bytes[0], bytes[1]]) % 360;
    let (r, g, b) = hsl_to_rgb(hue as f32, SATURATION, LIGHTNESS);
    u32::from_be_bytes([r, g, b, 0xFF])
}

/// Hue of a packed colour's RGB channels, in degrees.
pub fn hue_of(color: u32) -> f32 {
    let [r, g, b, _] = color.to_be_bytes();
    let (r, g, b) = (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    if delta == 0.0 {
        return 0.0;
    }
    let hue = if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    hue.rem_euclid(360.0)
}

fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> (u8, u8, u8) {
    let chroma = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let sector = hue / 60.0;
    let x = chroma * (1.0 - (sector.rem_euclid(2.0) - 1.0).abs());
    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = lightness - chroma / 2.0;
    let to_byte = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    (to_byte(r), to_byte(g), to_byte(b))
}

/// Convert a packed colour to a CSS `rgba()` string.
pub fn rgba_u32_to_css(color: u32) -> String {
    let [r, g, b, a] = color.to_be_bytes();
    format!("rgba({}, {}, {}, {})", r, g, b, a as f32 / 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_is_stable_and_opaque() {
        let a = color_for_client("client-a");
        assert_eq!(a, color_for_client("client-a"));
        assert_eq!(a & 0xFF, 0xFF);
    }

    #[test]
    fn test_different_clients_usually_differ() {
        let colors: std::collections::HashSet<u32> = (0..32)
            .map(|i| color_for_client(&format!("client-{i}")))
            .collect();
        assert!(colors.len() > 16);
    }

    #[test]
    fn test_hsl_primaries() {
        assert_eq!(hsl_to_rgb(0.0, 1.0, 0.5), (255, 0, 0));
        assert_eq!(hsl_to_rgb(120.0, 1.0, 0.5), (0, 255, 0));
        assert_eq!(hsl_to_rgb(240.0, 1.0, 0.5), (0, 0, 255));
    }

    #[test]
    fn test_hue_survives_packing() {
        for client in ["alice", "bob", "carol", "dave"] {
            let hash = blake3::hash(client.as_bytes());
            let bytes = hash.as_bytes();
            let expected = (u16::from_be_bytes([bytes[0], bytes[1]]) % 360) as f32;
            let hue = hue_of(color_for_client(client));
            let diff = (hue - expected).abs();
            // Rounding to bytes moves the hue by a degree at most.
            assert!(diff.min(360.0 - diff) < 1.5, "{client}: {hue} vs {expected}");
        }
    }

    #[test]
    fn test_rgba_to_css() {
        assert_eq!(rgba_u32_to_css(0xFF0000FF), "rgba(255, 0, 0, 1)");
        assert_eq!(rgba_u32_to_css(0x0000FF00), "rgba(0, 0, 255, 0)");
    }
}
