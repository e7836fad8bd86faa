//! sRGB color parsing, normalization, and WCAG 2.1 contrast math.
//!
//! All brand color matching happens on normalized values: hex case-folded,
//! 3/4-digit forms expanded, `rgb()`/`rgba()`/`hsl()`/`hsla()` resolved to
//! 8-bit sRGB channels with explicit alpha. Parsing is total — malformed
//! input yields `None`, never an error — because upstream parsers feed raw
//! declaration values straight through.

use serde::{Deserialize, Serialize};

/// An sRGB color with explicit alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    #[must_use]
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Canonical lowercase hex form: `#rrggbb`, or `#rrggbbaa` when
    /// translucent. This is the form tokens are matched and emitted in.
    #[must_use]
    pub fn canonical(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    /// Euclidean distance in 8-bit RGB space, ignoring alpha.
    ///
    /// Used only for near-match advisory suggestions; auto-apply requires
    /// exact equality after normalization.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        let dr = f64::from(self.r) - f64::from(other.r);
        let dg = f64::from(self.g) - f64::from(other.g);
        let db = f64::from(self.b) - f64::from(other.b);
        db.mul_add(db, dr.mul_add(dr, dg * dg)).sqrt()
    }

    /// WCAG 2.1 relative luminance.
    #[must_use]
    pub fn relative_luminance(&self) -> f64 {
        fn channel(c: u8) -> f64 {
            let c = f64::from(c) / 255.0;
            if c <= 0.039_28 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        }
        0.0722f64.mul_add(
            channel(self.b),
            0.2126f64.mul_add(channel(self.r), 0.7152 * channel(self.g)),
        )
    }
}

impl std::fmt::Display for Rgba {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// WCAG 2.1 contrast ratio between two colors, in `[1, 21]`.
#[must_use]
pub fn contrast_ratio(fg: Rgba, bg: Rgba) -> f64 {
    let l1 = fg.relative_luminance();
    let l2 = bg.relative_luminance();
    let (lighter, darker) = if l1 >= l2 { (l1, l2) } else { (l2, l1) };
    (lighter + 0.05) / (darker + 0.05)
}

/// AA threshold for normal-size body text.
pub const AA_NORMAL_TEXT: f64 = 4.5;

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a CSS color literal into normalized sRGB.
///
/// Supported: `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`, `rgb()`, `rgba()`,
/// `hsl()`, `hsla()`, and a small set of keywords (`white`, `black`,
/// `transparent`). Everything else — `var()` references, gradients,
/// `currentColor` — returns `None`.
#[must_use]
pub fn parse_color(raw: &str) -> Option<Rgba> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix('#') {
        return parse_hex(hex);
    }
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("rgb(") || lower.starts_with("rgba(") {
        return parse_rgb_fn(&lower);
    }
    if lower.starts_with("hsl(") || lower.starts_with("hsla(") {
        return parse_hsl_fn(&lower);
    }
    match lower.as_str() {
        "white" => Some(Rgba::opaque(255, 255, 255)),
        "black" => Some(Rgba::opaque(0, 0, 0)),
        "transparent" => Some(Rgba {
            r: 0,
            g: 0,
            b: 0,
            a: 0,
        }),
        _ => None,
    }
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    let hex = hex.trim();
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let nib = |c: char| c.to_digit(16).map(|d| d as u8);
    let expand = |c: char| nib(c).map(|d| d << 4 | d);
    let pair = |a: char, b: char| Some(nib(a)? << 4 | nib(b)?);
    let chars: Vec<char> = hex.chars().collect();
    match chars.len() {
        3 => Some(Rgba::opaque(
            expand(chars[0])?,
            expand(chars[1])?,
            expand(chars[2])?,
        )),
        4 => Some(Rgba {
            r: expand(chars[0])?,
            g: expand(chars[1])?,
            b: expand(chars[2])?,
            a: expand(chars[3])?,
        }),
        6 => Some(Rgba::opaque(
            pair(chars[0], chars[1])?,
            pair(chars[2], chars[3])?,
            pair(chars[4], chars[5])?,
        )),
        8 => Some(Rgba {
            r: pair(chars[0], chars[1])?,
            g: pair(chars[2], chars[3])?,
            b: pair(chars[4], chars[5])?,
            a: pair(chars[6], chars[7])?,
        }),
        _ => None,
    }
}

/// Parse the comma- or space-separated argument list of a color function.
fn fn_args(value: &str) -> Option<Vec<String>> {
    let open = value.find('(')?;
    let close = value.rfind(')')?;
    if close <= open {
        return None;
    }
    let inner = &value[open + 1..close];
    // Normalize "r g b / a" slash syntax into a fourth argument.
    let inner = inner.replace('/', " ");
    let args: Vec<String> = inner
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    Some(args)
}

fn parse_channel(arg: &str) -> Option<u8> {
    if let Some(pct) = arg.strip_suffix('%') {
        let v: f64 = pct.parse().ok()?;
        return Some((v.clamp(0.0, 100.0) / 100.0 * 255.0).round() as u8);
    }
    let v: f64 = arg.parse().ok()?;
    Some(v.clamp(0.0, 255.0).round() as u8)
}

fn parse_alpha(arg: &str) -> Option<u8> {
    if let Some(pct) = arg.strip_suffix('%') {
        let v: f64 = pct.parse().ok()?;
        return Some((v.clamp(0.0, 100.0) / 100.0 * 255.0).round() as u8);
    }
    let v: f64 = arg.parse().ok()?;
    Some((v.clamp(0.0, 1.0) * 255.0).round() as u8)
}

fn parse_rgb_fn(value: &str) -> Option<Rgba> {
    let args = fn_args(value)?;
    if args.len() < 3 || args.len() > 4 {
        return None;
    }
    let r = parse_channel(&args[0])?;
    let g = parse_channel(&args[1])?;
    let b = parse_channel(&args[2])?;
    let a = match args.get(3) {
        Some(alpha) => parse_alpha(alpha)?,
        None => 255,
    };
    Some(Rgba { r, g, b, a })
}

fn parse_hsl_fn(value: &str) -> Option<Rgba> {
    let args = fn_args(value)?;
    if args.len() < 3 || args.len() > 4 {
        return None;
    }
    let h: f64 = args[0].trim_end_matches("deg").parse().ok()?;
    let s: f64 = args[1].strip_suffix('%')?.parse().ok()?;
    let l: f64 = args[2].strip_suffix('%')?.parse().ok()?;
    let a = match args.get(3) {
        Some(alpha) => parse_alpha(alpha)?,
        None => 255,
    };
    let (r, g, b) = hsl_to_rgb(h.rem_euclid(360.0), s.clamp(0.0, 100.0) / 100.0, l.clamp(0.0, 100.0) / 100.0);
    Some(Rgba { r, g, b, a })
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    let c = (1.0 - 2.0f64.mul_add(l, -1.0).abs()) * s;
    let hp = h / 60.0;
    let x = c * (1.0 - (hp.rem_euclid(2.0) - 1.0).abs());
    let (r1, g1, b1) = match hp {
        hp if hp < 1.0 => (c, x, 0.0),
        hp if hp < 2.0 => (x, c, 0.0),
        hp if hp < 3.0 => (0.0, c, x),
        hp if hp < 4.0 => (0.0, x, c),
        hp if hp < 5.0 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let to8 = |v: f64| ((v + m).clamp(0.0, 1.0) * 255.0).round() as u8;
    (to8(r1), to8(g1), to8(b1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_forms_normalize() {
        assert_eq!(parse_color("#1B3668").unwrap().canonical(), "#1b3668");
        assert_eq!(parse_color("#fff").unwrap().canonical(), "#ffffff");
        assert_eq!(parse_color("#abcd").unwrap().canonical(), "#aabbccdd");
        assert_eq!(parse_color("#11223344").unwrap().canonical(), "#11223344");
        assert_eq!(parse_color(" #1b3668 ").unwrap().canonical(), "#1b3668");
    }

    #[test]
    fn rgb_and_hsl_resolve_to_srgb() {
        assert_eq!(
            parse_color("rgb(27, 54, 104)").unwrap().canonical(),
            "#1b3668"
        );
        assert_eq!(
            parse_color("rgba(255, 255, 255, 0.5)").unwrap().canonical(),
            "#ffffff80"
        );
        assert_eq!(parse_color("hsl(0, 0%, 100%)").unwrap().canonical(), "#ffffff");
        assert_eq!(parse_color("hsl(120, 100%, 25%)").unwrap().canonical(), "#008000");
    }

    #[test]
    fn malformed_input_yields_none() {
        assert!(parse_color("var(--color-primary)").is_none());
        assert!(parse_color("#12345").is_none());
        assert!(parse_color("rgb(1,2)").is_none());
        assert!(parse_color("linear-gradient(#fff, #000)").is_none());
        assert!(parse_color("currentColor").is_none());
    }

    #[test]
    fn contrast_matches_wcag_reference_points() {
        let white = Rgba::opaque(255, 255, 255);
        let black = Rgba::opaque(0, 0, 0);
        let ratio = contrast_ratio(white, black);
        assert!((ratio - 21.0).abs() < 0.01, "white/black = {ratio}");
        assert!((contrast_ratio(white, white) - 1.0).abs() < 1e-9);
        // Symmetry.
        let gray = Rgba::opaque(119, 119, 119);
        assert!((contrast_ratio(white, gray) - contrast_ratio(gray, white)).abs() < 1e-12);
        // #777 on white is ~4.48:1, just under AA.
        assert!(contrast_ratio(gray, white) < AA_NORMAL_TEXT);
    }

    #[test]
    fn distance_is_zero_for_equal_colors() {
        let a = Rgba::opaque(10, 20, 30);
        assert!(a.distance(&a) < f64::EPSILON);
        let b = Rgba::opaque(13, 24, 30);
        assert_eq!(a.distance(&b), 5.0);
    }

    proptest::proptest! {
        #[test]
        fn canonical_form_reparses_to_itself(r: u8, g: u8, b: u8, a: u8) {
            let color = Rgba { r, g, b, a };
            let canonical = color.canonical();
            let reparsed = parse_color(&canonical).expect("canonical form parses");
            proptest::prop_assert_eq!(reparsed, color);
            proptest::prop_assert_eq!(reparsed.canonical(), canonical);
        }

        #[test]
        fn contrast_is_symmetric_and_bounded(r1: u8, g1: u8, b1: u8, r2: u8, g2: u8, b2: u8) {
            let x = Rgba::opaque(r1, g1, b1);
            let y = Rgba::opaque(r2, g2, b2);
            let forward = contrast_ratio(x, y);
            let backward = contrast_ratio(y, x);
            proptest::prop_assert!((forward - backward).abs() < 1e-9);
            proptest::prop_assert!((1.0..=21.01).contains(&forward));
        }
    }
}
