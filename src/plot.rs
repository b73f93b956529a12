// Text rendering of measured patterns
//
// One row per position: angles, level, and a bar scaled to the strongest sample.

use std::fmt;

use crate::pattern::{DB_FLOOR, PatternSample, Scale, levels};

const BAR_WIDTH: usize = 40;

fn bar_fraction(level: f64, peak: f64, scale: Scale) -> f64 {
    let fraction = match scale {
        Scale::Linear if peak > 0.0 => level / peak,
        Scale::Linear => 0.0,
        Scale::Decibel => (level - DB_FLOOR) / -DB_FLOOR,
    };
    fraction.clamp(0.0, 1.0)
}

fn bar(fraction: f64) -> String {
    let filled = (fraction * BAR_WIDTH as f64).round() as usize;
    format!("{:<width$}", "#".repeat(filled), width = BAR_WIDTH)
}

fn format_level(level: f64, scale: Scale) -> String {
    match scale {
        Scale::Linear => format!("{:>10.3e}", level),
        Scale::Decibel => format!("{:>7.1} dB", level),
    }
}

fn peak(levels: &[f64]) -> f64 {
    levels.iter().copied().fold(0.0_f64, f64::max)
}

struct Table<'a> {
    samples: &'a [PatternSample],
    title: &'a str,
    scale: Scale,
}

impl fmt::Display for Table<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        if self.samples.is_empty() {
            return writeln!(f, "  (no samples)");
        }

        let values = levels(self.samples, self.scale);
        let top = peak(&values);
        writeln!(f, "{:>8} {:>8} {:>10}", "mast", "arm", "level")?;
        for (sample, &level) in self.samples.iter().zip(&values) {
            writeln!(
                f,
                "{:>8.1} {:>8.1} {} |{}|",
                sample.mast_angle,
                sample.arm_angle,
                format_level(level, self.scale),
                bar(bar_fraction(level, top, self.scale)),
            )?;
        }
        Ok(())
    }
}

struct Comparison<'a> {
    first: (&'a [PatternSample], &'a str),
    second: (&'a [PatternSample], &'a str),
    scale: Scale,
}

impl fmt::Display for Comparison<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ((a, a_title), (b, b_title), scale) = (self.first, self.second, self.scale);
        let a_levels = levels(a, scale);
        let b_levels = levels(b, scale);
        let (a_peak, b_peak) = (peak(&a_levels), peak(&b_levels));

        writeln!(f, "A: {}", a_title)?;
        writeln!(f, "B: {}", b_title)?;
        writeln!(f, "{:>8} {:>10} {:>10}", "mast", "A", "B")?;

        for row in 0..a.len().max(b.len()) {
            let angle = a.get(row).or_else(|| b.get(row)).map_or(0.0, |s| s.mast_angle);
            let cell = |levels: &[f64], top: f64| match levels.get(row) {
                Some(&level) => (format_level(level, scale), bar_fraction(level, top, scale)),
                None => (format!("{:>10}", "-"), 0.0),
            };
            let (a_text, a_frac) = cell(&a_levels[..], a_peak);
            let (b_text, b_frac) = cell(&b_levels[..], b_peak);
            writeln!(
                f,
                "{:>8.1} {} {} |{}|{}|",
                angle,
                a_text,
                b_text,
                half_bar(a_frac),
                half_bar(b_frac).replace('#', "*"),
            )?;
        }
        Ok(())
    }
}

fn half_bar(fraction: f64) -> String {
    let width = BAR_WIDTH / 2;
    let filled = (fraction * width as f64).round() as usize;
    format!("{:<width$}", "#".repeat(filled), width = width)
}

/// Single pattern as a table with bars
pub fn render(samples: &[PatternSample], title: &str, scale: Scale) -> String {
    Table {
        samples,
        title,
        scale,
    }
    .to_string()
}

/// Two patterns side by side, aligned by row
pub fn render_comparison(
    first: (&[PatternSample], &str),
    second: (&[PatternSample], &str),
    scale: Scale,
) -> String {
    Comparison {
        first,
        second,
        scale,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(levels: &[f64]) -> Vec<PatternSample> {
        levels
            .iter()
            .enumerate()
            .map(|(i, &rssi)| PatternSample {
                mast_angle: i as f64 * 10.0,
                arm_angle: 0.0,
                background_rssi: 0.0,
                transmission_rssi: rssi,
            })
            .collect()
    }

    #[test]
    fn test_render_linear_bars() {
        let text = render(&pattern(&[1.0, 0.5, 0.0]), "dipole", Scale::Linear);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "dipole");
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[2].matches('#').count(), BAR_WIDTH);
        assert_eq!(lines[3].matches('#').count(), BAR_WIDTH / 2);
        assert_eq!(lines[4].matches('#').count(), 0);
    }

    #[test]
    fn test_render_db() {
        let text = render(&pattern(&[1.0, 0.1]), "horn", Scale::Decibel);
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[2].contains("0.0 dB"));
        assert!(lines[3].contains("-20.0 dB"));
        // -20 dB is halfway to the -40 dB floor
        assert_eq!(lines[3].matches('#').count(), BAR_WIDTH / 2);
    }

    #[test]
    fn test_render_empty() {
        let text = render(&[], "nothing", Scale::Linear);
        assert!(text.contains("(no samples)"));
    }

    #[test]
    fn test_comparison_uneven_lengths() {
        let a = pattern(&[1.0, 0.5, 0.25]);
        let b = pattern(&[2.0]);
        let text = render_comparison((&a[..], "with gain"), (&b[..], "no gain"), Scale::Linear);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3 + 3);
        assert!(lines[0].ends_with("with gain"));
        assert_eq!(lines[3].matches('*').count(), BAR_WIDTH / 2);
        assert!(lines[5].contains("         -"));
    }
}
