// NC program reader - turns G-code text into path points
use crate::domain::toolpath::{MoveType, PathPoint};

/// Parse an NC program into its path points.
///
/// Only motion matters here: `G0` moves the cursor without emitting a point,
/// `G1` emits a linear point, `G2`/`G3` emit arc points, and bare coordinate
/// lines emit plain move points. Other G codes are skipped entirely. Line
/// numbers are 1-based.
pub fn parse_nc_program(source: &str) -> Vec<PathPoint> {
    let mut cursor = [0.0_f64; 3];
    let mut points = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let line = strip_comments(raw);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let axes = [
            word_value(line, 'X'),
            word_value(line, 'Y'),
            word_value(line, 'Z'),
        ];

        let move_type = match word_value(line, 'G') {
            None if axes.iter().all(Option::is_none) => continue,
            None => Some(MoveType::Move),
            Some(g) if g == 0.0 => None,
            Some(g) if g == 1.0 => Some(MoveType::Linear),
            Some(g) if g == 2.0 || g == 3.0 => Some(MoveType::Arc),
            Some(_) => continue,
        };

        for (slot, value) in cursor.iter_mut().zip(axes) {
            if let Some(value) = value {
                *slot = value;
            }
        }

        if let Some(move_type) = move_type {
            points.push(PathPoint {
                x: cursor[0],
                y: cursor[1],
                z: cursor[2],
                line_number: index + 1,
                move_type,
            });
        }
    }

    points
}

fn strip_comments(line: &str) -> String {
    let line = line.split(';').next().unwrap_or_default();
    let mut out = String::with_capacity(line.len());
    let mut depth = 0usize;
    for ch in line.chars() {
        match ch {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out
}

/// First value following `letter` (either case) that reads as a number.
/// G words take no sign; axis words may be signed.
fn word_value(line: &str, letter: char) -> Option<f64> {
    let bytes = line.as_bytes();
    let signed = letter != 'G';
    for (pos, ch) in line.char_indices() {
        if !ch.eq_ignore_ascii_case(&letter) {
            continue;
        }
        let start = pos + ch.len_utf8();
        let mut end = start;
        if signed && matches!(bytes.get(end), Some(b'+' | b'-')) {
            end += 1;
        }
        let digits_start = end;
        while matches!(bytes.get(end), Some(b) if b.is_ascii_digit()) {
            end += 1;
        }
        if end == digits_start {
            continue;
        }
        if bytes.get(end) == Some(&b'.') {
            end += 1;
            while matches!(bytes.get(end), Some(b) if b.is_ascii_digit()) {
                end += 1;
            }
        }
        if let Ok(value) = line[start..end].parse::<f64>() {
            return Some(value);
        }
    }
    None
}
