/// Decides whether a cell's current content and a proposed replacement count as a change.
///
/// Both sides are given as the text a spreadsheet shows in its formula bar: display text for
/// values, `=` followed by the formula for formula cells.
pub trait ChangeDetector {
    fn differs(&self, current: &str, proposed: &str) -> bool;
}

/// Compare trimmed text. `150` and `150.00` differ.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stringified;

impl ChangeDetector for Stringified {
    fn differs(&self, current: &str, proposed: &str) -> bool {
        current.trim() != proposed.trim()
    }
}

/// Compare numerically when both sides parse as numbers, textually otherwise.
#[derive(Debug, Clone, Copy)]
pub struct NumericTolerant {
    pub epsilon: f64,
}

impl ChangeDetector for NumericTolerant {
    fn differs(&self, current: &str, proposed: &str) -> bool {
        match (parse_number(current), parse_number(proposed)) {
            (Some(a), Some(b)) => (a - b).abs() > self.epsilon,
            _ => Stringified.differs(current, proposed),
        }
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}
