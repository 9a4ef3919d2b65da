use crate::config::ChangeDetection;
use crate::feed::date;

/// Decides whether a feed changed since its checkpoint, from the two
/// feed-level update markers.
pub trait ChangeDetector: Send + Sync {
    fn has_changed(&self, previous: &str, current: &str) -> bool;
}

/// Raw string comparison. A feed whose content changes while its marker
/// stays the same is not rescanned.
#[derive(Debug, Default)]
pub struct MarkerEquality;

impl ChangeDetector for MarkerEquality {
    fn has_changed(&self, previous: &str, current: &str) -> bool {
        previous != current
    }
}

/// Compares the instants the markers denote, so a marker rewritten in a
/// different zone or format is still recognized as unchanged.
/// Unparseable markers fall back to string comparison.
#[derive(Debug, Default)]
pub struct InstantComparison;

impl ChangeDetector for InstantComparison {
    fn has_changed(&self, previous: &str, current: &str) -> bool {
        match (date::try_parse(previous), date::try_parse(current)) {
            (Some(previous), Some(current)) => current > previous,
            _ => previous != current,
        }
    }
}

pub fn detector_for(mode: ChangeDetection) -> Box<dyn ChangeDetector> {
    match mode {
        ChangeDetection::Marker => Box::new(MarkerEquality),
        ChangeDetection::Instant => Box::new(InstantComparison),
    }
}
