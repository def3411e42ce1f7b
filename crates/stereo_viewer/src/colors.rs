//! Overlay colors for tracked anchors.
//!
//! Each classification has a fixed base color. A factor derived from the
//! anchor id darkens it slightly so neighboring planes stay distinguishable.

use crate::tracking::anchors::Classification;
use uuid::Uuid;

/// Lowest brightness factor applied to a base color.
pub const MIN_FACTOR: f32 = 0.75;

pub fn base_color(classification: Classification) -> [f32; 4] {
    match classification {
        Classification::Wall => [0.20, 0.55, 0.90, 0.35],
        Classification::Floor => [0.25, 0.80, 0.35, 0.35],
        Classification::Ceiling => [0.85, 0.85, 0.85, 0.25],
        Classification::Door => [0.90, 0.55, 0.15, 0.60],
        Classification::Table => [0.85, 0.30, 0.70, 0.45],
        Classification::Seat => [0.95, 0.85, 0.20, 0.45],
        Classification::Window => [0.40, 0.90, 0.95, 0.20],
        Classification::Unknown => [0.60, 0.60, 0.60, 0.30],
        Classification::Undetermined => [0.45, 0.45, 0.50, 0.30],
    }
}

/// Brightness factor in `[MIN_FACTOR, 1.0]` derived from the anchor id.
pub fn identity_factor(id: &Uuid) -> f32 {
    // FNV-1a over the id bytes.
    let hash = id
        .as_bytes()
        .iter()
        .fold(0x811c_9dc5u32, |h, &b| (h ^ u32::from(b)).wrapping_mul(0x0100_0193));
    let unit = (hash & 0xffff) as f32 / 65535.0;
    MIN_FACTOR + (1.0 - MIN_FACTOR) * unit
}

/// Overlay color of an anchor. Alpha is taken from the base color as is.
pub fn classification_to_color(classification: Classification, id: &Uuid) -> [f32; 4] {
    let [r, g, b, a] = base_color(classification);
    let f = identity_factor(id);
    [r * f, g * f, b * f, a]
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Classification; 9] = [
        Classification::Wall,
        Classification::Floor,
        Classification::Ceiling,
        Classification::Door,
        Classification::Table,
        Classification::Seat,
        Classification::Window,
        Classification::Unknown,
        Classification::Undetermined,
    ];

    #[test]
    fn color_is_deterministic() {
        let id = Uuid::from_u128(0x1234_5678_9abc_def0_1122_3344_5566_7788);
        for class in ALL {
            assert_eq!(classification_to_color(class, &id), classification_to_color(class, &id));
        }
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for i in 0..500u128 {
            let id = Uuid::from_u128(i.wrapping_mul(0x9e37_79b9_7f4a_7c15_f39c_c060_5ced_c834));
            let f = identity_factor(&id);
            assert!((MIN_FACTOR..=1.0).contains(&f), "factor {f}");
            for class in ALL {
                let base = base_color(class);
                let c = classification_to_color(class, &id);
                for ch in 0..3 {
                    assert!(c[ch] >= 0.0);
                    assert!(c[ch] <= base[ch]);
                    assert!(c[ch] >= base[ch] * MIN_FACTOR - 1e-6);
                }
                assert_eq!(c[3], base[3]);
            }
        }
    }

    #[test]
    fn ids_produce_distinct_shades() {
        let a = identity_factor(&Uuid::from_u128(1));
        let b = identity_factor(&Uuid::from_u128(2));
        assert_ne!(a, b);
    }
}
