//! Hand landmark → obstacle zone conversion, shared by the hand and
//! multi-model backends.

use depthsense_types::{ObstacleZone, ZoneKind};

use crate::model::{HandDetection, Landmark};

/// Confidence reported for a hand carrying metric landmarks but no presence
/// score.
pub const WORLD_LANDMARK_CONFIDENCE: f32 = 0.95;

/// `[x_min, y_min, x_max, y_max]` over the landmarks' image coordinates.
pub fn landmark_bounds(points: &[Landmark]) -> Option<[f32; 4]> {
    let first = points.first()?;
    let init = [first.x, first.y, first.x, first.y];
    Some(points.iter().fold(init, |[x0, y0, x1, y1], p| {
        [x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)]
    }))
}

/// Mean Euclidean distance of metric landmarks from the model origin.
pub fn mean_origin_distance(points: &[Landmark]) -> Option<f32> {
    if points.is_empty() {
        return None;
    }
    let sum: f32 = points
        .iter()
        .map(|p| (p.x * p.x + p.y * p.y + p.z * p.z).sqrt())
        .sum();
    Some(sum / points.len() as f32)
}

/// Build the zone for one detected hand.
///
/// The landmark bounding box is grown by `padding` (fraction of the frame)
/// on every side and clipped to the frame.  Depth comes from the metric
/// landmarks and is omitted without them.
pub fn hand_zone(id: impl Into<String>, hand: &HandDetection, padding: f32) -> Option<ObstacleZone> {
    let [x0, y0, x1, y1] = landmark_bounds(&hand.landmarks)?;
    let world = hand.world_landmarks.as_deref().filter(|w| !w.is_empty());
    let depth = world.and_then(mean_origin_distance);
    let confidence = hand
        .score
        .or_else(|| world.map(|_| WORLD_LANDMARK_CONFIDENCE));

    ObstacleZone::from_bounds(
        id,
        ZoneKind::Hand,
        x0 - padding,
        y0 - padding,
        x1 + padding,
        y1 + padding,
    )
    .map(|z| z.with_depth(depth).with_confidence(confidence))
}

/// Zones for every detected hand, ids `hand-0`, `hand-1`, …
pub fn hand_zones(hands: &[HandDetection], max_hands: usize, padding: f32) -> Vec<ObstacleZone> {
    hands
        .iter()
        .take(max_hands)
        .enumerate()
        .filter_map(|(i, hand)| hand_zone(format!("hand-{i}"), hand, padding))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_hand(x0: f32, y0: f32, x1: f32, y1: f32) -> HandDetection {
        HandDetection {
            landmarks: vec![
                Landmark::new(x0, y0, 0.0),
                Landmark::new(x1, y0, 0.0),
                Landmark::new(x0, y1, 0.0),
                Landmark::new(x1, y1, 0.0),
                Landmark::new((x0 + x1) / 2.0, (y0 + y1) / 2.0, 0.0),
            ],
            world_landmarks: None,
            score: None,
        }
    }

    #[test]
    fn bounds_cover_all_landmarks() {
        let hand = square_hand(0.2, 0.3, 0.4, 0.5);
        let b = landmark_bounds(&hand.landmarks).unwrap();
        assert_eq!(b, [0.2, 0.3, 0.4, 0.5]);
        assert!(landmark_bounds(&[]).is_none());
    }

    #[test]
    fn padding_grows_box_by_five_percent() {
        let zone = hand_zone("hand-0", &square_hand(0.2, 0.3, 0.4, 0.5), 0.05).unwrap();
        assert!((zone.x - 0.15).abs() < 1e-5);
        assert!((zone.y - 0.25).abs() < 1e-5);
        assert!((zone.width - 0.3).abs() < 1e-5);
        assert!((zone.height - 0.3).abs() < 1e-5);
        assert_eq!(zone.kind, ZoneKind::Hand);
    }

    #[test]
    fn padded_box_is_clipped_at_frame_edge() {
        let zone = hand_zone("hand-0", &square_hand(0.0, 0.9, 0.1, 1.0), 0.05).unwrap();
        assert_eq!(zone.x, 0.0);
        assert!(zone.y + zone.height <= 1.0 + 1e-6);
        assert!(zone.width > 0.0 && zone.height > 0.0);
    }

    #[test]
    fn depth_is_mean_world_distance() {
        let mut hand = square_hand(0.2, 0.3, 0.4, 0.5);
        hand.world_landmarks = Some(vec![
            Landmark::new(0.0, 0.0, 0.4),
            Landmark::new(0.3, 0.4, 0.0),
        ]);
        let zone = hand_zone("hand-0", &hand, 0.05).unwrap();
        assert!((zone.depth.unwrap() - 0.45).abs() < 1e-5);
        assert_eq!(zone.confidence, Some(WORLD_LANDMARK_CONFIDENCE));
    }

    #[test]
    fn no_world_landmarks_means_no_depth() {
        let mut hand = square_hand(0.2, 0.3, 0.4, 0.5);
        hand.score = Some(0.7);
        let zone = hand_zone("hand-0", &hand, 0.05).unwrap();
        assert_eq!(zone.depth, None);
        assert_eq!(zone.confidence, Some(0.7));
    }

    #[test]
    fn presence_score_takes_precedence() {
        let mut hand = square_hand(0.2, 0.3, 0.4, 0.5);
        hand.score = Some(0.6);
        hand.world_landmarks = Some(vec![Landmark::new(0.0, 0.0, 0.5)]);
        let zone = hand_zone("hand-0", &hand, 0.05).unwrap();
        assert_eq!(zone.confidence, Some(0.6));
    }

    #[test]
    fn hand_zones_respects_limit() {
        let hands = vec![
            square_hand(0.1, 0.1, 0.2, 0.2),
            square_hand(0.5, 0.5, 0.6, 0.6),
            square_hand(0.7, 0.7, 0.8, 0.8),
        ];
        let zones = hand_zones(&hands, 2, 0.05);
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[1].id, "hand-1");
    }
}
