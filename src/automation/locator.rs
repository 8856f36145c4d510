//! Send control detection
//!
//! Tiers are evaluated in a fixed order and the first element of each tier
//! wins, so the same snapshot always yields the same plan.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::{Bounds, HierarchySnapshot, Point, ScreenSize, UiElement};
use crate::models::Tier;

/// Inclusive width/height limits a tier's element must fit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeWindow {
    pub min_width: i32,
    pub max_width: i32,
    pub min_height: i32,
    pub max_height: i32,
}

impl SizeWindow {
    pub const fn new(min_width: i32, max_width: i32, min_height: i32, max_height: i32) -> Self {
        Self {
            min_width,
            max_width,
            min_height,
            max_height,
        }
    }

    pub fn fits(&self, bounds: &Bounds) -> bool {
        (self.min_width..=self.max_width).contains(&bounds.width())
            && (self.min_height..=self.max_height).contains(&bounds.height())
    }
}

/// Text buttons; icon-sized "Send" labels are rejected
pub const EXACT_TEXT_WINDOW: SizeWindow = SizeWindow::new(50, 300, 30, 150);
/// Icon buttons
pub const RESOURCE_ID_WINDOW: SizeWindow = SizeWindow::new(25, 200, 25, 200);
pub const CONTENT_DESC_WINDOW: SizeWindow = SizeWindow::new(30, 300, 20, 150);

/// A tap target expressed as fractions of the screen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeuristicPoint {
    pub x_ratio: f64,
    pub y_ratio: f64,
}

impl HeuristicPoint {
    pub const fn new(x_ratio: f64, y_ratio: f64) -> Self {
        Self { x_ratio, y_ratio }
    }

    pub fn resolve(&self, screen: ScreenSize) -> Point {
        Point::new(
            (self.x_ratio * screen.width as f64).round() as i32,
            (self.y_ratio * screen.height as f64).round() as i32,
        )
    }
}

pub const DEFAULT_HEURISTIC_POINTS: [HeuristicPoint; 4] = [
    HeuristicPoint::new(0.85, 0.75),
    HeuristicPoint::new(0.90, 0.80),
    HeuristicPoint::new(0.95, 0.85),
    HeuristicPoint::new(0.80, 0.70),
];

/// One place worth tapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendCandidate {
    pub tier: Tier,
    pub point: Point,
    /// Document index of the matched element; `None` for heuristic points
    pub element_index: Option<usize>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no send control found in {elements} elements (screen size {})", screen_label(.screen_known))]
pub struct LocatorExhausted {
    pub elements: usize,
    pub screen_known: bool,
}

fn screen_label(known: &bool) -> &'static str {
    if *known {
        "known"
    } else {
        "unknown"
    }
}

/// Finds the Send control in a hierarchy snapshot
#[derive(Debug, Clone)]
pub struct SendButtonLocator {
    heuristic_points: Vec<HeuristicPoint>,
}

impl Default for SendButtonLocator {
    fn default() -> Self {
        Self::new(DEFAULT_HEURISTIC_POINTS.to_vec())
    }
}

impl SendButtonLocator {
    pub fn new(heuristic_points: Vec<HeuristicPoint>) -> Self {
        Self { heuristic_points }
    }

    /// First candidate of the plan
    pub fn locate(
        &self,
        snapshot: &HierarchySnapshot,
        screen: Option<ScreenSize>,
    ) -> Result<SendCandidate, LocatorExhausted> {
        self.candidates(snapshot, screen)
            .into_iter()
            .next()
            .ok_or(LocatorExhausted {
                elements: snapshot.len(),
                screen_known: screen.is_some(),
            })
    }

    /// Ordered plan: at most one hit from each of tiers 1-3, then the
    /// heuristic points when the screen size is known
    pub fn candidates(&self, snapshot: &HierarchySnapshot, screen: Option<ScreenSize>) -> Vec<SendCandidate> {
        let elements = snapshot.elements();

        let mut plan: Vec<SendCandidate> = [
            (Tier::ExactText, find(elements, EXACT_TEXT_WINDOW, is_exact_send_text)),
            (Tier::ResourceId, find(elements, RESOURCE_ID_WINDOW, |e| contains_send(&e.resource_id))),
            (
                Tier::ContentDescription,
                find(elements, CONTENT_DESC_WINDOW, |e| contains_send(&e.content_desc)),
            ),
        ]
        .into_iter()
        .filter_map(|(tier, hit)| {
            hit.map(|element| SendCandidate {
                tier,
                point: element.bounds.center(),
                element_index: Some(element.index),
            })
        })
        .collect();

        if let Some(screen) = screen {
            plan.extend(self.heuristic_points.iter().map(|p| SendCandidate {
                tier: Tier::CoordinateHeuristic,
                point: p.resolve(screen),
                element_index: None,
            }));
        }

        tracing::debug!(
            "Send plan: {}",
            plan.iter()
                .map(|c| format!("{}@{}", c.tier.as_str(), c.point))
                .collect::<Vec<_>>()
                .join(", ")
        );
        plan
    }
}

fn find<'a>(
    elements: &'a [UiElement],
    window: SizeWindow,
    matches: impl Fn(&UiElement) -> bool,
) -> Option<&'a UiElement> {
    elements
        .iter()
        .find(|e| e.clickable && matches(e) && window.fits(&e.bounds))
}

fn is_exact_send_text(element: &UiElement) -> bool {
    element.text.trim() == "Send"
}

fn contains_send(value: &str) -> bool {
    value.to_ascii_lowercase().contains("send")
}

/// Looks like a Send control by any tier's label rule, ignoring size
pub fn is_send_like(element: &UiElement) -> bool {
    is_exact_send_text(element) || contains_send(&element.resource_id) || contains_send(&element.content_desc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testing::{compose_screen, NodeSpec};

    fn snapshot(nodes: &[NodeSpec]) -> HierarchySnapshot {
        HierarchySnapshot::parse(compose_screen(nodes)).unwrap()
    }

    const SCREEN: ScreenSize = ScreenSize {
        width: 1080,
        height: 2280,
    };

    #[test]
    fn test_exact_text_tier_hits_center() {
        let snap = snapshot(&[NodeSpec::button("Send").bounds(800, 1400, 950, 1480)]);
        let hit = SendButtonLocator::default().locate(&snap, Some(SCREEN)).unwrap();
        assert_eq!(hit.tier, Tier::ExactText);
        assert_eq!(hit.point, Point::new(875, 1440));
    }

    #[test]
    fn test_exact_text_rejects_icon_sized_label() {
        let snap = snapshot(&[NodeSpec::button("Send").bounds(900, 2100, 940, 2125)]);
        let plan = SendButtonLocator::default().candidates(&snap, None);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_resource_id_tier() {
        let snap = snapshot(&[
            NodeSpec::new("android.widget.ImageView")
                .id("com.google.android.apps.messaging:id/Send_Message_Button")
                .clickable(true)
                .bounds(930, 2090, 1050, 2210),
        ]);
        let hit = SendButtonLocator::default().locate(&snap, None).unwrap();
        assert_eq!(hit.tier, Tier::ResourceId);
        assert_eq!(hit.point, Point::new(990, 2150));
    }

    #[test]
    fn test_content_description_tier() {
        let snap = snapshot(&[
            NodeSpec::new("android.widget.ImageButton")
                .desc("Send SMS")
                .clickable(true)
                .bounds(900, 2100, 1100, 2200),
        ]);
        let hit = SendButtonLocator::default().locate(&snap, None).unwrap();
        assert_eq!(hit.tier, Tier::ContentDescription);
        assert_eq!(hit.point, Point::new(1000, 2150));
    }

    #[test]
    fn test_non_clickable_matches_are_ignored() {
        let snap = snapshot(&[NodeSpec::button("Send").clickable(false).bounds(800, 1400, 950, 1480)]);
        assert!(SendButtonLocator::default().locate(&snap, None).is_err());
    }

    #[test]
    fn test_heuristic_fallback_first_point() {
        let snap = snapshot(&[NodeSpec::edit_text("Hi Jane", "compose_message_text").bounds(0, 2000, 900, 2200)]);
        let hit = SendButtonLocator::default().locate(&snap, Some(SCREEN)).unwrap();
        assert_eq!(hit.tier, Tier::CoordinateHeuristic);
        assert_eq!(hit.point, Point::new(918, 1710));
    }

    #[test]
    fn test_plan_order_and_one_hit_per_tier() {
        let snap = snapshot(&[
            NodeSpec::new("android.widget.ImageButton").desc("send").clickable(true).bounds(0, 0, 100, 100),
            NodeSpec::button("Send").bounds(800, 1400, 950, 1480),
            NodeSpec::button("Send").bounds(600, 1400, 750, 1480),
        ]);
        let plan = SendButtonLocator::default().candidates(&snap, Some(SCREEN));

        let tiers: Vec<Tier> = plan.iter().map(|c| c.tier).collect();
        assert_eq!(
            tiers,
            vec![
                Tier::ExactText,
                Tier::ContentDescription,
                Tier::CoordinateHeuristic,
                Tier::CoordinateHeuristic,
                Tier::CoordinateHeuristic,
                Tier::CoordinateHeuristic,
            ]
        );
        assert_eq!(plan[0].point, Point::new(875, 1440));
        assert_eq!(plan[5].point, Point::new(864, 1596));
    }

    #[test]
    fn test_exhausted_without_screen_size() {
        let snap = snapshot(&[NodeSpec::text_view("Hello")]);
        let err = SendButtonLocator::default().locate(&snap, None).unwrap_err();
        assert!(!err.screen_known);
        assert_eq!(err.elements, 2);
    }

    #[test]
    fn test_locate_is_deterministic() {
        let xml = compose_screen(&[
            NodeSpec::new("android.widget.ImageView").id("send_icon").clickable(true).bounds(900, 2100, 1000, 2200),
            NodeSpec::new("android.widget.ImageView").id("send_icon").clickable(true).bounds(10, 10, 60, 60),
        ]);
        let locator = SendButtonLocator::default();
        let first = locator.locate(&HierarchySnapshot::parse(xml.clone()).unwrap(), Some(SCREEN)).unwrap();
        for _ in 0..10 {
            let again = locator.locate(&HierarchySnapshot::parse(xml.clone()).unwrap(), Some(SCREEN)).unwrap();
            assert_eq!(again, first);
        }
        assert_eq!(first.point, Point::new(950, 2150));
    }

    #[test]
    fn test_tier_hits_respect_windows() {
        let sizes = [10, 24, 25, 29, 30, 49, 50, 120, 150, 151, 200, 201, 300, 301];
        for &w in &sizes {
            for &h in &sizes {
                let snap = snapshot(&[
                    NodeSpec::button("Send").bounds(0, 0, w, h),
                    NodeSpec::new("android.widget.ImageView").id("send").clickable(true).bounds(0, 0, w, h),
                    NodeSpec::new("android.widget.ImageView").desc("Send").clickable(true).bounds(0, 0, w, h),
                ]);
                for candidate in SendButtonLocator::default().candidates(&snap, None) {
                    let window = match candidate.tier {
                        Tier::ExactText => EXACT_TEXT_WINDOW,
                        Tier::ResourceId => RESOURCE_ID_WINDOW,
                        Tier::ContentDescription => CONTENT_DESC_WINDOW,
                        Tier::CoordinateHeuristic => unreachable!(),
                    };
                    let element = &snap.elements()[candidate.element_index.unwrap()];
                    assert!(window.fits(&element.bounds), "{:?} outside {:?}", element.bounds, window);
                }
            }
        }
    }

    #[test]
    fn test_is_send_like() {
        let snap = snapshot(&[
            NodeSpec::button("Send"),
            NodeSpec::text_view("Sender info"),
            NodeSpec::text_view("Hello"),
        ]);
        let flags: Vec<bool> = snap.elements()[1..].iter().map(is_send_like).collect();
        assert_eq!(flags, vec![true, false, false]);
    }
}
