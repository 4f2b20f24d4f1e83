//! Gesture classification from raw pointer contacts.
//!
//! The classifier tracks the current contact set and turns contact updates
//! into taps, long-presses and pans. Pan deltas are always relative to the
//! previously reported position, so the deltas of one pan add up to its net
//! displacement.

use std::{ops::Sub, time::Instant};

use crate::config::GestureConfig;

/// Pointer/touch identifier as reported by the input surface.
pub type ContactId = i64;

/// Screen position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Mean position, or `None` for an empty set.
    #[must_use]
    pub fn centroid(points: impl IntoIterator<Item = Self>) -> Option<Self> {
        let (sum, count) = points
            .into_iter()
            .fold((Self::default(), 0_u32), |(acc, n), p| {
                (Self::new(acc.x + p.x, acc.y + p.y), n + 1)
            });
        (count > 0).then(|| Self::new(sum.x / f64::from(count), sum.y / f64::from(count)))
    }
}

impl Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// An active touch, alive from contact-down to contact-up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerContact {
    pub id: ContactId,
    pub start: Point,
    pub current: Point,
}

/// Raw update from the input surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactEvent {
    Down { id: ContactId, position: Point, at: Instant },
    Move { id: ContactId, position: Point, at: Instant },
    Up { id: ContactId, at: Instant },
    /// The surface gave up on the contact (e.g. `pointercancel`). Never a tap.
    Cancel { id: ContactId, at: Instant },
}

impl ContactEvent {
    #[must_use]
    pub const fn at(&self) -> Instant {
        match self {
            Self::Down { at, .. }
            | Self::Move { at, .. }
            | Self::Up { at, .. }
            | Self::Cancel { at, .. } => *at,
        }
    }
}

/// Classified gesture signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEvent {
    Tap,
    LongPress,
    PanStart { finger_count: usize },
    PanMove { dx: f64, dy: f64, finger_count: usize },
    PanEnd,
}

/// State of the gesture spanning first contact-down to last contact-up.
#[derive(Debug, Clone, Copy)]
struct Gesture {
    started_at: Instant,
    /// Reference point for slop checks and the first pan delta.
    origin: Point,
    /// Last reported position while a pan is in progress.
    last: Option<Point>,
    single_contact: bool,
    moved: bool,
    long_pressed: bool,
}

impl Gesture {
    const fn new(at: Instant, origin: Point) -> Self {
        Self {
            started_at: at,
            origin,
            last: None,
            single_contact: true,
            moved: false,
            long_pressed: false,
        }
    }
}

/// Turns pointer contacts into `GestureEvent`s.
#[derive(Debug, Clone)]
pub struct GestureClassifier {
    config: GestureConfig,
    contacts: Vec<PointerContact>,
    gesture: Option<Gesture>,
}

impl GestureClassifier {
    /// Create a classifier with the given thresholds.
    #[must_use]
    pub const fn new(config: GestureConfig) -> Self {
        Self {
            config,
            contacts: Vec::new(),
            gesture: None,
        }
    }

    /// Number of contacts currently down.
    #[must_use]
    pub const fn active_contacts(&self) -> usize {
        self.contacts.len()
    }

    /// Whether a pan is in progress.
    #[must_use]
    pub fn is_panning(&self) -> bool {
        self.gesture.is_some_and(|g| g.last.is_some())
    }

    /// Feed one contact update.
    pub fn handle(&mut self, event: ContactEvent) -> Vec<GestureEvent> {
        let mut out = Vec::new();
        out.extend(self.poll(event.at()));

        match event {
            ContactEvent::Down { id, position, at } => self.on_down(id, position, at, &mut out),
            ContactEvent::Move { id, position, .. } => self.on_move(id, position, &mut out),
            ContactEvent::Up { id, at } => self.on_lift(id, Some(at), &mut out),
            ContactEvent::Cancel { id, .. } => self.on_lift(id, None, &mut out),
        }
        out
    }

    /// Fire a pending long-press once the hold threshold has passed.
    ///
    /// Needs to be called periodically; a stationary finger produces no
    /// contact events of its own.
    pub fn poll(&mut self, now: Instant) -> Option<GestureEvent> {
        let long_press = self.config.long_press();
        let single = self.contacts.len() == 1;
        let gesture = self.gesture.as_mut()?;

        let eligible = single
            && gesture.single_contact
            && gesture.last.is_none()
            && !gesture.moved
            && !gesture.long_pressed;
        if eligible && now.saturating_duration_since(gesture.started_at) >= long_press {
            gesture.long_pressed = true;
            return Some(GestureEvent::LongPress);
        }
        None
    }

    fn centroid(&self) -> Option<Point> {
        Point::centroid(self.contacts.iter().map(|c| c.current))
    }

    fn on_down(
        &mut self,
        id: ContactId,
        position: Point,
        at: Instant,
        out: &mut Vec<GestureEvent>,
    ) {
        if self.contacts.iter().any(|c| c.id == id) {
            self.on_move(id, position, out);
            return;
        }

        self.contacts.push(PointerContact {
            id,
            start: position,
            current: position,
        });

        match self.gesture {
            None => self.gesture = Some(Gesture::new(at, position)),
            Some(_) => self.rebase(out),
        }
    }

    fn on_move(&mut self, id: ContactId, position: Point, out: &mut Vec<GestureEvent>) {
        let Some(contact) = self.contacts.iter_mut().find(|c| c.id == id) else {
            return;
        };
        contact.current = position;

        let finger_count = self.contacts.len();
        let Some(center) = self.centroid() else {
            return;
        };
        let threshold = self.config.movement_threshold;
        let Some(gesture) = self.gesture.as_mut() else {
            return;
        };

        match gesture.last {
            Some(last) => {
                let delta = center - last;
                if delta != Point::default() {
                    out.push(GestureEvent::PanMove {
                        dx: delta.x,
                        dy: delta.y,
                        finger_count,
                    });
                }
                gesture.last = Some(center);
            }
            None if center.distance(gesture.origin) >= threshold => {
                let delta = center - gesture.origin;
                gesture.moved = true;
                gesture.last = Some(center);
                out.push(GestureEvent::PanStart { finger_count });
                out.push(GestureEvent::PanMove {
                    dx: delta.x,
                    dy: delta.y,
                    finger_count,
                });
            }
            None => {}
        }
    }

    /// Contact-up (`at` is set) or cancel (`at` is `None`).
    fn on_lift(&mut self, id: ContactId, at: Option<Instant>, out: &mut Vec<GestureEvent>) {
        let Some(index) = self.contacts.iter().position(|c| c.id == id) else {
            return;
        };
        self.contacts.remove(index);

        if !self.contacts.is_empty() {
            self.rebase(out);
            return;
        }

        let Some(gesture) = self.gesture.take() else {
            return;
        };
        if gesture.last.is_some() {
            out.push(GestureEvent::PanEnd);
        }

        let Some(at) = at else {
            return;
        };
        let quick = at.saturating_duration_since(gesture.started_at) <= self.config.tap_max();
        if quick && gesture.single_contact && !gesture.moved && !gesture.long_pressed {
            out.push(GestureEvent::Tap);
        }
    }

    /// The contact set changed while a gesture is live: close any pan and
    /// restart motion tracking from the new centroid.
    fn rebase(&mut self, out: &mut Vec<GestureEvent>) {
        let center = self.centroid();
        let Some(gesture) = self.gesture.as_mut() else {
            return;
        };
        if gesture.last.take().is_some() {
            out.push(GestureEvent::PanEnd);
        }
        gesture.single_contact = false;
        if let Some(center) = center {
            gesture.origin = center;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn ms(base: Instant, offset: u64) -> Instant {
        base + Duration::from_millis(offset)
    }

    fn down(id: ContactId, x: f64, y: f64, at: Instant) -> ContactEvent {
        ContactEvent::Down { id, position: Point::new(x, y), at }
    }

    fn moved(id: ContactId, x: f64, y: f64, at: Instant) -> ContactEvent {
        ContactEvent::Move { id, position: Point::new(x, y), at }
    }

    fn feed(classifier: &mut GestureClassifier, events: &[ContactEvent]) -> Vec<GestureEvent> {
        events.iter().flat_map(|e| classifier.handle(*e)).collect()
    }

    #[test]
    fn test_small_quick_contact_is_single_tap() {
        let t0 = Instant::now();
        let mut classifier = GestureClassifier::new(GestureConfig::default());
        let events = feed(
            &mut classifier,
            &[
                down(1, 100.0, 100.0, t0),
                moved(1, 102.0, 101.0, ms(t0, 40)),
                moved(1, 97.0, 103.0, ms(t0, 80)),
                ContactEvent::Up { id: 1, at: ms(t0, 120) },
            ],
        );
        assert_eq!(events, vec![GestureEvent::Tap]);
        assert_eq!(classifier.active_contacts(), 0);
    }

    #[test]
    fn test_slow_contact_is_not_tap() {
        let t0 = Instant::now();
        let mut classifier = GestureClassifier::new(GestureConfig::default());
        let events = feed(
            &mut classifier,
            &[down(1, 0.0, 0.0, t0), ContactEvent::Up { id: 1, at: ms(t0, 400) }],
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_long_press_fires_once_and_suppresses_tap() {
        let t0 = Instant::now();
        let mut classifier = GestureClassifier::new(GestureConfig::default());
        assert!(classifier.handle(down(7, 50.0, 50.0, t0)).is_empty());
        assert_eq!(classifier.poll(ms(t0, 300)), None);
        assert_eq!(classifier.poll(ms(t0, 600)), Some(GestureEvent::LongPress));
        assert_eq!(classifier.poll(ms(t0, 900)), None);

        let events = classifier.handle(ContactEvent::Up { id: 7, at: ms(t0, 950) });
        assert!(events.is_empty());
    }

    #[test]
    fn test_long_press_detected_on_lift_without_poll() {
        let t0 = Instant::now();
        let mut classifier = GestureClassifier::new(GestureConfig::default());
        let events = feed(
            &mut classifier,
            &[down(1, 0.0, 0.0, t0), ContactEvent::Up { id: 1, at: ms(t0, 700) }],
        );
        assert_eq!(events, vec![GestureEvent::LongPress]);
    }

    #[test]
    fn test_single_finger_pan() {
        let t0 = Instant::now();
        let mut classifier = GestureClassifier::new(GestureConfig::default());
        let events = feed(
            &mut classifier,
            &[
                down(1, 10.0, 10.0, t0),
                moved(1, 30.0, 15.0, ms(t0, 16)),
                moved(1, 35.0, 25.0, ms(t0, 32)),
                ContactEvent::Up { id: 1, at: ms(t0, 48) },
            ],
        );
        assert_eq!(
            events,
            vec![
                GestureEvent::PanStart { finger_count: 1 },
                GestureEvent::PanMove { dx: 20.0, dy: 5.0, finger_count: 1 },
                GestureEvent::PanMove { dx: 5.0, dy: 10.0, finger_count: 1 },
                GestureEvent::PanEnd,
            ]
        );
    }

    #[test]
    fn test_pan_deltas_telescope() {
        let t0 = Instant::now();
        let mut classifier = GestureClassifier::new(GestureConfig::default());
        let path = [(3.0, 1.0), (12.0, -4.0), (40.5, 8.25), (39.0, 60.0), (-20.0, 61.5)];

        let mut events = classifier.handle(down(1, 0.0, 0.0, t0));
        for (i, (x, y)) in path.iter().enumerate() {
            events.extend(classifier.handle(moved(1, *x, *y, ms(t0, 10 * (i as u64 + 1)))));
        }
        events.extend(classifier.handle(ContactEvent::Up { id: 1, at: ms(t0, 100) }));

        let (sx, sy) = events.iter().fold((0.0, 0.0), |(sx, sy), e| match e {
            GestureEvent::PanMove { dx, dy, .. } => (sx + dx, sy + dy),
            _ => (sx, sy),
        });
        assert!((sx - -20.0_f64).abs() < 1e-9);
        assert!((sy - 61.5_f64).abs() < 1e-9);
        assert_eq!(events.first(), Some(&GestureEvent::PanStart { finger_count: 1 }));
        assert_eq!(events.last(), Some(&GestureEvent::PanEnd));
    }

    #[test]
    fn test_two_finger_pan_reports_finger_count() {
        let t0 = Instant::now();
        let mut classifier = GestureClassifier::new(GestureConfig::default());
        let events = feed(
            &mut classifier,
            &[
                down(1, 100.0, 100.0, t0),
                down(2, 140.0, 100.0, ms(t0, 10)),
                moved(1, 100.0, 120.0, ms(t0, 20)),
                moved(2, 140.0, 120.0, ms(t0, 30)),
            ],
        );
        assert_eq!(
            events,
            vec![
                GestureEvent::PanStart { finger_count: 2 },
                GestureEvent::PanMove { dx: 0.0, dy: 10.0, finger_count: 2 },
                GestureEvent::PanMove { dx: 0.0, dy: 10.0, finger_count: 2 },
            ]
        );
        assert!(classifier.is_panning());
    }

    #[test]
    fn test_second_finger_ends_running_pan() {
        let t0 = Instant::now();
        let mut classifier = GestureClassifier::new(GestureConfig::default());
        let events = feed(
            &mut classifier,
            &[
                down(1, 0.0, 0.0, t0),
                moved(1, 20.0, 20.0, ms(t0, 10)),
                down(2, 60.0, 20.0, ms(t0, 20)),
            ],
        );
        assert_eq!(events.last(), Some(&GestureEvent::PanEnd));
        assert!(!classifier.is_panning());

        // Lifting both fingers afterwards never yields a tap.
        let events = feed(
            &mut classifier,
            &[
                ContactEvent::Up { id: 2, at: ms(t0, 30) },
                ContactEvent::Up { id: 1, at: ms(t0, 40) },
            ],
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_two_quick_fingers_are_not_tap() {
        let t0 = Instant::now();
        let mut classifier = GestureClassifier::new(GestureConfig::default());
        let events = feed(
            &mut classifier,
            &[
                down(1, 0.0, 0.0, t0),
                down(2, 30.0, 0.0, ms(t0, 5)),
                ContactEvent::Up { id: 1, at: ms(t0, 50) },
                ContactEvent::Up { id: 2, at: ms(t0, 55) },
            ],
        );
        assert!(events.is_empty());
        assert_eq!(classifier.poll(ms(t0, 2000)), None);
    }

    #[test]
    fn test_cancel_is_never_tap() {
        let t0 = Instant::now();
        let mut classifier = GestureClassifier::new(GestureConfig::default());
        let events = feed(
            &mut classifier,
            &[down(1, 0.0, 0.0, t0), ContactEvent::Cancel { id: 1, at: ms(t0, 20) }],
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_unknown_contact_ignored() {
        let t0 = Instant::now();
        let mut classifier = GestureClassifier::new(GestureConfig::default());
        assert!(classifier.handle(moved(9, 5.0, 5.0, t0)).is_empty());
        assert!(classifier.handle(ContactEvent::Up { id: 9, at: t0 }).is_empty());
    }

    #[test]
    fn test_centroid() {
        assert_eq!(Point::centroid([]), None);
        let c = Point::centroid([Point::new(0.0, 0.0), Point::new(10.0, 4.0)]).unwrap();
        assert_eq!(c, Point::new(5.0, 2.0));
    }
}
