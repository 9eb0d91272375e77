//! Board canvas geometry: the pan/zoom viewport and rubber-band selection.
//!
//! Screen space is pixels relative to the canvas' top-left corner. Content
//! space is where element positions live. The two are related by
//! `content = (screen - offset) / scale`.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};

use crate::models::BoardElement;

pub const MIN_SCALE: f64 = 0.25;
pub const MAX_SCALE: f64 = 4.0;
/// Scale step for the zoom buttons.
pub const BUTTON_ZOOM_FACTOR: f64 = 1.2;
/// Scale step per wheel notch with the zoom modifier held.
pub const WHEEL_ZOOM_FACTOR: f64 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl std::ops::Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    #[serde(deserialize_with = "clamped_scale")]
    scale: f64,
    pub offset: Point,
    /// Visible canvas size in screen pixels.
    pub size: Point,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            scale: 1.0,
            offset: Point::default(),
            size: Point::new(width, height),
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Sets the scale directly, clamped to the zoom range.
    pub fn set_scale(&mut self, scale: f64) {
        self.scale = clamp_scale(scale);
    }

    pub fn screen_to_content(&self, screen: Point) -> Point {
        Point::new(
            (screen.x - self.offset.x) / self.scale,
            (screen.y - self.offset.y) / self.scale,
        )
    }

    pub fn content_to_screen(&self, content: Point) -> Point {
        Point::new(
            content.x * self.scale + self.offset.x,
            content.y * self.scale + self.offset.y,
        )
    }

    pub fn pan(&mut self, delta: Point) {
        self.offset = self.offset + delta;
    }

    /// Changes the scale while keeping the content point under `cursor`
    /// where it is on screen. Returns the applied (clamped) scale.
    pub fn zoom_at(&mut self, cursor: Point, scale: f64) -> f64 {
        let scale = clamp_scale(scale);
        let anchor = self.screen_to_content(cursor);
        self.scale = scale;
        self.offset = Point::new(cursor.x - anchor.x * scale, cursor.y - anchor.y * scale);
        scale
    }

    pub fn center(&self) -> Point {
        Point::new(self.size.x / 2.0, self.size.y / 2.0)
    }

    pub fn zoom_in(&mut self) -> f64 {
        self.zoom_at(self.center(), self.scale * BUTTON_ZOOM_FACTOR)
    }

    pub fn zoom_out(&mut self) -> f64 {
        self.zoom_at(self.center(), self.scale / BUTTON_ZOOM_FACTOR)
    }

    /// Handles a wheel event. With ctrl/cmd held the wheel zooms around the
    /// cursor, otherwise it scrolls the canvas vertically.
    pub fn wheel(&mut self, cursor: Point, delta_y: f64, zoom_modifier: bool) {
        if !zoom_modifier {
            self.pan(Point::new(0.0, -delta_y));
            return;
        }
        if delta_y == 0.0 {
            return;
        }
        let factor = if delta_y < 0.0 {
            WHEEL_ZOOM_FACTOR
        } else {
            1.0 / WHEEL_ZOOM_FACTOR
        };
        self.zoom_at(cursor, self.scale * factor);
    }

    pub fn reset(&mut self) {
        self.scale = 1.0;
        self.offset = Point::default();
    }

    /// The content-space rectangle currently on screen.
    pub fn visible_content(&self) -> Rect {
        Rect::from_points(
            self.screen_to_content(Point::default()),
            self.screen_to_content(self.size),
        )
    }
}

fn clamped_scale<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    f64::deserialize(deserializer).map(clamp_scale)
}

fn clamp_scale(scale: f64) -> f64 {
    if scale.is_nan() {
        return 1.0;
    }
    scale.clamp(MIN_SCALE, MAX_SCALE)
}

/// Axis-aligned rectangle with non-negative extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Normalises a drag from `a` to `b` in any direction.
    pub fn from_points(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    pub fn of_element(element: &BoardElement) -> Self {
        Self {
            x: element.position_x,
            y: element.position_y,
            width: element.width,
            height: element.height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    /// Touching edges count as intersecting.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x <= other.right()
            && other.x <= self.right()
            && self.y <= other.bottom()
            && other.y <= self.bottom()
    }
}

/// Selected element ids on the open board.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    ids: HashSet<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &HashSet<String> {
        &self.ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Replaces the selection with a single element.
    pub fn select(&mut self, id: impl Into<String>) {
        self.ids.clear();
        self.ids.insert(id.into());
    }

    /// Shift-click: adds or removes one element.
    pub fn toggle(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.ids.remove(&id) {
            self.ids.insert(id);
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Selects every element whose bounds intersect `area` (content space).
    /// Returns the number selected.
    pub fn select_in_rect(&mut self, elements: &[BoardElement], area: Rect) -> usize {
        self.ids = elements
            .iter()
            .filter(|e| Rect::of_element(e).intersects(&area))
            .map(|e| e.id.clone())
            .collect();
        self.ids.len()
    }

    /// Drops ids whose elements no longer exist.
    pub fn retain_existing(&mut self, elements: &[BoardElement]) {
        let live: HashSet<&str> = elements.iter().map(|e| e.id.as_str()).collect();
        self.ids.retain(|id| live.contains(id.as_str()));
    }
}
