use eframe::egui;
use std::collections::BTreeSet;

use crate::config::DisplayConfig;
use crate::input::KeyboardMapping;
use crate::notes::{NoteState, NoteView};
use crate::session::PracticeSession;
use crate::theory::{is_black_key, note_name};

const KEYBOARD_HEIGHT: f32 = 120.0;
const BLACK_KEY_WIDTH: f32 = 0.6;
const BLACK_KEY_HEIGHT: f32 = 0.62;

/// Horizontal placement of piano keys across a lane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyboardLayout {
    first_key: u8,
    last_key: u8,
    left: f32,
    white_width: f32,
}

impl KeyboardLayout {
    pub fn new(first_key: u8, last_key: u8, left: f32, width: f32) -> Self {
        let last_key = last_key.max(first_key);
        let whites = (first_key..=last_key).filter(|&p| !is_black_key(p)).count().max(1);
        Self {
            first_key,
            last_key,
            left,
            white_width: width / whites as f32,
        }
    }

    pub fn white_width(&self) -> f32 {
        self.white_width
    }

    pub fn contains(&self, pitch: u8) -> bool {
        (self.first_key..=self.last_key).contains(&pitch)
    }

    fn whites_below(&self, pitch: u8) -> usize {
        (self.first_key..pitch).filter(|&p| !is_black_key(p)).count()
    }

    /// Left edge and width of the key for `pitch`.
    pub fn key_span(&self, pitch: u8) -> Option<(f32, f32)> {
        if !self.contains(pitch) {
            return None;
        }
        let boundary = self.left + self.whites_below(pitch) as f32 * self.white_width;
        if is_black_key(pitch) {
            let width = self.white_width * BLACK_KEY_WIDTH;
            Some((boundary - width / 2.0, width))
        } else {
            Some((boundary, self.white_width))
        }
    }
}

/// Colour of a falling block.
fn note_color(view: &NoteView) -> egui::Color32 {
    match view.state {
        NoteState::Falling if is_black_key(view.pitch) => egui::Color32::from_rgb(40, 110, 200),
        NoteState::Falling => egui::Color32::from_rgb(80, 160, 255),
        NoteState::Waiting => egui::Color32::from_rgb(255, 200, 60),
        NoteState::Hit { .. } => egui::Color32::from_rgb(60, 200, 100),
        NoteState::Missed => egui::Color32::from_rgb(220, 60, 60),
    }
}

/// The note lane, target line and keyboard for one practice session.
pub struct FallingNotes<'a> {
    session: &'a mut PracticeSession,
    display: &'a DisplayConfig,
    mapping: &'a KeyboardMapping,
    position: f64,
}

impl<'a> FallingNotes<'a> {
    pub fn new(
        session: &'a mut PracticeSession,
        display: &'a DisplayConfig,
        mapping: &'a KeyboardMapping,
        position: f64,
    ) -> Self {
        Self {
            session,
            display,
            mapping,
            position,
        }
    }

    pub fn show(self, ui: &mut egui::Ui) {
        let (response, painter) = ui.allocate_painter(ui.available_size(), egui::Sense::hover());
        let rect = response.rect;

        let lane_height = (rect.height() - KEYBOARD_HEIGHT).max(0.0);
        let lane = egui::Rect::from_min_size(rect.min, egui::vec2(rect.width(), lane_height));
        let keys = egui::Rect::from_min_max(egui::pos2(rect.left(), lane.bottom()), rect.max);
        let layout = KeyboardLayout::new(
            self.display.first_key,
            self.display.last_key(),
            rect.left(),
            rect.width(),
        );

        self.session.manager_mut().set_target_line(lane_height);

        painter.rect_filled(lane, 0.0, egui::Color32::from_rgb(30, 30, 30));
        self.draw_lanes(&painter, lane, &layout);
        if self.display.mode.shows_notes() {
            self.draw_notes(&painter.with_clip_rect(lane), lane, &layout);
        }

        painter.line_segment(
            [
                egui::pos2(lane.left(), lane.bottom()),
                egui::pos2(lane.right(), lane.bottom()),
            ],
            egui::Stroke::new(3.0, egui::Color32::from_rgb(255, 80, 80)),
        );

        self.draw_keyboard(&painter, keys, &layout);
    }

    fn draw_lanes(&self, painter: &egui::Painter, lane: egui::Rect, layout: &KeyboardLayout) {
        if !self.display.show_octave_markers {
            return;
        }
        for pitch in self.display.first_key..=self.display.last_key() {
            if pitch % 12 != 0 {
                continue;
            }
            let Some((x, _)) = layout.key_span(pitch) else {
                continue;
            };
            painter.line_segment(
                [egui::pos2(x, lane.top()), egui::pos2(x, lane.bottom())],
                egui::Stroke::new(1.0, egui::Color32::from_rgb(55, 55, 55)),
            );
        }
    }

    fn draw_notes(&self, painter: &egui::Painter, lane: egui::Rect, layout: &KeyboardLayout) {
        let manager = self.session.manager();

        let fading = self
            .session
            .fading()
            .iter()
            .map(|fade| (fade.view, fade.alpha(self.position)));
        let active = manager.views().map(|view| (view, 1.0));

        for (view, alpha) in fading.chain(active) {
            let (Some((x, width)), Some(y)) = (layout.key_span(view.pitch), view.y) else {
                continue;
            };
            let bottom = lane.top() + y;
            let note_rect = egui::Rect::from_min_max(
                egui::pos2(x + 1.0, bottom - view.height),
                egui::pos2(x + width - 1.0, bottom),
            );
            if !note_rect.intersects(lane) {
                continue;
            }

            let velocity_factor = 0.6 + 0.4 * view.velocity as f32 / 127.0;
            let color = note_color(&view).gamma_multiply(velocity_factor * alpha);
            painter.rect_filled(note_rect, 3.0, color);
            painter.rect_stroke(
                note_rect,
                3.0,
                egui::Stroke::new(1.0, egui::Color32::WHITE.gamma_multiply(alpha * 0.5)),
                egui::StrokeKind::Inside,
            );
        }
    }

    fn draw_keyboard(&self, painter: &egui::Painter, keys: egui::Rect, layout: &KeyboardLayout) {
        let manager = self.session.manager();
        let highlights = if self.display.mode.shows_highlights() {
            manager.active_highlights(self.position)
        } else {
            BTreeSet::new()
        };
        let waiting = manager.waiting_pitches();
        let pressed = self.session.pressed();

        let (black, white): (Vec<u8>, Vec<u8>) = (self.display.first_key..=self.display.last_key())
            .partition(|&p| is_black_key(p));

        for pitch in white {
            self.draw_key(painter, keys, layout, pitch, pressed, &highlights, &waiting);
        }
        for pitch in black {
            self.draw_key(painter, keys, layout, pitch, pressed, &highlights, &waiting);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_key(
        &self,
        painter: &egui::Painter,
        keys: egui::Rect,
        layout: &KeyboardLayout,
        pitch: u8,
        pressed: &BTreeSet<u8>,
        highlights: &BTreeSet<u8>,
        waiting: &BTreeSet<u8>,
    ) {
        let Some((x, width)) = layout.key_span(pitch) else {
            return;
        };
        let black = is_black_key(pitch);
        let height = if black {
            keys.height() * BLACK_KEY_HEIGHT
        } else {
            keys.height()
        };
        let key_rect =
            egui::Rect::from_min_size(egui::pos2(x, keys.top()), egui::vec2(width, height));

        let fill = if pressed.contains(&pitch) {
            egui::Color32::from_rgb(90, 180, 255)
        } else if waiting.contains(&pitch) {
            egui::Color32::from_rgb(255, 170, 40)
        } else if highlights.contains(&pitch) {
            egui::Color32::from_rgb(255, 230, 120)
        } else if black {
            egui::Color32::from_rgb(20, 20, 20)
        } else {
            egui::Color32::from_rgb(235, 235, 235)
        };

        painter.rect_filled(key_rect, 2.0, fill);
        painter.rect_stroke(
            key_rect,
            2.0,
            egui::Stroke::new(1.0, egui::Color32::from_rgb(100, 100, 100)),
            egui::StrokeKind::Inside,
        );

        let text_color = if black {
            egui::Color32::WHITE
        } else {
            egui::Color32::BLACK
        };
        let label = if self.display.show_note_names && !black {
            Some(note_name(pitch))
        } else if self.display.show_octave_markers && pitch % 12 == 0 {
            Some(note_name(pitch))
        } else {
            None
        };
        if let Some(label) = label {
            painter.text(
                egui::pos2(key_rect.center().x, key_rect.bottom() - 4.0),
                egui::Align2::CENTER_BOTTOM,
                label,
                egui::FontId::proportional(10.0),
                text_color,
            );
        }
        if let Some(key) = self.mapping.key_label(pitch) {
            painter.text(
                egui::pos2(key_rect.center().x, key_rect.top() + 4.0),
                egui::Align2::CENTER_TOP,
                key,
                egui::FontId::monospace(9.0),
                text_color.gamma_multiply(0.6),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_piano_spans_the_width() {
        let layout = KeyboardLayout::new(21, 108, 0.0, 1040.0);
        assert_eq!(layout.white_width(), 20.0);

        assert_eq!(layout.key_span(21), Some((0.0, 20.0)));
        let (x, width) = layout.key_span(108).unwrap();
        assert_eq!(x + width, 1040.0);
        assert_eq!(layout.key_span(20), None);
        assert_eq!(layout.key_span(109), None);
    }

    #[test]
    fn black_keys_straddle_white_boundaries() {
        let layout = KeyboardLayout::new(60, 71, 100.0, 70.0);
        // C at 100, D at 110
        assert_eq!(layout.key_span(62), Some((110.0, 10.0)));
        let (x, width) = layout.key_span(61).unwrap();
        assert!((width - 6.0).abs() < 1e-4);
        assert!((x + width / 2.0 - 110.0).abs() < 1e-4);
    }
}
