use eframe::egui;

use crate::metrics::{Grade, PerformanceMetrics};

/// Errors beyond this are pinned to the bottom edge.
const GRAPH_RANGE_MS: f64 = 200.0;
const GRAPH_HEIGHT: f32 = 80.0;
const POINT_SPACING: f32 = 3.0;
const LEFT_MARGIN: f32 = 5.0;

/// Distance below the top edge for an absolute timing error.
pub fn error_offset(error_ms: f64, height: f32) -> f32 {
    let scaled = (error_ms.abs().min(GRAPH_RANGE_MS) / GRAPH_RANGE_MS) as f32 * height;
    scaled.min(height - 2.0).max(0.0)
}

/// Line through the most recent errors that fit in `rect`, oldest first.
pub fn graph_points(history: &[f64], rect: egui::Rect) -> Vec<egui::Pos2> {
    let capacity = ((rect.width() - LEFT_MARGIN) / POINT_SPACING).floor().max(0.0) as usize + 1;
    let skip = history.len().saturating_sub(capacity);
    history[skip..]
        .iter()
        .enumerate()
        .map(|(i, error)| {
            egui::pos2(
                rect.left() + LEFT_MARGIN + i as f32 * POINT_SPACING,
                rect.top() + error_offset(*error, rect.height()),
            )
        })
        .collect()
}

/// Recent timing errors against the grade thresholds.
pub struct TimingGraph<'a> {
    metrics: &'a PerformanceMetrics,
}

impl<'a> TimingGraph<'a> {
    pub fn new(metrics: &'a PerformanceMetrics) -> Self {
        Self { metrics }
    }

    pub fn show(self, ui: &mut egui::Ui) {
        let history: Vec<f64> = self.metrics.timing_history().collect();
        if history.is_empty() {
            return;
        }

        ui.label("Timing history");
        let (response, painter) = ui.allocate_painter(
            egui::vec2(ui.available_width(), GRAPH_HEIGHT),
            egui::Sense::hover(),
        );
        let rect = response.rect;
        let grid = egui::Color32::from_rgb(90, 90, 90);

        painter.rect_stroke(rect, 0.0, egui::Stroke::new(1.0, grid), egui::StrokeKind::Inside);

        for grade in Grade::ALL {
            let Some(limit) = grade.threshold_ms() else {
                continue;
            };
            let y = rect.top() + error_offset(limit, rect.height());
            painter.line_segment(
                [egui::pos2(rect.left() + 1.0, y), egui::pos2(rect.right() - 1.0, y)],
                egui::Stroke::new(1.0, grid),
            );
            painter.text(
                egui::pos2(rect.right() - 2.0, y - 1.0),
                egui::Align2::RIGHT_BOTTOM,
                grade.to_string(),
                egui::FontId::proportional(9.0),
                egui::Color32::GRAY,
            );
        }

        let points = graph_points(&history, rect);
        if points.len() > 1 {
            painter.add(egui::Shape::line(
                points,
                egui::Stroke::new(2.0, egui::Color32::from_rgb(100, 100, 200)),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_scale_to_the_range() {
        assert_eq!(error_offset(0.0, 80.0), 0.0);
        assert_eq!(error_offset(-100.0, 80.0), 40.0);
        assert_eq!(error_offset(2000.0, 80.0), 78.0);
    }

    #[test]
    fn only_recent_errors_fit() {
        let rect = egui::Rect::from_min_size(egui::pos2(10.0, 100.0), egui::vec2(20.0, 80.0));
        let history: Vec<f64> = (0..10).map(|i| i as f64 * 20.0).collect();

        let points = graph_points(&history, rect);
        assert_eq!(points.len(), 6);
        assert_eq!(points[0], egui::pos2(15.0, 100.0 + 32.0));
        assert_eq!(points[5].x, 30.0);
    }
}
