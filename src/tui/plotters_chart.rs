//! Plotters-powered lifetime chart widget for Ratatui.
//!
//! Plotters output is rendered into the Ratatui buffer through
//! `plotters-ratatui-backend`, so the terminal chart and the SVG files share
//! one drawing vocabulary.

use plotters::prelude::*;
use plotters::style::Color as _;
use plotters_ratatui_backend::widget_fn;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};

use crate::plot::LifetimePoint;

/// One segment's fitted points, already split at missing fits.
pub struct ChartSeries<'a> {
    pub runs: &'a [Vec<LifetimePoint>],
    pub color: RGBColor,
}

/// Render-only chart description. Series and bounds are computed outside the
/// render call.
pub struct LifetimeChart<'a> {
    pub series: &'a [ChartSeries<'a>],
    /// X bounds (PE threshold).
    pub x_bounds: [f64; 2],
    /// Y bounds (lifetime, s).
    pub y_bounds: [f64; 2],
}

impl<'a> Widget for LifetimeChart<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Plotters may fail to build a chart in a tiny area.
        if area.width < 20 || area.height < 8 {
            buf.set_string(
                area.x,
                area.y,
                "Chart area too small (resize terminal).",
                Style::default().fg(Color::Yellow),
            );
            return;
        }

        let [x0, x1] = self.x_bounds;
        let [y0, y1] = self.y_bounds;
        if !(x0.is_finite() && x1.is_finite() && y0.is_finite() && y1.is_finite()) || x1 <= x0 || y1 <= y0 {
            return;
        }

        let widget = widget_fn(move |root| {
            let mut chart = ChartBuilder::on(&root)
                .margin(1)
                // Terminal cells are low-res, so keep label areas compact.
                .set_label_area_size(LabelAreaPosition::Left, 6)
                .set_label_area_size(LabelAreaPosition::Bottom, 3)
                .build_cartesian_2d(x0..x1, y0..y1)?;

            chart
                .configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .x_labels(5)
                .y_labels(5)
                .label_style(("sans-serif", 10).into_font().color(&WHITE))
                .axis_style(&WHITE)
                .bold_line_style(&WHITE)
                .draw()?;

            for series in self.series {
                let color = series.color;
                for run in series.runs {
                    chart.draw_series(LineSeries::new(run.iter().map(|&(t, tau, _)| (t, tau)), color))?;

                    // Error bars as plain vertical segments; the backend's
                    // marker shapes do not scale well to terminal cells.
                    for &(t, tau, dtau) in run {
                        if let Some(d) = dtau.filter(|d| d.is_finite()) {
                            let lo = (tau - d).max(y0);
                            let hi = (tau + d).min(y1);
                            chart.draw_series(LineSeries::new([(t, lo), (t, hi)], color.mix(0.6)))?;
                        }
                    }
                    chart.draw_series(run.iter().map(|&(t, tau, _)| Pixel::new((t, tau), WHITE)))?;
                }
            }
            Ok(())
        });

        widget.render(area, buf);
    }
}
