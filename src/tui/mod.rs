//! Ratatui-based lifetime viewer.
//!
//! Shows τ vs PE threshold for one segment (or all of them) next to the
//! selected segment's fit table. The campaign can be switched in place; the
//! aggregated pulse data is kept and only the threshold scan is re-run.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph},
};

use crate::aggregate::AggregatedData;
use crate::app::pipeline;
use crate::domain::{LifetimeConfig, Segment, SegmentScan};
use crate::error::AppError;
use crate::plot::{fitted_runs, lifetime_bounds, segment_color, threshold_bounds, write_lifetime_svg};

mod plotters_chart;

use plotters_chart::{ChartSeries, LifetimeChart};

/// Start the viewer. With `results`, show a saved JSON export instead of
/// running the pipeline.
pub fn run(config: LifetimeConfig, results: Option<PathBuf>) -> Result<(), AppError> {
    // Load before touching the terminal so input errors print normally.
    let mut app = match results {
        Some(path) => App::from_export(config, &path)?,
        None => App::from_pipeline(config)?,
    };

    let _guard = TerminalGuard::new()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal =
        Terminal::new(backend).map_err(|e| AppError::runtime(format!("Failed to initialize terminal: {e}")))?;
    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::runtime(format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::runtime(format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

struct App {
    config: LifetimeConfig,
    /// Aggregated bins; absent when showing a saved export.
    data: Option<AggregatedData>,
    scans: Vec<SegmentScan>,
    /// Index into `scans`; `None` overlays every segment.
    selected: Option<usize>,
    status: String,
}

impl App {
    fn from_pipeline(config: LifetimeConfig) -> Result<Self, AppError> {
        let run = pipeline::run_lifetime(&config)?;
        let status = format!("{} runs loaded", run.data.summary.runs_used.len());
        Ok(Self::new(config, Some(run.data), run.scans, status))
    }

    fn from_export(mut config: LifetimeConfig, path: &std::path::Path) -> Result<Self, AppError> {
        let export = crate::io::read_lifetime_json(path)?;
        config.campaign = export.campaign;
        config.method = export.method;
        let status = format!("results from {}", path.display());
        Ok(Self::new(config, None, export.scans, status))
    }

    fn new(config: LifetimeConfig, data: Option<AggregatedData>, scans: Vec<SegmentScan>, status: String) -> Self {
        Self {
            config,
            data,
            scans,
            selected: None,
            status,
        }
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::runtime(format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::runtime(format!("Event poll error: {e}")))?
            {
                continue;
            }

            match event::read().map_err(|e| AppError::runtime(format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => needs_redraw = true,
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns `true` when the viewer should exit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Right | KeyCode::Tab => self.cycle_segment(true),
            KeyCode::Left | KeyCode::BackTab => self.cycle_segment(false),
            KeyCode::Char('a') => {
                self.selected = None;
                self.status = "all segments".to_string();
            }
            KeyCode::Char('c') => self.switch_campaign(),
            KeyCode::Char('s') => self.save_chart(),
            _ => {}
        }
        false
    }

    /// Cycle `all -> first -> ... -> last -> all`.
    fn cycle_segment(&mut self, forward: bool) {
        let n = self.scans.len();
        if n == 0 {
            return;
        }
        self.selected = match (self.selected, forward) {
            (None, true) => Some(0),
            (None, false) => Some(n - 1),
            (Some(i), true) => (i + 1 < n).then_some(i + 1),
            (Some(i), false) => i.checked_sub(1),
        };
        self.status = match self.selected_segment() {
            Some(segment) => format!("segment {segment}"),
            None => "all segments".to_string(),
        };
    }

    fn selected_segment(&self) -> Option<Segment> {
        self.selected.and_then(|i| self.scans.get(i)).map(|s| s.segment)
    }

    fn switch_campaign(&mut self) {
        let Some(data) = &self.data else {
            self.status = "campaign is fixed by the results file".to_string();
            return;
        };
        self.config.campaign = self.config.campaign.next();
        self.config.method = self.config.campaign.method();
        self.scans = crate::fit::scan_thresholds(data, &self.config);
        self.status = format!("campaign {}", self.config.campaign.display_name());
    }

    fn save_chart(&mut self) {
        let path = self.config.graph_dir.join("lifetime_vs_threshold.svg");
        let result = crate::pulse::ensure_dir(&self.config.graph_dir)
            .and_then(|()| write_lifetime_svg(&path, &self.scans, &pipeline::chart_title(&self.config)));
        self.status = match result {
            Ok(()) => format!("wrote {}", path.display()),
            Err(err) => format!("save failed: {err}"),
        };
    }

    fn visible_scans(&self) -> &[SegmentScan] {
        match self.selected {
            Some(i) if i < self.scans.len() => &self.scans[i..=i],
            _ => &self.scans,
        }
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(4), Constraint::Min(0), Constraint::Length(3)])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let showing = match self.selected_segment() {
            Some(segment) => format!("segment {segment}"),
            None => "all segments".to_string(),
        };
        let lines = vec![
            Line::from(vec![
                Span::styled("ucnlife", Style::default().fg(Color::Cyan)),
                Span::raw(" lifetime vs PE threshold"),
            ]),
            Line::from(Span::styled(
                format!(
                    "campaign: {} | background: {:?} | fill: {:?} | band: {:?} | {showing}",
                    self.config.campaign.display_name(),
                    self.config.method.background,
                    self.config.method.normalization,
                    self.config.method.error_scan,
                ),
                Style::default().fg(Color::Gray),
            )),
        ];
        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(0), Constraint::Length(40)])
            .split(area);

        self.draw_chart(frame, chunks[0]);
        self.draw_table(frame, chunks[1]);
    }

    fn draw_chart(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let block = Block::default().title("Lifetime").borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);

        let scans = self.visible_scans();
        let Some((y0, y1)) = lifetime_bounds(scans) else {
            let msg = Paragraph::new("No fitted thresholds.").style(Style::default().fg(Color::Yellow));
            frame.render_widget(msg, inner);
            return;
        };
        let (x0, x1) = threshold_bounds(scans);

        let runs: Vec<(Segment, Vec<_>)> = scans.iter().map(|s| (s.segment, fitted_runs(s))).collect();
        let series: Vec<ChartSeries<'_>> = runs
            .iter()
            .map(|(segment, runs)| ChartSeries {
                runs,
                color: segment_color(*segment),
            })
            .collect();

        let (chart_rect, insets) = chart_layout(inner);
        let widget = LifetimeChart {
            series: &series,
            x_bounds: [x0, x1],
            y_bounds: [y0, y1],
        };
        frame.render_widget(widget, chart_rect);
        if let Some(insets) = insets {
            draw_axis_ticks(frame, inner, chart_rect, insets, [x0, x1], [y0, y1]);
        }
    }

    fn draw_table(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let scan = self.selected.and_then(|i| self.scans.get(i)).or(self.scans.first());
        let title = scan.map(|s| format!("Segment {}", s.segment)).unwrap_or_default();

        let mut items = vec![ListItem::new(format!("{:>4} {:>9} {:>8} {:>3}", "thr", "tau", "dtau", "n"))
            .style(Style::default().add_modifier(Modifier::BOLD))];
        if let Some(scan) = scan {
            items.extend(scan.points.iter().map(|p| {
                ListItem::new(table_row(
                    p.threshold,
                    p.fit.map(|f| f.tau),
                    p.fit.and_then(|f| f.dtau),
                    p.counts.len(),
                ))
            }));
        }

        let list = List::new(items).block(Block::default().title(title).borders(Borders::ALL));
        frame.render_widget(list, area);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "←/→ segment  a all  c campaign  s save svg  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

fn table_row(threshold: u32, tau: Option<f64>, dtau: Option<f64>, n: usize) -> String {
    let dash = || "-".to_string();
    format!(
        "{:>4} {:>9} {:>8} {:>3}",
        threshold,
        tau.map(|t| format!("{t:.1}")).unwrap_or_else(dash),
        dtau.map(|d| format!("{d:.1}")).unwrap_or_else(dash),
        n
    )
}

#[derive(Debug, Clone, Copy)]
struct AxisInsets {
    left: u16,
    right: u16,
    top: u16,
    bottom: u16,
}

fn chart_layout(inner: Rect) -> (Rect, Option<AxisInsets>) {
    let insets = AxisInsets {
        left: 8,
        right: 2,
        top: 1,
        bottom: 2,
    };

    if inner.width <= insets.left + insets.right + 10 || inner.height <= insets.top + insets.bottom + 5 {
        return (inner, None);
    }

    let rect = Rect {
        x: inner.x + insets.left,
        y: inner.y + insets.top,
        width: inner.width - insets.left - insets.right,
        height: inner.height - insets.top - insets.bottom,
    };
    (rect, Some(insets))
}

fn draw_axis_ticks(
    frame: &mut ratatui::Frame<'_>,
    inner: Rect,
    chart: Rect,
    insets: AxisInsets,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
) {
    let ticks = 5usize;
    let style = Style::default().fg(Color::Gray);

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let x_val = x_bounds[0] + u * (x_bounds[1] - x_bounds[0]);
        let x = chart.x + ((chart.width - 1) as f64 * u).round() as u16;
        let label = format!("{x_val:.0}");
        let start = x.saturating_sub((label.len() / 2) as u16);
        let y = chart.y + chart.height;
        if y >= inner.y + inner.height - 1 {
            continue;
        }
        let width = label.len() as u16;
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width,
                height: 1,
            },
        );
    }

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let y_val = y_bounds[0] + u * (y_bounds[1] - y_bounds[0]);
        let y = chart.y + (chart.height - 1) - ((chart.height - 1) as f64 * u).round() as u16;
        let label = format!("{y_val:.0}");
        let start = (inner.x + insets.left.saturating_sub(1)).saturating_sub(label.len() as u16);
        if start < inner.x {
            continue;
        }
        let width = label.len() as u16;
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width,
                height: 1,
            },
        );
    }

    let x_label = Paragraph::new("PE threshold")
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::Gray));
    let x_rect = Rect {
        x: chart.x,
        y: chart.y + chart.height + 1,
        width: chart.width,
        height: 1,
    };
    if x_rect.y < inner.y + inner.height {
        frame.render_widget(x_label, x_rect);
    }

    let y_label = Paragraph::new("tau (s)").style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));
    let y_rect = Rect {
        x: inner.x,
        y: inner.y,
        width: insets.left.saturating_sub(1),
        height: 1,
    };
    frame.render_widget(y_label, y_rect);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Campaign, HoldCount, LifetimeFit, ThresholdPoint};
    use ratatui::backend::TestBackend;

    fn scan(segment: Segment) -> SegmentScan {
        SegmentScan {
            segment,
            points: (5..8)
                .map(|t| ThresholdPoint {
                    threshold: t,
                    counts: vec![HoldCount { hold_time: 20, count: 1.0 }; 4],
                    fit: Some(LifetimeFit {
                        tau: 850.0 + t as f64,
                        dtau: Some(15.0),
                        amplitude: 1.0,
                        chi2: 0.1,
                        n_points: 4,
                    }),
                })
                .collect(),
        }
    }

    fn config() -> LifetimeConfig {
        LifetimeConfig {
            runinfo_path: "runinfo.csv".into(),
            analysis_dir: ".".into(),
            graph_dir: ".".into(),
            good_runs_path: "runlist.txt".into(),
            campaign: Campaign::Y2022,
            method: Campaign::Y2022.method(),
            threshold_min: 5,
            threshold_max: 7,
            segments: vec![Segment::S12, Segment::S34],
            signal_window: 60.0,
            background_window: 60.0,
            tau_start: 800.0,
            tau_min: 1.0,
            tau_max: 1e6,
            tau_grid_steps: 241,
            plot: false,
            export_csv: None,
            export_json: None,
        }
    }

    fn app() -> App {
        App::new(config(), None, vec![scan(Segment::S12), scan(Segment::S34)], String::new())
    }

    #[test]
    fn segment_cycle_wraps_through_all() {
        let mut app = app();
        assert_eq!(app.visible_scans().len(), 2);
        app.handle_key(KeyCode::Right);
        assert_eq!(app.selected_segment(), Some(Segment::S12));
        app.handle_key(KeyCode::Tab);
        assert_eq!(app.selected_segment(), Some(Segment::S34));
        assert_eq!(app.visible_scans().len(), 1);
        app.handle_key(KeyCode::Right);
        assert_eq!(app.selected, None);
        app.handle_key(KeyCode::Left);
        assert_eq!(app.selected_segment(), Some(Segment::S34));
        assert!(app.handle_key(KeyCode::Char('q')));
    }

    #[test]
    fn campaign_is_fixed_without_data() {
        let mut app = app();
        app.handle_key(KeyCode::Char('c'));
        assert_eq!(app.config.campaign, Campaign::Y2022);
        assert!(app.status.contains("fixed"));
    }

    #[test]
    fn campaign_switch_rescans_cached_data() {
        let dir = tempfile::tempdir().unwrap();
        let sim = crate::sim::simulate(&crate::domain::SimConfig {
            output_dir: dir.path().to_path_buf(),
            seed: 3,
            tau: 880.0,
            hold_times: vec![20, 200, 1000],
            runs_per_hold: 2,
            first_run: 1,
            fill_mean: 5000.0,
            efficiency: 0.5,
            background_rate: 0.2,
            window: 60.0,
            hits: false,
        })
        .unwrap();
        let mut config = config();
        config.runinfo_path = sim.runinfo_path;
        config.analysis_dir = sim.analysis_dir;
        config.good_runs_path = sim.runlist_path;

        let mut app = App::from_pipeline(config).unwrap();
        app.handle_key(KeyCode::Char('c'));
        assert_eq!(app.config.campaign, Campaign::Y2023);
        assert_eq!(app.config.method, Campaign::Y2023.method());
        assert_eq!(app.scans.len(), 2);
        assert!(app.scans[0].points[0].fit.is_some());
    }

    #[test]
    fn draws_into_test_backend() {
        let mut app = app();
        let mut terminal = Terminal::new(TestBackend::new(120, 40)).unwrap();
        terminal.draw(|f| app.draw(f)).unwrap();
        let buffer = terminal.backend().buffer();
        let text: String = buffer.content().iter().map(|c| c.symbol()).collect();
        assert!(text.contains("Segment 12"));
        assert!(text.contains("campaign: 2022"));
    }
}
