//! Terminal rendering
//!
//! Draws a `PlotFrame`; never modifies session state.

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols::Marker;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph};
use tracing::trace;

use super::{Panel, PlotFrame};
use crate::quantity::Mode;

mod colors {
    use ratatui::style::Color;

    pub const HEADER: Color = Color::Rgb(0, 255, 255); // Cyan
    pub const KEYBIND: Color = Color::Rgb(0, 255, 255); // Cyan
    pub const AXIS: Color = Color::Gray;
    pub const DIM: Color = Color::DarkGray;
}

/// Tick count along the time axis, matching a label every second tick
const TIME_TICKS: u32 = 18;

/// Main render function
pub fn render(plot: &PlotFrame, color: Color, frame: &mut Frame) {
    trace!(mode = %plot.mode, panels = plot.panels.len(), "render: called");
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(frame.area());

    let constraints = vec![Constraint::Ratio(1, plot.panels.len().max(1) as u32); plot.panels.len()];
    let areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(chunks[0]);

    for (panel, area) in plot.panels.iter().zip(areas.iter()) {
        render_panel(panel, plot.horizon, color, frame, *area);
    }

    render_status(plot, frame, chunks[1]);
}

/// Time axis labels, one every 2/18 of the horizon
fn time_labels(horizon: f64) -> Vec<String> {
    (0..=TIME_TICKS)
        .step_by(2)
        .map(|i| format!("{}", (f64::from(i) / f64::from(TIME_TICKS) * horizon).round() as u64))
        .collect()
}

fn render_panel(panel: &Panel, horizon: f64, color: Color, frame: &mut Frame, area: Rect) {
    let points: Vec<(f64, f64)> = panel.values.iter().enumerate().map(|(i, &v)| (i as f64, v)).collect();
    let dataset = Dataset::default()
        .marker(Marker::Dot)
        .graph_type(GraphType::Scatter)
        .style(Style::default().fg(color))
        .data(&points);

    let title = if panel.axis.is_default {
        format!(" {} (no data) ", panel.quantity.label())
    } else {
        format!(" {} ", panel.quantity.label())
    };

    let chart = Chart::new(vec![dataset])
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(colors::DIM))
                .title(Span::styled(
                    title,
                    Style::default().fg(colors::HEADER).add_modifier(Modifier::BOLD),
                )),
        )
        .x_axis(
            Axis::default()
                .title("Time")
                .style(Style::default().fg(colors::AXIS))
                .bounds([0.0, horizon])
                .labels(time_labels(horizon)),
        )
        .y_axis(
            Axis::default()
                .title(panel.quantity.label())
                .style(Style::default().fg(colors::AXIS))
                .bounds([panel.axis.min, panel.axis.max])
                .labels(panel.axis.decade_labels()),
        );

    frame.render_widget(chart, area);
}

fn render_status(plot: &PlotFrame, frame: &mut Frame, area: Rect) {
    let mode = match plot.mode {
        Mode::Count => "Count",
        Mode::FitTest => "Fit test",
    };
    let mut spans = vec![
        Span::styled(format!(" {mode} "), Style::default().fg(colors::HEADER).add_modifier(Modifier::BOLD)),
        Span::styled(format!("│ instance {} │ ", plot.instance), Style::default().fg(colors::DIM)),
    ];
    for (key, action) in [("c", "count"), ("f", "fit test"), ("x", "reset"), ("q", "quit")] {
        spans.push(Span::styled(key, Style::default().fg(colors::KEYBIND)));
        spans.push(Span::raw(format!(" {action}  ")));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::AxisBounds;
    use crate::instance::Instance;
    use crate::quantity::Quantity;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn draw(plot: &PlotFrame) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| render(plot, Color::Red, f)).unwrap();
        terminal.backend().buffer().content().iter().map(|cell| cell.symbol()).collect()
    }

    fn panel(quantity: Quantity, min: f64, max: f64) -> Panel {
        Panel {
            quantity,
            axis: AxisBounds {
                min,
                max,
                is_default: false,
            },
            values: vec![min + 0.5],
        }
    }

    #[test]
    fn test_time_labels_follow_horizon() {
        let labels = time_labels(18.0);
        assert_eq!(labels.first().map(String::as_str), Some("0"));
        assert_eq!(labels.last().map(String::as_str), Some("18"));
        assert_eq!(labels.len(), 10);
        assert_eq!(time_labels(36.0)[1], "4");
    }

    #[test]
    fn test_fit_test_draws_three_charts() {
        let plot = PlotFrame {
            mode: Mode::FitTest,
            horizon: 18.0,
            instance: Instance::new(0, 2).unwrap(),
            panels: vec![
                panel(Quantity::FitFactor, 0.0, 3.0),
                panel(Quantity::Sample, -1.0, 3.0),
                panel(Quantity::Ambient, 3.0, 6.0),
            ],
        };
        let screen = draw(&plot);
        assert!(screen.contains("Fit factor"));
        assert!(screen.contains("Mask"));
        assert!(screen.contains("Ambient"));
        assert!(screen.contains("Fit test"));
    }

    #[test]
    fn test_count_chart_has_decade_labels() {
        let plot = PlotFrame {
            mode: Mode::Count,
            horizon: 18.0,
            instance: Instance::new(1, 2).unwrap(),
            panels: vec![panel(Quantity::Count, -3.0, 5.0)],
        };
        let screen = draw(&plot);
        assert!(screen.contains("1e-3"));
        assert!(screen.contains("1e+5"));
        assert!(screen.contains("instance 1/2"));
    }
}
