mod monitor;

use std::f64::consts::PI;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

use cairo::FontSlant;
use cairo::FontWeight;
use cairo::Context;
use cairo::Format;
use cairo::ImageSurface;
use itertools::Itertools;
use itertools_num::linspace;
use noisy_float::prelude::r64;

use crate::experiment::SweepResult;
use crate::util::Engineering;
use crate::Result;

pub use self::monitor::Monitor;

const LEFT: f64 = 80.0;
const RIGHT: f64 = 20.0;
const TOP: f64 = 30.0;
const BOTTOM: f64 = 40.0;
const GRIDLINES: usize = 11;
const POINT_RADIUS: f64 = 2.0;

const COLORS: [(u8, u8, u8); 2] = [(57, 106, 177), (204, 37, 41)];

lazy_static! {
    static ref COLORS_F64: Vec<(f64, f64, f64)> = COLORS
        .iter()
        .cloned()
        .map(|(r, g, b)| (
            f64::from(r) / 255.0,
            f64::from(g) / 255.0,
            f64::from(b) / 255.0
        ))
        .collect_vec();
}

/// Which characteristic of the cell to draw.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlotKind {
    /// Current against voltage.
    UI,
    /// Power against load resistance.
    PR,
}

impl PlotKind {
    pub fn title(self) -> &'static str {
        match self {
            PlotKind::UI => "UI-characteristic",
            PlotKind::PR => "PR-characteristic",
        }
    }

    fn units(self) -> (&'static str, &'static str) {
        match self {
            PlotKind::UI => ("V", "A"),
            PlotKind::PR => ("Ω", "W"),
        }
    }

    /// `(x, y, x error, y error)` for every point of the trace.
    fn series(self, result: &SweepResult) -> Vec<(f64, f64, f64, f64)> {
        result
            .points()
            .iter()
            .map(|p| match self {
                PlotKind::UI => (
                    p.pv_voltage.value,
                    p.current.value,
                    p.pv_voltage.error,
                    p.current.error,
                ),
                PlotKind::PR => (
                    p.resistance.value,
                    p.power.value,
                    p.resistance.error,
                    p.power.error,
                ),
            })
            .filter(|(x, y, _, _)| x.is_finite() && y.is_finite())
            .collect()
    }
}

impl fmt::Display for PlotKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            PlotKind::UI => "ui",
            PlotKind::PR => "pr",
        })
    }
}

impl FromStr for PlotKind {
    type Err = failure::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ui" | "iv" => Ok(PlotKind::UI),
            "pr" => Ok(PlotKind::PR),
            _ => Err(failure::err_msg(format!(
                "Unknown plot \"{}\", expected \"ui\" or \"pr\"",
                s
            ))),
        }
    }
}

/// Axis range: starts at zero unless the data goes negative, never empty.
fn axis_range<I: Iterator<Item = (f64, f64)>>(values: I) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|(v, e)| v.is_finite() && e.is_finite())
        .fold((r64(0.0), r64(0.0)), |(lo, hi), (v, e)| {
            (lo.min(r64(v - e)), hi.max(r64(v + e)))
        });
    let (lo, hi) = (lo.raw(), hi.raw());
    if hi > lo {
        (lo, hi)
    } else {
        (lo, lo + 1.0)
    }
}

fn set_grid_dash(cr: &Context, ix: usize) {
    match ix {
        0 | 10 => cr.set_dash(&[], 0.0),
        5 => cr.set_dash(&[1.0, 2.0], 0.0),
        _ => cr.set_dash(&[1.0, 3.0], 0.0),
    }
}

/// Draws the selected characteristic of `result` on a `width` by `height` canvas.
pub fn draw(cr: &Context, result: &SweepResult, kind: PlotKind, width: f64, height: f64) {
    let series = kind.series(result);
    let (x_min, x_max) = axis_range(series.iter().map(|&(x, _, xe, _)| (x, xe)));
    let (y_min, y_max) = axis_range(series.iter().map(|&(_, y, _, ye)| (y, ye)));
    let (x_unit, y_unit) = kind.units();

    let plot_w = width - LEFT - RIGHT;
    let plot_h = height - TOP - BOTTOM;
    let x_factor = plot_w / (x_max - x_min);
    let y_factor = plot_h / (y_max - y_min);
    let to_x = |x: f64| LEFT + (x - x_min) * x_factor;
    let to_y = |y: f64| TOP + plot_h - (y - y_min) * y_factor;

    cr.identity_matrix();
    cr.translate(0.5, 0.5);

    cr.set_source_rgb(1.0, 1.0, 1.0);
    cr.paint();

    cr.set_source_rgb(0.0, 0.0, 0.0);
    cr.set_line_width(1.0);

    for (ix, y) in linspace(y_min, y_max, GRIDLINES).enumerate() {
        set_grid_dash(cr, ix);
        cr.move_to(LEFT, to_y(y));
        cr.line_to(LEFT + plot_w, to_y(y));
        cr.stroke();
    }

    for (ix, x) in linspace(x_min, x_max, GRIDLINES).enumerate() {
        set_grid_dash(cr, ix);
        cr.move_to(to_x(x), TOP);
        cr.line_to(to_x(x), TOP + plot_h);
        cr.stroke();
    }
    cr.set_dash(&[], 0.0);

    cr.select_font_face("Monospace", FontSlant::Normal, FontWeight::Normal);
    cr.set_font_size(13.0);

    for y in linspace(y_min, y_max, GRIDLINES) {
        let text = format!("{}{}", Engineering(y), y_unit);
        let extents = cr.text_extents(&text);
        cr.move_to(LEFT - extents.width - 4.0, to_y(y) + extents.height / 2.0);
        cr.show_text(&text);
    }

    for (ix, x) in linspace(x_min, x_max, GRIDLINES).enumerate() {
        if ix % 2 == 1 {
            continue;
        }
        let text = format!("{}{}", Engineering(x), x_unit);
        let extents = cr.text_extents(&text);
        cr.move_to(
            to_x(x) - extents.width / 2.0,
            TOP + plot_h + extents.height + 6.0,
        );
        cr.show_text(&text);
    }

    cr.set_font_size(15.0);
    let title = match result.p_max() {
        Some(p_max) => format!("{}, max power {}W", kind.title(), Engineering(p_max)),
        None => kind.title().to_string(),
    };
    let extents = cr.text_extents(&title);
    cr.move_to(LEFT + (plot_w - extents.width) / 2.0, TOP - 8.0);
    cr.show_text(&title);

    let (r, g, b) = COLORS_F64[0];
    cr.set_source_rgba(r, g, b, 1.0);
    for &(x, y, xe, ye) in &series {
        if xe > 0.0 && xe.is_finite() {
            cr.move_to(to_x(x - xe), to_y(y));
            cr.line_to(to_x(x + xe), to_y(y));
        }
        if ye > 0.0 && ye.is_finite() {
            cr.move_to(to_x(x), to_y(y - ye));
            cr.line_to(to_x(x), to_y(y + ye));
        }
        cr.stroke();
        cr.arc(to_x(x), to_y(y), POINT_RADIUS, 0.0, PI * 2.0);
        cr.fill();
    }

    if let Some(point) = result.max_power_point() {
        let (x, y) = match kind {
            PlotKind::UI => (point.pv_voltage.value, point.current.value),
            PlotKind::PR => (point.resistance.value, point.power.value),
        };
        if x.is_finite() && y.is_finite() {
            let (r, g, b) = COLORS_F64[1];
            cr.set_source_rgba(r, g, b, 1.0);
            cr.arc(to_x(x), to_y(y), POINT_RADIUS * 2.5, 0.0, PI * 2.0);
            cr.stroke();
        }
    }
}

/// Renders the selected characteristic of `result` to a PNG file.
pub fn render_png(
    result: &SweepResult,
    kind: PlotKind,
    path: &Path,
    width: i32,
    height: i32,
) -> Result<()> {
    debug_time!("render_png");
    let surface = ImageSurface::create(Format::ARgb32, width, height)
        .map_err(|_| failure::err_msg("Can't create an off-screen surface"))?;
    {
        let cr = Context::new(&surface);
        draw(&cr, result, kind, f64::from(width), f64::from(height));
    }
    let mut file = File::create(path)?;
    surface
        .write_to_png(&mut file)
        .map_err(|e| failure::err_msg(format!("Can't write {}: {:?}", path.display(), e)))?;
    Ok(())
}
