use crate::anomaly::BaselineWindow;
use crate::error::Error;
use crate::series::TimeSeries;
use anyhow::{Context, Result};
use plotters::coord::Shift;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tempfile::Builder;

const CM_PER_INCH: f64 = 2.54;
const PT_PER_INCH: f64 = 72.0;

/// RGB triple as written in the config file.
pub type Rgb = [u8; 3];

/// Trace colors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub gfdl: Rgb,
    pub waccm: Rgb,
    pub ukesm: Rgb,
    pub multi_model: Rgb,
    pub rigby: Rgb,
    pub montzka: Rgb,
    pub turner: Rgb,
    pub nicely: Rgb,
    pub naus: Rgb,
    pub patra: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            gfdl: [0, 0, 255],
            waccm: [255, 0, 0],
            ukesm: [0, 128, 0],
            multi_model: [0, 0, 0],
            rigby: [255, 165, 0],
            montzka: [191, 0, 191],
            turner: [0, 255, 255],
            nicely: [0, 255, 0],
            naus: [128, 128, 128],
            patra: [0, 191, 255],
        }
    }
}

/// Layout and styling of the figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FigureStyle {
    /// Figure width in centimetres.
    pub width_cm: f64,
    /// Figure height in centimetres.
    pub height_cm: f64,
    /// Raster resolution in dots per inch.
    pub dpi: u32,

    pub font_family: String,
    /// Font size in points.
    pub font_size_pt: f64,

    /// Width of ordinary traces in points.
    pub line_width_pt: f64,
    /// Width of the multi-model mean in points.
    pub mean_line_width_pt: f64,
    /// Fill opacity of model ensemble envelopes.
    pub model_band_opacity: f64,
    /// Fill opacity of observational percentile bands.
    pub obs_band_opacity: f64,

    /// Shared vertical range of both panels (percent).
    pub y_range: (f64, f64),
    pub y_tick_step: f64,

    /// Year range of the upper panel.
    pub full_years: (i32, i32),
    pub full_tick_step: i32,
    /// Year range of the lower panel.
    pub zoom_years: (i32, i32),
    pub zoom_tick_step: i32,

    pub palette: Palette,
}

impl Default for FigureStyle {
    fn default() -> Self {
        Self {
            width_cm: 22.0,
            height_cm: 18.0,
            dpi: 300,
            font_family: "sans-serif".into(),
            font_size_pt: 11.0,
            line_width_pt: 2.0,
            mean_line_width_pt: 4.0,
            model_band_opacity: 0.3,
            obs_band_opacity: 0.4,
            y_range: (-16.0, 16.0),
            y_tick_step: 4.0,
            full_years: (1850, 2014),
            full_tick_step: 10,
            zoom_years: (1980, 2014),
            zoom_tick_step: 5,
            palette: Palette::default(),
        }
    }
}

impl FigureStyle {
    fn size_px(&self) -> (u32, u32) {
        let to_px = |cm: f64| (cm / CM_PER_INCH * self.dpi as f64).round() as u32;
        (to_px(self.width_cm), to_px(self.height_cm))
    }

    fn pt_to_px(&self, pt: f64) -> u32 {
        ((pt * self.dpi as f64 / PT_PER_INCH).round() as u32).max(1)
    }
}

/// Lower and upper bounds sharing one year axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Band {
    lower: TimeSeries,
    upper: TimeSeries,
}

impl Band {
    pub fn new(lower: TimeSeries, upper: TimeSeries) -> Result<Self, Error> {
        if lower.years() != upper.years() {
            return Err(Error::MisalignedSeries(
                "band bounds do not share a year axis".into(),
            ));
        }
        Ok(Self { lower, upper })
    }

    pub fn lower(&self) -> &TimeSeries {
        &self.lower
    }

    pub fn upper(&self) -> &TimeSeries {
        &self.upper
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Weight {
    Regular,
    Heavy,
}

/// One labelled line, optionally with a filled band behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    pub label: String,
    pub color: Rgb,
    pub weight: Weight,
    pub line: TimeSeries,
    pub band: Option<Band>,
}

impl Trace {
    pub fn line<S: Into<String>>(label: S, color: Rgb, line: TimeSeries) -> Self {
        Self {
            label: label.into(),
            color,
            weight: Weight::Regular,
            line,
            band: None,
        }
    }

    pub fn with_band(mut self, band: Band) -> Self {
        self.band = Some(band);
        self
    }

    pub fn heavy(mut self) -> Self {
        self.weight = Weight::Heavy;
        self
    }
}

/// Everything drawn in the figure.
///
/// The renderer only sees already normalized traces: one `(years, values)` line per trace
/// and optionally an aligned `(years, lower, upper)` band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FigureInput {
    /// Reference period shared by every trace.
    pub baseline: BaselineWindow,
    /// Model traces over the full period.
    pub models: Vec<Trace>,
    /// Observation-based traces over the recent period.
    pub observations: Vec<Trace>,
    /// Multi-model mean, drawn in both panels.
    pub multi_model_mean: Trace,
}

/// Split a series into runs of consecutive present values.
fn present_runs(series: &TimeSeries) -> Vec<Vec<(f64, f64)>> {
    let mut runs = Vec::new();
    let mut run = Vec::new();
    for (year, val) in series.iter() {
        match val {
            Some(val) => run.push((year as f64, val)),
            None if !run.is_empty() => runs.push(std::mem::take(&mut run)),
            None => {}
        }
    }
    if !run.is_empty() {
        runs.push(run);
    }
    runs
}

/// Closed polygons covering the runs where both bounds are present.
fn band_polygons(band: &Band) -> Vec<Vec<(f64, f64)>> {
    let mut polygons = Vec::new();
    let mut run: Vec<(f64, f64, f64)> = Vec::new();
    let mut flush = |run: &mut Vec<(f64, f64, f64)>| {
        if run.len() > 1 {
            let upper = run.iter().map(|&(x, _, hi)| (x, hi));
            let lower = run.iter().rev().map(|&(x, lo, _)| (x, lo));
            polygons.push(upper.chain(lower).collect());
        }
        run.clear();
    };
    for ((year, lo), &hi) in band.lower().iter().zip(band.upper().values()) {
        match (lo, hi) {
            (Some(lo), Some(hi)) => run.push((year as f64, lo, hi)),
            _ => flush(&mut run),
        }
    }
    flush(&mut run);
    polygons
}

fn rgb(color: Rgb) -> RGBColor {
    RGBColor(color[0], color[1], color[2])
}

fn tick_count(range: (f64, f64), step: f64) -> usize {
    ((range.1 - range.0) / step).round() as usize + 1
}

struct Panel<'a> {
    caption: &'a str,
    y_desc: &'a str,
    years: (i32, i32),
    tick_step: i32,
    traces: Vec<&'a Trace>,
    band_opacity: f64,
    labels_inside: bool,
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &Panel,
    style: &FigureStyle,
) -> Result<()> {
    let font_px = style.pt_to_px(style.font_size_pt);
    let family = style.font_family.as_str();
    let x_range = (panel.years.0 as f64, panel.years.1 as f64);

    let mut chart = ChartBuilder::on(area)
        .caption(panel.caption, (family, font_px))
        .margin(font_px)
        .x_label_area_size(2 * font_px)
        .y_label_area_size(3 * font_px)
        .build_cartesian_2d(x_range.0..x_range.1, style.y_range.0..style.y_range.1)
        .map_err(|err| anyhow::anyhow!("failed to build chart: {err:?}"))?;

    chart
        .configure_mesh()
        .x_labels(tick_count(x_range, panel.tick_step as f64))
        .y_labels(tick_count(style.y_range, style.y_tick_step))
        .x_label_formatter(&|x| format!("{x:.0}"))
        .y_label_formatter(&|y| format!("{y:.0}"))
        .label_style((family, font_px))
        .y_desc(panel.y_desc)
        .bold_line_style(&BLACK.mix(0.15))
        .light_line_style(&WHITE)
        .draw()
        .map_err(|err| anyhow::anyhow!("failed to draw mesh: {err:?}"))?;

    for trace in &panel.traces {
        let color = rgb(trace.color);
        if let Some(band) = &trace.band {
            for polygon in band_polygons(band) {
                chart
                    .draw_series(std::iter::once(Polygon::new(
                        polygon,
                        color.mix(panel.band_opacity).filled(),
                    )))
                    .map_err(|err| anyhow::anyhow!("failed to draw band: {err:?}"))?;
            }
        }
    }

    for trace in &panel.traces {
        let color = rgb(trace.color);
        let width_pt = match trace.weight {
            Weight::Regular => style.line_width_pt,
            Weight::Heavy => style.mean_line_width_pt,
        };
        let line_style = color.stroke_width(style.pt_to_px(width_pt));
        for (i_run, run) in present_runs(&trace.line).into_iter().enumerate() {
            let series = chart
                .draw_series(LineSeries::new(run, line_style))
                .map_err(|err| anyhow::anyhow!("failed to draw {}: {err:?}", trace.label))?;
            if panel.labels_inside && i_run == 0 {
                series.label(trace.label.as_str()).legend(move |(x, y)| {
                    PathElement::new(vec![(x, y), (x + 2 * font_px as i32, y)], line_style)
                });
            }
        }
    }

    if panel.labels_inside {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .label_font((family, font_px))
            .background_style(&WHITE.mix(0.0))
            .border_style(&WHITE.mix(0.0))
            .draw()
            .map_err(|err| anyhow::anyhow!("failed to draw series labels: {err:?}"))?;
    }

    Ok(())
}

/// Entries of the lower panel, written in the color of their trace.
fn draw_legend_column<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    traces: &[&Trace],
    style: &FigureStyle,
) -> Result<()> {
    let font_px = style.pt_to_px(style.font_size_pt);
    let (_, height) = area.dim_in_pixel();
    let spacing = (height / (traces.len() as u32 + 1)) as i32;
    for (idx, trace) in traces.iter().enumerate() {
        let font = (style.font_family.as_str(), font_px as f64)
            .into_font()
            .color(&rgb(trace.color));
        let pos = (font_px as i32, spacing * (idx as i32 + 1));
        area.draw(&Text::new(trace.label.as_str(), pos, font))
            .map_err(|err| anyhow::anyhow!("failed to draw legend entry: {err:?}"))?;
    }
    Ok(())
}

/// Run `write` on a scratch file next to `file` and move it into place only if it succeeds.
///
/// On any error, or a panic inside `write`, the scratch file is removed and `file` is left
/// untouched.
fn write_atomically<F>(file: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let dir = match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let suffix = file
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let scratch = Builder::new()
        .prefix(".oh-anomaly-")
        .suffix(&suffix)
        .tempfile_in(dir)
        .with_context(|| format!("failed to create scratch file in {dir:?}"))?;

    write(scratch.path())?;

    scratch
        .persist(file)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to move figure to {file:?}"))?;
    Ok(())
}

/// Render `input` into a PNG file.
///
/// `file` only appears once the whole figure has been drawn and encoded.
pub fn render<P: AsRef<Path>>(input: &FigureInput, style: &FigureStyle, file: P) -> Result<()> {
    let file = file.as_ref();
    write_atomically(file, |scratch| draw_figure(input, style, scratch))
}

fn draw_figure(input: &FigureInput, style: &FigureStyle, file: &Path) -> Result<()> {
    let (width, height) = style.size_px();
    log::info!("rendering {width}x{height} px figure to {file:?}");

    let root = BitMapBackend::new(file, (width, height)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|err| anyhow::anyhow!("failed to fill background: {err:?}"))?;
    let font_px = style.pt_to_px(style.font_size_pt);
    let root = root
        .titled(
            "Time evolution of global annual mean tropospheric OH anomaly",
            (style.font_family.as_str(), font_px),
        )
        .map_err(|err| anyhow::anyhow!("failed to draw title: {err:?}"))?;

    let (upper, lower) = root.split_vertically((root.dim_in_pixel().1 / 2) as i32);
    let (legend, lower) = lower.split_horizontally((width / 4) as i32);

    let y_desc = format!(
        "% OH anomaly with respect to mean {}-{}",
        input.baseline.first_year, input.baseline.last_year
    );

    let full_caption = format!("a) {}-{}", style.full_years.0, style.full_years.1);
    let mut models: Vec<&Trace> = input.models.iter().collect();
    models.push(&input.multi_model_mean);
    let full = Panel {
        caption: &full_caption,
        y_desc: &y_desc,
        years: style.full_years,
        tick_step: style.full_tick_step,
        traces: models,
        band_opacity: style.model_band_opacity,
        labels_inside: true,
    };
    draw_panel(&upper, &full, style).context("failed to draw upper panel")?;

    let zoom_caption = format!("b) {}-{}", style.zoom_years.0, style.zoom_years.1);
    let observations: Vec<&Trace> = input.observations.iter().collect();
    let mut zoom_traces = observations.clone();
    zoom_traces.push(&input.multi_model_mean);
    let zoom = Panel {
        caption: &zoom_caption,
        y_desc: &y_desc,
        years: style.zoom_years,
        tick_step: style.zoom_tick_step,
        traces: zoom_traces,
        band_opacity: style.obs_band_opacity,
        labels_inside: false,
    };
    draw_panel(&lower, &zoom, style).context("failed to draw lower panel")?;
    draw_legend_column(&legend, &observations, style).context("failed to draw legend")?;

    root.present()
        .map_err(|err| anyhow::anyhow!("failed to write {file:?}: {err:?}"))?;

    Ok(())
}
