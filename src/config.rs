use crate::anomaly::BaselineWindow;
use crate::figure::FigureStyle;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Pipeline configuration.
///
/// Every field has a default, so a config file only needs the values it changes.
/// See [`Config::from_file`] for loading.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Reference period of every anomaly.
    pub baseline: BaselineWindow,

    /// Figure layout and styling.
    pub figure: FigureStyle,
}

impl Config {
    /// Load a [`Config`] from a TOML file.
    ///
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let baseline = &self.baseline;
        check_num(baseline.first_year, 1800..=2100).context("invalid baseline first year")?;
        check_num(baseline.last_year, baseline.first_year..=2100)
            .context("invalid baseline last year")?;

        let fig = &self.figure;
        check_num(fig.width_cm, 1.0..=100.0).context("invalid figure width")?;
        check_num(fig.height_cm, 1.0..=100.0).context("invalid figure height")?;
        check_num(fig.dpi, 50..=1200).context("invalid dpi")?;
        check_num(fig.font_size_pt, 1.0..=72.0).context("invalid font size")?;
        check_num(fig.line_width_pt, 0.1..=20.0).context("invalid line width")?;
        check_num(fig.mean_line_width_pt, 0.1..=20.0).context("invalid mean line width")?;
        check_num(fig.model_band_opacity, 0.0..=1.0).context("invalid model band opacity")?;
        check_num(fig.obs_band_opacity, 0.0..=1.0).context("invalid observation band opacity")?;

        check_range(fig.y_range, fig.y_tick_step).context("invalid vertical range")?;
        check_range(fig.full_years, fig.full_tick_step).context("invalid upper panel years")?;
        check_range(fig.zoom_years, fig.zoom_tick_step).context("invalid lower panel years")?;

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_range<T>(range: (T, T), step: T) -> Result<()>
where
    T: PartialOrd + Debug + Default,
{
    let (lo, hi) = range;
    if !(lo < hi) {
        bail!("range start {lo:?} must be below its end {hi:?}");
    }
    if !(step > T::default()) {
        bail!("tick step must be positive, but is {step:?}");
    }
    Ok(())
}
