use crate::error::Error;
use crate::series::{EnsembleSeries, PercentileBand, TimeSeries};
use crate::stats::Accumulator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed calendar-year range used as the zero reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineWindow {
    pub first_year: i32,
    pub last_year: i32,
}

/// Reference period of every published anomaly series.
pub const PUBLISHED_WINDOW: BaselineWindow = BaselineWindow {
    first_year: 1998,
    last_year: 2007,
};

impl Default for BaselineWindow {
    fn default() -> Self {
        PUBLISHED_WINDOW
    }
}

impl BaselineWindow {
    pub fn contains(&self, year: i32) -> bool {
        (self.first_year..=self.last_year).contains(&year)
    }

    fn degenerate<S: Into<String>>(&self, reason: S) -> Error {
        Error::DegenerateBaseline {
            first_year: self.first_year,
            last_year: self.last_year,
            reason: reason.into(),
        }
    }
}

/// Mean of the present values of `series` whose year lies inside `window`.
pub fn baseline_mean(series: &TimeSeries, window: &BaselineWindow) -> Result<f64, Error> {
    let mut acc = Accumulator::new();
    let mut n_absent = 0;
    for (year, val) in series.iter().filter(|&(year, _)| window.contains(year)) {
        if val.is_none() {
            log::warn!("absent value in baseline window at {year}");
            n_absent += 1;
        }
        acc.add(val);
    }

    let Some(report) = acc.report() else {
        return Err(window.degenerate(format!(
            "no present values in window ({n_absent} absent)"
        )));
    };
    if !report.mean.is_finite() || report.mean == 0.0 {
        return Err(window.degenerate(format!("mean is {}", report.mean)));
    }

    log::debug!(
        "baseline mean {} from {} values",
        report.mean,
        report.n_vals
    );
    Ok(report.mean)
}

/// Percent anomaly of every value relative to the baseline window mean.
///
/// Absent values stay absent.
pub fn normalize(series: &TimeSeries, window: &BaselineWindow) -> Result<TimeSeries, Error> {
    let mean = baseline_mean(series, window)?;
    Ok(series.map_present(|val| 100.0 * (val - mean) / mean))
}

/// Normalize each member against its own baseline mean.
pub fn normalize_ensemble(
    ensemble: &EnsembleSeries,
    window: &BaselineWindow,
) -> Result<EnsembleSeries, Error> {
    let members = ensemble
        .members()
        .iter()
        .map(|member| normalize(member, window))
        .collect::<Result<Vec<_>, _>>()?;
    EnsembleSeries::new(members)
}

fn to_ratio(series: &TimeSeries) -> TimeSeries {
    series.map_present(|val| 1.0 + val / 100.0)
}

/// Re-express a percent anomaly series against another baseline window.
pub fn rebase(series: &TimeSeries, window: &BaselineWindow) -> Result<TimeSeries, Error> {
    normalize(&to_ratio(series), window)
}

/// Rebase every member against its own mean over `window`.
pub fn rebase_ensemble(
    ensemble: &EnsembleSeries,
    window: &BaselineWindow,
) -> Result<EnsembleSeries, Error> {
    let members = ensemble
        .members()
        .iter()
        .map(|member| rebase(member, window))
        .collect::<Result<Vec<_>, _>>()?;
    EnsembleSeries::new(members)
}

/// Rebase a percentile band, scaling both bounds by the baseline of the central estimate.
pub fn rebase_band(
    band: &PercentileBand,
    window: &BaselineWindow,
) -> Result<PercentileBand, Error> {
    let mean = baseline_mean(&to_ratio(band.central()), window)?;
    let rescale = |series: &TimeSeries| {
        to_ratio(series).map_present(|val| 100.0 * (val - mean) / mean)
    };
    PercentileBand::new(
        rescale(band.central()),
        rescale(band.lower()),
        rescale(band.upper()),
    )
}

/// Mean across independently produced series with ragged year coverage.
///
/// The result spans the union of all years; each input contributes only at its own years,
/// and a year with no present contribution is absent.
pub fn multi_model_mean<'a, I>(series: I) -> Result<TimeSeries, Error>
where
    I: IntoIterator<Item = &'a TimeSeries>,
{
    let mut acc_map: BTreeMap<i32, Accumulator> = BTreeMap::new();
    for ts in series {
        for (year, val) in ts.iter() {
            acc_map.entry(year).or_insert_with(Accumulator::new).add(val);
        }
    }

    let (years, values) = acc_map
        .into_iter()
        .map(|(year, acc)| (year, acc.report().map(|report| report.mean)))
        .unzip();
    TimeSeries::new(years, values)
}
