use crate::error::Error;
use crate::stats::{Accumulator, AccumulatorReport};
use serde::Serialize;

/// Round a fractional year to the nearest whole year, ties to even.
///
/// Returns `None` for non-finite input or years outside the `i32` range.
pub fn round_year(val: f64) -> Option<i32> {
    let year = val.round_ties_even();
    if !year.is_finite() || year < i32::MIN as f64 || year > i32::MAX as f64 {
        return None;
    }
    Some(year as i32)
}

/// Sentinel rule of one dataset.
///
/// Raw values below the threshold, and non-finite values, are absent observations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissingMarker {
    below: f64,
}

impl MissingMarker {
    /// Only non-finite values are treated as absent.
    pub const NON_FINITE: Self = Self {
        below: f64::NEG_INFINITY,
    };

    pub const fn below(threshold: f64) -> Self {
        Self { below: threshold }
    }

    pub fn apply(&self, val: f64) -> Option<f64> {
        (val.is_finite() && val >= self.below).then_some(val)
    }
}

/// Annual series: strictly increasing years, index-aligned with possibly absent values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    years: Vec<i32>,
    values: Vec<Option<f64>>,
}

impl TimeSeries {
    pub fn new(years: Vec<i32>, values: Vec<Option<f64>>) -> Result<Self, Error> {
        if years.len() != values.len() {
            return Err(Error::MisalignedSeries(format!(
                "{} years but {} values",
                years.len(),
                values.len()
            )));
        }
        if let Some(pair) = years.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(Error::MisalignedSeries(format!(
                "years must be strictly increasing, but {} is followed by {}",
                pair[0], pair[1]
            )));
        }
        Ok(Self { years, values })
    }

    /// Contiguous series whose first value belongs to `start_year`.
    pub fn from_start(start_year: i32, values: Vec<Option<f64>>) -> Self {
        let years = (start_year..).take(values.len()).collect();
        Self { years, values }
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.years.len()
    }

    /// Value at `year`; `None` if the year is not covered or the value is absent.
    pub fn get(&self, year: i32) -> Option<f64> {
        let idx = self.years.binary_search(&year).ok()?;
        self.values[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, Option<f64>)> + '_ {
        self.years.iter().copied().zip(self.values.iter().copied())
    }

    pub fn first_year(&self) -> Option<i32> {
        self.years.first().copied()
    }

    pub fn last_year(&self) -> Option<i32> {
        self.years.last().copied()
    }

    pub fn n_absent(&self) -> usize {
        self.values.iter().filter(|val| val.is_none()).count()
    }

    /// New series over the same years with `f` applied to every present value.
    pub fn map_present<F: FnMut(f64) -> f64>(&self, mut f: F) -> Self {
        Self {
            years: self.years.clone(),
            values: self.values.iter().map(|val| val.map(&mut f)).collect(),
        }
    }
}

/// Members of one model ensemble sharing a single year axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleSeries {
    members: Vec<TimeSeries>,
}

impl EnsembleSeries {
    pub fn new(members: Vec<TimeSeries>) -> Result<Self, Error> {
        let Some(first) = members.first() else {
            return Err(Error::MisalignedSeries(
                "ensemble must have at least one member".into(),
            ));
        };
        for (i_mem, member) in members.iter().enumerate() {
            if member.years() != first.years() {
                return Err(Error::MisalignedSeries(format!(
                    "member {i_mem} does not share the year axis of member 0"
                )));
            }
        }
        Ok(Self { members })
    }

    pub fn years(&self) -> &[i32] {
        self.members[0].years()
    }

    pub fn members(&self) -> &[TimeSeries] {
        &self.members
    }

    pub fn n_members(&self) -> usize {
        self.members.len()
    }

    /// Elementwise mean across members, ignoring absent entries.
    pub fn mean(&self) -> TimeSeries {
        self.aggregate(|report| report.mean)
    }

    /// Elementwise minimum across members, ignoring absent entries.
    pub fn min(&self) -> TimeSeries {
        self.aggregate(|report| report.min)
    }

    /// Elementwise maximum across members, ignoring absent entries.
    pub fn max(&self) -> TimeSeries {
        self.aggregate(|report| report.max)
    }

    fn aggregate<F: Fn(&AccumulatorReport) -> f64>(&self, pick: F) -> TimeSeries {
        let values = (0..self.years().len())
            .map(|idx| {
                let mut acc = Accumulator::new();
                for member in &self.members {
                    acc.add(member.values()[idx]);
                }
                acc.report().map(|report| pick(&report))
            })
            .collect();
        TimeSeries {
            years: self.years().to_vec(),
            values,
        }
    }
}

/// Central estimate with lower and upper bounds on one year axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileBand {
    central: TimeSeries,
    lower: TimeSeries,
    upper: TimeSeries,
}

impl PercentileBand {
    pub fn new(central: TimeSeries, lower: TimeSeries, upper: TimeSeries) -> Result<Self, Error> {
        if lower.years() != central.years() || upper.years() != central.years() {
            return Err(Error::MisalignedSeries(
                "band bounds do not share the year axis of the central estimate".into(),
            ));
        }
        Ok(Self {
            central,
            lower,
            upper,
        })
    }

    /// Blend two networks into one band.
    ///
    /// The first `gap_len` entries of `primary` are replaced by those of `fallback`, then
    /// every entry is the average of both. A year absent in either network after the gap
    /// stays absent.
    pub fn reconcile(
        primary: &PercentileBand,
        fallback: &PercentileBand,
        gap_len: usize,
    ) -> Result<Self, Error> {
        if primary.years() != fallback.years() {
            return Err(Error::MisalignedSeries(
                "networks do not share a year axis".into(),
            ));
        }
        if gap_len > primary.years().len() {
            return Err(Error::MisalignedSeries(format!(
                "gap of {gap_len} years exceeds the {} years of the band",
                primary.years().len()
            )));
        }

        let blend = |a: &TimeSeries, b: &TimeSeries| {
            let values = a
                .values()
                .iter()
                .zip(b.values())
                .enumerate()
                .map(|(idx, (&a_val, &b_val))| {
                    let a_val = if idx < gap_len { b_val } else { a_val };
                    match (a_val, b_val) {
                        (Some(a_val), Some(b_val)) => Some((a_val + b_val) / 2.0),
                        _ => None,
                    }
                })
                .collect();
            TimeSeries {
                years: a.years().to_vec(),
                values,
            }
        };

        Ok(Self {
            central: blend(&primary.central, &fallback.central),
            lower: blend(&primary.lower, &fallback.lower),
            upper: blend(&primary.upper, &fallback.upper),
        })
    }

    pub fn years(&self) -> &[i32] {
        self.central.years()
    }

    pub fn central(&self) -> &TimeSeries {
        &self.central
    }

    pub fn lower(&self) -> &TimeSeries {
        &self.lower
    }

    pub fn upper(&self) -> &TimeSeries {
        &self.upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn series(start: i32, vals: &[Option<f64>]) -> TimeSeries {
        TimeSeries::from_start(start, vals.to_vec())
    }

    #[test]
    fn rounds_scaled_year_to_even() {
        assert_eq!(round_year(199803.0 / 100.0), Some(1998));
        assert_eq!(round_year(1998.5), Some(1998));
        assert_eq!(round_year(1999.5), Some(2000));
        assert_eq!(round_year(2014.0), Some(2014));
        assert_eq!(round_year(f64::NAN), None);
    }

    #[test]
    fn marker_rejects_sentinels() {
        let marker = MissingMarker::below(-1000.0);
        assert_eq!(marker.apply(-999.0), Some(-999.0));
        assert_eq!(marker.apply(-9999.0), None);
        assert_eq!(marker.apply(f64::NAN), None);
        assert_eq!(MissingMarker::NON_FINITE.apply(-1.0e30), Some(-1.0e30));
    }

    #[test]
    fn rejects_length_mismatch() {
        let result = TimeSeries::new(vec![2000, 2001], vec![Some(1.0)]);
        assert!(matches!(result, Err(Error::MisalignedSeries(_))));
    }

    #[test]
    fn rejects_unordered_years() {
        let result = TimeSeries::new(vec![2001, 2001], vec![Some(1.0), Some(2.0)]);
        assert!(matches!(result, Err(Error::MisalignedSeries(_))));
    }

    #[test]
    fn lookup_by_year() {
        let ts = series(2000, &[Some(1.0), None, Some(3.0)]);
        assert_eq!(ts.get(2000), Some(1.0));
        assert_eq!(ts.get(2001), None);
        assert_eq!(ts.get(2002), Some(3.0));
        assert_eq!(ts.get(1999), None);
        assert_eq!(ts.n_absent(), 1);
    }

    #[test]
    fn ensemble_views_ignore_absent_members() {
        let ens = EnsembleSeries::new(vec![
            series(2000, &[Some(1.0), None, None]),
            series(2000, &[Some(3.0), Some(5.0), None]),
            series(2000, &[Some(8.0), Some(7.0), None]),
        ])
        .expect("members are aligned");
        assert_eq!(ens.mean().values(), &[Some(4.0), Some(6.0), None]);
        assert_eq!(ens.min().values(), &[Some(1.0), Some(5.0), None]);
        assert_eq!(ens.max().values(), &[Some(8.0), Some(7.0), None]);
    }

    #[test]
    fn ensemble_rejects_misaligned_members() {
        let result = EnsembleSeries::new(vec![
            series(2000, &[Some(1.0), Some(2.0)]),
            series(2001, &[Some(1.0), Some(2.0)]),
        ]);
        assert!(matches!(result, Err(Error::MisalignedSeries(_))));
        assert!(EnsembleSeries::new(Vec::new()).is_err());
    }

    #[test]
    fn reconcile_substitutes_gap_then_averages() {
        let gap_len = 2;
        let a_lower = series(1980, &[None, None, Some(2.0), Some(4.0)]);
        let b_lower = series(1980, &[Some(1.5), Some(-0.7), Some(6.0), Some(0.0)]);
        let a_upper = series(1980, &[None, Some(9.0), Some(10.0), Some(12.0)]);
        let b_upper = series(1980, &[Some(3.3), Some(4.1), Some(8.0), Some(8.0)]);
        let a = PercentileBand::new(a_lower.clone(), a_lower, a_upper).expect("aligned");
        let b = PercentileBand::new(b_lower.clone(), b_lower.clone(), b_upper.clone())
            .expect("aligned");

        let merged = PercentileBand::reconcile(&a, &b, gap_len).expect("aligned networks");

        assert_eq!(merged.lower().values()[..gap_len], b_lower.values()[..gap_len]);
        assert_eq!(merged.upper().values()[..gap_len], b_upper.values()[..gap_len]);
        assert_eq!(merged.lower().values()[gap_len..], [Some(4.0), Some(2.0)]);
        assert_eq!(merged.upper().values()[gap_len..], [Some(9.0), Some(10.0)]);
        assert_eq!(merged.central(), merged.lower());
    }

    #[test]
    fn reconcile_keeps_absent_after_gap() {
        let a = series(1980, &[None, Some(1.0), None]);
        let b = series(1980, &[Some(2.0), Some(3.0), Some(4.0)]);
        let a = PercentileBand::new(a.clone(), a.clone(), a).expect("aligned");
        let b = PercentileBand::new(b.clone(), b.clone(), b).expect("aligned");
        let merged = PercentileBand::reconcile(&a, &b, 1).expect("aligned networks");
        assert_eq!(merged.central().values(), &[Some(2.0), Some(2.0), None]);
    }

    #[test]
    fn reconcile_rejects_oversized_gap() {
        let a = series(1980, &[Some(1.0)]);
        let band = PercentileBand::new(a.clone(), a.clone(), a).expect("aligned");
        assert!(PercentileBand::reconcile(&band, &band, 2).is_err());
    }

    proptest! {
        #[test]
        fn years_and_values_stay_aligned(
            start in 1800i32..2100,
            vals in prop::collection::vec(prop::option::of(-1.0e6f64..1.0e6), 0..64),
        ) {
            let ts = TimeSeries::from_start(start, vals.clone());
            prop_assert_eq!(ts.years().len(), ts.values().len());
            prop_assert_eq!(ts.len(), vals.len());

            let doubled = ts.map_present(|val| 2.0 * val);
            prop_assert_eq!(doubled.years(), ts.years());
            for (orig, new) in ts.values().iter().zip(doubled.values()) {
                prop_assert_eq!(orig.is_none(), new.is_none());
            }
        }
    }
}
