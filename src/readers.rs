use crate::error::Error;
use crate::series::{EnsembleSeries, MissingMarker, PercentileBand, TimeSeries, round_year};
use crate::stats::Accumulator;
use serde::Deserialize;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    ops::Range,
    path::Path,
};

/// First and last year of the Montzka et al. (2011) monthly record.
pub const MONTZKA_YEARS: (i32, i32) = (1997, 2007);
const MONTHS_PER_YEAR: usize = 12;

/// NOAA percentiles below this value mark years without a NOAA estimate.
pub const RIGBY_NOAA_MISSING: MissingMarker = MissingMarker::below(-1000.0);
/// Leading years without NOAA data, filled from AGAGE before blending.
pub const RIGBY_NOAA_GAP_YEARS: usize = 16;

pub const TURNER_COMMENT_LINES: usize = 2;
/// Turner et al. (2017) encode the date as `YYYYMM`.
const TURNER_DATE_SCALE: f64 = 100.0;
const TURNER_VALUE_FIELD: usize = 4;

pub const NICELY_COMMENT_LINES: usize = 5;
const NICELY_YEAR_COLS: Range<usize> = 0..4;
const NICELY_VALUE_WIDTH: usize = 6;

pub const UKESM_COMMENT_LINES: usize = 2;
pub const UKESM_N_MEMBERS: usize = 3;

pub const WACCM_FIRST_YEAR: i32 = 1850;

pub const GFDL_COMMENT_LINES: usize = 2;

/// Annual mean OH anomaly (percent) from the monthly fractional anomalies of
/// Montzka et al. (2011).
///
/// Months are grouped positionally, twelve per year starting in January 1997.
pub fn read_montzka_2011<P: AsRef<Path>>(file: P) -> Result<TimeSeries, Error> {
    let path = file.as_ref();
    let columns = read_csv_columns(path, &["Time", "OH"])?;
    let monthly = &columns[1];

    let (first_year, last_year) = MONTZKA_YEARS;
    let n_years = (last_year - first_year + 1) as usize;
    let n_months = n_years * MONTHS_PER_YEAR;
    if monthly.len() < n_months {
        return Err(Error::malformed(
            path,
            None,
            format!("expected {n_months} monthly records, but found {}", monthly.len()),
        ));
    }
    if monthly.len() > n_months {
        log::warn!(
            "ignoring {} monthly records after {last_year} in {path:?}",
            monthly.len() - n_months
        );
    }

    let annual = monthly[..n_months]
        .chunks_exact(MONTHS_PER_YEAR)
        .map(|months| {
            let mut acc = Accumulator::new();
            for &val in months {
                acc.add(MissingMarker::NON_FINITE.apply(val));
            }
            acc.report().map(|report| 100.0 * report.mean)
        })
        .collect();

    Ok(TimeSeries::from_start(first_year, annual))
}

/// Rigby et al. (2017) 16th/50th/84th percentiles, NOAA and AGAGE networks blended.
pub fn read_rigby_2017<P: AsRef<Path>>(file: P) -> Result<PercentileBand, Error> {
    let path = file.as_ref();
    let columns = read_csv_columns(
        path,
        &[
            "years",
            "NOAA_50_percentile",
            "NOAA_16_percentile",
            "NOAA_84_percentile",
            "AGAGE_50_percentile",
            "AGAGE_16_percentile",
            "AGAGE_84_percentile",
        ],
    )?;
    let years = columns[0]
        .iter()
        .map(|&raw| year_from(path, None, raw))
        .collect::<Result<Vec<_>, _>>()?;

    let band = |cols: &[Vec<f64>], marker: MissingMarker| -> Result<PercentileBand, Error> {
        let series = cols
            .iter()
            .map(|col| {
                let values = col.iter().map(|&val| marker.apply(val)).collect();
                series_from(path, years.clone(), values)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let [central, lower, upper]: [TimeSeries; 3] = series
            .try_into()
            .map_err(|_| Error::malformed(path, None, "expected three percentiles"))?;
        PercentileBand::new(central, lower, upper)
    };
    let noaa = band(&columns[1..4], RIGBY_NOAA_MISSING)?;
    let agage = band(&columns[4..7], MissingMarker::NON_FINITE)?;

    PercentileBand::reconcile(&noaa, &agage, RIGBY_NOAA_GAP_YEARS)
}

/// Turner et al. (2017): comma separated, date in `YYYYMM` form in the first field.
pub fn read_turner_2017<P: AsRef<Path>>(file: P) -> Result<TimeSeries, Error> {
    let path = file.as_ref();
    let mut years = Vec::new();
    let mut values = Vec::new();
    for (line_no, line) in data_lines(path, TURNER_COMMENT_LINES)? {
        let fields: Vec<&str> = line.split(',').collect();
        let date = parse_field(path, line_no, fields.first().copied(), "date")?;
        years.push(year_from(path, Some(line_no), date / TURNER_DATE_SCALE)?);
        let val = parse_field(
            path,
            line_no,
            fields.get(TURNER_VALUE_FIELD).copied(),
            "OH",
        )?;
        values.push(MissingMarker::NON_FINITE.apply(val));
    }
    series_from(path, years, values)
}

/// Nicely et al. (2018): fixed-width columns, the value right-aligned at the end of the line.
pub fn read_nicely_2018<P: AsRef<Path>>(file: P) -> Result<TimeSeries, Error> {
    let path = file.as_ref();
    let mut years = Vec::new();
    let mut values = Vec::new();
    for (line_no, line) in data_lines(path, NICELY_COMMENT_LINES)? {
        if line.len() < NICELY_YEAR_COLS.end + NICELY_VALUE_WIDTH {
            return Err(Error::malformed(
                path,
                Some(line_no),
                format!("line is too short for the fixed-width layout: {line:?}"),
            ));
        }
        let year = parse_field(path, line_no, line.get(NICELY_YEAR_COLS), "year")?;
        years.push(year_from(path, Some(line_no), year)?);
        let val_cols = line.len() - NICELY_VALUE_WIDTH..line.len();
        let val = parse_field(path, line_no, line.get(val_cols), "OH")?;
        values.push(MissingMarker::NON_FINITE.apply(val));
    }
    series_from(path, years, values)
}

/// UKESM1-0-LL: whitespace separated year and one raw OH column (molec/cm3) per member.
pub fn read_ukesm<P: AsRef<Path>>(file: P) -> Result<EnsembleSeries, Error> {
    let path = file.as_ref();
    let mut years = Vec::new();
    let mut members = vec![Vec::new(); UKESM_N_MEMBERS];
    for (line_no, line) in data_lines(path, UKESM_COMMENT_LINES)? {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let year = parse_field(path, line_no, fields.first().copied(), "year")?;
        years.push(year_from(path, Some(line_no), year)?);
        for (i_mem, member) in members.iter_mut().enumerate() {
            let name = format!("member {}", i_mem + 1);
            let val = parse_field(path, line_no, fields.get(i_mem + 1).copied(), &name)?;
            member.push(MissingMarker::NON_FINITE.apply(val));
        }
    }
    let members = members
        .into_iter()
        .map(|values| series_from(path, years.clone(), values))
        .collect::<Result<Vec<_>, _>>()?;
    EnsembleSeries::new(members)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnnualDoc {
    Members(Vec<Vec<Option<f64>>>),
    Single(Vec<Option<f64>>),
}

/// CESM2-WACCM: JSON array of annual values starting in 1850, or an array of such arrays
/// with one entry per member.
pub fn read_waccm<P: AsRef<Path>>(file: P) -> Result<EnsembleSeries, Error> {
    let path = file.as_ref();
    let file = File::open(path).map_err(|err| Error::from_io(path, err))?;
    let doc: AnnualDoc = serde_json::from_reader(BufReader::new(file))
        .map_err(|err| Error::malformed(path, Some(err.line()), err.to_string()))?;

    let members = match doc {
        AnnualDoc::Members(members) => members,
        AnnualDoc::Single(values) => vec![values],
    };
    let members = members
        .into_iter()
        .map(|values| {
            let values = values
                .into_iter()
                .map(|val| val.and_then(|val| MissingMarker::NON_FINITE.apply(val)))
                .collect();
            TimeSeries::from_start(WACCM_FIRST_YEAR, values)
        })
        .collect();
    EnsembleSeries::new(members)
        .map_err(|err| Error::malformed(path, None, err.to_string()))
}

/// GFDL-ESM4: comma separated year and raw OH (molec/cm3).
pub fn read_gfdl<P: AsRef<Path>>(file: P) -> Result<TimeSeries, Error> {
    let path = file.as_ref();
    let mut years = Vec::new();
    let mut values = Vec::new();
    for (line_no, line) in data_lines(path, GFDL_COMMENT_LINES)? {
        let fields: Vec<&str> = line.split(',').collect();
        let year = parse_field(path, line_no, fields.first().copied(), "year")?;
        years.push(year_from(path, Some(line_no), year)?);
        let val = parse_field(path, line_no, fields.get(1).copied(), "OH")?;
        values.push(MissingMarker::NON_FINITE.apply(val));
    }
    series_from(path, years, values)
}

/// Skip exactly `n_comment` leading lines and return the remaining non-blank lines with
/// their 1-based line numbers.
fn data_lines(path: &Path, n_comment: usize) -> Result<Vec<(usize, String)>, Error> {
    let file = File::open(path).map_err(|err| Error::from_io(path, err))?;
    let mut lines = BufReader::new(file).lines();

    for i_line in 0..n_comment {
        match lines.next() {
            Some(line) => {
                line.map_err(|err| Error::from_io(path, err))?;
            }
            None => {
                return Err(Error::malformed(
                    path,
                    Some(i_line + 1),
                    format!("expected {n_comment} comment lines"),
                ));
            }
        }
    }

    let mut records = Vec::new();
    for (idx, line) in lines.enumerate() {
        let line = line.map_err(|err| Error::from_io(path, err))?;
        if line.trim().is_empty() {
            continue;
        }
        records.push((n_comment + idx + 1, line));
    }
    if records.is_empty() {
        return Err(Error::malformed(path, None, "no data records"));
    }

    Ok(records)
}

/// Numeric columns of a CSV file with a header row, addressed by column name.
fn read_csv_columns(path: &Path, names: &[&str]) -> Result<Vec<Vec<f64>>, Error> {
    let file = File::open(path).map_err(|err| Error::from_io(path, err))?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|err| csv_error(path, err))?
        .clone();
    let idxs = names
        .iter()
        .map(|&name| {
            headers
                .iter()
                .position(|header| header == name)
                .ok_or_else(|| Error::malformed(path, Some(1), format!("missing column {name:?}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut columns = vec![Vec::new(); names.len()];
    for record in reader.records() {
        let record = record.map_err(|err| csv_error(path, err))?;
        let line_no = record.position().map_or(0, |pos| pos.line() as usize);
        for ((column, &idx), &name) in columns.iter_mut().zip(&idxs).zip(names) {
            column.push(parse_field(path, line_no, record.get(idx), name)?);
        }
    }
    if columns[0].is_empty() {
        return Err(Error::malformed(path, None, "no data records"));
    }

    Ok(columns)
}

fn csv_error(path: &Path, err: csv::Error) -> Error {
    let line_no = err.position().map(|pos| pos.line() as usize);
    Error::malformed(path, line_no, err.to_string())
}

fn parse_field(path: &Path, line_no: usize, field: Option<&str>, name: &str) -> Result<f64, Error> {
    let field = field
        .ok_or_else(|| Error::malformed(path, Some(line_no), format!("missing {name} field")))?;
    field.trim().parse::<f64>().map_err(|err| {
        Error::malformed(path, Some(line_no), format!("invalid {name} {field:?}: {err}"))
    })
}

fn year_from(path: &Path, line_no: Option<usize>, raw: f64) -> Result<i32, Error> {
    round_year(raw).ok_or_else(|| Error::malformed(path, line_no, format!("invalid year {raw}")))
}

fn series_from(
    path: &Path,
    years: Vec<i32>,
    values: Vec<Option<f64>>,
) -> Result<TimeSeries, Error> {
    TimeSeries::new(years, values).map_err(|err| Error::malformed(path, None, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).expect("failed to write fixture");
        path
    }

    fn assert_malformed<T: std::fmt::Debug>(result: Result<T, Error>) {
        assert!(
            matches!(result, Err(Error::MalformedRecord { .. })),
            "expected a malformed record, got {result:?}"
        );
    }

    #[test]
    fn missing_file_is_resource_not_found() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("absent.txt");
        assert!(matches!(
            read_gfdl(&path),
            Err(Error::ResourceNotFound { .. })
        ));
        assert!(matches!(
            read_montzka_2011(&path),
            Err(Error::ResourceNotFound { .. })
        ));
        assert!(matches!(
            read_waccm(&path),
            Err(Error::ResourceNotFound { .. })
        ));
    }

    #[test]
    fn montzka_averages_months_into_percent() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let mut contents = String::from("Time,OH\n");
        for i_month in 0..132 {
            let year = 1997 + i_month / 12;
            let val = if year == 1999 && i_month % 12 == 0 {
                "NaN".to_string()
            } else {
                format!("{}", 0.01 * (year - 1997) as f64)
            };
            writeln!(contents, "{:.3},{val}", 1997.0 + i_month as f64 / 12.0)
                .expect("writing to a string");
        }
        let path = write_file(&dir, "montzka.csv", &contents);

        let ts = read_montzka_2011(&path).expect("valid fixture");

        assert_eq!(ts.years(), (1997..=2007).collect::<Vec<_>>().as_slice());
        assert_eq!(ts.get(1997), Some(0.0));
        assert!((ts.get(1999).expect("eleven months present") - 2.0).abs() < 1e-12);
        assert!((ts.get(2007).expect("present") - 10.0).abs() < 1e-12);
    }

    #[test]
    fn montzka_needs_eleven_full_years() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let mut contents = String::from("Time,OH\n");
        for i_month in 0..100 {
            writeln!(contents, "{i_month},0.0").expect("writing to a string");
        }
        let path = write_file(&dir, "montzka.csv", &contents);
        assert_malformed(read_montzka_2011(&path));
    }

    fn rigby_fixture(n_years: usize) -> String {
        let mut contents = String::from(
            "years,NOAA_50_percentile,NOAA_16_percentile,NOAA_84_percentile,\
             AGAGE_50_percentile,AGAGE_16_percentile,AGAGE_84_percentile\n",
        );
        for idx in 0..n_years {
            let year = 1980.0 + idx as f64;
            let noaa = if idx < RIGBY_NOAA_GAP_YEARS {
                "-9999,-9999,-9999".to_string()
            } else {
                "2.0,1.0,3.0".to_string()
            };
            writeln!(contents, "{year},{noaa},{},-1.0,5.0", idx as f64)
                .expect("writing to a string");
        }
        contents
    }

    #[test]
    fn rigby_fills_noaa_gap_from_agage() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = write_file(&dir, "rigby.csv", &rigby_fixture(20));

        let band = read_rigby_2017(&path).expect("valid fixture");

        assert_eq!(band.years().len(), 20);
        assert_eq!(band.years()[0], 1980);
        for idx in 0..RIGBY_NOAA_GAP_YEARS {
            assert_eq!(band.central().values()[idx], Some(idx as f64));
            assert_eq!(band.lower().values()[idx], Some(-1.0));
            assert_eq!(band.upper().values()[idx], Some(5.0));
        }
        assert_eq!(band.central().get(1996), Some((2.0 + 16.0) / 2.0));
        assert_eq!(band.lower().get(1996), Some(0.0));
        assert_eq!(band.upper().get(1999), Some(4.0));
    }

    #[test]
    fn rigby_requires_named_columns() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = write_file(&dir, "rigby.csv", "years,NOAA_50_percentile\n1980,1.0\n");
        assert_malformed(read_rigby_2017(&path));
    }

    #[test]
    fn rigby_rejects_wrong_field_count() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let mut contents = rigby_fixture(18);
        contents.push_str("1998,1.0\n");
        let path = write_file(&dir, "rigby.csv", &contents);
        assert_malformed(read_rigby_2017(&path));
    }

    #[test]
    fn turner_rounds_scaled_dates() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let contents = "# Turner et al. 2017\n\
                        date,a,b,c,oh\n\
                        199803,0,0,0,-1.5\n\
                        199903,0,0,0,0.25\n\
                        \n";
        let path = write_file(&dir, "turner.txt", contents);

        let ts = read_turner_2017(&path).expect("valid fixture");

        assert_eq!(ts.years(), &[1998, 1999]);
        assert_eq!(ts.values(), &[Some(-1.5), Some(0.25)]);
    }

    #[test]
    fn turner_rejects_non_numeric_field() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let contents = "c1\nc2\n199803,0,0,0,abc\n";
        let path = write_file(&dir, "turner.txt", contents);
        let result = read_turner_2017(&path);
        assert!(matches!(
            result,
            Err(Error::MalformedRecord { line: Some(3), .. })
        ));
    }

    #[test]
    fn turner_needs_comment_lines() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = write_file(&dir, "turner.txt", "only one line\n");
        assert_malformed(read_turner_2017(&path));
    }

    #[test]
    fn nicely_reads_fixed_width_columns() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let contents = "h1\nh2\nh3\nh4\nh5\n\
                        1980   0.123 -1.234\n\
                        1981   0.456  2.500\n";
        let path = write_file(&dir, "nicely.dat", contents);

        let ts = read_nicely_2018(&path).expect("valid fixture");

        assert_eq!(ts.years(), &[1980, 1981]);
        assert_eq!(ts.values(), &[Some(-1.234), Some(2.5)]);
    }

    #[test]
    fn nicely_rejects_short_lines() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let contents = "h1\nh2\nh3\nh4\nh5\n1980 1\n";
        let path = write_file(&dir, "nicely.dat", contents);
        assert_malformed(read_nicely_2018(&path));
    }

    #[test]
    fn ukesm_keeps_members_separate() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let contents = "UKESM1-0-LL\nyear m1 m2 m3\n\
                        1850.0 1.0e6 2.0e6 3.0e6\n\
                        1851.0 1.1e6 nan 3.3e6\n";
        let path = write_file(&dir, "ukesm.asc", contents);

        let ens = read_ukesm(&path).expect("valid fixture");

        assert_eq!(ens.n_members(), 3);
        assert_eq!(ens.years(), &[1850, 1851]);
        assert_eq!(ens.members()[1].values(), &[Some(2.0e6), None]);
        assert_eq!(ens.members()[2].get(1851), Some(3.3e6));
    }

    #[test]
    fn ukesm_rejects_missing_member_column() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let contents = "c1\nc2\n1850 1.0 2.0\n";
        let path = write_file(&dir, "ukesm.asc", contents);
        assert_malformed(read_ukesm(&path));
    }

    #[test]
    fn waccm_reads_members_or_single_array() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = write_file(&dir, "members.json", "[[1.0, 2.0], [3.0, null]]");
        let ens = read_waccm(&path).expect("valid fixture");
        assert_eq!(ens.n_members(), 2);
        assert_eq!(ens.years(), &[1850, 1851]);
        assert_eq!(ens.members()[1].values(), &[Some(3.0), None]);

        let path = write_file(&dir, "single.json", "[0.5, -0.5, 1.5]");
        let ens = read_waccm(&path).expect("valid fixture");
        assert_eq!(ens.n_members(), 1);
        assert_eq!(ens.years(), &[1850, 1851, 1852]);
    }

    #[test]
    fn waccm_rejects_ragged_members() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = write_file(&dir, "ragged.json", "[[1.0, 2.0], [3.0]]");
        assert_malformed(read_waccm(&path));

        let path = write_file(&dir, "broken.json", "{\"oh\": [1.0]}");
        assert_malformed(read_waccm(&path));
    }

    #[test]
    fn gfdl_rounds_fractional_years() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let contents = "GFDL-ESM4\nyear,oh\n1850.4,1.0e6\n1851.5,1.2e6\n";
        let path = write_file(&dir, "gfdl.txt", contents);

        let ts = read_gfdl(&path).expect("valid fixture");

        assert_eq!(ts.years(), &[1850, 1852]);
        assert_eq!(ts.values(), &[Some(1.0e6), Some(1.2e6)]);
    }

    #[test]
    fn gfdl_rejects_repeated_years() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let contents = "c1\nc2\n1850,1.0\n1850,2.0\n";
        let path = write_file(&dir, "gfdl.txt", contents);
        assert_malformed(read_gfdl(&path));
    }
}
