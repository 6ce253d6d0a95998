use crate::anomaly::{
    BaselineWindow, PUBLISHED_WINDOW, multi_model_mean, normalize, normalize_ensemble, rebase,
    rebase_band, rebase_ensemble,
};
use crate::config::Config;
use crate::error::Error;
use crate::figure::{self, Band, FigureInput, Trace};
use crate::literal::{LiteralDataset, NAUS_2019, PATRA_2021};
use crate::readers;
use crate::series::{EnsembleSeries, TimeSeries};
use anyhow::{Context, Result};
use std::{
    fs::File,
    io::{BufWriter, Write},
    iter,
    path::{Path, PathBuf},
};

pub struct Manager {
    data_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(data_dir: P, cfg: Config) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        log::info!("{cfg:#?}");
        Self { data_dir, cfg }
    }

    /// Load every dataset, normalize the model output and write the figure.
    ///
    /// Nothing is written unless every dataset loads and normalizes.
    pub fn run<P: AsRef<Path>>(&self, output: P, export: Option<&Path>) -> Result<()> {
        let input = self.load_figure_input().context("failed to load datasets")?;

        if let Some(export) = export {
            self.export_traces(&input, export)
                .with_context(|| format!("failed to export traces to {export:?}"))?;
        }

        figure::render(&input, &self.cfg.figure, output).context("failed to render figure")?;

        Ok(())
    }

    /// Every trace as a percent anomaly against the configured baseline window.
    ///
    /// Published anomalies are already relative to 1998-2007 and are rebased only when the
    /// configured window differs.
    pub fn load_figure_input(&self) -> Result<FigureInput> {
        let palette = &self.cfg.figure.palette;
        let baseline = &self.cfg.baseline;
        if !self.keeps_published_window() {
            log::info!(
                "rebasing published anomalies to {}-{}",
                baseline.first_year,
                baseline.last_year
            );
        }

        let gfdl = readers::read_gfdl(self.gfdl_file()).context("failed to read GFDL-ESM4")?;
        log_series("GFDL-ESM4 (raw)", &gfdl);
        let gfdl = normalize(&gfdl, baseline).context("failed to normalize GFDL-ESM4")?;

        let ukesm = readers::read_ukesm(self.ukesm_file()).context("failed to read UKESM1-0-LL")?;
        log_ensemble("UKESM1-0-LL (raw)", &ukesm);
        let ukesm =
            normalize_ensemble(&ukesm, baseline).context("failed to normalize UKESM1-0-LL")?;

        let waccm = readers::read_waccm(self.waccm_file()).context("failed to read CESM2-WACCM")?;
        log_ensemble("CESM2-WACCM", &waccm);
        let waccm = self
            .rebase_published(&waccm, rebase_ensemble)
            .context("failed to rebase CESM2-WACCM")?;

        let mmm = multi_model_mean(
            iter::once(&gfdl)
                .chain(ukesm.members())
                .chain(waccm.members()),
        )
        .context("failed to compute multi-model mean")?;
        log_series("multi-model mean", &mmm);

        let models = vec![
            Trace::line("GFDL-ESM4", palette.gfdl, gfdl),
            ensemble_trace("CESM2-WACCM", palette.waccm, &waccm)?,
            ensemble_trace("UKESM1-0-LL", palette.ukesm, &ukesm)?,
        ];

        let rigby =
            readers::read_rigby_2017(self.rigby_file()).context("failed to read Rigby (2017)")?;
        log_series("Rigby (2017)", rigby.central());
        let rigby = self
            .rebase_published(&rigby, rebase_band)
            .context("failed to rebase Rigby (2017)")?;
        let rigby_band = Band::new(rigby.lower().clone(), rigby.upper().clone())?;
        let rigby = Trace::line("Rigby (2017)", palette.rigby, rigby.central().clone())
            .with_band(rigby_band);

        let montzka = readers::read_montzka_2011(self.montzka_file())
            .context("failed to read Montzka (2011)")?;
        log_series("Montzka (2011)", &montzka);
        let montzka = self
            .rebase_published(&montzka, rebase)
            .context("failed to rebase Montzka (2011)")?;

        let turner =
            readers::read_turner_2017(self.turner_file()).context("failed to read Turner (2017)")?;
        log_series("Turner (2017)", &turner);
        let turner = self
            .rebase_published(&turner, rebase)
            .context("failed to rebase Turner (2017)")?;

        let nicely =
            readers::read_nicely_2018(self.nicely_file()).context("failed to read Nicely (2018)")?;
        log_series("Nicely (2018)", &nicely);
        let nicely = self
            .rebase_published(&nicely, rebase)
            .context("failed to rebase Nicely (2018)")?;

        let observations = vec![
            rigby,
            Trace::line("Montzka (2011)", palette.montzka, montzka),
            Trace::line("Turner (2017)", palette.turner, turner),
            Trace::line("Nicely (2018)", palette.nicely, nicely),
            self.literal_trace(&NAUS_2019, palette.naus)?,
            self.literal_trace(&PATRA_2021, palette.patra)?,
        ];

        Ok(FigureInput {
            baseline: *baseline,
            models,
            observations,
            multi_model_mean: Trace::line("Multi-model mean", palette.multi_model, mmm).heavy(),
        })
    }

    fn keeps_published_window(&self) -> bool {
        self.cfg.baseline == PUBLISHED_WINDOW
    }

    fn rebase_published<T, F>(&self, published: &T, rebase_fn: F) -> Result<T, Error>
    where
        T: Clone,
        F: FnOnce(&T, &BaselineWindow) -> Result<T, Error>,
    {
        if self.keeps_published_window() {
            return Ok(published.clone());
        }
        rebase_fn(published, &self.cfg.baseline)
    }

    fn literal_trace(&self, dataset: &LiteralDataset, color: figure::Rgb) -> Result<Trace> {
        let series = dataset.series();
        log_series(dataset.name, &series);
        let series = self
            .rebase_published(&series, rebase)
            .with_context(|| format!("failed to rebase {}", dataset.name))?;
        Ok(Trace::line(dataset.name, color, series))
    }

    fn export_traces(&self, input: &FigureInput, file: &Path) -> Result<()> {
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, input).context("failed to serialize traces")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }

    fn montzka_file(&self) -> PathBuf {
        self.data_dir.join("Montzkaetal.2011.csv")
    }

    fn rigby_file(&self) -> PathBuf {
        self.data_dir.join("Rigby.2017.csv")
    }

    fn turner_file(&self) -> PathBuf {
        self.data_dir.join("Turner.2017.txt")
    }

    fn nicely_file(&self) -> PathBuf {
        self.data_dir.join("Nicely.2018.dat")
    }

    fn ukesm_file(&self) -> PathBuf {
        self.data_dir.join("UKESM1-0-ll_1850-2014.asc")
    }

    fn waccm_file(&self) -> PathBuf {
        self.data_dir.join("CESM2_WACCM_1850-2014.json")
    }

    fn gfdl_file(&self) -> PathBuf {
        self.data_dir.join("GFDL-ESM4_1850-2014.txt")
    }
}

fn ensemble_trace(label: &str, color: figure::Rgb, ensemble: &EnsembleSeries) -> Result<Trace> {
    let band = Band::new(ensemble.min(), ensemble.max())?;
    Ok(Trace::line(label, color, ensemble.mean()).with_band(band))
}

fn log_series(name: &str, series: &TimeSeries) {
    log::info!(
        "loaded {name}: {:?}-{:?}, {} values, {} absent",
        series.first_year(),
        series.last_year(),
        series.len(),
        series.n_absent()
    );
}

fn log_ensemble(name: &str, ensemble: &EnsembleSeries) {
    log::info!(
        "loaded {name}: {} members over {} years",
        ensemble.n_members(),
        ensemble.years().len()
    );
    for (i_mem, member) in ensemble.members().iter().enumerate() {
        log_series(&format!("{name} member {i_mem}"), member);
    }
}
