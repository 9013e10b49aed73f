//! Synthetic campaign generation.
//!
//! Produces a self-consistent dataset with a known storage lifetime:
//!
//! - `runinfo.csv` and `runlist.txt`
//! - `results/PulseAnalysis_<run>.csv` for every run
//! - optionally `data/PECountsRun<run>.txt` raw hits and `run_params.json`,
//!   so the pulse stage can be exercised too
//!
//! Neutron counts in the signal window are Poisson with mean
//! `efficiency · fill · exp(-hold/τ)`; both windows carry a flat Poisson
//! background of low-PE pulses.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Exp, Normal, Poisson};
use tracing::info;

use crate::domain::{EventClass, PulseRecord, RunInfo, RunParams, Segment, SimConfig, WindowTiming};
use crate::error::AppError;
use crate::io::hits::hit_file_path;
use crate::io::pulses::{pulse_file_path, write_pulse_file};
use crate::io::runinfo::write_runinfo;
use crate::io::runlist::write_good_runs;
use crate::models::{PMT_RESPONSE, ResponseShape};
use crate::pulse::{RunWindows, ensure_dir};

/// Fill time written to the run parameters (s).
pub const SIM_FILL_TIME: f64 = 100.0;
/// Cleaning time written to the run parameters (s).
pub const SIM_CLEAN_TIME: f64 = 10.0;
const NEUTRON_PE_MEAN: f64 = 45.0;
const NEUTRON_PE_SD: f64 = 15.0;
/// Background pulses have `1 + Exp(rate)` PE.
const BACKGROUND_PE_RATE: f64 = 0.2;

/// Files written by [`simulate`].
#[derive(Debug, Clone)]
pub struct SimSummary {
    pub runinfo_path: PathBuf,
    pub runlist_path: PathBuf,
    pub analysis_dir: PathBuf,
    pub hits_dir: Option<PathBuf>,
    pub params_path: Option<PathBuf>,
    pub runs: Vec<u32>,
    pub pulses: usize,
}

fn validate(config: &SimConfig) -> Result<(), AppError> {
    if config.hold_times.is_empty() || config.runs_per_hold == 0 {
        return Err(AppError::input("Simulation needs at least one hold time and one run per hold."));
    }
    if !(config.tau.is_finite() && config.tau > 0.0) {
        return Err(AppError::input("Simulated lifetime must be finite and > 0."));
    }
    if !(config.window.is_finite() && config.window > 0.0) {
        return Err(AppError::input("Simulated window length must be finite and > 0."));
    }
    for (name, v) in [
        ("fill mean", config.fill_mean),
        ("efficiency", config.efficiency),
        ("background rate", config.background_rate),
    ] {
        if !(v.is_finite() && v >= 0.0) {
            return Err(AppError::input(format!("Simulated {name} must be finite and >= 0.")));
        }
    }
    Ok(())
}

fn dist_error(e: impl std::fmt::Display) -> AppError {
    AppError::runtime(format!("Distribution error: {e}"))
}

fn poisson_count(rng: &mut StdRng, mean: f64) -> Result<usize, AppError> {
    if mean <= 0.0 {
        return Ok(0);
    }
    let poisson = Poisson::new(mean).map_err(dist_error)?;
    Ok(poisson.sample(rng) as usize)
}

/// Sampler for one photoelectron's delay after a capture (µs).
struct ResponseSampler {
    shape: ResponseShape,
    total: f64,
}

impl ResponseSampler {
    fn new(shape: ResponseShape) -> Self {
        Self {
            shape,
            total: shape.ratios.iter().sum(),
        }
    }

    fn sample(&self, rng: &mut StdRng) -> Result<f64, AppError> {
        let mut u = rng.gen_range(0.0..self.total);
        let mut k = 0;
        while k + 1 < self.shape.ratios.len() && u >= self.shape.ratios[k] {
            u -= self.shape.ratios[k];
            k += 1;
        }
        let exp = Exp::new(1.0 / self.shape.scales[k]).map_err(dist_error)?;
        Ok((self.shape.loc + exp.sample(rng)).max(0.0))
    }
}

/// Generate the dataset described by `config`.
pub fn simulate(config: &SimConfig) -> Result<SimSummary, AppError> {
    validate(config)?;

    let out = &config.output_dir;
    let analysis_dir = out.join("results");
    ensure_dir(&analysis_dir)?;
    let hits_dir = config.hits.then(|| out.join("data"));
    if let Some(dir) = &hits_dir {
        ensure_dir(dir)?;
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let fill_noise = Normal::new(config.fill_mean, 0.05 * config.fill_mean).map_err(dist_error)?;
    let neutron_pe = Normal::new(NEUTRON_PE_MEAN, NEUTRON_PE_SD).map_err(dist_error)?;
    let background_pe = Exp::new(BACKGROUND_PE_RATE).map_err(dist_error)?;
    let sampler = ResponseSampler::new(PMT_RESPONSE);
    let timing = WindowTiming {
        signal_length: config.window,
        background_length: config.window,
        ..WindowTiming::default()
    };

    let mut infos = Vec::new();
    let mut params = BTreeMap::new();
    let mut pulses = 0usize;
    let mut run = config.first_run;

    for &hold in &config.hold_times {
        for _ in 0..config.runs_per_hold {
            let run_params = RunParams {
                run_type: "production".to_string(),
                fill_time: SIM_FILL_TIME,
                hold_time: hold as f64,
                clean_time: SIM_CLEAN_TIME,
            };
            let windows = RunWindows::for_run(&run_params, &timing);
            let mut fills = [0.0; 4];
            let mut records = Vec::new();

            for segment in Segment::ALL {
                let fill = fill_noise.sample(&mut rng).max(0.0);
                fills[segment.index()] = fill;

                let survivors = config.efficiency * fill * (-(hold as f64) / config.tau).exp();
                let n_neutrons = poisson_count(&mut rng, survivors)?;
                let n_bg_signal = poisson_count(&mut rng, config.background_rate * config.window)?;

                let (s0, s1) = windows.signal;
                for i in 0..n_neutrons + n_bg_signal {
                    let pe = if i < n_neutrons {
                        neutron_pe.sample(&mut rng).max(1.0)
                    } else {
                        1.0 + background_pe.sample(&mut rng)
                    };
                    records.push(PulseRecord {
                        segment,
                        time: rng.gen_range(s0..s1),
                        pe,
                        event: EventClass::Signal,
                    });
                }

                if let Some((b0, b1)) = windows.background {
                    let n_bg = poisson_count(&mut rng, config.background_rate * config.window)?;
                    for _ in 0..n_bg {
                        records.push(PulseRecord {
                            segment,
                            time: rng.gen_range(b0..b1),
                            pe: 1.0 + background_pe.sample(&mut rng),
                            event: EventClass::Background,
                        });
                    }
                }
            }

            write_pulse_file(&pulse_file_path(&analysis_dir, run), &records)?;
            if let Some(dir) = &hits_dir {
                write_hits(&hit_file_path(dir, run), &records, &sampler, &mut rng)?;
            }
            pulses += records.len();
            infos.push(RunInfo {
                run,
                hold_time: hold,
                fills,
            });
            params.insert(run.to_string(), run_params);
            run += 1;
        }
    }

    let runinfo_path = out.join("runinfo.csv");
    write_runinfo(&runinfo_path, &infos)?;
    let runlist_path = out.join("runlist.txt");
    let runs: Vec<u32> = infos.iter().map(|r| r.run).collect();
    write_good_runs(&runlist_path, &runs)?;

    let params_path = match hits_dir {
        Some(_) => {
            let path = out.join("run_params.json");
            write_params(&path, &params)?;
            Some(path)
        }
        None => None,
    };

    info!(runs = runs.len(), pulses, dir = %out.display(), "synthetic dataset written");
    Ok(SimSummary {
        runinfo_path,
        runlist_path,
        analysis_dir,
        hits_dir,
        params_path,
        runs,
        pulses,
    })
}

/// Expand each pulse into `round(pe)` photoelectron hits.
fn write_hits(path: &Path, records: &[PulseRecord], sampler: &ResponseSampler, rng: &mut StdRng) -> Result<(), AppError> {
    let mut text = String::new();
    for r in records {
        let channels = r.segment.channels();
        for k in 0..r.pe.round().max(0.0) as usize {
            let t = r.time + sampler.sample(rng)? * 1e-6;
            // Writing into a String cannot fail.
            let _ = writeln!(text, "{}, {:.9},{}", r.segment.label(), t, channels[k % 2]);
        }
    }
    fs::write(path, text).map_err(|e| AppError::input(format!("Failed to write hit file '{}': {e}", path.display())))
}

fn write_params(path: &Path, params: &BTreeMap<String, RunParams>) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create run parameters '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, params)
        .map_err(|e| AppError::input(format!("Failed to write run parameters: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::pulses::load_pulse_file;
    use crate::io::runinfo::load_runinfo;

    fn small_config(dir: &Path) -> SimConfig {
        SimConfig {
            output_dir: dir.to_path_buf(),
            seed: 7,
            tau: 850.0,
            hold_times: vec![20, 100, 200],
            runs_per_hold: 2,
            first_run: 1000,
            fill_mean: 500.0,
            efficiency: 1.0,
            background_rate: 0.5,
            window: 60.0,
            hits: false,
        }
    }

    #[test]
    fn writes_consistent_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let summary = simulate(&small_config(dir.path())).unwrap();
        assert_eq!(summary.runs, vec![1000, 1001, 1002, 1003, 1004, 1005]);

        let table = load_runinfo(&summary.runinfo_path).unwrap();
        assert_eq!(table.runs.len(), 6);
        assert_eq!(table.hold_times(), vec![20, 100, 200]);

        let file = load_pulse_file(&pulse_file_path(&summary.analysis_dir, 1000)).unwrap();
        assert!(file.row_errors.is_empty());
        let signal = file.records.iter().filter(|r| r.event == EventClass::Signal).count();
        // ~4 × 500 · exp(-20/850) neutrons plus background.
        assert!(signal > 1500 && signal < 2400, "signal={signal}");
        assert!(summary.hits_dir.is_none());
    }

    #[test]
    fn same_seed_same_data() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        simulate(&small_config(a.path())).unwrap();
        simulate(&small_config(b.path())).unwrap();
        let read = |d: &Path| fs::read_to_string(pulse_file_path(&d.join("results"), 1003)).unwrap();
        assert_eq!(read(a.path()), read(b.path()));
    }

    #[test]
    fn hits_and_params_are_optional() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.hits = true;
        config.hold_times = vec![20];
        config.runs_per_hold = 1;
        config.fill_mean = 5.0;
        let summary = simulate(&config).unwrap();
        let params = crate::io::params::load_run_params(summary.params_path.as_ref().unwrap()).unwrap();
        assert!(params.get(1000).unwrap().is_production());
        let hits = crate::io::hits::load_run_hits(&hit_file_path(summary.hits_dir.as_ref().unwrap(), 1000))
            .unwrap()
            .unwrap();
        assert!(hits.total() > 0);
        assert_eq!(hits.skipped_lines, 0);
    }

    #[test]
    fn rejects_empty_hold_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.hold_times.clear();
        assert_eq!(simulate(&config).unwrap_err().exit_code(), crate::error::EXIT_INPUT);
    }
}
