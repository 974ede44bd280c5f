//! Write fit results to CSV and JSON.
//!
//! The CSV is one flat row per object (failed objects included, with their
//! error) for spreadsheets and table tools; the JSON keeps the nested records
//! plus the run configuration.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::domain::{FailedObject, FitConfig, ObjectResult, ParamFit};
use crate::error::AppError;

fn write_err(e: impl std::fmt::Display) -> AppError {
    AppError::io(format!("failed to write results: {e}"))
}

/// Rest-frame bands present in any photometric result, in first-seen order.
fn absmag_bands(results: &[ObjectResult]) -> Vec<String> {
    let mut bands: Vec<String> = Vec::new();
    for r in results {
        for m in r.phot_derived.iter().flat_map(|d| &d.magnitudes) {
            if !bands.contains(&m.band) {
                bands.push(m.band.clone());
            }
        }
    }
    bands
}

const HEADER: [&str; 39] = [
    "id", "z", "photsys", "status", "error",
    "chi2", "av", "av_ivar", "av_status", "vdisp", "vdisp_ivar", "vdisp_status",
    "age", "logmstar", "sfr", "zzsun", "d4000", "d4000_ivar", "dn4000", "dn4000_ivar", "d4000_model", "dn4000_model",
    "loglnu_1500", "loglnu_2800", "logl_5100", "cflux_3727", "cflux_4861", "cflux_5007", "cflux_6563",
    "sigma_narrow", "sigma_balmer", "sigma_broad",
    "phot_chi2", "phot_av", "phot_av_ivar", "phot_av_status", "phot_age", "phot_logmstar", "dn4000_model_phot",
];

fn param_cells(p: Option<&ParamFit>) -> [String; 3] {
    match p {
        Some(p) => [format!("{:.6}", p.value), format!("{:.6e}", p.ivar), p.status.as_str().to_string()],
        None => Default::default(),
    }
}

fn opt(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.6}")).unwrap_or_default()
}

fn result_record(r: &ObjectResult, bands: &[String]) -> Vec<String> {
    let spec = r.spec.as_ref();
    let sd = r.spec_derived.as_ref();
    let phot = r.phot.as_ref();
    let pd = r.phot_derived.as_ref();
    let lum = sd.map(|d| d.luminosities).or(pd.map(|d| d.luminosities));
    let widths = r.line_widths.as_ref();

    let mut row = vec![
        r.id.clone(),
        format!("{:.6}", r.redshift),
        r.photsys.as_str().to_string(),
        "ok".to_string(),
        String::new(),
        opt(spec.map(|s| s.chi2)),
    ];
    row.extend(param_cells(spec.map(|s| &s.av)));
    row.extend(param_cells(spec.map(|s| &s.vdisp)));
    row.extend([
        opt(sd.map(|d| d.stellar.age_gyr)),
        opt(sd.map(|d| d.stellar.log_mstar)),
        opt(sd.map(|d| d.stellar.sfr)),
        opt(sd.map(|d| d.stellar.zzsun)),
        opt(sd.map(|d| d.d4000.value)),
        opt(sd.map(|d| d.d4000.ivar)),
        opt(sd.map(|d| d.dn4000.value)),
        opt(sd.map(|d| d.dn4000.ivar)),
        opt(sd.map(|d| d.d4000_model)),
        opt(sd.map(|d| d.dn4000_model)),
        opt(lum.map(|l| l.log_lnu_1500)),
        opt(lum.map(|l| l.log_lnu_2800)),
        opt(lum.map(|l| l.log_l_5100)),
        opt(lum.map(|l| l.cflux_3727)),
        opt(lum.map(|l| l.cflux_4861)),
        opt(lum.map(|l| l.cflux_5007)),
        opt(lum.map(|l| l.cflux_6563)),
        opt(widths.map(|w| w.narrow)),
        opt(widths.map(|w| w.balmer)),
        opt(widths.map(|w| w.broad)),
        opt(phot.map(|p| p.chi2)),
    ]);
    row.extend(param_cells(phot.map(|p| &p.av)));
    row.extend([
        opt(pd.map(|d| d.stellar.age_gyr)),
        opt(pd.map(|d| d.stellar.log_mstar)),
        opt(pd.map(|d| d.dn4000_model)),
    ]);
    for b in bands {
        let m = pd.and_then(|d| d.magnitudes.iter().find(|m| &m.band == b));
        row.extend([
            opt(m.map(|m| m.kcorr)),
            opt(m.map(|m| m.absmag)),
            opt(m.map(|m| m.absmag_ivar)),
        ]);
    }
    row
}

/// One row per object. Fields are quoted by the CSV writer whenever they hold
/// a delimiter or quote, so free-form ids and error messages stay in their
/// column.
pub fn write_results_csv(path: &Path, results: &[ObjectResult], failures: &[FailedObject]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("failed to create results CSV '{}': {e}", path.display())))?;
    let mut out = BufWriter::new(file);
    writeln!(
        out,
        "# fastspec {} {}",
        env!("CARGO_PKG_VERSION"),
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    )
    .map_err(write_err)?;

    let bands = absmag_bands(results);
    let mut header: Vec<String> = HEADER.iter().map(|h| h.to_string()).collect();
    for b in &bands {
        header.extend([format!("kcorr_{b}"), format!("absmag_{b}"), format!("absmag_ivar_{b}")]);
    }
    let ncols = header.len();

    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(&header).map_err(write_err)?;
    for r in results {
        wtr.write_record(result_record(r, &bands)).map_err(write_err)?;
    }
    // Failed objects: identity, status and the error; everything else empty.
    for f in failures {
        let mut row = vec![f.id.clone(), String::new(), String::new(), "failed".to_string(), f.error.clone()];
        row.resize(ncols, String::new());
        wtr.write_record(&row).map_err(write_err)?;
    }
    wtr.flush().map_err(write_err)?;
    Ok(())
}

#[derive(Serialize)]
struct ResultsFile<'a> {
    tool: &'static str,
    version: &'static str,
    created: String,
    config: &'a FitConfig,
    results: &'a [ObjectResult],
    failures: &'a [FailedObject],
}

pub fn write_results_json(
    path: &Path,
    results: &[ObjectResult],
    failures: &[FailedObject],
    config: &FitConfig,
) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("failed to create results JSON '{}': {e}", path.display())))?;
    let doc = ResultsFile {
        tool: "fastspec",
        version: env!("CARGO_PKG_VERSION"),
        created: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        config,
        results,
        failures,
    };
    serde_json::to_writer_pretty(BufWriter::new(file), &doc)
        .map_err(|e| AppError::io(format!("failed to write results JSON: {e}")))
}
