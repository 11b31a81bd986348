use anyhow::Context;
use serde::Serialize;
use shakecore::pipeline::{CalibrationRun, ChannelAnalysis};
use shakecore::SpectralResult;
use std::fs;
use std::path::{Path, PathBuf};

/// Arrays behind one plot, written as JSON for external plotting tools.
#[derive(Serialize)]
struct SpectrumDump<'a> {
    channel: &'a str,
    dataset: &'a str,
    kind: &'a str,
    frequency: Vec<f64>,
    coherence: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    amplitude: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phase: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    psd_device: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    psd_reference: Option<Vec<f64>>,
}

fn psd<'a>(channel: &'a str, dataset: &'a str, spectrum: &SpectralResult) -> SpectrumDump<'a> {
    SpectrumDump {
        channel,
        dataset,
        kind: "psd",
        frequency: spectrum.frequency().to_vec(),
        coherence: spectrum.coherence().to_vec(),
        amplitude: None,
        phase: None,
        psd_device: Some(spectrum.psd_device().to_vec()),
        psd_reference: Some(spectrum.psd_reference().to_vec()),
    }
}

fn transfer<'a>(
    channel: &'a str,
    dataset: &'a str,
    kind: &'a str,
    spectrum: &SpectralResult,
) -> SpectrumDump<'a> {
    SpectrumDump {
        channel,
        dataset,
        kind,
        frequency: spectrum.frequency().to_vec(),
        coherence: spectrum.coherence().to_vec(),
        amplitude: Some(spectrum.amplitude().to_vec()),
        phase: Some(spectrum.phase().to_vec()),
        psd_device: None,
        psd_reference: None,
    }
}

fn dumps<'a>(channel: &'a str, dataset: &'a str, analysis: &ChannelAnalysis) -> Vec<SpectrumDump<'a>> {
    let spectra = &analysis.spectra;
    vec![
        psd(channel, dataset, &spectra.band_limited),
        transfer(channel, dataset, "tf", &spectra.band_limited),
        transfer(channel, dataset, "tf_gated", &spectra.gated),
    ]
}

/// Writes `{channel}_{dataset}_{kind}.json` for every analyzed channel.
pub fn dump_spectra(directory: &Path, run: &CalibrationRun) -> anyhow::Result<Vec<PathBuf>> {
    fs::create_dir_all(directory)
        .with_context(|| format!("creating spectra directory {}", directory.display()))?;
    let mut written = Vec::new();
    for outcome in &run.outcomes {
        let Some(analysis) = outcome.analysis() else {
            continue;
        };
        for dump in dumps(&outcome.channel, &run.dataset, analysis) {
            let path = directory.join(format!("{}_{}_{}.json", dump.channel, dump.dataset, dump.kind));
            let json = serde_json::to_string_pretty(&dump)
                .with_context(|| format!("serializing {} spectra for {}", dump.kind, dump.channel))?;
            fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
            written.push(path);
        }
    }
    Ok(written)
}
