fn main() {
    if let Err(e) = run() {
        eprintln!("benchmark failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    use quietcut_core::silence::{DetectionBenchmark, DetectionParams, SilenceDetector};
    use quietcut_core::WaveformDecoder;
    use serde::Serialize;
    use std::path::{Path, PathBuf};

    #[derive(Debug)]
    struct Args {
        fixtures_dir: PathBuf,
        workers: usize,
        output: Option<PathBuf>,
    }

    #[derive(Debug, Clone, Serialize)]
    struct CaseResult {
        file: String,
        duration_seconds: f64,
        #[serde(flatten)]
        benchmark: DetectionBenchmark,
    }

    #[derive(Debug, Clone, Serialize)]
    struct Summary {
        fixtures_dir: String,
        workers: usize,
        total_files: usize,
        total_audio_seconds: f64,
        total_sequential_seconds: f64,
        total_parallel_seconds: f64,
        overall_speedup: f64,
        all_identical: bool,
        cases: Vec<CaseResult>,
    }

    fn default_workers() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    fn parse_args() -> Result<Args, String> {
        let mut fixtures_dir: Option<PathBuf> = None;
        let mut workers = default_workers();
        let mut output: Option<PathBuf> = None;

        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--fixtures" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --fixtures".into());
                    };
                    fixtures_dir = Some(PathBuf::from(v));
                }
                "--workers" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --workers".into());
                    };
                    workers = v
                        .parse::<usize>()
                        .map_err(|_| "invalid value for --workers".to_string())?
                        .clamp(1, 256);
                }
                "--output" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --output".into());
                    };
                    output = Some(PathBuf::from(v));
                }
                "--help" | "-h" => {
                    println!(
                        "Usage: cargo run -p quietcut-core --release --bin benchmark -- \\
  --fixtures <dir> [--workers <n>] [--output <file.json>]"
                    );
                    std::process::exit(0);
                }
                other => {
                    return Err(format!("unknown argument: {other}"));
                }
            }
        }

        let fixtures_dir = fixtures_dir.unwrap_or_else(|| PathBuf::from("benchmarks/fixtures"));
        Ok(Args {
            fixtures_dir,
            workers,
            output,
        })
    }

    fn collect_wavs(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), String> {
        let entries = std::fs::read_dir(dir).map_err(|e| e.to_string())?;
        for entry in entries {
            let entry = entry.map_err(|e| e.to_string())?;
            let path = entry.path();
            if path.is_dir() {
                collect_wavs(&path, out)?;
                continue;
            }
            let is_wav = path
                .extension()
                .and_then(|s| s.to_str())
                .map(|s| s.eq_ignore_ascii_case("wav"))
                .unwrap_or(false);
            if is_wav {
                out.push(path);
            }
        }
        Ok(())
    }

    let args = parse_args()?;
    if !args.fixtures_dir.exists() {
        return Err(format!(
            "fixtures directory not found: {}",
            args.fixtures_dir.display()
        ));
    }

    let mut wav_files = Vec::new();
    collect_wavs(&args.fixtures_dir, &mut wav_files)?;
    wav_files.sort();
    if wav_files.is_empty() {
        return Err(format!(
            "no .wav fixtures found in {}",
            args.fixtures_dir.display()
        ));
    }

    println!(
        "Running silence detection benchmark on {} fixtures (workers={})",
        wav_files.len(),
        args.workers
    );

    let detector = SilenceDetector::new(DetectionParams::default());
    let mut cases = Vec::new();
    for wav in &wav_files {
        let signal = WaveformDecoder::open(wav).map_err(|e| format!("{}: {e}", wav.display()))?;
        let benchmark = detector
            .benchmark(&signal, args.workers)
            .map_err(|e| format!("{}: {e}", wav.display()))?;
        let file = wav
            .strip_prefix(&args.fixtures_dir)
            .unwrap_or(wav)
            .display()
            .to_string();

        println!(
            "{file}: seq {seq:.3}s par {par:.3}s x{speedup:.2}{mismatch}",
            seq = benchmark.sequential_seconds,
            par = benchmark.parallel_seconds,
            speedup = benchmark.speedup_factor,
            mismatch = if benchmark.results_identical { "" } else { " MISMATCH" }
        );
        cases.push(CaseResult {
            file,
            duration_seconds: signal.duration_ms() as f64 / 1000.0,
            benchmark,
        });
    }

    let total_seq = cases.iter().map(|c| c.benchmark.sequential_seconds).sum::<f64>();
    let total_par = cases.iter().map(|c| c.benchmark.parallel_seconds).sum::<f64>();
    let summary = Summary {
        fixtures_dir: args.fixtures_dir.display().to_string(),
        workers: args.workers,
        total_files: cases.len(),
        total_audio_seconds: cases.iter().map(|c| c.duration_seconds).sum(),
        total_sequential_seconds: total_seq,
        total_parallel_seconds: total_par,
        overall_speedup: if total_par > 0.0 { total_seq / total_par } else { 0.0 },
        all_identical: cases.iter().all(|c| c.benchmark.results_identical),
        cases,
    };

    println!(
        "Done. files={} seq={:.3}s par={:.3}s speedup=x{:.2} identical={}",
        summary.total_files,
        summary.total_sequential_seconds,
        summary.total_parallel_seconds,
        summary.overall_speedup,
        summary.all_identical
    );

    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    if let Some(out) = args.output {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&out, json).map_err(|e| e.to_string())?;
        println!("Wrote benchmark report: {}", out.display());
    } else {
        println!("{json}");
    }

    Ok(())
}
