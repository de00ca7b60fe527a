/// jenhash – GPU brute-force harness for the Jenkins lookup3 hash.
///
/// Feeds candidate strings to a compute kernel and reports throughput:
///   jenhash --input words.txt               → hash every line of a file
///   jenhash --pattern 'FOO/[0-9]{3}/*'      → hash a pattern expansion
///   jenhash --pattern '[hex]{8}' --validate → cross-check GPU against CPU
///   jenhash --input words.txt --cpu         → scalar fallback, no device
use std::env;
use std::path::{Path, PathBuf};
use std::process::{self, ExitCode};

use jenhash::gpu::{DispatchConfig, EngineOptions, GpuEngine};
use jenhash::input::InputFile;
use jenhash::metrics::{group_thousands, Metrics};
use jenhash::pattern::Pattern;
use jenhash::scheduler::{self, RunStats, Scheduler};
use jenhash::source::{CandidateSource, LineSource, NullSink, PatternSource};
use jenhash::JhError;

fn usage() {
    eprintln!("jenhash - brute-force Jenkins lookup3 hashing on the GPU");
    eprintln!();
    eprintln!("Usage: jenhash [OPTIONS]");
    eprintln!();
    eprintln!("Candidate sources (exactly one):");
    eprintln!("  -i, --input FILE          Hash one candidate per line of FILE");
    eprintln!("  -p, --pattern EXPR        Hash every expansion of a pattern, e.g.");
    eprintln!("                            'CREATURE/[alpha]{{1,3}}/(IDLE|WALK).M2'");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -f, --frames N            In-flight frames (default 3)");
    eprintln!("      --workgroupCount x,y,z  Dispatched workgroups (default 3,1,1)");
    eprintln!("      --workgroupSize x,y,z   Workgroup local size (default 64,1,1)");
    eprintln!("      --validate            Re-hash on the CPU and report mismatches");
    eprintln!("      --shader FILE         Use an external WGSL kernel");
    eprintln!("      --cpu                 Hash on the CPU instead of a device");
    eprintln!("      --devices             List compute devices and exit");
    eprintln!("      --profile             Time GPU dispatches when supported");
    eprintln!("  -q, --quiet               Suppress warnings");
    eprintln!("  -h, --help                Show this help");
}

#[derive(Debug)]
struct Opts {
    input: Option<PathBuf>,
    pattern: Option<String>,
    frames: u32,
    workgroup_count: [u32; 3],
    workgroup_size: [u32; 3],
    validate: bool,
    shader: Option<PathBuf>,
    cpu: bool,
    profile: bool,
    quiet: bool,
}

/// Parse `x,y,z` (or a bare `x`, filling y=z=1).
fn parse_triple(text: &str) -> Option<[u32; 3]> {
    let mut triple = [1u32; 3];
    let parts: Vec<&str> = text.split(',').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    for (slot, part) in triple.iter_mut().zip(&parts) {
        *slot = part.trim().parse().ok()?;
    }
    Some(triple)
}

fn parse_args() -> Opts {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut opts = Opts {
        input: None,
        pattern: None,
        frames: 3,
        workgroup_count: [3, 1, 1],
        workgroup_size: [64, 1, 1],
        validate: false,
        shader: None,
        cpu: false,
        profile: false,
        quiet: false,
    };

    let mut i = 0;
    let value = |i: &mut usize, flag: &str| -> String {
        *i += 1;
        match args.get(*i) {
            Some(v) => v.clone(),
            None => {
                eprintln!("jenhash: missing argument for {flag}");
                process::exit(1);
            }
        }
    };

    while i < args.len() {
        match args[i].as_str() {
            "-i" | "--input" => opts.input = Some(PathBuf::from(value(&mut i, "--input"))),
            "-p" | "--pattern" => opts.pattern = Some(value(&mut i, "--pattern")),
            "-f" | "--frames" => {
                let v = value(&mut i, "--frames");
                opts.frames = match v.parse() {
                    Ok(n) if n >= 1 => n,
                    _ => {
                        eprintln!("jenhash: invalid frame count '{v}'");
                        process::exit(1);
                    }
                };
            }
            "--workgroupCount" => {
                let v = value(&mut i, "--workgroupCount");
                opts.workgroup_count = match parse_triple(&v) {
                    Some(t) => t,
                    None => {
                        eprintln!("jenhash: invalid workgroup count '{v}' (expected x,y,z)");
                        process::exit(1);
                    }
                };
            }
            "--workgroupSize" => {
                let v = value(&mut i, "--workgroupSize");
                opts.workgroup_size = match parse_triple(&v) {
                    Some(t) => t,
                    None => {
                        eprintln!("jenhash: invalid workgroup size '{v}' (expected x,y,z)");
                        process::exit(1);
                    }
                };
            }
            "--shader" => opts.shader = Some(PathBuf::from(value(&mut i, "--shader"))),
            "--validate" => opts.validate = true,
            "--cpu" => opts.cpu = true,
            "--devices" => {
                let devices = jenhash::gpu::probe_devices();
                if devices.is_empty() {
                    eprintln!("jenhash: no compute devices found");
                }
                for d in devices {
                    println!(
                        "{} [{}] {} (max workgroup size {})",
                        d.name,
                        d.backend,
                        if d.is_gpu { "gpu" } else { "software" },
                        d.max_workgroup_size
                    );
                }
                process::exit(0);
            }
            "--profile" => opts.profile = true,
            "-q" | "--quiet" => opts.quiet = true,
            "-h" | "--help" => {
                usage();
                process::exit(0);
            }
            other => {
                eprintln!("jenhash: unknown option '{other}'");
                eprintln!("jenhash: try --help");
                process::exit(1);
            }
        }
        i += 1;
    }

    opts
}

fn run() -> Result<(), String> {
    let opts = parse_args();

    match (&opts.input, &opts.pattern) {
        (None, None) => {
            eprintln!("jenhash: either --input or --pattern is required");
            usage();
            return Err(String::new());
        }
        (Some(_), Some(_)) => {
            return Err("choose either --input or --pattern, not both".to_string());
        }
        _ => {}
    }

    if let Some(path) = &opts.input {
        let file = InputFile::open(path).map_err(|e| e.to_string())?;
        if !opts.quiet && file.is_empty() {
            eprintln!("jenhash: warning: {} contains no candidates", path.display());
        }
        let mut source = LineSource::from_file(file);
        drive(&opts, &mut source)
    } else {
        let expr = opts.pattern.as_deref().unwrap();
        let pattern = Pattern::new(expr).map_err(|e| e.to_string())?;
        if !opts.quiet {
            eprintln!(
                "jenhash: pattern expands to {} candidates",
                group_thousands(pattern.count())
            );
        }
        let mut source = PatternSource::new(pattern);
        drive(&opts, &mut source)
    }
}

fn drive<P: CandidateSource>(opts: &Opts, source: &mut P) -> Result<(), String> {
    let dispatch = DispatchConfig::new(opts.workgroup_size, opts.workgroup_count);
    let mut metrics = Metrics::start();

    let stats = if opts.cpu {
        scheduler::run_cpu(source, &mut NullSink, &metrics, dispatch.batch_capacity())
            .map_err(|e| e.to_string())?
    } else {
        let engine = match GpuEngine::with_options(
            dispatch,
            &EngineOptions {
                profiling: opts.profile,
                shader: opts.shader.clone(),
                ..EngineOptions::default()
            },
        ) {
            Ok(engine) => engine,
            Err(JhError::Unsupported) => {
                return Err(
                    "no usable compute device (run with --cpu for the scalar path)".to_string()
                );
            }
            Err(e) => return Err(e.to_string()),
        };

        let mut scheduler = Scheduler::new(&engine, opts.frames)
            .map_err(|e| e.to_string())?
            .with_validation(opts.validate);
        let stats = scheduler
            .run(source, &mut NullSink, &metrics)
            .map_err(|e| e.to_string())?;

        if opts.profile {
            report_profile(&engine);
        }
        stats
    };

    metrics.stop();
    report(&metrics, &stats);

    if stats.mismatch_count > 0 {
        return Err(format!(
            "{} candidates hashed differently on CPU and GPU",
            stats.mismatch_count
        ));
    }
    Ok(())
}

fn report(metrics: &Metrics, stats: &RunStats) {
    eprintln!(
        "[jenhash] hashed {} candidates in {:.3}s ({} hashes/s)",
        group_thousands(stats.delivered),
        metrics.elapsed().as_secs_f64(),
        group_thousands(metrics.hashes_per_second() as u64)
    );

    if stats.mismatch_count > 0 {
        eprintln!(
            "[jenhash] validation: {} mismatches",
            group_thousands(stats.mismatch_count)
        );
        for text in &stats.mismatches {
            eprintln!("[jenhash]   mismatch: {text:?}");
        }
        if stats.mismatch_count > stats.mismatches.len() as u64 {
            eprintln!(
                "[jenhash]   ({} more not shown)",
                stats.mismatch_count - stats.mismatches.len() as u64
            );
        }
    }
}

fn report_profile(engine: &GpuEngine) {
    let Some(results) = engine.profiler_end_frame() else {
        eprintln!("[jenhash] profiling: no GPU timestamps collected");
        return;
    };
    for scope in &results {
        if let Some(time) = &scope.time {
            eprintln!(
                "[jenhash] {}: {:.3} ms",
                scope.label,
                (time.end - time.start) * 1000.0
            );
        }
    }
    let trace_path = Path::new("jenhash-trace.json");
    if GpuEngine::profiler_write_trace(trace_path, &results).is_ok() {
        eprintln!("[jenhash] wrote {}", trace_path.display());
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("jenhash: {msg}");
            }
            ExitCode::FAILURE
        }
    }
}
