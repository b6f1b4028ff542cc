use std::error::Error;
use std::path::PathBuf;

use phase_lattice::config::{ConfigOverrides, LatticeConfig};
use phase_lattice::lens::LensProfile;
use phase_lattice::observer::SessionAdapter;
use phase_lattice::session::Session;
use phase_lattice::sources::RandomPulses;
use tracing::{error, info};

struct Args {
    ticks: u64,
    seed: Option<u64>,
    size: Option<usize>,
    every: u64,
    config: Option<PathBuf>,
    json: bool,
    profile: Option<LensProfile>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            ticks: 200,
            seed: None,
            size: None,
            every: 10,
            config: None,
            json: false,
            profile: None,
        }
    }
}

fn main() {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if argv.iter().any(|a| a == "--help" || a == "-h" || a == "help") {
        print_help();
        return;
    }

    tracing_subscriber::fmt::init();

    let args = match parse_args(&argv) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            print_help();
            std::process::exit(2);
        }
    };

    if let Err(e) = run(&args) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn parse_args(argv: &[String]) -> Result<Args, Box<dyn Error>> {
    let mut args = Args::default();
    let mut it = argv.iter();
    while let Some(flag) = it.next() {
        let mut value = || {
            it.next()
                .ok_or_else(|| format!("missing value for {flag}"))
                .map(String::as_str)
        };
        match flag.as_str() {
            "--ticks" => args.ticks = value()?.parse()?,
            "--seed" => args.seed = Some(value()?.parse()?),
            "--size" => args.size = Some(value()?.parse()?),
            "--every" => args.every = value()?.parse()?,
            "--config" => args.config = Some(PathBuf::from(value()?)),
            "--profile" => {
                let name = value()?;
                args.profile = Some(
                    LensProfile::from_name(name)
                        .ok_or_else(|| format!("unknown profile: {name}"))?,
                );
            }
            "--json" => args.json = true,
            other => return Err(format!("unknown argument: {other}").into()),
        }
    }
    Ok(args)
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let mut overrides = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let parsed: ConfigOverrides = serde_json::from_str(&text)?;
            info!("Loaded overrides from {:?}", path);
            parsed
        }
        None => ConfigOverrides::default(),
    };
    // Command-line flags win over the file.
    if args.size.is_some() {
        overrides.grid_size = args.size;
    }
    if args.seed.is_some() {
        overrides.seed = args.seed;
    }
    if args.profile.is_some() {
        overrides.profile = args.profile;
        overrides.lens_weights = None;
    }

    let cfg = overrides.merge(&LatticeConfig::default());
    let mut session = Session::new(cfg)?.with_source(Box::new(RandomPulses::default()));
    let every = args.every.max(1);

    for _ in 0..args.ticks {
        let m = session.tick();
        if m.tick % every != 0 {
            continue;
        }
        if args.json {
            let view = SessionAdapter::new(&session).metrics();
            println!("{}", serde_json::to_string(&view)?);
        } else {
            info!(
                "tick {:>6}  energy={:.4}  dispersion={:.5}  coherence={:.4}  bias={:.4}  forgiven={}",
                m.tick,
                m.energy,
                m.dispersion,
                m.coherence,
                m.bias_energy,
                m.forgiveness_event_count
            );
        }
    }

    let m = session.metrics();
    info!(
        ticks = m.tick,
        forgiveness_events = m.forgiveness_event_count,
        rewires = m.rewire_count,
        "run complete"
    );
    Ok(())
}

fn print_help() {
    println!("phase-lattice: headless phase lattice runner");
    println!();
    println!("Usage:");
    println!("  phase-lattice [options]");
    println!();
    println!("Options:");
    println!("  --ticks N         ticks to run (default 200)");
    println!("  --seed S          RNG seed");
    println!("  --size S          grid side, S^3 cells (default 16)");
    println!("  --every K         report every K ticks (default 10)");
    println!("  --config FILE     JSON overrides file");
    println!("  --profile NAME    lens profile: calm, curious, alert, harmonic");
    println!("  --json            print metrics as JSON lines");
    println!("  -h, --help        show this help");
}
