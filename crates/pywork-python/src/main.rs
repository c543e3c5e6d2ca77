use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pywork::{CallHandler, ErrorPayload, payload, sanitize};
use pywork_python::PythonCallHandler;

struct Options {
    script: PathBuf,
    one_shot: Option<OneShot>,
}

/// One-shot mode: a single dispatch with the result printed to stdout,
/// no control loop. The simpler sibling of the persistent session, for
/// hosts that don't need amortized script loading.
struct OneShot {
    function: String,
    request: PathBuf,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let options = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("Usage: pywork <script.py> [--call <function> --args <request.json>]");
            eprintln!();
            eprintln!("Arguments:");
            eprintln!("  <script.py>        User script served by this worker");
            eprintln!();
            eprintln!("Options:");
            eprintln!("  --call <function>  One-shot mode: invoke <function> once, print the result");
            eprintln!("  --args <file>      JSON array of positional arguments for --call");
            process::exit(2);
        }
    };

    init_tracing();

    if let Err(e) = run(options) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut script: Option<PathBuf> = None;
    let mut function: Option<String> = None;
    let mut request: Option<PathBuf> = None;

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--call" => {
                i += 1;
                function = Some(args.get(i).ok_or("--call requires a value")?.clone());
            }
            "--args" => {
                i += 1;
                request = Some(PathBuf::from(args.get(i).ok_or("--args requires a value")?));
            }
            "--help" | "-h" => return Err("".to_string()),
            arg if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            arg => {
                if script.is_some() {
                    return Err(format!("unexpected argument: {arg}"));
                }
                script = Some(PathBuf::from(arg));
            }
        }
        i += 1;
    }

    let script = script.ok_or("missing required argument: <script.py>")?;

    let one_shot = match (function, request) {
        (Some(function), Some(request)) => Some(OneShot { function, request }),
        (None, None) => None,
        _ => return Err("--call and --args must be used together".to_string()),
    };

    Ok(Options { script, one_shot })
}

fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("PYWORK_LOG").as_deref() {
            Ok("trace") => "trace",
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("pywork={level},pywork_python={level}"))
    };

    // stderr only - stdout belongs to the control protocol.
    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");
    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

fn run(options: Options) -> anyhow::Result<()> {
    tracing::info!("pywork {}", env!("CARGO_PKG_VERSION"));

    let handler = Arc::new(PythonCallHandler::new(options.script));
    let rt = tokio::runtime::Runtime::new()?;

    match options.one_shot {
        Some(one_shot) => rt.block_on(run_once(handler, one_shot)),
        None => {
            tracing::info!("worker session starting, awaiting commands");
            rt.block_on(pywork::run_worker(handler))?;
            Ok(())
        }
    }
}

async fn run_once(handler: Arc<PythonCallHandler>, one_shot: OneShot) -> anyhow::Result<()> {
    let args = payload::read_request(&one_shot.request).await?;

    let value = match handler.call(&one_shot.function, args).await {
        Ok(mut value) => {
            sanitize::strip_runtime_keys(&mut value);
            value
        }
        Err(e) => ErrorPayload::from(&e).into_value(),
    };

    println!("{}", serde_json::to_string(&value)?);
    Ok(())
}
