// xlsx2json - spreadsheet rows to JSON, optionally through a Lua callback

mod exit_codes;
mod output;
mod repl;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};
use xlsx2json_config::{ConfigError, ExitPolicy, Settings};
use xlsx2json_io::{open_source, records_for};
use xlsx2json_script::{HostOptions, Pipeline, RunSummary, ScriptError, ScriptHost};

use exit_codes::{
    script_exit_code, EXIT_CONFIG, EXIT_OUTPUT, EXIT_SUCCESS, EXIT_USAGE,
};
use output::{OutputAssembler, OutputFormat};

#[derive(Parser)]
#[command(name = "xlsx2json")]
#[command(about = "Turn each spreadsheet row into a JSON object, optionally through a Lua callback")]
#[command(long_version = long_version())]
#[command(version)]
#[command(after_help = "\
The callback receives each row as a table and returns
    {path = ..., source = ..., error = ...}
`source` is emitted in place of the row, a non-empty `path` also writes it
to that file, and a non-empty `error` stops the run.

Examples:
  xlsx2json --as-array people.xlsx
  xlsx2json --script row2obj.lua --callback row2obj people.xlsx
  xlsx2json --script setup.lua --repl")]
struct Cli {
    /// Workbook to read (.xlsx, .xlsm, .xls, .ods, .csv, .tsv)
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Workbook to read (alternative to FILE)
    #[arg(short = 'i', long = "input", value_name = "FILE", conflicts_with = "file")]
    input: Option<PathBuf>,

    /// Zero-based sheet index
    #[arg(long, env = "XLSX2JSON_SHEET")]
    sheet: Option<usize>,

    /// Lua script defining the callback
    #[arg(long, short = 's', visible_alias = "js", env = "XLSX2JSON_SCRIPT")]
    script: Option<PathBuf>,

    /// Name of the callback function in the script
    #[arg(long, env = "XLSX2JSON_CALLBACK")]
    callback: Option<String>,

    /// Write the rows as one JSON array
    #[arg(long, env = "XLSX2JSON_AS_ARRAY")]
    as_array: bool,

    /// Do not print rows (files named by `path` are still written)
    #[arg(long, short = 'q')]
    quiet: bool,

    /// Start an interactive Lua prompt (after converting FILE, if given)
    #[arg(long)]
    repl: bool,

    /// Settings file [default: <config dir>/xlsx2json/settings.toml]
    #[arg(long, env = "XLSX2JSON_CONFIG")]
    config: Option<PathBuf>,

    /// What os.exit() does in a script
    #[arg(long, value_enum, env = "XLSX2JSON_EXIT_POLICY")]
    exit_policy: Option<ExitPolicyArg>,

    /// More logging on stderr (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Arguments passed to the script as os.args()
    #[arg(last = true, value_name = "ARGS")]
    script_args: Vec<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExitPolicyArg {
    /// End the process immediately
    Terminate,
    /// Stop the run, flush output, then exit with the code
    Cooperative,
}

impl From<ExitPolicyArg> for ExitPolicy {
    fn from(arg: ExitPolicyArg) -> Self {
        match arg {
            ExitPolicyArg::Terminate => ExitPolicy::Terminate,
            ExitPolicyArg::Cooperative => ExitPolicy::Cooperative,
        }
    }
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nlua:     5.4 (vendored)",
        "\ntarget:  ", env!("TARGET"),
    )
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn output(msg: impl Into<String>) -> Self {
        Self { code: EXIT_OUTPUT, message: msg.into(), hint: None }
    }

    pub fn config(err: ConfigError) -> Self {
        Self {
            code: EXIT_CONFIG,
            message: err.to_string(),
            hint: Some("fix the file, or point --config at another one".to_string()),
        }
    }

    /// Error from the pipeline or script host, with its exit code.
    pub fn script(err: ScriptError) -> Self {
        let code = script_exit_code(&err);
        let hint = match &err {
            ScriptError::ScriptCompile { .. } => {
                Some("check the script and the --callback name".to_string())
            }
            ScriptError::Source(_) => {
                Some("supported inputs: .xlsx .xlsm .xls .xlsb .ods .csv .tsv".to_string())
            }
            _ => None,
        };
        let message = match err {
            // The script chose the exit code; there is nothing to report
            ScriptError::ExitRequested(_) => String::new(),
            other => other.to_string(),
        };
        Self { code, message, hint }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ScriptError> for CliError {
    fn from(err: ScriptError) -> Self {
        CliError::script(err)
    }
}

/// Flags merged over settings.
struct RunOptions {
    input: Option<PathBuf>,
    script: Option<PathBuf>,
    callback: String,
    sheet: usize,
    format: OutputFormat,
    quiet: bool,
    repl: bool,
    host: HostOptions,
}

impl RunOptions {
    fn resolve(cli: Cli, settings: Settings) -> Self {
        let format = if cli.as_array || settings.as_array {
            OutputFormat::Array
        } else {
            OutputFormat::Lines
        };
        Self {
            input: cli.input.or(cli.file),
            script: cli.script,
            callback: cli.callback.unwrap_or(settings.callback),
            sheet: cli.sheet.unwrap_or(settings.sheet),
            format,
            quiet: cli.quiet,
            repl: cli.repl,
            host: HostOptions {
                args: cli.script_args,
                exit_policy: cli.exit_policy.map(ExitPolicy::from).unwrap_or(settings.exit_policy),
                http: settings.http,
            },
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings, CliError> {
    match path {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .map_err(CliError::config)
}

fn run(cli: Cli) -> Result<(), CliError> {
    let settings = load_settings(cli.config.as_deref())?;
    let options = RunOptions::resolve(cli, settings);

    if options.input.is_none() && !options.repl {
        return Err(CliError::args("no input file")
            .with_hint("pass a workbook as FILE or -i, or use --repl for an interactive prompt"));
    }

    let host = if options.script.is_some() || options.repl {
        Some(ScriptHost::new(options.host.clone())?)
    } else {
        None
    };
    if let (Some(host), Some(script)) = (&host, &options.script) {
        host.load_script(script)?;
    }

    if let Some(input) = &options.input {
        let pipeline = match (&host, &options.script) {
            (Some(host), Some(_)) if !options.callback.is_empty() => {
                Pipeline::with_callback(host, &options.callback)?
            }
            (_, Some(script)) => {
                log::debug!("{}: no callback name, rows pass through", script.display());
                Pipeline::passthrough()
            }
            _ => Pipeline::passthrough(),
        };
        convert(input, &options, &pipeline)?;
    }

    if options.repl {
        if let Some(host) = &host {
            repl::run_stdio(host)?;
        }
    }
    Ok(())
}

/// Run one sheet of `input` through `pipeline` to stdout.
fn convert(input: &Path, options: &RunOptions, pipeline: &Pipeline) -> Result<RunSummary, CliError> {
    let mut source = open_source(input).map_err(|e| CliError::script(e.into()))?;
    let records = records_for(source.as_mut(), options.sheet).map_err(|e| CliError::script(e.into()))?;

    let stdout = io::stdout();
    let mut out = OutputAssembler::new(stdout.lock(), options.format, options.quiet);
    out.begin().map_err(|e| CliError::output(format!("Can't write output, {}", e)))?;

    let result = pipeline.run(records, &mut out);
    // Close the array before reporting, so stdout stays valid JSON
    let closed = out.finish();

    let summary = result?;
    closed.map_err(|e| CliError::output(format!("Can't write output, {}", e)))?;
    log::info!("{}: {} rows", input.display(), summary.rows_emitted);
    Ok(summary)
}
