//! Command-line driver for the enhancement pipeline.
//!
//! Reads a fragment from a file (or stdin with `-`), runs one entry
//! point, and prints the JSON response envelope. Exists so the pipeline
//! can be exercised end to end without the HTTP layer.

use std::io::Read as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use agentic_design_core::{
    BrandPack, Config, Deadline, Error, Result, StaticBrandPackStore, Viewport,
};
use agentic_design_pipeline::api::{
    AnalyzeRequest, EnhanceRequest, ResponsiveRequest, ValidateRequest,
};
use agentic_design_pipeline::Orchestrator;
use agentic_design_visual::HttpVisionModel;

#[derive(Parser)]
#[command(
    name = "agentic-design",
    about = "AI-assisted design enhancement pipeline",
    version
)]
struct Cli {
    /// Project root used for brand discovery.
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    /// Optional brand-pack JSON document to load into the local store.
    #[arg(long, global = true)]
    brand_pack: Option<PathBuf>,

    /// Request deadline in milliseconds.
    #[arg(long, global = true, default_value_t = 30_000)]
    deadline_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enhance a fragment and print the rewritten code + change log.
    Enhance {
        /// Fragment file, or `-` for stdin.
        file: String,
        /// Code type: css, html, jsx, tsx, js (inferred from the file
        /// extension when omitted).
        #[arg(long)]
        code_type: Option<String>,
        /// Consult the signature cache.
        #[arg(long)]
        cached: bool,
        /// Auto-apply mode: safe, off, all.
        #[arg(long)]
        auto_apply: Option<String>,
        /// Optimization pass: basic, aggressive.
        #[arg(long)]
        optimize: Option<String>,
        #[arg(long)]
        component_type: Option<String>,
    },
    /// Run the visual loop: capture, critique, plan, optionally fix.
    Analyze {
        file: String,
        #[arg(long)]
        code_type: Option<String>,
        #[arg(long)]
        auto_apply: Option<String>,
        /// Re-capture and re-critique after applying the plan.
        #[arg(long)]
        validate: bool,
        /// Viewport as WxH, e.g. 1280x800.
        #[arg(long)]
        viewport: Option<String>,
    },
    /// Compare two fragments through capture + critique.
    Validate {
        original: String,
        improved: String,
        #[arg(long)]
        code_type: Option<String>,
    },
    /// Analyze one fragment across several viewports.
    Responsive {
        file: String,
        #[arg(long)]
        code_type: Option<String>,
        /// Comma-separated WxH list, e.g. 375x812,768x1024,1280x800.
        #[arg(long)]
        viewports: Option<String>,
    },
    /// Print the component/status report.
    Doctor,
    /// Sweep expired cache entries.
    CacheMaintenance,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(success) => {
            if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    let packs = match &cli.brand_pack {
        Some(path) => vec![load_brand_pack(path)?],
        None => Vec::new(),
    };
    let mut builder = Orchestrator::builder(Config::from_env(), Arc::new(StaticBrandPackStore::new(packs)))
        .project_root(&cli.project)
        .screenshot_dir(std::env::temp_dir().join("agentic-design-screenshots"));
    if let Some(vision) = HttpVisionModel::from_env() {
        builder = builder.vision_model(Arc::new(vision));
    }
    let orchestrator = builder.build();
    let deadline = Deadline::after_millis(cli.deadline_ms);

    let (envelope, success) = match cli.command {
        Command::Enhance {
            file,
            code_type,
            cached,
            auto_apply,
            optimize,
            component_type,
        } => {
            let code = read_fragment(&file)?;
            let request = EnhanceRequest {
                code,
                code_type: resolve_code_type(code_type.as_deref(), &file)?,
                project_path: Some(cli.project.display().to_string()),
                component_type,
                file_path: Some(file),
                auto_apply,
                optimize,
                ..EnhanceRequest::default()
            };
            let response = if cached {
                orchestrator.enhance_cached(&request, &deadline)
            } else {
                orchestrator.enhance(&request, &deadline)
            };
            (serde_json::to_value(&response)?, response.success)
        }
        Command::Analyze {
            file,
            code_type,
            auto_apply,
            validate,
            viewport,
        } => {
            let code = read_fragment(&file)?;
            let request = AnalyzeRequest {
                code,
                code_type: resolve_code_type(code_type.as_deref(), &file)?,
                project_path: Some(cli.project.display().to_string()),
                auto_apply,
                validate_after_fix: validate,
                viewport: viewport.as_deref().map(parse_viewport).transpose()?,
                ..AnalyzeRequest::default()
            };
            let response = orchestrator.analyze_and_fix(&request, &deadline);
            (serde_json::to_value(&response)?, response.success)
        }
        Command::Validate {
            original,
            improved,
            code_type,
        } => {
            let request = ValidateRequest {
                original_code: read_fragment(&original)?,
                improved_code: read_fragment(&improved)?,
                code_type: resolve_code_type(code_type.as_deref(), &original)?,
                ..ValidateRequest::default()
            };
            let response = orchestrator.validate_improvements(&request, &deadline);
            (serde_json::to_value(&response)?, response.success)
        }
        Command::Responsive {
            file,
            code_type,
            viewports,
        } => {
            let code = read_fragment(&file)?;
            let parsed_viewports = viewports
                .as_deref()
                .map(|list| {
                    list.split(',')
                        .map(|v| parse_viewport(v.trim()))
                        .collect::<Result<Vec<_>>>()
                })
                .transpose()?
                .unwrap_or_default();
            let request = ResponsiveRequest {
                code,
                code_type: resolve_code_type(code_type.as_deref(), &file)?,
                viewports: parsed_viewports,
                ..ResponsiveRequest::default()
            };
            let response = orchestrator.analyze_responsive(&request, &deadline);
            (serde_json::to_value(&response)?, response.success)
        }
        Command::Doctor => (orchestrator.status_report(), true),
        Command::CacheMaintenance => {
            let removed = orchestrator.cache_maintenance();
            (serde_json::json!({ "removedEntries": removed }), true)
        }
    };

    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(success)
}

fn read_fragment(file: &str) -> Result<String> {
    if file == "-" {
        let mut code = String::new();
        std::io::stdin().read_to_string(&mut code)?;
        Ok(code)
    } else {
        Ok(std::fs::read_to_string(file)?)
    }
}

fn resolve_code_type(explicit: Option<&str>, file: &str) -> Result<String> {
    if let Some(code_type) = explicit {
        return Ok(code_type.to_string());
    }
    let inferred = std::path::Path::new(file)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match inferred.as_deref() {
        Some(ext @ ("css" | "html" | "jsx" | "tsx" | "js")) => Ok(ext.to_string()),
        Some("htm") => Ok("html".to_string()),
        _ => Err(Error::InvalidInput(format!(
            "cannot infer code type for {file}; pass --code-type"
        ))),
    }
}

fn parse_viewport(raw: &str) -> Result<Viewport> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| Error::InvalidInput(format!("viewport must be WxH, got {raw}")))?;
    let width = w
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("bad viewport width: {w}")))?;
    let height = h
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("bad viewport height: {h}")))?;
    Ok(Viewport { width, height })
}

fn load_brand_pack(path: &PathBuf) -> Result<BrandPack> {
    let text = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    let id = value
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::MissingField("brand pack id".to_string()))?;
    let version = value
        .get("version")
        .and_then(|v| v.as_str())
        .unwrap_or("1.0.0");
    let tokens = value
        .get("tokens")
        .ok_or_else(|| Error::MissingField("brand pack tokens".to_string()))?;
    BrandPack::from_json(id, version, tokens)
}
