//! `flowctl`: resolve and validate schema files from the command line.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, bail};
use serde_json::{Map, Value};

use onboarding_flows::fields::resolve;
use onboarding_flows::schema::{DeclarativeSchema, SchemaOverrides, modify};
use onboarding_flows::validation::{LogicRules, validate};

const USAGE: &str = "Usage:
  flowctl resolve <schema.json> [overrides.json]
  flowctl validate <schema.json> <values.json>";

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["resolve", schema] => resolve_cmd(Path::new(schema), None),
        ["resolve", schema, overrides] => resolve_cmd(Path::new(schema), Some(Path::new(overrides))),
        ["validate", schema, values] => validate_cmd(Path::new(schema), Path::new(values)),
        _ => {
            eprintln!("{USAGE}");
            Ok(ExitCode::from(2))
        }
    }
}

fn resolve_cmd(schema: &Path, overrides: Option<&Path>) -> anyhow::Result<ExitCode> {
    let mut schema = DeclarativeSchema::load_file(schema)?;
    if let Some(path) = overrides {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let overrides: SchemaOverrides =
            serde_json::from_str(&text).with_context(|| format!("parsing overrides {}", path.display()))?;
        schema = modify(&schema, &overrides);
    }

    let fields = resolve(&schema)?;
    println!("{}", serde_json::to_string_pretty(&fields)?);
    Ok(ExitCode::SUCCESS)
}

fn validate_cmd(schema: &Path, values: &Path) -> anyhow::Result<ExitCode> {
    let schema = DeclarativeSchema::load_file(schema)?;
    let text = std::fs::read_to_string(values).with_context(|| format!("reading {}", values.display()))?;
    let values: Map<String, Value> = match serde_json::from_str(&text)? {
        Value::Object(map) => map,
        other => bail!("values must be a JSON object, got {other}"),
    };

    let mut fields = resolve(&schema)?;
    fields.apply_values(&values);
    let result = validate(&values, &fields, &LogicRules::from_schema(&schema));
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(if result.is_valid() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
