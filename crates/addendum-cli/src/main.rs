//! `addendum` — run the add-on diff engine against JSON files.
//!
//! # Usage
//!
//! ```
//! addendum apply --spec spec.json --addon addon.json
//! addendum restore --spec spec.json --addon addon.json --at 2025-03-01T00:00:00Z
//! addendum change-quantity --spec spec.json --addon before.json --after after.json
//! addendum affected --spec spec.json --addon addon.json
//! ```
//!
//! The spec file holds a subscription spec; the add-on file holds a purchased
//! add-on, whose `subscription_id` names the subscription the spec belongs
//! to. The resulting spec is printed as JSON.

use std::{
  fs,
  io::{self, Write},
  path::{Path, PathBuf},
};

use addendum_core::{
  addon::SubscriptionAddon,
  subscription::{SubscriptionSpec, SubscriptionView},
};
use addendum_diff::{
  ApplyContext, apply_addon, change_addon_quantity, get_affected_item_ids,
  remove_addon,
};
use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "addendum", version, about = "Apply and restore add-ons on subscription specs")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, value_name = "FILE", default_value = "addendum.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Args)]
struct Inputs {
  /// Subscription spec (JSON).
  #[arg(long, value_name = "FILE")]
  spec: PathBuf,

  /// Purchased add-on (JSON).
  #[arg(long, value_name = "FILE")]
  addon: PathBuf,

  /// Evaluation time (RFC 3339). Defaults to now.
  #[arg(long, value_name = "RFC3339")]
  at: Option<DateTime<Utc>>,
}

#[derive(Subcommand)]
enum Command {
  /// Apply the add-on to the spec.
  Apply(Inputs),
  /// Take a previously applied add-on back out of the spec.
  Restore(Inputs),
  /// Replace the applied `--addon` snapshot with the `--after` snapshot.
  ChangeQuantity {
    #[command(flatten)]
    inputs: Inputs,

    /// The purchase after its quantity change (JSON).
    #[arg(long, value_name = "FILE")]
    after: PathBuf,
  },
  /// List the spec's items each add-on rate card affects.
  Affected(Inputs),
}

// ─── Config file ──────────────────────────────────────────────────────────────

fn default_true() -> bool { true }

/// Output settings, from the config file and `ADDENDUM_*` variables.
#[derive(Deserialize, Debug)]
struct Settings {
  /// Pretty-print the JSON output.
  #[serde(default = "default_true")]
  pretty:   bool,
  /// Validate the input spec and add-on before running.
  #[serde(default = "default_true")]
  validate: bool,
  /// Write the output here instead of stdout.
  #[serde(default)]
  output:   Option<PathBuf>,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  let settings: Settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("ADDENDUM"))
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise Settings")?;
  tracing::debug!(?settings, "loaded settings");

  // The only clock read: everything below runs at `ctx.current_time`.
  let now = Utc::now();

  match cli.command {
    Command::Apply(inputs) => {
      let (view, addon, ctx) = load(&inputs, &settings, now)?;
      let spec = apply_addon(&view, &addon, &ctx).context("failed to apply add-on")?;
      tracing::info!(addon = %addon.id, "applied add-on");
      emit(&settings, &spec)
    }
    Command::Restore(inputs) => {
      let (view, addon, ctx) = load(&inputs, &settings, now)?;
      let spec = remove_addon(&view, &addon, &ctx).context("failed to restore add-on")?;
      tracing::info!(addon = %addon.id, "restored add-on");
      emit(&settings, &spec)
    }
    Command::ChangeQuantity { inputs, after } => {
      let (view, before, ctx) = load(&inputs, &settings, now)?;
      let after: SubscriptionAddon = read_json(&after)?;
      if settings.validate {
        after.validate().context("invalid --after add-on")?;
      }
      let spec = change_addon_quantity(&view, &before, &after, &ctx)
        .context("failed to change add-on quantity")?;
      tracing::info!(addon = %after.id, "changed add-on quantity");
      emit(&settings, &spec)
    }
    Command::Affected(inputs) => {
      let (view, addon, _) = load(&inputs, &settings, now)?;
      emit(&settings, &get_affected_item_ids(&view, &addon))
    }
  }
}

fn load(
  inputs: &Inputs,
  settings: &Settings,
  now: DateTime<Utc>,
) -> anyhow::Result<(SubscriptionView, SubscriptionAddon, ApplyContext)> {
  let spec: SubscriptionSpec = read_json(&inputs.spec)?;
  let addon: SubscriptionAddon = read_json(&inputs.addon)?;
  if settings.validate {
    spec.validate().context("invalid subscription spec")?;
    addon.validate().context("invalid add-on")?;
  }
  let view = SubscriptionView::materialize(addon.subscription_id, spec)
    .context("failed to resolve subscription phases")?;
  Ok((view, addon, ApplyContext::at(inputs.at.unwrap_or(now))))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
  let raw =
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
  serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn emit<T: Serialize>(settings: &Settings, value: &T) -> anyhow::Result<()> {
  let mut json = if settings.pretty {
    serde_json::to_string_pretty(value)
  } else {
    serde_json::to_string(value)
  }
  .context("failed to serialise output")?;
  json.push('\n');

  match &settings.output {
    Some(path) => {
      fs::write(path, json).with_context(|| format!("writing {}", path.display()))
    }
    None => io::stdout()
      .write_all(json.as_bytes())
      .context("writing to stdout"),
  }
}
