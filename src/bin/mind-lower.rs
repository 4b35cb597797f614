// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the MIND project (Machine Intelligence Native Design).

//! MIND lowering CLI: list conversion rules, lower single-op graphs and
//! run the conformance suite.

use std::path::PathBuf;
use std::process;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};

use mind_lower::conformance::{run_conformance, ConformanceOptions, ConformanceProfile};
use mind_lower::graph::GraphBuilder;
use mind_lower::pipeline::{compile_graph, CompileOptions};
use mind_lower::shapes::InputSpec;
use mind_lower::{default_registry, ConvertOptions, DType, Graph};

#[derive(Parser, Debug)]
#[command(name = "mind-lower", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the registered conversion rules.
    Ops,
    /// Lower a graph made of a single op and print the engine graph.
    Lower {
        /// Fully qualified op id, e.g. aten.tanh.default.
        #[arg(long, value_name = "OP")]
        op: String,
        /// Input shape, `1,10` or `min:opt:max` such as `1,1,1:1,2,3:3,3,3`.
        /// Repeat once per operand.
        #[arg(long = "input", value_name = "SPEC", required = true)]
        inputs: Vec<String>,
        /// Element type of every input.
        #[arg(long, value_name = "DTYPE", default_value = "f32")]
        dtype: String,
        /// TOML file with a [convert] table.
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Only verify the pipeline without printing the lowered graph.
        #[arg(long)]
        verify_only: bool,
    },
    /// Run the built-in conformance suite.
    Conformance {
        /// Which profile to execute (static|dynamic).
        #[arg(long, default_value = "dynamic")]
        profile: String,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Command::Ops => {
            print_ops();
            Ok(())
        }
        Command::Lower {
            op,
            inputs,
            dtype,
            config,
            verify_only,
        } => lower(&op, &inputs, &dtype, config, verify_only),
        Command::Conformance { profile } => conformance(&profile),
    };

    if let Err(err) = outcome {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn print_ops() {
    for (op, rule) in default_registry().iter() {
        let dtypes: Vec<&str> = rule
            .signature
            .allowed_dtypes
            .iter()
            .map(|d| d.as_str())
            .collect();
        let dtypes = if dtypes.is_empty() {
            "any".to_string()
        } else {
            dtypes.join(",")
        };
        println!(
            "{op:<28} arity={:<3} dtypes={dtypes:<24} dynamic={}  {}",
            rule.signature.arity.to_string(),
            rule.supports_dynamic_shapes,
            rule.signature.summary
        );
    }
}

/// Single-op graph whose inputs are declared static exactly where the
/// spec is static.
fn single_op_graph(op: &str, dtype: DType, specs: &[InputSpec]) -> Result<Graph> {
    let mut b = GraphBuilder::new();
    let mut operands = Vec::with_capacity(specs.len());
    for (idx, spec) in specs.iter().enumerate() {
        let range = spec
            .to_range()
            .map_err(|err| anyhow!("input {idx}: {err}"))?;
        let declared: Vec<i64> = range
            .dims()
            .iter()
            .map(|d| d.static_extent().map_or(-1, |n| n as i64))
            .collect();
        operands.push(b.input(format!("x{idx}"), dtype, &declared));
    }
    let out = b.node(op, &operands);
    b.output(out);
    Ok(b.build())
}

fn lower(
    op: &str,
    raw_inputs: &[String],
    dtype: &str,
    config: Option<PathBuf>,
    verify_only: bool,
) -> Result<()> {
    let dtype: DType = dtype.parse().map_err(|msg: String| anyhow!(msg))?;
    let specs = raw_inputs
        .iter()
        .map(|raw| {
            raw.parse::<InputSpec>()
                .with_context(|| format!("invalid --input '{raw}'"))
        })
        .collect::<Result<Vec<_>>>()?;

    let convert = match config {
        Some(path) => ConvertOptions::load(&path)?,
        None => ConvertOptions::default(),
    };

    let graph = single_op_graph(op, dtype, &specs)?;
    let products = compile_graph(&graph, &specs, &CompileOptions { convert })?;

    if !verify_only {
        print!("{}", products.lowered);
    }
    Ok(())
}

fn conformance(profile: &str) -> Result<()> {
    let profile = match profile.to_ascii_lowercase().as_str() {
        "static" => ConformanceProfile::Static,
        "dynamic" => ConformanceProfile::Dynamic,
        other => bail!("unknown profile '{other}' (expected static|dynamic)"),
    };

    match run_conformance(default_registry(), ConformanceOptions { profile }) {
        Ok(count) => {
            println!("conformance passed for profile {profile:?} ({count} cases)");
            Ok(())
        }
        Err(err) => {
            for failure in &err.0 {
                eprintln!("- {failure}");
            }
            bail!("{} conformance case(s) failed", err.0.len())
        }
    }
}
