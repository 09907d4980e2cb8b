//! Lunette - run and inspect precompiled Lua 5.4 chunks.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lunette_bytecode::reader::Reader;
use lunette_bytecode::{disasm, Chunk, Header};
use lunette_core::{LuaValue, NativeError, NativeFunction, Table};
use lunette_vm::{Vm, VmConfig};
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "lunette")]
#[command(about = "Run and inspect precompiled Lua 5.4 chunks", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a chunk and print its results
    Run {
        /// Path to a luac output file, or `-` for stdin
        file: PathBuf,

        /// Maximum nested call depth
        #[arg(long, default_value_t = VmConfig::default().max_call_depth)]
        max_depth: usize,

        /// Abort after this many instructions
        #[arg(long)]
        instruction_limit: Option<u64>,

        /// Print table results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a luac-style listing of every function in the chunk
    Disasm {
        /// Path to a luac output file, or `-` for stdin
        file: PathBuf,
    },

    /// Decode and check the chunk header
    Header {
        /// Path to a luac output file, or `-` for stdin
        file: PathBuf,
    },
}

/// Initialize logging. `RUST_LOG` overrides the default `warn` filter.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("reading chunk from stdin")?;
        return Ok(buf);
    }
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn load_chunk(path: &Path) -> Result<Chunk> {
    let bytes = read_input(path)?;
    debug!(bytes = bytes.len(), "read chunk image");
    lunette_vm::load(&bytes).with_context(|| format!("loading {}", path.display()))
}

/// `print`: tab-separated `Display` forms of the arguments, then a newline.
fn print_native<'p>() -> NativeFunction<'p> {
    NativeFunction::new("print", |args| {
        let line = args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\t");
        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}").map_err(|e| NativeError::new(format!("print: {e}")))?;
        Ok(Vec::new())
    })
}

/// The `_ENV` table handed to the entry function.
fn base_env<'p>() -> LuaValue<'p> {
    let mut env = Table::new();
    // A string key is never nil.
    let _ = env.set(LuaValue::string("print"), LuaValue::Native(print_native()));
    LuaValue::from(env)
}

fn format_result(value: &LuaValue<'_>, json: bool) -> Result<String> {
    match value.as_table() {
        Some(table) if json => Ok(lunette_json::table_to_string(&table.borrow())?),
        _ => Ok(value.to_string()),
    }
}

fn cmd_run(
    path: &Path,
    max_depth: usize,
    instruction_limit: Option<u64>,
    json: bool,
) -> Result<()> {
    let chunk = load_chunk(path)?;
    let config = VmConfig {
        max_call_depth: max_depth,
        instruction_limit,
    };
    let mut vm = Vm::with_config(config);

    let results = vm
        .execute_chunk(&chunk, base_env())
        .with_context(|| format!("running {}", chunk.main.source_name()))?;
    info!(
        results = results.len(),
        instructions = vm.instructions_executed(),
        "chunk finished"
    );

    for value in &results {
        println!("{}", format_result(value, json)?);
    }
    Ok(())
}

fn cmd_disasm(path: &Path) -> Result<()> {
    let chunk = load_chunk(path)?;
    print!("{}", disasm::disassemble(&chunk.main));
    Ok(())
}

fn describe_header(header: &Header) -> String {
    format!(
        "magic            {:#010x}\n\
         version          {:#04x}\n\
         format           {}\n\
         data check       {:#014x}\n\
         instruction size {}\n\
         integer size     {}\n\
         float size       {}\n\
         sanity int       {:#x}\n\
         sanity float     {}",
        header.magic,
        header.version_number(),
        header.format(),
        header.data_check(),
        header.instruction_size,
        header.integer_size,
        header.float_size,
        header.sanity_int,
        header.sanity_float,
    )
}

fn cmd_header(path: &Path) -> Result<()> {
    let bytes = read_input(path)?;
    let header = Header::read(&mut Reader::new(&bytes))
        .with_context(|| format!("reading header of {}", path.display()))?;
    println!("{}", describe_header(&header));
    match header.validate() {
        Ok(()) => {
            println!("header is valid");
            Ok(())
        }
        Err(e) => bail!("header is invalid: {e}"),
    }
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            file,
            max_depth,
            instruction_limit,
            json,
        } => cmd_run(&file, max_depth, instruction_limit, json),
        Command::Disasm { file } => cmd_disasm(&file),
        Command::Header { file } => cmd_header(&file),
    }
}
