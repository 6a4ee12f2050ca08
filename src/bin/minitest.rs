//! minitest: regression-diff harness for a running minidb server.
//!
//! Executes the statements of a SQL file against the server and either
//! records the responses as a reference file (`create` mode) or diffs them
//! against the recorded reference (`compare` mode). Reference files live in
//! a `ref/` tree mirroring the `src/` tree of the SQL sources.

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "minitest")]
#[command(about = "Regression-diff harness for minidb", long_about = None)]
struct Args {
    /// Database server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Database server port
    #[arg(long, default_value_t = 9876)]
    port: u16,

    /// create: record reference output; compare: diff against it
    #[arg(long, value_enum, default_value = "compare")]
    run_mode: RunMode,

    /// Enable verbose debug output
    #[arg(long)]
    verbose: bool,

    /// SQL file to execute
    sql_file: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum RunMode {
    Create,
    Compare,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let queries = parse_sql_file(&args.sql_file)
        .with_context(|| format!("Cannot read SQL file: {}", args.sql_file.display()))?;
    if queries.is_empty() {
        bail!("No queries found in SQL file: {}", args.sql_file.display());
    }

    let mut transcript = String::new();
    for query in &queries {
        if args.verbose {
            eprintln!("[DEBUG] Sending query: {}", query);
        }
        let response = execute_query(&args.host, args.port, query)
            .with_context(|| format!("Failed to execute: {}", query))?;
        if args.verbose {
            eprintln!("[DEBUG] Response: {}", response.trim_end());
        }
        transcript.push_str(query);
        transcript.push('\n');
        transcript.push_str(&response);
        if !response.ends_with('\n') {
            transcript.push('\n');
        }
        transcript.push('\n');
    }

    let ref_file = ref_file_path(&args.sql_file);
    match args.run_mode {
        RunMode::Create => run_create(&ref_file, &transcript),
        RunMode::Compare => run_compare(&args.sql_file, &ref_file, &transcript),
    }
}

fn run_create(ref_file: &Path, transcript: &str) -> Result<()> {
    if let Some(parent) = ref_file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }
    std::fs::write(ref_file, transcript)
        .with_context(|| format!("Cannot write reference file: {}", ref_file.display()))?;
    println!("Reference file created successfully: {}", ref_file.display());
    Ok(())
}

fn run_compare(sql_file: &Path, ref_file: &Path, transcript: &str) -> Result<()> {
    let expected = std::fs::read_to_string(ref_file).with_context(|| {
        format!(
            "Reference file does not exist: {} (run with --run-mode create first)",
            ref_file.display()
        )
    })?;

    if expected == transcript {
        println!("PASS: {}", sql_file.display());
        return Ok(());
    }

    let tmp_file = tmp_file_path(ref_file);
    std::fs::write(&tmp_file, transcript)
        .with_context(|| format!("Cannot write {}", tmp_file.display()))?;
    println!("FAIL: {}", sql_file.display());
    println!("  Output saved to: {}", tmp_file.display());
    println!(
        "  Run 'diff -u {} {}' to see differences",
        ref_file.display(),
        tmp_file.display()
    );
    std::process::exit(1);
}

/// Sends one statement and reads the blank-line-terminated response. Each
/// request gets its own connection; requests are independently framed.
fn execute_query(host: &str, port: u16, query: &str) -> Result<String> {
    let mut stream = TcpStream::connect((host, port))
        .with_context(|| format!("Failed to connect to {}:{}", host, port))?;
    stream.write_all(query.as_bytes())?;
    stream.write_all(b"\n\n")?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut response = String::new();
    loop {
        let mut line = String::new();
        let bytes = reader.read_line(&mut line)?;
        if bytes == 0 || line.trim_end_matches(['\r', '\n']).is_empty() {
            break;
        }
        response.push_str(&line);
    }
    Ok(response)
}

/// Splits a SQL file into statements. Lines accumulate until one ends with
/// `;`. Blank lines and `#`/`--` comment lines are skipped.
fn parse_sql_file(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;

    let mut queries = Vec::new();
    let mut current = String::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("--") {
            continue;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(line);
        if line.ends_with(';') {
            queries.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        queries.push(current);
    }
    Ok(queries)
}

/// `tests/minitest/src/basic/select.sql` -> `tests/minitest/ref/basic/select.ref`
fn ref_file_path(sql_file: &Path) -> PathBuf {
    let mut path = sql_file.to_string_lossy().replace("/src/", "/ref/");
    if let Some(stripped) = path.strip_suffix(".sql") {
        path = format!("{}.ref", stripped);
    } else {
        path.push_str(".ref");
    }
    PathBuf::from(path)
}

fn tmp_file_path(ref_file: &Path) -> PathBuf {
    let path = ref_file.to_string_lossy();
    match path.strip_suffix(".ref") {
        Some(stripped) => PathBuf::from(format!("{}.tmp", stripped)),
        None => PathBuf::from(format!("{}.tmp", path)),
    }
}
