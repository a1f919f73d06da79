//! Command line front end for inspecting PostgreSQL WAL archives.
//!
//! Results are written to stdout, logs go to stderr so that output can be
//! piped into other tools.
use std::io::{self, Write};

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use postgres_ffi::TimeLineID;
use postgres_ffi::xlog_utils::{
    IsPartialXLogFileName, XLOG_PARTIAL_SUFFIX, XLogFromFileName, XLogSegNoOffsetToRecPtr,
};
use tracing::debug;
use utils::logging::{self, LogFormat, TracingErrorLayerEnablement};
use utils::lsn::Lsn;
use utils::project_git_version;
use wal_utils::config::{ARCHIVE_DIR_ENV, WalUtilsConf};
use wal_utils::{TimelineHistory, build_segment_range, parse_history};

project_git_version!(GIT_VERSION);

#[derive(Parser)]
#[command(
    version = GIT_VERSION,
    about = "PostgreSQL WAL archive utilities",
    long_about = "Parses timeline history files, lists the WAL segments needed to get from one \
                  position to another across timeline switches, and reads files from a WAL archive"
)]
#[command(propagate_version = true)]
struct CliOpts {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,
    /// WAL segment size in bytes
    #[arg(long, global = true)]
    wal_seg_size: Option<u64>,
    /// Archive directory, takes precedence over $PGARCHIVE
    #[arg(long, global = true)]
    archive_dir: Option<Utf8PathBuf>,
    /// One of plain, json or test
    #[arg(long, global = true)]
    log_format: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    ParseHistory(ParseHistoryCmd),
    SegmentList(SegmentListCmd),
    DescribeSegment(DescribeSegmentCmd),
    ArchiveSize(ArchiveSizeCmd),
    ArchiveRead(ArchiveReadCmd),
}

/// Print the entries of a timeline history file as JSON, one per line
#[derive(Parser)]
struct ParseHistoryCmd {
    /// History file path, or its name in the archive with --from-archive
    path: Utf8PathBuf,
    #[arg(long)]
    from_archive: bool,
}

/// Print the names of the WAL segments leading from an origin position to a target position
#[derive(Parser)]
struct SegmentListCmd {
    #[arg(long)]
    origin_timeline: TimeLineID,
    #[arg(long)]
    origin_lsn: Lsn,
    #[arg(long)]
    target_timeline: TimeLineID,
    #[arg(long)]
    target_lsn: Lsn,
    /// History file of the target timeline
    #[arg(long, conflicts_with = "history_from_archive")]
    history: Option<Utf8PathBuf>,
    /// Read the history file of the target timeline from the archive
    #[arg(long)]
    history_from_archive: bool,
}

/// Decode a WAL segment file name
#[derive(Parser)]
struct DescribeSegmentCmd {
    name: String,
}

/// Print the size of a file in the archive
#[derive(Parser)]
struct ArchiveSizeCmd {
    name: String,
}

/// Copy (part of) a file in the archive to stdout
#[derive(Parser)]
struct ArchiveReadCmd {
    name: String,
    /// Where to start reading, negative values count from the end of the file
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    offset: i64,
    /// How many bytes to read, the rest of the file if not given
    #[arg(long)]
    length: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let cli = CliOpts::parse();
    let conf = build_conf(&cli)?;

    logging::init(
        conf.log_format,
        TracingErrorLayerEnablement::EnableWithRustLogFilter,
        logging::Output::Stderr,
    )?;
    let _panic_hook_guard = logging::replace_panic_hook_with_tracing_panic_hook();
    debug!("version: {GIT_VERSION}, config: {conf:?}");

    let mut out = io::stdout().lock();
    match cli.command {
        Commands::ParseHistory(cmd) => parse_history_cmd(&conf, &cmd, &mut out),
        Commands::SegmentList(cmd) => segment_list_cmd(&conf, &cmd, &mut out),
        Commands::DescribeSegment(cmd) => describe_segment_cmd(&conf, &cmd, &mut out),
        Commands::ArchiveSize(cmd) => {
            let size = conf.archive()?.file_size(&cmd.name)?;
            writeln!(out, "{size}")?;
            Ok(())
        }
        Commands::ArchiveRead(cmd) => {
            let data = conf.archive()?.read(&cmd.name, cmd.offset, cmd.length)?;
            out.write_all(&data)?;
            Ok(())
        }
    }?;
    out.flush()?;
    Ok(())
}

fn build_conf(cli: &CliOpts) -> anyhow::Result<WalUtilsConf> {
    let mut conf = WalUtilsConf::load(cli.config.as_deref())?
        .with_archive_dir_env(std::env::var(ARCHIVE_DIR_ENV).ok());
    if let Some(wal_seg_size) = cli.wal_seg_size {
        conf.wal_seg_size = wal_seg_size;
    }
    if let Some(dir) = &cli.archive_dir {
        conf.archive_dir = Some(dir.clone());
    }
    if let Some(log_format) = &cli.log_format {
        conf.log_format = LogFormat::from_config(log_format)?;
    }
    conf.validate()?;
    Ok(conf)
}

fn read_history_file(path: &Utf8Path) -> anyhow::Result<TimelineHistory> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read history file \"{path}\""))?;
    parse_history(&text).with_context(|| format!("parse history file \"{path}\""))
}

fn parse_history_cmd(
    conf: &WalUtilsConf,
    cmd: &ParseHistoryCmd,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let history = if cmd.from_archive {
        let path = conf.archive()?.resolve(cmd.path.as_str())?;
        read_history_file(&path)?
    } else {
        read_history_file(&cmd.path)?
    };
    for entry in history.entries() {
        serde_json::to_writer(&mut *out, entry)?;
        writeln!(out)?;
    }
    Ok(())
}

fn segment_list_cmd(
    conf: &WalUtilsConf,
    cmd: &SegmentListCmd,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let history = if let Some(path) = &cmd.history {
        Some(read_history_file(path)?)
    } else if cmd.history_from_archive {
        Some(conf.archive()?.read_history(cmd.target_timeline)?)
    } else {
        None
    };

    let names = build_segment_range(
        cmd.origin_timeline,
        cmd.origin_lsn,
        cmd.target_timeline,
        cmd.target_lsn,
        history.as_ref().map(TimelineHistory::entries),
        conf.wal_seg_size,
    )?;
    debug!(segments = names.len(), "built segment list");
    for name in names {
        writeln!(out, "{name}")?;
    }
    Ok(())
}

fn describe_segment_cmd(
    conf: &WalUtilsConf,
    cmd: &DescribeSegmentCmd,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let partial = IsPartialXLogFileName(&cmd.name);
    let name = cmd
        .name
        .strip_suffix(XLOG_PARTIAL_SUFFIX)
        .filter(|_| partial)
        .unwrap_or(&cmd.name);
    let (segno, tli) = XLogFromFileName(name, conf.wal_seg_size)?;
    let start = Lsn(XLogSegNoOffsetToRecPtr(segno, 0, conf.wal_seg_size));

    let description = serde_json::json!({
        "tli": tli,
        "segno": segno,
        "start_lsn": start,
        "end_lsn": start.checked_add(conf.wal_seg_size),
        "partial": partial,
    });
    serde_json::to_writer(&mut *out, &description)?;
    writeln!(out)?;
    Ok(())
}
