use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use sigdb::commands::{
    build_command, dedup_command, hash_command, init_library_command, list_converters_command,
    list_libraries_command, merge_command, stats_command, validate_command,
    verify_sources_command, BuildArgs, MergeArgs, RecordRules,
};
use sigdb::init_logging;

/// Maintenance CLI for the FLIRT signature database source tree.
///
/// This CLI is a thin wrapper around `sigdb-core` (exposed in code as `sigdb_core`).
#[derive(Parser, Debug)]
#[command(
    name = "sigdb",
    version,
    about = "Validate, merge and build FLIRT signature database sources",
    long_about = None
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). SIGDB_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Record curation flags shared by `merge` and `dedup`.
#[derive(Args, Debug)]
struct RecordRuleArgs {
    /// Drop generated names (fcn., sub., ...), empty functions and fully variant patterns.
    #[arg(long, default_value_t = false)]
    curate: bool,

    /// Drop records with more variant bytes than this percentage (default 50). Implies --curate.
    #[arg(short = 'm', long)]
    max_masked: Option<u8>,

    /// Keep at most this many tail bytes per record (default 64). Implies --curate.
    #[arg(short = 'p', long)]
    max_postlude: Option<usize>,

    /// Keep one record per set of indistinguishable records.
    #[arg(long, default_value_t = false)]
    collapse_collisions: bool,
}

impl From<RecordRuleArgs> for RecordRules {
    fn from(args: RecordRuleArgs) -> Self {
        Self {
            curate: args.curate,
            max_masked: args.max_masked,
            max_postlude: args.max_postlude,
            collapse_collisions: args.collapse_collisions,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the tree layout and every library's files.
    ///
    /// Exits non-zero when errors are found; warnings are reported only.
    Validate {
        /// Tree root. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List libraries in the tree.
    List {
        /// Tree root. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Only libraries of this binary format (e.g., elf).
        #[arg(long)]
        format: Option<String>,

        /// Only libraries of this architecture (e.g., x86).
        #[arg(long)]
        arch: Option<String>,

        /// Only libraries of this bit-width.
        #[arg(long)]
        bits: Option<u32>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Merge pattern files into one deduplicated, sorted pattern file.
    Merge {
        /// Output pattern file.
        #[arg(short, long)]
        output: String,

        /// Input pattern files.
        inputs: Vec<String>,

        /// Directory whose .pat files are merged too (repeatable).
        #[arg(short = 'd', long = "directory")]
        directories: Vec<String>,

        /// Search input directories recursively.
        #[arg(long, default_value_t = false)]
        recursive: bool,

        #[command(flatten)]
        rules: RecordRuleArgs,

        /// Replace the output file if it exists.
        #[arg(long, default_value_t = false)]
        overwrite: bool,

        /// Report what would be written without writing it.
        #[arg(long, alias = "test", default_value_t = false)]
        dry_run: bool,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Deduplicate and normalize a pattern file in place.
    Dedup {
        /// Pattern file to normalize.
        path: String,

        /// Do not write; fail if the file is not already normalized.
        #[arg(long, default_value_t = false)]
        check: bool,

        #[command(flatten)]
        rules: RecordRuleArgs,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show record statistics for a pattern file.
    Stats {
        /// Pattern file to inspect.
        path: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Record SHA-1 digests of source artifacts in `<library>.src.sha1`.
    Hash {
        /// Library directory (`<format>/<arch>/<bits>/<library>`).
        #[arg(long)]
        library: String,

        /// Source artifacts the patterns were generated from.
        #[arg(required = true)]
        artifacts: Vec<String>,
    },

    /// Check a library's manifest against a directory of source artifacts.
    VerifySources {
        /// Library directory (`<format>/<arch>/<bits>/<library>`).
        #[arg(long)]
        library: String,

        /// Directory holding the source artifacts.
        #[arg(long)]
        sources: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Create a new library directory with an empty pattern file and a description.
    InitLibrary {
        /// Tree root. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long)]
        format: String,

        #[arg(long)]
        arch: String,

        #[arg(long)]
        bits: u32,

        /// Library name (directory and file stem).
        #[arg(long)]
        name: String,

        /// Human-readable description. Defaults to a line derived from the key.
        #[arg(long)]
        description: Option<String>,
    },

    /// Convert every library into the distributable signature tree.
    Build {
        /// Tree root. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Output directory.
        #[arg(long, default_value = "dist")]
        out: String,

        /// Converter name (see `converters`). Defaults to the config value.
        #[arg(long)]
        converter: Option<String>,

        /// Path to rz-sign. Overrides sigdb.yaml and RZ_SIGN_BIN.
        #[arg(long)]
        rz_sign: Option<String>,

        #[arg(long)]
        format: Option<String>,

        #[arg(long)]
        arch: Option<String>,

        #[arg(long)]
        bits: Option<u32>,

        /// Record failing libraries and continue instead of aborting.
        #[arg(long, default_value_t = false)]
        keep_going: bool,

        /// Leave tail bytes out of the signatures (rz-sign node optimization 2).
        #[arg(long, default_value_t = false)]
        no_postlude: bool,

        /// Build into a non-empty output directory.
        #[arg(long, default_value_t = false)]
        overwrite: bool,

        /// Check every library and print the index without writing anything.
        #[arg(long, alias = "test", default_value_t = false)]
        dry_run: bool,

        /// Emit the build index as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List available signature converters.
    Converters {
        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Command::Validate { root, json } => validate_command(&root, json)?,
        Command::List { root, format, arch, bits, json } => {
            list_libraries_command(&root, format, arch, bits, json)?
        }
        Command::Merge {
            output,
            inputs,
            directories,
            recursive,
            rules,
            overwrite,
            dry_run,
            json,
        } => merge_command(&MergeArgs {
            output,
            inputs,
            directories,
            recursive,
            rules: rules.into(),
            overwrite,
            dry_run,
            json,
        })?,
        Command::Dedup { path, check, rules, json } => {
            dedup_command(&path, check, &rules.into(), json)?
        }
        Command::Stats { path, json } => stats_command(&path, json)?,
        Command::Hash { library, artifacts } => hash_command(&library, &artifacts)?,
        Command::VerifySources { library, sources, json } => {
            verify_sources_command(&library, &sources, json)?
        }
        Command::InitLibrary { root, format, arch, bits, name, description } => {
            init_library_command(&root, &format, &arch, bits, &name, description)?
        }
        Command::Build {
            root,
            out,
            converter,
            rz_sign,
            format,
            arch,
            bits,
            keep_going,
            no_postlude,
            overwrite,
            dry_run,
            json,
        } => build_command(&BuildArgs {
            root,
            out,
            converter,
            rz_sign,
            format,
            arch,
            bits,
            keep_going,
            no_postlude,
            overwrite,
            dry_run,
            json,
        })?,
        Command::Converters { json } => list_converters_command(json)?,
    }

    Ok(())
}
